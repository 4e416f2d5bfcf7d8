//! The spreadsheet service as seen by the rest of the crate.
//!
//! Every method is a blocking round-trip. Implementations live in [`crate::memory`]
//! and (with the `remote` feature) [`crate::sheets_api`].

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::RemoteError;

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// A data row keyed by the header found in row 1.
pub type Record = HashMap<String, String>;

/// 1-based position of a cell inside a worksheet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

/// Opaque fingerprint of a worksheet's content at the time it was read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Revision(u64);

impl Revision {
    /// Trailing blank cells and rows are ignored, since the service never returns them.
    pub fn of(values: &[Vec<String>]) -> Self {
        let trimmed: Vec<&[String]> = values
            .iter()
            .map(|row| {
                let end = row.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1);
                &row[..end]
            })
            .collect();
        let end = trimmed.iter().rposition(|row| !row.is_empty()).map_or(0, |i| i + 1);

        let mut hasher = DefaultHasher::new();
        trimmed[..end].hash(&mut hasher);
        Revision(hasher.finish())
    }
}

pub trait SpreadsheetService: Send + Sync {
    /// Open a spreadsheet document by its title.
    fn open(&self, document_name: &str) -> RemoteResult<Arc<dyn Document>>;
}

pub trait Document: Send + Sync {
    fn title(&self) -> String;

    /// Where a person can open the document in a browser, if it has such a place.
    fn url(&self) -> Option<String> {
        None
    }

    /// Titles of all worksheets, in tab order.
    fn worksheets(&self) -> RemoteResult<Vec<String>>;

    /// Fails with [`RemoteError::WorksheetNotFound`] when no tab has this title.
    fn worksheet(&self, title: &str) -> RemoteResult<Arc<dyn Worksheet>>;

    fn first_worksheet(&self) -> RemoteResult<Arc<dyn Worksheet>>;

    fn add_worksheet(&self, title: &str, rows: u32, cols: u32) -> RemoteResult<Arc<dyn Worksheet>>;
}

pub trait Worksheet: Send + Sync {
    fn title(&self) -> String;

    /// Every non-empty row, trailing blanks trimmed.
    fn get_all_values(&self) -> RemoteResult<Vec<Vec<String>>>;

    fn update_cell(&self, row: u32, col: u32, value: &str) -> RemoteResult<()>;

    fn append_rows(&self, rows: &[Vec<String>]) -> RemoteResult<()>;

    fn clear(&self) -> RemoteResult<()>;

    /// Write `values` starting at A1.
    fn update(&self, values: &[Vec<String>]) -> RemoteResult<()>;

    fn append_row(&self, values: &[String]) -> RemoteResult<()> {
        self.append_rows(&[values.to_vec()])
    }

    /// Rows 2.. as records keyed by row 1.
    fn get_all_records(&self) -> RemoteResult<Vec<Record>> {
        Ok(records_from_values(&self.get_all_values()?))
    }

    /// First cell (row-major) whose content equals `text` exactly.
    fn find(&self, text: &str) -> RemoteResult<Option<CellRef>> {
        let values = self.get_all_values()?;
        Ok(values.iter().enumerate().find_map(|(r, row)| {
            row.iter().position(|cell| cell == text).map(|c| CellRef {
                row: r as u32 + 1,
                col: c as u32 + 1,
            })
        }))
    }

    /// First cell in column `col` whose content equals `text` exactly.
    fn find_in_column(&self, text: &str, col: u32) -> RemoteResult<Option<CellRef>> {
        let index = col.checked_sub(1).ok_or(RemoteError::InvalidCell { row: 0, col })? as usize;
        let values = self.get_all_values()?;
        Ok(values
            .iter()
            .position(|row| row.get(index).is_some_and(|cell| cell == text))
            .map(|r| CellRef {
                row: r as u32 + 1,
                col,
            }))
    }
}

/// Turn raw rows into header-keyed records. Short rows are padded with blanks, cells
/// beyond the header are ignored, and rows that are entirely blank are skipped.
pub fn records_from_values(values: &[Vec<String>]) -> Vec<Record> {
    let Some((header, rows)) = values.split_first() else {
        return Vec::new();
    };

    rows.iter()
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .map(|row| {
            header
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), row.get(i).cloned().unwrap_or_default()))
                .collect()
        })
        .collect()
}

/// Convert a 1-based column number to its letter (1 = A, 27 = AA).
pub fn column_letter(col: u32) -> String {
    let mut name = String::new();
    let mut n = col;

    while n > 0 {
        n -= 1;
        name.insert(0, (b'A' + (n % 26) as u8) as char);
        n /= 26;
    }

    name
}

/// A1 notation for a cell, e.g. `(2, 3)` is `C2`.
pub fn a1(row: u32, col: u32) -> String {
    format!("{}{}", column_letter(col), row)
}
