//! Process-local spreadsheet backend. Content lives only as long as the process; used
//! for tests and for running the form without a Google account.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::RemoteError;
use crate::remote::{Document, RemoteResult, SpreadsheetService, Worksheet};

#[derive(Default)]
pub struct MemoryService {
    documents: RwLock<HashMap<String, Arc<MemoryDocument>>>,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or return) a document with a single empty `Sheet1`.
    pub fn create_document(&self, name: &str) -> Arc<MemoryDocument> {
        let mut documents = self.documents.write().expect("memory service lock poisoned");
        documents
            .entry(name.to_string())
            .or_insert_with(|| {
                let document = MemoryDocument::new(name);
                document.push_sheet("Sheet1", 1000, 26);
                Arc::new(document)
            })
            .clone()
    }

    pub fn document(&self, name: &str) -> Option<Arc<MemoryDocument>> {
        let documents = self.documents.read().expect("memory service lock poisoned");
        documents.get(name).cloned()
    }
}

impl SpreadsheetService for MemoryService {
    fn open(&self, document_name: &str) -> RemoteResult<Arc<dyn Document>> {
        match self.document(document_name) {
            Some(document) => Ok(document),
            None => Err(RemoteError::DocumentNotFound(document_name.to_string())),
        }
    }
}

pub struct MemoryDocument {
    title: String,
    sheets: RwLock<Vec<Arc<MemoryWorksheet>>>,
}

impl MemoryDocument {
    pub fn new(title: &str) -> Self {
        MemoryDocument {
            title: title.to_string(),
            sheets: RwLock::new(Vec::new()),
        }
    }

    fn push_sheet(&self, title: &str, rows: u32, cols: u32) -> Arc<MemoryWorksheet> {
        let sheet = Arc::new(MemoryWorksheet::new(title, rows, cols));
        self.sheets
            .write()
            .expect("memory document lock poisoned")
            .push(sheet.clone());
        sheet
    }

    /// Concrete handle, so tests can inspect grid size or inject failures.
    pub fn sheet(&self, title: &str) -> Option<Arc<MemoryWorksheet>> {
        let sheets = self.sheets.read().expect("memory document lock poisoned");
        sheets.iter().find(|s| s.title == title).cloned()
    }
}

impl Document for MemoryDocument {
    fn title(&self) -> String {
        self.title.clone()
    }

    fn worksheets(&self) -> RemoteResult<Vec<String>> {
        let sheets = self.sheets.read().expect("memory document lock poisoned");
        Ok(sheets.iter().map(|s| s.title.clone()).collect())
    }

    fn worksheet(&self, title: &str) -> RemoteResult<Arc<dyn Worksheet>> {
        match self.sheet(title) {
            Some(sheet) => Ok(sheet),
            None => Err(RemoteError::WorksheetNotFound(title.to_string())),
        }
    }

    fn first_worksheet(&self) -> RemoteResult<Arc<dyn Worksheet>> {
        let sheets = self.sheets.read().expect("memory document lock poisoned");
        match sheets.first() {
            Some(sheet) => Ok(sheet.clone()),
            None => Err(RemoteError::WorksheetNotFound("<first>".to_string())),
        }
    }

    fn add_worksheet(&self, title: &str, rows: u32, cols: u32) -> RemoteResult<Arc<dyn Worksheet>> {
        if self.sheet(title).is_some() {
            return Err(RemoteError::WorksheetExists(title.to_string()));
        }
        Ok(self.push_sheet(title, rows, cols))
    }
}

pub struct MemoryWorksheet {
    title: String,
    size: Mutex<(u32, u32)>,
    cells: RwLock<Vec<Vec<String>>>,
    // number of write calls left before writes start failing; usize::MAX disables
    writes_before_failure: AtomicUsize,
}

impl MemoryWorksheet {
    pub fn new(title: &str, rows: u32, cols: u32) -> Self {
        MemoryWorksheet {
            title: title.to_string(),
            size: Mutex::new((rows, cols)),
            cells: RwLock::new(Vec::new()),
            writes_before_failure: AtomicUsize::new(usize::MAX),
        }
    }

    /// Grid size as (rows, columns). Grows when writes go past it.
    pub fn size(&self) -> (u32, u32) {
        *self.size.lock().expect("memory worksheet lock poisoned")
    }

    /// Let the next `successes` writes through, then fail every write after that.
    pub fn fail_writes_after(&self, successes: usize) {
        self.writes_before_failure.store(successes, Ordering::SeqCst);
    }

    fn check_write(&self) -> RemoteResult<()> {
        let left = self.writes_before_failure.load(Ordering::SeqCst);
        if left == 0 {
            return Err(RemoteError::Unavailable(format!(
                "write to {} refused",
                self.title
            )));
        }
        if left != usize::MAX {
            self.writes_before_failure.store(left - 1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn grow_to(&self, rows: usize, cols: usize) {
        let mut size = self.size.lock().expect("memory worksheet lock poisoned");
        size.0 = size.0.max(rows as u32);
        size.1 = size.1.max(cols as u32);
    }

    fn write_block(cells: &mut Vec<Vec<String>>, top: usize, values: &[Vec<String>]) {
        for (offset, row) in values.iter().enumerate() {
            let r = top + offset;
            if cells.len() <= r {
                cells.resize(r + 1, Vec::new());
            }
            let target = &mut cells[r];
            if target.len() < row.len() {
                target.resize(row.len(), String::new());
            }
            for (c, value) in row.iter().enumerate() {
                target[c] = value.clone();
            }
        }
    }
}

impl Worksheet for MemoryWorksheet {
    fn title(&self) -> String {
        self.title.clone()
    }

    fn get_all_values(&self) -> RemoteResult<Vec<Vec<String>>> {
        let cells = self.cells.read().expect("memory worksheet lock poisoned");
        let mut values: Vec<Vec<String>> = cells
            .iter()
            .map(|row| {
                let end = row.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1);
                row[..end].to_vec()
            })
            .collect();
        while values.last().is_some_and(|row| row.is_empty()) {
            values.pop();
        }
        Ok(values)
    }

    fn update_cell(&self, row: u32, col: u32, value: &str) -> RemoteResult<()> {
        if row == 0 || col == 0 {
            return Err(RemoteError::InvalidCell { row, col });
        }
        self.check_write()?;
        let (r, c) = (row as usize - 1, col as usize - 1);
        let mut cells = self.cells.write().expect("memory worksheet lock poisoned");
        if cells.len() <= r {
            cells.resize(r + 1, Vec::new());
        }
        let target = &mut cells[r];
        if target.len() <= c {
            target.resize(c + 1, String::new());
        }
        target[c] = value.to_string();
        drop(cells);
        self.grow_to(row as usize, col as usize);
        Ok(())
    }

    fn append_rows(&self, rows: &[Vec<String>]) -> RemoteResult<()> {
        self.check_write()?;
        let mut cells = self.cells.write().expect("memory worksheet lock poisoned");
        let top = cells
            .iter()
            .rposition(|row| row.iter().any(|c| !c.is_empty()))
            .map_or(0, |i| i + 1);
        cells.truncate(top);
        Self::write_block(&mut cells, top, rows);
        let (height, width) = (cells.len(), rows.iter().map(Vec::len).max().unwrap_or(0));
        drop(cells);
        self.grow_to(height, width);
        Ok(())
    }

    fn clear(&self) -> RemoteResult<()> {
        self.check_write()?;
        self.cells
            .write()
            .expect("memory worksheet lock poisoned")
            .clear();
        Ok(())
    }

    fn update(&self, values: &[Vec<String>]) -> RemoteResult<()> {
        self.check_write()?;
        let mut cells = self.cells.write().expect("memory worksheet lock poisoned");
        Self::write_block(&mut cells, 0, values);
        let (height, width) = (cells.len(), values.iter().map(Vec::len).max().unwrap_or(0));
        drop(cells);
        self.grow_to(height, width);
        Ok(())
    }
}
