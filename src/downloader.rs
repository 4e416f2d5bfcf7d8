use chrono::NaiveDateTime;
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::Result;
use crate::table::{CANONICAL_COLUMNS, InventoryTable};

lazy_static! {
    static ref UNSAFE_FILE_CHARS: Regex = Regex::new(r#"[\\/:*?"<>|\s]+"#).unwrap();
}

/// Export a client table to CSV.
///
/// The first line is the canonical header; every row follows with its cells stringified
/// the same way they are written to the sheet. Values holding commas, quotes or
/// newlines are quoted as usual for CSV.
///
/// # Arguments
/// * `table` - The table to export
///
/// # Returns
/// * `Result<String>` - UTF-8 CSV content
///
/// # Examples
/// ```
/// use almacen::downloader::to_csv;
/// use almacen::table::InventoryTable;
///
/// let csv = to_csv(&InventoryTable::default()).unwrap();
/// assert!(csv.starts_with("Date,Lot#,Initial,Product,Balance"));
/// ```
pub fn to_csv(table: &InventoryTable) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CANONICAL_COLUMNS)?;
    for row in &table.rows {
        writer.write_record(row.to_cells())?;
    }
    let bytes = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Export a client table to XLSX.
///
/// One worksheet named after the client holds the header and the rows. `Initial` and
/// `Balance` are written as numbers, everything else as text.
///
/// # Arguments
/// * `table` - The table to export
/// * `client` - Worksheet name (truncated to the 31 characters Excel allows)
///
/// # Returns
/// * `Result<Vec<u8>>` - XLSX file content
pub fn to_xlsx(table: &InventoryTable, client: &str) -> Result<Vec<u8>> {
    use rust_xlsxwriter::{Workbook, Worksheet};

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    let name: String = client
        .chars()
        .filter(|c| !"[]:*?/\\".contains(*c))
        .take(31)
        .collect();
    if !name.trim().is_empty() {
        worksheet.set_name(name)?;
    }

    for (c, column) in CANONICAL_COLUMNS.iter().enumerate() {
        worksheet.write_string(0, c as u16, *column)?;
    }

    for (r, row) in table.rows.iter().enumerate() {
        let line = (r + 1) as u32;
        for (c, cell) in row.to_cells().iter().enumerate() {
            match c {
                2 => worksheet.write_number(line, c as u16, row.initial)?,
                4 => worksheet.write_number(line, c as u16, row.balance)?,
                _ => worksheet.write_string(line, c as u16, cell)?,
            };
        }
    }

    workbook.push_worksheet(worksheet);
    let buffer = workbook.save_to_buffer()?;

    Ok(buffer)
}

/// Name of a backup download: `{client}_{YYYYMMDD_HHMMSS}.{extension}`.
///
/// Characters that are not allowed in file names are replaced with `_`.
///
/// # Examples
/// ```
/// use almacen::downloader::export_file_name;
/// use chrono::NaiveDate;
///
/// let at = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(14, 3, 9).unwrap();
/// assert_eq!(export_file_name("Veggie", at, "csv"), "Veggie_20240501_140309.csv");
/// ```
pub fn export_file_name(client: &str, at: NaiveDateTime, extension: &str) -> String {
    let client = UNSAFE_FILE_CHARS.replace_all(client.trim(), "_");
    format!("{}_{}.{}", client, at.format("%Y%m%d_%H%M%S"), extension)
}
