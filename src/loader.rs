use log::debug;

use crate::error::Result;
use crate::ledger::Ledger;
use crate::remote::{Revision, Worksheet, records_from_values};
use crate::table::{InventoryRow, InventoryTable, LEDGER_HEADER, parse_quantity_or_zero};

/// A client tab as read from the sheet, plus the revision it was read at.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table: InventoryTable,
    pub revision: Revision,
}

/// Load a client tab into memory.
///
/// Row 1 is the header; every other row becomes an [`InventoryRow`]. Canonical columns
/// missing from the sheet come out blank, extra columns are dropped, and the result is
/// always in canonical order whatever the order on the sheet. `Initial` and `Balance`
/// go through [`crate::table::parse_numeric_or_zero`], so anything that is not a number
/// silently becomes `0`.
///
/// # Arguments
/// * `worksheet` - The client tab
///
/// # Returns
/// * `Result<LoadedTable>` - An empty table when the tab holds no data rows
pub fn load_table(worksheet: &dyn Worksheet) -> Result<LoadedTable> {
    let values = worksheet.get_all_values()?;
    let revision = Revision::of(&values);
    let rows: Vec<InventoryRow> = records_from_values(&values)
        .iter()
        .map(InventoryRow::from_record)
        .collect();
    debug!("loaded {} rows from {}", rows.len(), worksheet.title());

    Ok(LoadedTable {
        table: InventoryTable::new(rows),
        revision,
    })
}

/// Load the product → quantity ledger from the stock sheet.
///
/// Products are keyed exactly as written in column A, so a later upsert finds the same
/// row. Rows with a blank product are skipped; if a product appears twice the later row
/// wins. Quantities that are not numbers load as `0`.
pub fn load_ledger(worksheet: &dyn Worksheet) -> Result<Ledger> {
    let [product_column, quantity_column] = LEDGER_HEADER;
    let mut ledger = Ledger::new();

    for record in worksheet.get_all_records()? {
        let product = record.get(product_column).map_or("", String::as_str);
        if product.trim().is_empty() {
            continue;
        }
        let quantity = record
            .get(quantity_column)
            .map_or(0, |q| parse_quantity_or_zero(q));
        ledger.set(product, quantity);
    }

    debug!("loaded {} products from {}", ledger.len(), worksheet.title());
    Ok(ledger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryWorksheet;
    use crate::table::CANONICAL_COLUMNS;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn empty_tab_has_canonical_shape_and_no_rows() {
        let sheet = MemoryWorksheet::new("Veggie", 100, 20);
        sheet
            .append_row(&CANONICAL_COLUMNS.map(String::from))
            .unwrap();
        let loaded = load_table(&sheet).unwrap();
        assert!(loaded.table.is_empty());
        assert_eq!(loaded.table.to_values(), vec![InventoryTable::columns()]);

        let blank = MemoryWorksheet::new("Blank", 100, 20);
        assert!(load_table(&blank).unwrap().table.is_empty());
    }

    #[test]
    fn partial_columns_are_filled_and_reordered() {
        let sheet = MemoryWorksheet::new("Veggie", 100, 20);
        sheet
            .update(&[
                row(&["Balance", "Product", "Extra"]),
                row(&["4", "Kale", "ignored"]),
                row(&["abc", "Leek", ""]),
            ])
            .unwrap();

        let table = load_table(&sheet).unwrap().table;
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.rows[0].to_cells(),
            row(&["", "", "0", "Kale", "4", "", "", "", ""])
        );
        assert_eq!(table.rows[1].balance, 0.0);
    }

    #[test]
    fn ledger_reads_product_and_quantity() {
        let sheet = MemoryWorksheet::new("Sheet1", 100, 20);
        sheet
            .update(&[
                row(&["Producto", "Cantidad"]),
                row(&["TOMATO", "10"]),
                row(&["", "3"]),
                row(&["ONION", "x"]),
                row(&["TOMATO", "12"]),
            ])
            .unwrap();

        let ledger = load_ledger(&sheet).unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get("TOMATO"), Some(12));
        assert_eq!(ledger.get("ONION"), Some(0));
    }

    #[test]
    fn ledger_keys_keep_the_sheet_text() {
        let sheet = MemoryWorksheet::new("Sheet1", 100, 20);
        sheet
            .update(&[
                row(&["Producto", "Cantidad"]),
                row(&["TOMATO ", "10"]),
                row(&["tomato", "4"]),
                row(&["  ", "9"]),
            ])
            .unwrap();

        let ledger = load_ledger(&sheet).unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get("TOMATO "), Some(10));
        assert_eq!(ledger.get("tomato"), Some(4));
        assert_eq!(ledger.get("TOMATO"), None);
    }

    #[test]
    fn empty_stock_sheet_is_an_empty_ledger() {
        let sheet = MemoryWorksheet::new("Sheet1", 100, 20);
        assert!(load_ledger(&sheet).unwrap().is_empty());
    }
}
