use log::{info, warn};

use crate::error::{InventoryError, Result};
use crate::remote::{Revision, Worksheet};
use crate::table::InventoryTable;

/// Replace the whole content of a client tab with `table`.
///
/// The tab is cleared, then the header and every row are written in one update. There
/// is no diff and no rollback: if the write fails after the clear, the tab stays empty
/// until the next successful save.
///
/// With `expected` set, the tab is read first and the save is refused when its content
/// no longer matches the revision the table was loaded from.
///
/// # Errors
/// * `InventoryError::StaleWrite` when `expected` is set and the tab changed
/// * `InventoryError::Remote` if reading, clearing or writing fails
pub fn save_table(
    worksheet: &dyn Worksheet,
    table: &InventoryTable,
    expected: Option<Revision>,
) -> Result<Revision> {
    let tab = worksheet.title();

    if let Some(expected) = expected {
        let current = Revision::of(&worksheet.get_all_values()?);
        if current != expected {
            warn!("refusing to overwrite {tab}: changed since it was loaded");
            return Err(InventoryError::StaleWrite { tab });
        }
    }

    let values = table.to_values();
    worksheet.clear()?;
    if let Err(e) = worksheet.update(&values) {
        warn!("{tab} was cleared but could not be rewritten: {e}");
        return Err(e.into());
    }
    info!("saved {} rows to {tab}", table.len());

    Ok(Revision::of(&values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_table;
    use crate::memory::MemoryWorksheet;
    use crate::table::{CANONICAL_COLUMNS, InventoryRow};

    fn sample() -> InventoryTable {
        InventoryTable::new(vec![
            InventoryRow {
                date: "2024-05-01".to_string(),
                lot: "L-1".to_string(),
                initial: 5.0,
                product: "Kale".to_string(),
                balance: 3.5,
                gan_1: "a, b".to_string(),
                ..Default::default()
            },
            InventoryRow {
                product: "Leek".to_string(),
                initial: 2.0,
                ..Default::default()
            },
        ])
    }

    fn seeded() -> MemoryWorksheet {
        let sheet = MemoryWorksheet::new("Veggie", 100, 20);
        sheet
            .update(&[
                CANONICAL_COLUMNS.map(String::from).to_vec(),
                vec!["old".to_string(); 9],
                vec!["older".to_string(); 9],
                vec!["oldest".to_string(); 9],
            ])
            .unwrap();
        sheet
    }

    #[test]
    fn save_then_load_round_trips() {
        let sheet = seeded();
        let table = sample();

        save_table(&sheet, &table, None).unwrap();
        let loaded = load_table(&sheet).unwrap();

        assert_eq!(loaded.table, table);
        assert_eq!(sheet.get_all_values().unwrap().len(), 3);
        assert_eq!(sheet.get_all_values().unwrap()[1][2], "5");
    }

    #[test]
    fn saving_an_empty_table_leaves_only_the_header() {
        let sheet = seeded();
        save_table(&sheet, &InventoryTable::default(), None).unwrap();
        assert_eq!(
            sheet.get_all_values().unwrap(),
            vec![InventoryTable::columns()]
        );
    }

    #[test]
    fn guarded_save_refuses_a_stale_table() {
        let sheet = seeded();
        let loaded = load_table(&sheet).unwrap();

        sheet.update_cell(2, 4, "changed elsewhere").unwrap();
        let err = save_table(&sheet, &sample(), Some(loaded.revision)).unwrap_err();
        assert!(matches!(err, InventoryError::StaleWrite { .. }));
        assert_eq!(sheet.get_all_values().unwrap()[1][3], "changed elsewhere");

        let fresh = load_table(&sheet).unwrap();
        let revision = save_table(&sheet, &sample(), Some(fresh.revision)).unwrap();
        assert_eq!(revision, load_table(&sheet).unwrap().revision);
    }

    #[test]
    fn failure_after_clear_leaves_the_tab_empty() {
        let sheet = seeded();
        sheet.fail_writes_after(1);

        let err = save_table(&sheet, &sample(), None).unwrap_err();
        assert!(matches!(err, InventoryError::Remote(_)));
        assert!(sheet.get_all_values().unwrap().is_empty());
    }
}
