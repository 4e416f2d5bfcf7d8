use std::collections::BTreeMap;
use std::fmt;

use chrono::{Local, NaiveTime};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};
use crate::remote::Worksheet;
use crate::table::LEDGER_HEADER;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "INBOUND"),
            Direction::Outbound => write!(f, "OUTBOUND"),
        }
    }
}

/// Product name → quantity on hand, keyed by the product name as written in column A.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ledger {
    items: BTreeMap<String, i64>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, product: &str) -> Option<i64> {
        self.items.get(product).copied()
    }

    pub fn set(&mut self, product: &str, quantity: i64) {
        self.items.insert(product.to_string(), quantity);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn products(&self) -> impl Iterator<Item = (&str, i64)> {
        self.items.iter().map(|(p, q)| (p.as_str(), *q))
    }

    /// Quantity after moving `delta` units, without changing anything.
    ///
    /// # Errors
    /// * `InventoryError::Validation` when `delta` is not positive, or on an outbound
    ///   movement of an unknown product or of more than is in stock
    pub fn preview(&self, product: &str, delta: i64, direction: Direction) -> Result<i64> {
        if delta <= 0 {
            return Err(InventoryError::Validation(format!(
                "quantity must be at least 1, got {delta}"
            )));
        }
        let current = self.get(product);
        match direction {
            Direction::Inbound => current.unwrap_or(0).checked_add(delta).ok_or_else(|| {
                InventoryError::Validation(format!("quantity of {product} would overflow"))
            }),
            Direction::Outbound => {
                let current = current.ok_or_else(|| {
                    InventoryError::Validation(format!("{product} is not in stock"))
                })?;
                if delta > current {
                    return Err(InventoryError::Validation(format!(
                        "cannot take {delta} of {product}, only {current} in stock"
                    )));
                }
                Ok(current - delta)
            }
        }
    }
}

/// Upper-cased, trimmed product name, as typed into the stock-in form.
pub fn normalize_product(product: &str) -> String {
    product.trim().to_uppercase()
}

/// Result of writing a quantity to the stock sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Upsert {
    Updated { row: u32 },
    Appended,
}

/// Write `quantity` for `product` to the stock sheet.
///
/// The first row whose column A equals `product` exactly gets its column B overwritten;
/// otherwise `[product, quantity]` is appended (after writing the header if the sheet is
/// completely empty). Nothing guards the gap between reading and writing: a concurrent
/// change to the same row is overwritten.
pub fn upsert_quantity(worksheet: &dyn Worksheet, product: &str, quantity: i64) -> Result<Upsert> {
    if let Some(cell) = worksheet.find_in_column(product, 1)? {
        worksheet.update_cell(cell.row, 2, &quantity.to_string())?;
        return Ok(Upsert::Updated { row: cell.row });
    }

    if worksheet.get_all_values()?.is_empty() {
        worksheet.append_row(&LEDGER_HEADER.map(String::from))?;
    }
    worksheet.append_row(&[product.to_string(), quantity.to_string()])?;
    Ok(Upsert::Appended)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Movement {
    pub product: String,
    pub delta: i64,
    pub direction: Direction,
    pub quantity: i64,
    /// `None` when there is no sheet to write to.
    pub upsert: Option<Upsert>,
}

/// Apply one stock movement and persist it at once.
///
/// The new quantity is computed from the in-memory ledger, written to the sheet with
/// [`upsert_quantity`], and only then stored in the ledger, so a failed write leaves the
/// ledger as it was. Without a sheet the movement is applied locally only.
///
/// # Arguments
/// * `ledger` - The session's in-memory stock
/// * `worksheet` - The stock sheet, if connected
/// * `product` - Product name as it is keyed in the ledger
/// * `delta` - Units moved, at least 1
/// * `direction` - Stock in or stock out
///
/// # Errors
/// * `InventoryError::Validation` for out-of-range quantities (see [`Ledger::preview`])
/// * `InventoryError::Remote` if the sheet write fails
pub fn apply_delta(
    ledger: &mut Ledger,
    worksheet: Option<&dyn Worksheet>,
    product: &str,
    delta: i64,
    direction: Direction,
) -> Result<Movement> {
    if product.is_empty() {
        return Err(InventoryError::Validation(
            "product name cannot be empty".to_string(),
        ));
    }
    let quantity = ledger.preview(product, delta, direction)?;

    let upsert = match worksheet {
        Some(sheet) => Some(upsert_quantity(sheet, product, quantity)?),
        None => None,
    };
    ledger.set(product, quantity);
    info!("{direction} {delta} of {product}, now {quantity}");

    Ok(Movement {
        product: product.to_string(),
        delta,
        direction,
        quantity,
        upsert,
    })
}

/// Movement log kept for the session only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct History {
    entries: Vec<String>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `HH:MM - DIRECTION: ±delta of PRODUCT`.
    pub fn record_at(&mut self, at: NaiveTime, movement: &Movement) {
        let sign = match movement.direction {
            Direction::Inbound => '+',
            Direction::Outbound => '-',
        };
        self.entries.push(format!(
            "{} - {}: {}{} of {}",
            at.format("%H:%M"),
            movement.direction,
            sign,
            movement.delta,
            movement.product
        ));
    }

    pub fn record(&mut self, movement: &Movement) {
        self.record_at(Local::now().time(), movement);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryWorksheet;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn inbound_creates_a_new_product() {
        let sheet = MemoryWorksheet::new("Sheet1", 1000, 26);
        let mut ledger = Ledger::new();

        let sheet_ref: &dyn Worksheet = &sheet;
        let movement =
            apply_delta(&mut ledger, Some(sheet_ref), "TOMATO", 10, Direction::Inbound).unwrap();

        assert_eq!(ledger.get("TOMATO"), Some(10));
        assert_eq!(movement.upsert, Some(Upsert::Appended));
        let values = sheet.get_all_values().unwrap();
        assert_eq!(values.last().unwrap(), &row(&["TOMATO", "10"]));
        assert_eq!(values[0], row(&["Producto", "Cantidad"]));
    }

    #[test]
    fn inbound_adds_to_existing_stock() {
        let sheet = MemoryWorksheet::new("Sheet1", 1000, 26);
        sheet
            .update(&[row(&["Producto", "Cantidad"]), row(&["TOMATO", "10"])])
            .unwrap();
        let mut ledger = Ledger::new();
        ledger.set("TOMATO", 10);

        let sheet_ref: &dyn Worksheet = &sheet;
        apply_delta(&mut ledger, Some(sheet_ref), "TOMATO", 5, Direction::Inbound).unwrap();
        assert_eq!(ledger.get("TOMATO"), Some(15));
        assert_eq!(sheet.get_all_values().unwrap()[1], row(&["TOMATO", "15"]));
    }

    #[test]
    fn outbound_updates_the_quantity_cell() {
        let sheet = MemoryWorksheet::new("Sheet1", 1000, 26);
        sheet
            .update(&[
                row(&["Producto", "Cantidad"]),
                row(&["ONION", "4"]),
                row(&["TOMATO", "10"]),
            ])
            .unwrap();
        let mut ledger = Ledger::new();
        ledger.set("ONION", 4);
        ledger.set("TOMATO", 10);

        let sheet_ref: &dyn Worksheet = &sheet;
        let movement =
            apply_delta(&mut ledger, Some(sheet_ref), "TOMATO", 3, Direction::Outbound).unwrap();

        assert_eq!(ledger.get("TOMATO"), Some(7));
        assert_eq!(movement.upsert, Some(Upsert::Updated { row: 3 }));
        assert_eq!(sheet.get_all_values().unwrap()[2], row(&["TOMATO", "7"]));
    }

    #[test]
    fn outbound_out_of_range_is_rejected() {
        let mut ledger = Ledger::new();
        ledger.set("TOMATO", 10);

        for delta in [0, -1, 11] {
            let err = apply_delta(&mut ledger, None, "TOMATO", delta, Direction::Outbound);
            assert!(matches!(err, Err(InventoryError::Validation(_))));
        }
        let err = apply_delta(&mut ledger, None, "KALE", 1, Direction::Outbound);
        assert!(matches!(err, Err(InventoryError::Validation(_))));
        assert_eq!(ledger.get("TOMATO"), Some(10));

        apply_delta(&mut ledger, None, "TOMATO", 10, Direction::Outbound).unwrap();
        assert_eq!(ledger.get("TOMATO"), Some(0));
    }

    #[test]
    fn failed_write_leaves_the_ledger_alone() {
        let sheet = MemoryWorksheet::new("Sheet1", 1000, 26);
        sheet.fail_writes_after(0);
        let mut ledger = Ledger::new();

        let sheet_ref: &dyn Worksheet = &sheet;
        let err = apply_delta(&mut ledger, Some(sheet_ref), "TOMATO", 2, Direction::Inbound);
        assert!(matches!(err, Err(InventoryError::Remote(_))));
        assert!(ledger.is_empty());
    }

    #[test]
    fn upsert_matches_the_first_column_only() {
        let sheet = MemoryWorksheet::new("Sheet1", 1000, 26);
        sheet
            .update(&[
                row(&["Producto", "Cantidad"]),
                row(&["ONION", "7"]),
                row(&["7", "2"]),
            ])
            .unwrap();
        // "7" first appears as ONION's quantity; only column A counts
        assert_eq!(
            upsert_quantity(&sheet, "7", 9).unwrap(),
            Upsert::Updated { row: 3 }
        );
        let values = sheet.get_all_values().unwrap();
        assert_eq!(values[1], row(&["ONION", "7"]));
        assert_eq!(values[2], row(&["7", "9"]));
        assert_eq!(upsert_quantity(&sheet, "8", 1).unwrap(), Upsert::Appended);
    }

    #[test]
    fn history_lines_read_like_a_log() {
        let mut history = History::new();
        let movement = Movement {
            product: "TOMATO".to_string(),
            delta: 3,
            direction: Direction::Outbound,
            quantity: 7,
            upsert: None,
        };
        history.record_at(NaiveTime::from_hms_opt(9, 5, 0).unwrap(), &movement);
        assert_eq!(history.entries(), ["09:05 - OUTBOUND: -3 of TOMATO"]);
    }

    #[test]
    fn product_names_are_normalized() {
        assert_eq!(normalize_product("  tomato "), "TOMATO");
    }
}
