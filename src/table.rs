use serde::{Deserialize, Deserializer, Serialize};

use crate::remote::Record;

/// Header of every client tab, in the order it is written to the sheet.
pub const CANONICAL_COLUMNS: [&str; 9] = [
    "Date",
    "Lot#",
    "Initial",
    "Product",
    "Balance",
    "GAN_1 (COGA 53)",
    "GAN_2 (COGA 53)",
    "GAN_3 (COGA 53)",
    "GAN_4 (COGA 53)",
];

/// Header of the single stock sheet used by the ledger edition.
pub const LEDGER_HEADER: [&str; 2] = ["Producto", "Cantidad"];

/// Parse a cell as a number, falling back to zero.
///
/// This is deliberately lossy: blanks, text that is not a number and non-finite
/// values (`NaN`, `inf`) all become `0.0` and the original content is discarded.
/// Both numeric columns of a tab go through here before any arithmetic.
///
/// # Examples
/// ```
/// use almacen::table::parse_numeric_or_zero;
///
/// assert_eq!(parse_numeric_or_zero(" 12.5 "), 12.5);
/// assert_eq!(parse_numeric_or_zero("twelve"), 0.0);
/// assert_eq!(parse_numeric_or_zero(""), 0.0);
/// ```
pub fn parse_numeric_or_zero(text: &str) -> f64 {
    match text.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// Integer flavour of [`parse_numeric_or_zero`] for ledger quantities. Fractions are
/// truncated toward zero.
pub fn parse_quantity_or_zero(text: &str) -> i64 {
    let trimmed = text.trim();
    match trimmed.parse::<i64>() {
        Ok(value) => value,
        Err(_) => parse_numeric_or_zero(trimmed) as i64,
    }
}

/// Render a number the way it is written back to the sheet (`5.0` becomes `5`).
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        // also folds -0.0
        return "0".to_string();
    }
    value.to_string()
}

fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
        serde_json::Value::String(s) => parse_numeric_or_zero(&s),
        _ => 0.0,
    })
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

/// One line of a client tab.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryRow {
    #[serde(rename = "Date", default, deserialize_with = "lenient_text")]
    pub date: String,
    #[serde(rename = "Lot#", default, deserialize_with = "lenient_text")]
    pub lot: String,
    #[serde(rename = "Initial", default, deserialize_with = "lenient_number")]
    pub initial: f64,
    #[serde(rename = "Product", default, deserialize_with = "lenient_text")]
    pub product: String,
    #[serde(rename = "Balance", default, deserialize_with = "lenient_number")]
    pub balance: f64,
    #[serde(rename = "GAN_1 (COGA 53)", default, deserialize_with = "lenient_text")]
    pub gan_1: String,
    #[serde(rename = "GAN_2 (COGA 53)", default, deserialize_with = "lenient_text")]
    pub gan_2: String,
    #[serde(rename = "GAN_3 (COGA 53)", default, deserialize_with = "lenient_text")]
    pub gan_3: String,
    #[serde(rename = "GAN_4 (COGA 53)", default, deserialize_with = "lenient_text")]
    pub gan_4: String,
}

impl InventoryRow {
    /// Build a row from a header-keyed record. Columns the record lacks come out blank
    /// (or zero for the numeric ones); columns outside the canonical set are dropped.
    pub fn from_record(record: &Record) -> Self {
        let text = |column: &str| record.get(column).cloned().unwrap_or_default();
        let number = |column: &str| record.get(column).map_or(0.0, |v| parse_numeric_or_zero(v));

        InventoryRow {
            date: text(CANONICAL_COLUMNS[0]),
            lot: text(CANONICAL_COLUMNS[1]),
            initial: number(CANONICAL_COLUMNS[2]),
            product: text(CANONICAL_COLUMNS[3]),
            balance: number(CANONICAL_COLUMNS[4]),
            gan_1: text(CANONICAL_COLUMNS[5]),
            gan_2: text(CANONICAL_COLUMNS[6]),
            gan_3: text(CANONICAL_COLUMNS[7]),
            gan_4: text(CANONICAL_COLUMNS[8]),
        }
    }

    /// Cells in canonical column order, stringified.
    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.lot.clone(),
            format_number(self.initial),
            self.product.clone(),
            format_number(self.balance),
            self.gan_1.clone(),
            self.gan_2.clone(),
            self.gan_3.clone(),
            self.gan_4.clone(),
        ]
    }
}

/// Sums shown under the grid. Recomputed on every render, never written to the sheet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Totals {
    pub initial: f64,
    pub balance: f64,
}

/// All rows of one client tab. Rows have no key; their position is their identity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryTable {
    pub rows: Vec<InventoryRow>,
}

impl InventoryTable {
    pub fn new(rows: Vec<InventoryRow>) -> Self {
        InventoryTable { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn columns() -> Vec<String> {
        CANONICAL_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    pub fn totals(&self) -> Totals {
        self.rows.iter().fold(Totals::default(), |acc, row| Totals {
            initial: acc.initial + row.initial,
            balance: acc.balance + row.balance,
        })
    }

    /// Header followed by every row, ready for a full worksheet write.
    pub fn to_values(&self) -> Vec<Vec<String>> {
        let mut values = Vec::with_capacity(self.rows.len() + 1);
        values.push(Self::columns());
        values.extend(self.rows.iter().map(InventoryRow::to_cells));
        values
    }
}
