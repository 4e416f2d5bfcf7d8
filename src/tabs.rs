use std::sync::Arc;

use log::info;
use serde::Serialize;

use crate::error::{InventoryError, RemoteError, Result};
use crate::remote::{Document, SpreadsheetService, Worksheet};
use crate::table::CANONICAL_COLUMNS;

/// Size of a freshly created client tab.
pub const NEW_TAB_ROWS: u32 = 100;
pub const NEW_TAB_COLS: u32 = 20;

/// How a tab was obtained, shown to the user after selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TabNotice {
    OpenedExisting,
    CreatedNew,
}

impl TabNotice {
    pub fn message(self, name: &str) -> String {
        match self {
            TabNotice::OpenedExisting => format!("Opened existing tab {name}"),
            TabNotice::CreatedNew => format!("Created new tab {name}"),
        }
    }
}

pub struct ResolvedTab {
    pub worksheet: Arc<dyn Worksheet>,
    pub notice: TabNotice,
}

/// Open the parent document of every tab.
///
/// # Errors
/// * `InventoryError::TabResolution` if the document cannot be opened; the current
///   action cannot go on without it
pub fn open_document(service: &dyn SpreadsheetService, name: &str) -> Result<Arc<dyn Document>> {
    service
        .open(name)
        .map_err(|source| InventoryError::TabResolution {
            document: name.to_string(),
            source,
        })
}

/// Map a client name to its worksheet, creating it when it does not exist yet.
///
/// An existing tab is returned untouched. A new one is sized
/// [`NEW_TAB_ROWS`] × [`NEW_TAB_COLS`] and gets the canonical header as its only row.
///
/// # Arguments
/// * `document` - The opened spreadsheet
/// * `name` - Client / tab title, used verbatim
///
/// # Errors
/// * `InventoryError::Validation` for a blank name
/// * `InventoryError::Remote` if listing, creating or seeding the tab fails
pub fn resolve_or_create(document: &dyn Document, name: &str) -> Result<ResolvedTab> {
    if name.trim().is_empty() {
        return Err(InventoryError::Validation(
            "client name cannot be empty".to_string(),
        ));
    }

    match document.worksheet(name) {
        Ok(worksheet) => Ok(ResolvedTab {
            worksheet,
            notice: TabNotice::OpenedExisting,
        }),
        Err(RemoteError::WorksheetNotFound(_)) => {
            let worksheet = document.add_worksheet(name, NEW_TAB_ROWS, NEW_TAB_COLS)?;
            let header: Vec<String> = CANONICAL_COLUMNS.iter().map(|c| c.to_string()).collect();
            worksheet.append_row(&header)?;
            info!("created tab {name} in {}", document.title());
            Ok(ResolvedTab {
                worksheet,
                notice: TabNotice::CreatedNew,
            })
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryService;

    #[test]
    fn missing_tab_is_created_with_the_header_only() {
        let service = MemoryService::new();
        let document = service.create_document("Inventario_Ricardo");

        let resolved = resolve_or_create(document.as_ref(), "Veggie").unwrap();
        assert_eq!(resolved.notice, TabNotice::CreatedNew);
        assert_eq!(
            resolved.worksheet.get_all_values().unwrap(),
            vec![vec![
                "Date",
                "Lot#",
                "Initial",
                "Product",
                "Balance",
                "GAN_1 (COGA 53)",
                "GAN_2 (COGA 53)",
                "GAN_3 (COGA 53)",
                "GAN_4 (COGA 53)",
            ]]
        );
        assert_eq!(
            document.sheet("Veggie").unwrap().size(),
            (NEW_TAB_ROWS, NEW_TAB_COLS)
        );
    }

    #[test]
    fn existing_tab_is_returned_unmodified() {
        let service = MemoryService::new();
        let document = service.create_document("Inventario_Ricardo");
        let first = resolve_or_create(document.as_ref(), "Veggie").unwrap();
        first
            .worksheet
            .append_row(&["2024-01-01".to_string(), "L1".to_string()])
            .unwrap();
        let before = first.worksheet.get_all_values().unwrap();

        let again = resolve_or_create(document.as_ref(), "Veggie").unwrap();
        assert_eq!(again.notice, TabNotice::OpenedExisting);
        assert_eq!(again.worksheet.get_all_values().unwrap(), before);
        assert_eq!(document.worksheets().unwrap(), vec!["Sheet1", "Veggie"]);
    }

    #[test]
    fn unreachable_document_is_a_resolution_error() {
        let service = MemoryService::new();
        let err = open_document(&service, "Gone").err().unwrap();
        assert!(matches!(err, InventoryError::TabResolution { .. }));
    }

    #[test]
    fn blank_names_are_refused() {
        let service = MemoryService::new();
        let document = service.create_document("d");
        assert!(matches!(
            resolve_or_create(document.as_ref(), "  "),
            Err(InventoryError::Validation(_))
        ));
    }
}
