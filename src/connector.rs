use std::sync::Arc;

use log::{error, info, warn};

use crate::config::{Backend, Config};
use crate::credentials::SecretStore;
use crate::error::{ConnectionError, InventoryError};
use crate::memory::MemoryService;
use crate::remote::{Document, SpreadsheetService};
use crate::tabs;

/// Build an authorized service handle for the configured backend.
///
/// For the `sheets` backend the service account is looked up with the edition's
/// precedence (see [`crate::credentials::resolve`]) and a first token is fetched, so an
/// `Ok` here means the credentials were accepted. No retry is attempted.
///
/// # Errors
/// * `ConnectionError` describing why credentials could not be found or were refused
pub fn connect(
    config: &Config,
    secrets: &SecretStore,
) -> Result<Arc<dyn SpreadsheetService>, ConnectionError> {
    match config.backend {
        Backend::Memory => {
            let service = MemoryService::new();
            service.create_document(&config.document_name);
            info!(
                "using in-memory spreadsheet {} (nothing is persisted)",
                config.document_name
            );
            Ok(Arc::new(service))
        }
        Backend::Sheets => connect_sheets(config, secrets),
    }
}

#[cfg(feature = "remote")]
fn connect_sheets(
    config: &Config,
    secrets: &SecretStore,
) -> Result<Arc<dyn SpreadsheetService>, ConnectionError> {
    use crate::credentials;
    use crate::sheets_api::SheetsApiService;

    let (key, source) = credentials::resolve(config.edition, secrets, &config.credentials_path)?;
    info!("service account {} loaded from {:?}", key.client_email, source);
    let service = SheetsApiService::authorize(key)?;
    Ok(Arc::new(service))
}

#[cfg(not(feature = "remote"))]
fn connect_sheets(
    _config: &Config,
    _secrets: &SecretStore,
) -> Result<Arc<dyn SpreadsheetService>, ConnectionError> {
    Err(ConnectionError::BackendUnavailable("sheets".to_string()))
}

/// What the app holds after start-up: the opened document, or the reason there is none.
#[derive(Clone)]
pub struct Connection {
    pub document: Option<Arc<dyn Document>>,
    pub problem: Option<String>,
}

impl Connection {
    pub fn online(document: Arc<dyn Document>) -> Self {
        Connection {
            document: Some(document),
            problem: None,
        }
    }

    pub fn degraded(problem: impl Into<String>) -> Self {
        Connection {
            document: None,
            problem: Some(problem.into()),
        }
    }

    pub fn document(&self) -> Result<&Arc<dyn Document>, InventoryError> {
        self.document.as_ref().ok_or(InventoryError::Offline)
    }
}

/// Load secrets, connect and open the configured document. Never fails: any error is
/// logged and turned into a degraded connection that serves empty data.
pub fn establish(config: &Config) -> Connection {
    let secrets = match SecretStore::load(&config.secrets_path) {
        Ok(secrets) => secrets,
        Err(e) => {
            warn!("ignoring secrets file: {e}");
            SecretStore::new()
        }
    };

    let service = match connect(config, &secrets) {
        Ok(service) => service,
        Err(e) => {
            error!("error connecting to the spreadsheet service: {e}");
            return Connection::degraded(format!("Error connecting to Google: {e}"));
        }
    };

    match tabs::open_document(service.as_ref(), &config.document_name) {
        Ok(document) => Connection::online(document),
        Err(e) => {
            error!("{e}");
            Connection::degraded(e.to_string())
        }
    }
}
