use thiserror::Error;

/// Failures reported by a spreadsheet backend.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("spreadsheet not found: {0}")]
    DocumentNotFound(String),

    /// Recoverable: the tab resolver creates the worksheet instead of surfacing this.
    #[error("worksheet not found: {0}")]
    WorksheetNotFound(String),

    #[error("a worksheet named {0} already exists")]
    WorksheetExists(String),

    #[error("invalid cell reference: row {row}, column {col}")]
    InvalidCell { row: u32, col: u32 },

    #[error("spreadsheet service rejected the request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response from spreadsheet service: {0}")]
    Protocol(String),

    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("{0}")]
    Unavailable(String),

    #[cfg(feature = "remote")]
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failures while establishing the service handle. The app keeps running without a
/// remote document when one of these happens.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("no credentials found: {0}")]
    MissingCredentials(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("could not read credentials file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not authorize with the spreadsheet service: {0}")]
    Remote(#[from] RemoteError),

    #[error("backend {0} is not available in this build")]
    BackendUnavailable(String),
}

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("could not open spreadsheet {document}: {source}")]
    TabResolution {
        document: String,
        #[source]
        source: RemoteError,
    },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("{0}")]
    Validation(String),

    #[error("tab {tab} was modified remotely after it was loaded; reload before saving")]
    StaleWrite { tab: String },

    #[error("not connected to the spreadsheet service")]
    Offline,

    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("xlsx export failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl From<csv::IntoInnerError<csv::Writer<Vec<u8>>>> for InventoryError {
    fn from(err: csv::IntoInnerError<csv::Writer<Vec<u8>>>) -> Self {
        InventoryError::Io(err.into_error())
    }
}

pub type Result<T> = std::result::Result<T, InventoryError>;
