use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Edition;
use crate::error::ConnectionError;

/// Secret key holding the structured service account (edition 1).
pub const SECRET_SERVICE_ACCOUNT: &str = "gcp_service_account";
/// Secret key holding the service account as a JSON string (editions 2 and 3).
pub const SECRET_GOOGLE_JSON: &str = "google_json";
/// Secret key holding the raw credentials file content (edition 3).
pub const SECRET_FILE_CONTENT: &str = "contenido_archivo";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Google service account key, as downloaded from the cloud console.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    pub key_type: String,

    #[serde(default)]
    pub project_id: String,

    #[serde(default)]
    pub private_key_id: String,

    /// PEM-encoded RSA private key
    pub private_key: String,

    /// Service account identity, used as the JWT issuer
    pub client_email: String,

    #[serde(default)]
    pub client_id: String,

    /// OAuth endpoint that exchanges a signed assertion for an access token
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    /// Parse a key from JSON text.
    ///
    /// # Errors
    /// * `ConnectionError::InvalidCredentials` if the text is not a service account object
    pub fn from_json_str(text: &str) -> Result<Self, ConnectionError> {
        let key: ServiceAccountKey = serde_json::from_str(text)
            .map_err(|e| ConnectionError::InvalidCredentials(e.to_string()))?;
        key.validated()
    }

    pub fn from_value(value: Value) -> Result<Self, ConnectionError> {
        let key: ServiceAccountKey = serde_json::from_value(value)
            .map_err(|e| ConnectionError::InvalidCredentials(e.to_string()))?;
        key.validated()
    }

    /// Read a key from a credentials file on disk.
    ///
    /// # Errors
    /// * `ConnectionError::MissingCredentials` if the file does not exist
    /// * `ConnectionError::Io` if it exists but cannot be read
    /// * `ConnectionError::InvalidCredentials` if its content is not a key
    pub fn from_file(path: &Path) -> Result<Self, ConnectionError> {
        if !path.exists() {
            return Err(ConnectionError::MissingCredentials(format!(
                "{} does not exist",
                path.display()
            )));
        }
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    fn validated(self) -> Result<Self, ConnectionError> {
        if self.client_email.trim().is_empty() {
            return Err(ConnectionError::InvalidCredentials(
                "client_email is empty".to_string(),
            ));
        }
        if !self.private_key.contains("PRIVATE KEY") {
            return Err(ConnectionError::InvalidCredentials(
                "private_key is not a PEM key".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Runtime secrets: a JSON object file merged with same-named, upper-cased environment
/// variables (environment wins).
#[derive(Debug, Clone, Default)]
pub struct SecretStore {
    values: HashMap<String, Value>,
}

impl SecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the secrets file (missing file means no secrets) and overlay the environment.
    ///
    /// # Errors
    /// * `ConnectionError::Io` if the file exists but cannot be read
    /// * `ConnectionError::InvalidCredentials` if it is not a JSON object
    pub fn load(path: &Path) -> Result<Self, ConnectionError> {
        let mut store = if path.exists() {
            let text = fs::read_to_string(path)?;
            Self::from_json_str(&text)?
        } else {
            debug!("no secrets file at {}", path.display());
            Self::new()
        };

        for key in [SECRET_SERVICE_ACCOUNT, SECRET_GOOGLE_JSON, SECRET_FILE_CONTENT] {
            if let Ok(raw) = env::var(key.to_uppercase()) {
                // a structured secret may come through the environment as JSON text
                let value = if key == SECRET_SERVICE_ACCOUNT {
                    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
                } else {
                    Value::String(raw)
                };
                store.insert(key, value);
            }
        }

        Ok(store)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConnectionError> {
        let values: HashMap<String, Value> = serde_json::from_str(text).map_err(|e| {
            ConnectionError::InvalidCredentials(format!("secrets file is not a JSON object: {e}"))
        })?;
        Ok(SecretStore { values })
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// A secret as text. Strings are returned as-is, anything else as its JSON encoding.
    pub fn get_text(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Where a key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Secret(&'static str),
    File,
}

/// Find the service account for `edition`, trying sources in that edition's order.
///
/// * V1: secret `gcp_service_account` (structured object), else the credentials file.
/// * V2: secret `google_json` (a JSON string), else the credentials file.
/// * V3: secret `contenido_archivo` or `google_json` is first written verbatim to the
///   credentials file; the key is then always read from that file.
///
/// # Errors
/// * Any `ConnectionError` from parsing a secret, writing or reading the file
pub fn resolve(
    edition: Edition,
    secrets: &SecretStore,
    credentials_path: &Path,
) -> Result<(ServiceAccountKey, CredentialSource), ConnectionError> {
    match edition {
        Edition::V1 => {
            if let Some(value) = secrets.get(SECRET_SERVICE_ACCOUNT) {
                let key = match value {
                    Value::String(text) => ServiceAccountKey::from_json_str(text)?,
                    other => ServiceAccountKey::from_value(other.clone())?,
                };
                return Ok((key, CredentialSource::Secret(SECRET_SERVICE_ACCOUNT)));
            }
        }
        Edition::V2 => {
            if let Some(text) = secrets.get_text(SECRET_GOOGLE_JSON) {
                let key = ServiceAccountKey::from_json_str(&text)?;
                return Ok((key, CredentialSource::Secret(SECRET_GOOGLE_JSON)));
            }
        }
        Edition::V3 => {
            let content = secrets
                .get_text(SECRET_FILE_CONTENT)
                .or_else(|| secrets.get_text(SECRET_GOOGLE_JSON));
            if let Some(content) = content {
                fs::write(credentials_path, content)?;
                info!(
                    "credentials materialized to {}",
                    credentials_path.display()
                );
            }
        }
    }

    let key = ServiceAccountKey::from_file(credentials_path)?;
    Ok((key, CredentialSource::File))
}
