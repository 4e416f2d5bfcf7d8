//! Google Sheets backend over the v4 REST API, authorized with a service account.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use log::{debug, info};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::credentials::ServiceAccountKey;
use crate::error::RemoteError;
use crate::remote::{Document, RemoteResult, SpreadsheetService, Worksheet, a1};

const SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive";
const SHEETS_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";
const TOKEN_LIFETIME: u64 = 3600;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// cell updates are interpreted like typed input, bulk writes are stored verbatim
const USER_ENTERED: &str = "USER_ENTERED";
const RAW: &str = "RAW";

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    refresh_at: SystemTime,
}

/// Exchanges signed assertions for access tokens and caches them until shortly before
/// they expire.
struct Authorizer {
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    http: Client,
    token: Mutex<Option<CachedToken>>,
}

impl Authorizer {
    fn new(key: ServiceAccountKey) -> RemoteResult<Self> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| RemoteError::Auth(format!("unusable private key: {e}")))?;
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Authorizer {
            key,
            signing_key,
            http,
            token: Mutex::new(None),
        })
    }

    fn bearer(&self) -> RemoteResult<String> {
        let mut cached = self.token.lock().expect("token cache poisoned");
        if let Some(token) = cached.as_ref() {
            if SystemTime::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.fetch_token()?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    fn fetch_token(&self) -> RemoteResult<CachedToken> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| RemoteError::Auth(e.to_string()))?
            .as_secs();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SCOPES,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME,
        };
        let mut header = Header::new(Algorithm::RS256);
        if !self.key.private_key_id.is_empty() {
            header.kid = Some(self.key.private_key_id.clone());
        }
        let assertion = jsonwebtoken::encode(&header, &claims, &self.signing_key)
            .map_err(|e| RemoteError::Auth(format!("could not sign assertion: {e}")))?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(RemoteError::Auth(format!("token endpoint returned {status}: {body}")));
        }
        let token: TokenResponse = response.json()?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(TOKEN_LIFETIME));
        debug!("access token issued for {}", self.key.client_email);

        Ok(CachedToken {
            value: token.access_token,
            refresh_at: SystemTime::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
        })
    }

    fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = request.bearer_auth(self.bearer()?).send()?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body: Value = response.json().unwrap_or(Value::Null);
        let message = body["error"]["message"]
            .as_str()
            .unwrap_or("no error message")
            .to_string();
        Err(RemoteError::Api { status, message })
    }
}

/// Handle to the Sheets and Drive APIs for one service account.
#[derive(Clone)]
pub struct SheetsApiService {
    auth: Arc<Authorizer>,
}

impl SheetsApiService {
    /// Build the client and fetch a first access token, so bad credentials fail here
    /// rather than on the first read.
    pub fn authorize(key: ServiceAccountKey) -> RemoteResult<Self> {
        let auth = Authorizer::new(key)?;
        auth.bearer()?;
        info!("authorized as {}", auth.key.client_email);
        Ok(SheetsApiService {
            auth: Arc::new(auth),
        })
    }
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

impl SpreadsheetService for SheetsApiService {
    fn open(&self, document_name: &str) -> RemoteResult<Arc<dyn Document>> {
        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            document_name.replace('\\', "\\\\").replace('\'', "\\'"),
            SPREADSHEET_MIME
        );
        let request = self.auth.http.get(DRIVE_FILES_URL).query(&[
            ("q", query.as_str()),
            ("fields", "files(id,name)"),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ]);
        let list: DriveFileList = self.auth.send(request)?.json()?;
        let file = list
            .files
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::DocumentNotFound(document_name.to_string()))?;

        Ok(Arc::new(SheetsDocument {
            id: file.id,
            title: file.name,
            auth: self.auth.clone(),
        }))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

pub struct SheetsDocument {
    id: String,
    title: String,
    auth: Arc<Authorizer>,
}

impl SheetsDocument {
    fn tab(&self, title: String) -> Arc<dyn Worksheet> {
        Arc::new(SheetsWorksheet {
            spreadsheet_id: self.id.clone(),
            title,
            auth: self.auth.clone(),
        })
    }
}

impl Document for SheetsDocument {
    fn title(&self) -> String {
        self.title.clone()
    }

    fn url(&self) -> Option<String> {
        Some(format!("https://docs.google.com/spreadsheets/d/{}", self.id))
    }

    fn worksheets(&self) -> RemoteResult<Vec<String>> {
        let request = self
            .auth
            .http
            .get(format!("{SHEETS_URL}/{}", self.id))
            .query(&[("fields", "sheets.properties.title")]);
        let meta: SpreadsheetMeta = self.auth.send(request)?.json()?;
        Ok(meta.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    fn worksheet(&self, title: &str) -> RemoteResult<Arc<dyn Worksheet>> {
        if self.worksheets()?.iter().any(|t| t == title) {
            Ok(self.tab(title.to_string()))
        } else {
            Err(RemoteError::WorksheetNotFound(title.to_string()))
        }
    }

    fn first_worksheet(&self) -> RemoteResult<Arc<dyn Worksheet>> {
        let title = self
            .worksheets()?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::WorksheetNotFound("<first>".to_string()))?;
        Ok(self.tab(title))
    }

    fn add_worksheet(&self, title: &str, rows: u32, cols: u32) -> RemoteResult<Arc<dyn Worksheet>> {
        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": { "rowCount": rows, "columnCount": cols }
                    }
                }
            }]
        });
        let request = self
            .auth
            .http
            .post(format!("{SHEETS_URL}/{}:batchUpdate", self.id))
            .json(&body);
        let reply: Value = self.auth.send(request)?.json()?;
        let created = reply["replies"][0]["addSheet"]["properties"]["title"]
            .as_str()
            .ok_or_else(|| RemoteError::Protocol("addSheet reply without a title".to_string()))?;
        info!("worksheet {created} added to {}", self.title);
        Ok(self.tab(created.to_string()))
    }
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

pub struct SheetsWorksheet {
    spreadsheet_id: String,
    title: String,
    auth: Arc<Authorizer>,
}

impl SheetsWorksheet {
    /// Whole-sheet range, e.g. `'Lot 7'` (quotes doubled inside the title).
    fn sheet_range(&self) -> String {
        format!("'{}'", self.title.replace('\'', "''"))
    }

    fn values_url(&self, range: &str, suffix: &str) -> String {
        format!(
            "{SHEETS_URL}/{}/values/{}{suffix}",
            self.spreadsheet_id,
            urlencoding::encode(range)
        )
    }

    fn write(&self, range: &str, values: &[Vec<String>], input: &str) -> RemoteResult<()> {
        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": values,
        });
        let request = self
            .auth
            .http
            .put(self.values_url(range, ""))
            .query(&[("valueInputOption", input)])
            .json(&body);
        self.auth.send(request)?;
        Ok(())
    }
}

impl Worksheet for SheetsWorksheet {
    fn title(&self) -> String {
        self.title.clone()
    }

    fn get_all_values(&self) -> RemoteResult<Vec<Vec<String>>> {
        let request = self
            .auth
            .http
            .get(self.values_url(&self.sheet_range(), ""))
            .query(&[
                ("majorDimension", "ROWS"),
                ("valueRenderOption", "FORMATTED_VALUE"),
            ]);
        let range: ValueRange = self.auth.send(request)?.json()?;
        Ok(range
            .values
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|cell| match cell {
                        Value::String(s) => s,
                        Value::Null => String::new(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .collect())
    }

    fn update_cell(&self, row: u32, col: u32, value: &str) -> RemoteResult<()> {
        if row == 0 || col == 0 {
            return Err(RemoteError::InvalidCell { row, col });
        }
        let range = format!("{}!{}", self.sheet_range(), a1(row, col));
        self.write(&range, &[vec![value.to_string()]], USER_ENTERED)
    }

    fn append_rows(&self, rows: &[Vec<String>]) -> RemoteResult<()> {
        let range = self.sheet_range();
        let request = self
            .auth
            .http
            .post(self.values_url(&range, ":append"))
            .query(&[("valueInputOption", RAW), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "majorDimension": "ROWS", "values": rows }));
        self.auth.send(request)?;
        Ok(())
    }

    fn clear(&self) -> RemoteResult<()> {
        let request = self
            .auth
            .http
            .post(self.values_url(&self.sheet_range(), ":clear"))
            .json(&json!({}));
        self.auth.send(request)?;
        Ok(())
    }

    fn update(&self, values: &[Vec<String>]) -> RemoteResult<()> {
        let range = format!("{}!A1", self.sheet_range());
        self.write(&range, values, RAW)
    }
}
