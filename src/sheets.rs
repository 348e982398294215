//! Google Sheets sales ledger
//!
//! Appends one row per completed sale to the first sheet of the configured
//! spreadsheet, writing a header row first if the sheet is empty.

mod auth;

pub use auth::ServiceAccountKey;

use auth::ServiceAccountAuth;
use crate::config::SheetsConfig;
use crate::state_machine::SaleRecord;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Column titles written to an empty sheet
pub const HEADER_ROW: [&str; 6] = [
    "Дата",
    "ФИО",
    "Телефон",
    "Telegram ID",
    "Username",
    "Мастер-класс",
];

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("service account credentials: {0}")]
    Credentials(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("sheets request failed{}: {message}", .status.map_or_else(String::new, |s| format!(" (HTTP {s})")))]
    Http { status: Option<u16>, message: String },
    #[error("unexpected sheets response: {0}")]
    Decode(String),
}

impl SheetsError {
    pub fn http(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }
}

/// Row for one sale, in header order
pub fn sale_row(sale: &SaleRecord) -> Vec<Value> {
    vec![
        Value::from(sale.formatted_timestamp()),
        Value::from(sale.name.clone()),
        Value::from(sale.phone.clone()),
        Value::from(sale.user_id),
        Value::from(sale.username_or_placeholder()),
        Value::from(sale.event_name.clone()),
    ]
}

fn header_row() -> Vec<Value> {
    HEADER_ROW.iter().map(|h| Value::from(*h)).collect()
}

#[derive(Debug, Serialize)]
struct ValueRangeBody {
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// The two values calls the ledger makes against a spreadsheet
#[async_trait]
pub trait SheetValues: Send + Sync {
    /// Whether the top-left cell of the first sheet is empty
    async fn first_cell_empty(&self) -> Result<bool, SheetsError>;

    /// Append one row after the last non-empty row of the first sheet
    async fn append_row(&self, row: Vec<Value>) -> Result<(), SheetsError>;
}

/// Minimal Sheets v4 values client
pub struct SheetsClient {
    http: Client,
    auth: ServiceAccountAuth,
    spreadsheet_id: String,
    api_url: String,
}

impl SheetsClient {
    pub fn new(config: &SheetsConfig, key: ServiceAccountKey) -> Result<Self, SheetsError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SheetsError::http(None, format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            auth: ServiceAccountAuth::new(key, http.clone()),
            http,
            spreadsheet_id: config.spreadsheet_id.clone(),
            api_url: SHEETS_API_URL.to_string(),
        })
    }

    fn values_url(&self, range: &str) -> String {
        format!("{}/{}/values/{range}", self.api_url, self.spreadsheet_id)
    }

    async fn check(response: reqwest::Response) -> Result<String, SheetsError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SheetsError::http(Some(status.as_u16()), e.to_string()))?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(SheetsError::http(Some(status.as_u16()), body))
        }
    }
}

#[async_trait]
impl SheetValues for SheetsClient {
    async fn first_cell_empty(&self) -> Result<bool, SheetsError> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .get(self.values_url("A1:A1"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SheetsError::http(None, e.to_string()))?;

        let body = Self::check(response).await?;
        let range: ValueRange =
            serde_json::from_str(&body).map_err(|e| SheetsError::Decode(e.to_string()))?;

        Ok(range
            .values
            .first()
            .and_then(|row| row.first())
            .map_or(true, |cell| cell.as_str().is_some_and(str::is_empty)))
    }

    /// Values are stored raw so phone numbers are never parsed as formulas
    async fn append_row(&self, row: Vec<Value>) -> Result<(), SheetsError> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .post(format!("{}:append", self.values_url("A1")))
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .bearer_auth(token)
            .json(&ValueRangeBody { values: vec![row] })
            .send()
            .await
            .map_err(|e| SheetsError::http(None, e.to_string()))?;

        Self::check(response).await.map(|_| ())
    }
}

/// Append-only ledger of sales
pub struct SheetsLedger<V = SheetsClient> {
    values: V,
    /// Set once the header has been verified for this process
    header_checked: Mutex<bool>,
}

impl SheetsLedger {
    pub fn from_config(config: &SheetsConfig) -> Result<Self, SheetsError> {
        let key = ServiceAccountKey::from_file(&config.credentials_path)?;
        let client = SheetsClient::new(config, key)?;
        tracing::info!(
            spreadsheet = %config.spreadsheet_id,
            account = %client.auth.client_email(),
            "Sheets ledger configured"
        );
        Ok(Self::new(client))
    }
}

impl<V: SheetValues> SheetsLedger<V> {
    pub fn new(values: V) -> Self {
        Self {
            values,
            header_checked: Mutex::new(false),
        }
    }

    /// Write the header row if the sheet is still empty. Holding the lock
    /// across check and write keeps concurrent first sales from writing it
    /// twice. A failed check is retried on the next sale.
    async fn ensure_header(&self) -> Result<(), SheetsError> {
        let mut checked = self.header_checked.lock().await;
        if *checked {
            return Ok(());
        }
        if self.values.first_cell_empty().await? {
            self.values.append_row(header_row()).await?;
            tracing::info!("Wrote header row to empty sheet");
        }
        *checked = true;
        Ok(())
    }

    pub async fn append(&self, sale: &SaleRecord) -> Result<(), SheetsError> {
        self.ensure_header().await?;
        self.values.append_row(sale_row(sale)).await?;
        tracing::info!(user_id = sale.user_id, "Saved sale to spreadsheet");
        Ok(())
    }
}
