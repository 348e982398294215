//! Process configuration
//!
//! Credentials and identities come from the environment; the event being
//! sold is compiled in.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_CREDENTIALS_PATH: &str = "credentials.json";

/// Configuration errors are only raised at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Telegram Bot API access
#[derive(Clone)]
pub struct TelegramConfig {
    pub token: String,
    pub api_url: String,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Spreadsheet that receives one row per sale
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    /// Service-account key file
    pub credentials_path: PathBuf,
}

/// Everything read from the environment at startup
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram: TelegramConfig,
    /// Chat that receives sale notifications
    pub operator_chat_id: i64,
    pub sheets: SheetsConfig,
    /// Directory the event images are resolved against
    pub assets_dir: PathBuf,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let token = require("BOT_TOKEN")?;
        let operator_chat_id = require("ADMIN_CHAT_ID")?
            .parse::<i64>()
            .map_err(|e| ConfigError::Invalid {
                name: "ADMIN_CHAT_ID",
                reason: e.to_string(),
            })?;
        let spreadsheet_id = require("GOOGLE_SHEET_ID")?;

        Ok(Self {
            telegram: TelegramConfig {
                token,
                api_url: get("TELEGRAM_API_URL")
                    .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.to_string()),
            },
            operator_chat_id,
            sheets: SheetsConfig {
                spreadsheet_id,
                credentials_path: get("GOOGLE_CREDENTIALS")
                    .map_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_PATH), PathBuf::from),
            },
            assets_dir: get("TICKET_BOT_ASSETS").map_or_else(|| PathBuf::from("."), PathBuf::from),
        })
    }
}

// ============================================================================
// Event metadata
// ============================================================================

/// The one-time event tickets are sold for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInfo {
    pub name: String,
    /// Human-readable date, shown in the thank-you message
    pub date: String,
    pub payment_link: String,
    /// Shown under the payment QR code
    pub payee_caption: String,
    /// Directions to the venue
    pub location: String,
    /// Channel the bot belongs to, shown in the welcome
    pub channel: String,
    pub welcome_image: Option<PathBuf>,
    pub qr_image: Option<PathBuf>,
    pub location_image: Option<PathBuf>,
}

impl Default for EventInfo {
    fn default() -> Self {
        Self {
            name: "Мезоамериканская Масленица".to_string(),
            date: "21 февраля в 12:00".to_string(),
            payment_link: "https://www.tinkoff.ru/rm/r_bGudilgQdb.LnPDXEEDwC/gFnDK18010"
                .to_string(),
            payee_caption: "Секачева Дарья Сергеевна\nНомер договора 5053221965".to_string(),
            location: "📍 Как добраться:\n\n\
                       Электродный проезд 16\n\n\
                       🚇 Метро Шоссе Энтузиастов (выход 4)\n\n\
                       🚪 Вход №2 (со стороны дороги-4, козырек слева)\n\
                       Код: 2580#\n\n\
                       ⬆️ Второй этаж, налево и до конца"
                .to_string(),
            channel: "Майянистика без мистики".to_string(),
            welcome_image: Some(PathBuf::from("maya_welcome.jpg")),
            qr_image: Some(PathBuf::from("qr_code.jpg")),
            location_image: Some(PathBuf::from("location.jpg")),
        }
    }
}
