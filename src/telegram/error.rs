//! Telegram error types

use std::time::Duration;
use thiserror::Error;

/// Bot API error with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TelegramError {
    pub kind: TelegramErrorKind,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl TelegramError {
    pub fn new(kind: TelegramErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TelegramErrorKind::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(TelegramErrorKind::RateLimit, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(TelegramErrorKind::Api, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(TelegramErrorKind::Decode, message)
    }

    /// Map a reqwest failure. The request URL embeds the bot token, so it
    /// is stripped before the error is rendered anywhere.
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        let error = error.without_url();
        if error.is_timeout() {
            Self::network(format!("Request timeout: {error}"))
        } else if error.is_connect() {
            Self::network(format!("Connection failed: {error}"))
        } else if error.is_decode() {
            Self::decode(format!("Failed to decode response: {error}"))
        } else {
            Self::network(format!("Request failed: {error}"))
        }
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelegramErrorKind {
    /// Timeouts, connection failures
    Network,
    /// 429 Too Many Requests
    RateLimit,
    /// The Bot API rejected the call (bad chat, bad markup, blocked bot)
    Api,
    /// Response body did not match the expected shape
    Decode,
}

impl TelegramErrorKind {
    /// Whether the poll loop should treat this as a transient outage
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Network | Self::RateLimit)
    }
}
