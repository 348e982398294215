//! Telegram Bot API client
//!
//! A thin HTTPS client over the handful of Bot API methods the bot uses.

mod error;
pub mod types;

pub use error::{TelegramError, TelegramErrorKind};
pub use types::{
    CallbackQuery, InlineKeyboardMarkup, Message, ParseMode, PhotoUpload, SendMessage, Update,
    User,
};

use crate::config::TelegramConfig;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use types::{AnswerCallbackQuery, ApiResponse, DeleteWebhook, GetUpdates};

/// Seconds a `getUpdates` call may be held open by the server
pub const POLL_TIMEOUT_SECS: u64 = 30;

/// Per-request timeout, with headroom over the long-poll window
const REQUEST_TIMEOUT: Duration = Duration::from_secs(POLL_TIMEOUT_SECS + 15);

pub struct TelegramClient {
    client: Client,
    /// `{api_url}/bot{token}`; never logged
    base_url: String,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, TelegramError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(TelegramError::from_reqwest)?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", config.api_url.trim_end_matches('/'), config.token),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    /// Call a JSON method and unwrap the Bot API envelope
    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, TelegramError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.method_url(method))
            .json(params)
            .send()
            .await
            .map_err(TelegramError::from_reqwest)?;

        Self::decode(method, response).await
    }

    async fn decode<R: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<R, TelegramError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(TelegramError::from_reqwest)?;

        let envelope: ApiResponse<R> = serde_json::from_str(&body).map_err(|e| {
            TelegramError::decode(format!(
                "{method}: failed to parse response (HTTP {status}): {e}"
            ))
        })?;

        if envelope.ok {
            return envelope
                .result
                .ok_or_else(|| TelegramError::decode(format!("{method}: ok response without result")));
        }

        Err(classify_error(method, &envelope))
    }

    /// Long-poll for new updates starting at `offset`
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, TelegramError> {
        let params = GetUpdates {
            offset,
            timeout: POLL_TIMEOUT_SECS,
            allowed_updates: vec!["message", "callback_query"],
        };
        self.call("getUpdates", &params).await
    }

    pub async fn send_message(&self, request: &SendMessage) -> Result<Message, TelegramError> {
        self.call("sendMessage", request).await
    }

    /// Upload a photo from memory
    pub async fn send_photo(
        &self,
        chat_id: i64,
        photo: &PhotoUpload,
    ) -> Result<Message, TelegramError> {
        let mime = mime_guess::from_path(&photo.file_name).first_or_octet_stream();
        let part = Part::bytes(photo.bytes.clone())
            .file_name(photo.file_name.clone())
            .mime_str(mime.as_ref())
            .map_err(TelegramError::from_reqwest)?;

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("photo", part);
        if let Some(caption) = &photo.caption {
            form = form.text("caption", caption.clone());
        }
        if let Some(mode) = photo.parse_mode {
            form = form.text("parse_mode", mode.as_str());
        }
        if let Some(markup) = &photo.reply_markup {
            let markup = serde_json::to_string(markup)
                .map_err(|e| TelegramError::decode(format!("sendPhoto: bad reply markup: {e}")))?;
            form = form.text("reply_markup", markup);
        }

        let response = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(TelegramError::from_reqwest)?;

        Self::decode("sendPhoto", response).await
    }

    /// Stop the client-side spinner on a pressed button
    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), TelegramError> {
        let _: bool = self
            .call("answerCallbackQuery", &AnswerCallbackQuery { callback_query_id })
            .await?;
        Ok(())
    }

    /// Switch to polling mode, optionally discarding updates queued while
    /// the bot was down
    pub async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<(), TelegramError> {
        let _: bool = self
            .call("deleteWebhook", &DeleteWebhook { drop_pending_updates })
            .await?;
        Ok(())
    }

    /// The bot's own account
    pub async fn get_me(&self) -> Result<User, TelegramError> {
        self.call("getMe", &serde_json::json!({})).await
    }
}

fn classify_error<R>(method: &str, envelope: &ApiResponse<R>) -> TelegramError {
    let description = envelope
        .description
        .clone()
        .unwrap_or_else(|| "no description".to_string());
    let message = match envelope.error_code {
        Some(code) => format!("{method} failed ({code}): {description}"),
        None => format!("{method} failed: {description}"),
    };

    match envelope.error_code {
        Some(429) => {
            let err = TelegramError::rate_limit(message);
            match envelope.parameters.as_ref().and_then(|p| p.retry_after) {
                Some(secs) => err.with_retry_after(Duration::from_secs(secs)),
                None => err,
            }
        }
        Some(500..=599) => TelegramError::network(message),
        _ => TelegramError::api(message),
    }
}
