//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::presentation::TextReply;
use crate::sheets::{SheetValues, SheetsError, SheetsLedger};
use crate::state_machine::{ChatId, SaleRecord};
use crate::telegram::{ParseMode, PhotoUpload, SendMessage, TelegramClient, TelegramError};
use async_trait::async_trait;
use std::sync::Arc;

/// Outbound side of the chat
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a text message
    async fn send_text(&self, chat_id: ChatId, reply: &TextReply) -> Result<(), TelegramError>;

    /// Upload and send a photo
    async fn send_photo(&self, chat_id: ChatId, photo: &PhotoUpload) -> Result<(), TelegramError>;

    /// Acknowledge a button press
    async fn answer_callback(&self, callback_id: &str) -> Result<(), TelegramError>;
}

/// Append-only ledger of completed sales
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Append one sale, writing the header first if the store is empty
    async fn append(&self, sale: &SaleRecord) -> Result<(), SheetsError>;
}

/// Delivery of operator notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, operator: ChatId, text: &str) -> Result<(), TelegramError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ChatTransport + ?Sized> ChatTransport for Arc<T> {
    async fn send_text(&self, chat_id: ChatId, reply: &TextReply) -> Result<(), TelegramError> {
        (**self).send_text(chat_id, reply).await
    }

    async fn send_photo(&self, chat_id: ChatId, photo: &PhotoUpload) -> Result<(), TelegramError> {
        (**self).send_photo(chat_id, photo).await
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TelegramError> {
        (**self).answer_callback(callback_id).await
    }
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    async fn append(&self, sale: &SaleRecord) -> Result<(), SheetsError> {
        (**self).append(sale).await
    }
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn notify(&self, operator: ChatId, text: &str) -> Result<(), TelegramError> {
        (**self).notify(operator, text).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use the Bot API client as the chat transport
#[derive(Clone)]
pub struct BotApiTransport {
    client: Arc<TelegramClient>,
}

impl BotApiTransport {
    pub fn new(client: Arc<TelegramClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChatTransport for BotApiTransport {
    async fn send_text(&self, chat_id: ChatId, reply: &TextReply) -> Result<(), TelegramError> {
        let request = SendMessage {
            chat_id,
            text: reply.text.clone(),
            parse_mode: reply.parse_mode,
            reply_markup: reply.keyboard.clone(),
        };
        self.client.send_message(&request).await.map(|_| ())
    }

    async fn send_photo(&self, chat_id: ChatId, photo: &PhotoUpload) -> Result<(), TelegramError> {
        self.client.send_photo(chat_id, photo).await.map(|_| ())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TelegramError> {
        self.client.answer_callback_query(callback_id).await
    }
}

/// Adapter that notifies the operator through the same bot
#[derive(Clone)]
pub struct OperatorChatNotifier {
    client: Arc<TelegramClient>,
}

impl OperatorChatNotifier {
    pub fn new(client: Arc<TelegramClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for OperatorChatNotifier {
    async fn notify(&self, operator: ChatId, text: &str) -> Result<(), TelegramError> {
        let request = SendMessage {
            chat_id: operator,
            text: text.to_string(),
            parse_mode: Some(ParseMode::Markdown),
            reply_markup: None,
        };
        self.client.send_message(&request).await.map(|_| ())
    }
}

#[async_trait]
impl<V: SheetValues + 'static> RecordStore for SheetsLedger<V> {
    async fn append(&self, sale: &SaleRecord) -> Result<(), SheetsError> {
        SheetsLedger::append(self, sale).await
    }
}
