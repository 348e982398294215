//! Session state types

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Telegram user identifier
pub type UserId = i64;

/// Telegram chat identifier
pub type ChatId = i64;

// ============================================================================
// Flow State
// ============================================================================

/// Where a buyer is in the purchase flow.
///
/// Collected data lives inside the variant that needs it, so a payment
/// confirmation can only be reached after a name and then a phone were
/// recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowState {
    /// No purchase in progress
    #[default]
    Idle,

    /// Buy pressed, waiting for the buyer's full name
    AwaitingName,

    /// Name recorded, waiting for a phone number
    AwaitingPhone { name: String },

    /// Payment instructions shown, waiting for the "paid" button
    AwaitingPaymentConfirmation { name: String, phone: String },
}

impl FlowState {
    /// Name recorded so far, if any
    #[cfg(test)]
    pub fn name(&self) -> Option<&str> {
        match self {
            FlowState::AwaitingPhone { name }
            | FlowState::AwaitingPaymentConfirmation { name, .. } => Some(name),
            FlowState::Idle | FlowState::AwaitingName => None,
        }
    }

    /// Phone recorded so far, if any
    #[cfg(test)]
    pub fn phone(&self) -> Option<&str> {
        match self {
            FlowState::AwaitingPaymentConfirmation { phone, .. } => Some(phone),
            _ => None,
        }
    }

    /// Short name for logs
    pub fn label(&self) -> &'static str {
        match self {
            FlowState::Idle => "idle",
            FlowState::AwaitingName => "awaiting_name",
            FlowState::AwaitingPhone { .. } => "awaiting_phone",
            FlowState::AwaitingPaymentConfirmation { .. } => "awaiting_payment_confirmation",
        }
    }
}

// ============================================================================
// Contexts
// ============================================================================

/// Immutable per-session configuration
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user_id: UserId,
    /// Event the tickets are sold for, copied into every sale
    pub event_name: String,
}

impl SessionContext {
    pub fn new(user_id: UserId, event_name: impl Into<String>) -> Self {
        Self {
            user_id,
            event_name: event_name.into(),
        }
    }
}

/// Metadata that arrives with each inbound update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateContext {
    pub user_id: UserId,
    pub username: Option<String>,
    /// Chat the replies go to
    pub chat_id: ChatId,
    /// Set when the update is a button press that must be acknowledged
    pub callback_id: Option<String>,
    pub received_at: DateTime<Local>,
}

impl UpdateContext {
    pub fn new(user_id: UserId, chat_id: ChatId) -> Self {
        Self {
            user_id,
            username: None,
            chat_id,
            callback_id: None,
            received_at: Local::now(),
        }
    }

    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username.filter(|u| !u.is_empty());
        self
    }

    pub fn with_callback(mut self, callback_id: impl Into<String>) -> Self {
        self.callback_id = Some(callback_id.into());
        self
    }

    #[cfg(test)]
    pub fn at(mut self, received_at: DateTime<Local>) -> Self {
        self.received_at = received_at;
        self
    }
}

// ============================================================================
// Sale Record
// ============================================================================

/// Placeholder written when the buyer has no public username
pub const USERNAME_PLACEHOLDER: &str = "—";

/// One completed purchase, produced exactly once per finished flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleRecord {
    pub timestamp: DateTime<Local>,
    pub name: String,
    pub phone: String,
    pub user_id: UserId,
    pub username: Option<String>,
    pub event_name: String,
}

impl SaleRecord {
    pub const TIMESTAMP_FORMAT: &'static str = "%d.%m.%Y %H:%M";

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(Self::TIMESTAMP_FORMAT).to_string()
    }

    /// `@username`, or a dash when the buyer has none
    pub fn username_or_placeholder(&self) -> String {
        match self.username.as_deref() {
            Some(username) if !username.is_empty() => format!("@{username}"),
            _ => USERNAME_PLACEHOLDER.to_string(),
        }
    }

    pub fn given_name(&self) -> &str {
        given_name(&self.name)
    }
}

/// Name used in the personal greeting.
///
/// Names are entered as "Surname Given Patronymic", so with more than one
/// token the second is used; a single token is used as is.
pub fn given_name(full_name: &str) -> &str {
    let mut tokens = full_name.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (_, Some(second)) => second,
        (Some(first), None) => first,
        (None, None) => full_name.trim(),
    }
}
