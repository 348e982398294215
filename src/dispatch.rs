//! Inbound update routing
//!
//! Long-polls the Bot API, turns each update into a flow event and hands it
//! to the buyer's session.

use crate::presentation::callback;
use crate::runtime::{ChatTransport, Inbound, Notifier, RecordStore, RuntimeManager};
use crate::state_machine::{Event, UpdateContext};
use crate::telegram::{CallbackQuery, Message, TelegramClient, TelegramError, Update};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pause after a failed poll when the server gives no hint
const POLL_ERROR_PAUSE: Duration = Duration::from_secs(3);

/// Map an update to the event it carries. Updates the flow does not react
/// to (other bots, stickers, unknown commands) yield `None`.
pub fn classify(update: &Update, bot_username: &str) -> Option<Inbound> {
    if let Some(query) = &update.callback_query {
        return classify_callback(query);
    }
    update
        .message
        .as_ref()
        .and_then(|message| classify_message(message, bot_username))
}

fn classify_callback(query: &CallbackQuery) -> Option<Inbound> {
    if query.from.is_bot {
        return None;
    }

    let event = match query.data.as_deref().unwrap_or_default() {
        callback::BUY => Event::Buy,
        callback::PAID => Event::Paid,
        callback::RESTART => Event::Restart,
        other => Event::UnknownAction(other.to_string()),
    };
    let chat_id = query
        .message
        .as_ref()
        .map_or(query.from.id, |m| m.chat.id);

    Some(Inbound {
        update: UpdateContext::new(query.from.id, chat_id)
            .with_username(query.from.username.clone())
            .with_callback(query.id.clone()),
        event,
    })
}

fn classify_message(message: &Message, bot_username: &str) -> Option<Inbound> {
    let from = message.from.as_ref().filter(|u| !u.is_bot)?;
    let text = message.text.as_deref()?;

    let event = match text.strip_prefix('/') {
        Some(command) => classify_command(command, bot_username)?,
        None => Event::Text(text.to_string()),
    };

    Some(Inbound {
        update: UpdateContext::new(from.id, message.chat.id).with_username(from.username.clone()),
        event,
    })
}

/// `start`, `cancel`, optionally addressed as `start@bot_name`
fn classify_command(command: &str, bot_username: &str) -> Option<Event> {
    let word = command.split_whitespace().next().unwrap_or_default();
    let (name, target) = match word.split_once('@') {
        Some((name, target)) => (name, Some(target)),
        None => (word, None),
    };
    if target.is_some_and(|t| !t.eq_ignore_ascii_case(bot_username)) {
        return None;
    }

    match name {
        "start" => Some(Event::Start),
        "cancel" => Some(Event::Cancel),
        _ => None,
    }
}

/// Offset acknowledging every update in `updates`
fn next_offset(current: Option<i64>, updates: &[Update]) -> Option<i64> {
    updates
        .iter()
        .map(|u| u.update_id + 1)
        .max()
        .max(current)
}

fn poll_pause(error: &TelegramError) -> Duration {
    error.retry_after.unwrap_or(POLL_ERROR_PAUSE)
}

/// Long-poll loop feeding the runtime manager
pub struct Poller<T, R, N>
where
    T: ChatTransport + 'static,
    R: RecordStore + 'static,
    N: Notifier + 'static,
{
    client: Arc<TelegramClient>,
    manager: Arc<RuntimeManager<T, R, N>>,
    bot_username: String,
}

impl<T, R, N> Poller<T, R, N>
where
    T: ChatTransport + 'static,
    R: RecordStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        client: Arc<TelegramClient>,
        manager: Arc<RuntimeManager<T, R, N>>,
        bot_username: impl Into<String>,
    ) -> Self {
        Self {
            client,
            manager,
            bot_username: bot_username.into(),
        }
    }

    /// Poll until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) {
        let mut offset = None;
        tracing::info!(bot = %self.bot_username, "Polling for updates");

        loop {
            let polled = tokio::select! {
                () = shutdown.cancelled() => break,
                polled = self.client.get_updates(offset) => polled,
            };

            match polled {
                Ok(updates) => {
                    offset = next_offset(offset, &updates);
                    for update in &updates {
                        self.route(update).await;
                    }
                }
                Err(e) => {
                    let pause = poll_pause(&e);
                    if e.kind.is_transient() {
                        tracing::warn!(error = %e, pause_secs = pause.as_secs(), "Polling failed, retrying");
                    } else {
                        tracing::error!(error = %e, pause_secs = pause.as_secs(), "Polling failed, retrying");
                    }
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        () = tokio::time::sleep(pause) => {}
                    }
                }
            }
        }

        tracing::info!("Polling stopped");
    }

    async fn route(&self, update: &Update) {
        match classify(update, &self.bot_username) {
            Some(inbound) => {
                tracing::debug!(
                    update_id = update.update_id,
                    user_id = inbound.update.user_id,
                    event = ?inbound.event,
                    "Routing update"
                );
                self.manager.dispatch(inbound).await;
            }
            None => tracing::debug!(update_id = update.update_id, "Ignoring update"),
        }
    }
}
