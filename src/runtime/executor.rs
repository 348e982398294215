//! Per-buyer session executor

use super::traits::{ChatTransport, Notifier, RecordStore};
use super::{retire, Inbound, SessionMap};

use crate::presentation::{upload_name, PhotoReply, Presentation, Reply};
use crate::sheets::SheetsError;
use crate::state_machine::{
    transition, ChatId, Effect, Event, FlowState, SessionContext, UpdateContext,
};
use crate::telegram::{PhotoUpload, TelegramError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// A failed effect. These are logged and swallowed by the runtime; the
/// flow always carries on.
#[derive(Debug, Error)]
pub enum EffectError {
    #[error("chat send failed: {0}")]
    Transport(#[source] TelegramError),
    #[error("record store append failed: {0}")]
    RecordStore(#[source] SheetsError),
    #[error("operator notification failed: {0}")]
    Notifier(#[source] TelegramError),
}

/// Shared collaborators, cloned into every session
pub struct Services<T, R, N> {
    pub transport: Arc<T>,
    pub records: Arc<R>,
    pub notifier: Arc<N>,
    pub presentation: Arc<Presentation>,
    /// Chat that receives sale notifications
    pub operator_chat_id: ChatId,
}

impl<T, R, N> Services<T, R, N> {
    pub fn new(
        transport: T,
        records: R,
        notifier: N,
        presentation: Presentation,
        operator_chat_id: ChatId,
    ) -> Self {
        Self {
            transport: Arc::new(transport),
            records: Arc::new(records),
            notifier: Arc::new(notifier),
            presentation: Arc::new(presentation),
            operator_chat_id,
        }
    }
}

impl<T, R, N> Clone for Services<T, R, N> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            records: Arc::clone(&self.records),
            notifier: Arc::clone(&self.notifier),
            presentation: Arc::clone(&self.presentation),
            operator_chat_id: self.operator_chat_id,
        }
    }
}

/// Runtime for one buyer's session. Events are handled strictly one at a
/// time, so the session state needs no locking.
pub struct SessionRuntime<T, R, N>
where
    T: ChatTransport + 'static,
    R: RecordStore + 'static,
    N: Notifier + 'static,
{
    context: SessionContext,
    state: FlowState,
    services: Services<T, R, N>,
}

impl<T, R, N> SessionRuntime<T, R, N>
where
    T: ChatTransport + 'static,
    R: RecordStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(context: SessionContext, services: Services<T, R, N>) -> Self {
        Self {
            context,
            state: FlowState::Idle,
            services,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// Handle updates until the buyer is back at idle with nothing queued,
    /// then leave the registry so the next update starts a fresh session.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<Inbound>, sessions: SessionMap) {
        tracing::debug!(user_id = self.context.user_id, "Starting session runtime");

        while let Some(Inbound { update, event }) = event_rx.recv().await {
            let failures = self.handle(&update, event).await;
            if !failures.is_empty() {
                tracing::warn!(
                    user_id = self.context.user_id,
                    failed = failures.len(),
                    "Session step completed with failed effects"
                );
            }

            if self.state == FlowState::Idle
                && retire(&sessions, self.context.user_id, &mut event_rx).await
            {
                break;
            }
        }

        tracing::debug!(user_id = self.context.user_id, "Session runtime stopped");
    }

    /// Apply one inbound event. Returns the effects that failed; every
    /// failure has already been logged.
    pub async fn handle(&mut self, update: &UpdateContext, event: Event) -> Vec<EffectError> {
        let mut failures = Vec::new();

        if let Some(callback_id) = &update.callback_id {
            if let Err(e) = self.services.transport.answer_callback(callback_id).await {
                tracing::warn!(error = %e, "Failed to acknowledge button press");
                failures.push(EffectError::Transport(e));
            }
        }

        let result = transition(&self.state, &self.context, update, event);

        tracing::info!(
            user_id = self.context.user_id,
            from = self.state.label(),
            to = result.new_state.label(),
            effects = result.effects.len(),
            "Session transition"
        );
        self.state = result.new_state;

        for effect in result.effects {
            if let Err(e) = self.execute_effect(update, effect).await {
                tracing::error!(user_id = self.context.user_id, error = %e, "Effect failed");
                failures.push(e);
            }
        }

        failures
    }

    async fn execute_effect(
        &self,
        update: &UpdateContext,
        effect: Effect,
    ) -> Result<(), EffectError> {
        match effect {
            Effect::Reply(prompt) => match self.services.presentation.render(&prompt) {
                Some(reply) => self.deliver(update.chat_id, reply).await,
                None => Ok(()),
            },

            Effect::RecordSale(sale) => {
                self.services
                    .records
                    .append(&sale)
                    .await
                    .map_err(EffectError::RecordStore)
            }

            Effect::NotifyOperator(sale) => {
                let text = self.services.presentation.operator_notice(&sale);
                self.services
                    .notifier
                    .notify(self.services.operator_chat_id, &text)
                    .await
                    .map_err(EffectError::Notifier)?;
                tracing::info!(user_id = sale.user_id, "Operator notified of sale");
                Ok(())
            }
        }
    }

    async fn deliver(&self, chat_id: ChatId, reply: Reply) -> Result<(), EffectError> {
        match reply {
            Reply::Text(text) => self
                .services
                .transport
                .send_text(chat_id, &text)
                .await
                .map_err(EffectError::Transport),
            Reply::Photo(photo) => self.deliver_photo(chat_id, photo).await,
        }
    }

    /// Send an image, substituting its text fallback when the file is
    /// missing or the upload is rejected.
    async fn deliver_photo(&self, chat_id: ChatId, photo: PhotoReply) -> Result<(), EffectError> {
        let transport = &self.services.transport;

        let upload_error = match tokio::fs::read(&photo.path).await {
            Ok(bytes) => {
                let upload = PhotoUpload {
                    file_name: upload_name(&photo.path),
                    bytes,
                    caption: photo.caption,
                    parse_mode: photo.parse_mode,
                    reply_markup: photo.keyboard,
                };
                match transport.send_photo(chat_id, &upload).await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        tracing::warn!(path = %photo.path.display(), error = %e, "Photo upload failed");
                        Some(e)
                    }
                }
            }
            Err(e) => {
                tracing::debug!(path = %photo.path.display(), error = %e, "Image asset unavailable");
                None
            }
        };

        match (photo.fallback, upload_error) {
            (Some(fallback), _) => transport
                .send_text(chat_id, &fallback)
                .await
                .map_err(EffectError::Transport),
            (None, Some(e)) => Err(EffectError::Transport(e)),
            (None, None) => Ok(()),
        }
    }
}
