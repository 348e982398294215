//! Runtime for executing buyer sessions
//!
//! Each buyer gets a dedicated task fed by a channel, so one buyer's updates
//! are handled in order while different buyers proceed concurrently.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{EffectError, Services, SessionRuntime};
pub use traits::*;

use crate::sheets::SheetsLedger;
use crate::state_machine::{Event, SessionContext, UpdateContext, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};

/// Type alias for production services with concrete implementations
pub type ProductionServices = Services<BotApiTransport, SheetsLedger, OperatorChatNotifier>;

/// Queue depth per buyer. Updates beyond it are dropped rather than
/// stalling the poll loop.
const SESSION_QUEUE: usize = 32;

/// One classified update bound for a buyer's session
#[derive(Debug, Clone)]
pub struct Inbound {
    pub update: UpdateContext,
    pub event: Event,
}

/// Handle to interact with a running session
pub struct SessionHandle {
    pub event_tx: mpsc::Sender<Inbound>,
}

/// Live sessions by buyer. Sends happen under the read lock and retirement
/// under the write lock, so an update is never queued to a session that is
/// shutting down.
pub(crate) type SessionMap = Arc<RwLock<HashMap<UserId, SessionHandle>>>;

/// Drop a buyer's session handle if nothing is queued for it. Returns
/// `false` when updates arrived meanwhile and the session must keep going.
pub(crate) async fn retire(
    sessions: &SessionMap,
    user_id: UserId,
    event_rx: &mut mpsc::Receiver<Inbound>,
) -> bool {
    let mut sessions = sessions.write().await;
    if !event_rx.is_empty() {
        return false;
    }
    sessions.remove(&user_id);
    event_rx.close();
    true
}

/// Manager for all buyer sessions
pub struct RuntimeManager<T, R, N>
where
    T: ChatTransport + 'static,
    R: RecordStore + 'static,
    N: Notifier + 'static,
{
    services: Services<T, R, N>,
    sessions: SessionMap,
}

impl<T, R, N> RuntimeManager<T, R, N>
where
    T: ChatTransport + 'static,
    R: RecordStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(services: Services<T, R, N>) -> Self {
        Self {
            services,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start a session task for a buyer
    fn spawn(&self, user_id: UserId) -> SessionHandle {
        let (event_tx, event_rx) = mpsc::channel(SESSION_QUEUE);
        let context = SessionContext::new(
            user_id,
            self.services.presentation.event().name.clone(),
        );
        let runtime = SessionRuntime::new(context, self.services.clone());
        let sessions = Arc::clone(&self.sessions);

        tokio::spawn(async move {
            runtime.run(event_rx, sessions).await;
            tracing::debug!(user_id, "Session task finished");
        });

        tracing::debug!(user_id, "Started session");
        SessionHandle { event_tx }
    }

    /// Queue an update without waiting, creating the session if needed
    async fn try_route(
        &self,
        user_id: UserId,
        inbound: Inbound,
    ) -> Result<(), TrySendError<Inbound>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(handle) = sessions.get(&user_id) {
                return handle.event_tx.try_send(inbound);
            }
        }

        let mut sessions = self.sessions.write().await;
        // Another dispatch may have won the race for the write lock
        sessions
            .entry(user_id)
            .or_insert_with(|| self.spawn(user_id))
            .event_tx
            .try_send(inbound)
    }

    /// Route an inbound update to its buyer's session. Never waits on a
    /// session: a buyer whose queue is full loses the update instead of
    /// holding up everyone else.
    pub async fn dispatch(&self, inbound: Inbound) {
        let user_id = inbound.update.user_id;

        let inbound = match self.try_route(user_id, inbound).await {
            Ok(()) => return,
            Err(TrySendError::Full(inbound)) => {
                tracing::warn!(user_id, event = ?inbound.event, "Session busy, dropped update");
                return;
            }
            Err(TrySendError::Closed(inbound)) => inbound,
        };

        // The session task died; start a fresh one and retry once
        tracing::warn!(user_id, "Session task stopped, restarting");
        {
            let mut sessions = self.sessions.write().await;
            if sessions.get(&user_id).is_some_and(|h| h.event_tx.is_closed()) {
                sessions.remove(&user_id);
            }
        }
        if let Err(e) = self.try_route(user_id, inbound).await {
            tracing::error!(user_id, error = %e, "Dropped update, session unavailable");
        }
    }

    #[cfg(test)]
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
