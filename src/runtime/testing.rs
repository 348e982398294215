//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use crate::presentation::TextReply;
use crate::sheets::SheetsError;
use crate::state_machine::{ChatId, SaleRecord};
use crate::telegram::{PhotoUpload, TelegramError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

// ============================================================================
// Mock Chat Transport
// ============================================================================

/// Something the bot put on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        chat_id: ChatId,
        text: String,
        callbacks: Vec<String>,
    },
    Photo {
        chat_id: ChatId,
        file_name: String,
        caption: Option<String>,
    },
    CallbackAnswer(String),
}

/// Mock transport that records every outbound call
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<Sent>>,
    fail_photos: AtomicBool,
    fail_texts: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every photo upload
    pub fn failing_photos(self) -> Self {
        self.fail_photos.store(true, Ordering::SeqCst);
        self
    }

    /// Reject every text message
    pub fn failing_texts(self) -> Self {
        self.fail_texts.store(true, Ordering::SeqCst);
        self
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Texts sent to `chat_id`, in order
    pub fn texts_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { chat_id: c, text, .. } if c == chat_id => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn photos(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Photo { file_name, .. } => Some(file_name),
                _ => None,
            })
            .collect()
    }

    pub fn answered_callbacks(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::CallbackAnswer(id) => Some(id),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send_text(&self, chat_id: ChatId, reply: &TextReply) -> Result<(), TelegramError> {
        if self.fail_texts.load(Ordering::SeqCst) {
            return Err(TelegramError::network("Mock text failure"));
        }
        self.sent.lock().unwrap().push(Sent::Text {
            chat_id,
            text: reply.text.clone(),
            callbacks: reply
                .keyboard
                .as_ref()
                .map(|k| k.callbacks().into_iter().map(String::from).collect())
                .unwrap_or_default(),
        });
        Ok(())
    }

    async fn send_photo(&self, chat_id: ChatId, photo: &PhotoUpload) -> Result<(), TelegramError> {
        if self.fail_photos.load(Ordering::SeqCst) {
            return Err(TelegramError::api("Bad Request: IMAGE_PROCESS_FAILED"));
        }
        self.sent.lock().unwrap().push(Sent::Photo {
            chat_id,
            file_name: photo.file_name.clone(),
            caption: photo.caption.clone(),
        });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TelegramError> {
        self.sent
            .lock()
            .unwrap()
            .push(Sent::CallbackAnswer(callback_id.to_string()));
        Ok(())
    }
}

// ============================================================================
// Mock Record Store
// ============================================================================

/// In-memory sales ledger
#[derive(Default)]
pub struct MockRecordStore {
    records: Mutex<Vec<SaleRecord>>,
    fail: AtomicBool,
}

impl MockRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let store = Self::default();
        store.fail.store(true, Ordering::SeqCst);
        store
    }

    pub fn records(&self) -> Vec<SaleRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordStore for MockRecordStore {
    async fn append(&self, sale: &SaleRecord) -> Result<(), SheetsError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SheetsError::http(Some(503), "backend unavailable"));
        }
        self.records.lock().unwrap().push(sale.clone());
        Ok(())
    }
}

// ============================================================================
// Mock Notifier
// ============================================================================

#[derive(Default)]
pub struct MockNotifier {
    notices: Mutex<Vec<(ChatId, String)>>,
    fail: AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn notices(&self) -> Vec<(ChatId, String)> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, operator: ChatId, text: &str) -> Result<(), TelegramError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TelegramError::api("Forbidden: bot was blocked by the user"));
        }
        self.notices
            .lock()
            .unwrap()
            .push((operator, text.to_string()));
        Ok(())
    }
}

// ============================================================================
// Integration Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventInfo;
    use crate::presentation::{callback, Presentation};
    use crate::runtime::{EffectError, Inbound, RuntimeManager, Services, SessionRuntime};
    use crate::state_machine::{Event, FlowState, SessionContext, UpdateContext, UserId};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    const OPERATOR: ChatId = -100_500;
    const BUYER: UserId = 42;

    type TestServices = Services<Arc<MockTransport>, Arc<MockRecordStore>, Arc<MockNotifier>>;
    type TestSession = SessionRuntime<Arc<MockTransport>, Arc<MockRecordStore>, Arc<MockNotifier>>;
    type TestManager = RuntimeManager<Arc<MockTransport>, Arc<MockRecordStore>, Arc<MockNotifier>>;

    struct Harness {
        transport: Arc<MockTransport>,
        records: Arc<MockRecordStore>,
        notifier: Arc<MockNotifier>,
        services: TestServices,
        _assets: TempDir,
    }

    /// Assets directory holding only the welcome image; the QR and
    /// location images are missing.
    fn assets() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("maya_welcome.jpg"), b"\xFF\xD8\xFF").unwrap();
        dir
    }

    fn harness_with(
        transport: MockTransport,
        records: MockRecordStore,
        notifier: MockNotifier,
        assets: TempDir,
    ) -> Harness {
        let transport = Arc::new(transport);
        let records = Arc::new(records);
        let notifier = Arc::new(notifier);
        let presentation = Presentation::new(EventInfo::default(), assets.path());
        let services = Services::new(
            Arc::clone(&transport),
            Arc::clone(&records),
            Arc::clone(&notifier),
            presentation,
            OPERATOR,
        );
        Harness {
            transport,
            records,
            notifier,
            services,
            _assets: assets,
        }
    }

    fn harness() -> Harness {
        harness_with(
            MockTransport::new(),
            MockRecordStore::new(),
            MockNotifier::new(),
            assets(),
        )
    }

    impl Harness {
        fn session(&self, user_id: UserId) -> TestSession {
            SessionRuntime::new(
                SessionContext::new(user_id, EventInfo::default().name),
                self.services.clone(),
            )
        }
    }

    fn text(user_id: UserId, body: &str) -> Inbound {
        Inbound {
            update: UpdateContext::new(user_id, user_id).with_username(Some("ivan".to_string())),
            event: Event::Text(body.to_string()),
        }
    }

    fn press(user_id: UserId, data: &str, event: Event) -> Inbound {
        Inbound {
            update: UpdateContext::new(user_id, user_id)
                .with_username(Some("ivan".to_string()))
                .with_callback(format!("cb-{data}")),
            event,
        }
    }

    fn command(user_id: UserId, event: Event) -> Inbound {
        Inbound {
            update: UpdateContext::new(user_id, user_id),
            event,
        }
    }

    async fn step(
        session: &mut TestSession,
        inbound: Inbound,
    ) -> Vec<EffectError> {
        session.handle(&inbound.update, inbound.event).await
    }

    /// Drive one buyer from /start through payment
    async fn buy(
        session: &mut TestSession,
        user_id: UserId,
        name: &str,
        phone: &str,
    ) -> Vec<EffectError> {
        let mut failures = Vec::new();
        failures.extend(step(session, command(user_id, Event::Start)).await);
        failures.extend(step(session, press(user_id, callback::BUY, Event::Buy)).await);
        failures.extend(step(session, text(user_id, name)).await);
        failures.extend(step(session, text(user_id, phone)).await);
        failures.extend(step(session, press(user_id, callback::PAID, Event::Paid)).await);
        failures
    }

    #[tokio::test]
    async fn test_full_purchase_records_and_notifies() {
        let h = harness();
        let mut session = h.session(BUYER);

        let failures = buy(&mut session, BUYER, "Иван Петров", "+7 900 123-45-67").await;
        assert!(failures.is_empty());
        assert_eq!(session.state(), &FlowState::Idle);

        let records = h.records.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Иван Петров");
        assert_eq!(records[0].phone, "+7 900 123-45-67");
        assert_eq!(records[0].user_id, BUYER);
        assert_eq!(records[0].username_or_placeholder(), "@ivan");
        assert_eq!(records[0].event_name, "Мезоамериканская Масленица");

        let notices = h.notifier.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].0, OPERATOR);
        assert!(notices[0].1.contains("Иван Петров"));
        assert!(notices[0].1.contains("ID: 42"));

        // Welcome image exists; QR and location images do not
        assert_eq!(h.transport.photos(), vec!["maya_welcome.jpg"]);

        let texts = h.transport.texts_to(BUYER);
        assert_eq!(texts[0], "📝 Укажите ваши ФИО:");
        assert_eq!(texts[1], "📱 Укажите ваш номер телефона:");
        assert!(texts[2].contains("tinkoff.ru"));
        assert!(texts[3].starts_with("🙏 Спасибо, Петров!"));
        assert!(texts[4].starts_with("📍 Как добраться"));
        assert_eq!(texts[5], "Хотите купить ещё один билет?");
        assert_eq!(texts.len(), 6);

        assert_eq!(
            h.transport.answered_callbacks(),
            vec!["cb-buy_ticket", "cb-paid"]
        );
    }

    #[tokio::test]
    async fn test_record_store_failure_still_thanks_buyer() {
        let h = harness_with(
            MockTransport::new(),
            MockRecordStore::failing(),
            MockNotifier::new(),
            assets(),
        );
        let mut session = h.session(BUYER);

        let failures = buy(&mut session, BUYER, "Анна", "89001112233").await;

        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], EffectError::RecordStore(_)));
        assert_eq!(h.notifier.notices().len(), 1);
        assert!(h
            .transport
            .texts_to(BUYER)
            .iter()
            .any(|t| t.starts_with("🙏 Спасибо, Анна!")));
        assert_eq!(session.state(), &FlowState::Idle);
    }

    #[tokio::test]
    async fn test_notifier_failure_still_thanks_buyer() {
        let h = harness_with(
            MockTransport::new(),
            MockRecordStore::new(),
            MockNotifier::failing(),
            assets(),
        );
        let mut session = h.session(BUYER);

        let failures = buy(&mut session, BUYER, "Анна", "89001112233").await;

        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], EffectError::Notifier(_)));
        assert_eq!(h.records.records().len(), 1);
        assert!(h
            .transport
            .texts_to(BUYER)
            .iter()
            .any(|t| t.starts_with("🙏 Спасибо, Анна!")));
    }

    #[tokio::test]
    async fn test_missing_welcome_image_falls_back_to_text() {
        let h = harness_with(
            MockTransport::new(),
            MockRecordStore::new(),
            MockNotifier::new(),
            TempDir::new().unwrap(),
        );
        let mut session = h.session(BUYER);

        let failures = step(&mut session, command(BUYER, Event::Start)).await;

        assert!(failures.is_empty());
        assert!(h.transport.photos().is_empty());
        match h.transport.sent().as_slice() {
            [Sent::Text { text, callbacks, .. }] => {
                assert!(text.starts_with("👋 "));
                assert_eq!(callbacks, &vec![callback::BUY.to_string()]);
            }
            other => panic!("unexpected sends: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_upload_falls_back_to_text() {
        let h = harness_with(
            MockTransport::new().failing_photos(),
            MockRecordStore::new(),
            MockNotifier::new(),
            assets(),
        );
        let mut session = h.session(BUYER);

        let failures = step(&mut session, command(BUYER, Event::Start)).await;

        assert!(failures.is_empty());
        let texts = h.transport.texts_to(BUYER);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("👋 "));
    }

    #[tokio::test]
    async fn test_rejected_optional_image_is_reported() {
        let dir = assets();
        std::fs::write(dir.path().join("qr_code.jpg"), b"qr").unwrap();
        let h = harness_with(
            MockTransport::new().failing_photos(),
            MockRecordStore::new(),
            MockNotifier::new(),
            dir,
        );
        let mut session = h.session(BUYER);
        step(&mut session, press(BUYER, callback::BUY, Event::Buy)).await;
        step(&mut session, text(BUYER, "Иван Петров")).await;

        let failures = step(&mut session, text(BUYER, "+79001234567")).await;

        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], EffectError::Transport(_)));
        assert!(matches!(
            session.state(),
            FlowState::AwaitingPaymentConfirmation { .. }
        ));
    }

    #[tokio::test]
    async fn test_send_failures_do_not_stall_the_flow() {
        let h = harness_with(
            MockTransport::new().failing_texts(),
            MockRecordStore::new(),
            MockNotifier::new(),
            assets(),
        );
        let mut session = h.session(BUYER);

        buy(&mut session, BUYER, "Иван Петров", "+79001234567").await;

        assert_eq!(h.records.records().len(), 1);
        assert_eq!(h.notifier.notices().len(), 1);
    }

    #[tokio::test]
    async fn test_start_mid_flow_discards_partial_purchase() {
        let h = harness();
        let mut session = h.session(BUYER);

        step(&mut session, press(BUYER, callback::BUY, Event::Buy)).await;
        step(&mut session, text(BUYER, "Иван Петров")).await;
        step(&mut session, command(BUYER, Event::Start)).await;

        assert_eq!(session.state(), &FlowState::Idle);
        step(&mut session, press(BUYER, callback::PAID, Event::Paid)).await;

        assert!(h.records.records().is_empty());
        assert!(h.notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_paid_twice_records_once() {
        let h = harness();
        let mut session = h.session(BUYER);

        buy(&mut session, BUYER, "Иван Петров", "+79001234567").await;
        step(&mut session, press(BUYER, callback::PAID, Event::Paid)).await;

        assert_eq!(h.records.records().len(), 1);
        assert_eq!(h.notifier.notices().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_replies_and_resets() {
        let h = harness();
        let mut session = h.session(BUYER);

        step(&mut session, press(BUYER, callback::BUY, Event::Buy)).await;
        step(&mut session, command(BUYER, Event::Cancel)).await;

        assert_eq!(session.state(), &FlowState::Idle);
        assert_eq!(
            h.transport.texts_to(BUYER).last().map(String::as_str),
            Some("Отменено. Напиши /start чтобы начать заново.")
        );
    }

    async fn wait_until(condition: impl Fn() -> bool, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    /// Wait for the manager to hold exactly `expected` live sessions
    async fn wait_for_sessions<T, R, N>(
        manager: &RuntimeManager<T, R, N>,
        expected: usize,
        timeout: Duration,
    ) -> bool
    where
        T: ChatTransport + 'static,
        R: RecordStore + 'static,
        N: Notifier + 'static,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if manager.session_count().await == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        manager.session_count().await == expected
    }

    #[tokio::test]
    async fn test_manager_keeps_buyers_apart() {
        let h = harness();
        let manager = RuntimeManager::new(h.services.clone());
        let (alice, bob): (UserId, UserId) = (1, 2);

        for inbound in [
            press(alice, callback::BUY, Event::Buy),
            press(bob, callback::BUY, Event::Buy),
            text(alice, "Алиса Смирнова"),
            text(bob, "Борис Иванов"),
            text(bob, "+7 111"),
            text(alice, "+7 222"),
            press(bob, callback::PAID, Event::Paid),
            press(alice, callback::PAID, Event::Paid),
        ] {
            manager.dispatch(inbound).await;
        }

        let records = Arc::clone(&h.records);
        assert!(wait_until(|| records.records().len() == 2, Duration::from_secs(5)).await);
        assert!(wait_for_sessions(&manager, 0, Duration::from_secs(5)).await);

        let mut pairs: Vec<(UserId, String, String)> = h
            .records
            .records()
            .into_iter()
            .map(|r| (r.user_id, r.name, r.phone))
            .collect();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                (alice, "Алиса Смирнова".to_string(), "+7 222".to_string()),
                (bob, "Борис Иванов".to_string(), "+7 111".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_manager_handles_one_buyer_in_order() {
        let h = harness();
        let manager = RuntimeManager::new(h.services.clone());

        manager.dispatch(command(BUYER, Event::Start)).await;
        manager
            .dispatch(press(BUYER, callback::BUY, Event::Buy))
            .await;
        manager.dispatch(text(BUYER, "Иван Петров")).await;
        manager.dispatch(text(BUYER, "+79001234567")).await;
        manager
            .dispatch(press(BUYER, callback::PAID, Event::Paid))
            .await;

        let records = Arc::clone(&h.records);
        assert!(wait_until(|| records.records().len() == 1, Duration::from_secs(5)).await);
        let record = &h.records.records()[0];
        assert_eq!(record.name, "Иван Петров");
        assert_eq!(record.phone, "+79001234567");
        assert!(wait_for_sessions(&manager, 0, Duration::from_secs(5)).await);

        let texts = h.transport.texts_to(BUYER);
        assert_eq!(texts[0], "📝 Укажите ваши ФИО:");
        assert_eq!(texts[1], "📱 Укажите ваш номер телефона:");
    }

    /// Dispatch `inbound` and wait for the bot to answer it with text
    async fn dispatch_and_wait(manager: &TestManager, h: &Harness, inbound: Inbound) {
        let before = h.transport.texts_to(inbound.update.chat_id).len();
        let chat_id = inbound.update.chat_id;
        manager.dispatch(inbound).await;
        let transport = Arc::clone(&h.transport);
        assert!(
            wait_until(
                || transport.texts_to(chat_id).len() > before,
                Duration::from_secs(5)
            )
            .await
        );
    }

    #[tokio::test]
    async fn test_session_lives_mid_flow_and_ends_after_sale() {
        let h = harness();
        let manager = RuntimeManager::new(h.services.clone());

        dispatch_and_wait(&manager, &h, press(BUYER, callback::BUY, Event::Buy)).await;
        assert_eq!(manager.session_count().await, 1);

        dispatch_and_wait(&manager, &h, text(BUYER, "Иван Петров")).await;
        dispatch_and_wait(&manager, &h, text(BUYER, "+79001234567")).await;
        assert_eq!(manager.session_count().await, 1);

        manager
            .dispatch(press(BUYER, callback::PAID, Event::Paid))
            .await;
        assert!(wait_for_sessions(&manager, 0, Duration::from_secs(5)).await);
        assert_eq!(h.records.records().len(), 1);

        // A returning buyer gets a fresh session
        dispatch_and_wait(&manager, &h, press(BUYER, callback::BUY, Event::Buy)).await;
        assert_eq!(manager.session_count().await, 1);
        assert_eq!(
            h.transport.texts_to(BUYER).last().map(String::as_str),
            Some("📝 Укажите ваши ФИО:")
        );
    }

    #[tokio::test]
    async fn test_cancel_ends_session() {
        let h = harness();
        let manager = RuntimeManager::new(h.services.clone());

        dispatch_and_wait(&manager, &h, press(BUYER, callback::BUY, Event::Buy)).await;
        assert_eq!(manager.session_count().await, 1);

        manager.dispatch(command(BUYER, Event::Cancel)).await;
        assert!(wait_for_sessions(&manager, 0, Duration::from_secs(5)).await);
        assert!(h.records.records().is_empty());
    }

    #[tokio::test]
    async fn test_many_idle_visitors_leave_no_sessions() {
        let h = harness();
        let manager = RuntimeManager::new(h.services.clone());

        for user_id in 100..150 {
            manager.dispatch(command(user_id, Event::Start)).await;
        }

        let transport = Arc::clone(&h.transport);
        assert!(wait_until(|| transport.photos().len() == 50, Duration::from_secs(5)).await);
        assert!(wait_for_sessions(&manager, 0, Duration::from_secs(5)).await);
    }

    /// Ledger whose appends never complete
    struct StalledRecordStore;

    #[async_trait]
    impl RecordStore for StalledRecordStore {
        async fn append(&self, _sale: &SaleRecord) -> Result<(), SheetsError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_stalled_buyer_does_not_block_dispatch() {
        let transport = Arc::new(MockTransport::new());
        let dir = assets();
        let manager = RuntimeManager::new(Services::new(
            Arc::clone(&transport),
            StalledRecordStore,
            MockNotifier::new(),
            Presentation::new(EventInfo::default(), dir.path()),
            OPERATOR,
        ));

        for inbound in [
            press(BUYER, callback::BUY, Event::Buy),
            text(BUYER, "Иван Петров"),
            text(BUYER, "+79001234567"),
            press(BUYER, callback::PAID, Event::Paid),
        ] {
            manager.dispatch(inbound).await;
        }

        // Far more than the session queue holds while the sale is stuck
        let flood = async {
            for i in 0..200 {
                manager.dispatch(text(BUYER, &format!("ау {i}"))).await;
            }
        };
        assert!(tokio::time::timeout(Duration::from_secs(5), flood)
            .await
            .is_ok());

        let other: UserId = 7;
        let welcome = manager.dispatch(command(other, Event::Start));
        assert!(tokio::time::timeout(Duration::from_secs(5), welcome)
            .await
            .is_ok());

        let seen = Arc::clone(&transport);
        assert!(
            wait_until(
                || seen.sent().iter().any(|s| matches!(
                    s,
                    Sent::Photo { chat_id, .. } if *chat_id == other
                )),
                Duration::from_secs(5)
            )
            .await
        );
    }
}
