//! Fixed content shown at each step of the purchase flow
//!
//! The state machine names *what* to show with a [`Prompt`]; this module
//! turns it into concrete texts, images and buttons.

use crate::config::EventInfo;
use crate::state_machine::SaleRecord;
use crate::telegram::{InlineKeyboardMarkup, ParseMode};
use std::path::{Path, PathBuf};

/// Callback data carried by the bot's inline buttons
pub mod callback {
    pub const BUY: &str = "buy_ticket";
    pub const PAID: &str = "paid";
    pub const RESTART: &str = "restart";
}

/// One piece of content the buyer should see
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// Greeting with the "buy" button
    Welcome,
    /// Greeting after "buy another ticket"
    RestartWelcome,
    AskName,
    AskPhone,
    /// Payment link with the "paid" button
    PaymentInstructions,
    /// Optional QR code image
    PaymentQr,
    ThankYou { given_name: String },
    /// Directions to the venue
    Location,
    /// Optional photo of the venue
    LocationPhoto,
    /// "Buy another ticket?" with the restart button
    BuyAgain,
    Cancelled,
    /// Idle buyer sent something other than a command
    StartHint,
    /// Text sent while the "paid" button is expected
    PaymentReminder,
}

/// Text message ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextReply {
    pub text: String,
    pub parse_mode: Option<ParseMode>,
    pub keyboard: Option<InlineKeyboardMarkup>,
}

impl TextReply {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: None,
            keyboard: None,
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            parse_mode: Some(ParseMode::Markdown),
            ..Self::plain(text)
        }
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboardMarkup) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Image message. When the file cannot be sent, `fallback` goes out
/// instead; without a fallback the image is simply skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoReply {
    pub path: PathBuf,
    pub caption: Option<String>,
    pub parse_mode: Option<ParseMode>,
    pub keyboard: Option<InlineKeyboardMarkup>,
    pub fallback: Option<TextReply>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(TextReply),
    Photo(PhotoReply),
}

/// Renders prompts for one event
#[derive(Debug, Clone)]
pub struct Presentation {
    event: EventInfo,
    assets_dir: PathBuf,
}

impl Presentation {
    pub fn new(event: EventInfo, assets_dir: impl Into<PathBuf>) -> Self {
        Self {
            event,
            assets_dir: assets_dir.into(),
        }
    }

    pub fn event(&self) -> &EventInfo {
        &self.event
    }

    fn asset(&self, image: Option<&PathBuf>) -> Option<PathBuf> {
        image.map(|p| self.assets_dir.join(p))
    }

    fn buy_keyboard() -> InlineKeyboardMarkup {
        InlineKeyboardMarkup::single("🎟 Купить билет", callback::BUY)
    }

    fn paid_keyboard() -> InlineKeyboardMarkup {
        InlineKeyboardMarkup::single("✅ Продолжить", callback::PAID)
    }

    fn greeting(&self) -> String {
        format!(
            "Привет! Это telegram-бот канала *{}*.",
            escape_markdown(&self.event.channel)
        )
    }

    /// Image when configured, falling back to `fallback` text
    fn photo_or_text(
        &self,
        image: Option<&PathBuf>,
        caption: Option<TextReply>,
        fallback: Option<TextReply>,
    ) -> Option<Reply> {
        match self.asset(image) {
            Some(path) => {
                let (caption, parse_mode, keyboard) = match caption {
                    Some(c) => (Some(c.text), c.parse_mode, c.keyboard),
                    None => (None, None, None),
                };
                Some(Reply::Photo(PhotoReply {
                    path,
                    caption,
                    parse_mode,
                    keyboard,
                    fallback,
                }))
            }
            None => fallback.map(Reply::Text),
        }
    }

    /// Content for `prompt`; `None` when it is an optional image that is
    /// not configured.
    pub fn render(&self, prompt: &Prompt) -> Option<Reply> {
        let event = &self.event;
        match prompt {
            Prompt::Welcome => self.photo_or_text(
                event.welcome_image.as_ref(),
                Some(TextReply::markdown(self.greeting()).with_keyboard(Self::buy_keyboard())),
                Some(
                    TextReply::markdown(format!("👋 {}", self.greeting()))
                        .with_keyboard(Self::buy_keyboard()),
                ),
            ),
            Prompt::RestartWelcome => self.photo_or_text(
                event.welcome_image.as_ref(),
                Some(TextReply::markdown(self.greeting()).with_keyboard(Self::buy_keyboard())),
                Some(
                    TextReply::plain("👋 Готово! Нажми кнопку чтобы купить ещё один билет:")
                        .with_keyboard(Self::buy_keyboard()),
                ),
            ),
            Prompt::AskName => Some(Reply::Text(TextReply::plain("📝 Укажите ваши ФИО:"))),
            Prompt::AskPhone => Some(Reply::Text(TextReply::plain(
                "📱 Укажите ваш номер телефона:",
            ))),
            Prompt::PaymentInstructions => Some(Reply::Text(
                TextReply::plain(format!(
                    "💳 Оплатите участие в мастер-классе по ссылке или QR-коду:\n\n{}\n\n\
                     После оплаты нажмите кнопку «Продолжить» ⬇️",
                    event.payment_link
                ))
                .with_keyboard(Self::paid_keyboard()),
            )),
            Prompt::PaymentQr => self.photo_or_text(
                event.qr_image.as_ref(),
                Some(TextReply::plain(event.payee_caption.clone())),
                None,
            ),
            Prompt::ThankYou { given_name } => Some(Reply::Text(TextReply::markdown(format!(
                "🙏 Спасибо, {}!\n\n\
                 Вы оплатили участие в мастер-классе *\"{}\"*.\n\n\
                 В ближайшее время вы получите чек об оплате.\n\n\
                 До встречи *{}*! 🎉",
                escape_markdown(given_name),
                escape_markdown(&event.name),
                escape_markdown(&event.date),
            )))),
            Prompt::Location => Some(Reply::Text(TextReply::plain(event.location.clone()))),
            Prompt::LocationPhoto => self.photo_or_text(event.location_image.as_ref(), None, None),
            Prompt::BuyAgain => Some(Reply::Text(
                TextReply::plain("Хотите купить ещё один билет?").with_keyboard(
                    InlineKeyboardMarkup::single("🎟 Купить ещё билет", callback::RESTART),
                ),
            )),
            Prompt::Cancelled => Some(Reply::Text(TextReply::plain(
                "Отменено. Напиши /start чтобы начать заново.",
            ))),
            Prompt::StartHint => Some(Reply::Text(
                TextReply::plain("Чтобы купить билет, нажмите кнопку ниже или напишите /start.")
                    .with_keyboard(Self::buy_keyboard()),
            )),
            Prompt::PaymentReminder => Some(Reply::Text(
                TextReply::plain("После оплаты нажмите кнопку «Продолжить» ⬇️")
                    .with_keyboard(Self::paid_keyboard()),
            )),
        }
    }

    /// Markdown message sent to the operator for one sale
    pub fn operator_notice(&self, sale: &SaleRecord) -> String {
        format!(
            "🎟 *Новая покупка билета!*\n\n\
             👤 ФИО: {}\n\
             📱 Телефон: {}\n\
             🆔 Telegram: {} (ID: {})\n\
             📅 {}",
            escape_markdown(&sale.name),
            escape_markdown(&sale.phone),
            escape_markdown(&sale.username_or_placeholder()),
            sale.user_id,
            sale.formatted_timestamp(),
        )
    }
}

/// Escape buyer-supplied text for legacy Markdown
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// File name used for uploads
pub fn upload_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| "image.jpg".to_string(), |n| n.to_string_lossy().into_owned())
}
