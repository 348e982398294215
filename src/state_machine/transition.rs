//! Pure state transition function
//!
//! Given the same state, contexts and event this always produces the same
//! result; all I/O happens in the runtime that applies the effects.

use super::state::{FlowState, SaleRecord, SessionContext, UpdateContext};
use super::{Effect, Event};
use crate::presentation::Prompt;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: FlowState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: FlowState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }

    /// Stay in `state` and show `prompt` again
    fn reprompt(state: &FlowState, prompt: Prompt) -> Self {
        Self::new(state.clone()).with_effect(Effect::reply(prompt))
    }
}

/// Pure transition function.
///
/// Every (state, event) pair has a defined outcome: input that does not fit
/// the current step re-prompts that step and leaves the state untouched.
pub fn transition(
    state: &FlowState,
    session: &SessionContext,
    update: &UpdateContext,
    event: Event,
) -> TransitionResult {
    match (state, event) {
        // ============================================================
        // Resets, valid from any state
        // ============================================================
        (_, Event::Start) => {
            TransitionResult::new(FlowState::Idle).with_effect(Effect::reply(Prompt::Welcome))
        }

        (_, Event::Cancel) => {
            TransitionResult::new(FlowState::Idle).with_effect(Effect::reply(Prompt::Cancelled))
        }

        (_, Event::Restart) => TransitionResult::new(FlowState::Idle)
            .with_effect(Effect::reply(Prompt::RestartWelcome)),

        // "Buy" re-enters the flow from anywhere and drops collected data
        (_, Event::Buy) => {
            TransitionResult::new(FlowState::AwaitingName).with_effect(Effect::reply(Prompt::AskName))
        }

        // ============================================================
        // Data collection
        // ============================================================
        (FlowState::AwaitingName, Event::Text(text)) => match accepted_text(&text) {
            Some(name) => TransitionResult::new(FlowState::AwaitingPhone { name })
                .with_effect(Effect::reply(Prompt::AskPhone)),
            None => TransitionResult::reprompt(state, Prompt::AskName),
        },

        (FlowState::AwaitingPhone { name }, Event::Text(text)) => match accepted_text(&text) {
            Some(phone) => TransitionResult::new(FlowState::AwaitingPaymentConfirmation {
                name: name.clone(),
                phone,
            })
            .with_effects([
                Effect::reply(Prompt::PaymentInstructions),
                Effect::reply(Prompt::PaymentQr),
            ]),
            None => TransitionResult::reprompt(state, Prompt::AskPhone),
        },

        // ============================================================
        // Terminal transition: the only one with durable side effects
        // ============================================================
        (FlowState::AwaitingPaymentConfirmation { name, phone }, Event::Paid) => {
            let sale = SaleRecord {
                timestamp: update.received_at,
                name: name.clone(),
                phone: phone.clone(),
                user_id: session.user_id,
                username: update.username.clone(),
                event_name: session.event_name.clone(),
            };
            let given_name = sale.given_name().to_string();

            TransitionResult::new(FlowState::Idle).with_effects([
                Effect::RecordSale(sale.clone()),
                Effect::NotifyOperator(sale),
                Effect::reply(Prompt::ThankYou { given_name }),
                Effect::reply(Prompt::Location),
                Effect::reply(Prompt::LocationPhoto),
                Effect::reply(Prompt::BuyAgain),
            ])
        }

        // ============================================================
        // Unexpected input
        // ============================================================
        (FlowState::Idle, Event::Text(_) | Event::Paid | Event::UnknownAction(_)) => {
            TransitionResult::reprompt(state, Prompt::StartHint)
        }

        (FlowState::AwaitingName, Event::Paid | Event::UnknownAction(_)) => {
            TransitionResult::reprompt(state, Prompt::AskName)
        }

        (FlowState::AwaitingPhone { .. }, Event::Paid | Event::UnknownAction(_)) => {
            TransitionResult::reprompt(state, Prompt::AskPhone)
        }

        (
            FlowState::AwaitingPaymentConfirmation { .. },
            Event::Text(_) | Event::UnknownAction(_),
        ) => TransitionResult::reprompt(state, Prompt::PaymentReminder),
    }
}

/// Free text is stored verbatim apart from surrounding whitespace; blank
/// input is not a value.
fn accepted_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
