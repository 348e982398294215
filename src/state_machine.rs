//! Ticket purchase state machine
//!
//! Pure state transitions: given the current flow state and an inbound
//! event, produce the next state and the effects the runtime must apply.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::Event;
pub use state::{given_name, ChatId, FlowState, SaleRecord, SessionContext, UpdateContext, UserId};
pub use transition::{transition, TransitionResult};
