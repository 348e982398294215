//! Events that drive the purchase flow

/// Inbound buyer actions, already classified from the chat update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // Commands
    /// `/start`: always resets the session
    Start,
    /// `/cancel`
    Cancel,

    // Buttons
    /// "Buy ticket"
    Buy,
    /// "Continue" after paying
    Paid,
    /// "Buy another ticket"
    Restart,
    /// A button we did not issue (stale keyboard, forged data)
    UnknownAction(String),

    /// Free text, interpreted according to the current state
    Text(String),
}
