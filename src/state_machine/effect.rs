//! Effects produced by state transitions

use super::state::SaleRecord;
use crate::presentation::Prompt;

/// Effects to be executed, in order, after a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send one piece of content to the buyer's chat
    Reply(Prompt),

    /// Append the sale to the record store
    RecordSale(SaleRecord),

    /// Tell the operator about the sale
    NotifyOperator(SaleRecord),
}

impl Effect {
    pub fn reply(prompt: Prompt) -> Self {
        Effect::Reply(prompt)
    }

    /// The sale this effect carries, if it is a terminal side effect
    #[cfg(test)]
    pub fn sale(&self) -> Option<&SaleRecord> {
        match self {
            Effect::RecordSale(sale) | Effect::NotifyOperator(sale) => Some(sale),
            Effect::Reply(_) => None,
        }
    }
}
