//! Human confirmation gating for side-effecting actions.

use async_trait::async_trait;
use cicerone_common::protocol::{CurrentState, GuideAction};

/// The suspension state of the planner: either nothing is pending, or
/// exactly one action awaits a human decision and execution is paused.
#[derive(Debug)]
pub enum Confirmation {
    None,
    Awaiting(PendingConfirmation),
}

#[derive(Debug, Clone)]
pub struct PendingConfirmation {
    pub tool_call_id: String,
    pub action: GuideAction,
    pub context: CurrentState,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationDecision {
    Approved,
    Cancelled,
}

/// Presents a pending confirmation to the user and returns their
/// decision. Reviewing implies surfacing the prompt (the hosting surface
/// is forced visible for the duration).
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn review(&mut self, pending: &PendingConfirmation) -> ConfirmationDecision;
}

/// Gate that approves everything. Useful for unattended runs against
/// pages known to be safe.
pub struct AutoApproveGate;

#[async_trait]
impl ConfirmationGate for AutoApproveGate {
    async fn review(&mut self, pending: &PendingConfirmation) -> ConfirmationDecision {
        tracing::warn!(
            "auto-approving side-effecting action: {}",
            pending.description
        );
        ConfirmationDecision::Approved
    }
}
