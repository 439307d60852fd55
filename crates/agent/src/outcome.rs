//! Outcome inferred from what happened on the call

use call_agent_core::{CallOutcome, ConversationTurn};

/// Best guess at the outcome from tool activity alone
///
/// Used when post-call analysis is unavailable.
pub fn infer_outcome(history: &[ConversationTurn]) -> CallOutcome {
    let succeeded = |name: &str| {
        history
            .iter()
            .filter_map(|turn| turn.tool_calls.as_ref())
            .flatten()
            .any(|inv| inv.name == name && inv.result.is_ok())
    };

    if succeeded("book_meeting") {
        CallOutcome::MeetingBooked
    } else if succeeded("transfer_call") {
        CallOutcome::TransferredToHuman
    } else {
        CallOutcome::Unknown
    }
}
