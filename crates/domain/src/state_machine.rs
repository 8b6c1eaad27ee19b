//! Pure task-state transition validation.
//!
//! Shared, unconditionally, between the HTTP `PATCH` handler and the
//! dispatcher — neither has a bypass path around [`validate_transition`].

use crate::model::TaskStatus;
use crate::Error;
use TaskStatus::*;

/// Validate a proposed transition. A transition to the current state is a
/// legal no-op (callers should treat it as "nothing to append to history").
/// Any other pair not in the table fails.
pub fn validate_transition(current: TaskStatus, next: TaskStatus) -> Result<(), Error> {
    if next == current {
        return Ok(());
    }
    if allowed_next(current).contains(&next) {
        return Ok(());
    }
    Err(Error::validation(format!(
        "invalid task status transition from {current:?} to {next:?}"
    )))
}

/// Whether `next == current` (the no-op case callers must special-case when
/// deciding whether to append a history row).
pub fn is_noop(current: TaskStatus, next: TaskStatus) -> bool {
    next == current
}

fn allowed_next(current: TaskStatus) -> &'static [TaskStatus] {
    match current {
        Received => &[Routed, Failed],
        Routed => &[Transcribing, Refining, Failed],
        Transcribing => &[Refining, Failed],
        Refining => &[ToolQueued, Failed],
        ToolQueued => &[ToolRunning, Failed],
        ToolRunning => &[Summarizing, Failed],
        Summarizing => &[TtsGenerating, Delivered, Failed],
        TtsGenerating => &[Delivered, Failed],
        Delivered => &[],
        Failed => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [TaskStatus; 10] = [
        Received,
        Routed,
        Transcribing,
        Refining,
        ToolQueued,
        ToolRunning,
        Summarizing,
        TtsGenerating,
        Delivered,
        Failed,
    ];

    #[test]
    fn every_state_can_reach_failed_except_failed_itself() {
        for state in ALL_STATES {
            if state == Failed {
                continue;
            }
            assert!(
                validate_transition(state, Failed).is_ok(),
                "{state:?} -> FAILED should be legal"
            );
        }
    }

    #[test]
    fn noop_transitions_are_always_legal() {
        for state in ALL_STATES {
            assert!(validate_transition(state, state).is_ok());
            assert!(is_noop(state, state));
        }
    }

    #[test]
    fn received_to_routed_is_legal() {
        assert!(validate_transition(Received, Routed).is_ok());
    }

    #[test]
    fn routed_to_transcribing_or_refining_is_legal() {
        assert!(validate_transition(Routed, Transcribing).is_ok());
        assert!(validate_transition(Routed, Refining).is_ok());
    }

    #[test]
    fn transcribing_to_refining_is_legal() {
        assert!(validate_transition(Transcribing, Refining).is_ok());
    }

    #[test]
    fn refining_to_tool_queued_is_legal() {
        assert!(validate_transition(Refining, ToolQueued).is_ok());
    }

    #[test]
    fn tool_queued_to_tool_running_is_legal() {
        assert!(validate_transition(ToolQueued, ToolRunning).is_ok());
    }

    #[test]
    fn tool_running_to_summarizing_is_legal() {
        assert!(validate_transition(ToolRunning, Summarizing).is_ok());
    }

    #[test]
    fn summarizing_to_tts_or_delivered_is_legal() {
        assert!(validate_transition(Summarizing, TtsGenerating).is_ok());
        assert!(validate_transition(Summarizing, Delivered).is_ok());
    }

    #[test]
    fn tts_generating_to_delivered_is_legal() {
        assert!(validate_transition(TtsGenerating, Delivered).is_ok());
    }

    #[test]
    fn terminal_states_reject_every_outgoing_transition() {
        for terminal in [Delivered, Failed] {
            for target in ALL_STATES {
                if target == terminal {
                    continue;
                }
                assert!(
                    validate_transition(terminal, target).is_err(),
                    "{terminal:?} -> {target:?} should be rejected"
                );
            }
        }
    }

    #[test]
    fn unlisted_pairs_are_rejected() {
        assert!(validate_transition(Received, Summarizing).is_err());
        assert!(validate_transition(Received, Delivered).is_err());
        assert!(validate_transition(ToolQueued, Delivered).is_err());
        assert!(validate_transition(Refining, Received).is_err());
    }

    #[test]
    fn error_message_names_both_states() {
        let err = validate_transition(Delivered, Refining).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Delivered") || message.contains("DELIVERED"));
        assert!(message.contains("Refining") || message.contains("REFINING"));
    }

    /// Every pair in the allowed-transitions table round-trips through
    /// `validate_transition`, exhaustively, matching invariant P1.
    #[test]
    fn exhaustive_table_matches_validate_transition() {
        for current in ALL_STATES {
            for next in allowed_next(current) {
                assert!(validate_transition(current, *next).is_ok());
            }
        }
    }
}
