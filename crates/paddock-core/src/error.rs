// Error taxonomy for the draft engine and its collaborator.

use thiserror::Error;

use crate::draft::pick::{DriverId, TeamId};

// ---------------------------------------------------------------------------
// Collaborator errors
// ---------------------------------------------------------------------------

/// Failures reported by a [`DraftService`](crate::service::DraftService).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The slot the pick targeted was already filled.
    #[error("pick slot already filled")]
    SlotTaken,

    #[error("driver {driver_id} is no longer available")]
    DriverUnavailable { driver_id: DriverId },

    #[error("team {team_id} does not hold the current turn")]
    NotYourTurn { team_id: TeamId },

    #[error("a draft order already exists for this race")]
    OrderExists,

    #[error("draft order cannot change once picks have been made")]
    OrderLocked,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected response ({status}): {message}")]
    Unexpected { status: u16, message: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl ServiceError {
    /// Whether retrying on the next scheduled cycle may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::Transport(_) | ServiceError::Timeout { .. } | ServiceError::Storage(_)
        )
    }

    /// Whether the server rejected a pick because the turn moved on or the
    /// driver is gone.
    pub fn is_submission_conflict(&self) -> bool {
        matches!(
            self,
            ServiceError::SlotTaken
                | ServiceError::DriverUnavailable { .. }
                | ServiceError::NotYourTurn { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Consistency faults
// ---------------------------------------------------------------------------

/// A disagreement between the observed pick log and the expected sequence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceFault {
    #[error("expected pick #{expected} (round {expected_round}), observed pick #{found} (round {found_round})")]
    UnexpectedPick {
        expected: u32,
        expected_round: u32,
        found: u32,
        found_round: u32,
    },

    #[error("two different picks observed for slot #{pick_number}")]
    DuplicateSlot { pick_number: u32 },

    #[error("pick #{pick_number} made by team {found}, but team {expected} held the turn")]
    WrongTeam {
        pick_number: u32,
        expected: TeamId,
        found: TeamId,
    },

    #[error("driver {driver_id} picked twice (pick #{pick_number})")]
    DuplicateDriver { driver_id: DriverId, pick_number: u32 },

    #[error("server reports {reported} picks made, observed log has {observed}")]
    CountMismatch { reported: u32, observed: u32 },

    #[error("server turn pointer is round {reported_round} position {reported_position}, expected round {expected_round} position {expected_position}")]
    PointerMismatch {
        reported_round: u32,
        reported_position: u32,
        expected_round: u32,
        expected_position: u32,
    },

    #[error("draft order is not a contiguous 1..N sequence: {0}")]
    InvalidOrder(String),
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

/// Top-level engine error, one variant per failure class.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DraftError {
    /// Fatal, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Recovered locally by the reconciliation loop.
    #[error("transient fetch error: {0}")]
    TransientFetch(#[source] ServiceError),

    #[error("sequence consistency fault: {0}")]
    SequenceConsistency(#[from] SequenceFault),

    #[error("submission conflict: {0}")]
    SubmissionConflict(#[source] ServiceError),

    /// The draft should have completed before the pool ran dry.
    #[error("no drivers available for auto-pick")]
    EmptyDriverPool,
}

impl From<ServiceError> for DraftError {
    fn from(err: ServiceError) -> Self {
        if err.is_submission_conflict() {
            DraftError::SubmissionConflict(err)
        } else {
            DraftError::TransientFetch(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ServiceError::Transport("reset".into()).is_transient());
        assert!(ServiceError::Timeout { secs: 5 }.is_transient());
        assert!(!ServiceError::SlotTaken.is_transient());
        assert!(!ServiceError::OrderExists.is_transient());
    }

    #[test]
    fn conflicts_map_to_submission_conflict() {
        let err: DraftError = ServiceError::SlotTaken.into();
        assert!(matches!(err, DraftError::SubmissionConflict(_)));

        let err: DraftError = ServiceError::DriverUnavailable { driver_id: 44 }.into();
        assert!(matches!(err, DraftError::SubmissionConflict(_)));

        let err: DraftError = ServiceError::Transport("dns".into()).into();
        assert!(matches!(err, DraftError::TransientFetch(_)));
    }

    #[test]
    fn fault_messages_name_the_slot() {
        let fault = SequenceFault::CountMismatch {
            reported: 6,
            observed: 5,
        };
        assert_eq!(
            fault.to_string(),
            "server reports 6 picks made, observed log has 5"
        );
    }
}
