// Countdown controller: the displayed turn timer and its expiry signal.
//
// The server owns the authoritative remaining time. This controller only
// projects it between reconciliations by decrementing once per tick, and any
// server value it receives overwrites the local projection.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Client-observed projection of the turn clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DraftTimer {
    pub time_remaining_seconds: u32,
    pub is_draft_paused: bool,
}

/// Identity of an observed turn, keyed by its slot in the draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnKey {
    pub round: u32,
    pub position: u32,
}

/// Raised once per turn when the displayed clock reaches zero on the
/// observing user's turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirySignal {
    pub turn: TurnKey,
}

/// Owns the single displayed timer for the turn currently being observed.
#[derive(Debug, Default)]
pub struct Countdown {
    /// `None` until a turn is observed and after the draft completes.
    timer: Option<DraftTimer>,
    turn: Option<TurnKey>,
    /// Turn for which an expiry signal was already raised.
    expired_turn: Option<TurnKey>,
}

impl Countdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a server-reported timer. The server value always replaces the
    /// local projection. A different `turn` starts a fresh timer.
    pub fn reconcile(&mut self, turn: TurnKey, remaining: u32, paused: bool) {
        if self.turn != Some(turn) {
            info!(
                "Timer reset for round {} position {}: {}s",
                turn.round, turn.position, remaining
            );
            self.turn = Some(turn);
        } else if let Some(timer) = self.timer {
            if timer.time_remaining_seconds != remaining {
                debug!(
                    local = timer.time_remaining_seconds,
                    server = remaining,
                    "Timer drift corrected from server"
                );
            }
        }

        self.timer = Some(DraftTimer {
            time_remaining_seconds: remaining,
            is_draft_paused: paused,
        });
    }

    /// Advance the displayed clock by one second.
    ///
    /// Frozen while paused. Returns an expiry signal when the clock is at
    /// zero, the draft is not paused, `is_my_turn` holds, and no signal has
    /// been raised for this turn yet.
    pub fn tick(&mut self, is_my_turn: bool) -> Option<ExpirySignal> {
        let turn = self.turn?;
        let timer = self.timer.as_mut()?;
        if timer.is_draft_paused {
            return None;
        }

        timer.time_remaining_seconds = timer.time_remaining_seconds.saturating_sub(1);

        if timer.time_remaining_seconds == 0 && is_my_turn && self.expired_turn != Some(turn) {
            self.expired_turn = Some(turn);
            info!(
                "Turn clock expired locally for round {} position {}",
                turn.round, turn.position
            );
            return Some(ExpirySignal { turn });
        }
        None
    }

    /// Update the paused flag when the server reported no remaining time.
    pub fn set_paused(&mut self, paused: bool) {
        if let Some(timer) = self.timer.as_mut() {
            timer.is_draft_paused = paused;
        }
    }

    /// Destroy the timer (draft completed or view torn down).
    pub fn clear(&mut self) {
        self.timer = None;
        self.turn = None;
    }

    /// Read-only copy of the displayed timer.
    pub fn timer(&self) -> Option<DraftTimer> {
        self.timer
    }

    pub fn turn(&self) -> Option<TurnKey> {
        self.turn
    }
}
