// Turn state machine: draft phase, current turn holder, and pick history.
//
// NotStarted -> InProgress -> {Paused <-> InProgress} -> Completed
//
// The pick log is append-only and must advance one expected slot at a time.
// Anything else is reported as a `SequenceFault` for the reconciliation loop
// to resolve with a full refetch.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::draft::order::{self, DraftMethod, DraftOrderEntry};
use crate::draft::pick::{position_in_round, round_for_pick, DraftPick, DriverId, TeamId};
use crate::error::{DraftError, SequenceFault};
use crate::protocol::DraftStatus;

/// Lifecycle phase of a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DraftPhase {
    NotStarted,
    InProgress,
    Paused,
    Completed,
}

impl DraftPhase {
    pub fn label(&self) -> &'static str {
        match self {
            DraftPhase::NotStarted => "Not started",
            DraftPhase::InProgress => "In progress",
            DraftPhase::Paused => "Paused",
            DraftPhase::Completed => "Completed",
        }
    }
}

/// A resolved pick slot: where in the draft it sits and who owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnSlot {
    pub pick_number: u32,
    pub round: u32,
    /// Slot within the round (1-indexed).
    pub position: u32,
    pub team_id: TeamId,
    pub team_name: String,
}

/// Result of observing a pick from the server log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickOutcome {
    /// The pick filled the expected slot; `next` is the new turn, if any.
    Advanced { next: Option<TurnSlot> },
    /// The exact same pick was already in the log (overlapping fetch).
    AlreadyObserved,
}

/// Phase change caused by a status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub from: DraftPhase,
    pub to: DraftPhase,
}

/// The engine's model of where the draft stands.
#[derive(Debug, Clone)]
pub struct TurnState {
    /// Round-1 order, sorted by draft position.
    order: Vec<DraftOrderEntry>,
    method: DraftMethod,
    slots_per_team: u32,
    phase: DraftPhase,
    picks: Vec<DraftPick>,
    picked_drivers: HashSet<DriverId>,
}

impl TurnState {
    /// Build a state machine over a fixed order.
    ///
    /// The order must be a valid 1..N permutation of at least two teams, and
    /// every team drafts `slots_per_team` drivers.
    pub fn new(
        mut order: Vec<DraftOrderEntry>,
        method: DraftMethod,
        slots_per_team: u32,
    ) -> Result<Self, DraftError> {
        if order.len() < 2 {
            return Err(DraftError::Configuration(format!(
                "draft order needs at least 2 teams, got {}",
                order.len()
            )));
        }
        if slots_per_team == 0 {
            return Err(DraftError::Configuration(
                "draftable slots per team must be at least 1".into(),
            ));
        }
        order::validate_order(&order)?;
        order.sort_by_key(|e| e.draft_position_number);

        Ok(TurnState {
            order,
            method,
            slots_per_team,
            phase: DraftPhase::NotStarted,
            picks: Vec::new(),
            picked_drivers: HashSet::new(),
        })
    }

    pub fn phase(&self) -> DraftPhase {
        self.phase
    }

    pub fn method(&self) -> DraftMethod {
        self.method
    }

    pub fn order(&self) -> &[DraftOrderEntry] {
        &self.order
    }

    pub fn picks(&self) -> &[DraftPick] {
        &self.picks
    }

    pub fn team_count(&self) -> u32 {
        self.order.len() as u32
    }

    /// Picks needed to fill every roster.
    pub fn total_picks(&self) -> u32 {
        self.team_count() * self.slots_per_team
    }

    /// Number of the most recent observed pick (0 before any pick).
    pub fn last_pick_number(&self) -> u32 {
        self.picks.len() as u32
    }

    pub fn is_picked(&self, driver_id: DriverId) -> bool {
        self.picked_drivers.contains(&driver_id)
    }

    /// Resolve `pick_number` to its round, slot and owning team.
    pub fn slot_for(&self, pick_number: u32) -> Option<TurnSlot> {
        if pick_number == 0 || pick_number > self.total_picks() {
            return None;
        }
        let n = self.team_count();
        let round = round_for_pick(pick_number, n);
        let position = position_in_round(pick_number, n);
        let holder = order::holder_for(&self.order, self.method, round, position)?;
        Some(TurnSlot {
            pick_number,
            round,
            position,
            team_id: holder.team_id,
            team_name: holder.team_name.clone(),
        })
    }

    /// The slot that should be filled next, or `None` once every slot is.
    pub fn current_slot(&self) -> Option<TurnSlot> {
        if self.phase == DraftPhase::Completed {
            return None;
        }
        self.slot_for(self.last_pick_number() + 1)
    }

    /// Explicit start signal. Returns whether the phase changed.
    pub fn start(&mut self) -> bool {
        if self.phase == DraftPhase::NotStarted {
            info!("Draft started");
            self.phase = DraftPhase::InProgress;
            true
        } else {
            false
        }
    }

    /// Append a pick from the server log.
    ///
    /// The pick must fill exactly the expected next slot with the team that
    /// holds it, and its driver must not have been picked before.
    pub fn observe_pick(&mut self, pick: DraftPick) -> Result<PickOutcome, SequenceFault> {
        let observed = self.last_pick_number();

        if pick.pick_number >= 1 && pick.pick_number <= observed {
            let existing = &self.picks[pick.pick_number as usize - 1];
            if existing.id == pick.id
                && existing.driver_id == pick.driver_id
                && existing.team_id == pick.team_id
            {
                return Ok(PickOutcome::AlreadyObserved);
            }
            return Err(SequenceFault::DuplicateSlot {
                pick_number: pick.pick_number,
            });
        }

        let expected_number = observed + 1;
        let expected = match self.current_slot() {
            Some(slot) if slot.pick_number == pick.pick_number && slot.round == pick.round => slot,
            _ => {
                return Err(SequenceFault::UnexpectedPick {
                    expected: expected_number,
                    expected_round: round_for_pick(expected_number, self.team_count()),
                    found: pick.pick_number,
                    found_round: pick.round,
                })
            }
        };

        if pick.team_id != expected.team_id {
            return Err(SequenceFault::WrongTeam {
                pick_number: pick.pick_number,
                expected: expected.team_id,
                found: pick.team_id,
            });
        }

        if self.picked_drivers.contains(&pick.driver_id) {
            return Err(SequenceFault::DuplicateDriver {
                driver_id: pick.driver_id,
                pick_number: pick.pick_number,
            });
        }

        info!(
            "Pick #{} (round {}): team {} took driver {}{}",
            pick.pick_number,
            pick.round,
            pick.team_id,
            pick.driver_id,
            if pick.is_auto_pick { " [auto]" } else { "" }
        );

        self.picked_drivers.insert(pick.driver_id);
        self.picks.push(pick);

        if self.phase == DraftPhase::NotStarted {
            self.start();
        }
        if self.last_pick_number() >= self.total_picks() {
            info!("Draft completed after {} picks", self.last_pick_number());
            self.phase = DraftPhase::Completed;
        }

        Ok(PickOutcome::Advanced {
            next: self.current_slot(),
        })
    }

    /// Check a status snapshot against the observed log and update the phase.
    ///
    /// The reported pick count must equal the observed log length and, while
    /// the draft runs, the reported turn pointer must match the expected slot.
    pub fn apply_status(
        &mut self,
        status: &DraftStatus,
    ) -> Result<Option<PhaseChange>, SequenceFault> {
        let observed = self.last_pick_number();
        if status.total_picks_made != observed {
            return Err(SequenceFault::CountMismatch {
                reported: status.total_picks_made,
                observed,
            });
        }

        let complete = status.is_draft_complete || observed >= self.total_picks();

        if !complete && status.current_round > 0 {
            if let Some(expected) = self.current_slot() {
                if status.current_round != expected.round
                    || status.current_position != expected.position
                {
                    return Err(SequenceFault::PointerMismatch {
                        reported_round: status.current_round,
                        reported_position: status.current_position,
                        expected_round: expected.round,
                        expected_position: expected.position,
                    });
                }
            }
        }

        let from = self.phase;
        let started = from != DraftPhase::NotStarted
            || observed > 0
            || status.time_remaining_seconds.is_some();

        let to = if from == DraftPhase::Completed || complete {
            DraftPhase::Completed
        } else if !started {
            DraftPhase::NotStarted
        } else if status.is_draft_paused {
            DraftPhase::Paused
        } else {
            DraftPhase::InProgress
        };

        if from == to {
            return Ok(None);
        }

        match to {
            DraftPhase::Paused => info!("Draft paused by server"),
            DraftPhase::InProgress if from == DraftPhase::Paused => info!("Draft resumed"),
            DraftPhase::InProgress => info!("Draft started"),
            DraftPhase::Completed => info!("Draft marked complete by server"),
            DraftPhase::NotStarted => {}
        }
        self.phase = to;
        Ok(Some(PhaseChange { from, to }))
    }

    /// Replace the whole log with a freshly fetched one.
    ///
    /// The log is replayed from scratch. On a fault the previous state is
    /// kept untouched and the fault returned.
    pub fn replace_log(&mut self, mut picks: Vec<DraftPick>) -> Result<(), SequenceFault> {
        picks.sort_by_key(|p| p.pick_number);

        let mut fresh = TurnState {
            order: self.order.clone(),
            method: self.method,
            slots_per_team: self.slots_per_team,
            phase: DraftPhase::NotStarted,
            picks: Vec::with_capacity(picks.len()),
            picked_drivers: HashSet::new(),
        };
        for pick in picks {
            if let PickOutcome::AlreadyObserved = fresh.observe_pick(pick)? {
                warn!("Full pick log contained a repeated entry");
            }
        }

        // Pause is a server flag, not derivable from the log.
        if self.phase == DraftPhase::Paused && fresh.phase == DraftPhase::InProgress {
            fresh.phase = DraftPhase::Paused;
        }
        if self.phase != DraftPhase::NotStarted && fresh.phase == DraftPhase::NotStarted {
            fresh.phase = self.phase;
        }

        *self = fresh;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn order4() -> Vec<DraftOrderEntry> {
        ["A", "B", "C", "D"]
            .iter()
            .enumerate()
            .map(|(i, name)| DraftOrderEntry {
                draft_position_number: i as u32 + 1,
                team_id: i as TeamId + 1,
                team_name: name.to_string(),
            })
            .collect()
    }

    fn pick(pick_number: u32, team_id: TeamId, driver_id: DriverId) -> DraftPick {
        DraftPick {
            id: pick_number as i64 * 100,
            round: round_for_pick(pick_number, 4),
            pick_number,
            team_id,
            driver_id,
            is_auto_pick: false,
            created_at: Utc::now(),
        }
    }

    fn status(picks_made: u32, round: u32, position: u32) -> DraftStatus {
        DraftStatus {
            draft_method: DraftMethod::Snake,
            is_draft_complete: false,
            total_teams: 4,
            total_picks_made: picks_made,
            current_round: round,
            current_position: position,
            current_team: None,
            next_pick: None,
            time_remaining_seconds: Some(60),
            is_draft_paused: false,
        }
    }

    fn snake() -> TurnState {
        TurnState::new(order4(), DraftMethod::Snake, 2).unwrap()
    }

    #[test]
    fn new_rejects_small_or_broken_orders() {
        let mut order = order4();
        order.truncate(1);
        assert!(matches!(
            TurnState::new(order, DraftMethod::Snake, 2),
            Err(DraftError::Configuration(_))
        ));

        let mut order = order4();
        order[3].draft_position_number = 7;
        assert!(matches!(
            TurnState::new(order, DraftMethod::Snake, 2),
            Err(DraftError::SequenceConsistency(SequenceFault::InvalidOrder(_)))
        ));

        assert!(matches!(
            TurnState::new(order4(), DraftMethod::Snake, 0),
            Err(DraftError::Configuration(_))
        ));
    }

    #[test]
    fn snake_draft_serves_reverse_order_in_round_two() {
        let mut state = snake();
        assert_eq!(state.phase(), DraftPhase::NotStarted);

        for (n, team) in [(1, 1), (2, 2), (3, 3), (4, 4)] {
            state.observe_pick(pick(n, team, n as DriverId)).unwrap();
        }
        assert_eq!(state.phase(), DraftPhase::InProgress);

        let mut served = Vec::new();
        for n in 5..=8 {
            let slot = state.current_slot().unwrap();
            assert_eq!(slot.pick_number, n);
            assert_eq!(slot.round, 2);
            served.push(slot.team_name.clone());
            state.observe_pick(pick(n, slot.team_id, n as DriverId)).unwrap();
        }
        assert_eq!(served, vec!["D", "C", "B", "A"]);
        assert_eq!(state.phase(), DraftPhase::Completed);
        assert!(state.current_slot().is_none());
    }

    #[test]
    fn same_pick_twice_is_absorbed() {
        let mut state = snake();
        let p = pick(1, 1, 44);
        state.observe_pick(p.clone()).unwrap();
        assert_eq!(state.observe_pick(p).unwrap(), PickOutcome::AlreadyObserved);
        assert_eq!(state.last_pick_number(), 1);
    }

    #[test]
    fn two_picks_for_one_slot_is_a_fault() {
        let mut state = snake();
        state.observe_pick(pick(1, 1, 44)).unwrap();
        let mut other = pick(1, 1, 16);
        other.id = 999;
        assert_eq!(
            state.observe_pick(other),
            Err(SequenceFault::DuplicateSlot { pick_number: 1 })
        );
    }

    #[test]
    fn skipped_slot_is_a_fault() {
        let mut state = snake();
        let err = state.observe_pick(pick(2, 2, 44)).unwrap_err();
        assert!(matches!(err, SequenceFault::UnexpectedPick { expected: 1, found: 2, .. }));
    }

    #[test]
    fn wrong_round_is_a_fault() {
        let mut state = snake();
        let mut p = pick(1, 1, 44);
        p.round = 2;
        assert!(matches!(
            state.observe_pick(p),
            Err(SequenceFault::UnexpectedPick { .. })
        ));
    }

    #[test]
    fn wrong_team_is_a_fault() {
        let mut state = snake();
        assert_eq!(
            state.observe_pick(pick(1, 3, 44)),
            Err(SequenceFault::WrongTeam {
                pick_number: 1,
                expected: 1,
                found: 3
            })
        );
    }

    #[test]
    fn driver_cannot_be_picked_twice() {
        let mut state = snake();
        state.observe_pick(pick(1, 1, 44)).unwrap();
        assert!(matches!(
            state.observe_pick(pick(2, 2, 44)),
            Err(SequenceFault::DuplicateDriver { driver_id: 44, .. })
        ));
        assert!(state.is_picked(44));
    }

    #[test]
    fn status_count_must_match_log() {
        let mut state = snake();
        state.observe_pick(pick(1, 1, 44)).unwrap();
        assert_eq!(
            state.apply_status(&status(2, 1, 3)),
            Err(SequenceFault::CountMismatch {
                reported: 2,
                observed: 1
            })
        );
    }

    #[test]
    fn status_pointer_must_match_expected_slot() {
        let mut state = snake();
        for (n, team) in [(1, 1), (2, 2), (3, 3), (4, 4)] {
            state.observe_pick(pick(n, team, n as DriverId)).unwrap();
        }
        assert!(state.apply_status(&status(4, 2, 1)).is_ok());
        assert!(matches!(
            state.apply_status(&status(4, 1, 4)),
            Err(SequenceFault::PointerMismatch { .. })
        ));
    }

    #[test]
    fn pause_and_resume_follow_server_flag() {
        let mut state = snake();
        let change = state.apply_status(&status(0, 1, 1)).unwrap();
        assert_eq!(
            change,
            Some(PhaseChange {
                from: DraftPhase::NotStarted,
                to: DraftPhase::InProgress
            })
        );

        let mut paused = status(0, 1, 1);
        paused.is_draft_paused = true;
        assert_eq!(state.apply_status(&paused).unwrap().unwrap().to, DraftPhase::Paused);
        assert_eq!(state.apply_status(&paused).unwrap(), None);

        assert_eq!(
            state.apply_status(&status(0, 1, 1)).unwrap().unwrap().to,
            DraftPhase::InProgress
        );
    }

    #[test]
    fn status_without_clock_keeps_draft_not_started() {
        let mut state = snake();
        let mut idle = status(0, 1, 1);
        idle.time_remaining_seconds = None;
        assert_eq!(state.apply_status(&idle).unwrap(), None);
        assert_eq!(state.phase(), DraftPhase::NotStarted);
    }

    #[test]
    fn complete_flag_ends_draft_early() {
        let mut state = snake();
        state.observe_pick(pick(1, 1, 44)).unwrap();
        let mut done = status(1, 1, 2);
        done.is_draft_complete = true;
        assert_eq!(state.apply_status(&done).unwrap().unwrap().to, DraftPhase::Completed);
        assert!(state.current_slot().is_none());

        // Completed is terminal.
        assert_eq!(state.apply_status(&status(1, 1, 2)).unwrap(), None);
    }

    #[test]
    fn replace_log_replays_from_scratch() {
        let mut state = snake();
        state.observe_pick(pick(1, 1, 44)).unwrap();

        let refetched = vec![pick(2, 2, 16), pick(1, 1, 44), pick(3, 3, 1)];
        state.replace_log(refetched).unwrap();
        assert_eq!(state.last_pick_number(), 3);
        assert_eq!(state.current_slot().unwrap().team_id, 4);
    }

    #[test]
    fn replace_log_keeps_state_on_fault() {
        let mut state = snake();
        state.observe_pick(pick(1, 1, 44)).unwrap();
        let broken = vec![pick(1, 1, 44), pick(3, 3, 16)];
        assert!(state.replace_log(broken).is_err());
        assert_eq!(state.last_pick_number(), 1);
    }

    #[test]
    fn replace_log_preserves_pause() {
        let mut state = snake();
        let mut paused = status(0, 1, 1);
        paused.is_draft_paused = true;
        state.apply_status(&paused).unwrap();
        state.replace_log(vec![pick(1, 1, 44)]).unwrap();
        assert_eq!(state.phase(), DraftPhase::Paused);
    }
}
