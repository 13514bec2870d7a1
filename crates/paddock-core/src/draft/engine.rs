// Draft engine: the synchronous core the reconciliation loop drives.
//
// Owns the turn state machine, the countdown, and the connectivity tracker.
// Nothing outside this type mutates them; readers get an `EngineSnapshot`.

use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use crate::draft::autopick::{self, AutoPickStrategy};
use crate::draft::connectivity::ConnectivityTracker;
use crate::draft::countdown::{Countdown, ExpirySignal, TurnKey};
use crate::draft::order::{DraftMethod, DraftOrderEntry};
use crate::draft::pick::{DraftPick, Driver, DriverId, TeamId};
use crate::draft::turn::{DraftPhase, PhaseChange, PickOutcome, TurnSlot, TurnState};
use crate::error::{DraftError, SequenceFault, ServiceError};
use crate::protocol::{ConnectionStatus, DraftStatus, EngineSnapshot, PickRequest};

/// Static parameters for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// The observing user's team, if they own one in this league.
    pub my_team_id: Option<TeamId>,
    pub slots_per_team: u32,
    /// Fallback turn length when the server reports no remaining time.
    pub turn_seconds: u32,
    pub offline_after_failures: u32,
}

/// Everything one reconciliation cycle fetched.
#[derive(Debug, Clone)]
pub struct FetchBatch {
    pub status: DraftStatus,
    /// Picks after the requested `since`, or the whole log when `full`.
    pub picks: Vec<DraftPick>,
    /// Fresh available pool, when the cycle fetched one.
    pub available: Option<Vec<Driver>>,
    pub full: bool,
}

/// What applying a fetch batch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Applied {
        /// The turn holder slot moved.
        turn_changed: bool,
        phase_change: Option<PhaseChange>,
    },
    /// An incremental batch disagreed with the log; fetch everything again.
    RefetchRequired(SequenceFault),
    /// A full refetch still disagreed. Surfaced until a clean full fetch.
    Faulted(SequenceFault),
}

pub struct DraftEngine {
    turn: TurnState,
    countdown: Countdown,
    connectivity: ConnectivityTracker,
    settings: EngineSettings,
    catalog: HashMap<DriverId, Driver>,
    available: Vec<Driver>,
    pool_loaded: bool,
    fault: Option<SequenceFault>,
    refetch_pending: bool,
}

impl DraftEngine {
    pub fn new(
        order: Vec<DraftOrderEntry>,
        method: DraftMethod,
        settings: EngineSettings,
    ) -> Result<Self, DraftError> {
        let turn = TurnState::new(order, method, settings.slots_per_team)?;
        if let Some(me) = settings.my_team_id {
            if !turn.order().iter().any(|e| e.team_id == me) {
                warn!("Team {} is not in the draft order; observing only", me);
            }
        }
        info!(
            "Draft engine ready: {} teams, {} method, {} picks",
            turn.team_count(),
            method.as_str(),
            turn.total_picks()
        );

        Ok(DraftEngine {
            turn,
            countdown: Countdown::new(),
            connectivity: ConnectivityTracker::new(settings.offline_after_failures),
            settings,
            catalog: HashMap::new(),
            available: Vec::new(),
            pool_loaded: false,
            fault: None,
            refetch_pending: false,
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn phase(&self) -> DraftPhase {
        self.turn.phase()
    }

    pub fn current_slot(&self) -> Option<TurnSlot> {
        self.turn.current_slot()
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.connectivity.status()
    }

    pub fn fault(&self) -> Option<&SequenceFault> {
        self.fault.as_ref()
    }

    pub fn available(&self) -> &[Driver] {
        &self.available
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    /// Whether the observing user holds the current turn of a running draft.
    pub fn is_my_turn(&self) -> bool {
        if !matches!(self.phase(), DraftPhase::InProgress | DraftPhase::Paused) {
            return false;
        }
        match (self.settings.my_team_id, self.turn.current_slot()) {
            (Some(me), Some(slot)) => slot.team_id == me,
            _ => false,
        }
    }

    /// `since` for the next incremental pick fetch, or `None` when the next
    /// fetch must be a full one.
    pub fn picks_since(&self) -> Option<u32> {
        if self.refetch_pending || self.fault.is_some() {
            None
        } else {
            Some(self.turn.last_pick_number())
        }
    }

    /// Whether the next cycle should fetch the available pool.
    pub fn wants_available_pool(&self) -> bool {
        !self.pool_loaded || self.is_my_turn()
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Replace the driver catalog used for board names and roster lookups.
    pub fn set_driver_catalog(&mut self, drivers: Vec<Driver>) {
        self.catalog = drivers.into_iter().map(|d| (d.id, d)).collect();
    }

    /// Force the pool to be refetched on the next cycle.
    pub fn invalidate_pool(&mut self) {
        self.pool_loaded = false;
    }

    /// Feed one reconciliation cycle into the engine.
    pub fn apply_fetch(&mut self, batch: FetchBatch) -> CycleOutcome {
        self.connectivity.record_success();
        let before = self.turn.current_slot().map(|s| s.pick_number);
        let phase_before = self.turn.phase();

        if let Err(fault) = self.apply_picks(batch.picks, batch.full) {
            return self.on_fault(fault, batch.full);
        }
        if let Err(fault) = self.turn.apply_status(&batch.status) {
            return self.on_fault(fault, batch.full);
        }
        let phase_after = self.turn.phase();
        let phase_change = (phase_before != phase_after).then_some(PhaseChange {
            from: phase_before,
            to: phase_after,
        });

        if batch.full {
            if self.fault.take().is_some() {
                info!("Pick log consistent again after full refetch");
            }
            self.refetch_pending = false;
        }

        if let Some(pool) = batch.available {
            self.available = pool;
            self.pool_loaded = true;
        }
        let turn = &self.turn;
        self.available.retain(|d| !turn.is_picked(d.id));

        self.sync_countdown(&batch.status);

        let after = self.turn.current_slot().map(|s| s.pick_number);
        let turn_changed = before != after;
        if turn_changed {
            if let Some(slot) = self.turn.current_slot() {
                info!(
                    "Turn: pick #{} round {} position {}, {} ({})",
                    slot.pick_number, slot.round, slot.position, slot.team_name, slot.team_id
                );
            }
        }

        CycleOutcome::Applied {
            turn_changed,
            phase_change,
        }
    }

    fn apply_picks(&mut self, mut picks: Vec<DraftPick>, full: bool) -> Result<(), SequenceFault> {
        if full {
            return self.turn.replace_log(picks);
        }
        picks.sort_by_key(|p| p.pick_number);
        for pick in picks {
            if let PickOutcome::AlreadyObserved = self.turn.observe_pick(pick)? {
                debug!("Skipping pick already in the log");
            }
        }
        Ok(())
    }

    fn on_fault(&mut self, fault: SequenceFault, full: bool) -> CycleOutcome {
        if full {
            error!("Consistency fault persists after full refetch: {}", fault);
            self.fault = Some(fault.clone());
            CycleOutcome::Faulted(fault)
        } else {
            warn!("Consistency fault, requesting full refetch: {}", fault);
            self.refetch_pending = true;
            CycleOutcome::RefetchRequired(fault)
        }
    }

    fn sync_countdown(&mut self, status: &DraftStatus) {
        let phase = self.turn.phase();
        let slot = match (phase, self.turn.current_slot()) {
            (DraftPhase::InProgress | DraftPhase::Paused, Some(slot)) => slot,
            _ => {
                if self.countdown.timer().is_some() {
                    debug!("Clearing countdown ({})", phase.label());
                }
                self.countdown.clear();
                return;
            }
        };

        let key = TurnKey {
            round: slot.round,
            position: slot.position,
        };
        let paused = phase == DraftPhase::Paused;
        match status.time_remaining_seconds {
            Some(remaining) => self.countdown.reconcile(key, remaining, paused),
            None if self.countdown.turn() == Some(key) => self.countdown.set_paused(paused),
            None => self
                .countdown
                .reconcile(key, self.settings.turn_seconds, paused),
        }
    }

    /// Record a failed cycle. The last good state is kept for display.
    pub fn record_fetch_failure(&mut self, err: &ServiceError) -> Option<ConnectionStatus> {
        self.connectivity.record_failure(err.to_string())
    }

    /// Advance the displayed clock by one second.
    pub fn tick(&mut self) -> Option<ExpirySignal> {
        let mine = self.is_my_turn();
        self.countdown.tick(mine)
    }

    /// Tear down the countdown (draft view closed).
    pub fn close(&mut self) {
        self.countdown.clear();
    }

    // -----------------------------------------------------------------------
    // Picks
    // -----------------------------------------------------------------------

    /// Build a pick request for the user's chosen driver.
    ///
    /// Rejected locally with the same conflicts the server would report when
    /// the user does not hold the turn or the driver is gone.
    pub fn prepare_pick(&self, driver_id: DriverId) -> Result<PickRequest, DraftError> {
        let team_id = self.my_team()?;
        if !self.is_my_turn() {
            return Err(DraftError::SubmissionConflict(ServiceError::NotYourTurn { team_id }));
        }
        if self.turn.is_picked(driver_id) || !self.available.iter().any(|d| d.id == driver_id) {
            return Err(DraftError::SubmissionConflict(
                ServiceError::DriverUnavailable { driver_id },
            ));
        }
        let pick_number = self.turn.last_pick_number() + 1;
        Ok(PickRequest {
            pick_number,
            team_id,
            driver_id,
            is_auto_pick: false,
        })
    }

    /// Propose an auto-pick for an expired turn.
    ///
    /// Returns `Ok(None)` when `signal` no longer names the current turn or
    /// the turn is not the user's.
    pub fn propose_auto_pick(
        &self,
        signal: ExpirySignal,
        strategy: AutoPickStrategy,
    ) -> Result<Option<PickRequest>, DraftError> {
        let team_id = self.my_team()?;
        let current = match self.turn.current_slot() {
            Some(slot)
                if slot.round == signal.turn.round && slot.position == signal.turn.position =>
            {
                slot
            }
            _ => return Ok(None),
        };
        if current.team_id != team_id || !self.is_my_turn() {
            return Ok(None);
        }

        let turn = &self.turn;
        let pool: Vec<Driver> = self
            .available
            .iter()
            .filter(|d| !turn.is_picked(d.id))
            .cloned()
            .collect();
        let roster = self.roster_of(team_id);

        let driver_id = autopick::resolve(&pool, &roster, strategy)?;
        info!(
            "Auto-pick proposal for pick #{}: driver {} ({:?})",
            current.pick_number, driver_id, strategy
        );
        Ok(Some(PickRequest {
            pick_number: current.pick_number,
            team_id,
            driver_id,
            is_auto_pick: true,
        }))
    }

    /// Drivers held by `team_id`, resolved through the catalog.
    pub fn roster_of(&self, team_id: TeamId) -> Vec<Driver> {
        self.turn
            .picks()
            .iter()
            .filter(|p| p.team_id == team_id)
            .filter_map(|p| self.catalog.get(&p.driver_id).cloned())
            .collect()
    }

    fn my_team(&self) -> Result<TeamId, DraftError> {
        self.settings.my_team_id.ok_or_else(|| {
            DraftError::Configuration("no team configured for this user (league.my_team_id)".into())
        })
    }

    /// Read-only copy of everything the UI renders.
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            phase: self.turn.phase(),
            method: self.turn.method(),
            order: self.turn.order().to_vec(),
            current: self.turn.current_slot(),
            my_team_id: self.settings.my_team_id,
            is_my_turn: self.is_my_turn(),
            timer: self.countdown.timer(),
            picks: self.turn.picks().to_vec(),
            total_picks: self.turn.total_picks(),
            drivers: self.catalog.clone(),
            available: self.available.clone(),
            connection: self.connectivity.status(),
            fault: self.fault.as_ref().map(|f| f.to_string()),
        }
    }
}
