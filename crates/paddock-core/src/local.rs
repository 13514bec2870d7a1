// In-process draft server backed by SQLite.
//
// Plays the authoritative side of a draft: stores the one-shot order, accepts
// or rejects picks, runs the turn clock, and auto-picks for a team whose clock
// runs out. Expired turns are settled lazily, on the next request.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::db::{Database, NewPick, PickInsert, StoredOrder};
use crate::draft::autopick::{self, AutoPickStrategy};
use crate::draft::order::{self, DraftOrderEntry, TeamRef};
use crate::draft::pick::{position_in_round, round_for_pick, DraftPick, Driver};
use crate::error::{DraftError, ServiceError};
use crate::protocol::{DraftKey, DraftStatus, NextPick, OrderRequest, PickRequest};
use crate::service::DraftService;

/// Turn clock for the slot currently open.
#[derive(Debug, Default)]
struct TurnClock {
    /// Pick number the clock runs for; 0 before the first turn opens.
    pick_number: u32,
    deadline: Option<Instant>,
    paused: bool,
    /// Remaining time held while paused.
    frozen: Duration,
}

impl TurnClock {
    fn restart(&mut self, pick_number: u32, now: Instant, turn: Duration) {
        self.pick_number = pick_number;
        if self.paused {
            self.frozen = turn;
            self.deadline = None;
        } else {
            self.deadline = Some(now + turn);
        }
    }

    fn remaining(&self, now: Instant) -> Option<Duration> {
        if self.paused {
            Some(self.frozen)
        } else {
            self.deadline.map(|d| d.saturating_duration_since(now))
        }
    }

    fn stop(&mut self) {
        self.deadline = None;
        self.pick_number = 0;
    }
}

pub struct LocalDraftServer {
    key: DraftKey,
    db: Database,
    teams: Vec<TeamRef>,
    slots_per_team: u32,
    turn: Duration,
    clock: Mutex<TurnClock>,
}

impl LocalDraftServer {
    pub fn new(
        db: Database,
        key: DraftKey,
        teams: Vec<TeamRef>,
        slots_per_team: u32,
        turn: Duration,
    ) -> Result<Self, DraftError> {
        if teams.len() < 2 {
            return Err(DraftError::Configuration(format!(
                "local draft needs at least 2 teams, got {}",
                teams.len()
            )));
        }
        if slots_per_team == 0 || turn.is_zero() {
            return Err(DraftError::Configuration(
                "slots per team and turn length must be positive".into(),
            ));
        }
        Ok(LocalDraftServer {
            key,
            db,
            teams,
            slots_per_team,
            turn,
            clock: Mutex::new(TurnClock::default()),
        })
    }

    pub fn key(&self) -> DraftKey {
        self.key
    }

    fn clock(&self) -> MutexGuard<'_, TurnClock> {
        self.clock.lock().expect("turn clock mutex poisoned")
    }

    /// Store drivers for this race.
    pub fn seed_drivers(&self, drivers: &[Driver]) -> Result<usize, ServiceError> {
        self.db.upsert_drivers(self.key, drivers).map_err(storage)
    }

    fn total_picks(&self, stored: &StoredOrder) -> u32 {
        stored.entries.len() as u32 * self.slots_per_team
    }

    fn stored_order(&self) -> Result<StoredOrder, ServiceError> {
        self.db
            .load_order(self.key)
            .map_err(storage)?
            .ok_or_else(|| ServiceError::NotFound(format!("draft order for {}", self.key)))
    }

    // ------------------------------------------------------------------
    // Clock control
    // ------------------------------------------------------------------

    /// Freeze the turn clock.
    pub fn pause(&self) -> Result<(), ServiceError> {
        self.settle()?;
        let now = Instant::now();
        let mut clock = self.clock();
        if clock.paused {
            return Ok(());
        }
        clock.frozen = clock.remaining(now).unwrap_or(self.turn);
        clock.deadline = None;
        clock.paused = true;
        info!("{}: draft paused with {:?} left", self.key, clock.frozen);
        Ok(())
    }

    /// Restart the clock from where the pause froze it.
    pub fn resume(&self) -> Result<(), ServiceError> {
        let now = Instant::now();
        let mut clock = self.clock();
        if !clock.paused {
            return Ok(());
        }
        clock.paused = false;
        if clock.pick_number > 0 {
            clock.deadline = Some(now + clock.frozen);
        }
        info!("{}: draft resumed", self.key);
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.clock().paused
    }

    /// Open the clock for the next slot and auto-pick every turn whose clock
    /// has run out since the last request.
    fn settle(&self) -> Result<(), ServiceError> {
        let stored = match self.db.load_order(self.key).map_err(storage)? {
            Some(stored) => stored,
            None => return Ok(()),
        };
        let total = self.total_picks(&stored);

        loop {
            let made = self.db.pick_count(self.key).map_err(storage)?;
            let now = Instant::now();
            let deadline = {
                let mut clock = self.clock();
                if made >= total {
                    clock.stop();
                    return Ok(());
                }
                if clock.pick_number != made + 1 {
                    clock.restart(made + 1, now, self.turn);
                }
                match clock.deadline {
                    Some(d) if !clock.paused && d <= now => d,
                    _ => return Ok(()),
                }
            };

            let pick_number = made + 1;
            let Some(slot) = self.slot(&stored, pick_number) else {
                return Ok(());
            };
            let pool = self.db.available_drivers(self.key).map_err(storage)?;
            let driver_id = match autopick::resolve(&pool, &[], AutoPickStrategy::HighestRanked) {
                Ok(id) => id,
                Err(e) => {
                    warn!("{}: cannot auto-pick #{}: {}", self.key, pick_number, e);
                    self.clock().stop();
                    return Ok(());
                }
            };

            let pick = NewPick {
                round: slot.1,
                pick_number,
                team_id: slot.0.team_id,
                driver_id,
                is_auto_pick: true,
            };
            match self.db.insert_pick(self.key, &pick).map_err(storage)? {
                PickInsert::Inserted(_) => {
                    info!(
                        "{}: turn expired, auto-picked driver {} for team {} at #{}",
                        self.key, driver_id, slot.0.team_id, pick_number
                    );
                    // The next turn starts when this one ran out.
                    let mut clock = self.clock();
                    clock.pick_number = pick_number + 1;
                    clock.deadline = Some(deadline + self.turn);
                }
                PickInsert::SlotTaken | PickInsert::DriverTaken => {}
            }
        }
    }

    /// Holder and round of `pick_number`.
    fn slot<'a>(
        &self,
        stored: &'a StoredOrder,
        pick_number: u32,
    ) -> Option<(&'a DraftOrderEntry, u32)> {
        let n = stored.entries.len() as u32;
        let round = round_for_pick(pick_number, n);
        let position = position_in_round(pick_number, n);
        order::holder_for(&stored.entries, stored.method, round, position).map(|e| (e, round))
    }

    // ------------------------------------------------------------------
    // Order regeneration
    // ------------------------------------------------------------------

    /// Replace the stored order with a freshly generated one. Rejected with
    /// `OrderLocked` once any pick exists.
    pub fn regenerate_order(
        &self,
        request: OrderRequest,
    ) -> Result<Vec<DraftOrderEntry>, ServiceError> {
        if self.db.pick_count(self.key).map_err(storage)? > 0 {
            return Err(ServiceError::OrderLocked);
        }
        let entries = self.generate(request)?;
        self.db
            .replace_order(self.key, request.method, request.snake_base, &entries)
            .map_err(storage)?;
        self.clock().stop();
        info!("{}: draft order regenerated ({})", self.key, request.method.as_str());
        Ok(entries)
    }

    fn generate(&self, request: OrderRequest) -> Result<Vec<DraftOrderEntry>, ServiceError> {
        order::generate_order(&self.teams, request.method, request.snake_base, &mut rand::rng())
            .map_err(|e| ServiceError::Unexpected {
                status: 422,
                message: e.to_string(),
            })
    }
}

fn storage(e: anyhow::Error) -> ServiceError {
    ServiceError::Storage(format!("{e:#}"))
}

#[async_trait]
impl DraftService for LocalDraftServer {
    async fn fetch_status(&self) -> Result<DraftStatus, ServiceError> {
        self.settle()?;
        let stored = self.stored_order()?;
        let made = self.db.pick_count(self.key).map_err(storage)?;
        let total = self.total_picks(&stored);
        let complete = made >= total;

        let next = if complete { None } else { self.slot(&stored, made + 1) };
        let n = stored.entries.len() as u32;
        let (remaining, paused) = {
            let clock = self.clock();
            let remaining = if complete {
                None
            } else {
                clock
                    .remaining(Instant::now())
                    .map(|d| d.as_secs_f64().ceil() as u32)
            };
            (remaining, clock.paused)
        };

        Ok(DraftStatus {
            draft_method: stored.method,
            is_draft_complete: complete,
            total_teams: n,
            total_picks_made: made,
            current_round: next.map(|(_, round)| round).unwrap_or(0),
            current_position: if complete { 0 } else { position_in_round(made + 1, n) },
            current_team: next.map(|(entry, _)| TeamRef {
                team_id: entry.team_id,
                team_name: entry.team_name.clone(),
            }),
            next_pick: next.map(|(entry, round)| NextPick {
                team_id: entry.team_id,
                round,
                position: position_in_round(made + 1, n),
            }),
            time_remaining_seconds: remaining,
            is_draft_paused: paused,
        })
    }

    async fn fetch_picks(&self, since: Option<u32>) -> Result<Vec<DraftPick>, ServiceError> {
        self.settle()?;
        self.db.load_picks(self.key, since).map_err(storage)
    }

    async fn fetch_available_drivers(&self) -> Result<Vec<Driver>, ServiceError> {
        self.settle()?;
        self.db.available_drivers(self.key).map_err(storage)
    }

    async fn fetch_drivers(&self) -> Result<Vec<Driver>, ServiceError> {
        self.db.load_drivers(self.key).map_err(storage)
    }

    async fn fetch_draft_order(&self) -> Result<Vec<DraftOrderEntry>, ServiceError> {
        Ok(self.stored_order()?.entries)
    }

    async fn submit_pick(&self, request: PickRequest) -> Result<DraftPick, ServiceError> {
        self.settle()?;
        let stored = self.stored_order()?;
        let made = self.db.pick_count(self.key).map_err(storage)?;
        let expected = made + 1;

        if made >= self.total_picks(&stored) || request.pick_number < expected {
            return Err(ServiceError::SlotTaken);
        }
        let (holder, round) = self
            .slot(&stored, expected)
            .ok_or_else(|| ServiceError::NotFound(format!("pick slot #{expected}")))?;
        if request.pick_number > expected || holder.team_id != request.team_id {
            return Err(ServiceError::NotYourTurn {
                team_id: request.team_id,
            });
        }

        let available = self.db.available_drivers(self.key).map_err(storage)?;
        if !available.iter().any(|d| d.id == request.driver_id) {
            return Err(ServiceError::DriverUnavailable {
                driver_id: request.driver_id,
            });
        }

        let pick = NewPick {
            round,
            pick_number: expected,
            team_id: request.team_id,
            driver_id: request.driver_id,
            is_auto_pick: request.is_auto_pick,
        };
        match self.db.insert_pick(self.key, &pick).map_err(storage)? {
            PickInsert::Inserted(recorded) => {
                info!(
                    "{}: team {} picked driver {} at #{}{}",
                    self.key,
                    recorded.team_id,
                    recorded.driver_id,
                    recorded.pick_number,
                    if recorded.is_auto_pick { " (auto)" } else { "" }
                );
                self.clock().restart(expected + 1, Instant::now(), self.turn);
                Ok(recorded)
            }
            PickInsert::SlotTaken => Err(ServiceError::SlotTaken),
            PickInsert::DriverTaken => Err(ServiceError::DriverUnavailable {
                driver_id: request.driver_id,
            }),
        }
    }

    async fn create_draft_order(
        &self,
        request: OrderRequest,
    ) -> Result<Vec<DraftOrderEntry>, ServiceError> {
        if self.db.load_order(self.key).map_err(storage)?.is_some() {
            return Err(ServiceError::OrderExists);
        }
        let entries = self.generate(request)?;
        let inserted = self
            .db
            .insert_order(self.key, request.method, request.snake_base, &entries)
            .map_err(storage)?;
        if !inserted {
            return Err(ServiceError::OrderExists);
        }
        self.clock().stop();
        info!(
            "{}: draft order created ({}, {} teams)",
            self.key,
            request.method.as_str(),
            entries.len()
        );
        Ok(entries)
    }
}
