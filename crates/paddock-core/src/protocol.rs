// Message types shared between the collaborator, the reconciliation loop,
// and the UI.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::draft::countdown::DraftTimer;
use crate::draft::order::{BaseOrder, DraftMethod, DraftOrderEntry, TeamRef};
use crate::draft::pick::{DraftPick, Driver, DriverId, TeamId};
use crate::draft::turn::{DraftPhase, TurnSlot};

// ---------------------------------------------------------------------------
// Collaborator wire types
// ---------------------------------------------------------------------------

/// Identifies one draft: a race within a league.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftKey {
    pub league_id: i64,
    pub race_id: i64,
}

impl fmt::Display for DraftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "league {} race {}", self.league_id, self.race_id)
    }
}

/// The slot the server expects to be filled next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextPick {
    pub team_id: TeamId,
    pub round: u32,
    pub position: u32,
}

/// Server-authoritative draft status, pulled once per reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftStatus {
    pub draft_method: DraftMethod,
    pub is_draft_complete: bool,
    pub total_teams: u32,
    pub total_picks_made: u32,
    pub current_round: u32,
    /// Slot within the current round (1-indexed), before snake reversal is
    /// resolved against the order.
    pub current_position: u32,
    #[serde(default)]
    pub current_team: Option<TeamRef>,
    #[serde(default)]
    pub next_pick: Option<NextPick>,
    /// Remaining seconds on the current turn clock, when one is running.
    #[serde(default)]
    pub time_remaining_seconds: Option<u32>,
    #[serde(default)]
    pub is_draft_paused: bool,
}

/// Parameters for the one-shot order creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub method: DraftMethod,
    pub snake_base: BaseOrder,
}

/// Outcome of a create-order attempt. An existing order is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderCreation {
    Created(Vec<DraftOrderEntry>),
    Existing(Vec<DraftOrderEntry>),
}

impl OrderCreation {
    pub fn order(&self) -> &[DraftOrderEntry] {
        match self {
            OrderCreation::Created(order) | OrderCreation::Existing(order) => order,
        }
    }

    pub fn into_order(self) -> Vec<DraftOrderEntry> {
        match self {
            OrderCreation::Created(order) | OrderCreation::Existing(order) => order,
        }
    }
}

/// A pick submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickRequest {
    /// The slot the submitter believes it is filling. A server that has
    /// already filled it answers with a slot conflict.
    pub pick_number: u32,
    pub team_id: TeamId,
    pub driver_id: DriverId,
    pub is_auto_pick: bool,
}

// ---------------------------------------------------------------------------
// UI-facing types
// ---------------------------------------------------------------------------

/// Health of the link to the draft server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// No successful fetch yet.
    Connecting,
    Connected,
    /// The last fetch failed after at least one success.
    Error,
    /// Consecutive failures reached the configured threshold.
    Offline,
}

/// Read-only copy of the engine state, published after every mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSnapshot {
    pub phase: DraftPhase,
    pub method: DraftMethod,
    pub order: Vec<DraftOrderEntry>,
    pub current: Option<TurnSlot>,
    pub my_team_id: Option<TeamId>,
    pub is_my_turn: bool,
    pub timer: Option<DraftTimer>,
    pub picks: Vec<DraftPick>,
    pub total_picks: u32,
    /// Driver catalog keyed by id, for names on the board.
    pub drivers: HashMap<DriverId, Driver>,
    pub available: Vec<Driver>,
    pub connection: ConnectionStatus,
    /// A persistent consistency fault, shown as an explicit error.
    pub fault: Option<String>,
}

/// Updates pushed from the session loop to the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    Snapshot(Box<EngineSnapshot>),
    /// Per-tick timer refresh, cheaper than a full snapshot.
    Timer(Option<DraftTimer>),
    ConnectionStatus(ConnectionStatus),
    /// A transient, informational message (e.g. a pick was re-presented).
    Notice(String),
    /// An actionable error the user should see.
    Error(String),
}

/// Commands sent from the UI to the session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// Run a reconciliation cycle now.
    Refresh,
    SubmitPick { driver_id: DriverId },
    /// Create the draft order, or display the existing one.
    CreateOrder,
    Quit,
}
