// Individual pick and driver representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Team identifier as assigned by the draft server.
pub type TeamId = i64;

/// Driver identifier as assigned by the draft server.
pub type DriverId = i64;

/// A driver that can be drafted for a race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: DriverId,
    /// Racing number. Some feeds omit it for reserve drivers.
    #[serde(default)]
    pub number: Option<u32>,
    pub name: String,
    /// Constructor (team) the driver races for, e.g. "Ferrari".
    pub constructor: String,
    /// Points accumulated so far this season.
    #[serde(default)]
    pub season_points: f64,
}

/// A single recorded draft pick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftPick {
    pub id: i64,
    /// Round the pick belongs to (1-indexed).
    pub round: u32,
    /// Sequential pick number across the whole draft (1-indexed).
    pub pick_number: u32,
    pub team_id: TeamId,
    pub driver_id: DriverId,
    /// Whether the pick was substituted by an auto-pick.
    #[serde(default)]
    pub is_auto_pick: bool,
    pub created_at: DateTime<Utc>,
}

/// Round a pick number falls in: `ceil(pick_number / team_count)`.
///
/// Returns 0 when either argument is 0 (no valid slot).
pub fn round_for_pick(pick_number: u32, team_count: u32) -> u32 {
    if pick_number == 0 || team_count == 0 {
        return 0;
    }
    pick_number.div_ceil(team_count)
}

/// 1-indexed position of a pick within its round.
pub fn position_in_round(pick_number: u32, team_count: u32) -> u32 {
    if pick_number == 0 || team_count == 0 {
        return 0;
    }
    (pick_number - 1) % team_count + 1
}

/// Pick number of the slot at `(round, position)`.
pub fn pick_number_for(round: u32, position: u32, team_count: u32) -> u32 {
    (round.saturating_sub(1)) * team_count + position
}
