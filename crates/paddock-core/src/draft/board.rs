// Board projection: read-only grids over an engine snapshot.

use crate::draft::order::{self, DraftMethod};
use crate::draft::pick::{position_in_round, DriverId, TeamId};
use crate::protocol::EngineSnapshot;

/// One slot of the board, filled or not.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardCell {
    pub pick_number: u32,
    pub round: u32,
    pub team_id: TeamId,
    pub team_name: String,
    pub driver_id: Option<DriverId>,
    /// Display label: driver name if known, else `#id`.
    pub driver_label: Option<String>,
    pub is_auto_pick: bool,
    /// This slot is the one being picked right now.
    pub is_current: bool,
}

/// All slots of a round in pick order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardRound {
    pub round: u32,
    pub cells: Vec<BoardCell>,
}

/// A team's slots across the draft, in round order.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamColumn {
    pub team_id: TeamId,
    pub team_name: String,
    pub draft_position_number: u32,
    pub cells: Vec<BoardCell>,
}

fn rounds(snapshot: &EngineSnapshot) -> u32 {
    let teams = snapshot.order.len() as u32;
    if teams == 0 {
        0
    } else {
        snapshot.total_picks / teams
    }
}

fn driver_label(snapshot: &EngineSnapshot, driver_id: DriverId) -> String {
    snapshot
        .drivers
        .get(&driver_id)
        .map(|d| d.name.clone())
        .unwrap_or_else(|| format!("#{driver_id}"))
}

fn cells_for_round(snapshot: &EngineSnapshot, method: DraftMethod, round: u32) -> Vec<BoardCell> {
    let teams = snapshot.order.len() as u32;
    let current = snapshot.current.as_ref().map(|s| s.pick_number);

    order::round_order(&snapshot.order, method, round)
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| {
            let pick_number = (round - 1) * teams + idx as u32 + 1;
            let pick = snapshot
                .picks
                .get(pick_number as usize - 1)
                .filter(|p| p.pick_number == pick_number);
            BoardCell {
                pick_number,
                round,
                team_id: entry.team_id,
                team_name: entry.team_name.clone(),
                driver_id: pick.map(|p| p.driver_id),
                driver_label: pick.map(|p| driver_label(snapshot, p.driver_id)),
                is_auto_pick: pick.is_some_and(|p| p.is_auto_pick),
                is_current: current == Some(pick_number),
            }
        })
        .collect()
}

/// The board as rows of rounds.
pub fn by_round(snapshot: &EngineSnapshot) -> Vec<BoardRound> {
    (1..=rounds(snapshot))
        .map(|round| BoardRound {
            round,
            cells: cells_for_round(snapshot, snapshot.method, round),
        })
        .collect()
}

/// The board as one column per team, in draft position order.
pub fn by_team(snapshot: &EngineSnapshot) -> Vec<TeamColumn> {
    let grid = by_round(snapshot);
    let mut entries: Vec<_> = snapshot.order.iter().collect();
    entries.sort_by_key(|e| e.draft_position_number);

    entries
        .into_iter()
        .map(|entry| TeamColumn {
            team_id: entry.team_id,
            team_name: entry.team_name.clone(),
            draft_position_number: entry.draft_position_number,
            cells: grid
                .iter()
                .flat_map(|r| r.cells.iter())
                .filter(|c| c.team_id == entry.team_id)
                .cloned()
                .collect(),
        })
        .collect()
}

/// Column index of the current slot within its round row.
pub fn current_column(snapshot: &EngineSnapshot) -> Option<usize> {
    let teams = snapshot.order.len() as u32;
    snapshot
        .current
        .as_ref()
        .and_then(|s| (position_in_round(s.pick_number, teams) as usize).checked_sub(1))
}
