// Draft order generation and per-round turn resolution.
//
// The order is generated once per (league, race) and only the round-1
// sequence is stored. Later rounds are derived from it: sequential and random
// drafts repeat the base order, snake drafts reverse it on even rounds.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::draft::pick::TeamId;
use crate::error::{DraftError, SequenceFault};

/// How the draft sequence is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftMethod {
    Random,
    Sequential,
    Snake,
}

impl DraftMethod {
    /// The wire/config tag for this method.
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftMethod::Random => "random",
            DraftMethod::Sequential => "sequential",
            DraftMethod::Snake => "snake",
        }
    }

    /// Parse a method tag, case-insensitively.
    pub fn from_tag(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Some(DraftMethod::Random),
            "sequential" => Some(DraftMethod::Sequential),
            "snake" => Some(DraftMethod::Snake),
            _ => None,
        }
    }

    /// The round-1 ordering this method starts from. Snake drafts take their
    /// base from league configuration.
    pub fn base_order(&self, snake_base: BaseOrder) -> BaseOrder {
        match self {
            DraftMethod::Random => BaseOrder::Random,
            DraftMethod::Sequential => BaseOrder::Sequential,
            DraftMethod::Snake => snake_base,
        }
    }
}

/// Round-1 ordering used as the base of every later round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseOrder {
    Random,
    Sequential,
}

impl BaseOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaseOrder::Random => "random",
            BaseOrder::Sequential => "sequential",
        }
    }

    pub fn from_tag(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Some(BaseOrder::Random),
            "sequential" => Some(BaseOrder::Sequential),
            _ => None,
        }
    }
}

/// A team as referenced by the draft collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRef {
    pub team_id: TeamId,
    pub team_name: String,
}

/// One team's place in the round-1 sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftOrderEntry {
    /// 1-indexed, unique within a race.
    pub draft_position_number: u32,
    pub team_id: TeamId,
    pub team_name: String,
}

/// Generate the round-1 draft order for `teams`.
///
/// `teams` is the roster in its natural (league) order. Sequential orders
/// keep that order; random orders apply a uniform shuffle drawn from `rng`.
pub fn generate_order<R: Rng + ?Sized>(
    teams: &[TeamRef],
    method: DraftMethod,
    snake_base: BaseOrder,
    rng: &mut R,
) -> Result<Vec<DraftOrderEntry>, DraftError> {
    if teams.len() < 2 {
        return Err(DraftError::Configuration(format!(
            "a draft needs at least 2 teams, got {}",
            teams.len()
        )));
    }

    let mut seen = HashSet::new();
    for team in teams {
        if !seen.insert(team.team_id) {
            return Err(DraftError::Configuration(format!(
                "team {} appears more than once in the roster",
                team.team_id
            )));
        }
    }

    let mut sequence: Vec<&TeamRef> = teams.iter().collect();
    if method.base_order(snake_base) == BaseOrder::Random {
        sequence.shuffle(rng);
    }

    Ok(sequence
        .into_iter()
        .enumerate()
        .map(|(idx, team)| DraftOrderEntry {
            draft_position_number: idx as u32 + 1,
            team_id: team.team_id,
            team_name: team.team_name.clone(),
        })
        .collect())
}

/// Check that positions form a contiguous 1..N permutation with unique teams.
pub fn validate_order(order: &[DraftOrderEntry]) -> Result<(), SequenceFault> {
    let n = order.len() as u32;
    let mut positions = HashSet::new();
    let mut teams = HashSet::new();
    for entry in order {
        let pos = entry.draft_position_number;
        if pos == 0 || pos > n {
            return Err(SequenceFault::InvalidOrder(format!(
                "position {pos} outside 1..={n}"
            )));
        }
        if !positions.insert(pos) {
            return Err(SequenceFault::InvalidOrder(format!("position {pos} repeated")));
        }
        if !teams.insert(entry.team_id) {
            return Err(SequenceFault::InvalidOrder(format!(
                "team {} holds two positions",
                entry.team_id
            )));
        }
    }
    Ok(())
}

/// The order in which teams pick during `round`.
pub fn round_order(
    order: &[DraftOrderEntry],
    method: DraftMethod,
    round: u32,
) -> Vec<&DraftOrderEntry> {
    let mut entries: Vec<&DraftOrderEntry> = order.iter().collect();
    entries.sort_by_key(|e| e.draft_position_number);
    if method == DraftMethod::Snake && round % 2 == 0 {
        entries.reverse();
    }
    entries
}

/// The team responsible for the slot at `(round, position)`.
///
/// `position` is the 1-indexed pick slot within the round, not the team's
/// draft position number. On even snake rounds slot 1 belongs to the team
/// holding the last draft position.
pub fn holder_for(
    order: &[DraftOrderEntry],
    method: DraftMethod,
    round: u32,
    position: u32,
) -> Option<&DraftOrderEntry> {
    if round == 0 || position == 0 {
        return None;
    }
    round_order(order, method, round)
        .into_iter()
        .nth(position as usize - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn teams(n: usize) -> Vec<TeamRef> {
        (1..=n)
            .map(|i| TeamRef {
                team_id: i as TeamId * 10,
                team_name: format!("Team {i}"),
            })
            .collect()
    }

    fn names(entries: &[&DraftOrderEntry]) -> Vec<String> {
        entries.iter().map(|e| e.team_name.clone()).collect()
    }

    #[test]
    fn sequential_follows_roster_order() {
        let mut rng = StdRng::seed_from_u64(1);
        let order = generate_order(&teams(4), DraftMethod::Sequential, BaseOrder::Random, &mut rng)
            .unwrap();
        let ids: Vec<TeamId> = order.iter().map(|e| e.team_id).collect();
        assert_eq!(ids, vec![10, 20, 30, 40]);
        assert_eq!(order[2].draft_position_number, 3);
    }

    #[test]
    fn fewer_than_two_teams_is_a_configuration_error() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = generate_order(&teams(1), DraftMethod::Snake, BaseOrder::Sequential, &mut rng)
            .unwrap_err();
        assert!(matches!(err, DraftError::Configuration(_)));

        let err =
            generate_order(&[], DraftMethod::Random, BaseOrder::Random, &mut rng).unwrap_err();
        assert!(matches!(err, DraftError::Configuration(_)));
    }

    #[test]
    fn duplicate_team_is_rejected() {
        let mut roster = teams(3);
        roster.push(roster[0].clone());
        let mut rng = StdRng::seed_from_u64(1);
        let err = generate_order(&roster, DraftMethod::Sequential, BaseOrder::Sequential, &mut rng)
            .unwrap_err();
        assert!(matches!(err, DraftError::Configuration(_)));
    }

    #[test]
    fn snake_reverses_on_even_rounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let order = generate_order(&teams(4), DraftMethod::Snake, BaseOrder::Sequential, &mut rng)
            .unwrap();
        assert_eq!(
            names(&round_order(&order, DraftMethod::Snake, 1)),
            vec!["Team 1", "Team 2", "Team 3", "Team 4"]
        );
        assert_eq!(
            names(&round_order(&order, DraftMethod::Snake, 2)),
            vec!["Team 4", "Team 3", "Team 2", "Team 1"]
        );
        assert_eq!(
            names(&round_order(&order, DraftMethod::Snake, 3)),
            vec!["Team 1", "Team 2", "Team 3", "Team 4"]
        );
    }

    #[test]
    fn non_snake_rounds_repeat_base_order() {
        let mut rng = StdRng::seed_from_u64(3);
        let order = generate_order(&teams(5), DraftMethod::Random, BaseOrder::Sequential, &mut rng)
            .unwrap();
        let r1 = names(&round_order(&order, DraftMethod::Random, 1));
        let r2 = names(&round_order(&order, DraftMethod::Random, 2));
        assert_eq!(r1, r2);
    }

    #[test]
    fn holder_for_resolves_snake_slots() {
        let mut rng = StdRng::seed_from_u64(1);
        let order = generate_order(&teams(4), DraftMethod::Snake, BaseOrder::Sequential, &mut rng)
            .unwrap();
        assert_eq!(holder_for(&order, DraftMethod::Snake, 1, 1).unwrap().team_id, 10);
        assert_eq!(holder_for(&order, DraftMethod::Snake, 2, 1).unwrap().team_id, 40);
        assert_eq!(holder_for(&order, DraftMethod::Snake, 2, 4).unwrap().team_id, 10);
        assert!(holder_for(&order, DraftMethod::Snake, 2, 5).is_none());
        assert!(holder_for(&order, DraftMethod::Snake, 0, 1).is_none());
    }

    #[test]
    fn validate_rejects_gaps_and_repeats() {
        let mut order = vec![
            DraftOrderEntry {
                draft_position_number: 1,
                team_id: 1,
                team_name: "A".into(),
            },
            DraftOrderEntry {
                draft_position_number: 3,
                team_id: 2,
                team_name: "B".into(),
            },
        ];
        assert!(validate_order(&order).is_err());

        order[1].draft_position_number = 1;
        assert!(validate_order(&order).is_err());

        order[1].draft_position_number = 2;
        assert!(validate_order(&order).is_ok());

        order[1].team_id = 1;
        assert!(validate_order(&order).is_err());
    }

    #[test]
    fn method_tags_parse() {
        assert_eq!(DraftMethod::from_tag("SNAKE"), Some(DraftMethod::Snake));
        assert_eq!(DraftMethod::from_tag("sequential"), Some(DraftMethod::Sequential));
        assert_eq!(DraftMethod::from_tag("auction"), None);
        assert_eq!(DraftMethod::Random.as_str(), "random");
    }

    fn any_method() -> impl Strategy<Value = DraftMethod> {
        prop_oneof![
            Just(DraftMethod::Random),
            Just(DraftMethod::Sequential),
            Just(DraftMethod::Snake),
        ]
    }

    fn any_base() -> impl Strategy<Value = BaseOrder> {
        prop_oneof![Just(BaseOrder::Random), Just(BaseOrder::Sequential)]
    }

    proptest! {
        /// Every method yields positions 1..N, each team exactly once.
        #[test]
        fn prop_order_is_a_permutation(
            n in 2usize..40,
            method in any_method(),
            base in any_base(),
            seed in any::<u64>(),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let roster = teams(n);
            let order = generate_order(&roster, method, base, &mut rng).unwrap();

            prop_assert_eq!(order.len(), n);
            prop_assert!(validate_order(&order).is_ok());

            let mut positions: Vec<u32> = order.iter().map(|e| e.draft_position_number).collect();
            positions.sort_unstable();
            prop_assert_eq!(positions, (1..=n as u32).collect::<Vec<_>>());

            let mut ids: Vec<TeamId> = order.iter().map(|e| e.team_id).collect();
            ids.sort_unstable();
            let mut expected: Vec<TeamId> = roster.iter().map(|t| t.team_id).collect();
            expected.sort_unstable();
            prop_assert_eq!(ids, expected);
        }

        /// Consecutive snake rounds are exact reverses of each other.
        #[test]
        fn prop_snake_rounds_mirror(
            n in 2usize..30,
            round in 1u32..20,
            base in any_base(),
            seed in any::<u64>(),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let order = generate_order(&teams(n), DraftMethod::Snake, base, &mut rng).unwrap();

            let this_round: Vec<TeamId> = round_order(&order, DraftMethod::Snake, round)
                .iter().map(|e| e.team_id).collect();
            let mut next_round: Vec<TeamId> = round_order(&order, DraftMethod::Snake, round + 1)
                .iter().map(|e| e.team_id).collect();
            next_round.reverse();
            prop_assert_eq!(this_round, next_round);
        }
    }
}
