// Auto-pick resolver: chooses a fallback driver when a turn expires.

use std::cmp::Ordering;
use std::collections::HashMap;

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::draft::pick::{Driver, DriverId};
use crate::error::DraftError;

/// Selection strategy for auto-picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoPickStrategy {
    HighestRanked,
    Random,
    Balanced,
}

/// Pick one driver from `pool` for a team whose current roster is `roster`.
///
/// `pool` must already exclude drivers picked by any team. An empty pool is a
/// data inconsistency and is reported as [`DraftError::EmptyDriverPool`].
pub fn resolve(
    pool: &[Driver],
    roster: &[Driver],
    strategy: AutoPickStrategy,
) -> Result<DriverId, DraftError> {
    resolve_with_rng(pool, roster, strategy, &mut rand::rng())
}

/// Same as [`resolve`], drawing randomness from `rng`.
pub fn resolve_with_rng<R: Rng + ?Sized>(
    pool: &[Driver],
    roster: &[Driver],
    strategy: AutoPickStrategy,
    rng: &mut R,
) -> Result<DriverId, DraftError> {
    let chosen = match strategy {
        AutoPickStrategy::HighestRanked => highest_ranked(pool),
        AutoPickStrategy::Random => pool.choose(rng),
        AutoPickStrategy::Balanced => balanced(pool, roster),
    };
    chosen.map(|d| d.id).ok_or(DraftError::EmptyDriverPool)
}

/// Greatest season points; ties go to the lowest racing number, then the
/// lowest id. Drivers without a number lose number ties to numbered ones.
fn highest_ranked(pool: &[Driver]) -> Option<&Driver> {
    pool.iter().min_by(|a, b| rank_order(a, b))
}

fn rank_order(a: &Driver, b: &Driver) -> Ordering {
    b.season_points
        .total_cmp(&a.season_points)
        .then_with(|| match (a.number, b.number) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.id.cmp(&b.id))
}

/// Prefer constructors the team holds the fewest drivers from.
fn balanced<'a>(pool: &'a [Driver], roster: &[Driver]) -> Option<&'a Driver> {
    let mut held: HashMap<&str, usize> = HashMap::new();
    for driver in roster {
        *held.entry(driver.constructor.as_str()).or_default() += 1;
    }

    let count_for = |d: &Driver| held.get(d.constructor.as_str()).copied().unwrap_or(0);
    let fewest = pool.iter().map(count_for).min()?;
    let most = pool.iter().map(count_for).max()?;

    if fewest == most {
        return highest_ranked(pool);
    }

    pool.iter()
        .filter(|&d| count_for(d) == fewest)
        .min_by(|a, b| rank_order(a, b))
}
