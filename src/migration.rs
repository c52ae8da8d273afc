//! Distribution of departing people over territories with spare water.
//!
//! A candidate must have positive surplus at year `t` and a distance entry
//! from the source. Its weight is its spare capacity (in people) divided by
//! that distance; each candidate receives `count * weight / total_weight`.

use serde::Serialize;

use crate::error::SimulationError;
use crate::policy::{NoDestination, TransitionPolicy};
use crate::territory::TerritoryId;
use crate::world::World;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub id: TerritoryId,
    pub surplus: f64,
    pub capacity: f64,
    pub distance: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Share {
    pub destination: TerritoryId,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Allocation {
    Placed(Vec<Share>),
    /// Nobody could take them. `returned` is set when the policy sends them
    /// back to the source territory.
    Unplaced { returned: bool },
}

impl Allocation {
    pub fn placed(&self) -> f64 {
        match self {
            Allocation::Placed(shares) => shares.iter().map(|share| share.amount).sum(),
            Allocation::Unplaced { .. } => 0.0,
        }
    }
}

/// Every territory other than `source` that could take migrants at `year`,
/// in id order.
pub fn candidates(
    year: usize,
    source: &TerritoryId,
    world: &World,
) -> Result<Vec<Candidate>, SimulationError> {
    let mut found = Vec::new();
    for territory in world.territories() {
        if territory.id() == source {
            continue;
        }
        let surplus = territory
            .surplus(year)
            .ok_or_else(|| SimulationError::SlotOutOfRange {
                year,
                recorded: territory.water().recorded(),
                capacity: territory.water().capacity(),
            })?;
        if surplus <= 0.0 {
            continue;
        }
        let Some(distance) = world.distances().get(source, territory.id()) else {
            continue;
        };
        let capacity = surplus / territory.required_water_per_person();
        found.push(Candidate {
            id: territory.id().clone(),
            surplus,
            capacity,
            distance,
            weight: capacity / distance,
        });
    }
    Ok(found)
}

/// Splits `count` people of `origin` leaving `source` over the candidates
/// for `year`.
pub fn allocate(
    year: usize,
    source: &TerritoryId,
    origin: &TerritoryId,
    count: f64,
    world: &World,
    policy: &TransitionPolicy,
) -> Result<Allocation, SimulationError> {
    let candidates = candidates(year, source, world)?;
    let total_weight: f64 = candidates.iter().map(|c| c.weight).sum();
    if candidates.is_empty() || total_weight <= 0.0 {
        return match policy.no_destination {
            NoDestination::Fail => Err(SimulationError::NoDestination {
                year,
                territory: source.clone(),
                origin: origin.clone(),
                count,
            }),
            NoDestination::Record => Ok(Allocation::Unplaced { returned: false }),
            NoDestination::ReturnHome => Ok(Allocation::Unplaced { returned: true }),
        };
    }

    let shares = candidates
        .into_iter()
        .map(|candidate| Share {
            amount: policy
                .rounding
                .migrant_share(count * candidate.weight / total_weight),
            destination: candidate.id,
        })
        .collect();
    Ok(Allocation::Placed(shares))
}
