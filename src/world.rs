use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::distance::DistanceTable;
use crate::error::{ConfigError, SimulationError};
use crate::migration::Allocation;
use crate::policy::TransitionPolicy;
use crate::territory::{Territory, TerritoryId, TerritorySpec, Transition};

/// Departing people that no territory could take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnplacedMigration {
    pub year: usize,
    pub territory: TerritoryId,
    pub origin: TerritoryId,
    pub count: f64,
    /// Sent back into the source territory instead of being removed.
    pub returned: bool,
}

/// All transitions computed for one year, applied as a single batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct YearPlan {
    pub year: usize,
    pub transitions: Vec<Transition>,
}

/// Flow totals produced by applying a [`YearPlan`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationSummary {
    pub retained: f64,
    pub departed: f64,
    pub placed: f64,
    pub unplaced: f64,
    pub returned: f64,
    pub truncated: f64,
    pub deficit_territories: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearLedger {
    pub year: usize,
    pub total_population: f64,
    pub total_water: f64,
    pub flows: MigrationSummary,
    /// Migrant fractions dropped by whole-number shares.
    pub migrant_truncation: f64,
    /// Staged population minus what the flows account for.
    pub residual: f64,
}

#[derive(Debug, Default, Clone)]
pub struct BookkeepingState {
    pub pending: Option<MigrationSummary>,
    pub ledger: Vec<YearLedger>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerritorySnapshot {
    pub id: TerritoryId,
    pub code: String,
    pub region: String,
    pub water: f64,
    pub required_water_per_person: f64,
    pub population: f64,
    pub populations: BTreeMap<TerritoryId, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub scenario: String,
    pub year: usize,
    pub total_population: f64,
    pub total_unplaced: f64,
    pub territories: Vec<TerritorySnapshot>,
}

pub struct WorldBuilder {
    horizon: usize,
    specs: Vec<TerritorySpec>,
    distances: Vec<(TerritoryId, TerritoryId, f64)>,
}

impl WorldBuilder {
    /// `horizon` is the number of years the world can be simulated for.
    pub fn new(horizon: usize) -> Self {
        Self {
            horizon,
            specs: Vec::new(),
            distances: Vec::new(),
        }
    }

    pub fn territory(mut self, spec: TerritorySpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn distance(
        mut self,
        from: impl Into<TerritoryId>,
        to: impl Into<TerritoryId>,
        value: f64,
    ) -> Self {
        self.distances.push((from.into(), to.into(), value));
        self
    }

    pub fn build(self) -> Result<World, ConfigError> {
        if self.horizon == 0 {
            return Err(ConfigError::ZeroHorizon);
        }
        if self.specs.is_empty() {
            return Err(ConfigError::NoTerritories);
        }
        let mut origins = BTreeSet::new();
        for spec in &self.specs {
            if !origins.insert(spec.id.clone()) {
                return Err(ConfigError::DuplicateTerritory(spec.id.clone()));
            }
        }
        let distances = DistanceTable::build(&origins, self.distances)?;
        let mut territories = BTreeMap::new();
        for spec in self.specs {
            let territory = Territory::new(spec, &origins, self.horizon)?;
            territories.insert(territory.id().clone(), territory);
        }
        Ok(World {
            horizon: self.horizon,
            year: 0,
            territories,
            distances,
            unplaced: Vec::new(),
            applied: false,
            bookkeeping: BookkeepingState::default(),
        })
    }
}

#[derive(Debug)]
pub struct World {
    horizon: usize,
    year: usize,
    territories: BTreeMap<TerritoryId, Territory>,
    distances: DistanceTable,
    unplaced: Vec<UnplacedMigration>,
    /// Set once a plan has been written into the staging slots.
    applied: bool,
    pub(crate) bookkeeping: BookkeepingState,
}

impl World {
    /// Last committed year. Every series has `year + 1` recorded entries.
    pub fn year(&self) -> usize {
        self.year
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn territory(&self, id: &TerritoryId) -> Option<&Territory> {
        self.territories.get(id)
    }

    pub fn territories(&self) -> impl Iterator<Item = &Territory> {
        self.territories.values()
    }

    pub fn territory_ids(&self) -> Vec<TerritoryId> {
        self.territories.keys().cloned().collect()
    }

    pub fn distances(&self) -> &DistanceTable {
        &self.distances
    }

    pub fn unplaced(&self) -> &[UnplacedMigration] {
        &self.unplaced
    }

    pub fn ledger(&self) -> &[YearLedger] {
        &self.bookkeeping.ledger
    }

    pub fn total_population(&self, year: usize) -> Option<f64> {
        self.territories
            .values()
            .map(|territory| territory.total_population(year))
            .sum()
    }

    /// People of `origin` living anywhere in the world at `year`.
    pub fn origin_population(&self, origin: &TerritoryId, year: usize) -> Option<f64> {
        self.territories
            .values()
            .map(|territory| territory.population(origin, year))
            .sum()
    }

    pub fn total_unplaced(&self) -> f64 {
        self.unplaced
            .iter()
            .filter(|record| !record.returned)
            .map(|record| record.count)
            .sum()
    }

    /// Runs every territory's transition for the current year against the
    /// committed state. Nothing is written.
    pub fn plan_year(&self, policy: &TransitionPolicy) -> Result<YearPlan, SimulationError> {
        let transitions = self
            .territories
            .values()
            .map(|territory| territory.advance(self.year, self, policy))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(YearPlan {
            year: self.year,
            transitions,
        })
    }

    /// Writes a plan into the staging slots for `plan.year + 1`. The plan is
    /// checked up front so a rejected plan leaves the world untouched. Only
    /// one plan may be applied per year.
    pub fn apply(&mut self, plan: &YearPlan) -> Result<MigrationSummary, SimulationError> {
        if self.applied {
            return Err(SimulationError::AlreadyApplied { year: self.year });
        }
        self.check_plan(plan)?;
        let target = plan.year + 1;
        let mut summary = MigrationSummary::default();

        for transition in &plan.transitions {
            let source = self.territory_mut(&transition.territory)?;
            source.accumulate_water(target, transition.new_water)?;
            for (origin, kept) in &transition.retained {
                source.accumulate_population(origin, target, *kept)?;
                summary.retained += kept;
            }
            summary.truncated += transition.truncated;
            if transition.retention_ratio < 1.0 {
                summary.deficit_territories += 1;
            }

            for departure in &transition.departures {
                summary.departed += departure.count;
                match &departure.allocation {
                    Allocation::Placed(shares) => {
                        for share in shares {
                            self.territory_mut(&share.destination)?.accumulate_population(
                                &departure.origin,
                                target,
                                share.amount,
                            )?;
                            summary.placed += share.amount;
                        }
                    }
                    Allocation::Unplaced { returned } => {
                        if *returned {
                            self.territory_mut(&transition.territory)?
                                .accumulate_population(&departure.origin, target, departure.count)?;
                            summary.returned += departure.count;
                        } else {
                            summary.unplaced += departure.count;
                        }
                        tracing::warn!(
                            year = plan.year,
                            territory = %transition.territory,
                            origin = %departure.origin,
                            count = departure.count,
                            returned,
                            "no destination for departing population"
                        );
                        self.unplaced.push(UnplacedMigration {
                            year: plan.year,
                            territory: transition.territory.clone(),
                            origin: departure.origin.clone(),
                            count: departure.count,
                            returned: *returned,
                        });
                    }
                }
            }
        }
        self.applied = true;
        Ok(summary)
    }

    /// Closes the staging slot of every series. Requires an applied plan.
    pub fn advance_year(&mut self) -> Result<(), SimulationError> {
        if self.year >= self.horizon {
            return Err(SimulationError::HorizonExceeded {
                requested: self.year + 1,
                horizon: self.horizon,
            });
        }
        if !self.applied {
            return Err(SimulationError::NothingApplied { year: self.year });
        }
        for territory in self.territories.values_mut() {
            territory.commit()?;
        }
        self.year += 1;
        self.applied = false;
        Ok(())
    }

    pub fn snapshot(&self, scenario: &str) -> WorldSnapshot {
        let year = self.year;
        let territories = self
            .territories
            .values()
            .map(|territory| {
                let populations: BTreeMap<TerritoryId, f64> = territory
                    .populations()
                    .iter()
                    .map(|(origin, series)| (origin.clone(), series.latest()))
                    .collect();
                TerritorySnapshot {
                    id: territory.id().clone(),
                    code: territory.code().to_string(),
                    region: territory.region().to_string(),
                    water: territory.water().latest(),
                    required_water_per_person: territory.required_water_per_person(),
                    population: populations.values().sum(),
                    populations,
                }
            })
            .collect::<Vec<_>>();
        WorldSnapshot {
            scenario: scenario.to_string(),
            year,
            total_population: territories.iter().map(|t| t.population).sum(),
            total_unplaced: self.total_unplaced(),
            territories,
        }
    }

    fn territory_mut(&mut self, id: &TerritoryId) -> Result<&mut Territory, SimulationError> {
        self.territories
            .get_mut(id)
            .ok_or_else(|| SimulationError::UnknownTerritory(id.clone()))
    }

    fn check_plan(&self, plan: &YearPlan) -> Result<(), SimulationError> {
        if plan.year != self.year {
            return Err(SimulationError::SlotOutOfRange {
                year: plan.year + 1,
                recorded: self.year + 1,
                capacity: self.horizon + 1,
            });
        }
        if plan.year >= self.horizon {
            return Err(SimulationError::HorizonExceeded {
                requested: plan.year + 1,
                horizon: self.horizon,
            });
        }
        let has_origin = |territory: &TerritoryId, origin: &TerritoryId| {
            match self.territories.get(territory) {
                None => Err(SimulationError::UnknownTerritory(territory.clone())),
                Some(t) if !t.populations().contains_key(origin) => {
                    Err(SimulationError::UnknownOrigin {
                        territory: territory.clone(),
                        origin: origin.clone(),
                    })
                }
                Some(_) => Ok(()),
            }
        };
        for transition in &plan.transitions {
            for (origin, _) in &transition.retained {
                has_origin(&transition.territory, origin)?;
            }
            for departure in &transition.departures {
                has_origin(&transition.territory, &departure.origin)?;
                if let Allocation::Placed(shares) = &departure.allocation {
                    for share in shares {
                        has_origin(&share.destination, &departure.origin)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> World {
        WorldBuilder::new(3)
            .territory(TerritorySpec::new("dry", 50.0, 100.0))
            .territory(TerritorySpec::new("wet", 1_000.0, 100.0))
            .distance("dry", "wet", 10.0)
            .build()
            .unwrap()
    }

    #[test]
    fn builder_rejects_duplicates_and_empty_worlds() {
        assert_eq!(WorldBuilder::new(1).build().unwrap_err(), ConfigError::NoTerritories);
        assert_eq!(
            WorldBuilder::new(0)
                .territory(TerritorySpec::new("a", 1.0, 1.0))
                .build()
                .unwrap_err(),
            ConfigError::ZeroHorizon
        );
        let err = WorldBuilder::new(1)
            .territory(TerritorySpec::new("a", 1.0, 1.0))
            .territory(TerritorySpec::new("a", 2.0, 2.0))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateTerritory("a".into()));
    }

    #[test]
    fn oversized_horizon_fails_construction() {
        let err = WorldBuilder::new(usize::MAX)
            .territory(TerritorySpec::new("a", 1.0, 1.0))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::HorizonTooLarge(usize::MAX));
    }

    #[test]
    fn every_territory_carries_every_origin() {
        let world = pair();
        for territory in world.territories() {
            let keys: Vec<_> = territory.populations().keys().cloned().collect();
            assert_eq!(keys, world.territory_ids());
        }
    }

    #[test]
    fn apply_moves_deficit_to_neighbour() {
        let mut world = pair();
        let plan = world.plan_year(&TransitionPolicy::default()).unwrap();
        let summary = world.apply(&plan).unwrap();
        world.advance_year().unwrap();

        assert_eq!(world.year(), 1);
        assert_eq!(summary.departed, 50.0);
        assert_eq!(summary.placed, 50.0);
        let wet = world.territory(&"wet".into()).unwrap();
        assert_eq!(wet.population(&"dry".into(), 1), Some(50.0));
        assert_eq!(wet.population(&"wet".into(), 1), Some(100.0));
        let dry = world.territory(&"dry".into()).unwrap();
        assert_eq!(dry.population(&"dry".into(), 1), Some(50.0));
        assert_eq!(world.total_population(1), Some(200.0));
        assert_eq!(world.origin_population(&"dry".into(), 1), Some(100.0));
    }

    #[test]
    fn series_lengths_advance_together() {
        let mut world = pair();
        for _ in 0..2 {
            let plan = world.plan_year(&TransitionPolicy::default()).unwrap();
            world.apply(&plan).unwrap();
            world.advance_year().unwrap();
        }
        for territory in world.territories() {
            let len = territory.water().history().len();
            assert_eq!(len, 3);
            assert!(territory
                .populations()
                .values()
                .all(|series| series.history().len() == len));
        }
    }

    #[test]
    fn stale_plan_is_rejected_without_writes() {
        let mut world = pair();
        let plan = world.plan_year(&TransitionPolicy::default()).unwrap();
        world.apply(&plan).unwrap();
        world.advance_year().unwrap();

        let before = world.snapshot("t");
        assert!(world.apply(&plan).is_err());
        let after = world.snapshot("t");
        assert_eq!(before.total_population, after.total_population);
    }

    fn step(world: &mut World) {
        let plan = world.plan_year(&TransitionPolicy::default()).unwrap();
        world.apply(&plan).unwrap();
        world.advance_year().unwrap();
    }

    #[test]
    fn advancing_past_horizon_fails() {
        let mut world = WorldBuilder::new(1)
            .territory(TerritorySpec::new("a", 10.0, 1.0))
            .build()
            .unwrap();
        step(&mut world);
        assert_eq!(
            world.advance_year().unwrap_err(),
            SimulationError::HorizonExceeded {
                requested: 2,
                horizon: 1
            }
        );
    }

    #[test]
    fn snapshot_reports_latest_values() {
        let world = pair();
        let snapshot = world.snapshot("pair");
        assert_eq!(snapshot.scenario, "pair");
        assert_eq!(snapshot.year, 0);
        assert_eq!(snapshot.total_population, 200.0);
        assert_eq!(snapshot.territories.len(), 2);
        assert_eq!(snapshot.territories[0].id.as_str(), "dry");
        assert_eq!(snapshot.territories[0].water, 50.0);
    }

    #[test]
    fn a_plan_is_applied_at_most_once_per_year() {
        let mut world = WorldBuilder::new(2)
            .territory(TerritorySpec::new("a", 1_000.0, 100.0))
            .build()
            .unwrap();
        let plan = world.plan_year(&TransitionPolicy::default()).unwrap();
        world.apply(&plan).unwrap();
        assert_eq!(
            world.apply(&plan).unwrap_err(),
            SimulationError::AlreadyApplied { year: 0 }
        );
        world.advance_year().unwrap();
        assert_eq!(world.total_population(1), Some(100.0));

        // the next year accepts a fresh plan again
        step(&mut world);
        assert_eq!(world.total_population(2), Some(100.0));
    }

    #[test]
    fn advancing_without_a_plan_is_refused() {
        let mut world = pair();
        assert_eq!(
            world.advance_year().unwrap_err(),
            SimulationError::NothingApplied { year: 0 }
        );
        assert_eq!(world.year(), 0);
        assert_eq!(world.territory(&"wet".into()).unwrap().water().recorded(), 1);
    }
}
