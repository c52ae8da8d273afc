use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SimulationError};
use crate::migration::{self, Allocation};
use crate::policy::{GrowthOrder, TransitionPolicy};
use crate::series::Series;
use crate::world::World;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TerritoryId(String);

impl TerritoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TerritoryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TerritoryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TerritoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Construction input for one territory, as handed over by a loader.
#[derive(Debug, Clone, PartialEq)]
pub struct TerritorySpec {
    pub id: TerritoryId,
    /// Display code (ISO alpha-3 for countries). Falls back to the id.
    pub code: Option<String>,
    pub region: String,
    pub water: f64,
    pub water_change_rate: f64,
    pub required_water_per_person: f64,
    pub population_growth_rate: f64,
    pub population: f64,
    /// Initial residents attributed to other origins.
    pub diaspora: BTreeMap<TerritoryId, f64>,
}

impl TerritorySpec {
    pub fn new(id: impl Into<TerritoryId>, water: f64, population: f64) -> Self {
        Self {
            id: id.into(),
            code: None,
            region: String::new(),
            water,
            water_change_rate: 1.0,
            required_water_per_person: 1.0,
            population_growth_rate: 1.0,
            population,
            diaspora: BTreeMap::new(),
        }
    }

    pub fn with_rates(
        mut self,
        water_change_rate: f64,
        required_water_per_person: f64,
        population_growth_rate: f64,
    ) -> Self {
        self.water_change_rate = water_change_rate;
        self.required_water_per_person = required_water_per_person;
        self.population_growth_rate = population_growth_rate;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_diaspora(mut self, origin: impl Into<TerritoryId>, count: f64) -> Self {
        self.diaspora.insert(origin.into(), count);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.as_str().is_empty() {
            return Err(ConfigError::EmptyId);
        }
        let rates = [
            ("water_change_rate", self.water_change_rate),
            ("required_water_per_person", self.required_water_per_person),
            ("population_growth_rate", self.population_growth_rate),
        ];
        for (field, value) in rates {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NonPositiveParameter {
                    territory: self.id.clone(),
                    field,
                    value,
                });
            }
        }
        let seeds = [("water", self.water), ("population", self.population)]
            .into_iter()
            .chain(self.diaspora.values().map(|count| ("diaspora", *count)));
        for (field, value) in seeds {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::NegativeSeed {
                    territory: self.id.clone(),
                    field,
                    value,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Territory {
    id: TerritoryId,
    code: String,
    region: String,
    water_change_rate: f64,
    required_water_per_person: f64,
    population_growth_rate: f64,
    water: Series,
    populations: BTreeMap<TerritoryId, Series>,
}

/// Everything one territory contributes to year `year + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub territory: TerritoryId,
    pub year: usize,
    pub new_water: f64,
    pub retention_ratio: f64,
    /// Retained count per origin, written into the territory's own `year + 1` slots.
    pub retained: Vec<(TerritoryId, f64)>,
    pub departures: Vec<Departure>,
    /// People lost to whole-number truncation of retained counts.
    pub truncated: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Departure {
    pub origin: TerritoryId,
    pub count: f64,
    pub allocation: Allocation,
}

impl Territory {
    /// Builds a territory carrying a population series for every id in
    /// `origins`. Diaspora seeds must name one of those origins.
    pub(crate) fn new(
        spec: TerritorySpec,
        origins: &BTreeSet<TerritoryId>,
        horizon: usize,
    ) -> Result<Self, ConfigError> {
        spec.validate()?;
        if let Some(unknown) = spec.diaspora.keys().find(|o| !origins.contains(*o)) {
            return Err(ConfigError::UnknownOrigin {
                territory: spec.id.clone(),
                origin: unknown.clone(),
            });
        }
        let populations: BTreeMap<TerritoryId, Series> = origins
            .iter()
            .map(|origin| -> Result<_, ConfigError> {
                let seed = if *origin == spec.id {
                    spec.population + spec.diaspora.get(origin).copied().unwrap_or(0.0)
                } else {
                    spec.diaspora.get(origin).copied().unwrap_or(0.0)
                };
                Ok((origin.clone(), Series::new(horizon, seed)?))
            })
            .collect::<Result<_, ConfigError>>()?;
        Ok(Self {
            code: spec.code.unwrap_or_else(|| spec.id.to_string()),
            id: spec.id,
            region: spec.region,
            water_change_rate: spec.water_change_rate,
            required_water_per_person: spec.required_water_per_person,
            population_growth_rate: spec.population_growth_rate,
            water: Series::new(horizon, spec.water)?,
            populations,
        })
    }

    pub fn id(&self) -> &TerritoryId {
        &self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn water_change_rate(&self) -> f64 {
        self.water_change_rate
    }

    pub fn required_water_per_person(&self) -> f64 {
        self.required_water_per_person
    }

    pub fn population_growth_rate(&self) -> f64 {
        self.population_growth_rate
    }

    pub fn water(&self) -> &Series {
        &self.water
    }

    pub fn populations(&self) -> &BTreeMap<TerritoryId, Series> {
        &self.populations
    }

    pub fn population(&self, origin: &TerritoryId, year: usize) -> Option<f64> {
        self.populations.get(origin).and_then(|series| series.get(year))
    }

    pub fn total_population(&self, year: usize) -> Option<f64> {
        self.populations
            .values()
            .map(|series| series.get(year))
            .sum()
    }

    /// Spare water after this year's residents are supplied. Negative when
    /// the territory is already short.
    pub fn surplus(&self, year: usize) -> Option<f64> {
        let water = self.water.get(year)?;
        let population = self.total_population(year)?;
        Some(water - self.required_water_per_person * population)
    }

    /// Staged (uncommitted) population for the year being computed.
    pub fn staged_total_population(&self) -> f64 {
        self.populations
            .values()
            .filter_map(Series::staged)
            .sum()
    }

    /// Computes this territory's contribution to `year + 1`, including where
    /// its departing people go. Reads only committed `year` values from
    /// `world`; nothing is written until the world applies the transition.
    /// Only deficit years migrate: with a retention ratio of 1, decline from
    /// a growth rate below 1 and truncated fractions are not sent anywhere.
    pub fn advance(
        &self,
        year: usize,
        world: &World,
        policy: &TransitionPolicy,
    ) -> Result<Transition, SimulationError> {
        let water = self.water.get(year).ok_or_else(|| self.out_of_range(year))?;
        let present = self
            .total_population(year)
            .ok_or_else(|| self.out_of_range(year))?;

        let new_water = water * self.water_change_rate;
        let total = match policy.growth_order {
            GrowthOrder::GrowThenCheck => present * self.population_growth_rate,
            GrowthOrder::CheckThenGrow => present,
        };
        let max_supported = new_water / self.required_water_per_person;
        let retention_ratio = retention_ratio(max_supported, total);
        let in_deficit = retention_ratio < 1.0;

        let mut retained = Vec::with_capacity(self.populations.len());
        let mut departures = Vec::new();
        let mut truncated = 0.0;
        for (origin, series) in &self.populations {
            let count = series.get(year).ok_or_else(|| self.out_of_range(year))?;
            let grown = count * self.population_growth_rate * retention_ratio;
            let kept = policy.rounding.retained(grown);
            truncated += grown - kept;
            retained.push((origin.clone(), kept));

            let departing = count - kept;
            if in_deficit && departing > 0.0 {
                let allocation =
                    migration::allocate(year, &self.id, origin, departing, world, policy)?;
                departures.push(Departure {
                    origin: origin.clone(),
                    count: departing,
                    allocation,
                });
            }
        }

        if in_deficit {
            tracing::debug!(
                year,
                territory = %self.id,
                retention_ratio,
                departing = departures.iter().map(|d| d.count).sum::<f64>(),
                "water deficit"
            );
        }

        Ok(Transition {
            territory: self.id.clone(),
            year,
            new_water,
            retention_ratio,
            retained,
            departures,
            truncated,
        })
    }

    pub(crate) fn accumulate_water(&mut self, year: usize, amount: f64) -> Result<(), SimulationError> {
        self.water.accumulate(year, amount)
    }

    pub(crate) fn accumulate_population(
        &mut self,
        origin: &TerritoryId,
        year: usize,
        amount: f64,
    ) -> Result<(), SimulationError> {
        let series = self
            .populations
            .get_mut(origin)
            .ok_or_else(|| SimulationError::UnknownOrigin {
                territory: self.id.clone(),
                origin: origin.clone(),
            })?;
        series.accumulate(year, amount)
    }

    pub(crate) fn commit(&mut self) -> Result<(), SimulationError> {
        self.water.commit()?;
        for series in self.populations.values_mut() {
            series.commit()?;
        }
        Ok(())
    }

    fn out_of_range(&self, year: usize) -> SimulationError {
        SimulationError::SlotOutOfRange {
            year,
            recorded: self.water.recorded(),
            capacity: self.water.capacity(),
        }
    }
}

/// Share of the (growth-adjusted) population the territory can keep.
/// Full retention when there is nobody to support.
pub fn retention_ratio(max_supported: f64, total_population: f64) -> f64 {
    if total_population <= 0.0 || max_supported >= total_population {
        1.0
    } else {
        max_supported / total_population
    }
}
