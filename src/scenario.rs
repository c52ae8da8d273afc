use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{
    error::ConfigError,
    policy::TransitionPolicy,
    territory::{TerritoryId, TerritorySpec},
    world::{World, WorldBuilder},
};

fn default_years() -> usize {
    10
}

fn default_rate() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_years")]
    pub years: usize,
    #[serde(default)]
    pub snapshot_interval_years: usize,
    #[serde(default)]
    pub policy: TransitionPolicy,
    pub territories: Vec<ScenarioTerritory>,
    #[serde(default)]
    pub distances: Vec<ScenarioDistance>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioTerritory {
    pub id: String,
    pub code: Option<String>,
    #[serde(default)]
    pub region: String,
    pub water: f64,
    #[serde(default = "default_rate")]
    pub water_change_rate: f64,
    pub required_water_per_person: f64,
    #[serde(default = "default_rate")]
    pub population_growth_rate: f64,
    pub population: f64,
    #[serde(default)]
    pub diaspora: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioDistance {
    pub from: String,
    pub to: String,
    pub weight: f64,
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        Scenario::from_yaml(&data).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

impl Scenario {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let scenario: Scenario = serde_yaml::from_str(text)?;
        Ok(scenario)
    }

    pub fn years(&self, override_years: Option<usize>) -> usize {
        override_years.unwrap_or(self.years)
    }

    /// Builds a world that can be simulated for `years` years.
    pub fn build_world(&self, years: usize) -> Result<World, ConfigError> {
        let mut builder = WorldBuilder::new(years);
        for territory in &self.territories {
            builder = builder.territory(territory.to_spec());
        }
        for distance in &self.distances {
            builder = builder.distance(
                distance.from.as_str(),
                distance.to.as_str(),
                distance.weight,
            );
        }
        builder.build()
    }

    pub fn total_population(&self) -> f64 {
        self.territories
            .iter()
            .map(|t| t.population + t.diaspora.values().sum::<f64>())
            .sum()
    }
}

impl ScenarioTerritory {
    fn to_spec(&self) -> TerritorySpec {
        TerritorySpec {
            id: TerritoryId::new(self.id.as_str()),
            code: self.code.clone(),
            region: self.region.clone(),
            water: self.water,
            water_change_rate: self.water_change_rate,
            required_water_per_person: self.required_water_per_person,
            population_growth_rate: self.population_growth_rate,
            population: self.population,
            diaspora: self
                .diaspora
                .iter()
                .map(|(origin, count)| (TerritoryId::new(origin.as_str()), *count))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{GrowthOrder, NoDestination};

    const BASIN: &str = r#"
name: basin
years: 4
policy:
  growth_order: check_then_grow
  no_destination: fail
territories:
  - id: upstream
    code: UPS
    region: North
    water: 500
    required_water_per_person: 2
    population: 100
  - id: downstream
    region: South
    water: 50
    water_change_rate: 0.9
    required_water_per_person: 1
    population_growth_rate: 1.1
    population: 80
    diaspora:
      upstream: 5
distances:
  - from: upstream
    to: downstream
    weight: 120
"#;

    #[test]
    fn parses_scenario_with_defaults() {
        let scenario = Scenario::from_yaml(BASIN).unwrap();
        assert_eq!(scenario.name, "basin");
        assert_eq!(scenario.years(None), 4);
        assert_eq!(scenario.years(Some(9)), 9);
        assert_eq!(scenario.snapshot_interval_years, 0);
        assert_eq!(scenario.policy.growth_order, GrowthOrder::CheckThenGrow);
        assert_eq!(scenario.policy.no_destination, NoDestination::Fail);
        assert_eq!(scenario.territories[0].water_change_rate, 1.0);
        assert_eq!(scenario.total_population(), 185.0);
    }

    #[test]
    fn builds_world_with_diaspora_and_distances() {
        let scenario = Scenario::from_yaml(BASIN).unwrap();
        let world = scenario.build_world(4).unwrap();
        assert_eq!(world.horizon(), 4);
        let downstream = world.territory(&"downstream".into()).unwrap();
        assert_eq!(downstream.population(&"upstream".into(), 0), Some(5.0));
        assert_eq!(downstream.code(), "downstream");
        assert_eq!(world.territory(&"upstream".into()).unwrap().code(), "UPS");
        assert_eq!(
            world
                .distances()
                .get(&"downstream".into(), &"upstream".into()),
            Some(120.0)
        );
    }

    #[test]
    fn invalid_parameters_fail_construction() {
        let text = BASIN.replace("required_water_per_person: 2", "required_water_per_person: 0");
        let scenario = Scenario::from_yaml(&text).unwrap();
        assert!(matches!(
            scenario.build_world(4),
            Err(ConfigError::NonPositiveParameter { .. })
        ));
    }

    #[test]
    fn misspelled_policy_key_fails_parsing() {
        let text = BASIN.replace("  no_destination: fail", "  no_destinaton: fail");
        let err = Scenario::from_yaml(&text).unwrap_err();
        assert!(format!("{err:#}").contains("no_destinaton"));
    }

    #[test]
    fn missing_required_field_fails_parsing() {
        let text = BASIN.replace("    population: 100\n", "");
        assert!(Scenario::from_yaml(&text).is_err());
    }
}
