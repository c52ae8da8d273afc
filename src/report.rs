//! Flat, chart-ready table of a finished run.
//!
//! One row per `(territory, year, origin group)`. Groups are drawn as
//! overlaid circles, so each row's `size` is the population that is still
//! left to draw when the group is reached, raised to [`RING_EXPONENT`] so
//! outer rings stay visible.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::territory::Territory;
use crate::world::World;

/// Groups smaller than this share of a territory's population are hidden.
pub const MIN_SHARE: f64 = 0.02;
pub const RING_EXPONENT: f64 = 1.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    /// Aggregate origins by the region of the origin territory.
    #[default]
    ByRegion,
    ByOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresentationRow {
    pub year: usize,
    pub name: String,
    pub code: String,
    pub origin: String,
    /// Thousands of people in the territory.
    pub population: f64,
    /// Thousands of people from this origin group.
    pub pop_from_region: f64,
    pub percentage: String,
    pub size: f64,
    pub water_per_person: f64,
    pub required_water_per_person: f64,
}

pub fn presentation_table(world: &World, grouping: Grouping) -> Vec<PresentationRow> {
    world
        .territories()
        .flat_map(|territory| territory_rows(territory, world, grouping))
        .collect()
}

pub fn territory_rows(
    territory: &Territory,
    world: &World,
    grouping: Grouping,
) -> Vec<PresentationRow> {
    let years = territory.water().history();
    let mut rows = Vec::new();
    for (year, water) in years.iter().enumerate() {
        let mut groups: BTreeMap<String, f64> = BTreeMap::new();
        for (origin, series) in territory.populations() {
            let Some(count) = series.get(year) else {
                continue;
            };
            if count == 0.0 {
                continue;
            }
            let label = match grouping {
                Grouping::ByOrigin => origin.to_string(),
                Grouping::ByRegion => match world.territory(origin) {
                    Some(source) if !source.region().is_empty() => source.region().to_string(),
                    Some(_) => origin.to_string(),
                    None => continue,
                },
            };
            *groups.entry(label).or_insert(0.0) += count;
        }

        let total: f64 = groups.values().sum();
        let water_per_person = if total == 0.0 {
            0.0
        } else {
            (water / total).trunc()
        };
        let mut remaining = total;
        let mut year_rows = Vec::new();
        for (label, count) in groups {
            if count < total * MIN_SHARE {
                continue;
            }
            year_rows.push(PresentationRow {
                year,
                name: territory.id().to_string(),
                code: territory.code().to_string(),
                origin: label,
                population: total.trunc() / 1_000.0,
                pop_from_region: count.trunc() / 1_000.0,
                percentage: format!("{}%", (count / total * 100.0).trunc()),
                size: remaining.powf(RING_EXPONENT),
                water_per_person,
                required_water_per_person: territory.required_water_per_person(),
            });
            remaining -= count;
        }
        year_rows.sort_by(|a, b| a.pop_from_region.total_cmp(&b.pop_from_region));
        rows.extend(year_rows);
    }
    rows
}
