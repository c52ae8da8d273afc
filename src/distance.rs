//! Precomputed pairwise distances (kilometres or adjacency weights).
//!
//! The table is symmetric and immutable once built. A pair without an entry
//! is unreachable for migration.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::ConfigError;
use crate::territory::TerritoryId;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistanceTable {
    pairs: BTreeMap<(TerritoryId, TerritoryId), f64>,
}

impl DistanceTable {
    pub fn build<I>(known: &BTreeSet<TerritoryId>, entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (TerritoryId, TerritoryId, f64)>,
    {
        let mut pairs = BTreeMap::new();
        for (from, to, value) in entries {
            for id in [&from, &to] {
                if !known.contains(id) {
                    return Err(ConfigError::UnknownTerritory(id.clone()));
                }
            }
            if from == to {
                return Err(ConfigError::SelfDistance(from));
            }
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NonPositiveDistance { from, to, value });
            }
            let key = ordered(&from, &to);
            if let Some(&first) = pairs.get(&key) {
                if first != value {
                    return Err(ConfigError::AsymmetricDistance {
                        from,
                        to,
                        first,
                        second: value,
                    });
                }
                continue;
            }
            pairs.insert(key, value);
        }
        Ok(Self { pairs })
    }

    pub fn get(&self, a: &TerritoryId, b: &TerritoryId) -> Option<f64> {
        self.pairs.get(&ordered(a, b)).copied()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

fn ordered(a: &TerritoryId, b: &TerritoryId) -> (TerritoryId, TerritoryId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}
