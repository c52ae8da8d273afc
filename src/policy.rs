use serde::{Deserialize, Serialize};

/// Whether growth is applied before the population is compared against the
/// water it can be supported by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthOrder {
    /// Capacity is checked against `total * growth_rate` (country model).
    #[default]
    GrowThenCheck,
    /// Capacity is checked against the unscaled total (region model).
    CheckThenGrow,
}

/// Which counts get truncated to whole people.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    /// Retained counts are whole, migrant shares keep their fractions.
    #[default]
    WholeRetained,
    Fractional,
    WholeAll,
}

impl Rounding {
    pub fn retained(self, value: f64) -> f64 {
        match self {
            Rounding::WholeRetained | Rounding::WholeAll => value.trunc(),
            Rounding::Fractional => value,
        }
    }

    pub fn migrant_share(self, value: f64) -> f64 {
        match self {
            Rounding::WholeAll => value.trunc(),
            Rounding::WholeRetained | Rounding::Fractional => value,
        }
    }
}

/// What happens to departing people when no territory can take them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoDestination {
    /// Removed from the population and kept in the world's unplaced record.
    #[default]
    Record,
    /// Added back to the source territory and recorded as returned.
    ReturnHome,
    /// Abort the run with [`crate::SimulationError::NoDestination`].
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransitionPolicy {
    pub growth_order: GrowthOrder,
    pub rounding: Rounding,
    pub no_destination: NoDestination,
}

impl TransitionPolicy {
    /// Settings matching the coarse region model: unscaled capacity check,
    /// fractional people everywhere.
    pub fn region_model() -> Self {
        Self {
            growth_order: GrowthOrder::CheckThenGrow,
            rounding: Rounding::Fractional,
            no_destination: NoDestination::Fail,
        }
    }
}
