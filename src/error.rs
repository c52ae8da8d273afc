use thiserror::Error;

use crate::territory::TerritoryId;

/// Problems with the construction input. Raised while building a world,
/// never while simulating one.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("world must contain at least one territory")]
    NoTerritories,

    #[error("simulation horizon must be at least one year")]
    ZeroHorizon,

    #[error("simulation horizon of {0} years cannot be allocated")]
    HorizonTooLarge(usize),

    #[error("territory id must not be empty")]
    EmptyId,

    #[error("territory {0} defined more than once")]
    DuplicateTerritory(TerritoryId),

    #[error("territory {territory}: {field} must be positive and finite, got {value}")]
    NonPositiveParameter {
        territory: TerritoryId,
        field: &'static str,
        value: f64,
    },

    #[error("territory {territory}: {field} must be non-negative and finite, got {value}")]
    NegativeSeed {
        territory: TerritoryId,
        field: &'static str,
        value: f64,
    },

    #[error("distance references unknown territory {0}")]
    UnknownTerritory(TerritoryId),

    #[error("territory {territory} seeds population for unknown origin {origin}")]
    UnknownOrigin {
        territory: TerritoryId,
        origin: TerritoryId,
    },

    #[error("distance from {0} to itself is not allowed")]
    SelfDistance(TerritoryId),

    #[error("distance between {from} and {to} must be positive and finite, got {value}")]
    NonPositiveDistance {
        from: TerritoryId,
        to: TerritoryId,
        value: f64,
    },

    #[error("distance between {from} and {to} declared twice with different values ({first} vs {second})")]
    AsymmetricDistance {
        from: TerritoryId,
        to: TerritoryId,
        first: f64,
        second: f64,
    },
}

/// Failures while stepping a constructed world.
#[derive(Debug, Error, PartialEq)]
pub enum SimulationError {
    #[error("year {year} is outside the writable range (recorded {recorded}, capacity {capacity})")]
    SlotOutOfRange {
        year: usize,
        recorded: usize,
        capacity: usize,
    },

    #[error("unknown territory {0}")]
    UnknownTerritory(TerritoryId),

    #[error("territory {territory} has no population series for origin {origin}")]
    UnknownOrigin {
        territory: TerritoryId,
        origin: TerritoryId,
    },

    #[error("year {year}: {count} people of origin {origin} leaving {territory} found no destination")]
    NoDestination {
        year: usize,
        territory: TerritoryId,
        origin: TerritoryId,
        count: f64,
    },

    #[error("a plan for year {year} has already been applied")]
    AlreadyApplied { year: usize },

    #[error("year {year} cannot be committed before a plan is applied")]
    NothingApplied { year: usize },

    #[error("cannot simulate {requested} years, world was built for {horizon}")]
    HorizonExceeded { requested: usize, horizon: usize },
}
