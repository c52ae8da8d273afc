pub mod distance;
pub mod engine;
pub mod error;
pub mod migration;
pub mod policy;
pub mod report;
pub mod scenario;
pub mod series;
pub mod snapshot;
pub mod systems;
pub mod territory;
pub mod web;
pub mod world;

pub use engine::{simulate, Engine, EngineBuilder, EngineSettings};
pub use error::{ConfigError, SimulationError};
pub use policy::TransitionPolicy;
pub use scenario::Scenario;
pub use territory::{Territory, TerritoryId, TerritorySpec};
pub use world::{World, WorldBuilder};
