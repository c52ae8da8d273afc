use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::{
    error::SimulationError,
    policy::TransitionPolicy,
    snapshot::SnapshotWriter,
    systems::{BookkeepingSystem, MigrationSystem},
    world::{World, WorldSnapshot},
};

pub struct EngineSettings {
    pub scenario_name: String,
    pub snapshot_interval_years: usize,
    pub snapshot_dir: PathBuf,
}

impl EngineSettings {
    pub fn without_snapshots(scenario_name: impl Into<String>) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            snapshot_interval_years: 0,
            snapshot_dir: PathBuf::from("snapshots"),
        }
    }
}

pub struct EngineBuilder {
    settings: EngineSettings,
    systems: Vec<Box<dyn System>>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            systems: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl System + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    pub fn push_system(&mut self, system: impl System + 'static) {
        self.systems.push(Box::new(system));
    }

    /// Migration followed by bookkeeping, the standard annual pipeline.
    pub fn with_standard_systems(self, policy: TransitionPolicy) -> Self {
        self.with_system(MigrationSystem::new(policy))
            .with_system(BookkeepingSystem::new())
    }

    pub fn build(self) -> Engine {
        Engine {
            systems: self.systems,
            snapshot_writer: SnapshotWriter::new(
                &self.settings.snapshot_dir,
                self.settings.snapshot_interval_years,
            ),
            settings: self.settings,
        }
    }
}

pub struct Engine {
    systems: Vec<Box<dyn System>>,
    snapshot_writer: SnapshotWriter,
    settings: EngineSettings,
}

impl Engine {
    /// Simulates `years` further years.
    pub fn run(&mut self, world: &mut World, years: usize) -> Result<()> {
        self.run_with_hook(world, years, |_| {})
    }

    /// Like [`Engine::run`], handing the committed state of every year to
    /// `hook`.
    pub fn run_with_hook<F>(&mut self, world: &mut World, years: usize, mut hook: F) -> Result<()>
    where
        F: FnMut(WorldSnapshot),
    {
        let target = world
            .year()
            .checked_add(years)
            .filter(|target| *target <= world.horizon())
            .ok_or_else(|| SimulationError::HorizonExceeded {
                requested: world.year().saturating_add(years),
                horizon: world.horizon(),
            })?;
        tracing::info!(
            scenario = %self.settings.scenario_name,
            from = world.year(),
            to = target,
            systems = self.systems.len(),
            "simulation starting"
        );
        while world.year() < target {
            let year = world.year();
            let ctx = SystemContext {
                year,
                scenario_name: &self.settings.scenario_name,
            };
            for system in &mut self.systems {
                system
                    .run(&ctx, world)
                    .with_context(|| format!("system '{}' failed in year {year}", system.name()))?;
            }
            world.advance_year()?;
            let snapshot = world.snapshot(&self.settings.scenario_name);
            if let Some(path) = self.snapshot_writer.maybe_write(&snapshot)? {
                tracing::debug!(path = %path.display(), year = snapshot.year, "snapshot written");
            }
            hook(snapshot);
        }
        Ok(())
    }

    pub fn scenario_name(&self) -> &str {
        &self.settings.scenario_name
    }
}

pub struct SystemContext<'a> {
    /// Committed year being read; systems write into `year + 1`.
    pub year: usize,
    pub scenario_name: &'a str,
}

pub trait System: Send {
    fn name(&self) -> &str;
    fn run(&mut self, ctx: &SystemContext, world: &mut World) -> Result<()>;
}

/// Runs `years` years with the standard systems and no snapshots.
pub fn simulate(world: &mut World, years: usize, policy: TransitionPolicy) -> Result<()> {
    EngineBuilder::new(EngineSettings::without_snapshots("simulation"))
        .with_standard_systems(policy)
        .build()
        .run(world, years)
}
