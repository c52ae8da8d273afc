use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use exodus::{
    engine::{EngineBuilder, EngineSettings},
    report::{presentation_table, Grouping},
    scenario::ScenarioLoader,
    web::{self, WebServerConfig},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Water-driven migration simulator")]
struct Cli {
    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/two_regions.yaml")]
    scenario: PathBuf,

    /// Override year count (uses scenario default when omitted)
    #[arg(long)]
    years: Option<usize>,

    /// Override snapshot interval in years
    #[arg(long)]
    snapshot_interval: Option<usize>,

    /// Directory for snapshots
    #[arg(long, default_value = "snapshots")]
    snapshot_dir: PathBuf,

    /// Write the presentation table as JSON to this file
    #[arg(long)]
    table_out: Option<PathBuf>,

    /// Group table rows by origin territory instead of origin region
    #[arg(long)]
    by_origin: bool,

    /// Serve the run as a JSON/SSE feed instead of exiting
    #[arg(long)]
    serve: bool,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    let loader = ScenarioLoader::new(".");
    let scenario = loader.load(&cli.scenario)?;
    let years = scenario.years(cli.years);
    let snapshot_interval = cli
        .snapshot_interval
        .unwrap_or(scenario.snapshot_interval_years);
    let grouping = if cli.by_origin {
        Grouping::ByOrigin
    } else {
        Grouping::ByRegion
    };

    if cli.serve {
        let config = WebServerConfig {
            scenario,
            years,
            snapshot_interval,
            snapshot_dir: cli.snapshot_dir,
            grouping,
            host: cli.host,
            port: cli.port,
        };
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        return runtime.block_on(web::run(config));
    }

    let mut world = scenario.build_world(years)?;
    let settings = EngineSettings {
        scenario_name: scenario.name.clone(),
        snapshot_interval_years: snapshot_interval,
        snapshot_dir: cli.snapshot_dir,
    };
    let mut engine = EngineBuilder::new(settings)
        .with_standard_systems(scenario.policy)
        .build();
    engine.run(&mut world, years)?;

    if let Some(path) = cli.table_out {
        let rows = presentation_table(&world, grouping);
        let json = serde_json::to_string_pretty(&rows)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write table to {}", path.display()))?;
        tracing::info!(rows = rows.len(), path = %path.display(), "presentation table written");
    }

    println!(
        "Scenario '{}' completed for {} years. Final population: {:.0} (unplaced: {:.0})",
        scenario.name,
        years,
        world.total_population(world.year()).unwrap_or(0.0),
        world.total_unplaced()
    );
    Ok(())
}
