use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use village_sim::{
    engine::EngineBuilder,
    scenario::ScenarioLoader,
    snapshot::SnapshotWriter,
    web::{self, WebServerConfig},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Village economy simulation runner")]
struct Cli {
    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/highland_valley.yaml")]
    scenario: PathBuf,

    /// Number of days to simulate (defaults to the scenario's date range)
    #[arg(long)]
    days: Option<u32>,

    /// Override snapshot interval in days (0 disables snapshots)
    #[arg(long)]
    snapshot_interval: Option<u32>,

    /// Directory for snapshots
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Step villages in parallel
    #[arg(long)]
    parallel: bool,

    /// Serve the observer API while the simulation runs
    #[arg(long)]
    serve: bool,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 8080)]
    port: u16,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let loader = ScenarioLoader::new(".");
    let scenario = loader.load(&cli.scenario)?;
    let days = scenario.days(cli.days);
    let snapshot_interval = cli
        .snapshot_interval
        .unwrap_or(scenario.snapshot.interval_days);
    let snapshot_dir = cli
        .snapshot_dir
        .unwrap_or_else(|| PathBuf::from("snapshots"));

    if cli.serve {
        let runtime = tokio::runtime::Runtime::new()?;
        return runtime.block_on(web::run(WebServerConfig {
            scenario,
            days,
            parallel: cli.parallel,
            snapshot_interval,
            snapshot_dir,
            host: cli.host,
            port: cli.port,
        }));
    }

    let engine = EngineBuilder::from_scenario(scenario)?
        .parallel(cli.parallel)
        .build()?;
    let mut writer = SnapshotWriter::new(&snapshot_dir, snapshot_interval);
    let initial = engine.initialize()?;
    let final_state = engine.run_with_hook(&initial, days, |state| -> Result<()> {
        writer.maybe_write(state)?;
        Ok(())
    })?;

    info!(
        scenario = %engine.scenario().name,
        villages = final_state.villages.len(),
        date = %final_state.clock.current(),
        population = final_state.total_population(),
        "scenario completed"
    );
    Ok(())
}
