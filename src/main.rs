use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use populace::{
    engine::{EngineBuilder, EngineSettings},
    scenario::ScenarioLoader,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Tick-driven spawn scheduler runner")]
struct Cli {
    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/frontier.yaml")]
    scenario: PathBuf,

    /// Override tick count (uses scenario default when omitted)
    #[arg(long)]
    ticks: Option<u64>,

    /// Override snapshot interval in ticks
    #[arg(long)]
    snapshot_interval: Option<u64>,

    /// Directory for snapshots
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Log filter, overrides the scenario's logging level
    #[arg(long)]
    log_level: Option<String>,
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let loader = ScenarioLoader::new(".");
    let scenario = loader.load(&cli.scenario)?;
    init_tracing(cli.log_level.as_deref().unwrap_or(&scenario.logging.level));

    let ticks = scenario.ticks(cli.ticks);
    let mut settings = EngineSettings::from_scenario(
        &scenario,
        cli.snapshot_dir
            .unwrap_or_else(|| PathBuf::from("snapshots")),
    );
    if let Some(interval) = cli.snapshot_interval {
        settings.snapshot_interval_ticks = interval;
    }

    let mut engine = EngineBuilder::from_scenario(&scenario, settings)?.build();
    let mut spawned = 0;
    engine.run_with_hook(ticks, |summary| {
        spawned += summary.spawned;
        if !summary.completed.is_empty() {
            info!(tick = summary.tick, completed = summary.completed.len(), "spawn events completed");
        }
    })?;

    println!(
        "Scenario '{}' completed for {} ticks. Spawned groups: {}, live entities: {}, fully spawned: {}",
        engine.scenario_name(),
        ticks,
        spawned,
        engine.live_entity_count(),
        engine.is_spawned()
    );
    Ok(())
}
