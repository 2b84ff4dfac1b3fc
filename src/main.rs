// src/main.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use spot_arbiter::{
    arbitrage::SpotPriceAnalyzer,
    checkpoint::{CheckpointSequencer, RedisCheckpointStore},
    compute::DryRunController,
    config::{load_config, Config},
    error::RetryPolicy,
    pricing::{CsvPriceSource, ProviderId},
    simulation::{HttpTaskExecutor, SimulationConfig, SimulationLoop},
    utils::{setup_logging, SystemClock},
};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Cross-provider spot price arbitrage and checkpointed simulation
#[derive(Parser, Debug)]
#[command(name = "spot-arbiter")]
#[command(about = "Follow the cheapest spot provider and checkpoint the work done on it")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay recorded price history and export every selection decision
    Analyze {
        /// Window start (RFC 3339)
        #[arg(long)]
        start: DateTime<Utc>,

        /// Window end (RFC 3339)
        #[arg(long)]
        end: DateTime<Utc>,

        /// CSV file to write
        #[arg(short, long)]
        output: PathBuf,

        /// Provider set to compare, comma-separated; repeat for one run per
        /// set. Defaults to ARBITER_PROVIDERS.
        #[arg(long = "pair")]
        pairs: Vec<String>,
    },

    /// Run the control loop for a fixed number of minutes
    Simulate {
        #[arg(long, default_value = "60")]
        minutes: u64,
    },

    /// Print the latest committed checkpoint
    Latest,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config().context("Invalid configuration")?;
    setup_logging(config.log_level.as_deref()).context("Failed to initialize logging")?;
    config.validate_and_log();
    info!("🚀 spot-arbiter starting with providers {:?}", config.providers);

    match cli.command {
        Commands::Analyze {
            start,
            end,
            output,
            pairs,
        } => analyze(&config, start, end, &output, pairs).await,
        Commands::Simulate { minutes } => simulate(&config, minutes).await,
        Commands::Latest => latest(&config).await,
    }
}

async fn analyze(
    config: &Config,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    output: &PathBuf,
    pairs: Vec<String>,
) -> Result<()> {
    let dir = Config::require(&config.price_history_dir, "PRICE_HISTORY_DIR")?;
    let analyzer = SpotPriceAnalyzer::new(Arc::new(CsvPriceSource::new(dir)), config.region.clone());

    let provider_sets: Vec<Vec<ProviderId>> = if pairs.is_empty() {
        vec![config.providers.clone()]
    } else {
        pairs
            .into_iter()
            .map(|set| {
                set.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(ProviderId::new)
                    .collect()
            })
            .collect()
    };

    let batch = analyzer.compare_many(&provider_sets, start, end).await?;
    let Some(champion) = batch.champion() else {
        warn!("No comparison runs were executed");
        return Ok(());
    };

    champion.export_csv(output)?;
    info!(
        "Exported {} ({} switch(es)) to {}",
        champion
            .providers
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(","),
        champion.summary.switch_count,
        output.display()
    );
    if let Some(stats) = &batch.statistics {
        info!(
            "Across {} run(s): avg {:.2} switches (min {}, max {}), avg time between switches: {}",
            stats.runs,
            stats.average_switches,
            stats.min_switches,
            stats.max_switches,
            stats
                .average_inter_switch_time
                .map(|d| format!("{}s", d.num_seconds()))
                .unwrap_or_else(|| "n/a".to_string())
        );
    }
    Ok(())
}

async fn simulate(config: &Config, minutes: u64) -> Result<()> {
    let template = Config::require(&config.task_url_template, "TASK_URL_TEMPLATE")?;
    let dir = Config::require(&config.price_history_dir, "PRICE_HISTORY_DIR")?;

    let sim_config = SimulationConfig::from_config(config);
    let executor = HttpTaskExecutor::new(
        template,
        Duration::from_secs(config.task_timeout_secs),
        RetryPolicy::new(
            config.store_max_retries,
            Duration::from_millis(config.connectivity_backoff_ms),
            Duration::from_millis(config.connectivity_backoff_ms * 8),
        ),
    )?;
    let store = RedisCheckpointStore::connect(&config.redis_url, &config.checkpoint_namespace).await?;

    let mut sim = SimulationLoop::new(
        sim_config,
        Arc::new(CsvPriceSource::new(dir)),
        Arc::new(DryRunController::new(1)),
        Arc::new(executor),
        Arc::new(store),
        Arc::new(SystemClock),
    );

    let shutdown = sim.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, flushing final checkpoint...");
            shutdown.store(true, Ordering::SeqCst);
        }
    });

    let end_time = Utc::now() + chrono::Duration::minutes(minutes as i64);
    match sim.run(end_time).await {
        Ok(report) => {
            info!(
                "Done: {} unit(s), {} checkpoint(s), next unit {}",
                report.units_completed,
                report.checkpoints.len(),
                report.next_unit_id
            );
            Ok(())
        }
        Err(e) => {
            error!("Simulation aborted: {}", e);
            Err(e.into())
        }
    }
}

async fn latest(config: &Config) -> Result<()> {
    let store = RedisCheckpointStore::connect(&config.redis_url, &config.checkpoint_namespace).await?;
    let sequencer = CheckpointSequencer::new(Arc::new(store), config.conflict_max_attempts);
    let record = sequencer.resume_point(config.start_unit_id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
