//! jobrelay CLI: run the relay, or normalize a task offline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use jobrelay::batch::Batcher;
use jobrelay::classify::Classifier;
use jobrelay::config::Config;
use jobrelay::dispatch::{Dispatcher, EventLanes};
use jobrelay::event::TaskEvent;
use jobrelay::model::{TaskDefinition, TaskStatus};
use jobrelay::normalize::Normalizer;
use jobrelay::projects::ProjectRegistry;
use jobrelay::sink::HttpReportSink;
use jobrelay::source::HttpTaskSource;
use jobrelay::telemetry::{TelemetryConfig, init_telemetry};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "jobrelay", about = "Relay task lifecycle events to the job dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read newline-delimited events from stdin and report them
    Serve {
        /// Projects registry (TOML); overrides PROJECTS_FILE
        #[arg(long)]
        projects: Option<PathBuf>,
    },
    /// Print the job record one run of a task normalizes to
    Normalize {
        /// Task definition JSON
        #[arg(long)]
        task: PathBuf,
        /// Task status JSON (holds the task id and runs)
        #[arg(long)]
        status: PathBuf,
        /// Run to normalize
        #[arg(long, default_value_t = 0)]
        run: u32,
        #[arg(long, default_value = "https://tools.taskcluster.net/task-inspector")]
        inspector_url: String,
        #[arg(long, default_value = "https://queue.taskcluster.net/v1")]
        task_service_url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { projects } => cmd_serve(projects).await,
        Command::Normalize {
            task,
            status,
            run,
            inspector_url,
            task_service_url,
        } => cmd_normalize(task, status, run, inspector_url, task_service_url),
    }
}

async fn cmd_serve(projects: Option<PathBuf>) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "jobrelay".to_string(),
        default_filter: config.log_level.clone(),
        json_logs: config.log_json,
    })?;

    let registry = match projects.or_else(|| config.projects_file.clone()) {
        Some(path) => ProjectRegistry::load_from_file(&path)?,
        None => ProjectRegistry::open(),
    };

    let batch_config = config.batch_config();
    let classifier_config = config.classifier_config();
    let tasks = Arc::new(HttpTaskSource::new(
        &config.task_service_url,
        &config.scheduler_url,
    )?);
    let sink = Arc::new(HttpReportSink::new(
        &config.reporting_url,
        config.reporting_client_id.clone(),
        config.reporting_secret,
    )?);

    let batcher = Batcher::new(sink, batch_config);
    let classifier = Classifier::new(
        Normalizer::new(&config.inspector_url, &config.task_service_url),
        tasks.clone(),
        classifier_config,
    );
    let dispatcher = Dispatcher::new(
        tasks,
        classifier,
        Arc::clone(&batcher),
        Arc::new(registry),
        config.route_prefix.clone(),
    );
    let lanes = EventLanes::new(Arc::new(dispatcher));

    let ticker = tokio::spawn(Arc::clone(&batcher).run());
    info!(route_prefix = %config.route_prefix, "relay started, reading events from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, draining");
                break;
            }
            line = lines.next_line() => line.context("reading events")?,
        };
        let Some(line) = line else {
            info!("event stream closed, draining");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<TaskEvent>(&line) {
            Ok(event) => lanes.submit(event),
            Err(e) => warn!(error = %e, "skipping malformed event"),
        }
    }

    lanes.drain().await;
    batcher.shutdown();
    ticker.await.context("batcher task")?;
    let idle = batcher
        .wait_idle(Duration::from_millis(100), config.flush_timeout + Duration::from_secs(1))
        .await;
    if !idle {
        anyhow::bail!("shut down with flushes still in flight");
    }
    Ok(())
}

fn cmd_normalize(
    task_path: PathBuf,
    status_path: PathBuf,
    run_id: u32,
    inspector_url: String,
    task_service_url: String,
) -> anyhow::Result<()> {
    let task: TaskDefinition = read_json(&task_path)?;
    let status: TaskStatus = read_json(&status_path)?;
    let run = status
        .run(run_id)
        .with_context(|| format!("run {run_id} not in status for {}", status.task_id))?;

    let normalizer = Normalizer::new(inspector_url, task_service_url);
    let record = normalizer.normalize(&status.task_id, &task, run)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> anyhow::Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}
