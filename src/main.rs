//! Nightshift - repeated agent task scheduler
//!
//! CLI entry point for starting, stopping, and inspecting tasks.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use nightshift::agent::ProcessAgent;
use nightshift::cli::{Cli, Command, OutputFormat};
use nightshift::config::Config;
use nightshift::domain::{TaskMode, TaskStatus};
use nightshift::ops::{StartOptions, TaskService};
use nightshift::runner::TaskRegistry;
use nightshift::store::TaskStore;
use nightshift::tasklog::TaskLogger;

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nightshift")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("nightshift.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

/// Service plus the shared handles the CLI needs alongside it
struct App {
    service: TaskService,
    store: Arc<TaskStore>,
    registry: Arc<TaskRegistry>,
}

impl App {
    fn new(config: &Config) -> Result<Self> {
        let store = Arc::new(TaskStore::open(config.store_path()).context("Failed to open task store")?);
        let registry = Arc::new(TaskRegistry::new());
        let agent = Arc::new(ProcessAgent::new(&config.agent.bin));
        let log = Arc::new(TaskLogger::new(config.task_log_dir()).context("Failed to create task log directory")?);

        let service = TaskService::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            agent,
            log,
            config.service_settings(),
        );

        Ok(Self { service, store, registry })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Start {
            goal,
            output_dir,
            inputs,
            mode,
            interval,
            max_runs,
            model,
            workspace,
        } => {
            let mode: TaskMode = mode.parse().map_err(|e: String| eyre::eyre!(e))?;
            cmd_start(
                &config,
                StartOptions {
                    goal,
                    input_materials: inputs,
                    output_dir,
                    mode,
                    interval_seconds: interval,
                    max_success_runs: max_runs,
                    model,
                    workspace_dir: workspace,
                },
            )
            .await
        }
        Command::Stop { task_id } => cmd_stop(&config, &task_id),
        Command::List { status, format } => cmd_list(&config, status.as_deref(), format),
        Command::Log { task_id, lines } => cmd_log(&config, &task_id, lines),
    }
}

/// Start a task and keep its loop running until it ends or Ctrl+C
async fn cmd_start(config: &Config, options: StartOptions) -> Result<()> {
    let app = App::new(config)?;

    println!("Priming task (goal: {})...", options.goal);
    let record = app.service.start(options).await?;

    println!("Task {} started", record.id);
    println!("  mode: {}", record.mode);
    if record.interval_seconds > 0 {
        println!("  interval: {}s", record.interval_seconds);
    }
    if record.max_success_runs > 0 {
        println!("  max runs: {}", record.max_success_runs);
    }
    println!("  output: {}", record.output_dir.display());
    println!();
    println!("Running. Press Ctrl+C to stop.");

    // The scheduler lives in this process; stay up until the loop ends.
    while app.registry.is_active(&record.id) {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping task {}...", record.id);
                app.service.stop(&record.id)?;
            }
            _ = tokio::time::sleep(Duration::from_millis(500)) => {}
        }
    }

    match app.store.get(&record.id) {
        Some(task) => {
            println!("Task {} ended: {} ({} runs)", task.id, task.status, task.run_count);
            if let Some(error) = &task.last_error {
                println!("  last error: {error}");
            }
        }
        None => println!("Task {} ended", record.id),
    }
    Ok(())
}

/// Stop a task
fn cmd_stop(config: &Config, task_id: &str) -> Result<()> {
    let app = App::new(config)?;
    let record = app.service.stop(task_id)?;
    println!("Task {}: {}", record.id, record.status);
    Ok(())
}

/// List tasks
fn cmd_list(config: &Config, status: Option<&str>, format: OutputFormat) -> Result<()> {
    let app = App::new(config)?;

    let filter = match status {
        Some(s) => Some(s.parse::<TaskStatus>().map_err(|e| eyre::eyre!(e))?),
        None => None,
    };
    let views = app.service.list(filter);

    match format {
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = views
                .iter()
                .map(|v| {
                    serde_json::json!({
                        "id": v.record.id,
                        "status": v.status_label(),
                        "mode": v.record.mode.to_string(),
                        "run_count": v.record.run_count,
                        "goal": v.record.goal,
                        "output_dir": v.record.output_dir,
                        "last_run_at": v.record.last_run_at,
                        "last_error": v.record.last_error,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => {
            if views.is_empty() {
                println!("No tasks found.");
                return Ok(());
            }
            println!("{:<38} {:<10} {:<11} {:>5}  GOAL", "ID", "STATUS", "MODE", "RUNS");
            for v in &views {
                println!(
                    "{:<38} {:<10} {:<11} {:>5}  {}",
                    v.record.id,
                    v.status_label(),
                    v.record.mode.to_string(),
                    v.record.run_count,
                    v.record.goal,
                );
            }
        }
    }
    Ok(())
}

/// Show a task's log
fn cmd_log(config: &Config, task_id: &str, lines: Option<usize>) -> Result<()> {
    let app = App::new(config)?;
    let lines = lines.unwrap_or(config.runner.log_tail_lines);
    let output = app.service.log(task_id, lines)?;
    println!("{output}");
    Ok(())
}
