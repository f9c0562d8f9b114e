//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Nightshift - repeated agent task scheduler
#[derive(Parser)]
#[command(
    name = "ns",
    about = "Schedules repeated agent runs against an output directory",
    version,
    after_help = "Logs are written to: ~/.local/share/nightshift/logs/nightshift.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Start a task and run its loop in the foreground
    Start {
        /// What the task should accomplish
        #[arg(value_name = "GOAL")]
        goal: String,

        /// Directory the worker writes its artifacts into
        #[arg(short, long, value_name = "DIR")]
        output_dir: PathBuf,

        /// Input material paths (repeatable)
        #[arg(short, long = "input", value_name = "PATH")]
        inputs: Vec<PathBuf>,

        /// Scheduling mode: continuous or interval
        #[arg(short, long, default_value = "interval")]
        mode: String,

        /// Seconds between runs (interval mode)
        #[arg(long, value_name = "SECONDS")]
        interval: Option<u64>,

        /// Stop after this many successful runs (0 = unlimited)
        #[arg(long, default_value = "0", value_name = "N")]
        max_runs: u64,

        /// Agent model to use
        #[arg(long)]
        model: Option<String>,

        /// Worker working directory (defaults to the common ancestor of
        /// inputs and output)
        #[arg(long, value_name = "DIR")]
        workspace: Option<PathBuf>,
    },

    /// Stop a task
    Stop {
        /// Task id
        #[arg(value_name = "TASK_ID")]
        task_id: String,
    },

    /// List tasks and their status
    List {
        /// Only show tasks with this status
        #[arg(short, long, value_name = "STATUS")]
        status: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a task's log
    Log {
        /// Task id
        #[arg(value_name = "TASK_ID")]
        task_id: String,

        /// Number of lines to show (0 = all)
        #[arg(short, long)]
        lines: Option<usize>,
    },
}

/// Output format for the list command
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start() {
        let cli = Cli::try_parse_from([
            "ns",
            "start",
            "summarize the repo",
            "--output-dir",
            "/tmp/out",
            "--input",
            "/tmp/a",
            "--input",
            "/tmp/b",
            "--mode",
            "continuous",
            "--max-runs",
            "5",
        ])
        .unwrap();

        match cli.command {
            Command::Start {
                goal,
                output_dir,
                inputs,
                mode,
                max_runs,
                ..
            } => {
                assert_eq!(goal, "summarize the repo");
                assert_eq!(output_dir, PathBuf::from("/tmp/out"));
                assert_eq!(inputs.len(), 2);
                assert_eq!(mode, "continuous");
                assert_eq!(max_runs, 5);
            }
            _ => panic!("expected start command"),
        }
    }

    #[test]
    fn test_parse_log_defaults() {
        let cli = Cli::try_parse_from(["ns", "log", "task-123"]).unwrap();
        match cli.command {
            Command::Log { task_id, lines } => {
                assert_eq!(task_id, "task-123");
                assert!(lines.is_none());
            }
            _ => panic!("expected log command"),
        }
    }

    #[test]
    fn test_output_format_parse() {
        assert!(matches!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
