//! AWOA Analyst CLI
//!
//! Ask diagnostic questions about crawler runs, fetch single traces, or
//! print the plan a question would execute.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use awoa_analyst::telemetry::InMemoryTelemetryStore;
use awoa_analyst::{AnalystAgent, AnalystConfig, AskInput, TaskScope, TimeRange, TimeWindow};

#[derive(Parser)]
#[command(name = "awoa-analyst", author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "ANALYST_CONFIG")]
    config: Option<PathBuf>,

    /// Serve telemetry from a JSONL file of step records instead of Elasticsearch
    #[arg(long, value_name = "FILE")]
    offline_steps: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question and print the report
    Ask {
        #[command(flatten)]
        question: QuestionArgs,

        /// Print the full structured response as JSON
        #[arg(long)]
        json: bool,

        /// Pin the analyst run id (reproducible reports)
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Print every step of one crawler run
    Trace {
        /// Crawler run id
        run_id: String,
    },

    /// Print the routed intent and plan without querying telemetry
    Plan {
        #[command(flatten)]
        question: QuestionArgs,
    },
}

#[derive(Args)]
struct QuestionArgs {
    /// Natural-language question
    question: String,

    /// Restrict to one site domain
    #[arg(long)]
    domain: Option<String>,

    /// Task scope: pricing, refund or contact
    #[arg(long, value_parser = parse_task)]
    task: Option<TaskScope>,

    /// Relative window such as 7d, 24h or 30m
    #[arg(long, conflicts_with_all = ["start", "end"])]
    relative: Option<String>,

    /// Window start (ISO 8601)
    #[arg(long)]
    start: Option<String>,

    /// Window end (ISO 8601)
    #[arg(long)]
    end: Option<String>,

    /// Comparison window before the change, e.g. 14d
    #[arg(long, conflicts_with_all = ["before_start", "before_end"])]
    before: Option<String>,

    /// Start of the "before" comparison window (ISO 8601)
    #[arg(long)]
    before_start: Option<String>,

    /// End of the "before" comparison window (ISO 8601)
    #[arg(long)]
    before_end: Option<String>,

    /// Comparison window after the change, e.g. 7d
    #[arg(long, conflicts_with_all = ["after_start", "after_end"])]
    after: Option<String>,

    /// Start of the "after" comparison window (ISO 8601)
    #[arg(long)]
    after_start: Option<String>,

    /// End of the "after" comparison window (ISO 8601)
    #[arg(long)]
    after_end: Option<String>,
}

/// `None` when no bound of the window was given.
fn comparison_window(relative: Option<String>, start: Option<String>, end: Option<String>) -> Option<TimeWindow> {
    if relative.is_none() && start.is_none() && end.is_none() {
        return None;
    }
    Some(TimeWindow { relative, start, end })
}

impl QuestionArgs {
    fn into_input(self) -> AskInput {
        let window = TimeWindow {
            relative: self.relative,
            start: self.start,
            end: self.end,
        };
        let range = TimeRange {
            window,
            before: comparison_window(self.before, self.before_start, self.before_end),
            after: comparison_window(self.after, self.after_start, self.after_end),
        };

        let mut input = AskInput::new(self.question);
        if let Some(domain) = self.domain {
            input = input.with_domain(domain);
        }
        if let Some(task) = self.task {
            input = input.with_task(task);
        }
        if range != TimeRange::default() {
            input = input.with_time_range(range);
        }
        input
    }
}

fn parse_task(s: &str) -> Result<TaskScope, String> {
    TaskScope::parse(s).ok_or_else(|| format!("unknown task '{}', expected pricing, refund or contact", s))
}

fn build_agent(cli: &Cli) -> anyhow::Result<AnalystAgent> {
    let config = AnalystConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let agent = match &cli.offline_steps {
        Some(path) => {
            let store = InMemoryTelemetryStore::from_jsonl_path(path)
                .with_context(|| format!("reading step records from {}", path.display()))?;
            info!(records = store.documents().len(), "using offline step records");
            AnalystAgent::from_config_with_store(&config, Arc::new(store))?
        }
        None => AnalystAgent::from_config(&config)?,
    };
    Ok(agent)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("awoa_analyst=info".parse()?),
        )
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let agent = build_agent(&cli)?;

    match cli.command {
        Commands::Ask {
            question,
            json,
            run_id,
        } => {
            let input = question.into_input();
            let response = match run_id {
                Some(run_id) => agent.ask_with_run_id(&run_id, input).await?,
                None => agent.ask(input).await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print!("{}", response.markdown);
            }
        }
        Commands::Trace { run_id } => {
            let trace = agent.trace(&run_id).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "run_id": run_id, "trace": trace }))?
            );
        }
        Commands::Plan { question } => {
            let (intent, plan) = agent.plan_only(&question.into_input());
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "intent": intent, "plan": plan }))?
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question_args(args: &[&str]) -> QuestionArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Plan { question } => question,
            _ => panic!("expected the plan subcommand"),
        }
    }

    #[test]
    fn test_explicit_comparison_windows() {
        let input = question_args(&[
            "awoa-analyst",
            "plan",
            "compare refund failures before and after",
            "--before-start",
            "2024-04-01T00:00:00Z",
            "--before-end",
            "2024-04-15T00:00:00Z",
            "--after",
            "3d",
        ])
        .into_input();
        let range = input.time_range.unwrap();
        assert_eq!(
            range.before,
            Some(TimeWindow::between("2024-04-01T00:00:00Z", "2024-04-15T00:00:00Z"))
        );
        assert_eq!(range.after, Some(TimeWindow::relative("3d")));
    }

    #[test]
    fn test_relative_and_explicit_before_conflict() {
        let parsed = Cli::try_parse_from([
            "awoa-analyst",
            "plan",
            "compare",
            "--before",
            "14d",
            "--before-start",
            "2024-04-01T00:00:00Z",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_no_window_flags_leave_range_unset() {
        let input = question_args(&["awoa-analyst", "plan", "refund hotspots"]).into_input();
        assert_eq!(input.time_range, None);
    }
}
