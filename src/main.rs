mod config;

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kubelogs_k8s::{KubeClient, LabelSelector};
use kubelogs_logs::{
    AggregateError, AggregateRequest, AggregateSummary, ColorAllocator, LogAggregator, OutputSink,
};
use kubelogs_types::StreamOptions;

use crate::config::Config;

const EXAMPLES: &str = "\
Examples:
  kubelogs app=hello
  kubelogs 'app=hello,tier in (web,api)' -n prod -f
  kubelogs app=hello -c sidecar -t 50 --since 10m";

/// kubelogs - Aggregate and follow logs from every pod matching a label selector
#[derive(Parser, Debug)]
#[command(name = "kubelogs")]
#[command(author, version, about, long_about = None)]
#[command(after_help = EXAMPLES)]
struct Args {
    /// Label selector, e.g. "app=hello" or "tier in (web,api),!canary"
    #[arg(value_name = "SELECTOR")]
    selector: String,

    /// Container to read in multi-container pods
    #[arg(short, long)]
    container: Option<String>,

    /// Namespace to search (defaults to the context's namespace)
    #[arg(short, long)]
    namespace: Option<String>,

    /// Number of recent lines to show per pod; negative shows all
    #[arg(short, long, allow_negative_numbers = true)]
    tail: Option<i64>,

    /// Keep streaming new lines until every stream ends or Ctrl-C
    #[arg(short, long)]
    follow: bool,

    /// Print pod names without color
    #[arg(long)]
    no_color: bool,

    /// Kubeconfig context to use instead of the current one
    #[arg(long)]
    context: Option<String>,

    /// Only show lines newer than this duration, e.g. 30s, 5m, 2h, 1d
    #[arg(long, value_name = "DURATION", value_parser = parse_since)]
    since: Option<i64>,

    /// Prefix each line with its timestamp
    #[arg(long)]
    timestamps: bool,

    /// Config file (defaults to ~/.kubelogs/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    init_tracing(args.verbose);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warn,kubelogs=debug,kubelogs_k8s=debug,kubelogs_logs=debug"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<ExitCode> {
    check_selector(&args.selector)?;

    let config = Config::load(args.config.as_deref())?;
    let context = args.context.clone().or_else(|| config.context.clone());
    let request = build_request(args, &config, io::stdout().is_terminal())?;

    eprintln!("Retrieving logs...");

    let client = KubeClient::new(context.as_deref()).await?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let aggregator = LogAggregator::new(client, OutputSink::stdio()).with_cancellation(cancel);
    match aggregator.run(request).await {
        Ok(summary) => {
            report_failures(&summary);
            if summary.was_cancelled() {
                info!("stopped by interrupt");
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            if let AggregateError::AttachFailed { summary, .. } = &e {
                report_failures(summary);
            }
            Err(e.into())
        }
    }
}

/// Reject a malformed selector before any kubeconfig or cluster work
fn check_selector(raw: &str) -> Result<(), AggregateError> {
    LabelSelector::parse(raw)
        .map(|_| ())
        .map_err(|source| AggregateError::InvalidSelector {
            selector: raw.to_string(),
            source,
        })
}

/// Merge command-line flags over the config file
fn build_request(args: Args, config: &Config, stdout_is_terminal: bool) -> Result<AggregateRequest> {
    let colors = ColorAllocator::new(
        config.palette_colors()?,
        color_enabled(args.no_color, config.color, stdout_is_terminal),
    );

    let options = StreamOptions::new()
        .container(args.container)
        .tail(args.tail.or(config.tail).unwrap_or(-1))
        .follow(args.follow)
        .since_seconds(args.since)
        .timestamps(args.timestamps);

    Ok(AggregateRequest::new(args.selector)
        .namespace(args.namespace.or_else(|| config.namespace.clone()))
        .options(options)
        .colors(colors))
}

/// Color only a terminal, and only when neither the flag nor the config turn it off
fn color_enabled(no_color: bool, configured: Option<bool>, stdout_is_terminal: bool) -> bool {
    !no_color && configured.unwrap_or(true) && stdout_is_terminal
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("interrupted, closing log streams");
        cancel.cancel();
    }
}

fn report_failures(summary: &AggregateSummary) {
    if let Some(line) = failure_line(summary) {
        eprintln!("{}", line);
    }
}

/// In follow mode, how many streams ended early
fn failure_line(summary: &AggregateSummary) -> Option<String> {
    let failed = summary.failures().count();
    (summary.follow && failed > 0).then(|| {
        format!(
            "{} of {} log streams ended with an error",
            failed,
            summary.reports.len()
        )
    })
}

/// Parse `30s`, `5m`, `2h`, `1d` or bare seconds into seconds
fn parse_since(value: &str) -> Result<i64, String> {
    let value = value.trim();
    let (digits, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(i) => value.split_at(i),
        None => (value, "s"),
    };

    let amount: i64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{}'", value))?;

    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        other => return Err(format!("unknown duration unit '{}' (use s, m, h or d)", other)),
    };

    if amount == 0 {
        return Err("duration must be greater than zero".to_string());
    }

    amount
        .checked_mul(multiplier)
        .ok_or_else(|| format!("duration '{}' is too large", value))
}
