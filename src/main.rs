use std::path::PathBuf;

use adherence_earnings::config::{StudyConfig, CONFIG_ENV};
use adherence_earnings::{input, report, EarningsController};
use anyhow::{anyhow, Context};
use chrono::{DateTime, FixedOffset, Utc};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "adherence-earnings")]
#[command(about = "Adherence earnings calculator for cognitive test sessions", long_about = None)]
struct Cli {
    #[command(flatten)]
    study: StudyArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StudyArgs {
    /// Study configuration file, defaults to $EARNINGS_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Completed tests as CSV or JSON
    #[arg(long, global = true)]
    tests: Option<PathBuf>,
    /// Evaluation instant (RFC 3339), defaults to now
    #[arg(long, global = true)]
    now: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current period overview as JSON
    Overview,
    /// Print per-period earnings as JSON
    Details,
    /// Print the study summary as JSON
    Summary,
    /// Generate a markdown adherence report
    Report {
        #[arg(long)]
        participant: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Compare stored per-period earnings with a recomputation
    Reconcile {
        /// Stored per-cycle amounts, e.g. --stored '$21.50' '$0,00'
        #[arg(long, num_args = 1..)]
        stored: Option<Vec<String>>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let now = evaluation_instant(cli.study.now.as_deref())?;
    let mut controller = load_controller(&cli.study)?;

    match cli.command {
        Commands::Overview => {
            let overview = controller
                .current_earnings_overview(now)
                .ok_or_else(not_ready)?;
            println!("{}", serde_json::to_string_pretty(&overview)?);
        }
        Commands::Details => {
            let details = controller
                .current_earnings_details(now)
                .ok_or_else(not_ready)?;
            println!("{}", serde_json::to_string_pretty(&details)?);
        }
        Commands::Summary => {
            let summary = controller.current_study_summary(now).ok_or_else(not_ready)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Report { participant, out } => {
            let overview = controller
                .current_earnings_overview(now)
                .ok_or_else(not_ready)?;
            let details = controller
                .current_earnings_details(now)
                .ok_or_else(not_ready)?;
            let summary = controller.current_study_summary(now).ok_or_else(not_ready)?;
            let scheduled = controller
                .schedule()
                .all_periods(controller.study_start(), *now.offset())
                .ok_or_else(not_ready)?;

            let rows = report::adherence_rows(&scheduled, &details);
            let report =
                report::build_report(participant.as_deref(), now, &overview, &summary, &rows);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Reconcile { stored } => {
            let computed = controller.cycle_totals(now).ok_or_else(not_ready)?;
            let listed: Vec<String> = computed.iter().map(ToString::to_string).collect();
            if report::earnings_match(&computed, stored.as_deref()) {
                println!("Stored earnings match: {}", listed.join(", "));
            } else {
                println!("Stored earnings differ, expected: {}", listed.join(", "));
            }
        }
    }

    Ok(())
}

fn load_controller(args: &StudyArgs) -> anyhow::Result<EarningsController> {
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .context("--config or EARNINGS_CONFIG must point to a study configuration")?,
    };
    let config = StudyConfig::load(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    let mut controller = EarningsController::from_config(&config)?;

    if let Some(path) = &args.tests {
        let tests = input::load_completed_tests(path)
            .with_context(|| format!("failed to load completed tests {}", path.display()))?;
        tracing::info!(count = tests.len(), "loaded completed tests");
        controller.set_completed_tests(tests);
    }

    Ok(controller)
}

fn evaluation_instant(raw: Option<&str>) -> anyhow::Result<DateTime<FixedOffset>> {
    match raw {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("--now must be an RFC 3339 timestamp, got {raw}")),
        None => Ok(Utc::now().fixed_offset()),
    }
}

fn not_ready() -> anyhow::Error {
    anyhow!("earnings are not ready: the study start date is unknown")
}
