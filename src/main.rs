use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Duration, Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

mod config;
mod db;
mod detectors;
mod engine;
mod error;
mod ingest;
mod isolation;
mod models;
mod report;
mod risk;
mod stats;
mod summary;
#[cfg(test)]
mod testing;

use config::EngineConfig;
use engine::Engine;

#[derive(Parser)]
#[command(name = "pos-early-warning")]
#[command(about = "Daily point-of-sale anomaly detection and risk scoring", long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Score one day against its history
    Assess {
        #[arg(long)]
        csv: PathBuf,
        /// today, yesterday or YYYY-MM-DD
        #[arg(long, default_value = "yesterday")]
        date: String,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Exclude stored flagged days from the baseline and store the result
        #[arg(long)]
        persist: bool,
    },
    /// Score every day in the file, oldest first
    Scan {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Break one day down by product, staff and high-value items
    Investigate {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        date: String,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Unit price marking an item as high-value; defaults to the configured threshold
        #[arg(long)]
        high_value: Option<f64>,
    },
    /// List stored reports
    History {
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(i64).range(0..=config::MAX_WINDOW_DAYS))]
        since_days: i64,
    },
    /// Print the effective configuration
    ShowConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("pos_early_warning={level}");
    let filter_directive = std::env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let builder = fmt()
        .with_env_filter(EnvFilter::new(filter_directive))
        .with_writer(std::io::stderr);
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig::default()),
    }
}

fn parse_date(value: &str) -> anyhow::Result<NaiveDate> {
    let today = Local::now().date_naive();
    match value {
        "today" => Ok(today),
        "yesterday" => Ok(today - Duration::days(1)),
        other => NaiveDate::parse_from_str(other, "%Y-%m-%d")
            .with_context(|| format!("invalid date {other:?}, expected YYYY-MM-DD")),
    }
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn load_summaries(
    csv: &Path,
) -> anyhow::Result<(
    Vec<models::TransactionRecord>,
    std::collections::BTreeMap<NaiveDate, models::DaySummary>,
)> {
    let outcome = ingest::read_csv(csv)?;
    if !outcome.rejected.is_empty() {
        warn!(
            rejected = outcome.rejected.len(),
            "some rows were rejected and left out of the analysis"
        );
    }
    let summaries = summary::summarize_all(&outcome.records);
    Ok((outcome.records, summaries))
}

fn emit(output: &str, out: Option<&Path>) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, output)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Report written to {}.", path.display());
        }
        None => print!("{output}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Assess {
            csv,
            date,
            config,
            format,
            out,
            persist,
        } => {
            let engine = Engine::new(load_config(config.as_deref())?)?;
            let date = parse_date(&date)?;
            let (_, summaries) = load_summaries(&csv)?;

            let mut flagged = engine.flagged_before(date, &summaries);
            let pool = if persist { Some(connect().await?) } else { None };
            if let Some(pool) = &pool {
                let baseline = &engine.config().baseline;
                let stored = db::fetch_flagged_dates(
                    pool,
                    summary::window_start(date, baseline.lookback_days),
                    baseline.exclude_flagged_at,
                )
                .await?;
                info!(stored = stored.len(), replayed = flagged.len(), "loaded flagged days");
                flagged.extend(stored);
            }

            let risk_report = engine.assess(date, &summaries, &flagged);
            let alert = report::requires_alert(&risk_report, engine.config().alert_floor);

            let rendered = match format {
                OutputFormat::Text => report::render_text(&risk_report),
                OutputFormat::Markdown => report::render_markdown(&risk_report),
                OutputFormat::Json => {
                    let mut json = serde_json::to_string_pretty(&risk_report)?;
                    json.push('\n');
                    json
                }
            };
            emit(&rendered, out.as_deref())?;

            if alert {
                warn!(date = %date, severity = %risk_report.severity, "alert threshold reached");
                eprint!("{}", report::alert_message(&risk_report));
            }

            if let Some(pool) = &pool {
                db::save_report(pool, &risk_report, alert).await?;
            }
        }
        Commands::Scan { csv, config, top } => {
            let engine = Engine::new(load_config(config.as_deref())?)?;
            let (_, summaries) = load_summaries(&csv)?;
            let reports = engine.scan(&summaries);
            print!("{}", report::render_scan(&reports, top));
        }
        Commands::Investigate {
            csv,
            date,
            config,
            high_value,
        } => {
            let engine = Engine::new(load_config(config.as_deref())?)?;
            let date = parse_date(&date)?;
            let (records, summaries) = load_summaries(&csv)?;

            let flagged = engine.flagged_before(date, &summaries);
            let risk_report = engine.assess(date, &summaries, &flagged);
            print!("{}", report::render_text(&risk_report));
            println!();
            let threshold = high_value.unwrap_or(engine.config().high_value.price_threshold);
            let breakdown = report::day_breakdown(date, &records, threshold);
            print!("{}", report::render_breakdown(&breakdown, 10));
        }
        Commands::History { since_days } => {
            let pool = connect().await?;
            let since_date = summary::window_start(Local::now().date_naive(), since_days);
            let reports = db::fetch_reports(&pool, since_date).await?;

            if reports.is_empty() {
                println!("No stored reports since {since_date}.");
                return Ok(());
            }

            info!(count = reports.len(), "loaded stored reports");
            for stored in &reports {
                println!(
                    "- {} score {} ({}): {}",
                    stored.date, stored.score, stored.severity, stored.headline_action
                );
            }
        }
        Commands::ShowConfig { config } => {
            let config = load_config(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
