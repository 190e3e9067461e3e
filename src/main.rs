use std::path::PathBuf;

use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

mod alerts;
mod config;
mod db;
mod engine;
mod error;
mod fetch;
mod metrics;
mod models;
mod reconcile;
mod report;
mod rollup;
mod scheduling;

use config::EngineConfig;
use models::{AnalyticsRequest, AnalyticsResponse, DateRange, StreamKind};

#[derive(Parser)]
#[command(name = "retail-ledger-metrics")]
#[command(about = "Sales reconciliation and performance metrics for retail tenants", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic demo data for a tenant
    Seed {
        #[arg(long, default_value = "demo")]
        tenant: String,
    },
    /// Import stream lines from a CSV file
    Import {
        #[arg(long, value_enum)]
        stream: StreamArg,
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        tenant: String,
    },
    /// Reconcile the streams and print the analytics response as JSON
    Analyze {
        #[command(flatten)]
        selection: Selection,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        selection: Selection,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StreamArg {
    Sales,
    Returns,
    Giftcards,
}

impl From<StreamArg> for StreamKind {
    fn from(value: StreamArg) -> Self {
        match value {
            StreamArg::Sales => StreamKind::Sale,
            StreamArg::Returns => StreamKind::Return,
            StreamArg::Giftcards => StreamKind::GiftCard,
        }
    }
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("window")
        .args(["start", "since_days"])
        .multiple(false)
))]
struct Selection {
    #[arg(long)]
    tenant: String,
    /// First day included (UTC)
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Last day included (UTC)
    #[arg(long)]
    end: Option<NaiveDate>,
    #[arg(long)]
    since_days: Option<i64>,
    #[arg(long)]
    store: Option<String>,
    #[arg(long)]
    rep: Option<String>,
    #[arg(long)]
    no_returns: bool,
    #[arg(long)]
    no_gift_cards: bool,
    /// Read sales.csv / returns.csv / giftcards.csv from this directory instead of Postgres
    #[arg(long)]
    csv_dir: Option<PathBuf>,
    #[arg(long, default_value_t = 70.0)]
    benchmark: f64,
    #[arg(long, default_value_t = 0.5)]
    coaching_ratio: f64,
    #[arg(long, default_value_t = 5)]
    min_tickets: usize,
    #[arg(long, default_value_t = 5)]
    top_n: usize,
    #[arg(long, default_value_t = 1_000)]
    page_size: usize,
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

impl Selection {
    fn config(&self) -> EngineConfig {
        let mut config = EngineConfig {
            benchmark: self.benchmark,
            coaching_ratio: self.coaching_ratio,
            min_tickets: self.min_tickets,
            leaderboard_size: self.top_n,
            ..EngineConfig::default()
        };
        config.fetch.page_size = self.page_size;
        config.fetch.timeout = std::time::Duration::from_secs(self.timeout_secs);
        config
    }

    fn request(&self) -> anyhow::Result<AnalyticsRequest> {
        let start = match (self.start, self.since_days) {
            (Some(day), _) => Some(day),
            (None, Some(days)) => Some(cutoff_date(days)),
            (None, None) => None,
        };
        let date_range = match (start, self.end) {
            (None, None) => None,
            (start, end) => {
                let start = match start {
                    Some(day) => day,
                    None => NaiveDate::from_ymd_opt(1970, 1, 1).context("invalid epoch")?,
                };
                let end = end.unwrap_or_else(|| Utc::now().date_naive());
                Some(DateRange {
                    start: start
                        .and_hms_opt(0, 0, 0)
                        .context("invalid start date")?
                        .and_utc(),
                    end: end
                        .and_hms_milli_opt(23, 59, 59, 999)
                        .context("invalid end date")?
                        .and_utc(),
                })
            }
        };

        Ok(AnalyticsRequest {
            date_range,
            store_id: self.store.clone(),
            sales_rep_id: self.rep.clone(),
            include_returns: !self.no_returns,
            include_gift_cards: !self.no_gift_cards,
            ..AnalyticsRequest::for_tenant(self.tenant.clone())
        })
    }

    fn scope(&self) -> Option<String> {
        match (&self.store, &self.rep) {
            (Some(store), Some(rep)) => Some(format!("{store}, {rep}")),
            (Some(store), None) => Some(store.clone()),
            (None, Some(rep)) => Some(rep.clone()),
            (None, None) => None,
        }
    }
}

fn cutoff_date(since_days: i64) -> NaiveDate {
    Utc::now().date_naive() - Duration::days(since_days.max(1))
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn run_selection(selection: &Selection) -> anyhow::Result<AnalyticsResponse> {
    let config = selection.config();
    let request = selection.request()?;

    let response = match &selection.csv_dir {
        Some(dir) => {
            let source = db::load_csv_dir(dir, &request.tenant_id, config.fetch.page_size)
                .with_context(|| format!("failed to read exports from {}", dir.display()))?;
            engine::run(&source, &request, &config).await?
        }
        None => {
            let source = db::PgRecordSource::new(connect().await?);
            engine::run(&source, &request, &config).await?
        }
    };
    Ok(response)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("retail_ledger_metrics=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed { tenant } => {
            let pool = connect().await?;
            let inserted = db::seed(&pool, &tenant).await?;
            println!("Seed data inserted for {tenant} ({inserted} new lines).");
        }
        Commands::Import {
            stream,
            csv,
            tenant,
        } => {
            let pool = connect().await?;
            let stream = StreamKind::from(stream);
            let inserted = db::import_csv(&pool, stream, &tenant, &csv).await?;
            println!(
                "Inserted {inserted} {} lines from {}.",
                stream.table(),
                csv.display()
            );
        }
        Commands::Analyze { selection, out } => {
            let response = run_selection(&selection).await?;
            let json = serde_json::to_string_pretty(&response)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("Analytics written to {}.", path.display());
                }
                None => println!("{json}"),
            }
        }
        Commands::Report { selection, out } => {
            let response = run_selection(&selection).await?;
            let scope = selection.scope();
            let report = report::build_report(&selection.tenant, scope.as_deref(), &response);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_date_respects_since_days() {
        let cutoff = cutoff_date(14);
        let expected = Utc::now().date_naive() - Duration::days(14);
        assert_eq!(cutoff, expected);
    }

    #[test]
    fn selection_builds_inclusive_day_range() {
        let cli = Cli::parse_from([
            "retail-ledger-metrics",
            "analyze",
            "--tenant",
            "acme",
            "--start",
            "2026-03-01",
            "--end",
            "2026-03-31",
            "--no-returns",
            "--benchmark",
            "65",
        ]);
        let Commands::Analyze { selection, .. } = cli.command else {
            panic!("expected analyze");
        };

        let request = selection.request().unwrap();
        let range = request.date_range.unwrap();
        assert_eq!(range.start.to_rfc3339(), "2026-03-01T00:00:00+00:00");
        assert_eq!(range.end.date_naive(), NaiveDate::from_ymd_opt(2026, 3, 31).unwrap());
        assert!(!request.include_returns);
        assert!(request.include_gift_cards);
        assert_eq!(selection.config().benchmark, 65.0);
    }

    #[test]
    fn start_and_since_days_conflict() {
        let result = Cli::try_parse_from([
            "retail-ledger-metrics",
            "report",
            "--tenant",
            "acme",
            "--start",
            "2026-03-01",
            "--since-days",
            "7",
        ]);
        assert!(result.is_err());
    }
}
