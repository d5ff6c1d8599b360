use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wbtrack_core::analytics::{self, AnalyticsEngine};
use wbtrack_core::config::Settings;
use wbtrack_core::domain::ProductId;
use wbtrack_core::ingest::{run_ingest, CsvSnapshotSource};
use wbtrack_core::storage::{
    observations::read_snapshot_file, AveragePositionLedger, ObservationStore,
};

#[derive(Debug, Parser)]
#[command(name = "wbtrack_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replace the store with a scraped CSV and append its averages to the ledger.
    Ingest {
        #[arg(long)]
        input: PathBuf,
    },
    /// Compare two snapshot files row by row.
    Compare {
        #[arg(long)]
        previous: PathBuf,
        #[arg(long)]
        current: PathBuf,
    },
    Product { id: String },
    History { id: String },
    Category { name: String },
    Query { text: String },
    Promo,
    Top,
    List {
        #[arg(value_enum)]
        what: ListKind,
    },
    /// Per-product listing of the last check.
    Digest,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ListKind {
    Articles,
    Categories,
    Queries,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let res = run(args.command, &settings).await;
    if let Err(err) = &res {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "command failed");
    }
    res
}

async fn run(command: Command, settings: &Settings) -> anyhow::Result<()> {
    let store = ObservationStore::new(&settings.data_file);
    let ledger = AveragePositionLedger::new(&settings.avg_positions_file);

    let out = match command {
        Command::Ingest { input } => {
            let source = CsvSnapshotSource::new(&input);
            let outcome = run_ingest(&source, &store, &ledger)
                .await
                .with_context(|| format!("ingest from {} failed", input.display()))?;

            // First run has nothing to compare against.
            let comparison = outcome.previous.as_deref().and_then(|prev| {
                analytics::compare_snapshots(Some(prev), Some(&*outcome.current)).ok()
            });

            json!({
                "run_id": outcome.run_id,
                "rows": outcome.current.len(),
                "ledger_entries": outcome.ledger_entries,
                "digest": analytics::check_digest(&outcome.current),
                "comparison": comparison,
            })
        }
        Command::Compare { previous, current } => {
            let previous = read_snapshot_file(&previous)
                .with_context(|| format!("load {} failed", previous.display()))?;
            let current = read_snapshot_file(&current)
                .with_context(|| format!("load {} failed", current.display()))?;
            match analytics::compare_snapshots(Some(&previous), Some(&current)) {
                Ok(comparison) => serde_json::to_value(comparison)?,
                Err(err) => {
                    tracing::info!(error = %err, "nothing to compare");
                    serde_json::Value::Null
                }
            }
        }
        Command::Product { id } => {
            let id = ProductId::new(&id);
            match store.get_product(&id) {
                Some((observations, summary)) => {
                    let series = analytics::position_series(&*store.load()?, &id);
                    json!({
                        "summary": summary,
                        "observations": observations,
                        "series": series,
                    })
                }
                None => serde_json::Value::Null,
            }
        }
        Command::History { id } => {
            let id = ProductId::new(&id);
            let history = ledger.history(&id);
            match analytics::history_series(&id, &history) {
                Some(series) => json!({ "points": history, "series": series }),
                None => serde_json::Value::Null,
            }
        }
        Command::Category { name } => {
            let snapshot = store.load()?;
            let engine = AnalyticsEngine::new(&snapshot).with_top_n(settings.top_n);
            serde_json::to_value(engine.category_report(&name))?
        }
        Command::Query { text } => {
            let snapshot = store.load()?;
            let engine = AnalyticsEngine::new(&snapshot).with_top_n(settings.top_n);
            serde_json::to_value(engine.query_report(&text))?
        }
        Command::Promo => {
            let snapshot = store.load()?;
            let engine = AnalyticsEngine::new(&snapshot).with_top_n(settings.top_n);
            serde_json::to_value(engine.promo_effectiveness())?
        }
        Command::Top => {
            let snapshot = store.load()?;
            let engine = AnalyticsEngine::new(&snapshot).with_top_n(settings.top_n);
            serde_json::to_value(engine.top_overall())?
        }
        Command::List { what } => match what {
            ListKind::Articles => serde_json::to_value(store.list_product_ids())?,
            ListKind::Categories => serde_json::to_value(store.list_categories())?,
            ListKind::Queries => serde_json::to_value(store.list_queries())?,
        },
        Command::Digest => {
            let snapshot = store.load()?;
            if snapshot.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::to_value(analytics::check_digest(&snapshot))?
            }
        }
    };

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
