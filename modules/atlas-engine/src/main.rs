use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use atlas_common::Config;
use atlas_engine::assembler::WordTarget;
use atlas_engine::budget::BudgetLedger;
use atlas_engine::checkpoint::CheckpointStore;
use atlas_engine::extractor::{DataExtractor, MetricsStore, PgMetricsStore};
use atlas_engine::generator::{ContentGenerator, DEFAULT_SECTIONS};
use atlas_engine::items;
use atlas_engine::orchestrator::BatchOrchestrator;
use atlas_engine::pipeline::ItemPipeline;
use atlas_engine::retry::RetryPolicy;
use atlas_engine::run_log::RunLog;
use atlas_engine::scraper::{
    ContentScraper, HttpFetcher, NoopFetcher, PageFetcher, RenderApiFetcher,
};
use atlas_engine::store::FileArtifactStore;
use model_client::ClaudeModel;

/// Batch generator for authority planning-statistics pages.
#[derive(Parser, Debug)]
#[command(name = "atlas-engine")]
struct Cli {
    /// Cap the number of items admitted this run (smoke testing).
    #[arg(long)]
    limit: Option<usize>,

    /// Override the budget ceiling from the environment, in cents.
    #[arg(long)]
    budget_cents: Option<u64>,

    /// Clear succeeded checkpoints first so every item regenerates.
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("atlas_engine=info".parse()?)
                .add_directive("model_client=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    info!("Atlas page engine starting...");

    let mut config = Config::from_env();
    if let Some(budget) = cli.budget_cents {
        config.budget_ceiling_cents = budget;
    }
    config.log_redacted();

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(&config.database_url)
        .await?;
    let store: Arc<PgMetricsStore> = Arc::new(PgMetricsStore::new(pool));

    let work_items = items::enumerate(store.as_ref()).await?;

    let checkpoints = Arc::new(CheckpointStore::open(
        std::path::Path::new(&config.data_dir).join("checkpoints"),
    )?);
    if cli.force {
        let cleared = checkpoints.reset_done().await?;
        info!(cleared, "Cleared succeeded checkpoints for forced regeneration");
    }

    // Spend already on the books from interrupted runs counts against the
    // ceiling: a crash is a sunk cost, not a budget reset.
    let prior_spend = checkpoints.recorded_spend().await;
    let ledger = Arc::new(BudgetLedger::with_prior_spend(
        config.budget_ceiling_cents,
        prior_spend,
    ));

    let model = Arc::new(ClaudeModel::new(&config.anthropic_api_key, &config.model));
    let generator = ContentGenerator::new(
        model,
        ledger.clone(),
        checkpoints.clone(),
        RetryPolicy::default(),
        DEFAULT_SECTIONS.iter().map(|s| s.to_string()).collect(),
        config.required_sections.clone(),
    );

    let fallback: Arc<dyn PageFetcher> = if config.render_api_url.is_empty() {
        warn!("RENDER_API_URL not set, complex sites degrade to primary-only scraping");
        Arc::new(NoopFetcher)
    } else {
        Arc::new(RenderApiFetcher::new(
            &config.render_api_url,
            config.render_api_token.as_deref(),
        ))
    };
    let scraper = ContentScraper::new(
        Arc::new(HttpFetcher::new()),
        fallback,
        ledger.clone(),
        RetryPolicy::default(),
    );

    let sink = Arc::new(FileArtifactStore::open(
        std::path::Path::new(&config.data_dir).join("pages"),
        Some(store.clone() as Arc<dyn MetricsStore>),
    )?);

    let run_id = format!(
        "{}-{}",
        chrono::Utc::now().format("%Y%m%dT%H%M%SZ"),
        &uuid::Uuid::new_v4().to_string()[..8]
    );
    let run_log = Arc::new(Mutex::new(RunLog::new(run_id)));

    let pipeline = Arc::new(ItemPipeline::new(
        DataExtractor::new(store),
        scraper,
        generator,
        sink,
        checkpoints.clone(),
        run_log.clone(),
        work_items.clone(),
        WordTarget {
            min: config.min_words,
            max: config.max_words,
        },
    ));

    // Ctrl-C halts admission; in-flight items finish and checkpoints stay
    // consistent for the next resume.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, finishing in-flight items then stopping");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let orchestrator = BatchOrchestrator::new(
        pipeline,
        checkpoints,
        ledger,
        run_log.clone(),
        config.concurrency,
        config.item_estimate_cents,
        cancel,
    );

    let summary = orchestrator.run(&work_items, cli.limit).await?;

    let runs_dir = std::path::Path::new(&config.data_dir).join("runs");
    run_log.lock().await.save(&runs_dir, &summary)?;

    println!("{summary}");
    Ok(())
}
