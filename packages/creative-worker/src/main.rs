// Entry point for the creative extraction worker

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use creative_extraction::{
    BrandProfile, Credential, ElasticsearchIndex, ExtractionRouter, HttpContentHasher,
    ImageExtractionClient, JobConfig, JobError, JobRunner, KeyRotator, PostgresStore,
    RotatorConfig, RunContext, SinkConfig, VideoExtractionClient,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "creative-worker", about = "Extract structured analysis from a page's ad creatives")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze every creative of one page
    Run {
        /// Page whose stored ads are processed
        #[arg(long)]
        page_id: String,

        /// Brand website, used to name the brand in prompts
        #[arg(long)]
        brand_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,creative_extraction=debug,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    match cli.command {
        Command::Run { page_id, brand_url } => run_page(config, page_id, brand_url).await,
    }
}

async fn run_page(config: Config, page_id: String, brand_url: Option<String>) -> Result<()> {
    tracing::info!("Connecting to database...");
    let store = Arc::new(
        PostgresStore::connect(&config.database_url)
            .await
            .context("Failed to connect to database")?,
    );
    tracing::info!("Database connected");

    let ads = store
        .load_page_ads(&page_id)
        .await
        .context("Failed to load page ads")?;
    tracing::info!(page_id = %page_id, ads = ads.len(), "Loaded page ads");

    let credentials = config
        .gemini_api_keys
        .iter()
        .enumerate()
        .map(|(i, key)| Credential::new(format!("gemini-{i}"), key.clone()))
        .collect();
    let rotator = KeyRotator::new(
        credentials,
        RotatorConfig::default()
            .with_threshold(config.key_threshold)
            .with_cooldown(config.key_cooldown),
    )
    .context("Invalid key rotation settings")?;

    let extractors = ExtractionRouter::new(
        Arc::new(ImageExtractionClient::new(config.image_endpoints.clone())),
        Arc::new(VideoExtractionClient::new(Arc::new(rotator))),
    )
    .context("Failed to build extraction clients")?;

    let mut ctx = RunContext::new(
        page_id.clone(),
        Arc::new(HttpContentHasher::new()),
        store.clone(),
        extractors,
        store.clone(),
        store.clone(),
    )
    .with_brand(BrandProfile::from_url(brand_url.as_deref()))
    .with_resource(store.clone())
    .with_sink_config(
        SinkConfig::default()
            .with_capacity(config.batch_capacity)
            .with_indexes(config.image_index.clone(), config.video_index.clone()),
    )
    .with_job_config(JobConfig::default().with_flush_every_ads(config.flush_every_ads));

    if let Some(url) = &config.search_url {
        let mut index = ElasticsearchIndex::new(url.clone());
        if let Some(key) = &config.search_api_key {
            index = index.with_api_key(key.expose());
        }
        let index = Arc::new(index);
        ctx = ctx.with_search(index.clone()).with_resource(index);
        tracing::info!(search_url = %url, "Search sink enabled");
    } else {
        tracing::info!("SEARCH_URL not set, search sink disabled");
    }

    match JobRunner::new(ctx).run(ads).await {
        Ok(summary) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
            );
            Ok(())
        }
        Err(JobError::NoAds { page_id }) => {
            tracing::warn!(page_id = %page_id, "No ads found, nothing to analyze");
            Err(JobError::NoAds { page_id }).context("Page run did not start")
        }
        Err(e) => Err(e).context("Page run failed"),
    }
}
