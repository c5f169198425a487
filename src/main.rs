use anyhow::Result;
use merchant_ingest::{
    fetch, gen,
    ingest::LoadOptions,
    worker::{IngestOutcome, IngestWorker},
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use reqwest::Client;
use std::env;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) obtain the archive ───────────────────────────────────────
    // LOADER_URL + MERCHANT_ID select a remote archive; without them a
    // synthetic one is generated locally.
    let archive = match (env::var("LOADER_URL"), env::var("MERCHANT_ID")) {
        (Ok(base), Ok(id)) => {
            let merchant_id = Uuid::parse_str(&id)?;
            info!(%merchant_id, loader = %base, "fetching archive");
            fetch::download_archive(&Client::new(), &base, merchant_id).await?
        }
        _ => {
            info!("LOADER_URL/MERCHANT_ID not set; generating a synthetic archive");
            let mut rng = StdRng::from_entropy();
            let dataset = gen::generate(&mut rng, &gen::GeneratorConfig::default());
            gen::write_archive(&dataset)?
        }
    };
    info!(bytes = archive.len(), "archive ready");

    // ─── 3) ingest off the main task ─────────────────────────────────
    let mut options = LoadOptions::default();
    if let Ok(sample) = env::var("SAMPLE_ROWS") {
        options.sample_rows = sample.parse()?;
    }

    let worker = IngestWorker::spawn();
    let ticket = worker.submit(archive, options).await?;

    match ticket.outcome.await? {
        IngestOutcome::Completed { report, database } => {
            info!(
                tables = report.tables.len(),
                inserted = report.total_inserted(),
                failed_rows = report.total_failed_rows(),
                database_bytes = database.len(),
                "ingestion complete"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        IngestOutcome::Cancelled { report } => {
            info!(tables = report.tables.len(), "ingestion cancelled");
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        IngestOutcome::Failed { message } => {
            error!("ingestion failed: {message}");
            std::process::exit(1);
        }
    }

    Ok(())
}
