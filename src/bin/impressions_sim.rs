use anyhow::{Context, Result};
use clap::Parser;
use futures::future::join_all;
use impressions::{
    EngineConfig, EntityKind, IMPRESSIONS_COLUMN, ImpressionEngine, MemoryCounterStore,
    MemoryDurableStore,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "impressions-sim")]
#[command(about = "Drive the impression engine with a simulated listing workload")]
struct Cli {
    /// Entity kind shown by the simulated listings
    #[arg(long, default_value = "post")]
    kind: String,
    /// Distinct entities in the catalogue
    #[arg(long, default_value_t = 50)]
    entities: usize,
    /// Listing requests per client
    #[arg(long, default_value_t = 200)]
    requests: usize,
    /// Concurrent clients
    #[arg(long, default_value_t = 8)]
    concurrency: usize,
    /// Entities per listing page
    #[arg(long, default_value_t = 10)]
    page_size: usize,
    /// Use REDIS_URL / DATABASE_URL from the environment instead of memory
    #[arg(long)]
    configured: bool,
    /// Print final stats as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let kind: EntityKind = cli.kind.parse().context("invalid --kind")?;
    let config = EngineConfig::from_env().context("failed to load engine configuration")?;
    let ids: Vec<String> = (0..cli.entities.max(1))
        .map(|_| Uuid::new_v4().to_string())
        .collect();

    let (engine, durable) = if cli.configured {
        let engine = ImpressionEngine::connect(config)
            .await
            .context("failed to connect impression backends")?;
        (Arc::new(engine), None)
    } else {
        let durable = Arc::new(MemoryDurableStore::with_entity_tables().await);
        for id in &ids {
            durable.insert_row(kind.table(), id).await?;
        }
        let engine = ImpressionEngine::new(Arc::new(MemoryCounterStore::new()), durable.clone(), config)?;
        (Arc::new(engine), Some(durable))
    };

    info!(kind = %kind, entities = ids.len(), clients = cli.concurrency, "starting simulated listings");

    let ids = Arc::new(ids);
    let clients = (0..cli.concurrency.max(1)).map(|client| {
        let engine = Arc::clone(&engine);
        let ids = Arc::clone(&ids);
        let requests = cli.requests;
        let page_size = cli.page_size.max(1);
        tokio::spawn(async move {
            let mut rng = Lcg64::new(0x9e3779b97f4a7c15 ^ client as u64);
            for _ in 0..requests {
                let page: Vec<String> = (0..page_size)
                    .map(|_| ids[(rng.next_u64() % ids.len() as u64) as usize].clone())
                    .collect();
                engine.record_with(kind, &page, |id| id.clone());
                tokio::task::yield_now().await;
            }
        })
    });

    for joined in join_all(clients).await {
        joined.context("simulated client panicked")?;
    }

    engine.shutdown().await.context("impression engine did not drain")?;
    let stats = engine.stats();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("batches received:   {}", stats.batches_received);
        println!("batches dropped:    {}", stats.batches_dropped);
        println!("passes aborted:     {}", stats.passes_aborted);
        println!("views counted:      {}", stats.views_counted);
        println!("flushes dispatched: {}", stats.flushes_dispatched);
        println!("flushes completed:  {}", stats.flushes_completed);
        println!("flushes failed:     {}", stats.flushes_failed);
        println!("batches aborted:    {}", stats.batches_aborted);
    }

    if let Some(durable) = durable {
        let mut total = 0i64;
        for id in ids.iter() {
            total += durable
                .read_column(kind.table(), id, IMPRESSIONS_COLUMN)
                .await?
                .unwrap_or(0);
        }
        println!("durable impressions in {}: {}", kind.table(), total);
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

struct Lcg64(u64);

impl Lcg64 {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0
    }
}
