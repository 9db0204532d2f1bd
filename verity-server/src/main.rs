use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};
use verity_core::config::StoreBackend;
use verity_core::{
    Classifier, ClassifierConfig, EventStore, HttpClassifier, MemoryEventStore, PgEventStore,
    VerityConfig,
};

use verity_server::http::{self, HttpState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "verity.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

async fn open_store(config: &VerityConfig) -> anyhow::Result<Arc<dyn EventStore>> {
    match config.database.backend {
        StoreBackend::Postgres => {
            let pool = verity_core::db::create_pool(&config.database).await?;
            verity_core::db::ensure_schema(&pool).await?;
            Ok(Arc::new(PgEventStore::new(pool)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory event store; events are lost on restart");
            Ok(Arc::new(MemoryEventStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience, production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match VerityConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging (RUST_LOG wins over the configured level)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    // Open event store
    let store = match open_store(&config).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open event store: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match store.health().await {
            Ok(v) => println!("✅ {} store reachable: {}", store.name(), v),
            Err(e) => {
                println!("❌ {} store check failed: {}", store.name(), e);
                std::process::exit(1);
            }
        }
        println!("✅ Verity health check passed");
        return Ok(());
    }

    let classifier: Arc<dyn Classifier> =
        Arc::new(HttpClassifier::new(ClassifierConfig::from(&config.classifier))?);
    tracing::info!(
        store = store.name(),
        model_server = %config.classifier.url,
        "Verity starting"
    );

    let state = Arc::new(HttpState::new(store, classifier)?);

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let addr = format!("{}:{}", config.http.host, config.http.port);
    http::start_http_server(state, &addr, tx.subscribe()).await?;

    Ok(())
}
