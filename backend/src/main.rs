//! Stock ledger audit sweep
//!
//! Replays every product's ledger in the configured scope, reports drift
//! and the current low-stock list as JSON, and exits non-zero on drift.

use serde::Serialize;
use shared::{LowStockFilter, Product, StockAudit};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use stock_ledger::{Config, ConsistencyAuditor, LowStockReporter, PgStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Report printed on stdout
#[derive(Serialize)]
struct AuditReport {
    audited: usize,
    drifted: Vec<StockAudit>,
    low_stock: Vec<Product>,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stock_ledger=debug,ledger_audit=info,sqlx=warn".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;
    init_tracing(config.logging.json);

    tracing::info!("Starting stock ledger audit");
    tracing::info!("Environment: {}", config.environment);

    let settings = config.ledger_settings()?;

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    let store = Arc::new(PgStore::new(db_pool, settings.lock_timeout));
    let auditor = ConsistencyAuditor::new(store.clone());
    let reporter = LowStockReporter::new(store);

    let audits = auditor.audit_scope(config.audit.company_id).await?;
    let audited = audits.len();
    let drifted: Vec<StockAudit> = audits.into_iter().filter(|a| !a.consistent).collect();

    let filter = LowStockFilter {
        company_id: config.audit.company_id,
        include_archived: false,
    };
    let low_stock = reporter.collect_low_stock(filter).await?;

    let has_drift = !drifted.is_empty();
    let report = AuditReport {
        audited,
        drifted,
        low_stock,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if has_drift {
        tracing::error!("Ledger drift found, see report");
        std::process::exit(2);
    }

    Ok(())
}
