use std::sync::{Arc, Mutex};
use std::time::Duration;

use herald_core::{AnnouncementId, HeraldConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald=info".into()),
        )
        .init();

    // load config: explicit path via HERALD_CONFIG > ~/.herald/herald.toml
    let config_path = std::env::var("HERALD_CONFIG").ok();
    let config = HeraldConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        HeraldConfig::default()
    });

    let token = config
        .discord
        .token
        .clone()
        .ok_or(herald_discord::DiscordError::NoToken)?;

    // control-plane SQLite database — single file for all subsystems
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    std::fs::create_dir_all(&config.database.tenant_root)?;
    info!(path = %db_path, "opening control-plane database");

    let conn = rusqlite::Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

    // run all schema migrations (idempotent)
    herald_store::db::init_db(&conn)?;
    herald_tenant::db::init_db(&conn)?;
    herald_scheduler::db::init_db(&conn)?;
    herald_saga::db::init_db(&conn)?;
    info!("database migrations complete");

    let db = Arc::new(Mutex::new(conn));

    // Fired-trigger channel: SchedulerEngine → orchestrator worker
    let (fired_tx, fired_rx) = tokio::sync::mpsc::channel::<AnnouncementId>(256);

    let engine = herald_scheduler::SchedulerEngine::new(
        db.clone(),
        fired_tx,
        Duration::from_secs(config.scheduler.poll_interval_secs),
    );

    let chat = Arc::new(herald_discord::DiscordHttpClient::new(token));
    let orchestrator = Arc::new(herald_saga::Orchestrator::new(
        herald_store::AnnouncementStore::new(db.clone()),
        herald_saga::SagaLog::new(db.clone()),
        herald_tenant::TenantResolver::new(db.clone(), config.database.tenant_root.clone()),
        chat,
        config.dispatch.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine_task = tokio::spawn(engine.run(shutdown_rx));
    let worker_task = tokio::spawn(herald_saga::run_worker(orchestrator, fired_rx));

    info!("herald daemon running — ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    let _ = engine_task.await;
    worker_task.abort();
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
