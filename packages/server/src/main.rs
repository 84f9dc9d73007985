use std::sync::Arc;

use anyhow::Context;
use common::storage::filesystem::FilesystemBlobStore;
use grading_server::config::AppConfig;
use grading_server::consumers::consume_grade_responses;
use grading_server::database::{ensure_indexes, init_db};
use grading_server::permissions::ParticipantPermissions;
use grading_server::reaper::run_stuck_grading_reaper;
use grading_server::state::AppState;
use mq::{MqConfig, QueuePublisher, init_mq};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::load().context("Failed to load config")?;

    let db = init_db(&config.database)
        .await
        .context("Failed to initialize database")?;
    ensure_indexes(&db)
        .await
        .context("Failed to create indexes")?;

    let mq = Arc::new(
        init_mq(MqConfig::from(&config.mq))
            .await
            .context("Failed to initialize MQ")?,
    );
    info!(
        request_queue = %config.mq.request_queue,
        response_queue = %config.mq.response_queue,
        "MQ connected"
    );

    let blob_store = FilesystemBlobStore::new(
        config.storage.base_path.clone(),
        config.storage.max_blob_bytes,
    )
    .await
    .context("Failed to initialize blob store")?;

    let state = AppState {
        db: db.clone(),
        blob_store: Arc::new(blob_store),
        publisher: Arc::new(QueuePublisher::new(mq.clone(), config.mq.request_queue.clone())),
        permissions: Arc::new(ParticipantPermissions::new(db.clone())),
        config: config.clone(),
    };

    tokio::spawn(consume_grade_responses(state.clone(), mq));

    if config.reaper.enabled {
        tokio::spawn(run_stuck_grading_reaper(
            state.db.clone(),
            config.reaper.clone(),
        ));
    }

    info!(
        weighting = ?config.grading.weighting,
        storage = %config.storage.base_path.display(),
        "Grading server running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");

    Ok(())
}
