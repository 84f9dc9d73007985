use std::time::Duration;

use sea_orm::sea_query::Index;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::entity::{submission, testcase};

pub async fn init_db(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(config.url.clone());

    // Set connection pool options
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8))
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;
    db.get_schema_registry("grading_server::entity::*")
        .sync(&db)
        .await?;

    Ok(db)
}

/// Create secondary indexes that the entity definitions cannot express.
///
/// Failures are logged and skipped; the service works without them, only slower.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();

    // Scoreboard and per-user listing:
    // SELECT ... FROM submission WHERE assignment_id IN (...) AND user_id = ?
    let stmt = Index::create()
        .if_not_exists()
        .name("idx_submission_assignment_user")
        .table(submission::Entity)
        .col(submission::Column::AssignmentId)
        .col(submission::Column::UserId)
        .to_owned();
    create_index(db, backend.build(&stmt), "idx_submission_assignment_user").await;

    // Stuck-grading reaper:
    // SELECT id FROM submission WHERE status = 'GRADING' AND submitted_at < ?
    let stmt = Index::create()
        .if_not_exists()
        .name("idx_submission_status_submitted")
        .table(submission::Entity)
        .col(submission::Column::Status)
        .col(submission::Column::SubmittedAt)
        .to_owned();
    create_index(db, backend.build(&stmt), "idx_submission_status_submitted").await;

    // Active testcase lookup at submit and finalize time
    let stmt = Index::create()
        .if_not_exists()
        .name("idx_testcase_assignment_active")
        .table(testcase::Entity)
        .col(testcase::Column::AssignmentId)
        .col(testcase::Column::IsDeleted)
        .to_owned();
    create_index(db, backend.build(&stmt), "idx_testcase_assignment_active").await;

    Ok(())
}

async fn create_index(db: &DatabaseConnection, stmt: sea_orm::Statement, name: &str) {
    match db.execute_raw(stmt).await {
        Ok(_) => {
            info!("Ensured index {} exists", name);
        }
        Err(e) => {
            warn!("Failed to create index {}: {}", name, e);
        }
    }
}
