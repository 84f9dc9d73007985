use std::sync::Arc;

use common::storage::BlobStore;
use mq::GradePublisher;
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::permissions::PermissionChecker;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub blob_store: Arc<dyn BlobStore>,
    pub publisher: Arc<dyn GradePublisher>,
    pub permissions: Arc<dyn PermissionChecker>,
    pub config: AppConfig,
}
