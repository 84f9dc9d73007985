use std::sync::Arc;

use async_trait::async_trait;
use common::grading::GradeRequest;
use tracing::debug;

use crate::error::MqError;
use crate::models::MqQueue;

/// Hands grade requests to the external grader.
#[async_trait]
pub trait GradePublisher: Send + Sync {
    async fn publish(&self, request: &GradeRequest) -> Result<(), MqError>;
}

/// Publishes grade requests onto a broker queue.
pub struct QueuePublisher {
    mq: Arc<MqQueue>,
    queue_name: String,
}

impl QueuePublisher {
    pub fn new(mq: Arc<MqQueue>, queue_name: impl Into<String>) -> Self {
        Self {
            mq,
            queue_name: queue_name.into(),
        }
    }
}

#[async_trait]
impl GradePublisher for QueuePublisher {
    async fn publish(&self, request: &GradeRequest) -> Result<(), MqError> {
        self.mq
            .publish(&self.queue_name, None, request, None)
            .await?;
        debug!(
            queue = %self.queue_name,
            submission_id = request.submission_id(),
            "Grade request published"
        );
        Ok(())
    }
}
