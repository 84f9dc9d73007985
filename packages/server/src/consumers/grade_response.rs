use std::sync::Arc;

use common::grading::GradeResponse;
use common::retry::RetryPolicy;
use common::{SubmissionErrorCode, SubmissionStatus};
use mq::{BroccoliError, BrokerMessage, Mq};
use sea_orm::{DatabaseConnection, EntityTrait};
use tracing::{error, info, warn};

use crate::config::Weighting;
use crate::entity::submission;
use crate::error::{AppError, AppResult};
use crate::services::scoring::{FinalizeOutcome, finalize, mark_system_error};
use crate::state::AppState;

/// Consume grade responses from the response queue.
pub async fn consume_grade_responses(state: AppState, mq: Arc<Mq>) {
    let queue_name = state.config.mq.response_queue.clone();
    let concurrency = state.config.grading.consumer_concurrency.max(1);
    let weighting = state.config.grading.weighting;
    let retry = state.config.retry;
    let db = state.db;

    info!(queue = %queue_name, concurrency, "Starting grade response consumer");

    let result = mq
        .process_messages(
            &queue_name,
            Some(concurrency),
            None,
            move |message: BrokerMessage<GradeResponse>| {
                let db = db.clone();
                async move {
                    let response = message.payload;
                    let submission_id = response.submission_id();

                    match process_grade_response(&db, weighting, retry, &response).await {
                        Ok(_) => Ok(()),
                        Err(AppError::NotFound { entity, id }) => {
                            warn!(submission_id, entity, id, "Dropping grade response");
                            Ok(())
                        }
                        Err(e) => {
                            error!(
                                submission_id,
                                error = %e,
                                "Failed to process grade response"
                            );
                            Err(BroccoliError::Job(e.to_string()))
                        }
                    }
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Grade response consumer stopped unexpectedly");
    }
}

/// Apply one grade response.
///
/// A worker-side infrastructure failure moves the submission to
/// SYSTEM_ERROR. Otherwise the response is finalized, retrying database
/// failures under `retry`; if those never clear, the submission is moved to
/// SYSTEM_ERROR as well.
pub async fn process_grade_response(
    db: &DatabaseConnection,
    weighting: Weighting,
    retry: RetryPolicy,
    response: &GradeResponse,
) -> AppResult<FinalizeOutcome> {
    let submission_id = response.submission_id();

    if response.is_system_error() {
        let message = format!(
            "grader reported {}: {}",
            response.status, response.compile_output
        );
        if mark_system_error(
            db,
            submission_id,
            SubmissionErrorCode::WORKER_SYSTEM_ERROR,
            &message,
        )
        .await?
        {
            return Ok(FinalizeOutcome::Finalized {
                status: SubmissionStatus::SystemError,
                score: 0.0,
            });
        }

        let submission = submission::Entity::find_by_id(submission_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::not_found("submission", submission_id))?;
        info!(
            submission_id,
            status = %submission.status,
            "Worker system error for finalized submission, ignoring"
        );
        return Ok(FinalizeOutcome::AlreadyFinalized {
            status: submission.status,
        });
    }

    let log = response.compile_output.as_str();
    let results = response.results.as_slice();

    let attempt = retry
        .run("finalize grade response", move |_| async move {
            match finalize(db, weighting, submission_id, log, results).await {
                Err(AppError::Database(e)) => Err(e),
                other => Ok(other),
            }
        })
        .await;

    match attempt {
        Ok(outcome) => outcome,
        Err(exhausted) => {
            mark_system_error(
                db,
                submission_id,
                SubmissionErrorCode::RESULT_PROCESSING_FAILED,
                &exhausted.to_string(),
            )
            .await?;
            Err(AppError::Database(exhausted.last_error))
        }
    }
}
