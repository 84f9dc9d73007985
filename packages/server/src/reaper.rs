use std::time::Duration;

use chrono::{TimeDelta, Utc};
use common::{SubmissionErrorCode, SubmissionStatus};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QuerySelect};
use tracing::{error, info};

use crate::config::ReaperConfig;
use crate::entity::submission;
use crate::services::scoring::mark_system_error;

/// Run the stuck-grading reaper as a background task.
pub async fn run_stuck_grading_reaper(db: DatabaseConnection, config: ReaperConfig) {
    let scan_interval = Duration::from_secs(config.scan_interval_secs.max(1));

    info!(
        timeout_secs = config.timeout_secs,
        scan_interval_secs = config.scan_interval_secs,
        "Starting stuck grading reaper"
    );

    let mut interval = tokio::time::interval(scan_interval);

    loop {
        interval.tick().await;

        if let Err(e) = detect_and_handle_stuck_submissions(&db, config.timeout_secs).await {
            error!(error = %e, "Stuck grading detection failed");
        }
    }
}

/// Move submissions that have been GRADING for longer than `timeout_secs` to SYSTEM_ERROR.
///
/// Returns how many submissions were moved.
pub async fn detect_and_handle_stuck_submissions(
    db: &DatabaseConnection,
    timeout_secs: u64,
) -> Result<usize, DbErr> {
    // A timeout beyond chrono's range reaches back before any submission.
    let Some(timeout_threshold) = i64::try_from(timeout_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|timeout| Utc::now().checked_sub_signed(timeout))
    else {
        return Ok(0);
    };

    let stuck_submission_ids: Vec<i32> = submission::Entity::find()
        .select_only()
        .column(submission::Column::Id)
        .filter(submission::Column::Status.eq(SubmissionStatus::Grading))
        .filter(submission::Column::SubmittedAt.lt(timeout_threshold))
        .into_tuple()
        .all(db)
        .await?;

    if stuck_submission_ids.is_empty() {
        return Ok(0);
    }

    info!(
        count = stuck_submission_ids.len(),
        "Found submissions stuck in grading"
    );

    let message = format!("no grade response within {timeout_secs} seconds");
    let mut reaped = 0;

    for submission_id in stuck_submission_ids {
        match mark_system_error(db, submission_id, SubmissionErrorCode::STUCK_GRADING, &message)
            .await
        {
            Ok(true) => reaped += 1,
            // Finalized between the scan and the update.
            Ok(false) => {}
            Err(e) => {
                error!(
                    submission_id,
                    error = %e,
                    "Failed to mark stuck submission"
                );
            }
        }
    }

    Ok(reaped)
}
