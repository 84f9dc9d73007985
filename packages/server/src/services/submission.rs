use chrono::Utc;
use common::grading::{GradeMetadata, GradeRequest, GradeSettings, GradeTest};
use common::storage::BoxReader;
use common::{SubmissionErrorCode, SubmissionStatus};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::{error, info, instrument};

use crate::entity::{assignment, submission, submission_result, submission_testcase, testcase};
use crate::error::{AppError, AppResult};
use crate::services::scoring::mark_system_error;
use crate::state::AppState;
use crate::utils::paths;

/// Who submits what, where.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub user_id: i32,
    pub workspace_id: i32,
    pub assignment_id: i32,
    pub language: String,
}

/// A submission together with its per-testcase results.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionDetail {
    pub submission: submission::Model,
    pub results: Vec<submission_result::Model>,
}

/// Load an assignment of `workspace_id`, hiding unpublished ones from non-staff.
pub(crate) async fn visible_assignment(
    state: &AppState,
    user_id: i32,
    workspace_id: i32,
    assignment_id: i32,
) -> AppResult<(assignment::Model, bool)> {
    let is_staff = state.permissions.check_perm(user_id, workspace_id).await?;

    let assignment = assignment::Entity::find_by_id(assignment_id)
        .one(&state.db)
        .await?
        .filter(|a| !a.is_deleted && a.workspace_id == workspace_id)
        .ok_or_else(|| AppError::not_found("assignment", assignment_id))?;

    if !is_staff && assignment.publish_date > Utc::now() {
        return Err(AppError::not_found("assignment", assignment_id));
    }

    Ok((assignment, is_staff))
}

/// Accept a source artifact and hand it to the grader.
///
/// The submission row and its testcase snapshot are committed first, then the
/// artifact is uploaded, then the grade request is published. When upload or
/// publish keep failing the submission is moved to SYSTEM_ERROR before the
/// error is returned.
#[instrument(skip(state, new, artifact), fields(user_id = new.user_id, assignment_id = new.assignment_id))]
pub async fn create_submission(
    state: &AppState,
    new: NewSubmission,
    artifact: BoxReader,
) -> AppResult<submission::Model> {
    let language = new.language.trim();
    if language.is_empty() {
        return Err(AppError::Validation("language must not be empty".into()));
    }

    let (assignment, _) =
        visible_assignment(state, new.user_id, new.workspace_id, new.assignment_id).await?;

    let testcases = testcase::Entity::find()
        .filter(testcase::Column::AssignmentId.eq(assignment.id))
        .filter(testcase::Column::IsDeleted.eq(false))
        .order_by_asc(testcase::Column::Position)
        .all(&state.db)
        .await?;

    if testcases.is_empty() {
        return Err(AppError::NoTestcase {
            assignment_id: assignment.id,
        });
    }

    let source = read_artifact(artifact, state.config.grading.max_artifact_bytes).await?;

    let txn = state.db.begin().await?;

    let inserted = submission::ActiveModel {
        assignment_id: Set(assignment.id),
        user_id: Set(new.user_id),
        language: Set(language.to_string()),
        file_url: Set(String::new()),
        status: Set(SubmissionStatus::Grading),
        score: Set(0.0),
        compilation_log: Set(String::new()),
        error_code: Set(None),
        error_message: Set(None),
        submitted_at: Set(Utc::now()),
        graded_at: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let file_url = paths::submission_file(
        new.workspace_id,
        assignment.id,
        new.user_id,
        inserted.id,
    );
    let mut active = inserted.into_active_model();
    active.file_url = Set(file_url.clone());
    let submission = active.update(&txn).await?;

    let snapshot = testcases
        .iter()
        .enumerate()
        .map(|(i, tc)| submission_testcase::ActiveModel {
            submission_id: Set(submission.id),
            testcase_id: Set(tc.id),
            position: Set(i as i32 + 1),
            ..Default::default()
        });
    submission_testcase::Entity::insert_many(snapshot)
        .exec_without_returning(&txn)
        .await?;

    txn.commit().await?;

    info!(submission_id = submission.id, "Submission created");

    let store = state.blob_store.as_ref();
    let data = source.as_slice();
    let path = file_url.as_str();
    if let Err(exhausted) = state
        .config
        .retry
        .run("upload submission", move |_| store.upload_bytes(data, path))
        .await
    {
        fail_submission(
            state,
            submission.id,
            SubmissionErrorCode::UPLOAD_FAILED,
            &exhausted.to_string(),
        )
        .await;
        return Err(AppError::FileSystem {
            path: file_url,
            source: exhausted.last_error,
        });
    }

    let request = build_grade_request(state, &assignment, &submission, &testcases);

    let publisher = state.publisher.as_ref();
    let request = &request;
    if let Err(exhausted) = state
        .config
        .retry
        .run("dispatch grade request", move |_| publisher.publish(request))
        .await
    {
        fail_submission(
            state,
            submission.id,
            SubmissionErrorCode::DISPATCH_FAILED,
            &exhausted.to_string(),
        )
        .await;
        return Err(AppError::Dispatch {
            submission_id: submission.id,
            source: exhausted.last_error,
        });
    }

    info!(
        submission_id = submission.id,
        testcases = testcases.len(),
        "Grade request dispatched"
    );

    Ok(submission)
}

async fn read_artifact(artifact: BoxReader, limit: u64) -> AppResult<Vec<u8>> {
    let mut buf = Vec::new();
    artifact
        .take(limit.saturating_add(1))
        .read_to_end(&mut buf)
        .await
        .map_err(|e| AppError::Validation(format!("failed to read source artifact: {e}")))?;

    if buf.len() as u64 > limit {
        return Err(AppError::Validation(format!(
            "source artifact exceeds {limit} bytes"
        )));
    }
    Ok(buf)
}

async fn fail_submission(state: &AppState, submission_id: i32, code: &str, message: &str) {
    if let Err(e) = mark_system_error(&state.db, submission_id, code, message).await {
        error!(
            submission_id,
            error_code = code,
            error = %e,
            "Failed to mark submission as system error"
        );
    }
}

fn build_grade_request(
    state: &AppState,
    assignment: &assignment::Model,
    submission: &submission::Model,
    testcases: &[testcase::Model],
) -> GradeRequest {
    let prefix = &state.config.storage.url_prefix;

    GradeRequest {
        language: submission.language.clone(),
        source_url: paths::public_url(prefix, &submission.file_url),
        settings: GradeSettings {
            time_limit: assignment.time_limit,
            memory_limit: assignment.memory_limit,
            is_auto_trim_enabled: assignment.is_auto_trim_enabled,
        },
        test: testcases
            .iter()
            .map(|tc| GradeTest {
                input: paths::public_url(prefix, &tc.input_file_url),
                output: paths::public_url(prefix, &tc.output_file_url),
            })
            .collect(),
        metadata: GradeMetadata {
            assignment_id: assignment.id,
            submission_id: submission.id,
            testcase_ids: testcases.iter().map(|tc| tc.id).collect(),
            start_time: submission.submitted_at,
        },
    }
}

/// Fetch one submission with its results.
///
/// Visible to its submitter and to staff of the owning workspace, whether or
/// not it was submitted before the due date.
#[instrument(skip(state))]
pub async fn get_submission(
    state: &AppState,
    user_id: i32,
    submission_id: i32,
) -> AppResult<SubmissionDetail> {
    let submission = submission::Entity::find_by_id(submission_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("submission", submission_id))?;

    if submission.user_id != user_id {
        let assignment = assignment::Entity::find_by_id(submission.assignment_id)
            .one(&state.db)
            .await?
            .ok_or_else(|| AppError::not_found("assignment", submission.assignment_id))?;

        if !state
            .permissions
            .check_perm(user_id, assignment.workspace_id)
            .await?
        {
            return Err(AppError::PermissionDenied {
                user_id,
                workspace_id: assignment.workspace_id,
            });
        }
    }

    let results = submission_result::Entity::find()
        .filter(submission_result::Column::SubmissionId.eq(submission.id))
        .order_by_asc(submission_result::Column::Id)
        .all(&state.db)
        .await?;

    Ok(SubmissionDetail {
        submission,
        results,
    })
}

/// A user's own submissions for an assignment, newest first.
#[instrument(skip(state))]
pub async fn list_submissions(
    state: &AppState,
    user_id: i32,
    workspace_id: i32,
    assignment_id: i32,
) -> AppResult<Vec<submission::Model>> {
    let (assignment, _) = visible_assignment(state, user_id, workspace_id, assignment_id).await?;

    let submissions = submission::Entity::find()
        .filter(submission::Column::AssignmentId.eq(assignment.id))
        .filter(submission::Column::UserId.eq(user_id))
        .order_by_desc(submission::Column::SubmittedAt)
        .order_by_desc(submission::Column::Id)
        .all(&state.db)
        .await?;

    Ok(submissions)
}

/// Every submission for an assignment, newest first. Staff only.
#[instrument(skip(state))]
pub async fn list_all_submissions(
    state: &AppState,
    user_id: i32,
    workspace_id: i32,
    assignment_id: i32,
) -> AppResult<Vec<submission::Model>> {
    let (assignment, is_staff) =
        visible_assignment(state, user_id, workspace_id, assignment_id).await?;

    if !is_staff {
        return Err(AppError::PermissionDenied {
            user_id,
            workspace_id,
        });
    }

    let submissions = submission::Entity::find()
        .filter(submission::Column::AssignmentId.eq(assignment.id))
        .order_by_desc(submission::Column::SubmittedAt)
        .order_by_desc(submission::Column::Id)
        .all(&state.db)
        .await?;

    Ok(submissions)
}
