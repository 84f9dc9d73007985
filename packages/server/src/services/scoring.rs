use chrono::Utc;
use common::grading::GradeResultItem;
use common::{SubmissionErrorCode, SubmissionStatus};
use sea_orm::sea_query::LockType;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::{info, instrument, warn};

use crate::config::Weighting;
use crate::entity::{assignment, submission, submission_result, submission_testcase, testcase};
use crate::error::{AppError, AppResult};

/// Score and terminal status derived from one grade response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub status: SubmissionStatus,
    pub score: f64,
}

/// Round half-up to two decimal places.
pub fn round_score(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

/// Scoring policy.
///
/// A non-empty compilation log means nothing ran: zero points, INCOMPLETED.
/// Otherwise every passing result earns `max_score / testcase_count`, and the
/// submission is COMPLETED only if all results pass.
pub fn evaluate(
    max_score: f64,
    testcase_count: usize,
    compilation_log: &str,
    results: &[GradeResultItem],
) -> Evaluation {
    if !compilation_log.is_empty() {
        return Evaluation {
            status: SubmissionStatus::Incompleted,
            score: 0.0,
        };
    }

    let weight = if testcase_count == 0 {
        0.0
    } else {
        max_score / testcase_count as f64
    };

    let raw: f64 = results.iter().filter(|r| r.pass).map(|_| weight).sum();
    let score = round_score(raw).clamp(0.0, max_score.max(0.0));

    let status = if !results.is_empty() && results.iter().all(|r| r.pass) {
        SubmissionStatus::Completed
    } else {
        SubmissionStatus::Incompleted
    };

    Evaluation { status, score }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    /// This call performed the terminal transition.
    Finalized { status: SubmissionStatus, score: f64 },
    /// The submission had already left GRADING; nothing was written.
    AlreadyFinalized { status: SubmissionStatus },
}

/// Apply a grade response to a submission.
///
/// The terminal status, score and the full result batch are written in one
/// transaction. Only a submission still in GRADING is touched, so duplicate
/// or concurrent deliveries of the same response apply at most once.
#[instrument(skip(db, compilation_log, results), fields(result_count = results.len()))]
pub async fn finalize(
    db: &DatabaseConnection,
    weighting: Weighting,
    submission_id: i32,
    compilation_log: &str,
    results: &[GradeResultItem],
) -> AppResult<FinalizeOutcome> {
    let txn = db.begin().await?;

    let submission = submission::Entity::find_by_id(submission_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("submission", submission_id))?;

    if submission.status.is_final() {
        info!(
            submission_id,
            status = %submission.status,
            "Submission already finalized, skipping"
        );
        txn.rollback().await?;
        return Ok(FinalizeOutcome::AlreadyFinalized {
            status: submission.status,
        });
    }

    let assignment = assignment::Entity::find_by_id(submission.assignment_id)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("assignment", submission.assignment_id))?;

    let snapshot: Vec<i32> = submission_testcase::Entity::find()
        .select_only()
        .column(submission_testcase::Column::TestcaseId)
        .filter(submission_testcase::Column::SubmissionId.eq(submission_id))
        .order_by_asc(submission_testcase::Column::Position)
        .into_tuple()
        .all(&txn)
        .await?;

    let compiled = compilation_log.is_empty();
    if compiled && results.len() != snapshot.len() {
        let message = format!(
            "grader returned {} results for {} dispatched testcases",
            results.len(),
            snapshot.len()
        );
        warn!(submission_id, %message, "Result batch does not match snapshot");

        if !mark_system_error(&txn, submission_id, SubmissionErrorCode::RESULT_MISMATCH, &message)
            .await?
        {
            txn.rollback().await?;
            return Ok(FinalizeOutcome::AlreadyFinalized {
                status: submission.status,
            });
        }
        txn.commit().await?;
        return Ok(FinalizeOutcome::Finalized {
            status: SubmissionStatus::SystemError,
            score: 0.0,
        });
    }

    let testcase_count = match weighting {
        Weighting::Snapshot => snapshot.len(),
        Weighting::Live => testcase::Entity::find()
            .filter(testcase::Column::AssignmentId.eq(assignment.id))
            .filter(testcase::Column::IsDeleted.eq(false))
            .count(&txn)
            .await? as usize,
    };

    let evaluation = evaluate(
        assignment.max_score,
        testcase_count,
        compilation_log,
        results,
    );

    let updated = submission::Entity::update_many()
        .set(submission::ActiveModel {
            status: Set(evaluation.status),
            score: Set(evaluation.score),
            compilation_log: Set(compilation_log.to_string()),
            graded_at: Set(Some(Utc::now())),
            ..Default::default()
        })
        .filter(submission::Column::Id.eq(submission_id))
        .filter(submission::Column::Status.eq(SubmissionStatus::Grading))
        .exec(&txn)
        .await?;

    if updated.rows_affected == 0 {
        txn.rollback().await?;
        return Ok(FinalizeOutcome::AlreadyFinalized {
            status: submission.status,
        });
    }

    // A failed compile may come back with no per-testcase results at all.
    if results.len() == snapshot.len() && !results.is_empty() {
        let now = Utc::now();
        let rows = snapshot
            .iter()
            .zip(results)
            .map(|(testcase_id, result)| submission_result::ActiveModel {
                submission_id: Set(submission_id),
                testcase_id: Set(*testcase_id),
                is_passed: Set(result.pass),
                time_used: Set(result.time),
                memory_used: Set(result.memory),
                hash: Set(result.hash.clone()),
                created_at: Set(now),
                ..Default::default()
            });
        submission_result::Entity::insert_many(rows)
            .exec_without_returning(&txn)
            .await?;
    }

    txn.commit().await?;

    info!(
        submission_id,
        status = %evaluation.status,
        score = evaluation.score,
        "Submission finalized"
    );

    Ok(FinalizeOutcome::Finalized {
        status: evaluation.status,
        score: evaluation.score,
    })
}

/// Move a GRADING submission to SYSTEM_ERROR.
///
/// Returns `false` when the submission had already reached a terminal state.
pub async fn mark_system_error<C: ConnectionTrait>(
    conn: &C,
    submission_id: i32,
    error_code: &str,
    error_message: &str,
) -> Result<bool, DbErr> {
    let updated = submission::Entity::update_many()
        .set(submission::ActiveModel {
            status: Set(SubmissionStatus::SystemError),
            error_code: Set(Some(error_code.to_string())),
            error_message: Set(Some(error_message.to_string())),
            graded_at: Set(Some(Utc::now())),
            ..Default::default()
        })
        .filter(submission::Column::Id.eq(submission_id))
        .filter(submission::Column::Status.eq(SubmissionStatus::Grading))
        .exec(conn)
        .await?;

    if updated.rows_affected > 0 {
        warn!(submission_id, error_code, "Submission marked as system error");
    }
    Ok(updated.rows_affected > 0)
}
