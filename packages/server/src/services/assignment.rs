use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::SubmissionStatus;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr, EntityTrait,
    IntoActiveModel, QueryFilter, QuerySelect, Set, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entity::{assignment, submission, submission_testcase, testcase};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::utils::paths;

/// Expected input and output of one testcase.
#[derive(Debug, Clone)]
pub struct TestcaseFile {
    pub input: Vec<u8>,
    pub output: Vec<u8>,
}

/// Problem statement document. PDFs are stored as-is, anything else as markdown.
#[derive(Debug, Clone)]
pub struct DetailFile {
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl DetailFile {
    fn extension(&self) -> &'static str {
        if self.mime_type.eq_ignore_ascii_case("application/pdf") {
            "pdf"
        } else {
            "md"
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub name: String,
    pub description: String,
    pub memory_limit: i32,
    pub time_limit: i32,
    pub max_score: f64,
    pub is_auto_trim_enabled: bool,
    pub publish_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub detail: Option<DetailFile>,
    pub testcases: Vec<TestcaseFile>,
}

impl NewAssignment {
    fn validate(&self) -> AppResult<()> {
        if !self.max_score.is_finite() || self.max_score <= 0.0 {
            return Err(AppError::Validation("max_score must be positive".into()));
        }
        validate_settings(
            &self.name,
            self.memory_limit,
            self.time_limit,
            self.publish_date,
            self.due_date,
        )?;
        validate_testcases(&self.testcases)
    }
}

/// Partial edit of an assignment. `None` leaves a field as it is.
///
/// `max_score` is fixed at creation: finalized scores are absolute.
#[derive(Debug, Clone, Default)]
pub struct AssignmentUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub memory_limit: Option<i32>,
    pub time_limit: Option<i32>,
    pub is_auto_trim_enabled: Option<bool>,
    pub publish_date: Option<DateTime<Utc>>,
    /// `Some(None)` removes the deadline.
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub detail: Option<DetailFile>,
    pub testcases: Option<Vec<TestcaseFile>>,
}

fn validate_settings(
    name: &str,
    memory_limit: i32,
    time_limit: i32,
    publish_date: DateTime<Utc>,
    due_date: Option<DateTime<Utc>>,
) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("name must not be empty".into()));
    }
    if time_limit <= 0 || memory_limit <= 0 {
        return Err(AppError::Validation(
            "time_limit and memory_limit must be positive".into(),
        ));
    }
    if due_date.is_some_and(|due| due < publish_date) {
        return Err(AppError::Validation(
            "due_date must not precede publish_date".into(),
        ));
    }
    Ok(())
}

fn validate_testcases(files: &[TestcaseFile]) -> AppResult<()> {
    if files.is_empty() {
        return Err(AppError::Validation(
            "at least one testcase is required".into(),
        ));
    }
    Ok(())
}

async fn require_staff(state: &AppState, user_id: i32, workspace_id: i32) -> AppResult<()> {
    if state.permissions.check_perm(user_id, workspace_id).await? {
        Ok(())
    } else {
        Err(AppError::PermissionDenied {
            user_id,
            workspace_id,
        })
    }
}

async fn find_active(state: &AppState, assignment_id: i32) -> AppResult<assignment::Model> {
    assignment::Entity::find_by_id(assignment_id)
        .one(&state.db)
        .await?
        .filter(|a| !a.is_deleted)
        .ok_or_else(|| AppError::not_found("assignment", assignment_id))
}

async fn upload_file(state: &AppState, path: &str, data: &[u8]) -> AppResult<()> {
    let store = state.blob_store.as_ref();
    state
        .config
        .retry
        .run("upload assignment file", move |_| store.upload_bytes(data, path))
        .await
        .map_err(|exhausted| AppError::FileSystem {
            path: path.to_string(),
            source: exhausted.last_error,
        })
}

/// Best-effort removal of blobs that no row points at.
async fn discard_files(state: &AppState, assignment_id: i32, path: &str) {
    if let Err(e) = state.blob_store.delete_directory(path).await {
        warn!(
            assignment_id,
            path,
            error = %e,
            "Failed to clean up assignment files"
        );
    }
}

fn new_generation() -> String {
    Uuid::now_v7().simple().to_string()
}

/// Upload a testcase set into `generation`. Returns the (input, output) paths in order.
async fn upload_testcases(
    state: &AppState,
    assignment: &assignment::Model,
    generation: &str,
    files: &[TestcaseFile],
) -> AppResult<Vec<(String, String)>> {
    let mut uploaded = Vec::with_capacity(files.len());
    for (i, file) in files.iter().enumerate() {
        let (input_path, output_path) = paths::testcase_files(
            assignment.workspace_id,
            assignment.id,
            generation,
            i as i32 + 1,
        );
        upload_file(state, &input_path, &file.input).await?;
        upload_file(state, &output_path, &file.output).await?;
        uploaded.push((input_path, output_path));
    }
    Ok(uploaded)
}

async fn insert_testcases(
    txn: &DatabaseTransaction,
    assignment_id: i32,
    generation: &str,
    uploaded: Vec<(String, String)>,
) -> Result<Vec<testcase::Model>, DbErr> {
    let mut created = Vec::with_capacity(uploaded.len());
    for (i, (input_path, output_path)) in uploaded.into_iter().enumerate() {
        let row = testcase::ActiveModel {
            assignment_id: Set(assignment_id),
            position: Set(i as i32 + 1),
            generation: Set(generation.to_string()),
            input_file_url: Set(input_path),
            output_file_url: Set(output_path),
            is_deleted: Set(false),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(txn)
        .await?;
        created.push(row);
    }
    Ok(created)
}

/// Upload the detail document and point the assignment at it.
async fn store_detail<C: ConnectionTrait>(
    state: &AppState,
    conn: &C,
    assignment: assignment::Model,
    detail: &DetailFile,
) -> AppResult<assignment::Model> {
    let path = paths::detail_file(assignment.workspace_id, assignment.id, detail.extension());
    upload_file(state, &path, &detail.content).await?;

    let mut active = assignment.into_active_model();
    active.detail_url = Set(Some(path));
    Ok(active.update(conn).await?)
}

async fn populate_assignment(
    state: &AppState,
    txn: &DatabaseTransaction,
    assignment: assignment::Model,
    new: &NewAssignment,
) -> AppResult<(assignment::Model, Vec<testcase::Model>)> {
    let assignment = match &new.detail {
        Some(detail) => store_detail(state, txn, assignment, detail).await?,
        None => assignment,
    };

    let generation = new_generation();
    let uploaded = upload_testcases(state, &assignment, &generation, &new.testcases).await?;
    let testcases = insert_testcases(txn, assignment.id, &generation, uploaded).await?;
    Ok((assignment, testcases))
}

/// Create an assignment together with its testcases. Staff only.
///
/// Files are written while the creating transaction is open; if anything
/// fails the transaction rolls back and the assignment directory is removed.
#[instrument(skip(state, new), fields(name = %new.name, testcases = new.testcases.len()))]
pub async fn create_assignment(
    state: &AppState,
    user_id: i32,
    workspace_id: i32,
    new: NewAssignment,
) -> AppResult<(assignment::Model, Vec<testcase::Model>)> {
    require_staff(state, user_id, workspace_id).await?;
    new.validate()?;

    let txn = state.db.begin().await?;

    let assignment = assignment::ActiveModel {
        workspace_id: Set(workspace_id),
        name: Set(new.name.trim().to_string()),
        description: Set(new.description.clone()),
        detail_url: Set(None),
        memory_limit: Set(new.memory_limit),
        time_limit: Set(new.time_limit),
        max_score: Set(new.max_score),
        is_auto_trim_enabled: Set(new.is_auto_trim_enabled),
        publish_date: Set(new.publish_date),
        due_date: Set(new.due_date),
        is_deleted: Set(false),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    let assignment_id = assignment.id;
    let dir = paths::assignment_dir(workspace_id, assignment_id);

    let (assignment, testcases) = match populate_assignment(state, &txn, assignment, &new).await {
        Ok(created) => created,
        Err(e) => {
            txn.rollback().await?;
            discard_files(state, assignment_id, &dir).await;
            return Err(e);
        }
    };

    if let Err(e) = txn.commit().await {
        discard_files(state, assignment_id, &dir).await;
        return Err(e.into());
    }

    info!(
        assignment_id = assignment.id,
        workspace_id,
        testcases = testcases.len(),
        has_detail = assignment.detail_url.is_some(),
        "Assignment created"
    );

    Ok((assignment, testcases))
}

/// Edit an assignment's settings, detail document and, optionally, its testcases. Staff only.
#[instrument(skip(state, update))]
pub async fn update_assignment(
    state: &AppState,
    user_id: i32,
    assignment_id: i32,
    update: AssignmentUpdate,
) -> AppResult<assignment::Model> {
    let current = find_active(state, assignment_id).await?;
    require_staff(state, user_id, current.workspace_id).await?;

    let name = update.name.as_deref().unwrap_or(&current.name).trim();
    let memory_limit = update.memory_limit.unwrap_or(current.memory_limit);
    let time_limit = update.time_limit.unwrap_or(current.time_limit);
    let publish_date = update.publish_date.unwrap_or(current.publish_date);
    let due_date = update.due_date.unwrap_or(current.due_date);
    validate_settings(name, memory_limit, time_limit, publish_date, due_date)?;
    if let Some(files) = &update.testcases {
        validate_testcases(files)?;
    }

    let mut active = current.clone().into_active_model();
    active.name = Set(name.to_string());
    active.memory_limit = Set(memory_limit);
    active.time_limit = Set(time_limit);
    active.publish_date = Set(publish_date);
    active.due_date = Set(due_date);
    if let Some(description) = update.description {
        active.description = Set(description);
    }
    if let Some(enabled) = update.is_auto_trim_enabled {
        active.is_auto_trim_enabled = Set(enabled);
    }

    if let Some(detail) = &update.detail {
        let path = paths::detail_file(current.workspace_id, current.id, detail.extension());
        upload_file(state, &path, &detail.content).await?;
        active.detail_url = Set(Some(path));
    }

    let updated = active.update(&state.db).await?;

    // A markdown statement replaced by a PDF (or back) leaves the old file behind.
    if let Some(old) = current.detail_url.as_deref() {
        if updated.detail_url.as_deref() != Some(old) {
            discard_files(state, assignment_id, old).await;
        }
    }

    if let Some(files) = &update.testcases {
        swap_testcases(state, &updated, files).await?;
    }

    info!(
        assignment_id,
        detail_replaced = update.detail.is_some(),
        testcases_replaced = update.testcases.is_some(),
        "Assignment updated"
    );

    Ok(updated)
}

/// Swap an assignment's testcases for a new set. Staff only.
///
/// The new set is uploaded into a fresh generation before any row changes,
/// so a failed upload leaves the current testcases untouched. Old rows are
/// soft-deleted and their files kept for submissions still being graded.
#[instrument(skip(state, files), fields(testcases = files.len()))]
pub async fn replace_testcases(
    state: &AppState,
    user_id: i32,
    assignment_id: i32,
    files: Vec<TestcaseFile>,
) -> AppResult<Vec<testcase::Model>> {
    let assignment = find_active(state, assignment_id).await?;
    require_staff(state, user_id, assignment.workspace_id).await?;
    validate_testcases(&files)?;

    swap_testcases(state, &assignment, &files).await
}

async fn swap_testcases(
    state: &AppState,
    assignment: &assignment::Model,
    files: &[TestcaseFile],
) -> AppResult<Vec<testcase::Model>> {
    let generation = new_generation();
    let generation_dir =
        paths::testcase_generation_dir(assignment.workspace_id, assignment.id, &generation);

    let uploaded = match upload_testcases(state, assignment, &generation, files).await {
        Ok(uploaded) => uploaded,
        Err(e) => {
            discard_files(state, assignment.id, &generation_dir).await;
            return Err(e);
        }
    };

    let swapped = async {
        let txn = state.db.begin().await?;

        let retiring = active_generations(&txn, assignment.id).await?;
        testcase::Entity::update_many()
            .set(testcase::ActiveModel {
                is_deleted: Set(true),
                ..Default::default()
            })
            .filter(testcase::Column::AssignmentId.eq(assignment.id))
            .filter(testcase::Column::IsDeleted.eq(false))
            .exec(&txn)
            .await?;
        let testcases = insert_testcases(&txn, assignment.id, &generation, uploaded).await?;

        txn.commit().await?;
        Ok::<_, DbErr>((retiring, testcases))
    }
    .await;

    let (retiring, testcases) = match swapped {
        Ok(swapped) => swapped,
        Err(e) => {
            discard_files(state, assignment.id, &generation_dir).await;
            return Err(e.into());
        }
    };

    let purged = match purge_retired_generations(state, assignment, &retiring).await {
        Ok(purged) => purged,
        Err(e) => {
            warn!(assignment_id = assignment.id, error = %e, "Failed to purge retired testcases");
            0
        }
    };

    info!(
        assignment_id = assignment.id,
        generation = %generation,
        testcases = testcases.len(),
        purged,
        "Testcases replaced"
    );

    Ok(testcases)
}

async fn active_generations<C: ConnectionTrait>(
    conn: &C,
    assignment_id: i32,
) -> Result<HashSet<String>, DbErr> {
    let generations: Vec<String> = testcase::Entity::find()
        .select_only()
        .column(testcase::Column::Generation)
        .distinct()
        .filter(testcase::Column::AssignmentId.eq(assignment_id))
        .filter(testcase::Column::IsDeleted.eq(false))
        .into_tuple()
        .all(conn)
        .await?;
    Ok(generations.into_iter().collect())
}

/// Delete files of retired generations no GRADING submission was dispatched with.
///
/// Generations retired by this very swap (`just_retired`) wait for the next
/// one: a submission that read them just before the swap may not have
/// committed its snapshot yet.
async fn purge_retired_generations(
    state: &AppState,
    assignment: &assignment::Model,
    just_retired: &HashSet<String>,
) -> Result<usize, DbErr> {
    let retired: Vec<String> = testcase::Entity::find()
        .select_only()
        .column(testcase::Column::Generation)
        .distinct()
        .filter(testcase::Column::AssignmentId.eq(assignment.id))
        .filter(testcase::Column::IsDeleted.eq(true))
        .into_tuple()
        .all(&state.db)
        .await?;

    let live = active_generations(&state.db, assignment.id).await?;
    let pinned = generations_in_grading(&state.db, assignment.id).await?;

    let mut purged = 0;
    for generation in retired {
        if just_retired.contains(&generation)
            || live.contains(&generation)
            || pinned.contains(&generation)
        {
            continue;
        }
        let dir =
            paths::testcase_generation_dir(assignment.workspace_id, assignment.id, &generation);
        match state.blob_store.delete_directory(&dir).await {
            Ok(()) => purged += 1,
            Err(e) => warn!(
                assignment_id = assignment.id,
                path = %dir,
                error = %e,
                "Failed to delete retired testcases"
            ),
        }
    }
    Ok(purged)
}

/// Generations referenced by the snapshot of a submission that is still GRADING.
async fn generations_in_grading<C: ConnectionTrait>(
    conn: &C,
    assignment_id: i32,
) -> Result<HashSet<String>, DbErr> {
    let grading: Vec<i32> = submission::Entity::find()
        .select_only()
        .column(submission::Column::Id)
        .filter(submission::Column::AssignmentId.eq(assignment_id))
        .filter(submission::Column::Status.eq(SubmissionStatus::Grading))
        .into_tuple()
        .all(conn)
        .await?;
    if grading.is_empty() {
        return Ok(HashSet::new());
    }

    let testcase_ids: Vec<i32> = submission_testcase::Entity::find()
        .select_only()
        .column(submission_testcase::Column::TestcaseId)
        .distinct()
        .filter(submission_testcase::Column::SubmissionId.is_in(grading))
        .into_tuple()
        .all(conn)
        .await?;
    if testcase_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let generations: Vec<String> = testcase::Entity::find()
        .select_only()
        .column(testcase::Column::Generation)
        .distinct()
        .filter(testcase::Column::Id.is_in(testcase_ids))
        .into_tuple()
        .all(conn)
        .await?;
    Ok(generations.into_iter().collect())
}

/// Soft-delete an assignment. Staff only.
#[instrument(skip(state))]
pub async fn delete_assignment(state: &AppState, user_id: i32, assignment_id: i32) -> AppResult<()> {
    let assignment = find_active(state, assignment_id).await?;
    require_staff(state, user_id, assignment.workspace_id).await?;

    let mut active = assignment.into_active_model();
    active.is_deleted = Set(true);
    active.update(&state.db).await?;

    info!(assignment_id, "Assignment deleted");
    Ok(())
}
