use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use common::SubmissionStatus;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect};
use serde::Serialize;
use tracing::instrument;

use crate::entity::workspace_participant::{self, WorkspaceRole};
use crate::entity::{assignment, submission};
use crate::error::AppResult;
use crate::services::scoring::round_score;

/// One row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreboardEntry {
    pub user_id: i32,
    /// Sum over assignments of the best on-time score.
    pub score: f64,
    /// Assignments with at least one on-time COMPLETED submission.
    pub completed_assignment_count: u32,
    pub total_submission_count: u32,
    pub last_submitted_at: DateTime<Utc>,
}

/// The fields of a submission the scoreboard looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSubmission {
    pub user_id: i32,
    pub assignment_id: i32,
    pub status: SubmissionStatus,
    pub score: f64,
    pub submitted_at: DateTime<Utc>,
}

impl From<&submission::Model> for ScoredSubmission {
    fn from(s: &submission::Model) -> Self {
        Self {
            user_id: s.user_id,
            assignment_id: s.assignment_id,
            status: s.status,
            score: s.score,
            submitted_at: s.submitted_at,
        }
    }
}

#[derive(Default)]
struct Tally {
    /// Keyed by assignment id so the sum always runs in the same order.
    best: BTreeMap<i32, f64>,
    completed: HashSet<i32>,
    submissions: u32,
    last_submitted_at: Option<DateTime<Utc>>,
}

/// Build the ranking from raw submissions.
///
/// `due_dates` holds every assignment that counts, keyed by id; `None` means
/// no deadline. Submissions for other assignments, by `staff`, not in a
/// graded state, or at/after the deadline are ignored.
pub fn aggregate<'a>(
    submissions: impl IntoIterator<Item = &'a ScoredSubmission>,
    due_dates: &HashMap<i32, Option<DateTime<Utc>>>,
    staff: &HashSet<i32>,
) -> Vec<ScoreboardEntry> {
    let mut tallies: HashMap<i32, Tally> = HashMap::new();

    for s in submissions {
        let Some(due_date) = due_dates.get(&s.assignment_id) else {
            continue;
        };
        if !s.status.is_ranked() || staff.contains(&s.user_id) {
            continue;
        }
        if due_date.is_some_and(|due| s.submitted_at >= due) {
            continue;
        }

        let tally = tallies.entry(s.user_id).or_default();
        let best = tally.best.entry(s.assignment_id).or_insert(s.score);
        if s.score > *best {
            *best = s.score;
        }
        if s.status == SubmissionStatus::Completed {
            tally.completed.insert(s.assignment_id);
        }
        tally.submissions += 1;
        tally.last_submitted_at = tally.last_submitted_at.max(Some(s.submitted_at));
    }

    let mut entries: Vec<ScoreboardEntry> = tallies
        .into_iter()
        .filter_map(|(user_id, tally)| {
            Some(ScoreboardEntry {
                user_id,
                score: round_score(tally.best.values().sum()),
                completed_assignment_count: tally.completed.len() as u32,
                total_submission_count: tally.submissions,
                last_submitted_at: tally.last_submitted_at?,
            })
        })
        .collect();

    entries.sort_by(rank_order);
    entries
}

/// Higher score first, then earlier last submission, then fewer attempts, then user id.
fn rank_order(a: &ScoreboardEntry, b: &ScoreboardEntry) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.last_submitted_at.cmp(&b.last_submitted_at))
        .then_with(|| a.total_submission_count.cmp(&b.total_submission_count))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// Compute the current scoreboard of a workspace. Read-only.
#[instrument(skip(db))]
pub async fn get_scoreboard(
    db: &DatabaseConnection,
    workspace_id: i32,
) -> AppResult<Vec<ScoreboardEntry>> {
    let assignments: Vec<(i32, Option<DateTime<Utc>>)> = assignment::Entity::find()
        .select_only()
        .column(assignment::Column::Id)
        .column(assignment::Column::DueDate)
        .filter(assignment::Column::WorkspaceId.eq(workspace_id))
        .filter(assignment::Column::IsDeleted.eq(false))
        .into_tuple()
        .all(db)
        .await?;

    if assignments.is_empty() {
        return Ok(Vec::new());
    }

    let staff: HashSet<i32> = workspace_participant::Entity::find()
        .select_only()
        .column(workspace_participant::Column::UserId)
        .filter(workspace_participant::Column::WorkspaceId.eq(workspace_id))
        .filter(workspace_participant::Column::Role.is_in(WorkspaceRole::STAFF.iter().copied()))
        .into_tuple::<i32>()
        .all(db)
        .await?
        .into_iter()
        .collect();

    let due_dates: HashMap<i32, Option<DateTime<Utc>>> = assignments.into_iter().collect();

    let submissions: Vec<ScoredSubmission> = submission::Entity::find()
        .filter(submission::Column::AssignmentId.is_in(due_dates.keys().copied()))
        .filter(submission::Column::Status.is_in(SubmissionStatus::RANKED.iter().copied()))
        .all(db)
        .await?
        .iter()
        .map(ScoredSubmission::from)
        .collect();

    Ok(aggregate(&submissions, &due_dates, &staff))
}
