use chrono::{Duration, Utc};
use common::SubmissionStatus::{Completed, Grading, Incompleted, SystemError};
use grading_server::services::assignment::delete_assignment;
use grading_server::services::scoreboard::get_scoreboard;
use grading_server::services::submission::get_submission;

use crate::common::{ADMIN, ALICE, BOB, CAROL, OWNER, TestApp, WORKSPACE};

#[tokio::test]
async fn equal_scores_rank_by_earlier_last_submission() {
    let app = TestApp::spawn().await;
    let a = app.insert_assignment(50.0, 1, None).await;
    let base = Utc::now() - Duration::hours(1);

    app.insert_submission(a.id, ALICE, Completed, 50.0, base + Duration::minutes(5))
        .await;
    app.insert_submission(a.id, BOB, Completed, 50.0, base + Duration::minutes(3))
        .await;

    let board = get_scoreboard(&app.db, WORKSPACE).await.unwrap();

    let order: Vec<i32> = board.iter().map(|e| e.user_id).collect();
    assert_eq!(order, vec![BOB, ALICE]);
    assert!(board.iter().all(|e| e.score == 50.0));
}

#[tokio::test]
async fn staff_never_appear_on_the_scoreboard() {
    let app = TestApp::spawn().await;
    let a = app.insert_assignment(100.0, 1, None).await;
    let now = Utc::now();

    app.insert_submission(a.id, OWNER, Completed, 100.0, now).await;
    app.insert_submission(a.id, ADMIN, Completed, 100.0, now).await;
    app.insert_submission(a.id, CAROL, Incompleted, 10.0, now).await;

    let board = get_scoreboard(&app.db, WORKSPACE).await.unwrap();

    assert_eq!(board.len(), 1);
    assert_eq!(board[0].user_id, CAROL);
}

#[tokio::test]
async fn late_submission_is_unranked_but_still_readable() {
    let app = TestApp::spawn().await;
    let due = Utc::now() - Duration::hours(1);
    let a = app.insert_assignment(100.0, 1, Some(due)).await;

    app.insert_submission(a.id, ALICE, Incompleted, 40.0, due - Duration::minutes(10))
        .await;
    let late = app
        .insert_submission(a.id, ALICE, Completed, 100.0, due + Duration::minutes(1))
        .await;

    let board = get_scoreboard(&app.db, WORKSPACE).await.unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].score, 40.0);
    assert_eq!(board[0].total_submission_count, 1);
    assert_eq!(board[0].completed_assignment_count, 0);

    let detail = get_submission(&app.state, ALICE, late.id).await.unwrap();
    assert_eq!(detail.submission.status, Completed);
    assert_eq!(detail.submission.score, 100.0);
}

#[tokio::test]
async fn totals_span_assignments_and_skip_deleted_ones() {
    let app = TestApp::spawn().await;
    let first = app.insert_assignment(100.0, 1, None).await;
    let second = app.insert_assignment(50.0, 1, None).await;
    let dropped = app.insert_assignment(100.0, 1, None).await;
    let now = Utc::now();
    let ago = |minutes| now - Duration::minutes(minutes);

    app.insert_submission(first.id, ALICE, Incompleted, 60.0, ago(9)).await;
    app.insert_submission(first.id, ALICE, Completed, 100.0, ago(8)).await;
    app.insert_submission(second.id, ALICE, Incompleted, 12.5, ago(7)).await;
    app.insert_submission(dropped.id, ALICE, Completed, 100.0, now).await;
    app.insert_submission(first.id, BOB, SystemError, 0.0, now).await;
    app.insert_submission(first.id, BOB, Grading, 0.0, now).await;

    delete_assignment(&app.state, OWNER, dropped.id).await.unwrap();

    let board = get_scoreboard(&app.db, WORKSPACE).await.unwrap();

    assert_eq!(board.len(), 1);
    let alice = &board[0];
    assert_eq!(alice.user_id, ALICE);
    assert_eq!(alice.score, 112.5);
    assert_eq!(alice.completed_assignment_count, 1);
    assert_eq!(alice.total_submission_count, 3);
}

#[tokio::test]
async fn other_workspaces_are_isolated() {
    let app = TestApp::spawn().await;
    let a = app.insert_assignment(10.0, 1, None).await;
    app.insert_submission(a.id, ALICE, Completed, 10.0, Utc::now()).await;

    let board = get_scoreboard(&app.db, WORKSPACE + 1).await.unwrap();
    assert!(board.is_empty());
}
