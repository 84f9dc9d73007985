//! Blob store layout.
//!
//! ```text
//! /workspaces/{w}/assignments/{a}/detail/problem.{md|pdf}
//! /workspaces/{w}/assignments/{a}/testcase/{generation}/{n}.in|.out
//! /workspaces/{w}/assignments/{a}/submissions/{user}/{submission}
//! ```
//!
//! Testcase files are never overwritten: replacing the set writes a new
//! generation, so URLs handed to a grader keep serving the same bytes.

pub fn assignment_dir(workspace_id: i32, assignment_id: i32) -> String {
    format!("/workspaces/{workspace_id}/assignments/{assignment_id}")
}

pub fn detail_file(workspace_id: i32, assignment_id: i32, extension: &str) -> String {
    format!(
        "{}/detail/problem.{extension}",
        assignment_dir(workspace_id, assignment_id)
    )
}

pub fn testcase_generation_dir(workspace_id: i32, assignment_id: i32, generation: &str) -> String {
    format!(
        "{}/testcase/{generation}",
        assignment_dir(workspace_id, assignment_id)
    )
}

/// Input and output paths for the testcase at 1-based `position`.
pub fn testcase_files(
    workspace_id: i32,
    assignment_id: i32,
    generation: &str,
    position: i32,
) -> (String, String) {
    let dir = testcase_generation_dir(workspace_id, assignment_id, generation);
    (
        format!("{dir}/{position}.in"),
        format!("{dir}/{position}.out"),
    )
}

pub fn submission_file(
    workspace_id: i32,
    assignment_id: i32,
    user_id: i32,
    submission_id: i32,
) -> String {
    format!(
        "{}/submissions/{user_id}/{submission_id}",
        assignment_dir(workspace_id, assignment_id)
    )
}

/// URL a grader fetches a blob from.
pub fn public_url(prefix: &str, path: &str) -> String {
    format!("{}{}", prefix.trim_end_matches('/'), path)
}
