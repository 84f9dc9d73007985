use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Limits and comparison flags forwarded to the grading worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSettings {
    /// Time limit in milliseconds
    pub time_limit: i32,
    /// Memory limit in kilobytes
    pub memory_limit: i32,
    /// Ignore trailing whitespace/newline differences when comparing output
    pub is_auto_trim_enabled: bool,
}

/// One testcase as seen by the worker: where to fetch input and expected output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeTest {
    pub input: String,
    pub output: String,
}

/// Correlation data, echoed back unchanged in the response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeMetadata {
    pub assignment_id: i32,
    pub submission_id: i32,
    /// Testcase ids in the same order as `GradeRequest::test`
    pub testcase_ids: Vec<i32>,
    pub start_time: DateTime<Utc>,
}

/// A grade request published to the worker queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRequest {
    /// Programming language (e.g., "cpp", "python")
    pub language: String,
    /// Blob store location of the submitted source file
    pub source_url: String,
    pub settings: GradeSettings,
    pub test: Vec<GradeTest>,
    pub metadata: GradeMetadata,
}

impl GradeRequest {
    pub fn submission_id(&self) -> i32 {
        self.metadata.submission_id
    }
}

/// Outcome of a single testcase, aligned positionally with `GradeRequest::test`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeResultItem {
    /// Opaque verification hash produced by the worker.
    pub hash: String,
    pub pass: bool,
    /// Time used in milliseconds
    pub time: i32,
    /// Memory used in kilobytes
    pub memory: i32,
}

/// A grade response consumed from the result queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeResponse {
    /// Compiler output; empty if compilation succeeded.
    #[serde(default)]
    pub compile_output: String,
    /// Worker-reported status string.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub results: Vec<GradeResultItem>,
    pub metadata: GradeMetadata,
}

impl GradeResponse {
    pub fn submission_id(&self) -> i32 {
        self.metadata.submission_id
    }

    /// Returns true if the worker reported an infrastructure failure
    /// (any status starting with `SYSTEM`, case-insensitive).
    pub fn is_system_error(&self) -> bool {
        self.status
            .get(..6)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("SYSTEM"))
    }
}
