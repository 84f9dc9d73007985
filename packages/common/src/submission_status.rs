#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a submission during the grading lifecycle.
///
/// When the `sea-orm` feature is enabled, this enum can be used directly in SeaORM entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    /// Persisted and dispatched, waiting for a grade response.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "GRADING"))]
    Grading,
    /// No compilation log and every testcase passed.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "COMPLETED"))]
    Completed,
    /// Compilation failed or at least one testcase failed.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "INCOMPLETED"))]
    Incompleted,
    /// Infrastructure failure (upload, dispatch, worker or timeout).
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "SYSTEM_ERROR"))]
    SystemError,
}

impl SubmissionStatus {
    /// Returns true once the single terminal transition has happened.
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Grading)
    }

    /// Returns true if submissions in this status take part in scoreboard ranking.
    pub fn is_ranked(&self) -> bool {
        matches!(self, Self::Completed | Self::Incompleted)
    }

    /// All possible status values.
    pub const ALL: &'static [SubmissionStatus] = &[
        Self::Grading,
        Self::Completed,
        Self::Incompleted,
        Self::SystemError,
    ];

    /// Statuses counted by the scoreboard.
    pub const RANKED: &'static [SubmissionStatus] = &[Self::Completed, Self::Incompleted];

    /// Returns the wire/database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grading => "GRADING",
            Self::Completed => "COMPLETED",
            Self::Incompleted => "INCOMPLETED",
            Self::SystemError => "SYSTEM_ERROR",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for SubmissionStatus {
    fn default() -> Self {
        Self::Grading
    }
}

/// Error when parsing an invalid status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError {
    invalid: String,
}

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid status '{}'. Valid values: {}",
            self.invalid,
            SubmissionStatus::ALL
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for SubmissionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GRADING" => Ok(Self::Grading),
            "COMPLETED" => Ok(Self::Completed),
            "INCOMPLETED" => Ok(Self::Incompleted),
            "SYSTEM_ERROR" => Ok(Self::SystemError),
            _ => Err(ParseStatusError {
                invalid: s.to_string(),
            }),
        }
    }
}

/// Error codes stored on submissions escalated to `SYSTEM_ERROR`.
pub struct SubmissionErrorCode;

impl SubmissionErrorCode {
    /// Artifact upload to the blob store failed after exhausting retries.
    pub const UPLOAD_FAILED: &'static str = "UPLOAD_FAILED";
    /// Grade request publish failed after exhausting retries.
    pub const DISPATCH_FAILED: &'static str = "DISPATCH_FAILED";
    /// The grading worker reported an infrastructure failure.
    pub const WORKER_SYSTEM_ERROR: &'static str = "WORKER_SYSTEM_ERROR";
    /// The grade response did not line up with the dispatched testcases.
    pub const RESULT_MISMATCH: &'static str = "RESULT_MISMATCH";
    /// Server failed to persist a grade response after exhausting retries.
    pub const RESULT_PROCESSING_FAILED: &'static str = "RESULT_PROCESSING_FAILED";
    /// Submission stayed in GRADING longer than the configured timeout.
    pub const STUCK_GRADING: &'static str = "STUCK_GRADING";
}
