pub mod config;
pub mod grading;
pub mod retry;
pub mod storage;
pub mod submission_status;

pub use submission_status::{SubmissionErrorCode, SubmissionStatus};
