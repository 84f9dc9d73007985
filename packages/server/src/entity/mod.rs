pub mod assignment;
pub mod submission;
pub mod submission_result;
pub mod submission_testcase;
pub mod testcase;
pub mod workspace_participant;
