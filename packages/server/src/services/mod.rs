pub mod assignment;
pub mod scoreboard;
pub mod scoring;
pub mod submission;
