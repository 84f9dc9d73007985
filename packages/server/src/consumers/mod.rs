pub mod grade_response;

pub use grade_response::{consume_grade_responses, process_grade_response};
