use serde::Deserialize;

/// Message queue settings shared by the grading server and its consumers.
#[derive(Debug, Deserialize, Clone)]
pub struct MqAppConfig {
    /// Redis connection URL. Default: "redis://localhost:6379".
    #[serde(default = "default_mq_url")]
    pub url: String,
    /// Connection pool size. Default: 5.
    #[serde(default = "default_mq_pool_size")]
    pub pool_size: u8,
    /// Queue for grade requests (server publishes, graders consume). Default: "grade_requests".
    #[serde(default = "default_request_queue")]
    pub request_queue: String,
    /// Queue for grade responses (graders publish, server consumes). Default: "grade_responses".
    #[serde(default = "default_response_queue")]
    pub response_queue: String,
}

fn default_mq_url() -> String {
    "redis://localhost:6379".into()
}
fn default_mq_pool_size() -> u8 {
    5
}
fn default_request_queue() -> String {
    "grade_requests".into()
}
fn default_response_queue() -> String {
    "grade_responses".into()
}

impl Default for MqAppConfig {
    fn default() -> Self {
        Self {
            url: default_mq_url(),
            pool_size: default_mq_pool_size(),
            request_queue: default_request_queue(),
            response_queue: default_response_queue(),
        }
    }
}
