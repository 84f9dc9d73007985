use common::SubmissionStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "submission")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub language: String,
    /// Blob path of the uploaded source artifact.
    pub file_url: String,
    pub status: SubmissionStatus,
    pub score: f64,

    /// Non-empty when compilation failed.
    #[sea_orm(column_type = "Text")]
    pub compilation_log: String,
    /// Machine-readable reason for SYSTEM_ERROR (see `SubmissionErrorCode`).
    pub error_code: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    pub user_id: i32,

    pub assignment_id: i32,
    #[sea_orm(belongs_to, from = "assignment_id", to = "id")]
    pub assignment: HasOne<super::assignment::Entity>,

    #[sea_orm(has_many)]
    pub testcases: HasMany<super::submission_testcase::Entity>,
    #[sea_orm(has_many)]
    pub results: HasMany<super::submission_result::Entity>,

    pub submitted_at: DateTimeUtc,
    pub graded_at: Option<DateTimeUtc>,
}

impl ActiveModelBehavior for ActiveModel {}
