use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "submission_result")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique_key = "submission_testcase_result")]
    pub submission_id: i32,
    #[sea_orm(unique_key = "submission_testcase_result")]
    pub testcase_id: i32,

    pub is_passed: bool,
    pub time_used: i32,   // in milliseconds
    pub memory_used: i32, // in kilobytes
    /// Opaque output digest reported by the grader.
    pub hash: String,

    #[sea_orm(belongs_to, from = "submission_id", to = "id")]
    pub submission: HasOne<super::submission::Entity>,
    #[sea_orm(belongs_to, from = "testcase_id", to = "id")]
    pub testcase: HasOne<super::testcase::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
