use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "testcase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// 1-based order within the assignment; also names the blob files.
    pub position: i32,
    /// Upload batch the files belong to. Each replace writes a new one.
    pub generation: String,
    pub input_file_url: String,
    pub output_file_url: String,
    /// Replaced testcases are kept so in-flight snapshots still resolve.
    pub is_deleted: bool,

    pub assignment_id: i32,
    #[sea_orm(belongs_to, from = "assignment_id", to = "id")]
    pub assignment: HasOne<super::assignment::Entity>,

    #[sea_orm(has_many)]
    pub results: HasMany<super::submission_result::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
