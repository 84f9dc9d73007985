use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "assignment")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Owning workspace. Workspaces themselves live outside this service.
    pub workspace_id: i32,
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    /// Problem statement blob, `detail/problem.{md,pdf}`.
    pub detail_url: Option<String>,

    pub memory_limit: i32, // in kilobytes
    pub time_limit: i32,   // in milliseconds
    pub max_score: f64,
    pub is_auto_trim_enabled: bool,

    /// Hidden from non-staff until this instant.
    pub publish_date: DateTimeUtc,
    /// NULL means submissions are never late.
    pub due_date: Option<DateTimeUtc>,
    pub is_deleted: bool,

    #[sea_orm(has_many)]
    pub testcases: HasMany<super::testcase::Entity>,
    #[sea_orm(has_many)]
    pub submissions: HasMany<super::submission::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
