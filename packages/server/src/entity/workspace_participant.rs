use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Role of a user inside a workspace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkspaceRole {
    #[sea_orm(string_value = "OWNER")]
    Owner,
    #[sea_orm(string_value = "ADMIN")]
    Admin,
    #[sea_orm(string_value = "MEMBER")]
    Member,
}

impl WorkspaceRole {
    /// Owners and admins manage assignments and are left off the scoreboard.
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }

    pub const STAFF: &'static [WorkspaceRole] = &[Self::Owner, Self::Admin];
}

/// Workspace membership. Written by the membership service, only read here.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "workspace_participant")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub workspace_id: i32,
    #[sea_orm(primary_key)]
    pub user_id: i32,
    pub role: WorkspaceRole,

    pub joined_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
