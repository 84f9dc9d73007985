use async_trait::async_trait;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait};

use crate::entity::workspace_participant;

/// Decides whether a user holds a staff role in a workspace.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn check_perm(&self, user_id: i32, workspace_id: i32) -> Result<bool, DbErr>;
}

/// Staff means OWNER or ADMIN in `workspace_participant`.
pub struct ParticipantPermissions {
    db: DatabaseConnection,
}

impl ParticipantPermissions {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PermissionChecker for ParticipantPermissions {
    async fn check_perm(&self, user_id: i32, workspace_id: i32) -> Result<bool, DbErr> {
        let participant = workspace_participant::Entity::find_by_id((workspace_id, user_id))
            .one(&self.db)
            .await?;
        Ok(participant.is_some_and(|p| p.role.is_staff()))
    }
}
