use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::services::pagination::Keyed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "mod_action_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ModActionKind {
    HideReply,
    UnhideReply,
}

/// One entry of a community's moderation log.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ModAction {
    pub id: Uuid,
    pub community_id: Uuid,
    pub moderator_id: Uuid,
    pub kind: ModActionKind,
    pub target_id: Uuid,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Keyed for ModAction {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Validate, Deserialize)]
pub struct HideReplyRequest {
    pub hidden: bool,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}
