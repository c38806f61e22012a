use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::services::pagination::Keyed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "membership_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MembershipRole {
    Member,
    Moderator,
    Admin,
    Owner,
}

impl MembershipRole {
    pub fn can_moderate(&self) -> bool {
        matches!(
            self,
            MembershipRole::Moderator | MembershipRole::Admin | MembershipRole::Owner
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Community {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Keyed for Community {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.id
    }
}
