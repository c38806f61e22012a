use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::services::pagination::Keyed;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "post_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Active,
    Removed,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub community_id: Uuid,
    pub author_id: Option<Uuid>,
    pub title: String,
    pub content: Option<String>,
    pub status: PostStatus,
    pub upvotes: i64,
    pub downvotes: i64,
    pub created_at: DateTime<Utc>,
}

/// A post as shown in a community listing.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PostListItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub post: Post,
    pub author_username: Option<String>,
    pub reply_count: i64,
}

impl Keyed for PostListItem {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.post.id
    }
}
