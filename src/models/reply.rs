use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::services::pagination::Keyed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reply_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Active,
    Hidden,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: Uuid,
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub content: Option<String>,
    pub status: ReplyStatus,
    pub upvotes: i64,
    pub downvotes: i64,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

/// A reply row as read for the tree: the reply plus its author's name and
/// its true number of direct children.
#[derive(Debug, Clone, FromRow)]
pub struct ReplyRecord {
    #[sqlx(flatten)]
    pub reply: Reply,
    pub author_username: Option<String>,
    pub child_count: i64,
}

impl Keyed for ReplyRecord {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.reply.id
    }
}

// Create reply request
#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReplyRequest {
    #[validate(length(min = 1, max = 10000))]
    pub content: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewReply {
    pub id: Uuid,
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyAuthor {
    pub id: Uuid,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyCounts {
    pub upvotes: Option<i64>,
    pub downvotes: Option<i64>,
    pub children: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voted {
    pub upvoted: bool,
    pub downvoted: bool,
}

/// Client-facing reply node.
///
/// `children` is absent on nodes at the depth limit; `loadChildren` then
/// points at a fresh expansion rooted at this node. `loadMoreChildren`
/// continues a truncated child list from the first reply not shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyNode {
    pub id: Uuid,
    pub author: Option<ReplyAuthor>,
    pub content: Option<String>,
    pub date_posted: DateTime<Utc>,
    pub status: ReplyStatus,
    pub counts: ReplyCounts,
    pub voted: Option<Voted>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ReplyNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_more_children: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_children: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyTreeResponse {
    pub children: Vec<ReplyNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_more_children: Option<String>,
}
