//! Storage seam between the services and persistence.
//!
//! Services receive an `Arc<dyn ForumStore>` through [`crate::AppState`] and
//! never reach for a global connection. Ordering of every list is decided
//! here: replies and posts by score then id descending, communities and
//! moderation actions by id descending. All list reads take a [`Seek`] and
//! return rows in display order.
//!
//! | Type | When to use |
//! |------|-------------|
//! | [`MemoryStore`] | Tests and ephemeral servers |
//! | [`PgStore`] | Production |
//!
//! [`MemoryStore`]: memory::MemoryStore
//! [`PgStore`]: postgres::PgStore

pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    models::{
        Community, MembershipRole, ModAction, NewReply, Post, PostListItem, Reply, ReplyRecord,
        ReplyStatus, VoteResponse, VoteType,
    },
    services::{pagination::Seek, score::SortMode},
};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Transport or backend failure. Not retried here.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StorageError::NotFound("row not found".to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StorageError::Conflict(db.message().to_string())
            }
            other => StorageError::Unavailable(other.to_string()),
        }
    }
}

/// Which sibling list of replies to read, and how to rank it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplyFilter {
    pub post_id: Uuid,
    /// `None` selects the post's root-level replies.
    pub parent_id: Option<Uuid>,
    pub sort: SortMode,
    /// Frozen request time for the hot score.
    pub now: DateTime<Utc>,
}

/// A status change on a reply together with the log entry recording it.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub reply_id: Uuid,
    pub status: ReplyStatus,
    pub action: ModAction,
}

#[async_trait]
pub trait ForumStore: Send + Sync + 'static {
    // --- Posts and replies ---------------------------------------------------

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>, StorageError>;

    async fn get_reply(&self, reply_id: Uuid) -> Result<Option<Reply>, StorageError>;

    /// One level of a reply tree: the children of `filter.parent_id` under
    /// `filter.post_id`, ranked by `filter.sort` with id descending on ties.
    async fn fetch_replies(
        &self,
        filter: &ReplyFilter,
        seek: &Seek<Uuid>,
    ) -> Result<Vec<ReplyRecord>, StorageError>;

    /// The viewer's votes among `reply_ids`. Replies without a vote are absent.
    async fn viewer_votes(
        &self,
        viewer_id: Uuid,
        reply_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, VoteType>, StorageError>;

    async fn create_reply(&self, reply: &NewReply) -> Result<Reply, StorageError>;

    /// Replace the user's vote on a reply (`None` removes it) and return the
    /// updated tallies.
    async fn set_reply_vote(
        &self,
        user_id: Uuid,
        reply_id: Uuid,
        vote: Option<VoteType>,
    ) -> Result<VoteResponse, StorageError>;

    async fn set_reply_status(&self, change: &StatusChange) -> Result<(), StorageError>;

    // --- Communities ---------------------------------------------------------

    async fn get_community_by_name(&self, name: &str)
    -> Result<Option<Community>, StorageError>;

    async fn list_communities(&self, seek: &Seek<Uuid>) -> Result<Vec<Community>, StorageError>;

    async fn list_posts(
        &self,
        community_id: Uuid,
        sort: SortMode,
        now: DateTime<Utc>,
        seek: &Seek<Uuid>,
    ) -> Result<Vec<PostListItem>, StorageError>;

    async fn list_mod_actions(
        &self,
        community_id: Uuid,
        seek: &Seek<Uuid>,
    ) -> Result<Vec<ModAction>, StorageError>;

    async fn membership_role(
        &self,
        user_id: Uuid,
        community_id: Uuid,
    ) -> Result<Option<MembershipRole>, StorageError>;
}
