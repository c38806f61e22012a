//! Short-lived cache of anonymous reply tree responses.
//!
//! Entries are keyed `replies:{postId}:{canonical link}` so every write on a
//! post can drop all of that post's entries with one pattern. A failing cache
//! never fails a request: errors are logged and the caller falls through to
//! the store.

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    models::{ReplyTreeResponse, TreeParams},
    redis::RedisClient,
    services::query_string::tree_link,
};

#[derive(Clone)]
pub struct ReplyCache {
    redis: Option<Arc<RedisClient>>,
    ttl_seconds: u64,
}

impl ReplyCache {
    pub fn new(redis: Option<Arc<RedisClient>>, ttl_seconds: u64) -> Self {
        Self { redis, ttl_seconds }
    }

    pub fn disabled() -> Self {
        Self::new(None, 0)
    }

    fn client(&self) -> Option<&RedisClient> {
        if self.ttl_seconds == 0 {
            return None;
        }
        self.redis.as_deref()
    }

    pub fn key(
        post_id: Uuid,
        parent_id: Option<Uuid>,
        cursor: Option<Uuid>,
        params: &TreeParams,
    ) -> String {
        format!(
            "replies:{}:{}",
            post_id,
            tree_link(post_id, parent_id, cursor, params)
        )
    }

    pub async fn get(&self, key: &str) -> Option<ReplyTreeResponse> {
        let redis = self.client()?;

        let raw = match redis.cache_get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!("Reply cache read failed for {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(response) => {
                tracing::debug!("Reply cache hit: {}", key);
                Some(response)
            }
            Err(e) => {
                tracing::warn!("Discarding unreadable reply cache entry {}: {}", key, e);
                None
            }
        }
    }

    pub async fn put(&self, key: &str, response: &ReplyTreeResponse) {
        let Some(redis) = self.client() else {
            return;
        };

        let raw = match serde_json::to_string(response) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Could not serialize reply tree for cache: {}", e);
                return;
            }
        };

        if let Err(e) = redis.cache_set(key, &raw, self.ttl_seconds).await {
            tracing::warn!("Reply cache write failed for {}: {}", key, e);
        }
    }

    /// Drop every cached tree of `post_id`.
    pub async fn invalidate_post(&self, post_id: Uuid) {
        let Some(redis) = self.client() else {
            return;
        };

        let pattern = format!("replies:{}:*", post_id);
        match redis.cache_delete_matching(&pattern).await {
            Ok(removed) => tracing::debug!("Invalidated {} cached trees of post {}", removed, post_id),
            Err(e) => tracing::warn!("Reply cache invalidation failed for post {}: {}", post_id, e),
        }
    }
}
