use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, Result},
    models::{
        CreateReplyRequest, HideReplyRequest, ModAction, ModActionKind, NewReply, Post,
        PostStatus, Reply, ReplyNode, ReplyStatus, ReplyTreeResponse, TreeParams, VoteResponse, VoteType,
    },
    services::{
        reply_cache::ReplyCache,
        reply_formatter::{FormatContext, format_tree},
        reply_tree::{LevelSpec, RawNode, fetch_tree},
    },
    storage::{ForumStore, ReplyFilter, StatusChange},
};

/// A reply tree request after parameter parsing.
#[derive(Debug, Clone)]
pub struct TreeRequest {
    pub post_id: Uuid,
    /// Expand below this reply instead of the post's root replies.
    pub parent_id: Option<Uuid>,
    /// Inclusive: the first reply of the expansion root's list to show.
    pub cursor: Option<Uuid>,
    pub params: TreeParams,
    pub viewer_id: Option<Uuid>,
}

async fn visible_post(store: &dyn ForumStore, post_id: Uuid) -> Result<Post> {
    store
        .get_post(post_id)
        .await?
        .filter(|post| post.status == PostStatus::Active)
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))
}

async fn existing_reply(store: &dyn ForumStore, reply_id: Uuid) -> Result<Reply> {
    store
        .get_reply(reply_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Reply not found".to_string()))
}

pub async fn get_reply_tree(
    store: &dyn ForumStore,
    cache: &ReplyCache,
    request: &TreeRequest,
) -> Result<ReplyTreeResponse> {
    visible_post(store, request.post_id).await?;

    if let Some(parent_id) = request.parent_id {
        let parent = existing_reply(store, parent_id).await?;
        if parent.post_id != request.post_id {
            return Err(AppError::NotFound("Reply not found".to_string()));
        }
    }

    // Viewer-specific responses carry vote flags and are never shared.
    let cache_key = request.viewer_id.is_none().then(|| {
        ReplyCache::key(
            request.post_id,
            request.parent_id,
            request.cursor,
            &request.params,
        )
    });
    if let Some(key) = &cache_key {
        if let Some(cached) = cache.get(key).await {
            return Ok(cached);
        }
    }

    let spec = LevelSpec::build(&request.params);
    let root = ReplyFilter {
        post_id: request.post_id,
        parent_id: request.parent_id,
        sort: request.params.sort_mode(),
        now: Utc::now(),
    };
    let raw = fetch_tree(store, root, request.cursor, &spec).await?;

    let votes = match request.viewer_id {
        Some(viewer_id) => {
            let mut ids = Vec::new();
            RawNode::collect_ids(&raw, &mut ids);
            Some(load_votes(store, viewer_id, &ids).await?)
        }
        None => None,
    };

    let response = format_tree(
        raw,
        &spec,
        &FormatContext {
            post_id: request.post_id,
            root_id: request.parent_id,
            params: &request.params,
            votes: votes.as_ref(),
        },
    );

    tracing::debug!(
        "Reply tree for post {} (parent {:?}, levels {}): {} nodes",
        request.post_id,
        request.parent_id,
        request.params.levels,
        count_nodes(&response.children)
    );

    if let Some(key) = &cache_key {
        cache.put(key, &response).await;
    }

    Ok(response)
}

fn count_nodes(nodes: &[ReplyNode]) -> usize {
    nodes
        .iter()
        .map(|node| 1 + node.children.as_deref().map_or(0, count_nodes))
        .sum()
}

async fn load_votes(
    store: &dyn ForumStore,
    viewer_id: Uuid,
    reply_ids: &[Uuid],
) -> Result<HashMap<Uuid, VoteType>> {
    if reply_ids.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(store.viewer_votes(viewer_id, reply_ids).await?)
}

pub async fn create_reply(
    store: &dyn ForumStore,
    cache: &ReplyCache,
    author_id: Uuid,
    post_id: Uuid,
    payload: &CreateReplyRequest,
) -> Result<Reply> {
    payload.validate()?;

    visible_post(store, post_id).await?;

    if let Some(parent_id) = payload.parent_id {
        let parent = existing_reply(store, parent_id).await?;
        if parent.post_id != post_id {
            return Err(AppError::BadRequest(
                "Parent reply belongs to a different post".to_string(),
            ));
        }
        if parent.status != ReplyStatus::Active {
            return Err(AppError::BadRequest(
                "Cannot reply to a hidden reply".to_string(),
            ));
        }
    }

    let reply = store
        .create_reply(&NewReply {
            id: Uuid::now_v7(),
            post_id,
            parent_id: payload.parent_id,
            author_id,
            content: payload.content.clone(),
            created_at: Utc::now(),
        })
        .await?;

    tracing::info!("Reply {} created on post {}", reply.id, post_id);
    cache.invalidate_post(post_id).await;

    Ok(reply)
}

pub async fn vote_reply(
    store: &dyn ForumStore,
    cache: &ReplyCache,
    user_id: Uuid,
    reply_id: Uuid,
    vote_type: i16,
) -> Result<VoteResponse> {
    if !(-1..=1).contains(&vote_type) {
        return Err(AppError::BadRequest(
            "Vote type must be -1, 0, or 1".to_string(),
        ));
    }

    let reply = existing_reply(store, reply_id).await?;

    if reply.author_id == Some(user_id) {
        return Err(AppError::BadRequest(
            "Cannot vote on your own reply".to_string(),
        ));
    }
    if reply.status != ReplyStatus::Active {
        return Err(AppError::BadRequest(
            "Cannot vote on a hidden reply".to_string(),
        ));
    }

    let response = store
        .set_reply_vote(user_id, reply_id, VoteType::from_i16(vote_type))
        .await?;

    cache.invalidate_post(reply.post_id).await;

    Ok(response)
}

/// Hide or restore a reply. Only moderators and admins of the post's
/// community may do this; every change is recorded as a moderation action.
pub async fn set_reply_visibility(
    store: &dyn ForumStore,
    cache: &ReplyCache,
    moderator_id: Uuid,
    reply_id: Uuid,
    payload: &HideReplyRequest,
) -> Result<Reply> {
    payload.validate()?;

    let mut reply = existing_reply(store, reply_id).await?;
    let post = store
        .get_post(reply.post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    let role = store
        .membership_role(moderator_id, post.community_id)
        .await?;
    if !role.is_some_and(|role| role.can_moderate()) {
        return Err(AppError::Authorization(
            "Only moderators can change reply visibility".to_string(),
        ));
    }

    let (status, kind) = if payload.hidden {
        (ReplyStatus::Hidden, ModActionKind::HideReply)
    } else {
        (ReplyStatus::Active, ModActionKind::UnhideReply)
    };

    if reply.status == status {
        return Ok(reply);
    }

    store
        .set_reply_status(&StatusChange {
            reply_id,
            status,
            action: ModAction {
                id: Uuid::now_v7(),
                community_id: post.community_id,
                moderator_id,
                kind,
                target_id: reply_id,
                reason: payload.reason.clone(),
                created_at: Utc::now(),
            },
        })
        .await?;

    tracing::info!(
        "Moderator {} set reply {} to {:?}",
        moderator_id,
        reply_id,
        status
    );
    cache.invalidate_post(reply.post_id).await;

    reply.status = status;
    Ok(reply)
}
