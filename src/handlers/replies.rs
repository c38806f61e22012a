use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AuthUser, OptionalAuthUser},
    error::{AppError, Result},
    models::{
        CreateReplyRequest, HideReplyRequest, Reply, ReplyTreeResponse, TreeParams, TreeQuery,
        VoteRequest, VoteResponse, parse_cursor,
    },
    services::reply_service::{self, TreeRequest},
};

async fn reply_tree(
    state: &AppState,
    post_id: Uuid,
    parent_id: Option<Uuid>,
    query: &TreeQuery,
    viewer: OptionalAuthUser,
) -> Result<Json<ReplyTreeResponse>> {
    let params = TreeParams::from_query(query, &state.config.tree_limits())?;
    let cursor = parse_cursor("cursor", query.cursor.as_deref())?;

    let request = TreeRequest {
        post_id,
        parent_id,
        cursor,
        params,
        viewer_id: viewer.0.map(|user| user.user_id),
    };

    let response = reply_service::get_reply_tree(state.store.as_ref(), &state.cache, &request).await?;
    Ok(Json(response))
}

pub async fn get_post_replies(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Query(query): Query<TreeQuery>,
    viewer: OptionalAuthUser,
) -> Result<Json<ReplyTreeResponse>> {
    reply_tree(&state, post_id, None, &query, viewer).await
}

pub async fn get_reply_children(
    State(state): State<AppState>,
    Path((post_id, parent_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<TreeQuery>,
    viewer: OptionalAuthUser,
) -> Result<Json<ReplyTreeResponse>> {
    reply_tree(&state, post_id, Some(parent_id), &query, viewer).await
}

pub async fn create_reply(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    auth_user: AuthUser,
    Json(payload): Json<CreateReplyRequest>,
) -> Result<(StatusCode, Json<Reply>)> {
    if let Some(redis) = &state.redis {
        let rate_limit_key = format!("reply_create:user:{}", auth_user.user_id);
        if !redis.check_rate_limit(&rate_limit_key, 10, 60).await? {
            return Err(AppError::RateLimit);
        }
    }

    let reply = reply_service::create_reply(
        state.store.as_ref(),
        &state.cache,
        auth_user.user_id,
        post_id,
        &payload,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(reply)))
}

pub async fn vote_reply(
    State(state): State<AppState>,
    Path(reply_id): Path<Uuid>,
    auth_user: AuthUser,
    Json(payload): Json<VoteRequest>,
) -> Result<Json<VoteResponse>> {
    if let Some(redis) = &state.redis {
        let rate_limit_key = format!("reply_vote:user:{}", auth_user.user_id);
        if !redis.check_rate_limit(&rate_limit_key, 30, 60).await? {
            return Err(AppError::RateLimit);
        }
    }

    let response = reply_service::vote_reply(
        state.store.as_ref(),
        &state.cache,
        auth_user.user_id,
        reply_id,
        payload.vote_type,
    )
    .await?;

    Ok(Json(response))
}

pub async fn hide_reply(
    State(state): State<AppState>,
    Path(reply_id): Path<Uuid>,
    auth_user: AuthUser,
    Json(payload): Json<HideReplyRequest>,
) -> Result<Json<Reply>> {
    let reply = reply_service::set_reply_visibility(
        state.store.as_ref(),
        &state.cache,
        auth_user.user_id,
        reply_id,
        &payload,
    )
    .await?;

    Ok(Json(reply))
}
