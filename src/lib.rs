pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod models;
pub mod redis;
pub mod services;
pub mod storage;

use axum::{
    Router,
    http::{
        HeaderValue, Method,
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::Config, redis::RedisClient, services::reply_cache::ReplyCache, storage::ForumStore,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ForumStore>,
    pub redis: Option<Arc<RedisClient>>,
    pub cache: ReplyCache,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn ForumStore>, redis: Option<Arc<RedisClient>>, config: Config) -> Self {
        let cache = ReplyCache::new(redis.clone(), config.reply_cache_ttl_secs);
        Self {
            store,
            redis,
            cache,
            config: Arc::new(config),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(
            state
                .config
                .allowed_origins
                .iter()
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!("Ignoring invalid allowed origin: {}", origin);
                        None
                    }
                })
                .collect::<Vec<_>>(),
        )
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE]);

    let public_routes = Router::new()
        .route("/api/health", get(handlers::health))
        .route(
            "/api/communities",
            get(handlers::communities::get_communities),
        )
        .route(
            "/api/communities/{name}/posts",
            get(handlers::communities::get_community_posts),
        )
        .route(
            "/api/communities/{name}/actions",
            get(handlers::communities::get_community_actions),
        );

    // Reply routes: reads accept an optional token, writes require one
    let reply_routes = Router::new()
        .route(
            "/api/posts/{post_id}/replies",
            get(handlers::replies::get_post_replies).post(handlers::replies::create_reply),
        )
        .route(
            "/api/posts/{post_id}/replies/{parent_id}",
            get(handlers::replies::get_reply_children),
        )
        .route(
            "/api/replies/{reply_id}/vote",
            post(handlers::replies::vote_reply),
        )
        .route(
            "/api/replies/{reply_id}/hide",
            post(handlers::replies::hide_reply),
        );

    Router::new()
        .merge(public_routes)
        .merge(reply_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
