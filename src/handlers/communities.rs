use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde_json::{Value, json};

use crate::{
    AppState,
    error::Result,
    models::{PageLinks, PageQuery},
    services::community_service,
};

/// List parameters that differ from their defaults, repeated on page links.
fn link_params(state: &AppState, query: &PageQuery) -> Result<Vec<(&'static str, String)>> {
    let mut extra = Vec::new();
    if let Some(take) = &query.take {
        if take.trim() != state.config.default_page_size.to_string() {
            extra.push(("take", take.trim().to_string()));
        }
    }
    if let Some(sort) = query.sort()? {
        extra.push(("sort", sort.as_str().to_string()));
    }
    Ok(extra)
}

pub async fn get_communities(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>> {
    let request = query.page_request(state.config.default_page_size, state.config.max_take)?;
    let page = community_service::list_communities(state.store.as_ref(), &request).await?;
    let links = PageLinks::for_page("/api/communities", &page, &link_params(&state, &query)?);

    Ok(Json(json!({
        "communities": page.results,
        "links": links,
    })))
}

pub async fn get_community_posts(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>> {
    let request = query.page_request(state.config.default_page_size, state.config.max_take)?;
    let sort = query.sort()?.unwrap_or_default();
    let page =
        community_service::list_posts(state.store.as_ref(), &name, sort, &request).await?;
    let path = format!("/api/communities/{}/posts", name);
    let links = PageLinks::for_page(&path, &page, &link_params(&state, &query)?);

    Ok(Json(json!({
        "posts": page.results,
        "links": links,
    })))
}

pub async fn get_community_actions(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>> {
    let request = query.page_request(state.config.default_page_size, state.config.max_take)?;
    let page =
        community_service::list_mod_actions(state.store.as_ref(), &name, &request).await?;
    let path = format!("/api/communities/{}/actions", name);
    let links = PageLinks::for_page(&path, &page, &link_params(&state, &query)?);

    Ok(Json(json!({
        "actions": page.results,
        "links": links,
    })))
}
