use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{Community, ModAction, PostListItem},
    services::{
        pagination::{Page, PageRequest, paginate},
        score::SortMode,
    },
    storage::ForumStore,
};

pub async fn get_community_by_name(store: &dyn ForumStore, name: &str) -> Result<Community> {
    store
        .get_community_by_name(name)
        .await?
        .ok_or_else(|| AppError::NotFound("Community not found".to_string()))
}

pub async fn list_communities(
    store: &dyn ForumStore,
    request: &PageRequest<Uuid>,
) -> Result<Page<Community, Uuid>> {
    let page = paginate(request, |seek| async move { store.list_communities(&seek).await }).await?;
    Ok(page)
}

pub async fn list_posts(
    store: &dyn ForumStore,
    community_name: &str,
    sort: SortMode,
    request: &PageRequest<Uuid>,
) -> Result<Page<PostListItem, Uuid>> {
    let community_id = get_community_by_name(store, community_name).await?.id;
    let now = Utc::now();

    let page = paginate(request, |seek| async move {
        store.list_posts(community_id, sort, now, &seek).await
    })
    .await?;
    Ok(page)
}

pub async fn list_mod_actions(
    store: &dyn ForumStore,
    community_name: &str,
    request: &PageRequest<Uuid>,
) -> Result<Page<ModAction, Uuid>> {
    let community_id = get_community_by_name(store, community_name).await?.id;

    let page = paginate(request, |seek| async move {
        store.list_mod_actions(community_id, &seek).await
    })
    .await?;
    Ok(page)
}
