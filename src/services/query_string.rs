use uuid::Uuid;

use crate::models::{DEFAULT_LEVELS, DEFAULT_TAKE_PER_LEVEL, TreeParams};

/// Canonical query fragment holding only the parameters that differ from
/// their defaults, in the order `levels, takePerLevel, takeAtRoot, sort`.
pub fn rebuild(params: &TreeParams) -> String {
    let mut pairs: Vec<(&str, String)> = Vec::new();

    if params.levels != DEFAULT_LEVELS {
        pairs.push(("levels", params.levels.to_string()));
    }
    if params.take_per_level != DEFAULT_TAKE_PER_LEVEL {
        pairs.push(("takePerLevel", params.take_per_level.to_string()));
    }
    if let Some(take_at_root) = params.take_at_root {
        pairs.push(("takeAtRoot", take_at_root.to_string()));
    }
    if let Some(sort) = params.sort {
        pairs.push(("sort", sort.as_str().to_string()));
    }

    join(&pairs)
}

/// Link to a reply tree, rooted at the post or at `parent_id`.
pub fn tree_link(
    post_id: Uuid,
    parent_id: Option<Uuid>,
    cursor: Option<Uuid>,
    params: &TreeParams,
) -> String {
    let mut path = format!("/api/posts/{}/replies", post_id);
    if let Some(parent_id) = parent_id {
        path.push('/');
        path.push_str(&parent_id.to_string());
    }

    let rebuilt = rebuild(params);
    let mut query = cursor
        .map(|c| format!("cursor={}", c))
        .unwrap_or_default();
    if !rebuilt.is_empty() {
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&rebuilt);
    }

    with_query(path, &query)
}

pub(crate) fn join(pairs: &[(&str, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

pub(crate) fn with_query(mut path: String, query: &str) -> String {
    if !query.is_empty() {
        path.push('?');
        path.push_str(query);
    }
    path
}
