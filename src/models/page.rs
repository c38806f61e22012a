use std::fmt::Display;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::tree::{parse_bounded, parse_cursor},
    services::{
        pagination::{Page, PageRequest},
        query_string::{join, with_query},
        score::SortMode,
    },
};

/// Query string of a flat, cursor-paginated list.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub before: Option<String>,
    pub after: Option<String>,
    pub take: Option<String>,
    pub sort: Option<String>,
}

impl PageQuery {
    pub fn page_request(&self, default_take: u32, max_take: u32) -> Result<PageRequest<Uuid>> {
        let before = parse_cursor("before", self.before.as_deref())?;
        let after = parse_cursor("after", self.after.as_deref())?;
        if before.is_some() && after.is_some() {
            return Err(AppError::InvalidParameter(
                "before and after cannot be combined".to_string(),
            ));
        }

        let take = parse_bounded("take", self.take.as_deref(), max_take)?.unwrap_or(default_take);

        Ok(PageRequest {
            before,
            after,
            take: take as usize,
        })
    }

    pub fn sort(&self) -> Result<Option<SortMode>> {
        self.sort
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(AppError::InvalidParameter)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLinks {
    pub next_page: Option<String>,
    pub prev_page: Option<String>,
}

impl PageLinks {
    /// Links to the neighbours of `page` under `path`. `extra` holds the
    /// non-default list parameters, repeated on both links.
    pub fn for_page<T, K: Display>(path: &str, page: &Page<T, K>, extra: &[(&str, String)]) -> Self {
        let link = |name: &'static str, cursor: &K| {
            let mut pairs = vec![(name, cursor.to_string())];
            pairs.extend(extra.iter().cloned());
            with_query(path.to_string(), &join(&pairs))
        };

        Self {
            next_page: page.next_cursor.as_ref().map(|c| link("after", c)),
            prev_page: page.prev_cursor.as_ref().map(|c| link("before", c)),
        }
    }
}
