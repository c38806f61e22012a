use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    services::{reply_tree::LevelSpec, score::SortMode},
};

pub const DEFAULT_LEVELS: u32 = 3;
pub const DEFAULT_TAKE_PER_LEVEL: u32 = 3;

/// Upper bounds on tree requests, applied while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeLimits {
    pub max_levels: u32,
    pub max_take: u32,
    /// Largest response a request may ask for, counted as the worst-case
    /// number of nodes its shape allows.
    pub max_nodes: u64,
}

impl Default for TreeLimits {
    fn default() -> Self {
        Self {
            max_levels: 10,
            max_take: 100,
            max_nodes: 10_000,
        }
    }
}

/// Query string of a tree request, kept as raw strings so malformed values
/// surface as `InvalidParameter` instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeQuery {
    pub cursor: Option<String>,
    pub levels: Option<String>,
    pub take_per_level: Option<String>,
    pub take_at_root: Option<String>,
    pub sort: Option<String>,
}

/// Effective shape parameters of a tree request. Missing values take their
/// defaults; `take_at_root` and `sort` stay `None` when the caller left them
/// out so continuation links only repeat what was asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeParams {
    pub levels: u32,
    pub take_per_level: u32,
    pub take_at_root: Option<u32>,
    pub sort: Option<SortMode>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            levels: DEFAULT_LEVELS,
            take_per_level: DEFAULT_TAKE_PER_LEVEL,
            take_at_root: None,
            sort: None,
        }
    }
}

impl TreeParams {
    pub fn from_query(query: &TreeQuery, limits: &TreeLimits) -> Result<Self> {
        let levels = parse_bounded("levels", query.levels.as_deref(), limits.max_levels)?
            .unwrap_or(DEFAULT_LEVELS);
        let take_per_level = parse_take(
            "takePerLevel",
            query.take_per_level.as_deref(),
            limits.max_take,
        )?
        .unwrap_or(DEFAULT_TAKE_PER_LEVEL);
        let take_at_root =
            parse_take("takeAtRoot", query.take_at_root.as_deref(), limits.max_take)?;
        let sort = query
            .sort
            .as_deref()
            .map(|s| s.parse::<SortMode>())
            .transpose()
            .map_err(AppError::InvalidParameter)?;

        let params = Self {
            levels,
            take_per_level,
            take_at_root,
            sort,
        };

        let bound = LevelSpec::build(&params).max_nodes();
        if bound > limits.max_nodes {
            return Err(AppError::InvalidParameter(format!(
                "levels and take values allow up to {} replies, the limit is {}",
                bound, limits.max_nodes
            )));
        }

        Ok(params)
    }

    pub fn take_at_root(&self) -> u32 {
        self.take_at_root.unwrap_or(self.take_per_level)
    }

    pub fn sort_mode(&self) -> SortMode {
        self.sort.unwrap_or_default()
    }
}

pub fn parse_cursor(name: &str, value: Option<&str>) -> Result<Option<Uuid>> {
    value
        .map(|raw| {
            Uuid::parse_str(raw)
                .map_err(|_| AppError::InvalidParameter(format!("{} is not a valid id", name)))
        })
        .transpose()
}

/// A tree level that shows no replies could never be continued, so takes
/// start at 1.
fn parse_take(name: &str, value: Option<&str>, max: u32) -> Result<Option<u32>> {
    let take = parse_bounded(name, value, max)?;
    if take == Some(0) {
        return Err(AppError::InvalidParameter(format!(
            "{} must be at least 1",
            name
        )));
    }
    Ok(take)
}

pub(crate) fn parse_bounded(name: &str, value: Option<&str>, max: u32) -> Result<Option<u32>> {
    let Some(raw) = value else {
        return Ok(None);
    };

    let parsed: i64 = raw.trim().parse().map_err(|_| {
        AppError::InvalidParameter(format!("{} must be a non-negative integer", name))
    })?;

    if parsed < 0 {
        return Err(AppError::InvalidParameter(format!(
            "{} must be a non-negative integer",
            name
        )));
    }

    if parsed > i64::from(max) {
        return Err(AppError::InvalidParameter(format!(
            "{} must be at most {}",
            name, max
        )));
    }

    Ok(Some(parsed as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(levels: Option<&str>, take: Option<&str>, sort: Option<&str>) -> TreeQuery {
        TreeQuery {
            levels: levels.map(String::from),
            take_per_level: take.map(String::from),
            sort: sort.map(String::from),
            ..TreeQuery::default()
        }
    }

    #[test]
    fn missing_values_take_defaults() {
        let params = TreeParams::from_query(&TreeQuery::default(), &TreeLimits::default()).unwrap();
        assert_eq!(params, TreeParams::default());
        assert_eq!(params.take_at_root(), DEFAULT_TAKE_PER_LEVEL);
        assert_eq!(params.sort_mode(), SortMode::Hot);
    }

    #[test]
    fn take_at_root_defaults_to_take_per_level() {
        let params =
            TreeParams::from_query(&query(None, Some("7"), None), &TreeLimits::default()).unwrap();
        assert_eq!(params.take_at_root, None);
        assert_eq!(params.take_at_root(), 7);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let limits = TreeLimits::default();
        for bad in [
            query(Some("-1"), None, None),
            query(Some("two"), None, None),
            query(None, Some(""), None),
            query(None, Some("3.5"), None),
            query(None, None, Some("newest")),
            query(Some("11"), None, None),
            query(None, Some("101"), None),
        ] {
            let err = TreeParams::from_query(&bad, &limits).unwrap_err();
            assert!(matches!(err, AppError::InvalidParameter(_)), "{:?}", bad);
        }
    }

    #[test]
    fn zero_takes_are_rejected() {
        let limits = TreeLimits::default();
        let root = TreeQuery {
            take_at_root: Some("0".to_string()),
            ..TreeQuery::default()
        };
        for bad in [query(Some("0"), Some("0"), None), query(None, Some("0"), None), root] {
            let err = TreeParams::from_query(&bad, &limits).unwrap_err();
            assert!(matches!(err, AppError::InvalidParameter(_)), "{:?}", bad);
        }
    }

    #[test]
    fn shapes_beyond_the_node_budget_are_rejected() {
        let limits = TreeLimits::default();

        let within = TreeParams::from_query(&query(Some("3"), Some("9"), None), &limits).unwrap();
        assert_eq!(LevelSpec::build(&within).max_nodes(), 9 + 81 + 729 + 6561);

        for (levels, take) in [("4", "9"), ("10", "100"), ("10", "3")] {
            let err = TreeParams::from_query(&query(Some(levels), Some(take), None), &limits)
                .unwrap_err();
            assert!(matches!(err, AppError::InvalidParameter(_)), "{} {}", levels, take);
        }
    }

    #[test]
    fn zero_is_a_valid_depth() {
        let params =
            TreeParams::from_query(&query(Some("0"), None, None), &TreeLimits::default()).unwrap();
        assert_eq!(params.levels, 0);
    }

    #[test]
    fn cursor_must_be_an_id() {
        assert!(parse_cursor("cursor", Some("nope")).is_err());
        assert_eq!(parse_cursor("cursor", None).unwrap(), None);
        let id = Uuid::now_v7();
        assert_eq!(
            parse_cursor("cursor", Some(&id.to_string())).unwrap(),
            Some(id)
        );
    }
}
