//! Keyset pagination shared by every list in the forum.
//!
//! A [`PageRequest`] is turned into a [`Seek`]: the instruction a store needs
//! to fetch `take + 1` ordered rows around a cursor. The store returns those
//! rows in display order and [`Page::assemble`] slices off the overfetched row
//! and derives the next/previous cursors. The reply tree fetcher issues the
//! same [`Seek`] once per level and leaves the trimming to the formatter.

use std::future::Future;

use serde::Serialize;

/// Anything that can be addressed by a pagination cursor.
pub trait Keyed {
    type Key: Clone + PartialEq;

    fn key(&self) -> Self::Key;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    None,
}

/// Where a fetch starts, relative to the list's display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor<K> {
    Start,
    /// Rows strictly after the key.
    After(K),
    /// Rows strictly before the key.
    Before(K),
    /// Rows from the key onwards, key included.
    From(K),
}

impl<K> Anchor<K> {
    pub fn key(&self) -> Option<&K> {
        match self {
            Anchor::Start => None,
            Anchor::After(k) | Anchor::Before(k) | Anchor::From(k) => Some(k),
        }
    }
}

/// Fetch instruction handed to a store.
///
/// `limit` already includes the overfetched row. For [`Anchor::Before`] the
/// store must return the `limit` rows closest to the cursor, still in display
/// order, so the extra row sits at the start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seek<K> {
    pub anchor: Anchor<K>,
    pub limit: usize,
}

impl<K> Seek<K> {
    /// First `take` rows plus one, from the start of the list.
    pub fn first(take: usize) -> Self {
        Self {
            anchor: Anchor::Start,
            limit: take + 1,
        }
    }

    /// `take` rows plus one, starting at `key` inclusive.
    pub fn starting_at(key: Option<K>, take: usize) -> Self {
        Self {
            anchor: key.map_or(Anchor::Start, Anchor::From),
            limit: take + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest<K> {
    pub before: Option<K>,
    pub after: Option<K>,
    pub take: usize,
}

impl<K: Clone> PageRequest<K> {
    pub fn new(take: usize) -> Self {
        Self {
            before: None,
            after: None,
            take,
        }
    }

    pub fn direction(&self) -> Direction {
        if self.after.is_some() {
            Direction::Forward
        } else if self.before.is_some() {
            Direction::Backward
        } else {
            Direction::None
        }
    }

    pub fn seek(&self) -> Seek<K> {
        let anchor = match (&self.after, &self.before) {
            (Some(after), _) => Anchor::After(after.clone()),
            (None, Some(before)) => Anchor::Before(before.clone()),
            (None, None) => Anchor::Start,
        };

        Seek {
            anchor,
            limit: self.take + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T, K> {
    pub results: Vec<T>,
    pub next_cursor: Option<K>,
    pub prev_cursor: Option<K>,
}

impl<T: Keyed> Page<T, T::Key> {
    /// Slice the overfetched rows returned for `request.seek()`.
    pub fn assemble(request: &PageRequest<T::Key>, mut rows: Vec<T>) -> Self {
        let direction = request.direction();
        let has_more = rows.len() > request.take;

        let results = if direction == Direction::Backward {
            let skip = rows.len().saturating_sub(request.take);
            rows.split_off(skip)
        } else {
            rows.truncate(request.take);
            rows
        };

        let next_cursor = if has_more || direction == Direction::Backward {
            results.last().map(Keyed::key)
        } else {
            None
        };

        let prev_cursor =
            if direction == Direction::Forward || (direction == Direction::Backward && has_more) {
                results.first().map(Keyed::key)
            } else {
                None
            };

        Page {
            results,
            next_cursor,
            prev_cursor,
        }
    }
}

/// Run one page fetch through `fetch` and assemble the result.
pub async fn paginate<T, E, F, Fut>(
    request: &PageRequest<T::Key>,
    fetch: F,
) -> Result<Page<T, T::Key>, E>
where
    T: Keyed,
    F: FnOnce(Seek<T::Key>) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
{
    let rows = fetch(request.seek()).await?;
    Ok(Page::assemble(request, rows))
}

/// Apply a [`Seek`] to rows that are already in display order.
///
/// A cursor that is not present in `ordered` yields no rows, which matches
/// the row-comparison semantics of the SQL stores.
pub fn seek_in<T>(ordered: &[T], seek: &Seek<T::Key>) -> Vec<T>
where
    T: Keyed + Clone,
{
    let position = |key: &T::Key| ordered.iter().position(|row| row.key() == *key);

    let window: &[T] = match &seek.anchor {
        Anchor::Start => ordered,
        Anchor::After(key) => match position(key) {
            Some(i) => &ordered[i + 1..],
            None => &[],
        },
        Anchor::From(key) => match position(key) {
            Some(i) => &ordered[i..],
            None => &[],
        },
        Anchor::Before(key) => match position(key) {
            Some(i) => {
                let start = i.saturating_sub(seek.limit);
                return ordered[start..i].to_vec();
            }
            None => &[],
        },
    };

    window.iter().take(seek.limit).cloned().collect()
}
