//! Bounded reply tree retrieval.
//!
//! A [`LevelSpec`] describes the shape of one request: how many replies to
//! take at each depth and where recursion stops. [`fetch_tree`] walks it
//! level by level, overfetching one reply per sibling list so the formatter
//! can tell whether more replies exist. Only the root level honours a
//! cursor; deeper levels always start from their first reply and are
//! continued later through `loadMoreChildren` / `loadChildren` links.

use futures::future::{BoxFuture, FutureExt, try_join_all};
use uuid::Uuid;

use crate::{
    models::{ReplyRecord, TreeParams},
    services::pagination::Seek,
    storage::{ForumStore, ReplyFilter, StorageError},
};

/// Shape of one level of a tree request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelSpec {
    pub take: u32,
    /// `None` at the depth limit: nodes on this level get no inlined children.
    pub children: Option<Box<LevelSpec>>,
}

impl LevelSpec {
    pub fn build(params: &TreeParams) -> Self {
        Self::level(params.take_at_root(), params.take_per_level, params.levels)
    }

    fn level(take: u32, take_per_level: u32, remaining: u32) -> Self {
        let children = (remaining > 0)
            .then(|| Box::new(Self::level(take_per_level, take_per_level, remaining - 1)));
        Self { take, children }
    }

    /// Number of levels below this one.
    pub fn depth(&self) -> u32 {
        self.children.as_ref().map_or(0, |c| 1 + c.depth())
    }

    /// Most nodes a response shaped by this spec can contain, saturating at
    /// `u64::MAX`.
    pub fn max_nodes(&self) -> u64 {
        let below = self.children.as_ref().map_or(0, |c| c.max_nodes());
        u64::from(self.take).saturating_mul(below.saturating_add(1))
    }
}

/// Fetched reply with its fetched children, before trimming and redaction.
#[derive(Debug, Clone)]
pub struct RawNode {
    pub record: ReplyRecord,
    /// `None` when the level had no room for children.
    pub children: Option<Vec<RawNode>>,
}

impl RawNode {
    pub fn collect_ids(nodes: &[RawNode], out: &mut Vec<Uuid>) {
        for node in nodes {
            out.push(node.record.reply.id);
            if let Some(children) = &node.children {
                Self::collect_ids(children, out);
            }
        }
    }
}

/// Fetch the tree under `root` (its `parent_id` is the expansion root, `None`
/// for the post itself). `cursor` is inclusive and applies to the root level.
pub async fn fetch_tree(
    store: &dyn ForumStore,
    root: ReplyFilter,
    cursor: Option<Uuid>,
    spec: &LevelSpec,
) -> Result<Vec<RawNode>, StorageError> {
    let seek = Seek::starting_at(cursor, spec.take as usize);
    fetch_level(store, root, seek, spec).await
}

fn fetch_level<'a>(
    store: &'a dyn ForumStore,
    filter: ReplyFilter,
    seek: Seek<Uuid>,
    spec: &'a LevelSpec,
) -> BoxFuture<'a, Result<Vec<RawNode>, StorageError>> {
    async move {
        let records = store.fetch_replies(&filter, &seek).await?;

        let Some(child_spec) = spec.children.as_deref() else {
            return Ok(records
                .into_iter()
                .map(|record| RawNode {
                    record,
                    children: None,
                })
                .collect());
        };

        // The overfetched reply is dropped by the formatter, so its subtree
        // is never read.
        let shown = records.len().min(spec.take as usize);
        let subtrees = try_join_all(records[..shown].iter().map(|record| {
            let child_filter = ReplyFilter {
                parent_id: Some(record.reply.id),
                ..filter
            };
            let has_children = record.child_count > 0;
            async move {
                if !has_children {
                    return Ok(Vec::new());
                }
                fetch_level(
                    store,
                    child_filter,
                    Seek::first(child_spec.take as usize),
                    child_spec,
                )
                .await
            }
        }))
        .await?;

        let mut subtrees = subtrees.into_iter();
        Ok(records
            .into_iter()
            .map(|record| RawNode {
                record,
                children: subtrees.next(),
            })
            .collect())
    }
    .boxed()
}
