//! Turns fetched [`RawNode`]s into client [`ReplyNode`]s.
//!
//! Every sibling list arrives with at most one reply more than its level's
//! take. When that extra reply is present it is removed and its id becomes
//! the inclusive cursor of the list's `loadMoreChildren` link. Nodes on the
//! deepest level carry no `children`; those with replies get a
//! `loadChildren` link instead.

use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    models::{
        ReplyAuthor, ReplyCounts, ReplyNode, ReplyRecord, ReplyStatus, ReplyTreeResponse,
        TreeParams, VoteType, Voted,
    },
    services::{
        query_string::tree_link,
        reply_tree::{LevelSpec, RawNode},
    },
};

pub struct FormatContext<'a> {
    pub post_id: Uuid,
    /// Expansion root of the request, `None` for the whole post.
    pub root_id: Option<Uuid>,
    pub params: &'a TreeParams,
    /// Viewer's votes; `None` for anonymous requests.
    pub votes: Option<&'a HashMap<Uuid, VoteType>>,
}

pub fn format_tree(
    nodes: Vec<RawNode>,
    spec: &LevelSpec,
    ctx: &FormatContext<'_>,
) -> ReplyTreeResponse {
    let (shown, next) = split_overflow(nodes, spec.take);

    ReplyTreeResponse {
        children: shown
            .into_iter()
            .map(|node| format_node(node, spec, ctx))
            .collect(),
        load_more_children: next
            .map(|cursor| tree_link(ctx.post_id, ctx.root_id, Some(cursor), ctx.params)),
    }
}

/// `spec` is the level `node` sits on.
fn format_node(node: RawNode, spec: &LevelSpec, ctx: &FormatContext<'_>) -> ReplyNode {
    let RawNode { record, children } = node;
    let ReplyRecord {
        reply,
        author_username,
        child_count,
    } = record;
    let id = reply.id;

    let (children, load_more_children, load_children) =
        match (children, spec.children.as_deref()) {
            (Some(children), Some(child_spec)) => {
                let (shown, next) = split_overflow(children, child_spec.take);
                let formatted = shown
                    .into_iter()
                    .map(|child| format_node(child, child_spec, ctx))
                    .collect();
                let more =
                    next.map(|cursor| tree_link(ctx.post_id, Some(id), Some(cursor), ctx.params));
                (Some(formatted), more, None)
            }
            _ => {
                let expand =
                    (child_count > 0).then(|| tree_link(ctx.post_id, Some(id), None, ctx.params));
                (None, None, expand)
            }
        };

    let mut formatted = ReplyNode {
        id,
        author: reply
            .author_id
            .zip(author_username)
            .map(|(author_id, username)| ReplyAuthor {
                id: author_id,
                username,
            }),
        content: reply.content,
        date_posted: reply.created_at,
        status: reply.status,
        counts: ReplyCounts {
            upvotes: Some(reply.upvotes),
            downvotes: Some(reply.downvotes),
            children: child_count,
        },
        voted: ctx.votes.map(|votes| {
            let vote = votes.get(&id);
            Voted {
                upvoted: vote == Some(&VoteType::Up),
                downvoted: vote == Some(&VoteType::Down),
            }
        }),
        children,
        load_more_children,
        load_children,
    };

    if formatted.status == ReplyStatus::Hidden {
        redact(&mut formatted);
    }
    formatted
}

/// Hidden replies keep their place in the tree and their links but expose
/// nothing about what was said or by whom.
fn redact(node: &mut ReplyNode) {
    node.author = None;
    node.content = None;
    node.counts.upvotes = None;
    node.counts.downvotes = None;
    node.voted = None;
}

/// Drop the overfetched reply, returning the rest and the dropped reply's id.
fn split_overflow(mut nodes: Vec<RawNode>, take: u32) -> (Vec<RawNode>, Option<Uuid>) {
    let take = take as usize;
    debug_assert!(
        nodes.len() <= take + 1,
        "sibling list of {} exceeds take {} plus one",
        nodes.len(),
        take
    );

    if nodes.len() <= take {
        return (nodes, None);
    }
    let rest = nodes.split_off(take);
    let next = rest.first().map(|node| node.record.reply.id);
    (nodes, next)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::Reply;

    fn record(id: Uuid, status: ReplyStatus, child_count: i64) -> ReplyRecord {
        ReplyRecord {
            reply: Reply {
                id,
                post_id: Uuid::nil(),
                parent_id: None,
                author_id: Some(Uuid::nil()),
                content: Some("text".to_string()),
                status,
                upvotes: 4,
                downvotes: 1,
                created_at: Utc::now(),
                edited_at: None,
            },
            author_username: Some("ann".to_string()),
            child_count,
        }
    }

    fn leaf(id: Uuid, child_count: i64) -> RawNode {
        RawNode {
            record: record(id, ReplyStatus::Active, child_count),
            children: None,
        }
    }

    fn params() -> TreeParams {
        TreeParams {
            levels: 0,
            take_per_level: 2,
            ..TreeParams::default()
        }
    }

    #[test]
    fn overfetched_reply_becomes_the_continuation_cursor() {
        let params = params();
        let spec = LevelSpec::build(&params);
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::now_v7()).collect();
        let ctx = FormatContext {
            post_id: Uuid::nil(),
            root_id: None,
            params: &params,
            votes: None,
        };

        let response = format_tree(ids.iter().map(|id| leaf(*id, 0)).collect(), &spec, &ctx);

        assert_eq!(response.children.len(), 2);
        assert_eq!(
            response.load_more_children,
            Some(tree_link(Uuid::nil(), None, Some(ids[2]), &params))
        );
    }

    #[test]
    fn full_but_not_overflowing_list_has_no_continuation() {
        let params = params();
        let spec = LevelSpec::build(&params);
        let ctx = FormatContext {
            post_id: Uuid::nil(),
            root_id: None,
            params: &params,
            votes: None,
        };

        let response = format_tree(
            vec![leaf(Uuid::now_v7(), 0), leaf(Uuid::now_v7(), 0)],
            &spec,
            &ctx,
        );

        assert_eq!(response.children.len(), 2);
        assert!(response.load_more_children.is_none());
    }

    #[test]
    fn depth_limit_nodes_link_to_their_children() {
        let params = params();
        let spec = LevelSpec::build(&params);
        let with_children = Uuid::now_v7();
        let ctx = FormatContext {
            post_id: Uuid::nil(),
            root_id: None,
            params: &params,
            votes: None,
        };

        let response = format_tree(
            vec![leaf(with_children, 5), leaf(Uuid::now_v7(), 0)],
            &spec,
            &ctx,
        );

        let first = &response.children[0];
        assert!(first.children.is_none());
        assert!(first.load_more_children.is_none());
        assert_eq!(
            first.load_children,
            Some(tree_link(Uuid::nil(), Some(with_children), None, &params))
        );
        assert!(response.children[1].load_children.is_none());
    }

    #[test]
    fn hidden_replies_are_redacted() {
        let params = params();
        let spec = LevelSpec::build(&params);
        let id = Uuid::now_v7();
        let votes = HashMap::from([(id, VoteType::Up)]);
        let ctx = FormatContext {
            post_id: Uuid::nil(),
            root_id: None,
            params: &params,
            votes: Some(&votes),
        };
        let node = RawNode {
            record: record(id, ReplyStatus::Hidden, 2),
            children: None,
        };

        let response = format_tree(vec![node], &spec, &ctx);
        let hidden = &response.children[0];

        assert_eq!(hidden.id, id);
        assert!(hidden.author.is_none());
        assert!(hidden.content.is_none());
        assert!(hidden.counts.upvotes.is_none());
        assert!(hidden.counts.downvotes.is_none());
        assert!(hidden.voted.is_none());
        assert_eq!(hidden.counts.children, 2);
        assert!(hidden.load_children.is_some());
    }

    #[test]
    fn viewer_votes_are_annotated() {
        let params = params();
        let spec = LevelSpec::build(&params);
        let up = Uuid::now_v7();
        let none = Uuid::now_v7();
        let votes = HashMap::from([(up, VoteType::Up)]);
        let ctx = FormatContext {
            post_id: Uuid::nil(),
            root_id: None,
            params: &params,
            votes: Some(&votes),
        };

        let response = format_tree(vec![leaf(up, 0), leaf(none, 0)], &spec, &ctx);

        assert_eq!(
            response.children[0].voted,
            Some(Voted {
                upvoted: true,
                downvoted: false
            })
        );
        assert_eq!(
            response.children[1].voted,
            Some(Voted {
                upvoted: false,
                downvoted: false
            })
        );
    }
}
