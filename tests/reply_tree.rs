use std::collections::HashSet;
use std::sync::Arc;

use axum::{extract::Query, http::Uri};
use chrono::Utc;
use uuid::Uuid;

use forum_backend::{
    error::AppError,
    models::{
        HideReplyRequest, MembershipRole, Post, Reply, ReplyNode, ReplyStatus, ReplyTreeResponse,
        TreeLimits, TreeParams, TreeQuery, parse_cursor,
    },
    services::{
        community_service,
        pagination::PageRequest,
        reply_cache::ReplyCache,
        reply_service::{self, TreeRequest},
        reply_tree::LevelSpec,
        score::{self, SortMode},
    },
    storage::memory::MemoryStore,
};

struct Forum {
    store: Arc<MemoryStore>,
    cache: ReplyCache,
    post: Post,
    author: Uuid,
}

fn forum() -> Forum {
    let store = Arc::new(MemoryStore::new());
    let author = store.add_user("author").unwrap();
    let community = store.add_community("rust").unwrap();
    let post = store
        .add_post(community.id, Some(author), "Reply trees")
        .unwrap();

    Forum {
        store,
        cache: ReplyCache::disabled(),
        post,
        author,
    }
}

impl Forum {
    fn reply(&self, parent_id: Option<Uuid>) -> Uuid {
        let id = Uuid::now_v7();
        self.store
            .insert_reply(Reply {
                id,
                post_id: self.post.id,
                parent_id,
                author_id: Some(self.author),
                content: Some(format!("reply {}", id)),
                status: ReplyStatus::Active,
                upvotes: 0,
                downvotes: 0,
                created_at: Utc::now(),
                edited_at: None,
            })
            .unwrap();
        id
    }

    /// `fanout` replies under `parent`, each with the same shape `depth - 1`
    /// levels further down.
    fn grow(&self, parent_id: Option<Uuid>, depth: u32, fanout: usize) {
        if depth == 0 {
            return;
        }
        for _ in 0..fanout {
            let id = self.reply(parent_id);
            self.grow(Some(id), depth - 1, fanout);
        }
    }

    async fn tree(
        &self,
        parent_id: Option<Uuid>,
        cursor: Option<Uuid>,
        params: TreeParams,
        viewer_id: Option<Uuid>,
    ) -> Result<ReplyTreeResponse, AppError> {
        let request = TreeRequest {
            post_id: self.post.id,
            parent_id,
            cursor,
            params,
            viewer_id,
        };
        reply_service::get_reply_tree(self.store.as_ref(), &self.cache, &request).await
    }

    /// Issue the request a continuation link describes.
    async fn follow(&self, link: &str) -> ReplyTreeResponse {
        let uri: Uri = link.parse().unwrap();
        let segments: Vec<&str> = uri.path().trim_start_matches('/').split('/').collect();
        assert_eq!(segments[..2], ["api", "posts"]);
        assert_eq!(segments[2], self.post.id.to_string());
        let parent_id = segments.get(4).map(|s| Uuid::parse_str(s).unwrap());

        let Query(query) = Query::<TreeQuery>::try_from_uri(&uri).unwrap();
        let params = TreeParams::from_query(&query, &TreeLimits::default()).unwrap();
        let cursor = parse_cursor("cursor", query.cursor.as_deref()).unwrap();

        self.tree(parent_id, cursor, params, None).await.unwrap()
    }
}

fn params(levels: u32, take_per_level: u32) -> TreeParams {
    TreeParams {
        levels,
        take_per_level,
        ..TreeParams::default()
    }
}

fn walk<'a>(nodes: &'a [ReplyNode], out: &mut Vec<&'a ReplyNode>) {
    for node in nodes {
        out.push(node);
        if let Some(children) = &node.children {
            walk(children, out);
        }
    }
}

fn all_nodes(response: &ReplyTreeResponse) -> Vec<&ReplyNode> {
    let mut out = Vec::new();
    walk(&response.children, &mut out);
    out
}

#[tokio::test]
async fn full_tree_fits_exactly_without_links() {
    let forum = forum();
    forum.grow(None, 3, 4);

    let response = forum.tree(None, None, params(2, 4), None).await.unwrap();
    let nodes = all_nodes(&response);

    assert_eq!(nodes.len(), 84);
    assert!(response.load_more_children.is_none());
    assert!(nodes.iter().all(|n| n.load_more_children.is_none()));
    assert!(nodes.iter().all(|n| n.load_children.is_none()));

    for root in &response.children {
        for child in root.children.as_ref().unwrap() {
            for leaf in child.children.as_ref().unwrap() {
                assert!(leaf.children.is_none());
                assert_eq!(leaf.counts.children, 0);
            }
        }
    }
}

#[tokio::test]
async fn narrow_tree_links_to_what_was_cut() {
    let forum = forum();
    forum.grow(None, 3, 4);
    let response = forum.tree(None, None, params(1, 2), None).await.unwrap();

    assert_eq!(response.children.len(), 2);
    let root_link = response.load_more_children.as_deref().unwrap();
    let rest = forum.follow(root_link).await;
    assert_eq!(rest.children.len(), 2);
    assert!(rest.load_more_children.is_none());

    for root in &response.children {
        let children = root.children.as_ref().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(root.counts.children, 4);

        // Id descending under the default sort with no votes.
        let mut all_children = forum
            .tree(Some(root.id), None, params(0, 4), None)
            .await
            .unwrap()
            .children
            .into_iter()
            .map(|n| n.id)
            .collect::<Vec<_>>();
        all_children.sort_by(|a, b| b.cmp(a));
        assert_eq!(
            children.iter().map(|c| c.id).collect::<Vec<_>>(),
            all_children[..2]
        );

        let more = root.load_more_children.as_deref().unwrap();
        assert!(more.contains(&format!("cursor={}", all_children[2])));

        for child in children {
            assert!(child.children.is_none());
            assert_eq!(child.counts.children, 4);
            assert!(child.load_children.is_some());
        }
    }
}

#[tokio::test]
async fn response_size_stays_within_the_geometric_bound() {
    let forum = forum();
    forum.grow(None, 3, 4);

    for (levels, take, root) in [(0, 2, None), (1, 3, Some(1)), (2, 2, Some(3)), (2, 4, Some(4))] {
        let params = TreeParams {
            levels,
            take_per_level: take,
            take_at_root: root,
            sort: None,
        };
        let bound = LevelSpec::build(&params).max_nodes() as usize;

        let response = forum.tree(None, None, params, None).await.unwrap();

        // Every level of the tree is at least as wide as any take used here.
        assert_eq!(all_nodes(&response).len(), bound);
    }

    let sparse = forum.tree(None, None, params(5, 10), None).await.unwrap();
    assert!(all_nodes(&sparse).len() <= LevelSpec::build(&params(5, 10)).max_nodes() as usize);
    assert_eq!(all_nodes(&sparse).len(), 84);
}

#[tokio::test]
async fn continuation_links_match_true_child_counts() {
    let forum = forum();
    let a = forum.reply(None);
    forum.grow(Some(a), 2, 3);
    let b = forum.reply(None);
    forum.grow(Some(b), 1, 1);
    forum.reply(None);

    for params in [params(1, 2), params(2, 3), params(0, 1), params(3, 2)] {
        let response = forum.tree(None, None, params, None).await.unwrap();

        for node in all_nodes(&response) {
            assert!(!(node.load_more_children.is_some() && node.load_children.is_some()));
            match &node.children {
                Some(children) => {
                    assert_eq!(
                        node.load_more_children.is_some(),
                        (children.len() as i64) < node.counts.children
                    );
                    assert!(node.load_children.is_none());
                }
                None => {
                    assert_eq!(node.load_children.is_some(), node.counts.children > 0);
                }
            }
        }
    }
}

#[tokio::test]
async fn walking_root_continuations_visits_every_root_once() {
    let forum = forum();
    forum.grow(None, 1, 7);

    let mut seen = HashSet::new();
    let mut response = forum.tree(None, None, params(0, 2), None).await.unwrap();
    let mut pages = 1;
    loop {
        for node in &response.children {
            assert!(seen.insert(node.id), "root {} shown twice", node.id);
        }
        let Some(link) = response.load_more_children.clone() else {
            break;
        };
        response = forum.follow(&link).await;
        pages += 1;
    }

    assert_eq!(seen.len(), 7);
    assert_eq!(pages, 4);
}

#[tokio::test]
async fn single_reply_pages_advance_on_every_link() {
    let forum = forum();
    forum.grow(None, 1, 3);

    let mut links = Vec::new();
    let mut seen = Vec::new();
    let mut response = forum.tree(None, None, params(0, 1), None).await.unwrap();
    loop {
        assert_eq!(response.children.len(), 1);
        seen.push(response.children[0].id);
        let Some(link) = response.load_more_children.clone() else {
            break;
        };
        links.push(link.clone());
        response = forum.follow(&link).await;
    }

    assert_eq!(links.len(), 2);
    assert_ne!(links[0], links[1]);
    assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 3);
}

#[test]
fn zero_take_requests_are_rejected() {
    for fragment in [
        "levels=0&takePerLevel=0",
        "takePerLevel=0",
        "takeAtRoot=0",
        "levels=2&takePerLevel=4&takeAtRoot=0",
    ] {
        let uri: Uri = format!("/api/posts/x/replies?{}", fragment).parse().unwrap();
        let Query(query) = Query::<TreeQuery>::try_from_uri(&uri).unwrap();
        let err = TreeParams::from_query(&query, &TreeLimits::default()).unwrap_err();
        assert!(matches!(err, AppError::InvalidParameter(_)), "{}", fragment);
    }
}

/// Votes `(up, down)` onto fresh root replies, returned in creation order.
async fn voted_roots(forum: &Forum, tallies: &[(usize, usize)]) -> Vec<(Uuid, i64, i64)> {
    let most = tallies.iter().map(|(up, down)| up + down).max().unwrap_or(0);
    let voters: Vec<Uuid> = (0..most)
        .map(|i| forum.store.add_user(&format!("voter{}", i)).unwrap())
        .collect();

    let mut roots = Vec::new();
    for &(up, down) in tallies {
        let id = forum.reply(None);
        for (i, voter) in voters.iter().take(up + down).enumerate() {
            let vote = if i < up { 1 } else { -1 };
            reply_service::vote_reply(forum.store.as_ref(), &forum.cache, *voter, id, vote)
                .await
                .unwrap();
        }
        roots.push((id, up as i64, down as i64));
    }
    roots
}

#[tokio::test]
async fn continuations_follow_score_order_for_every_sort() {
    let forum = forum();
    let roots = voted_roots(
        &forum,
        &[(4, 0), (0, 0), (2, 2), (1, 0), (3, 1), (0, 2), (1, 1)],
    )
    .await;
    let by_id: Vec<Uuid> = {
        let mut ids: Vec<Uuid> = roots.iter().map(|r| r.0).collect();
        ids.sort_by(|a, b| b.cmp(a));
        ids
    };

    for sort in [SortMode::Top, SortMode::Best, SortMode::Controversial] {
        let mut expected: Vec<(f64, Uuid)> = roots
            .iter()
            .map(|&(id, up, down)| (score::score(sort, up, down, Utc::now()), id))
            .collect();
        expected.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        let expected: Vec<Uuid> = expected.into_iter().map(|(_, id)| id).collect();
        assert_ne!(expected, by_id, "{} should not collapse to id order", sort);

        let params = TreeParams {
            levels: 0,
            take_per_level: 2,
            take_at_root: None,
            sort: Some(sort),
        };
        let mut shown = Vec::new();
        let mut response = forum.tree(None, None, params, None).await.unwrap();
        loop {
            shown.extend(response.children.iter().map(|n| n.id));
            let Some(link) = response.load_more_children.clone() else {
                break;
            };
            assert!(link.contains(&format!("sort={}", sort)), "{}", link);
            response = forum.follow(&link).await;
        }

        assert_eq!(shown, expected, "{}", sort);
    }
}

#[tokio::test]
async fn expansion_links_open_the_subtree() {
    let forum = forum();
    forum.grow(None, 3, 2);

    let response = forum.tree(None, None, params(0, 3), None).await.unwrap();
    let root = &response.children[0];
    let expanded = forum
        .follow(root.load_children.as_deref().unwrap())
        .await;

    assert_eq!(expanded.children.len(), 2);
    assert!(expanded.children.iter().all(|c| c.children.is_none()));
    assert!(expanded.children.iter().all(|c| c.load_children.is_some()));
}

#[tokio::test]
async fn parent_from_another_post_is_not_found() {
    let forum = forum();
    let community = forum.store.add_community("other").unwrap();
    let other_post = forum.store.add_post(community.id, None, "Other").unwrap();
    let foreign = Uuid::now_v7();
    forum
        .store
        .insert_reply(Reply {
            id: foreign,
            post_id: other_post.id,
            parent_id: None,
            author_id: None,
            content: Some("elsewhere".to_string()),
            status: ReplyStatus::Active,
            upvotes: 0,
            downvotes: 0,
            created_at: Utc::now(),
            edited_at: None,
        })
        .unwrap();

    let err = forum
        .tree(Some(foreign), None, TreeParams::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = forum
        .tree(Some(Uuid::now_v7()), None, TreeParams::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn hidden_replies_are_redacted_for_every_viewer() {
    let forum = forum();
    let hidden = forum.reply(None);
    forum.reply(Some(hidden));
    let visible = forum.reply(None);
    forum.reply(Some(visible));

    let moderator = forum.store.add_user("moderator").unwrap();
    forum
        .store
        .add_member(moderator, forum.post.community_id, MembershipRole::Moderator)
        .unwrap();
    let bystander = forum.store.add_user("bystander").unwrap();

    let request = HideReplyRequest {
        hidden: true,
        reason: Some("off topic".to_string()),
    };
    let err = reply_service::set_reply_visibility(
        forum.store.as_ref(),
        &forum.cache,
        bystander,
        hidden,
        &request,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));

    reply_service::set_reply_visibility(
        forum.store.as_ref(),
        &forum.cache,
        moderator,
        hidden,
        &request,
    )
    .await
    .unwrap();

    for viewer in [None, Some(bystander), Some(moderator)] {
        let response = forum.tree(None, None, params(1, 3), viewer).await.unwrap();
        let node = response.children.iter().find(|n| n.id == hidden).unwrap();
        let other = response.children.iter().find(|n| n.id == visible).unwrap();

        assert_eq!(node.status, ReplyStatus::Hidden);
        assert!(node.content.is_none());
        assert!(node.author.is_none());
        assert_eq!(node.counts.children, other.counts.children);
        assert_eq!(
            node.children.as_ref().map(Vec::len),
            other.children.as_ref().map(Vec::len)
        );
        assert!(other.content.is_some());
    }

    let actions = community_service::list_mod_actions(
        forum.store.as_ref(),
        "rust",
        &PageRequest::new(10),
    )
    .await
    .unwrap();
    assert_eq!(actions.results.len(), 1);
    assert_eq!(actions.results[0].target_id, hidden);
}

#[tokio::test]
async fn viewer_votes_round_trip() {
    let forum = forum();
    let reply = forum.reply(None);
    let voter = forum.store.add_user("voter").unwrap();

    let voted = |response: &ReplyTreeResponse| response.children[0].voted;

    reply_service::vote_reply(forum.store.as_ref(), &forum.cache, voter, reply, 1)
        .await
        .unwrap();
    let response = forum
        .tree(None, None, TreeParams::default(), Some(voter))
        .await
        .unwrap();
    let flags = voted(&response).unwrap();
    assert!(flags.upvoted);
    assert!(!flags.downvoted);
    assert_eq!(response.children[0].counts.upvotes, Some(1));

    reply_service::vote_reply(forum.store.as_ref(), &forum.cache, voter, reply, 0)
        .await
        .unwrap();
    let response = forum
        .tree(None, None, TreeParams::default(), Some(voter))
        .await
        .unwrap();
    let flags = voted(&response).unwrap();
    assert!(!flags.upvoted);
    assert!(!flags.downvoted);

    let anonymous = forum
        .tree(None, None, TreeParams::default(), None)
        .await
        .unwrap();
    assert!(voted(&anonymous).is_none());

    let err = reply_service::vote_reply(forum.store.as_ref(), &forum.cache, forum.author, reply, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn top_sort_ranks_by_net_votes() {
    let forum = forum();
    let low = forum.reply(None);
    let high = forum.reply(None);
    let voters: Vec<Uuid> = (0..3)
        .map(|i| forum.store.add_user(&format!("voter{}", i)).unwrap())
        .collect();

    for voter in &voters {
        reply_service::vote_reply(forum.store.as_ref(), &forum.cache, *voter, low, 1)
            .await
            .unwrap();
    }
    reply_service::vote_reply(forum.store.as_ref(), &forum.cache, voters[0], high, -1)
        .await
        .unwrap();

    let params = TreeParams {
        sort: Some(SortMode::Top),
        ..TreeParams::default()
    };
    let response = forum.tree(None, None, params, None).await.unwrap();

    assert_eq!(
        response.children.iter().map(|n| n.id).collect::<Vec<_>>(),
        vec![low, high]
    );
}
