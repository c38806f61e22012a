//! In-memory store.
//!
//! Everything lives behind one [`RwLock`] and is lost on exit. Lists are
//! materialised in display order and then cut with [`seek_in`], so cursor
//! semantics match the SQL store row for row.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{ForumStore, ReplyFilter, StatusChange, StorageError};
use crate::{
    models::{
        Community, MembershipRole, ModAction, NewReply, Post, PostListItem, PostStatus, Reply,
        ReplyRecord, ReplyStatus, VoteResponse, VoteType, tally_delta,
    },
    services::{
        pagination::{Seek, seek_in},
        score::{self, SortMode},
    },
};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, String>,
    communities: BTreeMap<Uuid, Community>,
    memberships: HashMap<(Uuid, Uuid), MembershipRole>,
    posts: HashMap<Uuid, Post>,
    replies: HashMap<Uuid, Reply>,
    /// (user, reply) -> vote
    votes: HashMap<(Uuid, Uuid), VoteType>,
    mod_actions: Vec<ModAction>,
}

impl Inner {
    fn child_counts(&self) -> HashMap<Uuid, i64> {
        let mut counts = HashMap::new();
        for reply in self.replies.values() {
            if let Some(parent_id) = reply.parent_id {
                *counts.entry(parent_id).or_insert(0) += 1;
            }
        }
        counts
    }

    fn username(&self, user_id: Option<Uuid>) -> Option<String> {
        user_id.and_then(|id| self.users.get(&id).cloned())
    }
}

/// Ranked descending by score, then by id descending.
fn by_score_desc(a: (f64, Uuid), b: (f64, Uuid)) -> Ordering {
    b.0.total_cmp(&a.0).then_with(|| b.1.cmp(&a.1))
}

pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StorageError> {
        self.inner
            .read()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StorageError> {
        self.inner
            .write()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))
    }

    // --- Seeding -------------------------------------------------------------
    //
    // Accounts, communities and posts are created by collaborators outside
    // this service; these let tests and local runs populate the store.

    pub fn add_user(&self, username: &str) -> Result<Uuid, StorageError> {
        let id = Uuid::now_v7();
        self.write()?.users.insert(id, username.to_string());
        Ok(id)
    }

    pub fn add_community(&self, name: &str) -> Result<Community, StorageError> {
        let community = Community {
            id: Uuid::now_v7(),
            name: name.to_string(),
            display_name: name.to_string(),
            description: None,
            created_at: Utc::now(),
        };
        self.write()?
            .communities
            .insert(community.id, community.clone());
        Ok(community)
    }

    pub fn add_member(
        &self,
        user_id: Uuid,
        community_id: Uuid,
        role: MembershipRole,
    ) -> Result<(), StorageError> {
        self.write()?
            .memberships
            .insert((user_id, community_id), role);
        Ok(())
    }

    pub fn add_post(
        &self,
        community_id: Uuid,
        author_id: Option<Uuid>,
        title: &str,
    ) -> Result<Post, StorageError> {
        let post = Post {
            id: Uuid::now_v7(),
            community_id,
            author_id,
            title: title.to_string(),
            content: None,
            status: PostStatus::Active,
            upvotes: 0,
            downvotes: 0,
            created_at: Utc::now(),
        };
        self.write()?.posts.insert(post.id, post.clone());
        Ok(post)
    }

    /// Insert a fully-formed reply, counts and status included.
    pub fn insert_reply(&self, reply: Reply) -> Result<(), StorageError> {
        let mut inner = self.write()?;
        if inner.replies.contains_key(&reply.id) {
            return Err(StorageError::Conflict(format!(
                "reply {} already exists",
                reply.id
            )));
        }
        inner.replies.insert(reply.id, reply);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ForumStore for MemoryStore {
    // --- Posts and replies ---------------------------------------------------

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>, StorageError> {
        Ok(self.read()?.posts.get(&post_id).cloned())
    }

    async fn get_reply(&self, reply_id: Uuid) -> Result<Option<Reply>, StorageError> {
        Ok(self.read()?.replies.get(&reply_id).cloned())
    }

    async fn fetch_replies(
        &self,
        filter: &ReplyFilter,
        seek: &Seek<Uuid>,
    ) -> Result<Vec<ReplyRecord>, StorageError> {
        let inner = self.read()?;
        let child_counts = inner.child_counts();

        let mut siblings: Vec<(f64, ReplyRecord)> = inner
            .replies
            .values()
            .filter(|r| r.post_id == filter.post_id && r.parent_id == filter.parent_id)
            .map(|r| {
                let rank = score::score(filter.sort, r.upvotes, r.downvotes, filter.now);
                let record = ReplyRecord {
                    reply: r.clone(),
                    author_username: inner.username(r.author_id),
                    child_count: child_counts.get(&r.id).copied().unwrap_or(0),
                };
                (rank, record)
            })
            .collect();

        siblings.sort_by(|a, b| by_score_desc((a.0, a.1.reply.id), (b.0, b.1.reply.id)));
        let ordered: Vec<ReplyRecord> = siblings.into_iter().map(|(_, r)| r).collect();

        Ok(seek_in(&ordered, seek))
    }

    async fn viewer_votes(
        &self,
        viewer_id: Uuid,
        reply_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, VoteType>, StorageError> {
        let inner = self.read()?;
        Ok(reply_ids
            .iter()
            .filter_map(|id| inner.votes.get(&(viewer_id, *id)).map(|v| (*id, *v)))
            .collect())
    }

    async fn create_reply(&self, reply: &NewReply) -> Result<Reply, StorageError> {
        let created = Reply {
            id: reply.id,
            post_id: reply.post_id,
            parent_id: reply.parent_id,
            author_id: Some(reply.author_id),
            content: Some(reply.content.clone()),
            status: ReplyStatus::Active,
            upvotes: 0,
            downvotes: 0,
            created_at: reply.created_at,
            edited_at: None,
        };
        self.insert_reply(created.clone())?;
        Ok(created)
    }

    async fn set_reply_vote(
        &self,
        user_id: Uuid,
        reply_id: Uuid,
        vote: Option<VoteType>,
    ) -> Result<VoteResponse, StorageError> {
        let mut inner = self.write()?;
        if !inner.replies.contains_key(&reply_id) {
            return Err(StorageError::NotFound(format!("reply {}", reply_id)));
        }

        let previous = inner.votes.remove(&(user_id, reply_id));
        if let Some(vote) = vote {
            inner.votes.insert((user_id, reply_id), vote);
        }

        let reply = inner
            .replies
            .get_mut(&reply_id)
            .ok_or_else(|| StorageError::NotFound(format!("reply {}", reply_id)))?;
        let (up, down) = tally_delta(previous, vote);
        reply.upvotes += up;
        reply.downvotes += down;

        Ok(VoteResponse {
            user_vote: vote.map(|v| v.as_i16()),
            upvotes: reply.upvotes,
            downvotes: reply.downvotes,
        })
    }

    async fn set_reply_status(&self, change: &StatusChange) -> Result<(), StorageError> {
        let mut inner = self.write()?;
        let reply = inner
            .replies
            .get_mut(&change.reply_id)
            .ok_or_else(|| StorageError::NotFound(format!("reply {}", change.reply_id)))?;
        reply.status = change.status;
        inner.mod_actions.push(change.action.clone());
        Ok(())
    }

    // --- Communities ---------------------------------------------------------

    async fn get_community_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Community>, StorageError> {
        Ok(self
            .read()?
            .communities
            .values()
            .find(|c| c.name == name)
            .cloned())
    }

    async fn list_communities(&self, seek: &Seek<Uuid>) -> Result<Vec<Community>, StorageError> {
        let inner = self.read()?;
        let ordered: Vec<Community> = inner.communities.values().rev().cloned().collect();
        Ok(seek_in(&ordered, seek))
    }

    async fn list_posts(
        &self,
        community_id: Uuid,
        sort: SortMode,
        now: DateTime<Utc>,
        seek: &Seek<Uuid>,
    ) -> Result<Vec<PostListItem>, StorageError> {
        let inner = self.read()?;

        let mut reply_counts: HashMap<Uuid, i64> = HashMap::new();
        for reply in inner.replies.values() {
            *reply_counts.entry(reply.post_id).or_insert(0) += 1;
        }

        let mut ranked: Vec<(f64, PostListItem)> = inner
            .posts
            .values()
            .filter(|p| p.community_id == community_id && p.status == PostStatus::Active)
            .map(|p| {
                let rank = score::score(sort, p.upvotes, p.downvotes, now);
                let item = PostListItem {
                    post: p.clone(),
                    author_username: inner.username(p.author_id),
                    reply_count: reply_counts.get(&p.id).copied().unwrap_or(0),
                };
                (rank, item)
            })
            .collect();

        ranked.sort_by(|a, b| by_score_desc((a.0, a.1.post.id), (b.0, b.1.post.id)));
        let ordered: Vec<PostListItem> = ranked.into_iter().map(|(_, p)| p).collect();

        Ok(seek_in(&ordered, seek))
    }

    async fn list_mod_actions(
        &self,
        community_id: Uuid,
        seek: &Seek<Uuid>,
    ) -> Result<Vec<ModAction>, StorageError> {
        let inner = self.read()?;
        let mut ordered: Vec<ModAction> = inner
            .mod_actions
            .iter()
            .filter(|a| a.community_id == community_id)
            .cloned()
            .collect();
        ordered.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(seek_in(&ordered, seek))
    }

    async fn membership_role(
        &self,
        user_id: Uuid,
        community_id: Uuid,
    ) -> Result<Option<MembershipRole>, StorageError> {
        Ok(self
            .read()?
            .memberships
            .get(&(user_id, community_id))
            .copied())
    }
}
