//! Postgres store.
//!
//! Ranking is computed in SQL with the same formulas as
//! [`crate::services::score`]. Keyset pagination compares `(sort_score, id)`
//! against the cursor row's own pair, so a cursor that no longer exists in
//! the list yields an empty page.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{ForumStore, ReplyFilter, StatusChange, StorageError};
use crate::{
    models::{
        Community, MembershipRole, ModAction, NewReply, Post, PostListItem, Reply, ReplyRecord,
        VoteResponse, VoteType, tally_delta,
    },
    services::{
        pagination::{Anchor, Seek},
        score::SortMode,
    },
};

const REPLY_COLUMNS: &str = "id, post_id, parent_id, author_id, content, status, upvotes, downvotes, created_at, edited_at";
const POST_COLUMNS: &str =
    "id, community_id, author_id, title, content, status, upvotes, downvotes, created_at";

// z for an 80% confidence Wilson interval, kept in step with services::score
const WILSON_Z: f64 = 1.281551565545;

/// SQL expression ranking a row by `sort`. The request time is always `$1`.
fn score_sql(sort: SortMode, up: &str, down: &str) -> String {
    let n = format!("({up} + {down})::float8");
    match sort {
        SortMode::Top => format!("({up} - {down})::float8"),
        SortMode::Hot => format!(
            "SIGN(({up} - {down})::float8) * LOG(GREATEST(ABS({up} - {down}), 1)::float8) + $1::float8 / 100000.0"
        ),
        SortMode::Best => {
            let z = WILSON_Z;
            let zz = WILSON_Z * WILSON_Z;
            let p = format!("({up}::float8 / {n})");
            format!(
                "CASE WHEN {up} + {down} = 0 THEN 0::float8 ELSE \
                 ({p} + {zz}::float8 / (2 * {n}) \
                 - {z}::float8 * SQRT(({p} * (1 - {p}) + {zz}::float8 / (4 * {n})) / {n})) \
                 / (1 + {zz}::float8 / {n}) END"
            )
        }
        SortMode::Controversial => format!(
            "CASE WHEN {up} + {down} = 0 THEN 0::float8 ELSE \
             POWER({n}, LEAST({up}, {down})::float8 / GREATEST({up}, {down})::float8) END"
        ),
    }
}

/// Comparison and order for a [`Seek`] over a list displayed descending.
struct Keyset {
    op: &'static str,
    order: &'static str,
    /// Rows come back ascending and must be flipped into display order.
    reversed: bool,
    cursor: Option<Uuid>,
    limit: i64,
}

impl Keyset {
    fn from_seek(seek: &Seek<Uuid>) -> Self {
        let (op, order, reversed) = match seek.anchor {
            Anchor::Start | Anchor::After(_) => ("<", "DESC", false),
            Anchor::From(_) => ("<=", "DESC", false),
            Anchor::Before(_) => (">", "ASC", true),
        };

        Self {
            op,
            order,
            reversed,
            cursor: seek.anchor.key().copied(),
            limit: seek.limit as i64,
        }
    }

    fn finish<T>(&self, mut rows: Vec<T>) -> Vec<T> {
        if self.reversed {
            rows.reverse();
        }
        rows
    }
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ForumStore for PgStore {
    // --- Posts and replies ---------------------------------------------------

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>, StorageError> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "SELECT {} FROM posts WHERE id = $1",
            POST_COLUMNS
        ))
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(post)
    }

    async fn get_reply(&self, reply_id: Uuid) -> Result<Option<Reply>, StorageError> {
        let reply = sqlx::query_as::<_, Reply>(&format!(
            "SELECT {} FROM replies WHERE id = $1",
            REPLY_COLUMNS
        ))
        .bind(reply_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reply)
    }

    async fn fetch_replies(
        &self,
        filter: &ReplyFilter,
        seek: &Seek<Uuid>,
    ) -> Result<Vec<ReplyRecord>, StorageError> {
        let keyset = Keyset::from_seek(seek);

        let query = format!(
            r#"
            WITH scored AS (
                SELECT
                    r.id, r.post_id, r.parent_id, r.author_id, r.content, r.status,
                    r.upvotes, r.downvotes, r.created_at, r.edited_at,
                    u.username AS author_username,
                    (SELECT COUNT(*) FROM replies c WHERE c.parent_id = r.id) AS child_count,
                    {score} AS sort_score
                FROM replies r
                LEFT JOIN users u ON r.author_id = u.id
                WHERE r.post_id = $2 AND r.parent_id IS NOT DISTINCT FROM $3
            )
            SELECT {columns}, author_username, child_count
            FROM scored
            WHERE $4::uuid IS NULL
               OR (sort_score, id) {op} (SELECT sort_score, id FROM scored WHERE id = $4)
            ORDER BY sort_score {order}, id {order}
            LIMIT $5
            "#,
            score = score_sql(filter.sort, "r.upvotes", "r.downvotes"),
            columns = REPLY_COLUMNS,
            op = keyset.op,
            order = keyset.order,
        );

        let rows = sqlx::query_as::<_, ReplyRecord>(&query)
            .bind(filter.now.timestamp() as f64)
            .bind(filter.post_id)
            .bind(filter.parent_id)
            .bind(keyset.cursor)
            .bind(keyset.limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(keyset.finish(rows))
    }

    async fn viewer_votes(
        &self,
        viewer_id: Uuid,
        reply_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, VoteType>, StorageError> {
        if reply_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(Uuid, i16)> = sqlx::query_as(
            "SELECT reply_id, vote_type FROM reply_votes WHERE user_id = $1 AND reply_id = ANY($2)",
        )
        .bind(viewer_id)
        .bind(reply_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(reply_id, vote_type)| {
                VoteType::from_i16(vote_type).map(|vote| (reply_id, vote))
            })
            .collect())
    }

    async fn create_reply(&self, reply: &NewReply) -> Result<Reply, StorageError> {
        let created = sqlx::query_as::<_, Reply>(&format!(
            r#"
            INSERT INTO replies (id, post_id, parent_id, author_id, content, status, created_at)
            VALUES ($1, $2, $3, $4, $5, 'active', $6)
            RETURNING {}
            "#,
            REPLY_COLUMNS
        ))
        .bind(reply.id)
        .bind(reply.post_id)
        .bind(reply.parent_id)
        .bind(reply.author_id)
        .bind(&reply.content)
        .bind(reply.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn set_reply_vote(
        &self,
        user_id: Uuid,
        reply_id: Uuid,
        vote: Option<VoteType>,
    ) -> Result<VoteResponse, StorageError> {
        let mut tx = self.pool.begin().await?;

        // Lock the reply so concurrent votes on it serialise.
        let exists = sqlx::query_scalar::<_, Uuid>("SELECT id FROM replies WHERE id = $1 FOR UPDATE")
            .bind(reply_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StorageError::NotFound(format!("reply {}", reply_id)));
        }

        let previous = sqlx::query_scalar::<_, i16>(
            "DELETE FROM reply_votes WHERE user_id = $1 AND reply_id = $2 RETURNING vote_type",
        )
        .bind(user_id)
        .bind(reply_id)
        .fetch_optional(&mut *tx)
        .await?
        .and_then(VoteType::from_i16);

        if let Some(vote) = vote {
            sqlx::query(
                "INSERT INTO reply_votes (user_id, reply_id, vote_type, created_at) VALUES ($1, $2, $3, NOW())",
            )
            .bind(user_id)
            .bind(reply_id)
            .bind(vote.as_i16())
            .execute(&mut *tx)
            .await?;
        }

        let (up, down) = tally_delta(previous, vote);
        let (upvotes, downvotes): (i64, i64) = sqlx::query_as(
            r#"
            UPDATE replies
            SET upvotes = upvotes + $1, downvotes = downvotes + $2
            WHERE id = $3
            RETURNING upvotes, downvotes
            "#,
        )
        .bind(up)
        .bind(down)
        .bind(reply_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(VoteResponse {
            user_vote: vote.map(|v| v.as_i16()),
            upvotes,
            downvotes,
        })
    }

    async fn set_reply_status(&self, change: &StatusChange) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE replies SET status = $1 WHERE id = $2")
            .bind(change.status)
            .bind(change.reply_id)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("reply {}", change.reply_id)));
        }

        let action = &change.action;
        sqlx::query(
            r#"
            INSERT INTO mod_actions (id, community_id, moderator_id, kind, target_id, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(action.id)
        .bind(action.community_id)
        .bind(action.moderator_id)
        .bind(action.kind)
        .bind(action.target_id)
        .bind(&action.reason)
        .bind(action.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    // --- Communities ---------------------------------------------------------

    async fn get_community_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Community>, StorageError> {
        let community = sqlx::query_as::<_, Community>(
            "SELECT id, name, display_name, description, created_at FROM communities WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(community)
    }

    async fn list_communities(&self, seek: &Seek<Uuid>) -> Result<Vec<Community>, StorageError> {
        let keyset = Keyset::from_seek(seek);

        let query = format!(
            r#"
            SELECT id, name, display_name, description, created_at
            FROM communities
            WHERE $1::uuid IS NULL OR id {op} (SELECT id FROM communities WHERE id = $1)
            ORDER BY id {order}
            LIMIT $2
            "#,
            op = keyset.op,
            order = keyset.order,
        );

        let rows = sqlx::query_as::<_, Community>(&query)
            .bind(keyset.cursor)
            .bind(keyset.limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(keyset.finish(rows))
    }

    async fn list_posts(
        &self,
        community_id: Uuid,
        sort: SortMode,
        now: DateTime<Utc>,
        seek: &Seek<Uuid>,
    ) -> Result<Vec<PostListItem>, StorageError> {
        let keyset = Keyset::from_seek(seek);

        let query = format!(
            r#"
            WITH scored AS (
                SELECT
                    p.id, p.community_id, p.author_id, p.title, p.content, p.status,
                    p.upvotes, p.downvotes, p.created_at,
                    u.username AS author_username,
                    (SELECT COUNT(*) FROM replies r WHERE r.post_id = p.id) AS reply_count,
                    {score} AS sort_score
                FROM posts p
                LEFT JOIN users u ON p.author_id = u.id
                WHERE p.community_id = $2 AND p.status = 'active'
            )
            SELECT {columns}, author_username, reply_count
            FROM scored
            WHERE $3::uuid IS NULL
               OR (sort_score, id) {op} (SELECT sort_score, id FROM scored WHERE id = $3)
            ORDER BY sort_score {order}, id {order}
            LIMIT $4
            "#,
            score = score_sql(sort, "p.upvotes", "p.downvotes"),
            columns = POST_COLUMNS,
            op = keyset.op,
            order = keyset.order,
        );

        let rows = sqlx::query_as::<_, PostListItem>(&query)
            .bind(now.timestamp() as f64)
            .bind(community_id)
            .bind(keyset.cursor)
            .bind(keyset.limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(keyset.finish(rows))
    }

    async fn list_mod_actions(
        &self,
        community_id: Uuid,
        seek: &Seek<Uuid>,
    ) -> Result<Vec<ModAction>, StorageError> {
        let keyset = Keyset::from_seek(seek);

        let query = format!(
            r#"
            SELECT id, community_id, moderator_id, kind, target_id, reason, created_at
            FROM mod_actions
            WHERE community_id = $1
              AND ($2::uuid IS NULL OR id {op} (SELECT id FROM mod_actions WHERE id = $2 AND community_id = $1))
            ORDER BY id {order}
            LIMIT $3
            "#,
            op = keyset.op,
            order = keyset.order,
        );

        let rows = sqlx::query_as::<_, ModAction>(&query)
            .bind(community_id)
            .bind(keyset.cursor)
            .bind(keyset.limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(keyset.finish(rows))
    }

    async fn membership_role(
        &self,
        user_id: Uuid,
        community_id: Uuid,
    ) -> Result<Option<MembershipRole>, StorageError> {
        let role = sqlx::query_scalar::<_, MembershipRole>(
            "SELECT role FROM community_memberships WHERE user_id = $1 AND community_id = $2",
        )
        .bind(user_id)
        .bind(community_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(role)
    }
}
