use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Up,
    Down,
}

impl VoteType {
    /// `-1` / `1` as stored in `reply_votes.vote_type`; `0` means no vote.
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            1 => Some(VoteType::Up),
            -1 => Some(VoteType::Down),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> i16 {
        match self {
            VoteType::Up => 1,
            VoteType::Down => -1,
        }
    }
}

/// Change in `(upvotes, downvotes)` when a user's vote on one target moves
/// from `previous` to `next`.
pub fn tally_delta(previous: Option<VoteType>, next: Option<VoteType>) -> (i64, i64) {
    let mut delta = (0, 0);
    for (vote, step) in [(previous, -1), (next, 1)] {
        match vote {
            Some(VoteType::Up) => delta.0 += step,
            Some(VoteType::Down) => delta.1 += step,
            None => {}
        }
    }
    delta
}

// Vote request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub vote_type: i16, // -1 for downvote, 0 for remove vote, 1 for upvote
}

// Vote response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub user_vote: Option<i16>,
    pub upvotes: i64,
    pub downvotes: i64,
}
