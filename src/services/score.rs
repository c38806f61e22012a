use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// z-score for an 80% confidence interval
const WILSON_Z: f64 = 1.281551565545;

const HOT_TIME_DIVISOR: f64 = 100_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Hot,
    Top,
    Best,
    Controversial,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Hot => "hot",
            SortMode::Top => "top",
            SortMode::Best => "best",
            SortMode::Controversial => "controversial",
        }
    }
}

impl FromStr for SortMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hot" => Ok(SortMode::Hot),
            "top" => Ok(SortMode::Top),
            "best" => Ok(SortMode::Best),
            "controversial" => Ok(SortMode::Controversial),
            _ => Err(format!("Unknown sort: {}", s)),
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ranking scalar for a reply or post. `now` is captured once per request so
/// every row of one response shares the same hot time term.
pub fn score(mode: SortMode, upvotes: i64, downvotes: i64, now: DateTime<Utc>) -> f64 {
    match mode {
        SortMode::Hot => hot(upvotes, downvotes, now),
        SortMode::Top => top(upvotes, downvotes),
        SortMode::Best => best(upvotes, downvotes),
        SortMode::Controversial => controversial(upvotes, downvotes),
    }
}

pub fn top(upvotes: i64, downvotes: i64) -> f64 {
    (upvotes - downvotes) as f64
}

/// Uses the request time, not the posting time, so the time term is a
/// constant offset within one request.
pub fn hot(upvotes: i64, downvotes: i64, now: DateTime<Utc>) -> f64 {
    let diff = upvotes - downvotes;
    let order = (diff.abs().max(1) as f64).log10();
    let sign = diff.signum() as f64;
    sign * order + now.timestamp() as f64 / HOT_TIME_DIVISOR
}

/// Lower bound of the Wilson score interval for the upvote ratio.
pub fn best(upvotes: i64, downvotes: i64) -> f64 {
    let n = (upvotes + downvotes) as f64;
    if n == 0.0 {
        return 0.0;
    }

    let z = WILSON_Z;
    let p = upvotes as f64 / n;
    let left = p + z * z / (2.0 * n);
    let right = z * ((p * (1.0 - p) + z * z / (4.0 * n)) / n).sqrt();
    let under = 1.0 + z * z / n;

    (left - right) / under
}

pub fn controversial(upvotes: i64, downvotes: i64) -> f64 {
    if upvotes <= 0 && downvotes <= 0 {
        return 0.0;
    }

    let magnitude = (upvotes + downvotes) as f64;
    let balance = upvotes.min(downvotes) as f64 / upvotes.max(downvotes) as f64;
    magnitude.powf(balance)
}
