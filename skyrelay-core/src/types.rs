use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Listing order requested from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    Hot,
    New,
    Top,
    Rising,
}

impl FilterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterType::Hot => "hot",
            FilterType::New => "new",
            FilterType::Top => "top",
            FilterType::Rising => "rising",
        }
    }
}

/// Time window for `top` listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    All,
    Day,
    Hour,
    Month,
    Week,
    Year,
}

impl TimeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::All => "all",
            TimeFilter::Day => "day",
            TimeFilter::Hour => "hour",
            TimeFilter::Month => "month",
            TimeFilter::Week => "week",
            TimeFilter::Year => "year",
        }
    }
}

/// One configured harvest query.
///
/// `batch_size` and `timeout` are already resolved against the global
/// defaults; see [`crate::config::SourceEntry::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub source_name: String,
    pub filter_type: FilterType,
    pub time_filter: Option<TimeFilter>,
    pub limit: u32,
    pub download_comments: bool,
    pub max_comments: usize,
    pub skip_no_media: bool,
    pub batch_size: usize,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: String,
    pub source_name: String,
    pub title: String,
    pub body_url: String,
    pub selftext: Option<String>,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub score: i64,
    pub media_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub author: String,
    pub body: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub stickied: bool,
}

/// Drops stickied comments, orders by score descending and keeps at most `max`.
///
/// The sort is stable, so comments with equal scores keep the source order.
pub fn rank_comments(comments: Vec<CommentRecord>, max: usize) -> Vec<CommentRecord> {
    let mut ranked: Vec<CommentRecord> = comments.into_iter().filter(|c| !c.stickied).collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked.truncate(max);
    ranked
}

/// Identifier of a unit: `{source_name}_{post_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId {
    source_name: String,
    post_id: String,
}

impl UnitId {
    pub fn new(source_name: &str, post_id: &str) -> Self {
        Self {
            source_name: source_name.to_string(),
            post_id: post_id.to_string(),
        }
    }

    /// Parses a directory name back into an id.
    ///
    /// Source names may contain `_`, post ids never do, so the split is on the last one.
    pub fn parse(raw: &str) -> Option<Self> {
        let (source_name, post_id) = raw.rsplit_once('_')?;
        if source_name.is_empty() || post_id.is_empty() {
            return None;
        }
        Some(Self::new(source_name, post_id))
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn belongs_to(&self, source_name: &str) -> bool {
        self.source_name == source_name
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.source_name, self.post_id)
    }
}

/// A committed unit as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub unit_id: UnitId,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub source_url: String,
    pub summary: Option<String>,
    pub comments: Vec<CommentRecord>,
    pub media: Vec<PathBuf>,
}

impl Unit {
    pub fn creation_date(&self) -> NaiveDate {
        self.created_at.date_naive()
    }

    pub fn is_empty(&self) -> bool {
        self.media.is_empty() && self.summary.is_none()
    }
}

/// What the publisher receives for one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub unit_id: UnitId,
    pub text: String,
    pub media: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub uri: String,
    pub cid: String,
}

/// Cuts `text` to at most `max_chars` characters, ending in `...` when shortened.
pub fn truncate_summary(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return text.chars().take(max_chars).collect();
    }
    let mut out: String = text.chars().take(max_chars - 3).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn comment(score: i64, stickied: bool) -> CommentRecord {
        CommentRecord {
            author: format!("user{}", score),
            body: format!("body {}", score),
            score,
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            stickied,
        }
    }

    #[test]
    fn test_rank_comments_drops_stickied_and_sorts() {
        let ranked = rank_comments(
            vec![comment(3, false), comment(9, false), comment(1, false), comment(100, true)],
            5,
        );
        let scores: Vec<i64> = ranked.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![9, 3, 1]);
    }

    #[test]
    fn test_rank_comments_respects_max() {
        let ranked = rank_comments(vec![comment(1, false), comment(2, false), comment(3, false)], 2);
        let scores: Vec<i64> = ranked.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![3, 2]);
    }

    #[test]
    fn test_truncate_summary() {
        assert_eq!(truncate_summary("short", 250), "short");
        let long = "x".repeat(300);
        let cut = truncate_summary(&long, 250);
        assert_eq!(cut.chars().count(), 250);
        assert!(cut.ends_with("..."));
        // Multi-byte characters are counted as characters, not bytes.
        let emoji = "🚀".repeat(10);
        assert_eq!(truncate_summary(&emoji, 5), "🚀🚀...");
    }

    #[test]
    fn test_unit_id_round_trips_through_directory_name() {
        let id = UnitId::new("rust_gamedev", "abc123");
        assert_eq!(id.to_string(), "rust_gamedev_abc123");
        assert_eq!(UnitId::parse("rust_gamedev_abc123"), Some(id.clone()));
        assert!(id.belongs_to("rust_gamedev"));
        assert!(!id.belongs_to("rust"));
        assert_eq!(UnitId::parse("nounderscore"), None);
        assert_eq!(UnitId::parse("trailing_"), None);
    }
}
