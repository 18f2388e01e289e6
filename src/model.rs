//! Data models for stored tweets and incoming webhook payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored tweet row.
///
/// Uniqueness is the triple `(user_name, link_to_tweet, text)`, enforced by
/// the database once the unique-constraint migration has been applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tweet {
    pub id: i64,
    pub user_name: String,
    pub link_to_tweet: String,
    /// Original `CreatedAt` string as IFTTT sent it.
    pub created_at: String,
    /// Parsed form of `created_at`, when parseable.
    pub created_at_parsed: Option<DateTime<Utc>>,
    pub text: String,
    /// When this server received the tweet.
    pub received_at: Option<String>,
}

/// The IFTTT webhook payload for a Twitter post notification.
///
/// Field names match the IFTTT ingredient keys exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingTweet {
    #[serde(rename = "UserName", default)]
    pub user_name: String,
    #[serde(rename = "LinkToTweet", default)]
    pub link_to_tweet: String,
    #[serde(rename = "Text", default)]
    pub text: String,
    #[serde(rename = "CreatedAt", default)]
    pub created_at: String,
}

/// Outcome of attempting to store an incoming tweet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was created with this id.
    Inserted(i64),
    /// The database's unique constraint rejected the row; the existing row
    /// stays untouched.
    Duplicate,
}

/// A search hit with an optional semantic similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub tweet: Tweet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}
