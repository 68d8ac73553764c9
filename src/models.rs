//! Data models for archive listings, full posts, and captured browser sessions.
//!
//! This module defines the wire shapes the archiver reads:
//! - [`PostSummary`]: one entry of a paged `/api/v1/archive` listing
//! - [`Post`]: the full representation returned by `/api/v1/posts/{slug}`
//! - [`SessionState`]: an exported browser session (cookies, storage, user agent)
//!
//! Every field the remote service may omit is defaulted so that a sparse
//! payload still deserializes; emptiness is judged later by the pipeline.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The kind of post as reported by the archive listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Newsletter,
    Podcast,
    Thread,
    Video,
    /// Any type this archiver does not know about.
    #[default]
    #[serde(other)]
    Other,
}

/// A single entry of the archive listing.
///
/// Summaries are only used to decide what to fetch next; they are never
/// persisted.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostSummary {
    /// Unique within one newsletter. Entries without a slug cannot be fetched.
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(rename = "type", default)]
    pub post_type: PostType,
    #[serde(default)]
    pub podcast_url: Option<String>,
}

impl PostSummary {
    /// A summary is a podcast when its type says so or when it carries a
    /// podcast URL. An empty URL string counts as absent.
    pub fn is_podcast(&self) -> bool {
        self.post_type == PostType::Podcast
            || self
                .podcast_url
                .as_deref()
                .is_some_and(|url| !url.trim().is_empty())
    }
}

/// A fully fetched post.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Post {
    pub slug: String,
    #[serde(default = "default_title")]
    pub title: String,
    /// ISO-8601 timestamp, e.g. `2024-01-05T00:00:00.000Z`.
    #[serde(default)]
    pub post_date: String,
    /// Raw body markup. `null` (paywalled or audio-only posts) reads as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body_html: String,
}

fn default_title() -> String {
    "Untitled".to_string()
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Post {
    /// `YYYY-MM-DD` date used in output filenames and metadata headers.
    ///
    /// Falls back to the text before `T` when the timestamp is not RFC 3339,
    /// and to `undated` when nothing is left.
    pub fn date_stamp(&self) -> String {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&self.post_date) {
            return parsed.date_naive().to_string();
        }
        let prefix = self.post_date.split('T').next().unwrap_or("").trim();
        if prefix.is_empty() {
            "undated".to_string()
        } else {
            prefix.to_string()
        }
    }

    pub fn has_body(&self) -> bool {
        !self.body_html.trim().is_empty()
    }
}

/// One cookie from an exported browser session.
///
/// Exporters write extra attributes (`expires`, `httpOnly`, `sameSite`, ...);
/// only the four needed to rebuild the identity are kept.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

/// Browser authentication state captured outside this program.
///
/// Read once at startup and never written back.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SessionState {
    #[serde(default)]
    pub cookies: Vec<SessionCookie>,
    #[serde(default)]
    pub local_storage: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub user_agent: Option<String>,
}
