//! Full post lookup by slug.

use crate::client::ArchiveClient;
use crate::error::ScrapeError;
use crate::models::Post;
use crate::utils::truncate_for_log;
use tracing::{debug, info, instrument};

/// Fetch the full representation of one post.
///
/// One failed lookup must not end the run, so the caller decides what to do
/// with the error; nothing here retries.
#[instrument(level = "info", skip(client))]
pub async fn fetch_post(client: &ArchiveClient, slug: &str) -> Result<Post, ScrapeError> {
    let path = format!("/api/v1/posts/{}", urlencoding::encode(slug));
    let post: Post = client.get_json(&path, &[]).await?;
    info!(
        title = %post.title,
        post_date = %post.post_date,
        body_bytes = post.body_html.len(),
        "Fetched post"
    );
    debug!(preview = %truncate_for_log(&post.body_html, 200), "Post body");
    Ok(post)
}
