//! Archive listing pagination.
//!
//! The archive endpoint exposes no total count, so the only reliable end of
//! collection signal is a page that comes back empty or shorter than the
//! window that was asked for. [`is_last_page`] encodes that rule; the
//! orchestrator owns the cursor.

use crate::client::ArchiveClient;
use crate::error::ScrapeError;
use crate::models::PostSummary;
use tracing::{debug, info, instrument};

/// API path of the paged archive listing.
pub const ARCHIVE_PATH: &str = "/api/v1/archive";

/// Fetch one window of the archive, newest first.
///
/// # Errors
///
/// Returns [`ScrapeError::Transport`] on network failure, non-success
/// status, or a body that is not a JSON array of summaries. Callers that
/// want the historical "empty page on failure" behavior should log the error
/// and treat it as an empty page.
#[instrument(level = "info", skip(client))]
pub async fn list_page(
    client: &ArchiveClient,
    limit: usize,
    offset: usize,
) -> Result<Vec<PostSummary>, ScrapeError> {
    let params = [
        ("sort", "new".to_string()),
        ("search", String::new()),
        ("offset", offset.to_string()),
        ("limit", limit.to_string()),
    ];
    let page: Vec<PostSummary> = client.get_json(ARCHIVE_PATH, &params).await?;
    info!(returned = page.len(), "Fetched archive page");
    debug!(slugs = ?page.iter().filter_map(|s| s.slug.as_deref()).collect::<Vec<_>>(), "Archive page slugs");
    Ok(page)
}

/// True when a page of `returned` items ends the collection for a request of
/// `requested` items.
pub fn is_last_page(requested: usize, returned: usize) -> bool {
    returned == 0 || returned < requested
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_is_last_page() {
        assert!(is_last_page(12, 0));
        assert!(is_last_page(12, 2));
        assert!(is_last_page(5, 4));
        assert!(!is_last_page(12, 12));
        // A server that ignores the limit and returns more is not the end.
        assert!(!is_last_page(3, 5));
    }

    #[tokio::test]
    async fn test_list_page_sends_window() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ARCHIVE_PATH))
            .and(query_param("sort", "new"))
            .and(query_param("search", ""))
            .and(query_param("offset", "24"))
            .and(query_param("limit", "12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"slug": "first", "type": "newsletter"},
                {"slug": "second", "type": "podcast", "podcast_url": "https://cdn/ep.mp3"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = ArchiveClient::new(&server.uri(), None).unwrap();
        let page = list_page(&client, 12, 24).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].slug.as_deref(), Some("first"));
        assert!(page[1].is_podcast());
    }

    #[tokio::test]
    async fn test_list_page_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ARCHIVE_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = ArchiveClient::new(&server.uri(), None).unwrap();
        let err = list_page(&client, 12, 0).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_list_page_rejects_non_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ARCHIVE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"error": "nope"})))
            .mount(&server)
            .await;

        let client = ArchiveClient::new(&server.uri(), None).unwrap();
        assert!(list_page(&client, 12, 0).await.is_err());
    }
}
