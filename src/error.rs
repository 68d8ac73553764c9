//! Error taxonomy for the archive pipeline.
//!
//! Nothing in the pipeline is fatal on its own: the orchestrator decides
//! whether an error skips an item, ends a page, or (with `--fail-fast`)
//! aborts the run. The only conditions that stop a run outright are a base
//! URL that cannot be parsed and an output directory that cannot be created,
//! and both are detected before any request is sent.

use std::path::PathBuf;
use thiserror::Error;

/// Every failure the archiver can report.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Network failure, non-success HTTP status, or an undecodable response body.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A session descriptor could not be read or parsed.
    #[error("session descriptor {}: {reason}", path.display())]
    Credential { path: PathBuf, reason: String },

    /// A post (or summary) carried nothing to archive.
    #[error("post {slug} has no content to archive")]
    ContentAbsent { slug: String },

    /// `--html-only` and `--md-only` were both requested.
    #[error("--html-only and --md-only are mutually exclusive; no documents will be written")]
    ConfigurationConflict,

    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("markdown conversion failed: {0}")]
    Markdown(String),

    #[error("front matter serialization failed: {0}")]
    FrontMatter(#[from] serde_yaml::Error),
}

impl ScrapeError {
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.into(),
            source,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for failures of the remote service rather than of local state.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_error_names_path() {
        let err = ScrapeError::Credential {
            path: PathBuf::from("substack_session.json"),
            reason: "expected value at line 1 column 1".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("substack_session.json"));
        assert!(msg.contains("line 1"));
        assert!(!err.is_transport());
    }

    #[test]
    fn test_io_error_is_not_transport() {
        let err = ScrapeError::io(
            "/tmp/nope",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!err.is_transport());
        assert!(err.to_string().contains("/tmp/nope"));
    }
}
