//! Output generation for archived posts.
//!
//! A fetched post and its localized markup are combined into one
//! [`LocalizedDocument`]. Each renderer turns that value into the text of one
//! file; which renderers run is decided by [`OutputFormats`] alone.
//!
//! # Submodules
//!
//! - [`html`]: standalone reader-mode HTML document
//! - [`markdown`]: Markdown with a YAML metadata header
//!
//! # Output Structure
//!
//! ```text
//! archive/
//! └── example.substack.com/
//!     ├── 2024-01-05_hello world.html
//!     ├── 2024-01-05_hello world.md
//!     └── assets/
//!         └── a.png
//! ```
//!
//! Every write replaces the previous file, so re-running over unchanged posts
//! regenerates identical documents.

pub mod html;
pub mod markdown;

use crate::assets::LocalizedHtml;
use crate::error::ScrapeError;
use crate::models::Post;
use crate::utils::sanitize_slug;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

/// Which documents to write for each post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormats {
    pub html: bool,
    pub markdown: bool,
}

impl OutputFormats {
    /// Formats selected by the `--html-only` / `--md-only` flags.
    ///
    /// Setting both selects nothing; see [`OutputFormats::is_conflict`].
    pub fn from_flags(html_only: bool, md_only: bool) -> Self {
        Self {
            html: !md_only,
            markdown: !html_only,
        }
    }

    pub fn is_conflict(&self) -> bool {
        !self.html && !self.markdown
    }
}

impl Default for OutputFormats {
    fn default() -> Self {
        Self::from_flags(false, false)
    }
}

/// One post ready to render: metadata plus localized body markup.
#[derive(Debug, Clone)]
pub struct LocalizedDocument<'a> {
    pub post: &'a Post,
    pub body_html: String,
    /// Newsletter base URL without a trailing slash.
    pub base_url: &'a str,
}

impl<'a> LocalizedDocument<'a> {
    pub fn new(post: &'a Post, localized: LocalizedHtml, base_url: &'a str) -> Self {
        Self {
            post,
            body_html: localized.html,
            base_url,
        }
    }

    /// `{date}_{sanitized-slug}`, shared by every format.
    pub fn base_name(&self) -> String {
        output_base_name(self.post)
    }

    /// Canonical web address of the post.
    pub fn canonical_url(&self) -> String {
        format!("{}/p/{}", self.base_url, self.post.slug)
    }
}

/// A rendered file that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub filename: String,
    pub contents: String,
}

/// Filename stem for a post, e.g. `2024-01-05_hello world`.
pub fn output_base_name(post: &Post) -> String {
    format!("{}_{}", post.date_stamp(), sanitize_slug(&post.slug))
}

/// Render every selected format. Pure: nothing touches the filesystem.
///
/// A post without body content renders nothing.
pub fn render(
    doc: &LocalizedDocument<'_>,
    formats: OutputFormats,
) -> Result<Vec<Artifact>, ScrapeError> {
    if doc.body_html.trim().is_empty() {
        return Ok(Vec::new());
    }
    let base = doc.base_name();
    let mut artifacts = Vec::with_capacity(2);
    if formats.html {
        artifacts.push(Artifact {
            filename: format!("{base}.html"),
            contents: html::render_html(doc),
        });
    }
    if formats.markdown {
        artifacts.push(Artifact {
            filename: format!("{base}.md"),
            contents: markdown::render_markdown(doc)?,
        });
    }
    Ok(artifacts)
}

/// Render and write a post's documents into `output_dir`.
///
/// Returns the paths written, which is empty for a post without body content
/// or when no format is selected.
#[instrument(level = "info", skip_all, fields(slug = %doc.post.slug, output_dir = %output_dir.display()))]
pub async fn materialize(
    doc: &LocalizedDocument<'_>,
    output_dir: &Path,
    formats: OutputFormats,
) -> Result<Vec<PathBuf>, ScrapeError> {
    let artifacts = render(doc, formats)?;
    let mut written = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let path = output_dir.join(&artifact.filename);
        fs::write(&path, artifact.contents)
            .await
            .map_err(|e| ScrapeError::io(&path, e))?;
        info!(path = %path.display(), "Wrote document");
        written.push(path);
    }
    Ok(written)
}
