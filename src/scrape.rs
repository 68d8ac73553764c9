//! The scrape loop: page through the archive and archive every post.
//!
//! # State machine
//!
//! ```text
//! Paging(offset) ──page empty──────────────────────────▶ Done
//!      │
//!      └──page──▶ Processing(page, offset) ──short page / limit──▶ Done
//!                       │
//!                       └──full page──▶ Paging(offset + page.len())
//! ```
//!
//! The offset always advances by the number of summaries the server
//! returned, never by the number archived: remote positions do not move when
//! posts are skipped locally.
//!
//! Per post: podcast filter, item limit, fixed delay, fetch, localize images,
//! write documents. A failure on one post is logged and counted, and the run
//! moves on unless `fail_fast` is set.

use crate::archive::{is_last_page, list_page};
use crate::assets::{ASSETS_DIR_NAME, AssetLocalizer};
use crate::client::ArchiveClient;
use crate::error::ScrapeError;
use crate::models::PostSummary;
use crate::outputs::{LocalizedDocument, OutputFormats, materialize};
use crate::posts::fetch_post;
use crate::utils::ensure_writable_dir;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Archive page size used when no limit makes a smaller window necessary.
pub const DEFAULT_BATCH_SIZE: usize = 12;

/// Pause before each full-post request.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Everything the scrape loop needs besides the client.
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    /// Directory for this newsletter's documents; `assets/` lives inside it.
    pub output_dir: PathBuf,
    /// Stop after this many posts have been archived.
    pub limit: Option<usize>,
    pub skip_podcasts: bool,
    pub formats: OutputFormats,
    pub batch_size: usize,
    pub delay: Duration,
    /// Propagate the first failure instead of logging it and moving on.
    pub fail_fast: bool,
}

impl ScrapeOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            limit: None,
            skip_podcasts: false,
            formats: OutputFormats::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            delay: DEFAULT_DELAY,
            fail_fast: false,
        }
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.output_dir.join(ASSETS_DIR_NAME)
    }
}

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeReport {
    /// Archive pages requested, including the final empty or failed one.
    pub pages: usize,
    /// Summaries returned across all pages.
    pub listed: usize,
    /// Offset the next page request would have used.
    pub next_offset: usize,
    /// Posts fetched, localized, and rendered.
    pub materialized: usize,
    pub files_written: usize,
    /// Images localized per archived post, summed; an image shared by two
    /// posts counts twice but is downloaded once.
    pub images: usize,
    pub skipped_podcasts: usize,
    /// Summaries without a slug and posts without body content.
    pub absent: usize,
    /// Posts whose fetch, localization, or write failed.
    pub failed: usize,
    /// Archive pages that failed and ended the run early.
    pub page_errors: usize,
}

struct ArchivedPost {
    files: Vec<PathBuf>,
    images: usize,
}

enum CrawlState {
    Paging {
        offset: usize,
    },
    Processing {
        page: Vec<PostSummary>,
        requested: usize,
        offset: usize,
    },
    Done,
}

/// Drives pagination and per-post archiving for one newsletter.
#[derive(Debug)]
pub struct Scraper<'a> {
    client: &'a ArchiveClient,
    options: ScrapeOptions,
    localizer: AssetLocalizer<'a>,
}

impl<'a> Scraper<'a> {
    pub fn new(client: &'a ArchiveClient, options: ScrapeOptions) -> Self {
        let localizer = AssetLocalizer::new(client, options.assets_dir());
        Self {
            client,
            options,
            localizer,
        }
    }

    fn limit_reached(&self, report: &ScrapeReport) -> bool {
        self.options
            .limit
            .is_some_and(|limit| report.materialized >= limit)
    }

    /// Page size for the next request: the batch size, shrunk to what is left
    /// of the limit.
    fn window(&self, report: &ScrapeReport) -> usize {
        let batch = self.options.batch_size.max(1);
        match self.options.limit {
            Some(limit) => batch.min(limit.saturating_sub(report.materialized)),
            None => batch,
        }
    }

    /// Run to completion and report totals.
    ///
    /// # Errors
    ///
    /// Fails before any request if the output tree cannot be created. With
    /// `fail_fast`, also returns the first page or post failure.
    #[instrument(level = "info", skip_all, fields(base_url = %self.client.base(), output_dir = %self.options.output_dir.display()))]
    pub async fn run(&self) -> Result<ScrapeReport, ScrapeError> {
        ensure_writable_dir(&self.options.output_dir).await?;
        ensure_writable_dir(self.localizer.assets_dir()).await?;

        if self.options.formats.is_conflict() {
            warn!(error = %ScrapeError::ConfigurationConflict, "Posts will be fetched but not written");
        }
        info!(
            limit = ?self.options.limit,
            batch_size = self.options.batch_size,
            skip_podcasts = self.options.skip_podcasts,
            "Starting scrape"
        );

        let mut report = ScrapeReport::default();
        let mut state = CrawlState::Paging { offset: 0 };
        loop {
            state = match state {
                CrawlState::Paging { offset } => {
                    if self.limit_reached(&report) {
                        CrawlState::Done
                    } else {
                        let requested = self.window(&report);
                        info!(offset, requested, "Fetching posts {} to {}", offset, offset + requested);
                        report.pages += 1;
                        report.next_offset = offset;
                        let page = match list_page(self.client, requested, offset).await {
                            Ok(page) => page,
                            Err(e) if self.options.fail_fast => return Err(e),
                            Err(e) => {
                                error!(offset, error = %e, "Archive page failed; ending scrape");
                                report.page_errors += 1;
                                Vec::new()
                            }
                        };
                        if page.is_empty() {
                            CrawlState::Done
                        } else {
                            CrawlState::Processing {
                                page,
                                requested,
                                offset,
                            }
                        }
                    }
                }
                CrawlState::Processing {
                    page,
                    requested,
                    offset,
                } => {
                    let returned = page.len();
                    report.listed += returned;
                    for (index, summary) in page.iter().enumerate() {
                        if self.limit_reached(&report) {
                            info!(limit = ?self.options.limit, "Reached post limit");
                            break;
                        }
                        debug!(index, returned, "Processing summary");
                        self.process(summary, &mut report).await?;
                    }

                    let next = offset + returned;
                    report.next_offset = next;
                    if self.limit_reached(&report) || is_last_page(requested, returned) {
                        CrawlState::Done
                    } else {
                        CrawlState::Paging { offset: next }
                    }
                }
                CrawlState::Done => break,
            };
        }

        info!(
            materialized = report.materialized,
            files = report.files_written,
            images = report.images,
            listed = report.listed,
            next_offset = report.next_offset,
            page_errors = report.page_errors,
            skipped_podcasts = report.skipped_podcasts,
            absent = report.absent,
            failed = report.failed,
            pages = report.pages,
            "Scraping complete. Downloaded {} posts.",
            report.materialized
        );
        Ok(report)
    }

    async fn process(
        &self,
        summary: &PostSummary,
        report: &mut ScrapeReport,
    ) -> Result<(), ScrapeError> {
        let Some(slug) = summary.slug.as_deref().filter(|s| !s.trim().is_empty()) else {
            debug!("Archive entry without a slug; skipping");
            report.absent += 1;
            return Ok(());
        };

        if self.options.skip_podcasts && summary.is_podcast() {
            info!(%slug, "Skipping podcast");
            report.skipped_podcasts += 1;
            return Ok(());
        }

        match self.archive_post(slug).await {
            Ok(archived) => {
                report.materialized += 1;
                report.files_written += archived.files.len();
                report.images += archived.images;
                info!(
                    %slug,
                    done = report.materialized,
                    files = archived.files.len(),
                    images = archived.images,
                    "Archived post"
                );
            }
            Err(ScrapeError::ContentAbsent { slug }) => {
                info!(%slug, "Post has no body content; nothing to archive");
                report.absent += 1;
            }
            Err(e) if self.options.fail_fast => return Err(e),
            Err(e) if e.is_transport() => {
                warn!(%slug, error = %e, "Could not fetch post; continuing");
                report.failed += 1;
            }
            Err(e) => {
                error!(%slug, error = %e, "Failed to archive post; continuing");
                report.failed += 1;
            }
        }
        Ok(())
    }

    /// Fetch, localize, and write one post.
    async fn archive_post(&self, slug: &str) -> Result<ArchivedPost, ScrapeError> {
        if !self.options.delay.is_zero() {
            sleep(self.options.delay).await;
        }

        let post = fetch_post(self.client, slug).await?;
        if !post.has_body() {
            return Err(ScrapeError::ContentAbsent {
                slug: slug.to_string(),
            });
        }

        let localized = self.localizer.localize(&post.body_html).await;
        let images = localized.images.len();
        let doc = LocalizedDocument::new(&post, localized, self.client.base());
        let files = materialize(&doc, &self.options.output_dir, self.options.formats).await?;
        Ok(ArchivedPost { files, images })
    }
}
