//! Command-line interface definitions for the Substack archiver.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! The raw session secret can also come from the `SUBSTACK_SID` environment
//! variable (or a `.env` file), but only after every session descriptor has
//! been tried, so it is resolved in `main` rather than declared here.

use clap::Parser;
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Command-line arguments for the Substack archiver.
///
/// # Examples
///
/// ```sh
/// # Public posts only, both formats
/// substack_archiver --url https://example.substack.com
///
/// # Paid archive with an exported browser session, Markdown only
/// substack_archiver --url https://www.example.com --session-dir ~/.sessions --md-only
///
/// # First 20 text posts using a copied cookie
/// substack_archiver --url https://example.substack.com --cookie 's%3A...' --limit 20 --skip-podcasts
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Base URL of the newsletter (e.g. https://read.substack.com)
    #[arg(short, long)]
    pub url: String,

    /// Raw session cookie value; overrides session files and SUBSTACK_SID
    #[arg(long)]
    pub cookie: Option<String>,

    /// Stop after archiving this many posts
    #[arg(short, long)]
    pub limit: Option<NonZeroUsize>,

    /// Skip podcast episodes
    #[arg(long)]
    pub skip_podcasts: bool,

    /// Write only the HTML document for each post
    #[arg(long)]
    pub html_only: bool,

    /// Write only the Markdown document for each post
    #[arg(long)]
    pub md_only: bool,

    /// Root output directory; posts land in `<output-dir>/<domain>/`
    #[arg(short, long, default_value = "archive")]
    pub output_dir: PathBuf,

    /// Directory searched for substack_session_<domain>.json and substack_session.json
    #[arg(long, default_value = ".", env = "SUBSTACK_SESSION_DIR")]
    pub session_dir: PathBuf,

    /// Session descriptor to try before the ones in --session-dir
    #[arg(long)]
    pub session_file: Option<PathBuf>,

    /// Posts requested per archive page
    #[arg(long, default_value = "12")]
    pub batch_size: NonZeroUsize,

    /// Pause before each post request, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub delay_ms: u64,

    /// Abort on the first failed page or post instead of skipping it
    #[arg(long)]
    pub fail_fast: bool,
}
