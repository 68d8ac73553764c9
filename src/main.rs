//! # Substack Archiver
//!
//! Pulls every post of a Substack newsletter through its archive API and
//! stores each one as a self-contained local document, with images
//! downloaded next to it.
//!
//! ## Features
//!
//! - Walks the offset-paginated archive until a short or empty page
//! - Authenticates with a raw session cookie, an exported browser session,
//!   or the `SUBSTACK_SID` environment variable
//! - Localizes post images into a shared `assets/` directory
//! - Writes a reader-mode HTML document and/or Markdown with a YAML header
//!
//! ## Usage
//!
//! ```sh
//! substack_archiver --url https://example.substack.com --skip-podcasts
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Identity**: Resolve credentials into one authenticated client
//! 2. **Paging**: List archive pages, newest first
//! 3. **Fetching**: Look up each post by slug
//! 4. **Localizing**: Download images and rewrite the markup
//! 5. **Output**: Render HTML and Markdown under `archive/<domain>/`

use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod archive;
mod assets;
mod cli;
mod client;
mod error;
mod models;
mod outputs;
mod posts;
mod scrape;
mod utils;

use cli::Cli;
use client::{ArchiveClient, Credentials, SECRET_ENV_VAR};
use outputs::OutputFormats;
use scrape::{ScrapeOptions, Scraper};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("substack_archiver starting up");

    if let Err(e) = dotenvy::dotenv() {
        debug!(error = %e, "No .env file loaded");
    }

    let args = Cli::parse();
    debug!(?args.url, ?args.output_dir, ?args.session_dir, "Parsed CLI arguments");

    // ---- Identity ----
    let env_secret = std::env::var(SECRET_ENV_VAR).ok();
    let credentials = Credentials {
        secret: args.cookie.as_deref(),
        session_file: args.session_file.as_deref(),
        session_dir: &args.session_dir,
        env_secret: env_secret.as_deref(),
    };
    let (client, source) = ArchiveClient::authenticate(&args.url, &credentials)?;
    info!(?source, domain = %client.domain(), user_agent = %client.user_agent(), "Client ready");

    // ---- Scrape ----
    let options = ScrapeOptions {
        limit: args.limit.map(|l| l.get()),
        skip_podcasts: args.skip_podcasts,
        formats: OutputFormats::from_flags(args.html_only, args.md_only),
        batch_size: args.batch_size.get(),
        delay: Duration::from_millis(args.delay_ms),
        fail_fast: args.fail_fast,
        ..ScrapeOptions::new(args.output_dir.join(client.domain()))
    };
    let report = Scraper::new(&client, options).run().await?;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        materialized = report.materialized,
        images = report.images,
        failed = report.failed,
        "Execution complete"
    );

    Ok(())
}
