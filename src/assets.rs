//! Image localization for post bodies.
//!
//! Every `<img>` in a post body is downloaded once into the shared assets
//! directory and its `src` rewritten to the local copy. `srcset` is removed
//! from rewritten images, and the `<source>` siblings of a rewritten image
//! inside a `<picture>` are dropped, so that renderers cannot pick a remote
//! candidate instead of the local file.
//!
//! # Local filenames
//!
//! The name comes from the last path segment of the image URL (query string
//! dropped, percent-decoded, and reduced to `[A-Za-z0-9._-]`). CDN proxy URLs
//! embed the origin URL percent-encoded in that segment, so only the part
//! after its final `/` is kept. When no recognised image extension is left,
//! a synthetic `image_{unix-seconds}_{file-count}.jpg` name is used instead.
//!
//! An existing file with the chosen name is reused without a request. That
//! makes re-runs cheap, but a synthetic name is not stable across runs and two
//! different images sharing a filename resolve to whichever was saved first.

use crate::client::ArchiveClient;
use crate::error::ScrapeError;
use crate::utils::count_entries;
use chrono::Utc;
use futures::StreamExt;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use scraper::{Html, Selector};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Name of the assets directory inside each newsletter's output directory.
pub const ASSETS_DIR_NAME: &str = "assets";

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "svg", "avif", "bmp", "tiff",
];

// Quoted attribute values may contain a raw `>`.
static IMG_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<img\b(?:[^>"']|"[^"]*"|'[^']*')*>"#).unwrap());
static SOURCE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<source\b(?:[^>"']|"[^"]*"|'[^']*')*>"#).unwrap());
static PICTURE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<picture\b.*?</picture>").unwrap());
static SRC_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(\ssrc\s*=\s*)(?:"[^"]*"|'[^']*'|[^\s"'>]+)"#).unwrap());
static SRCSET_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\s+srcset\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+)"#).unwrap());
static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").unwrap());

/// Post markup after localization, plus the remote → local mapping applied.
#[derive(Debug, Clone, Default)]
pub struct LocalizedHtml {
    pub html: String,
    /// Absolute remote URL → path relative to the output directory.
    pub images: BTreeMap<String, String>,
}

/// Distinct `src` values of all images in `html`, in document order.
pub fn image_sources(html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(html);
    fragment
        .select(&IMG_SELECTOR)
        .filter_map(|img| img.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .map(str::to_string)
        .unique()
        .collect()
}

/// The decoded `src` of a single `<img ...>` tag.
fn tag_source(tag: &str) -> Option<String> {
    let fragment = Html::parse_fragment(tag);
    fragment
        .select(&IMG_SELECTOR)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .map(str::to_string)
}

/// Point every image whose `src` has a replacement at its local copy.
///
/// Rewritten tags lose their `srcset`, and a `<picture>` holding a rewritten
/// image loses its `<source>` elements. All other markup is left byte for byte.
pub fn rewrite_images(html: &str, replacements: &HashMap<String, String>) -> String {
    let rewritten = rewrite_img_tags(html, replacements);
    let local: HashSet<&str> = replacements.values().map(String::as_str).collect();
    PICTURE
        .replace_all(&rewritten, |caps: &Captures| {
            let block = &caps[0];
            let localized = IMG_TAG
                .find_iter(block)
                .filter_map(|m| tag_source(m.as_str()))
                .any(|src| local.contains(src.as_str()));
            if localized {
                SOURCE_TAG.replace_all(block, "").into_owned()
            } else {
                block.to_string()
            }
        })
        .into_owned()
}

fn rewrite_img_tags(html: &str, replacements: &HashMap<String, String>) -> String {
    IMG_TAG
        .replace_all(html, |caps: &Captures| {
            let tag = &caps[0];
            let Some(local) = tag_source(tag).and_then(|src| replacements.get(&src)) else {
                return tag.to_string();
            };
            let tag = SRC_ATTR.replace(tag, |attr: &Captures| format!("{}\"{}\"", &attr[1], local));
            SRCSET_ATTR.replace_all(&tag, "").into_owned()
        })
        .into_owned()
}

/// Absolute HTTP(S) URL for an image source, or `None` for `data:` URIs and
/// other schemes that are not downloadable.
pub fn resolve_source(base: &Url, src: &str) -> Option<Url> {
    let joined = base.join(src).ok()?;
    matches!(joined.scheme(), "http" | "https").then_some(joined)
}

/// Filename derived from the URL, if it names a recognised image type.
pub fn candidate_filename(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    let last = decoded.rsplit('/').next().unwrap_or_default();
    let last = last.split(['?', '#']).next().unwrap_or_default();
    let name: String = last
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    let ext = Path::new(&name).extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(name)
}

fn synthetic_filename(assets_dir: &Path) -> String {
    format!(
        "image_{}_{}.jpg",
        Utc::now().timestamp(),
        count_entries(assets_dir)
    )
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Downloads images into one assets directory on behalf of one client.
#[derive(Debug)]
pub struct AssetLocalizer<'a> {
    client: &'a ArchiveClient,
    assets_dir: PathBuf,
    /// Prefix of rewritten `src` values, i.e. the assets directory's name.
    link_prefix: String,
}

impl<'a> AssetLocalizer<'a> {
    pub fn new(client: &'a ArchiveClient, assets_dir: impl Into<PathBuf>) -> Self {
        let assets_dir = assets_dir.into();
        let link_prefix = assets_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ASSETS_DIR_NAME.to_string());
        Self {
            client,
            assets_dir,
            link_prefix,
        }
    }

    pub fn assets_dir(&self) -> &Path {
        &self.assets_dir
    }

    /// Download every image referenced by `html` and rewrite it to local paths.
    ///
    /// A failed download is logged and leaves that image pointing at its
    /// remote URL; the rest of the post is still localized.
    #[instrument(level = "info", skip_all, fields(assets_dir = %self.assets_dir.display()))]
    pub async fn localize(&self, html: &str) -> LocalizedHtml {
        let mut by_remote: HashMap<String, Option<String>> = HashMap::new();
        let mut replacements = HashMap::new();
        let mut images = BTreeMap::new();

        for src in image_sources(html) {
            let Some(remote) = resolve_source(self.client.base_url(), &src) else {
                debug!(%src, "Leaving non-HTTP image source as is");
                continue;
            };
            let key = remote.to_string();
            if !by_remote.contains_key(&key) {
                let local = match self.localize_one(&remote).await {
                    Ok(local) => Some(local),
                    Err(e) => {
                        warn!(url = %remote, error = %e, "Image download failed; keeping remote reference");
                        None
                    }
                };
                by_remote.insert(key.clone(), local);
            }
            if let Some(Some(local)) = by_remote.get(&key) {
                replacements.insert(src, local.clone());
                images.insert(key, local.clone());
            }
        }

        info!(images = images.len(), "Localized images");
        LocalizedHtml {
            html: rewrite_images(html, &replacements),
            images,
        }
    }

    async fn localize_one(&self, remote: &Url) -> Result<String, ScrapeError> {
        let filename =
            candidate_filename(remote).unwrap_or_else(|| synthetic_filename(&self.assets_dir));
        let dest = self.assets_dir.join(&filename);
        let link = format!("{}/{}", self.link_prefix, filename);

        if dest.exists() {
            debug!(path = %dest.display(), "Image already on disk; reusing");
            return Ok(link);
        }
        self.download(remote, &dest).await?;
        Ok(link)
    }

    /// Stream `url` into `dest`, going through a `.part` file so an
    /// interrupted transfer never occupies the final name.
    async fn download(&self, url: &Url, dest: &Path) -> Result<u64, ScrapeError> {
        fs::create_dir_all(&self.assets_dir)
            .await
            .map_err(|e| ScrapeError::io(&self.assets_dir, e))?;

        let response = self.client.get_raw(url).await?;
        let part = part_path(dest);
        match write_stream(response, url, &part).await {
            Ok(bytes) => {
                fs::rename(&part, dest)
                    .await
                    .map_err(|e| ScrapeError::io(dest, e))?;
                info!(%url, path = %dest.display(), bytes, "Saved image");
                Ok(bytes)
            }
            Err(e) => {
                let _ = fs::remove_file(&part).await;
                Err(e)
            }
        }
    }
}

async fn write_stream(
    response: reqwest::Response,
    url: &Url,
    part: &Path,
) -> Result<u64, ScrapeError> {
    let mut file = fs::File::create(part)
        .await
        .map_err(|e| ScrapeError::io(part, e))?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ScrapeError::transport(url.as_str(), e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| ScrapeError::io(part, e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| ScrapeError::io(part, e))?;
    Ok(written)
}
