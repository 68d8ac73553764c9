//! Markdown rendering with a YAML metadata header.
//!
//! ```text
//! ---
//! title: Hello
//! date: 2024-01-05
//! url: https://example.substack.com/p/hello
//! ---
//!
//! # Hello
//!
//! Body text ![](assets/a.png)
//! ```

use super::LocalizedDocument;
use crate::error::ScrapeError;
use htmd::HtmlToMarkdown;
use htmd::options::{HeadingStyle, Options};
use serde::Serialize;

/// Metadata written ahead of the Markdown body.
#[derive(Debug, Serialize)]
pub struct FrontMatter<'a> {
    pub title: &'a str,
    pub date: String,
    pub url: String,
}

/// Convert body markup to Markdown with `#`-prefixed headings.
pub fn html_to_markdown(html: &str) -> Result<String, ScrapeError> {
    let converter = HtmlToMarkdown::builder()
        .options(Options {
            heading_style: HeadingStyle::Atx,
            ..Default::default()
        })
        .build();
    converter
        .convert(html)
        .map_err(|e| ScrapeError::Markdown(e.to_string()))
}

/// An ATX heading ends at the first line break.
fn heading_text(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Markdown document for one post.
pub fn render_markdown(doc: &LocalizedDocument<'_>) -> Result<String, ScrapeError> {
    let front_matter = FrontMatter {
        title: &doc.post.title,
        date: doc.post.date_stamp(),
        url: doc.canonical_url(),
    };
    let header = serde_yaml::to_string(&front_matter)?;
    let body = html_to_markdown(&doc.body_html)?;
    Ok(format!(
        "---\n{}---\n\n# {}\n\n{}\n",
        header,
        heading_text(&doc.post.title),
        body.trim()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Post;

    #[test]
    fn test_html_to_markdown_uses_atx_headings() {
        let md = html_to_markdown("<h2>Section</h2><p>Some <strong>bold</strong> text.</p>").unwrap();
        assert!(md.contains("## Section"));
        assert!(md.contains("**bold**"));
    }

    #[test]
    fn test_render_markdown() {
        let post = Post {
            slug: "hello".to_string(),
            title: "Hello: a post".to_string(),
            post_date: "2024-01-05T00:00:00Z".to_string(),
            body_html: String::new(),
        };
        let doc = LocalizedDocument {
            post: &post,
            body_html: r#"<p>Look</p><img src="assets/a.png" alt="chart">"#.to_string(),
            base_url: "https://example.substack.com",
        };
        let md = render_markdown(&doc).unwrap();
        assert!(md.starts_with("---\n"));

        let header = md.split("---\n").nth(1).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(header).unwrap();
        assert_eq!(parsed["title"].as_str(), Some("Hello: a post"));
        assert_eq!(parsed["date"].as_str(), Some("2024-01-05"));
        assert_eq!(
            parsed["url"].as_str(),
            Some("https://example.substack.com/p/hello")
        );

        assert!(md.contains("# Hello: a post"));
        assert!(md.contains("Look"));
        assert!(md.contains("assets/a.png"));
    }

    #[test]
    fn test_multiline_title_stays_one_heading() {
        let post = Post {
            slug: "split".to_string(),
            title: "Part one\n  and\r\npart two ".to_string(),
            post_date: "2024-01-05T00:00:00Z".to_string(),
            body_html: String::new(),
        };
        let doc = LocalizedDocument {
            post: &post,
            body_html: "<p>Body</p>".to_string(),
            base_url: "https://example.substack.com",
        };
        let md = render_markdown(&doc).unwrap();
        assert!(md.contains("\n# Part one and part two\n\nBody"));

        let header = md.split("---\n").nth(1).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(header).unwrap();
        assert_eq!(parsed["title"].as_str(), Some("Part one\n  and\r\npart two "));
    }
}
