//! Standalone HTML rendering.
//!
//! The document embeds a small reader-mode stylesheet so that it reads well
//! when opened straight from disk, with images resolved relative to the file.

use super::LocalizedDocument;

const READER_CSS: &str = r#"
body {
    max-width: 42rem;
    margin: 2rem auto;
    padding: 0 1rem;
    font-family: Georgia, "Times New Roman", serif;
    font-size: 1.125rem;
    line-height: 1.6;
    color: #222;
    background: #fdfdfb;
}
h1, h2, h3, h4 { font-family: -apple-system, "Segoe UI", Helvetica, Arial, sans-serif; line-height: 1.25; }
img, video { max-width: 100%; height: auto; }
figure { margin: 1.5rem 0; }
figcaption { font-size: 0.9rem; color: #666; text-align: center; }
blockquote { margin: 1rem 0; padding-left: 1rem; border-left: 3px solid #ccc; color: #555; }
pre, code { font-family: Menlo, Consolas, monospace; font-size: 0.9rem; }
pre { overflow-x: auto; padding: 1rem; background: #f4f4f2; }
a { color: #1a5fb4; }
"#;

/// Escape text for use in element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Full HTML document for one post.
pub fn render_html(doc: &LocalizedDocument<'_>) -> String {
    let title = escape_html(&doc.post.title);
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n<title>{title}</title>\n<link rel=\"canonical\" href=\"{canonical}\">\n<style>{READER_CSS}</style>\n</head>\n<body>\n<article>\n<h1>{title}</h1>\n<p class=\"post-date\"><time datetime=\"{date}\">{date}</time></p>\n{body}\n</article>\n</body>\n</html>\n",
        canonical = escape_html(&doc.canonical_url()),
        date = escape_html(&doc.post.date_stamp()),
        body = doc.body_html,
    )
}
