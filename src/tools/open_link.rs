//! `open_link`: fetch a page and extract what a researcher needs from it.
//!
//! Parsing uses `scraper` for the title and description and `html2text` for
//! the readable body.

use super::{PageFetcher, PageMetadata, ToolError, ToolOutput};
use crate::error::{Result, ShipShowError};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Raw HTML bytes read from the wire and handed to the parser.
const MAX_HTML_BYTES: usize = 1_000_000;

/// Page fetcher backed by a plain HTTP client.
pub struct HttpPageFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpPageFetcher {
    /// Create a fetcher that identifies itself with `user_agent` and returns at
    /// most `max_bytes` of extracted text.
    pub fn new(user_agent: &str, max_bytes: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ShipShowError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, max_bytes })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch(&self, url: &Url) -> std::result::Result<ToolOutput, ToolError> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ToolError::from_reqwest("Page fetch", e))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let mut raw = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ToolError::from_reqwest("Page fetch", e))?
        {
            if !push_capped(&mut raw, &chunk, MAX_HTML_BYTES) {
                debug!("Page exceeds {} bytes, stopped reading", MAX_HTML_BYTES);
                break;
            }
        }
        let body = String::from_utf8_lossy(&raw);

        if !status.is_success() {
            return Err(ToolError::from_status("Page fetch", status, &body));
        }

        debug!("Fetched {} bytes from {}", body.len(), url);

        let (title, description, content) = extract_page(&body, self.max_bytes);

        Ok(ToolOutput::Page {
            content,
            metadata: PageMetadata {
                url: url.to_string(),
                title,
                description,
                status_code: status.as_u16(),
                content_type,
            },
        })
    }
}

/// Append `chunk` to `buf` without growing it past `limit`. Returns false once
/// the limit has been reached.
fn push_capped(buf: &mut Vec<u8>, chunk: &[u8], limit: usize) -> bool {
    let room = limit.saturating_sub(buf.len());
    if chunk.len() >= room {
        buf.extend_from_slice(&chunk[..room]);
        return false;
    }
    buf.extend_from_slice(chunk);
    true
}

/// Extract `(title, description, text)` from an HTML document.
///
/// Documents longer than the read limit are cut before parsing. The title
/// comes from `<title>`, falling back to `og:title`. The text is truncated to
/// `max_bytes` on a character boundary.
pub fn extract_page(html: &str, max_bytes: usize) -> (String, Option<String>, String) {
    let html = truncate_str(html, MAX_HTML_BYTES);
    let document = Html::parse_document(html);

    let title = element_text(&document, "title")
        .or_else(|| meta_content(&document, r#"meta[property="og:title"]"#))
        .unwrap_or_default();

    let description = meta_content(&document, r#"meta[name="description"]"#)
        .or_else(|| meta_content(&document, r#"meta[property="og:description"]"#));

    let text = html2text::from_read(html.as_bytes(), 100).unwrap_or_default();
    let text = clean_text(&text);

    (title, description, truncate_str(&text, max_bytes).to_string())
}

fn element_text(doc: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    let element = doc.select(&selector).next()?;
    let text = collapse_whitespace(&element.text().collect::<String>());
    (!text.is_empty()).then_some(text)
}

fn meta_content(doc: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    let content = doc.select(&selector).next()?.value().attr("content")?;
    let text = collapse_whitespace(content);
    (!text.is_empty()).then_some(text)
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trim each line and keep at most one blank line between blocks.
fn clean_text(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut blank = false;
    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if !blank && !result.is_empty() {
                result.push('\n');
            }
            blank = true;
        } else {
            blank = false;
            result.push_str(line);
            result.push('\n');
        }
    }
    result.trim().to_string()
}

fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
