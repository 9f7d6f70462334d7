//! HTTP content fetcher.
//!
//! Issues a capped, redirect-limited GET and extracts drop metadata from
//! the document head with regexes. No DOM parse: the fields we need
//! (Open Graph tags, `<title>`, canonical link) all live in well-formed
//! attribute soup near the top of the page, and a byte cap keeps us from
//! chewing on multi-megabyte bodies.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument};
use url::Url;

use dripfeed_core::defaults::{
    FETCH_MAX_BODY_BYTES, FETCH_MAX_REDIRECTS, FETCH_SUMMARY_MAX_CHARS, FETCH_TIMEOUT_SECS,
    FETCH_TITLE_MAX_CHARS,
};
use dripfeed_core::{ContentFetcher, DropType, Error, FetchedContent, Result};

const USER_AGENT: &str = concat!("dripfeed/", env!("CARGO_PKG_VERSION"));

/// Hosts whose pages are videos regardless of what their markup claims.
const VIDEO_HOSTS: &[&str] = &["youtube.com", "youtu.be", "vimeo.com"];

static META_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<meta\b[^>]*>").unwrap());
static LINK_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<link\b[^>]*>").unwrap());
static TITLE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static TAG_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)([a-z][a-z0-9:_-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());

/// Content fetcher backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpContentFetcher {
    client: Client,
    max_body_bytes: usize,
}

impl HttpContentFetcher {
    /// Create a fetcher with default timeout and body cap.
    pub fn new() -> Self {
        Self::with_config(FETCH_TIMEOUT_SECS, FETCH_MAX_BODY_BYTES)
    }

    /// Create a fetcher with an explicit timeout and body cap.
    pub fn with_config(timeout_secs: u64, max_body_bytes: usize) -> Self {
        info!(
            "Initializing HTTP fetcher: timeout={}s, body_cap={}B, max_redirects={}",
            timeout_secs, max_body_bytes, FETCH_MAX_REDIRECTS
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .redirect(Policy::limited(FETCH_MAX_REDIRECTS))
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            max_body_bytes,
        }
    }

    /// Create a fetcher from environment variables.
    ///
    /// Reads `FETCH_TIMEOUT_SECS` and `FETCH_MAX_BODY_BYTES`, falling back
    /// to the compiled defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let timeout_secs = std::env::var("FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(FETCH_TIMEOUT_SECS);
        let max_body_bytes = std::env::var("FETCH_MAX_BODY_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(FETCH_MAX_BODY_BYTES);

        Self::with_config(timeout_secs, max_body_bytes)
    }
}

impl Default for HttpContentFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    #[instrument(skip(self), fields(subsystem = "fetch", component = "http", op = "fetch"))]
    async fn fetch(&self, url: &str) -> Result<FetchedContent> {
        let started = Instant::now();

        let response = self.client.get(url).send().await?;
        let status = response.status();

        // 404/410 never heal; everything else non-2xx is worth a retry.
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(Error::InvalidInput(format!("{} returned {}", url, status)));
        }
        if !status.is_success() {
            return Err(Error::Request(format!("{} returned {}", url, status)));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !is_html(&content_type) {
            return Err(Error::InvalidInput(format!(
                "Not HTML: {} served content type {:?}",
                url, content_type
            )));
        }

        let final_url = response.url().clone();

        // Stream the body and stop at the cap; a page whose head section
        // does not fit in max_body_bytes has no metadata worth reading.
        let mut response = response;
        let mut body: Vec<u8> = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_body_bytes {
                body.extend_from_slice(&chunk[..self.max_body_bytes - body.len()]);
                truncated = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }
        let html = String::from_utf8_lossy(&body);

        let content = extract_content(&html, &final_url)?;

        debug!(
            status = status.as_u16(),
            bytes = body.len(),
            truncated,
            content_type = content.content_type.as_str(),
            has_summary = !content.summary.is_empty(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Fetched content"
        );

        Ok(content)
    }
}

fn is_html(content_type: &str) -> bool {
    // Missing content type gets the benefit of the doubt; extraction
    // fails on its own if the body turns out not to be a document.
    content_type.is_empty()
        || content_type.starts_with("text/html")
        || content_type.starts_with("application/xhtml+xml")
}

/// Head fields gathered in document order, first occurrence wins.
#[derive(Debug, Default)]
struct PageMeta {
    og_title: Option<String>,
    og_description: Option<String>,
    og_image: Option<String>,
    og_type: Option<String>,
    published_time: Option<String>,
    meta_description: Option<String>,
    meta_date: Option<String>,
    canonical: Option<String>,
    title_tag: Option<String>,
}

fn parse_head(html: &str) -> PageMeta {
    let mut meta = PageMeta::default();

    for tag in META_TAG.find_iter(html) {
        let mut key: Option<String> = None;
        let mut content: Option<String> = None;
        for caps in TAG_ATTR.captures_iter(tag.as_str()) {
            let attr = caps[1].to_ascii_lowercase();
            let value = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str());
            match attr.as_str() {
                "property" | "name" => key = value.map(|v| v.trim().to_ascii_lowercase()),
                "content" => content = value.map(|v| v.to_string()),
                _ => {}
            }
        }
        let (Some(key), Some(content)) = (key, content) else {
            continue;
        };
        if content.trim().is_empty() {
            continue;
        }
        let slot = match key.as_str() {
            "og:title" => &mut meta.og_title,
            "og:description" => &mut meta.og_description,
            "og:image" => &mut meta.og_image,
            "og:type" => &mut meta.og_type,
            "article:published_time" => &mut meta.published_time,
            "description" => &mut meta.meta_description,
            "date" => &mut meta.meta_date,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(content);
        }
    }

    for tag in LINK_TAG.find_iter(html) {
        let mut rel: Option<String> = None;
        let mut href: Option<String> = None;
        for caps in TAG_ATTR.captures_iter(tag.as_str()) {
            let attr = caps[1].to_ascii_lowercase();
            let value = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str());
            match attr.as_str() {
                "rel" => rel = value.map(|v| v.trim().to_ascii_lowercase()),
                "href" => href = value.map(|v| v.to_string()),
                _ => {}
            }
        }
        if rel.as_deref() == Some("canonical") && meta.canonical.is_none() {
            meta.canonical = href.filter(|h| !h.trim().is_empty());
        }
    }

    if let Some(caps) = TITLE_TAG.captures(html) {
        let text = caps[1].to_string();
        if !text.trim().is_empty() {
            meta.title_tag = Some(text);
        }
    }

    meta
}

fn extract_content(html: &str, final_url: &Url) -> Result<FetchedContent> {
    let meta = parse_head(html);

    let title_source = meta
        .og_title
        .as_deref()
        .or(meta.title_tag.as_deref())
        .unwrap_or("");
    let title = clean_text(title_source, FETCH_TITLE_MAX_CHARS);
    if title.is_empty() {
        return Err(Error::InvalidInput(format!(
            "No usable title at {}",
            final_url
        )));
    }

    let summary_source = meta
        .og_description
        .as_deref()
        .or(meta.meta_description.as_deref())
        .unwrap_or("");
    let summary = clean_text(summary_source, FETCH_SUMMARY_MAX_CHARS);

    let image_url = meta
        .og_image
        .as_deref()
        .map(|raw| unescape_entities(raw).trim().to_string())
        .filter(|s| !s.is_empty());

    let canonical_url = meta
        .canonical
        .as_deref()
        .map(|raw| unescape_entities(raw).trim().to_string())
        .filter(|s| !s.is_empty());

    Ok(FetchedContent {
        canonical_url,
        title,
        summary,
        image_url,
        content_type: classify(&meta, final_url),
        published_at: parse_published(&meta),
    })
}

fn classify(meta: &PageMeta, final_url: &Url) -> DropType {
    let og_video = meta
        .og_type
        .as_deref()
        .is_some_and(|t| t.trim().to_ascii_lowercase().starts_with("video"));
    let video_host = final_url.host_str().is_some_and(is_video_host);

    if og_video || video_host {
        DropType::Video
    } else {
        DropType::Article
    }
}

fn is_video_host(host: &str) -> bool {
    VIDEO_HOSTS.iter().any(|base| {
        host == *base
            || host
                .strip_suffix(base)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

fn parse_published(meta: &PageMeta) -> Option<DateTime<Utc>> {
    [meta.published_time.as_deref(), meta.meta_date.as_deref()]
        .into_iter()
        .flatten()
        .find_map(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Unescape the entity set that shows up in attribute values, collapse
/// whitespace runs, and cap length on a char boundary.
fn clean_text(raw: &str, max_chars: usize) -> String {
    let unescaped = unescape_entities(raw);
    let collapsed = unescaped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_chars).collect()
}

fn unescape_entities(text: &str) -> String {
    // `&amp;` last so `&amp;lt;` comes out as the literal `&lt;`.
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
