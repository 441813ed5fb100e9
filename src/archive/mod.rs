//! Static archive resolver
//!
//! Pre-authored transcripts and diagrams are deployed as plain files and
//! preferred over live generation when present. Deployments differ in base
//! path and filename casing, and many hosts answer missing files with an
//! HTTP 200 carrying a substitute HTML page, so every response is validated
//! before it is accepted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client as HttpClient;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA};

use crate::diag::{DiagCategory, DiagOutcome, DiagSink};
use crate::error::{Error, Result};

const TEXT_DIR: &str = "text";
const IMAGE_DIR: &str = "images";
const TEXT_PREFIX: &str = "einstein-discussion-";
const IMAGE_PREFIX: &str = "einstein-diagram-";
const TEXT_EXTENSION: &str = ".txt";
const IMAGE_EXTENSIONS: [&str; 2] = [".jpg", ".png"];

/// Transcripts below this many chars are treated as soft 404s
pub const MIN_TEXT_CHARS: usize = 40;
/// Images below this many bytes are rejected
pub const MIN_IMAGE_BYTES: usize = 64;

/// Optional speaker marker at the head of archived transcripts
const ROLE_PREFIX: &str = "EINSTEIN:";

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Resolver for pre-authored chapter artifacts
pub struct StaticArchiveResolver {
    http: HttpClient,
    roots: Vec<String>,
    diag: Arc<dyn DiagSink>,
}

impl StaticArchiveResolver {
    /// Create a resolver rooted at the deployment's archive URL. With no
    /// root configured every lookup is a miss.
    pub fn new(archive_root: Option<String>, diag: Arc<dyn DiagSink>) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| Error::Other(format!("Failed to build HTTP client: {}", e)))?;

        let roots = archive_root
            .as_deref()
            .map(root_variants)
            .unwrap_or_default();

        Ok(Self { http, roots, diag })
    }

    /// Look up a pre-authored transcript for a chapter. Returns the cleaned
    /// text, or `None` when no candidate validates.
    pub async fn resolve_text(&self, chapter_key: &str, title: Option<&str>) -> Option<String> {
        let start = Instant::now();
        let candidates = self.candidates(TEXT_DIR, TEXT_PREFIX, &[TEXT_EXTENSION], chapter_key, title);

        let mut rejections = Vec::new();
        for url in &candidates {
            match self.fetch_text(url).await {
                Ok(text) => {
                    self.diag.append(
                        DiagCategory::System,
                        "static transcript",
                        start.elapsed(),
                        DiagOutcome::CacheHit,
                        format!("archive hit, {} chars", text.len()),
                        Some(url.clone()),
                    );
                    return Some(text);
                }
                Err(reason) => rejections.push(format!("{}: {}", url, reason)),
            }
        }

        self.log_miss("static transcript", chapter_key, start, &rejections);
        None
    }

    /// Look up a pre-authored diagram for a chapter. Returns the validated
    /// image URL, usable directly as an image source.
    pub async fn resolve_image(&self, chapter_key: &str, title: Option<&str>) -> Option<String> {
        let start = Instant::now();
        let candidates =
            self.candidates(IMAGE_DIR, IMAGE_PREFIX, &IMAGE_EXTENSIONS, chapter_key, title);

        let mut rejections = Vec::new();
        for url in &candidates {
            match self.fetch_image(url).await {
                Ok(()) => {
                    self.diag.append(
                        DiagCategory::System,
                        "static diagram",
                        start.elapsed(),
                        DiagOutcome::CacheHit,
                        "archive hit".to_string(),
                        Some(url.clone()),
                    );
                    return Some(url.clone());
                }
                Err(reason) => rejections.push(format!("{}: {}", url, reason)),
            }
        }

        self.log_miss("static diagram", chapter_key, start, &rejections);
        None
    }

    /// Cross-product of base roots x filename variants, deduplicated,
    /// in a fixed order.
    fn candidates(
        &self,
        dir: &str,
        prefix: &str,
        extensions: &[&str],
        chapter_key: &str,
        title: Option<&str>,
    ) -> Vec<String> {
        let stems = filename_stems(chapter_key, title);
        let mut urls = Vec::new();
        for root in &self.roots {
            for ext in extensions {
                for stem in &stems {
                    let url = format!("{}/{}/{}{}{}", root, dir, prefix, stem, ext);
                    if !urls.contains(&url) {
                        urls.push(url);
                    }
                }
            }
        }
        urls
    }

    async fn fetch(&self, url: &str) -> std::result::Result<reqwest::Response, String> {
        let response = self
            .http
            .get(url)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await
            .map_err(|e| format!("fetch failed ({})", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("status {}", status));
        }

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if declared.contains("html") {
            return Err(format!("html content-type ({})", declared));
        }

        Ok(response)
    }

    async fn fetch_text(&self, url: &str) -> std::result::Result<String, String> {
        let response = self.fetch(url).await?;
        let body = response
            .text()
            .await
            .map_err(|e| format!("body read failed ({})", e))?;

        let trimmed = body.trim();
        if looks_like_html(trimmed) {
            return Err("html body".to_string());
        }
        if trimmed.len() < MIN_TEXT_CHARS {
            return Err(format!("too short ({} chars)", trimmed.len()));
        }

        Ok(strip_role_prefix(trimmed).to_string())
    }

    async fn fetch_image(&self, url: &str) -> std::result::Result<(), String> {
        let response = self.fetch(url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| format!("body read failed ({})", e))?;

        if bytes.len() < MIN_IMAGE_BYTES {
            return Err(format!("too small ({} bytes)", bytes.len()));
        }
        if !is_valid_image(&bytes) {
            return Err("unknown image signature".to_string());
        }

        Ok(())
    }

    fn log_miss(&self, label: &str, chapter_key: &str, start: Instant, rejections: &[String]) {
        let message = if rejections.is_empty() {
            format!("no archive root configured for '{}'", chapter_key)
        } else {
            format!(
                "no candidate validated for '{}': {}",
                chapter_key,
                rejections.join("; ")
            )
        };
        self.diag.append(
            DiagCategory::System,
            label,
            start.elapsed(),
            DiagOutcome::Error,
            message,
            None,
        );
    }
}

/// Filename stems to try: the chapter key and, when available, the display
/// title, each in original and lowercased casing.
fn filename_stems(chapter_key: &str, title: Option<&str>) -> Vec<String> {
    let mut stems = Vec::new();
    let mut push = |stem: String| {
        if !stem.is_empty() && !stems.contains(&stem) {
            stems.push(stem);
        }
    };

    push(chapter_key.to_string());
    push(chapter_key.to_lowercase());
    if let Some(title) = title {
        let stem: String = title.split_whitespace().collect();
        push(stem.clone());
        push(stem.to_lowercase());
    }
    stems
}

/// Base location variants for one configured root: the root itself, its
/// origin (root-relative deployments), and its parent directory.
fn root_variants(root: &str) -> Vec<String> {
    let root = root.trim_end_matches('/').to_string();
    let mut variants = vec![root.clone()];
    let mut push = |variant: String| {
        if !variants.contains(&variant) {
            variants.push(variant);
        }
    };

    if let Some(origin) = origin_of(&root) {
        push(origin);
    }
    if let Some(parent) = parent_of(&root) {
        push(parent);
    }
    variants
}

/// `scheme://host[:port]` portion of a URL
fn origin_of(url: &str) -> Option<String> {
    let scheme_end = url.find("://")? + 3;
    match url[scheme_end..].find('/') {
        Some(i) => Some(url[..scheme_end + i].to_string()),
        None => Some(url.to_string()),
    }
}

/// One path segment up from the URL, never above the origin
fn parent_of(url: &str) -> Option<String> {
    let origin = origin_of(url)?;
    if url.len() <= origin.len() {
        return None;
    }
    let cut = url.rfind('/')?;
    if cut < origin.len() {
        return None;
    }
    Some(url[..cut].to_string())
}

/// Drop the speaker marker some archived transcripts open with
fn strip_role_prefix(text: &str) -> &str {
    match text.strip_prefix(ROLE_PREFIX) {
        Some(rest) => rest.trim_start(),
        None => text,
    }
}

/// Content sniffing for substitute HTML pages, applied even when the
/// declared content type lied.
pub fn looks_like_html(text: &str) -> bool {
    let head = text.trim_start().to_ascii_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html")
}

/// Accept only payloads whose first bytes match a known image signature
/// (JPEG or PNG).
pub fn is_valid_image(bytes: &[u8]) -> bool {
    const JPEG: [u8; 3] = [0xFF, 0xD8, 0xFF];
    const PNG: [u8; 4] = [0x89, 0x50, 0x4E, 0x47];
    bytes.starts_with(&JPEG) || bytes.starts_with(&PNG)
}
