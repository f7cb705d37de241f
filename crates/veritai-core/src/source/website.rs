//! Website loading: HTTP GET plus visible-text extraction with `scraper`.
//!
//! A page that embeds frames yields one fragment for its own body followed by
//! one per frame, in document order.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::error::LoadError;
use crate::source::WebsiteFetcher;

/// Upper bound on frames followed from one page.
const MAX_FRAMES: usize = 8;

/// Elements whose text is never visible content.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Elements that start a new run of text. Inline markup between them does not.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "caption", "dd", "details", "div", "dl",
    "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table", "td",
    "th", "tr", "ul",
];

pub(crate) fn validate_url(url: &str) -> Result<Url, LoadError> {
    let parsed = Url::parse(url.trim())
        .map_err(|e| LoadError::InvalidLocator(format!("'{}' is not a valid URL: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(LoadError::InvalidLocator(format!(
            "unsupported URL scheme '{}', use http or https",
            other
        ))),
    }
}

#[derive(Clone)]
pub struct HttpWebsiteFetcher {
    client: Client,
}

impl HttpWebsiteFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("veritai/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }

    async fn get(&self, url: &Url) -> Result<(String, bool), LoadError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| LoadError::Unreachable(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(LoadError::Unreachable(format!(
                "{} returned HTTP {}",
                url,
                response.status()
            )));
        }

        let is_plain_text = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.to_lowercase().starts_with("text/plain"))
            .unwrap_or(false);

        let body = response
            .text()
            .await
            .map_err(|e| LoadError::Unreachable(format!("{}: failed to read body: {}", url, e)))?;

        Ok((body, is_plain_text))
    }
}

#[async_trait]
impl WebsiteFetcher for HttpWebsiteFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<String>, LoadError> {
        let base = validate_url(url)?;
        let (body, is_plain_text) = self.get(&base).await?;

        if is_plain_text {
            return Ok(vec![body]);
        }

        let page = parse_page(&body, &base);
        let mut fragments = vec![page.text];

        for frame_url in page.frames {
            match self.get(&frame_url).await {
                Ok((frame_body, true)) => fragments.push(frame_body),
                Ok((frame_body, false)) => {
                    fragments.push(parse_page(&frame_body, &frame_url).text);
                }
                Err(e) => warn!(frame = %frame_url, error = %e, "Skipping unreachable frame"),
            }
        }

        fragments.retain(|f| !f.trim().is_empty());
        debug!(url = %base, fragments = fragments.len(), "Fetched website");
        Ok(fragments)
    }
}

struct ParsedPage {
    text: String,
    frames: Vec<Url>,
}

// `Html` is not `Send`, so parsing stays in a sync helper that returns owned data.
fn parse_page(html: &str, base: &Url) -> ParsedPage {
    let document = Html::parse_document(html);
    ParsedPage {
        text: visible_text(&document),
        frames: frame_sources(&document, base),
    }
}

/// Visible body text with whitespace collapsed. Runs of inline text stay
/// contiguous; a space separates text in different blocks or across `<br>`.
fn visible_text(document: &Html) -> String {
    let Ok(body_sel) = Selector::parse("body") else {
        return String::new();
    };
    let Some(body) = document.select(&body_sel).next() else {
        return String::new();
    };

    let mut raw = String::new();
    let mut prev_block = None;
    let mut line_break = false;
    for node in body.descendants() {
        if let Some(el) = node.value().as_element() {
            if el.name() == "br" {
                line_break = true;
            }
            continue;
        }
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
        });
        if hidden {
            continue;
        }

        let block = node
            .ancestors()
            .find(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|el| BLOCK_ELEMENTS.contains(&el.name()))
            })
            .map(|a| a.id());
        if block != prev_block || line_break {
            raw.push(' ');
        }
        prev_block = block;
        line_break = false;
        raw.push_str(text);
    }
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn frame_sources(document: &Html, base: &Url) -> Vec<Url> {
    let Ok(sel) = Selector::parse("frame[src], iframe[src]") else {
        return Vec::new();
    };
    document
        .select(&sel)
        .filter_map(|el| el.value().attr("src"))
        .filter_map(|src| base.join(src.trim()).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .take(MAX_FRAMES)
        .collect()
}
