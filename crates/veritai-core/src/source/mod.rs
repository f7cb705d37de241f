//! Source loading: turns a website, PDF, or YouTube video into one flat
//! [`Document`].
//!
//! Each source kind sits behind a fetcher trait so the normalizer can be
//! driven by real network loaders or by fixtures in tests.

pub mod pdf;
pub mod website;
pub mod youtube;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::LoadError;

pub use pdf::PdfTextExtractor;
pub use website::HttpWebsiteFetcher;
pub use youtube::YoutubeTranscriptFetcher;

/// Default budget for a single fetch or extraction.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Website,
    Pdf,
    YouTube,
}

impl SourceKind {
    pub fn all() -> Vec<SourceKind> {
        vec![SourceKind::Website, SourceKind::Pdf, SourceKind::YouTube]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SourceKind::Website => "Website",
            SourceKind::Pdf => "PDF",
            SourceKind::YouTube => "YouTube video",
        }
    }

    /// Prompt shown when asking the user for this kind's locator.
    pub fn locator_prompt(&self) -> &'static str {
        match self {
            SourceKind::Website => "Website URL",
            SourceKind::Pdf => "Path to PDF file",
            SourceKind::YouTube => "YouTube video URL",
        }
    }
}

/// Where to load a document from. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    Website { url: String },
    Pdf { name: String, bytes: Vec<u8> },
    YouTube { url: String, language: String },
}

impl SourceDescriptor {
    pub fn website(url: impl Into<String>) -> Self {
        SourceDescriptor::Website { url: url.into() }
    }

    pub fn pdf(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        SourceDescriptor::Pdf { name: name.into(), bytes }
    }

    pub fn youtube(url: impl Into<String>, language: impl Into<String>) -> Self {
        SourceDescriptor::YouTube { url: url.into(), language: language.into() }
    }

    /// Read a PDF from disk into an uploaded-payload descriptor.
    pub async fn pdf_from_path(path: &Path) -> Result<Self, LoadError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| LoadError::InvalidLocator(format!("{}: {}", path.display(), e)))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::pdf(name, bytes))
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            SourceDescriptor::Website { .. } => SourceKind::Website,
            SourceDescriptor::Pdf { .. } => SourceKind::Pdf,
            SourceDescriptor::YouTube { .. } => SourceKind::YouTube,
        }
    }

    /// Short human-readable description of the source.
    pub fn label(&self) -> String {
        match self {
            SourceDescriptor::Website { url } => url.clone(),
            SourceDescriptor::Pdf { name, .. } => name.clone(),
            SourceDescriptor::YouTube { url, language } => format!("{} [{}]", url, language),
        }
    }
}

// PDF payloads can be megabytes; keep them out of debug output and logs.
impl fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Website { url } => f.debug_struct("Website").field("url", url).finish(),
            SourceDescriptor::Pdf { name, bytes } => f
                .debug_struct("Pdf")
                .field("name", name)
                .field("bytes", &bytes.len())
                .finish(),
            SourceDescriptor::YouTube { url, language } => f
                .debug_struct("YouTube")
                .field("url", url)
                .field("language", language)
                .finish(),
        }
    }
}

/// Flattened text of a loaded source. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    text: String,
}

impl Document {
    /// Concatenate fragments in order with no separator.
    ///
    /// Returns `None` when the result has no visible text.
    pub fn from_fragments<I, S>(fragments: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut text = String::new();
        for fragment in fragments {
            text.push_str(fragment.as_ref());
        }
        if text.trim().is_empty() {
            None
        } else {
            Some(Self { text })
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

#[async_trait]
pub trait WebsiteFetcher: Send + Sync {
    /// Fetch the text fragments a URL resolves to, in page order.
    async fn fetch(&self, url: &str) -> Result<Vec<String>, LoadError>;
}

/// Extracts per-page text from a PDF on disk. Called on a blocking thread.
pub trait PdfExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Vec<String>, LoadError>;
}

#[async_trait]
pub trait TranscriptFetcher: Send + Sync {
    /// Fetch transcript segments in chronological order.
    async fn fetch(&self, url: &str, language: &str) -> Result<Vec<String>, LoadError>;
}

/// Turns a [`SourceDescriptor`] into a [`Document`].
#[derive(Clone)]
pub struct SourceNormalizer {
    website: Arc<dyn WebsiteFetcher>,
    pdf: Arc<dyn PdfExtractor>,
    youtube: Arc<dyn TranscriptFetcher>,
    fetch_timeout: Duration,
}

impl SourceNormalizer {
    pub fn new(
        website: Arc<dyn WebsiteFetcher>,
        pdf: Arc<dyn PdfExtractor>,
        youtube: Arc<dyn TranscriptFetcher>,
    ) -> Self {
        Self {
            website,
            pdf,
            youtube,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Normalizer backed by the network fetchers and `pdf-extract`.
    pub fn with_defaults(fetch_timeout: Duration) -> Self {
        Self::new(
            Arc::new(HttpWebsiteFetcher::new(fetch_timeout)),
            Arc::new(PdfTextExtractor),
            Arc::new(YoutubeTranscriptFetcher::new(fetch_timeout)),
        )
        .with_fetch_timeout(fetch_timeout)
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub async fn normalize(&self, descriptor: &SourceDescriptor) -> Result<Document, LoadError> {
        info!(kind = ?descriptor.kind(), source = %descriptor.label(), "Loading source");

        let fragments = match descriptor {
            SourceDescriptor::Website { url } => {
                website::validate_url(url)?;
                self.with_timeout(self.website.fetch(url)).await?
            }
            SourceDescriptor::Pdf { bytes, .. } => {
                self.with_timeout(pdf::extract_payload(self.pdf.clone(), bytes.clone()))
                    .await?
            }
            SourceDescriptor::YouTube { url, language } => {
                youtube::extract_video_id(url)?;
                self.with_timeout(self.youtube.fetch(url, language)).await?
            }
        };

        let fragment_count = fragments.len();
        match Document::from_fragments(fragments) {
            Some(document) => {
                info!(
                    fragments = fragment_count,
                    chars = document.char_count(),
                    "Source loaded"
                );
                Ok(document)
            }
            None => {
                warn!(source = %descriptor.label(), "Source produced no text");
                Err(LoadError::EmptyContent)
            }
        }
    }

    async fn with_timeout<F>(&self, fut: F) -> Result<Vec<String>, LoadError>
    where
        F: std::future::Future<Output = Result<Vec<String>, LoadError>>,
    {
        match tokio::time::timeout(self.fetch_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(LoadError::Unreachable(format!(
                "timed out after {}s",
                self.fetch_timeout.as_secs()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedFragments(Vec<&'static str>);

    #[async_trait]
    impl WebsiteFetcher for FixedFragments {
        async fn fetch(&self, _url: &str) -> Result<Vec<String>, LoadError> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    #[async_trait]
    impl TranscriptFetcher for FixedFragments {
        async fn fetch(&self, _url: &str, _language: &str) -> Result<Vec<String>, LoadError> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    impl PdfExtractor for FixedFragments {
        fn extract(&self, _path: &Path) -> Result<Vec<String>, LoadError> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    struct Stalled;

    #[async_trait]
    impl WebsiteFetcher for Stalled {
        async fn fetch(&self, _url: &str) -> Result<Vec<String>, LoadError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec!["never".into()])
        }
    }

    fn normalizer(fragments: Vec<&'static str>) -> SourceNormalizer {
        let fixed = Arc::new(FixedFragments(fragments));
        SourceNormalizer::new(fixed.clone(), fixed.clone(), fixed)
    }

    #[test]
    fn test_document_concatenates_without_separator() {
        let doc = Document::from_fragments(["Hello ", "World"]).unwrap();
        assert_eq!(doc.text(), "Hello World");
    }

    #[test]
    fn test_document_rejects_blank_text() {
        assert!(Document::from_fragments(Vec::<String>::new()).is_none());
        assert!(Document::from_fragments(["", "  \n"]).is_none());
    }

    #[test]
    fn test_descriptor_debug_hides_pdf_bytes() {
        let descriptor = SourceDescriptor::pdf("notes.pdf", vec![0u8; 2048]);
        let debug = format!("{:?}", descriptor);
        assert!(debug.contains("2048"));
        assert!(!debug.contains("0, 0"));
    }

    #[tokio::test]
    async fn test_normalize_website_preserves_order() {
        let doc = normalizer(vec!["one ", "two ", "three"])
            .normalize(&SourceDescriptor::website("https://example.com"))
            .await
            .unwrap();
        assert_eq!(doc.text(), "one two three");
    }

    #[tokio::test]
    async fn test_normalize_youtube_concatenates_segments() {
        let doc = normalizer(vec!["first segment", "second segment"])
            .normalize(&SourceDescriptor::youtube("https://youtu.be/dQw4w9WgXcQ", "en"))
            .await
            .unwrap();
        assert_eq!(doc.text(), "first segmentsecond segment");
    }

    #[tokio::test]
    async fn test_normalize_empty_fetch_is_empty_content() {
        let err = normalizer(vec![])
            .normalize(&SourceDescriptor::website("https://example.com"))
            .await
            .unwrap_err();
        assert_eq!(err, LoadError::EmptyContent);
    }

    #[tokio::test]
    async fn test_normalize_rejects_bad_locators() {
        let n = normalizer(vec!["text"]);

        let err = n.normalize(&SourceDescriptor::website("not a url")).await.unwrap_err();
        assert!(matches!(err, LoadError::InvalidLocator(_)));

        let err = n
            .normalize(&SourceDescriptor::youtube("https://example.com/video", "en"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::InvalidLocator(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_normalize_times_out_as_unreachable() {
        let fixed = Arc::new(FixedFragments(vec![]));
        let n = SourceNormalizer::new(Arc::new(Stalled), fixed.clone(), fixed)
            .with_fetch_timeout(Duration::from_secs(5));

        let err = n
            .normalize(&SourceDescriptor::website("https://example.com"))
            .await
            .unwrap_err();
        assert_eq!(err, LoadError::Unreachable("timed out after 5s".into()));
    }
}
