//! PDF loading using the `pdf-extract` crate.
//!
//! The uploaded payload is written to a private temporary file which is
//! removed when the extraction closure returns, panics, or is abandoned by a
//! timeout.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::LoadError;
use crate::source::PdfExtractor;

/// PDF text extractor backed by `pdf-extract`, one string per page.
pub struct PdfTextExtractor;

impl PdfExtractor for PdfTextExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<String>, LoadError> {
        pdf_extract::extract_text_by_pages(path).map_err(|e| LoadError::UnparsablePdf(e.to_string()))
    }
}

/// Persist `bytes` to a scoped temp file and run `extractor` on it.
pub(crate) async fn extract_payload(
    extractor: Arc<dyn PdfExtractor>,
    bytes: Vec<u8>,
) -> Result<Vec<String>, LoadError> {
    if bytes.is_empty() {
        return Err(LoadError::UnparsablePdf("file is empty".to_string()));
    }

    // The temp file is owned by the blocking closure, so it is deleted even if
    // the caller stops waiting on us.
    let task = tokio::task::spawn_blocking(move || {
        let file = write_temp_pdf(&bytes)?;
        debug!(path = %file.path().display(), size = bytes.len(), "Extracting PDF");
        extractor.extract(file.path())
    });

    match task.await {
        Ok(result) => result,
        Err(e) => Err(LoadError::UnparsablePdf(format!("extractor crashed: {}", e))),
    }
}

fn write_temp_pdf(bytes: &[u8]) -> Result<NamedTempFile, LoadError> {
    let mut file = tempfile::Builder::new()
        .prefix("veritai-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| LoadError::UnparsablePdf(format!("could not create temp file: {}", e)))?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| LoadError::UnparsablePdf(format!("could not write temp file: {}", e)))?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Records the path it was given and whether the file existed then.
    struct RecordingExtractor {
        seen: Mutex<Option<(PathBuf, Vec<u8>)>>,
        pages: Result<Vec<String>, LoadError>,
    }

    impl RecordingExtractor {
        fn new(pages: Result<Vec<String>, LoadError>) -> Arc<Self> {
            Arc::new(Self { seen: Mutex::new(None), pages })
        }

        fn seen_path(&self) -> PathBuf {
            self.seen.lock().unwrap().as_ref().unwrap().0.clone()
        }
    }

    impl PdfExtractor for RecordingExtractor {
        fn extract(&self, path: &Path) -> Result<Vec<String>, LoadError> {
            let contents = std::fs::read(path).unwrap();
            *self.seen.lock().unwrap() = Some((path.to_path_buf(), contents));
            self.pages.clone()
        }
    }

    struct PanickingExtractor;

    impl PdfExtractor for PanickingExtractor {
        fn extract(&self, _path: &Path) -> Result<Vec<String>, LoadError> {
            panic!("corrupt xref table");
        }
    }

    #[tokio::test]
    async fn test_payload_is_written_then_removed() {
        let extractor = RecordingExtractor::new(Ok(vec!["Page1 text".into(), "Page2 text".into()]));
        let pages = extract_payload(extractor.clone(), b"%PDF-1.4 fake".to_vec())
            .await
            .unwrap();

        assert_eq!(pages, vec!["Page1 text", "Page2 text"]);
        let (path, contents) = extractor.seen.lock().unwrap().clone().unwrap();
        assert_eq!(contents, b"%PDF-1.4 fake");
        assert!(path.to_string_lossy().ends_with(".pdf"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_temp_file_removed_on_extraction_error() {
        let extractor =
            RecordingExtractor::new(Err(LoadError::UnparsablePdf("bad header".into())));
        let err = extract_payload(extractor.clone(), b"garbage".to_vec()).await.unwrap_err();

        assert_eq!(err, LoadError::UnparsablePdf("bad header".into()));
        assert!(!extractor.seen_path().exists());
    }

    #[tokio::test]
    async fn test_extractor_panic_is_unparsable() {
        let err = extract_payload(Arc::new(PanickingExtractor), b"garbage".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::UnparsablePdf(_)));
    }

    #[tokio::test]
    async fn test_empty_payload_is_rejected() {
        let err = extract_payload(Arc::new(PdfTextExtractor), Vec::new()).await.unwrap_err();
        assert!(matches!(err, LoadError::UnparsablePdf(_)));
    }

    #[test]
    fn test_real_extractor_rejects_non_pdf() {
        let file = write_temp_pdf(b"This is not a PDF").unwrap();
        assert!(PdfTextExtractor.extract(file.path()).is_err());
    }
}
