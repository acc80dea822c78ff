//! PDF text extraction for uploaded notes and past tests.
//!
//! Each document is parsed page by page with `pdf-extract`; a page's text is
//! followed by a newline and documents are joined with a blank line, in the
//! order they were uploaded.

use anyhow::{Result, anyhow};
use tracing::{debug, warn};

use crate::errors::QuizError;

const DOCUMENT_SEPARATOR: &str = "\n\n";

/// Extract the text of a single PDF document.
pub fn extract_document(bytes: &[u8]) -> Result<String> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| anyhow!("not a readable PDF: {}", e))?;

    let mut text = String::new();
    for page in &pages {
        text.push_str(page);
        text.push('\n');
    }

    debug!(
        page_count = pages.len(),
        text_length = text.len(),
        "Extracted text from PDF document"
    );
    Ok(text)
}

/// Extract and concatenate the text of several PDF documents.
///
/// Fails on the first document that cannot be parsed; no partial text is
/// returned in that case.
pub async fn extract_text(documents: Vec<Vec<u8>>) -> Result<String, QuizError> {
    let mut texts = Vec::with_capacity(documents.len());

    for (index, document) in documents.into_iter().enumerate() {
        let size = document.len();
        // pdf-extract is synchronous and may panic on malformed input
        let outcome = tokio::task::spawn_blocking(move || extract_document(&document)).await;

        let text = match outcome {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(document_index = index, size_bytes = size, error = %e, "PDF extraction failed");
                return Err(QuizError::Extraction {
                    index,
                    message: e.to_string(),
                });
            }
            Err(join_error) => {
                warn!(document_index = index, size_bytes = size, error = %join_error, "PDF extraction aborted");
                return Err(QuizError::Extraction {
                    index,
                    message: "document parser aborted".to_string(),
                });
            }
        };
        texts.push(text);
    }

    Ok(texts.join(DOCUMENT_SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_are_rejected() {
        assert!(extract_document(b"definitely not a pdf").is_err());
    }

    #[tokio::test]
    async fn test_corrupt_document_fails_with_extraction_error() {
        let result = extract_text(vec![b"%PDF-1.4 truncated".to_vec()]).await;

        match result {
            Err(QuizError::Extraction { index, .. }) => assert_eq!(index, 0),
            other => panic!("expected extraction error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_documents_yields_empty_text() {
        assert_eq!(extract_text(vec![]).await.unwrap(), "");
    }
}
