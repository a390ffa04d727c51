//! 콘텐츠 추출 모듈
//!
//! - 텍스트 파일(.txt, .md): 직접 읽기 (UTF-8이 아니면 손실 변환)
//! - PDF 파일: pdf-extract로 페이지별 텍스트 추출

pub mod pdf;

use std::path::Path;

use anyhow::{Context, Result};

use crate::collector::FileType;

// ============================================================================
// Extracted Content
// ============================================================================

/// 추출된 콘텐츠 (텍스트 파일은 1개, PDF는 페이지당 1개)
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub text: String,
    pub source_type: FileType,
    pub metadata: ContentMetadata,
}

/// 콘텐츠 메타데이터
#[derive(Debug, Clone, Default)]
pub struct ContentMetadata {
    /// PDF 페이지 번호 (1부터 시작)
    pub page_number: Option<usize>,
}

// ============================================================================
// Content Extractor
// ============================================================================

/// 콘텐츠 추출기
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentExtractor;

impl ContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 파일에서 콘텐츠 추출
    pub async fn extract(&self, path: &Path, file_type: FileType) -> Result<Vec<ExtractedContent>> {
        match file_type {
            FileType::Text => self.extract_text(path).await,
            FileType::Pdf => self.extract_pdf(path).await,
        }
    }

    async fn extract_text(&self, path: &Path) -> Result<Vec<ExtractedContent>> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read text file: {:?}", path))?;

        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("{:?} is not valid UTF-8, decoding lossily", path);
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };

        Ok(vec![ExtractedContent {
            text,
            source_type: FileType::Text,
            metadata: ContentMetadata::default(),
        }])
    }

    async fn extract_pdf(&self, path: &Path) -> Result<Vec<ExtractedContent>> {
        // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
        let owned = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&owned))
            .await
            .context("PDF extraction task failed")??;

        tracing::debug!("Extracted {} pages from {:?}", pages.len(), path);

        Ok(pages
            .into_iter()
            .map(|(page_num, text)| ExtractedContent {
                text,
                source_type: FileType::Pdf,
                metadata: ContentMetadata {
                    page_number: Some(page_num),
                },
            })
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_extract_text_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("barclays.txt");
        std::fs::write(&path, "# Age Limits\nMax age 75").unwrap();

        let contents = ContentExtractor::new()
            .extract(&path, FileType::Text)
            .await
            .unwrap();
        assert_eq!(contents.len(), 1);
        assert!(contents[0].text.contains("Max age 75"));
        assert!(contents[0].metadata.page_number.is_none());
    }

    #[tokio::test]
    async fn test_extract_non_utf8_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin1.txt");
        std::fs::write(&path, [b'L', b'T', b'V', b' ', 0xA3, b'5']).unwrap();

        let contents = ContentExtractor::new()
            .extract(&path, FileType::Text)
            .await
            .unwrap();
        assert!(contents[0].text.starts_with("LTV "));
    }

    #[tokio::test]
    async fn test_extract_missing_file() {
        let result = ContentExtractor::new()
            .extract(Path::new("/nonexistent/file.txt"), FileType::Text)
            .await;
        assert!(result.is_err());
    }
}
