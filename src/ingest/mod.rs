//! Ingest 파이프라인 - 파일 → 추출 → 청킹 → 임베딩 → 저장
//!
//! 파일 내용 SHA-256이 레지스트리 기록과 같으면 건너뜁니다 (`force`로 무시 가능).
//! 재수집 시 같은 파일명의 기존 청크를 지우고 새 청크를 씁니다.
//! 한 파일의 실패는 기록만 하고 나머지 파일은 계속 진행합니다.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::collector::{CollectedFile, FileCollector};
use crate::embedding::EmbeddingProvider;
use crate::extractor::ContentExtractor;
use crate::knowledge::{
    make_chunk_id, ChunkMetadata, ChunkRecord, CriteriaChunker, IngestRegistry, IngestedFile,
    VectorStore,
};
use crate::lender::LenderNameNormalizer;

/// 수집 옵션
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// 모든 파일에 사용할 대출기관 이름 (없으면 파일명에서 정규화)
    pub lender_override: Option<String>,
    /// 해시가 같아도 다시 수집
    pub force: bool,
}

/// 파일 하나의 처리 결과
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Ingested { lender_name: String, chunks: usize },
    Skipped,
}

/// 수집 실행 요약
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub chunks: usize,
    /// (파일명, 에러 메시지)
    pub failures: Vec<(String, String)>,
}

pub struct IngestPipeline {
    collector: FileCollector,
    extractor: ContentExtractor,
    chunker: CriteriaChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    registry: Arc<IngestRegistry>,
    normalizer: LenderNameNormalizer,
    batch_size: usize,
}

impl IngestPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        registry: Arc<IngestRegistry>,
        chunker: CriteriaChunker,
        normalizer: LenderNameNormalizer,
        batch_size: usize,
    ) -> Self {
        Self {
            collector: FileCollector::with_defaults(),
            extractor: ContentExtractor::new(),
            chunker,
            embedder,
            store,
            registry,
            normalizer,
            batch_size: batch_size.max(1),
        }
    }

    /// 파일 또는 폴더 수집
    pub async fn ingest_path(&self, path: &Path, options: &IngestOptions) -> Result<IngestReport> {
        let files = if path.is_dir() {
            self.collector.collect_directory(path)?
        } else {
            match self.collector.collect_file(path)? {
                Some(file) => vec![file],
                None => {
                    tracing::warn!("{:?} is not an ingestible lender file", path);
                    vec![]
                }
            }
        };

        let mut report = IngestReport::default();

        for (i, file) in files.iter().enumerate() {
            let filename = file.file_name();
            tracing::debug!("Ingesting {}/{}: {}", i + 1, files.len(), filename);

            match self.ingest_file(file, options).await {
                Ok(FileOutcome::Ingested {
                    lender_name,
                    chunks,
                }) => {
                    tracing::info!("Ingested {} ({}): {} chunks", filename, lender_name, chunks);
                    report.processed += 1;
                    report.chunks += chunks;
                }
                Ok(FileOutcome::Skipped) => {
                    tracing::debug!("Unchanged, skipping {}", filename);
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to ingest {}: {:#}", filename, e);
                    report.failed += 1;
                    report.failures.push((filename, format!("{:#}", e)));
                }
            }
        }

        tracing::info!(
            "Ingest complete: {} processed, {} skipped, {} failed, {} chunks",
            report.processed,
            report.skipped,
            report.failed,
            report.chunks
        );

        Ok(report)
    }

    /// 파일 하나 수집
    pub async fn ingest_file(
        &self,
        file: &CollectedFile,
        options: &IngestOptions,
    ) -> Result<FileOutcome> {
        let filename = file.file_name();

        let bytes = tokio::fs::read(&file.path)
            .await
            .with_context(|| format!("Failed to read {:?}", file.path))?;
        let sha256 = format!("{:x}", Sha256::digest(&bytes));

        if !options.force {
            if let Some(existing) = self.registry.get(&filename)? {
                if existing.sha256 == sha256 {
                    return Ok(FileOutcome::Skipped);
                }
            }
        }

        let lender_name = match options.lender_override.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.normalizer.normalize(&filename),
        };

        let mut records = self.build_records(file, &filename, &lender_name).await?;
        if records.is_empty() {
            anyhow::bail!("No text extracted from {}", filename);
        }

        self.embed_records(&mut records).await?;

        let entry = IngestedFile {
            filename,
            lender_name: lender_name.clone(),
            source_type: file.file_type.source_type(),
            sha256,
            chunk_count: records.len(),
            ingested_at: Utc::now(),
        };

        if let Err(e) = self.replace_chunks(&entry, &records).await {
            // 기존 청크는 이미 지워졌을 수 있음: 다음 실행에서 다시 수집
            if let Err(cleanup) = self.registry.remove(&entry.filename) {
                tracing::warn!(
                    "Failed to clear registry entry for {}: {:#}",
                    entry.filename,
                    cleanup
                );
            }
            return Err(e);
        }

        Ok(FileOutcome::Ingested {
            lender_name,
            chunks: records.len(),
        })
    }

    /// 기존 청크 삭제 → 새 청크 삽입 → 레지스트리 갱신
    async fn replace_chunks(&self, entry: &IngestedFile, records: &[ChunkRecord]) -> Result<()> {
        let removed = self
            .store
            .delete_by_filename(&entry.filename)
            .await
            .context("Failed to remove previous chunks")?;
        if removed > 0 {
            tracing::debug!("Replaced {} previous chunks of {}", removed, entry.filename);
        }

        self.store
            .insert(records)
            .await
            .context("Failed to store chunks")?;

        self.registry.upsert(entry)
    }

    /// 파일의 청크와 메타데이터 (벡터는 비어 있음)
    async fn build_records(
        &self,
        file: &CollectedFile,
        filename: &str,
        lender_name: &str,
    ) -> Result<Vec<ChunkRecord>> {
        let contents = self.extractor.extract(&file.path, file.file_type).await?;
        let source_type = file.file_type.source_type();

        let mut records = Vec::new();
        let mut current_section: Option<String> = None;

        for content in contents {
            let page_numbers = content
                .metadata
                .page_number
                .and_then(|p| i32::try_from(p).ok())
                .map(|p| vec![p]);

            for chunk in self.chunker.chunk(&content.text) {
                // 제목 없는 청크는 직전 섹션을 이어받음 (PDF 페이지 경계 포함)
                if chunk.section.is_some() {
                    current_section = chunk.section;
                }

                records.push(ChunkRecord {
                    text: chunk.text,
                    metadata: ChunkMetadata {
                        chunk_id: make_chunk_id(filename, records.len()),
                        criteria_section: current_section.clone(),
                        filename: filename.to_string(),
                        lender_name: lender_name.to_string(),
                        page_numbers: page_numbers.clone(),
                        source_type,
                    },
                    vector: Vec::new(),
                });
            }
        }

        Ok(records)
    }

    /// `batch_size` 단위로 임베딩
    async fn embed_records(&self, records: &mut [ChunkRecord]) -> Result<()> {
        let dimension = self.embedder.dimension();

        for batch in records.chunks_mut(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|r| r.text.clone()).collect();
            let vectors = self
                .embedder
                .embed_batch(&texts)
                .await
                .context("Failed to embed chunks")?;

            if vectors.len() != batch.len() {
                anyhow::bail!(
                    "Embedding provider returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                );
            }

            for (record, vector) in batch.iter_mut().zip(vectors) {
                if vector.len() != dimension {
                    anyhow::bail!(
                        "Embedding dimension mismatch: expected {}, got {}",
                        dimension,
                        vector.len()
                    );
                }
                record.vector = vector;
            }
        }

        Ok(())
    }
}

/// 파일의 청크와 레지스트리 기록 삭제 (임베딩 없이 동작)
pub async fn remove_file(
    store: &dyn VectorStore,
    registry: &IngestRegistry,
    filename: &str,
) -> Result<usize> {
    let removed = store
        .delete_by_filename(filename)
        .await
        .context("Failed to delete chunks")?;
    let known = registry.remove(filename)?;

    if removed == 0 && !known {
        tracing::debug!("Nothing to delete for {}", filename);
    }
    Ok(removed)
}

// ============================================================================
// Tests
// ============================================================================
