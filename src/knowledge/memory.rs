//! 인메모리 VectorStore 구현
//!
//! 전수 코사인 유사도 스캔. 테스트와 임베딩(내장) 용도입니다.

use std::collections::BTreeSet;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use super::vector::{cosine_similarity, ChunkRecord, ScoredChunk, VectorStore};

#[derive(Default)]
pub struct InMemoryVectorStore {
    records: RwLock<Vec<ChunkRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<ChunkRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<ChunkRecord>>> {
        self.records
            .read()
            .map_err(|_| anyhow::anyhow!("In-memory store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<ChunkRecord>>> {
        self.records
            .write()
            .map_err(|_| anyhow::anyhow!("In-memory store lock poisoned"))
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert(&self, records: &[ChunkRecord]) -> Result<usize> {
        self.write()?.extend_from_slice(records);
        Ok(records.len())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        lender_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let records = self.read()?;

        let mut results: Vec<ScoredChunk> = records
            .iter()
            .filter(|r| lender_filter.map_or(true, |l| r.metadata.lender_name == l))
            .map(|r| ScoredChunk {
                record: r.clone(),
                score: cosine_similarity(query_embedding, &r.vector),
            })
            .collect();

        // 안정 정렬: 동점은 삽입 순서 유지
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(limit);

        Ok(results)
    }

    async fn delete_by_filename(&self, filename: &str) -> Result<usize> {
        let mut records = self.write()?;
        let before = records.len();
        records.retain(|r| r.metadata.filename != filename);
        Ok(before - records.len())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    async fn lender_names(&self) -> Result<Vec<String>> {
        let names: BTreeSet<String> = self
            .read()?
            .iter()
            .map(|r| r.metadata.lender_name.clone())
            .collect();
        Ok(names.into_iter().collect())
    }
}
