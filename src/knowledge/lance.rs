//! LanceDB Vector Store - 대출기관 심사기준 청크 저장소
//!
//! 테이블 `lender_criteria`에 청크 텍스트, 메타데이터 컬럼, 임베딩 벡터를 저장하고
//! 코사인 거리 기반 ANN 검색을 수행합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::types::Int32Type;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, ListArray, RecordBatch,
    RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::DistanceType;

use super::vector::{
    escape_sql_literal, ChunkMetadata, ChunkRecord, ScoredChunk, SourceType, VectorStore,
};

/// 테이블 이름
pub const TABLE_NAME: &str = "lender_criteria";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
///
/// 프로세스당 한 번 열고 `Arc`로 공유합니다.
pub struct LanceVectorStore {
    db: Connection,
    dimension: usize,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `dimension` - 임베딩 차원 (테이블 스키마에 고정됨)
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        tracing::debug!("Opened LanceDB at {:?} (dimension: {})", path, dimension);
        Ok(Self { db, dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn list_dimension(&self) -> Result<i32> {
        i32::try_from(self.dimension).context("Embedding dimension too large")
    }

    /// 테이블 스키마
    fn create_schema(&self) -> Result<Schema> {
        Ok(Schema::new(vec![
            Field::new("text", DataType::Utf8, false),
            Field::new("lender_name", DataType::Utf8, false),
            Field::new("filename", DataType::Utf8, false),
            Field::new("criteria_section", DataType::Utf8, true),
            Field::new("source_type", DataType::Utf8, false),
            Field::new(
                "page_numbers",
                DataType::List(Arc::new(Field::new("item", DataType::Int32, true))),
                true,
            ),
            Field::new("chunk_id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.list_dimension()?,
                ),
                false,
            ),
        ]))
    }

    /// 레코드들을 Arrow RecordBatch로 변환
    fn records_to_batch(&self, records: &[ChunkRecord]) -> Result<RecordBatch> {
        if records.is_empty() {
            anyhow::bail!("Cannot create batch from empty records");
        }

        if let Some(bad) = records.iter().find(|r| r.vector.len() != self.dimension) {
            anyhow::bail!(
                "Embedding dimension mismatch for {}: expected {}, got {}",
                bad.metadata.chunk_id,
                self.dimension,
                bad.vector.len()
            );
        }

        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        let lenders: Vec<&str> = records
            .iter()
            .map(|r| r.metadata.lender_name.as_str())
            .collect();
        let filenames: Vec<&str> = records
            .iter()
            .map(|r| r.metadata.filename.as_str())
            .collect();
        let sections: Vec<Option<&str>> = records
            .iter()
            .map(|r| r.metadata.criteria_section.as_deref())
            .collect();
        let source_types: Vec<&str> = records
            .iter()
            .map(|r| r.metadata.source_type.as_str())
            .collect();
        let chunk_ids: Vec<&str> = records
            .iter()
            .map(|r| r.metadata.chunk_id.as_str())
            .collect();

        let page_numbers = ListArray::from_iter_primitive::<Int32Type, _, _>(
            records.iter().map(|r| {
                r.metadata
                    .page_numbers
                    .as_ref()
                    .map(|pages| pages.iter().map(|p| Some(*p)).collect::<Vec<_>>())
            }),
        );

        // 임베딩을 FixedSizeList로 변환
        let vectors_flat: Vec<f32> = records
            .iter()
            .flat_map(|r| r.vector.iter().copied())
            .collect();
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vectors = FixedSizeListArray::try_new(
            field,
            self.list_dimension()?,
            Arc::new(Float32Array::from(vectors_flat)) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create vector array")?;

        RecordBatch::try_new(
            Arc::new(self.create_schema()?),
            vec![
                Arc::new(StringArray::from(texts)),
                Arc::new(StringArray::from(lenders)),
                Arc::new(StringArray::from(filenames)),
                Arc::new(StringArray::from(sections)),
                Arc::new(StringArray::from(source_types)),
                Arc::new(page_numbers),
                Arc::new(StringArray::from(chunk_ids)),
                Arc::new(vectors),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    /// RecordBatch에서 검색 결과 추출
    fn batch_to_results(batch: &RecordBatch) -> Result<Vec<ScoredChunk>> {
        let texts = string_column(batch, "text")?;
        let lenders = string_column(batch, "lender_name")?;
        let filenames = string_column(batch, "filename")?;
        let sections = string_column(batch, "criteria_section")?;
        let source_types = string_column(batch, "source_type")?;
        let chunk_ids = string_column(batch, "chunk_id")?;

        let page_numbers = batch
            .column_by_name("page_numbers")
            .and_then(|c| c.as_any().downcast_ref::<ListArray>())
            .ok_or_else(|| anyhow::anyhow!("Missing page_numbers column"))?;

        // _distance 컬럼 (LanceDB가 자동 추가)
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
            .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

        let vectors = batch
            .column_by_name("vector")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>());

        let mut results = Vec::with_capacity(batch.num_rows());

        for i in 0..batch.num_rows() {
            let pages = if page_numbers.is_null(i) {
                None
            } else {
                let values = page_numbers.value(i);
                values
                    .as_any()
                    .downcast_ref::<Int32Array>()
                    .map(|arr| arr.iter().flatten().collect::<Vec<i32>>())
            };

            let vector = vectors
                .filter(|v| !v.is_null(i))
                .and_then(|v| {
                    v.value(i)
                        .as_any()
                        .downcast_ref::<Float32Array>()
                        .map(|arr| arr.values().to_vec())
                })
                .unwrap_or_default();

            let source_type = SourceType::parse(source_types.value(i)).unwrap_or(SourceType::Text);

            // 코사인 거리 → 유사도
            let score = 1.0 - distances.value(i);

            results.push(ScoredChunk {
                record: ChunkRecord {
                    text: texts.value(i).to_string(),
                    metadata: ChunkMetadata {
                        chunk_id: chunk_ids.value(i).to_string(),
                        criteria_section: (!sections.is_null(i))
                            .then(|| sections.value(i).to_string()),
                        filename: filenames.value(i).to_string(),
                        lender_name: lenders.value(i).to_string(),
                        page_numbers: pages,
                        source_type,
                    },
                    vector,
                },
                score,
            });
        }

        Ok(results)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> Result<bool> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .context("Failed to list LanceDB tables")?;
        Ok(names.iter().any(|n| n == TABLE_NAME))
    }

    /// 기존 테이블 열기 (없으면 None)
    async fn open_table(&self) -> Result<Option<lancedb::table::Table>> {
        if !self.table_exists().await? {
            return Ok(None);
        }

        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open lender_criteria table")?;
        Ok(Some(table))
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn insert(&self, records: &[ChunkRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let batch = self.records_to_batch(records)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        match self.open_table().await? {
            Some(table) => {
                table
                    .add(batches)
                    .execute()
                    .await
                    .context("Failed to add chunks to table")?;
            }
            None => {
                self.db
                    .create_table(TABLE_NAME, batches)
                    .execute()
                    .await
                    .context("Failed to create table")?;
            }
        }

        Ok(records.len())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        lender_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let Some(table) = self.open_table().await? else {
            return Ok(vec![]);
        };

        let mut query = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit);

        if let Some(lender) = lender_filter {
            query = query.only_if(format!("lender_name = '{}'", escape_sql_literal(lender)));
        }

        let stream = query
            .execute()
            .await
            .context("Failed to execute vector search")?;
        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut results = Vec::new();
        for batch in &batches {
            results.extend(Self::batch_to_results(batch)?);
        }

        Ok(results)
    }

    async fn delete_by_filename(&self, filename: &str) -> Result<usize> {
        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        let filter = format!("filename = '{}'", escape_sql_literal(filename));
        let before = table
            .count_rows(Some(filter.clone()))
            .await
            .context("Failed to count rows for filename")?;

        if before > 0 {
            table
                .delete(&filter)
                .await
                .context("Failed to delete chunks")?;
        }

        Ok(before)
    }

    async fn count(&self) -> Result<usize> {
        match self.open_table().await? {
            Some(table) => table.count_rows(None).await.context("Failed to count rows"),
            None => Ok(0),
        }
    }

    async fn lender_names(&self) -> Result<Vec<String>> {
        let Some(table) = self.open_table().await? else {
            return Ok(vec![]);
        };

        let stream = table
            .query()
            .select(Select::Columns(vec!["lender_name".to_string()]))
            .execute()
            .await
            .context("Failed to query lender names")?;
        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut names = BTreeSet::new();
        for batch in &batches {
            let lenders = string_column(batch, "lender_name")?;
            for i in 0..lenders.len() {
                if !lenders.is_null(i) {
                    names.insert(lenders.value(i).to_string());
                }
            }
        }

        Ok(names.into_iter().collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
