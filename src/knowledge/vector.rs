//! Vector Store - 청크 레코드 타입 및 벡터 저장소 트레이트
//!
//! 질의 코어는 이 트레이트만 바라봅니다. 실제 구현은 LanceDB(`lance.rs`),
//! 테스트/임베딩 용도로 인메모리 구현(`memory.rs`)이 있습니다.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Types
// ============================================================================

/// 원본 문서 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Pdf,
    Text,
}

impl SourceType {
    /// 파일명 확장자로 판단 (`.pdf`이면 Pdf, 그 외 Text)
    pub fn from_filename(filename: &str) -> Self {
        if filename.to_ascii_lowercase().ends_with(".pdf") {
            SourceType::Pdf
        } else {
            SourceType::Text
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Pdf => "pdf",
            SourceType::Text => "text",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pdf" => Some(SourceType::Pdf),
            "text" => Some(SourceType::Text),
            _ => None,
        }
    }
}

/// 청크 메타데이터 (출처 정보)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_id: String,
    /// 청크가 속한 섹션 제목
    pub criteria_section: Option<String>,
    pub filename: String,
    /// 원시 대출기관 이름 (필터는 이 값과 정확히 일치해야 함)
    pub lender_name: String,
    pub page_numbers: Option<Vec<i32>>,
    pub source_type: SourceType,
}

/// 청크 레코드 (저장 단위, 쓰기 후 불변)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// 임베딩 벡터 (응답 직렬화에서는 제외)
    #[serde(skip)]
    pub vector: Vec<f32>,
}

/// 검색 결과 (레코드 + 유사도 스코어)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    #[serde(flatten)]
    pub record: ChunkRecord,
    /// 유사도 스코어 (높을수록 관련성 높음)
    pub score: f32,
}

impl ScoredChunk {
    pub fn lender_name(&self) -> &str {
        &self.record.metadata.lender_name
    }
}

/// 청크 ID 생성: `<file stem>_chunk_<000000>`
pub fn make_chunk_id(filename: &str, index: usize) -> String {
    let stem = std::path::Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    format!("{}_chunk_{:06}", stem, index)
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 질의 경로는 읽기 전용이며, 여러 요청이 같은 핸들을 공유합니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 레코드 배치 삽입
    async fn insert(&self, records: &[ChunkRecord]) -> Result<usize>;

    /// 최근접 이웃 검색
    ///
    /// `lender_filter`가 있으면 `lender_name`이 정확히 일치하는 레코드만 반환합니다.
    async fn search(
        &self,
        query_embedding: &[f32],
        lender_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>>;

    /// 특정 파일의 레코드 삭제
    async fn delete_by_filename(&self, filename: &str) -> Result<usize>;

    /// 레코드 개수
    async fn count(&self) -> Result<usize>;

    /// 저장된 고유 대출기관 이름 (정렬됨)
    async fn lender_names(&self) -> Result<Vec<String>>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// SQL 문자열 리터럴 이스케이프 (작은따옴표 중복)
pub fn escape_sql_literal(value: &str) -> String {
    value.replace('\'', "''")
}

// ============================================================================
// Tests
// ============================================================================
