//! Knowledge 모듈 - 심사기준 청크 저장소
//!
//! - LanceDB: 청크 + 임베딩 벡터 저장, 코사인 검색 (ANN)
//! - InMemory: 같은 트레이트의 전수 스캔 구현
//! - SQLite: 수집 파일 레지스트리 (해시 기반 재수집 판단)
//! - Chunker: 섹션 인식 텍스트 분할

mod chunker;
mod lance;
mod memory;
mod registry;
mod vector;

// Re-exports
pub use chunker::{ChunkConfig, CriteriaChunker, TextChunk};
pub use lance::{LanceVectorStore, TABLE_NAME};
pub use memory::InMemoryVectorStore;
pub use registry::{IngestRegistry, IngestedFile, RegistryStats};
pub use vector::{
    cosine_similarity, escape_sql_literal, make_chunk_id, ChunkMetadata, ChunkRecord,
    ScoredChunk, SourceType, VectorStore,
};
