//! lender-criteria-rag - UK 모기지 대출기관 심사기준 RAG 시스템
//!
//! 심사기준 문서를 LanceDB에 색인하고, OpenAI 임베딩으로 검색한 뒤
//! 대출기관별로 정리된 답변을 생성합니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod knowledge;
pub mod lender;
pub mod llm;
pub mod openai;
pub mod rag;
pub mod retry;
pub mod server;
pub mod services;

#[cfg(test)]
mod testing;

// Re-exports
pub use config::AppConfig;
pub use embedding::{EmbeddingProvider, OpenAiEmbedding};
pub use error::{ConfigError, GenerationError, RetrievalError};
pub use ingest::{IngestOptions, IngestPipeline, IngestReport};
pub use knowledge::{
    ChunkMetadata, ChunkRecord, InMemoryVectorStore, IngestRegistry, LanceVectorStore,
    ScoredChunk, SourceType, VectorStore,
};
pub use lender::{LenderCatalog, LenderNameNormalizer};
pub use llm::{ChatMessage, ChatProvider, ChatRole, OpenAiChat};
pub use rag::{render_answer, Answer, CriteriaAssistant, QueryOutcome};
