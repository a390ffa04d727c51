//! 코어 경계 에러 타입
//!
//! 어댑터(HTTP, LanceDB, SQLite)는 `anyhow::Result`를 사용하고,
//! 검색/생성 경계에서는 아래의 타입 에러로 감싸서 호출자가 표현 방식을 결정합니다.

use thiserror::Error;

/// 검색 단계 에러
///
/// 모두 복구 가능한 에러입니다. 호출자는 "결과 없음"으로 처리할 수 있습니다.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RetrievalError {
    /// 잘못된 요청 (top_k == 0, 빈 쿼리 등)
    #[error("invalid retrieval request: {0}")]
    InvalidRequest(String),

    /// 쿼리 임베딩 호출 실패
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// 벡터 저장소 접근/검색 실패
    #[error("vector store search failed: {0}")]
    Store(String),
}

/// 답변 생성 에러
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    /// Chat completion 호출 실패
    #[error("{0}")]
    Request(String),

    /// 모델이 빈 응답을 반환
    #[error("language model returned an empty response")]
    EmptyResponse,
}

/// 설정 에러
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
