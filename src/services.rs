//! 서비스 조립 - 저장소와 API 클라이언트를 한 번만 생성해서 주입
//!
//! CLI 명령과 HTTP 서버가 같은 조립 경로를 사용합니다.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;

use crate::config::AppConfig;
use crate::embedding::{EmbeddingProvider, OpenAiEmbedding};
use crate::ingest::IngestPipeline;
use crate::knowledge::{ChunkConfig, CriteriaChunker, IngestRegistry, LanceVectorStore, VectorStore};
use crate::lender::LenderCatalog;
use crate::llm::{ChatProvider, OpenAiChat};
use crate::openai::OpenAiClient;
use crate::rag::{AnswerGenerator, ContextAssembler, CriteriaAssistant, Retriever};

/// LanceDB 저장소 열기 (`<data_dir>/lender_criteria.lance`)
pub async fn open_vector_store(config: &AppConfig) -> Result<Arc<dyn VectorStore>> {
    let path = config.lance_path();
    let store = LanceVectorStore::open(&path, config.openai.embedding_dimension)
        .await
        .with_context(|| format!("Failed to open vector store at {:?}", path))?;
    Ok(Arc::new(store))
}

/// 수집 레지스트리 열기 (`<data_dir>/registry.db`)
pub fn open_registry(config: &AppConfig) -> Result<Arc<IngestRegistry>> {
    Ok(Arc::new(IngestRegistry::open(&config.registry_path())?))
}

/// 대출기관 카탈로그 (없으면 None)
pub fn load_catalog(config: &AppConfig) -> Result<Option<LenderCatalog>> {
    LenderCatalog::load_optional(&config.catalog_path())
}

/// 카탈로그가 있으면 파일 집계를 레지스트리 기준으로 갱신
///
/// 카탈로그 파일이 없으면 새로 만들지 않고 `None`을 반환합니다.
pub fn update_catalog_totals(
    config: &AppConfig,
    registry: &IngestRegistry,
) -> Result<Option<LenderCatalog>> {
    let path = config.catalog_path();
    let Some(mut catalog) = LenderCatalog::load_optional(&path)? else {
        return Ok(None);
    };

    let total_files = registry.stats()?.file_count;
    catalog.record_ingest(total_files, Local::now().date_naive());
    catalog.save(&path)?;

    tracing::info!("Lender catalog updated: {} files", total_files);
    Ok(Some(catalog))
}

/// 임베딩/채팅 프로바이더 (HTTP 클라이언트 하나를 공유)
pub fn openai_providers(
    config: &AppConfig,
) -> Result<(Arc<dyn EmbeddingProvider>, Arc<dyn ChatProvider>)> {
    let client = OpenAiClient::new(&config.openai)?;
    let embedder = OpenAiEmbedding::from_client(client.clone());
    let chat = OpenAiChat::from_client(client);
    Ok((Arc::new(embedder), Arc::new(chat)))
}

/// 질의응답 코어 조립
pub fn build_assistant(
    config: &AppConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatProvider>,
    store: Arc<dyn VectorStore>,
) -> CriteriaAssistant {
    CriteriaAssistant::new(
        Retriever::new(embedder, store, config.retrieval.retry_policy()),
        ContextAssembler::new(config.normalizer()),
        AnswerGenerator::new(chat, config.openai.temperature),
    )
}

/// 수집 파이프라인 조립
pub fn build_ingest_pipeline(
    config: &AppConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    registry: Arc<IngestRegistry>,
) -> IngestPipeline {
    IngestPipeline::new(
        embedder,
        store,
        registry,
        CriteriaChunker::new(ChunkConfig::from(&config.ingest)),
        config.normalizer(),
        config.ingest.batch_size,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    use crate::knowledge::{InMemoryVectorStore, IngestedFile, SourceType};
    use crate::rag::{Answer, DEFAULT_TOP_K};
    use crate::testing::{sample_corpus, FakeChat, HashEmbedding};

    fn config_in(dir: &TempDir) -> AppConfig {
        AppConfig {
            data_dir: dir.path().to_path_buf(),
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn test_open_stores_under_data_dir() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let store = open_vector_store(&config).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);

        let registry = open_registry(&config).unwrap();
        assert_eq!(registry.db_path(), config.registry_path().as_path());
        assert!(load_catalog(&config).unwrap().is_none());
    }

    #[test]
    fn test_update_catalog_totals() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let registry = open_registry(&config).unwrap();
        assert!(update_catalog_totals(&config, &registry).unwrap().is_none());
        assert!(!config.catalog_path().exists());

        std::fs::write(
            config.catalog_path(),
            r#"{"lender_categories": {"major_banks": []}, "lender_files_config": {"total_files": 40, "last_updated": "2024-01-01"}}"#,
        )
        .unwrap();
        for name in ["barclays_residential.txt", "hsbc_residential_1.txt"] {
            registry
                .upsert(&IngestedFile {
                    filename: name.to_string(),
                    lender_name: "Barclays".to_string(),
                    source_type: SourceType::Text,
                    sha256: "0".repeat(64),
                    chunk_count: 3,
                    ingested_at: Utc::now(),
                })
                .unwrap();
        }

        update_catalog_totals(&config, &registry).unwrap().unwrap();
        let saved = load_catalog(&config).unwrap().unwrap();
        let files = saved.lender_files_config.unwrap();
        assert_eq!(files.total_files, Some(2));
        assert_eq!(
            files.last_updated,
            Some(Local::now().date_naive().format("%Y-%m-%d").to_string())
        );
    }

    #[test]
    fn test_openai_providers_require_key() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.openai.api_key = None;
        assert!(openai_providers(&config).is_err());

        config.openai.api_key = Some("sk-test".to_string());
        let (embedder, chat) = openai_providers(&config).unwrap();
        assert_eq!(embedder.dimension(), 1536);
        assert_eq!(chat.name(), "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_build_assistant_uses_injected_providers() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let chat = Arc::new(FakeChat::replying("🏦 HSBC"));

        let assistant = build_assistant(
            &config,
            Arc::new(HashEmbedding::default()),
            chat.clone(),
            Arc::new(InMemoryVectorStore::with_records(sample_corpus())),
        );

        let outcome = assistant
            .answer_query(&[], "maximum age", Some("HSBC"), DEFAULT_TOP_K)
            .await;
        assert_eq!(outcome.answer, Answer::Generated("🏦 HSBC".to_string()));
        assert_eq!(chat.call_count(), 1);
    }
}
