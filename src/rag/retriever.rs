//! Retriever - 질의 임베딩 + 벡터 검색
//!
//! 결과는 항상 `top_k` 이하이며 스코어 내림차순입니다. 동점은 저장소 순서를 유지합니다.
//!
//! 임베딩 호출은 한 번만 합니다 (429/5xx 재시도는 `OpenAiClient`가 담당).
//! 벡터 검색만 `RetryPolicy`로 재시도합니다.

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::RetrievalError;
use crate::knowledge::{ScoredChunk, VectorStore};
use crate::retry::{with_retry, RetryPolicy};

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    retry: RetryPolicy,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            embedder,
            store,
            retry,
        }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// 질의에 가장 가까운 청크 검색
    ///
    /// `lender_filter`는 저장된 `lender_name`과 정확히 일치해야 합니다.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        lender_filter: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        if top_k == 0 {
            return Err(RetrievalError::InvalidRequest(
                "top_k must be greater than 0".to_string(),
            ));
        }
        if query.trim().is_empty() {
            return Err(RetrievalError::InvalidRequest(
                "query must not be empty".to_string(),
            ));
        }

        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| RetrievalError::Embedding(format!("{:#}", e)))?;

        let store = &self.store;
        let embedding = embedding.as_slice();
        let mut results = with_retry(self.retry, "Vector search", move || {
            store.search(embedding, lender_filter, top_k)
        })
        .await
        .map_err(|e| RetrievalError::Store(format!("{:#}", e)))?;

        // 안정 정렬 후 자르기
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);

        tracing::debug!(
            "Retrieved {} chunks (top_k: {}, filter: {:?})",
            results.len(),
            top_k,
            lender_filter
        );

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;

    use crate::knowledge::{ChunkRecord, InMemoryVectorStore};
    use crate::testing::{chunk, sample_corpus, FailingEmbedding, HashEmbedding};

    fn retriever_with(embedder: Arc<dyn EmbeddingProvider>) -> Retriever {
        Retriever::new(
            embedder,
            Arc::new(InMemoryVectorStore::with_records(sample_corpus())),
            RetryPolicy::new(2, Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn test_results_bounded_and_sorted() {
        let retriever = retriever_with(Arc::new(HashEmbedding::default()));

        for top_k in [1, 2, 3, 10] {
            let results = retriever
                .retrieve("maximum age for mortgage applications", top_k, None)
                .await
                .unwrap();
            assert!(results.len() <= top_k);
            assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }

    #[tokio::test]
    async fn test_filter_is_exact_match() {
        let retriever = retriever_with(Arc::new(HashEmbedding::default()));

        let results = retriever
            .retrieve("LTV limits", 10, Some("Barclays"))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.lender_name() == "Barclays"));

        let results = retriever
            .retrieve("LTV limits", 10, Some("barclays"))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let retriever = retriever_with(Arc::new(HashEmbedding::default()));

        assert!(matches!(
            retriever.retrieve("age", 0, None).await,
            Err(RetrievalError::InvalidRequest(_))
        ));
        assert!(matches!(
            retriever.retrieve("   ", 5, None).await,
            Err(RetrievalError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_embedding_failure_is_typed_without_extra_retries() {
        let embedder = Arc::new(FailingEmbedding::default());
        let retriever = retriever_with(embedder.clone());

        let err = retriever.retrieve("age", 5, None).await.unwrap_err();
        match err {
            RetrievalError::Embedding(message) => assert!(message.contains("connection refused")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    /// 저장 순서 그대로 돌려주는 저장소 (정렬/자르기 없음, 실패 횟수 지정 가능)
    struct UnsortedStore {
        rows: Vec<ScoredChunk>,
        failures_left: AtomicUsize,
        calls: AtomicUsize,
    }

    impl UnsortedStore {
        fn new(scores: &[f32], failures: usize) -> Self {
            let rows = scores
                .iter()
                .enumerate()
                .map(|(i, &score)| ScoredChunk {
                    record: chunk("Barclays", "barclays_residential.txt", i, None, "LTV limits"),
                    score,
                })
                .collect();
            Self {
                rows,
                failures_left: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VectorStore for UnsortedStore {
        async fn insert(&self, records: &[ChunkRecord]) -> Result<usize> {
            Ok(records.len())
        }

        async fn search(
            &self,
            _embedding: &[f32],
            _lender_filter: Option<&str>,
            _top_k: usize,
        ) -> Result<Vec<ScoredChunk>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("table unavailable");
            }
            Ok(self.rows.clone())
        }

        async fn delete_by_filename(&self, _filename: &str) -> Result<usize> {
            Ok(0)
        }

        async fn count(&self) -> Result<usize> {
            Ok(self.rows.len())
        }

        async fn lender_names(&self) -> Result<Vec<String>> {
            Ok(vec!["Barclays".to_string()])
        }
    }

    fn retriever_over(store: Arc<UnsortedStore>) -> Retriever {
        Retriever::new(
            Arc::new(HashEmbedding::default()),
            store,
            RetryPolicy::new(2, Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn test_retriever_orders_and_truncates_store_rows() {
        let store = Arc::new(UnsortedStore::new(&[0.2, 0.9, 0.5, 0.7, 0.1], 0));
        let retriever = retriever_over(store);

        let results = retriever.retrieve("LTV limits", 3, None).await.unwrap();
        let scores: Vec<f32> = results.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![0.9, 0.7, 0.5]);
        assert_eq!(results[0].record.metadata.chunk_id, "barclays_residential_chunk_000001");
    }

    #[tokio::test]
    async fn test_nan_scores_do_not_break_ordering() {
        let store = Arc::new(UnsortedStore::new(&[0.3, f32::NAN, 0.8, 0.5], 0));
        let retriever = retriever_over(store);

        let results = retriever.retrieve("LTV limits", 4, None).await.unwrap();
        assert_eq!(results.len(), 4);
        let finite: Vec<f32> = results
            .iter()
            .map(|r| r.score)
            .filter(|s| !s.is_nan())
            .collect();
        assert_eq!(finite, vec![0.8, 0.5, 0.3]);
    }

    #[tokio::test]
    async fn test_store_failure_is_retried_then_typed() {
        let store = Arc::new(UnsortedStore::new(&[0.4], 1));
        let retriever = retriever_over(store.clone());
        let results = retriever.retrieve("LTV limits", 5, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);

        let store = Arc::new(UnsortedStore::new(&[0.4], 10));
        let retriever = retriever_over(store.clone());
        let err = retriever.retrieve("LTV limits", 5, None).await.unwrap_err();
        match err {
            RetrievalError::Store(message) => assert!(message.contains("table unavailable")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }
}
