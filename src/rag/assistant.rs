//! Criteria Assistant - 검색 → 컨텍스트 → 생성 파이프라인
//!
//! 표현 계층(CLI, HTTP)은 이 타입만 사용합니다.
//! 검색 실패는 빈 결과 + 진단 메시지로, 빈 결과는 생성 호출 없이 `NoResults`로 끝납니다.

use super::context::{ContextAssembler, NO_CONTEXT};
use super::generator::AnswerGenerator;
use super::retriever::Retriever;
use crate::error::{GenerationError, RetrievalError};
use crate::knowledge::ScoredChunk;
use crate::llm::ChatMessage;

/// 기본 검색 결과 수
pub const DEFAULT_TOP_K: usize = 15;

/// 결과가 없을 때 사용자에게 보여줄 문구
pub const NO_RESULTS_MESSAGE: &str =
    "No relevant criteria found. Try rephrasing your question or check if the criteria exists.";

/// 질의 결과 답변
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Generated(String),
    NoResults,
    Failed(GenerationError),
}

impl Answer {
    pub fn is_generated(&self) -> bool {
        matches!(self, Answer::Generated(_))
    }
}

/// 사용자에게 보여줄 답변 텍스트
pub fn render_answer(answer: &Answer) -> String {
    match answer {
        Answer::Generated(text) => text.clone(),
        Answer::NoResults => NO_RESULTS_MESSAGE.to_string(),
        Answer::Failed(err) => format!("Error generating response: {}", err),
    }
}

/// `answer_query` 결과
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub answer: Answer,
    /// 근거로 사용한 검색 결과
    pub results: Vec<ScoredChunk>,
    /// LLM에 전달한 컨텍스트 (결과가 없으면 `NO_CONTEXT`)
    pub context: String,
    /// 검색 실패 시 원인
    pub diagnostic: Option<String>,
}

pub struct CriteriaAssistant {
    retriever: Retriever,
    assembler: ContextAssembler,
    generator: AnswerGenerator,
}

impl CriteriaAssistant {
    pub fn new(retriever: Retriever, assembler: ContextAssembler, generator: AnswerGenerator) -> Self {
        Self {
            retriever,
            assembler,
            generator,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn assembler(&self) -> &ContextAssembler {
        &self.assembler
    }

    /// 검색만 수행
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        lender_filter: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        self.retriever.retrieve(query, top_k, lender_filter).await
    }

    /// 질의에 답변
    pub async fn answer_query(
        &self,
        conversation: &[ChatMessage],
        query: &str,
        lender_filter: Option<&str>,
        top_k: usize,
    ) -> QueryOutcome {
        let (results, diagnostic) = match self.search(query, top_k, lender_filter).await {
            Ok(results) => (results, None),
            Err(e) => {
                tracing::warn!("Retrieval failed: {}", e);
                (Vec::new(), Some(e.to_string()))
            }
        };

        if results.is_empty() {
            return QueryOutcome {
                answer: Answer::NoResults,
                results,
                context: NO_CONTEXT.to_string(),
                diagnostic,
            };
        }

        let context = self.assembler.assemble(&results);

        let answer = match self.generator.generate(conversation, &context, query).await {
            Ok(text) => Answer::Generated(text),
            Err(e) => {
                tracing::warn!("Generation failed: {}", e);
                Answer::Failed(e)
            }
        };

        QueryOutcome {
            answer,
            results,
            context,
            diagnostic,
        }
    }
}
