//! RAG 모듈 - 심사기준 질의응답 코어
//!
//! Retriever → ContextAssembler → AnswerGenerator 순서로 한 번씩 호출됩니다.

mod assistant;
mod context;
mod generator;
mod retriever;

pub use assistant::{
    render_answer, Answer, CriteriaAssistant, QueryOutcome, DEFAULT_TOP_K, NO_RESULTS_MESSAGE,
};
pub use context::{ContextAssembler, DEFAULT_SECTION, NO_CONTEXT};
pub use generator::{build_system_prompt, AnswerGenerator, DEFAULT_TEMPERATURE};
pub use retriever::Retriever;
