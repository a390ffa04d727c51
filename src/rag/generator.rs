//! Answer Generator - 근거 컨텍스트로 한 번의 채팅 완성 요청
//!
//! 시스템 메시지 하나(고정 템플릿 + 질의 + 전체 컨텍스트)를 대화 앞에 붙입니다.

use std::sync::Arc;

use crate::error::GenerationError;
use crate::llm::{ChatMessage, ChatProvider, ChatRole};

/// 기본 temperature (일관된 답변)
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are an expert mortgage advisor AI assistant with access to comprehensive UK mortgage lender criteria from 30+ major lenders.

Your role is to provide 100% accurate answers based ONLY on the provided lender criteria. You must:

1. **ALWAYS cite the specific lender name** when providing information
2. **Use ONLY the provided criteria** - never make assumptions
3. **Be precise and accurate** with all numbers, percentages, and requirements
4. **Group responses by lender** for clarity
5. **Provide complete, readable information** - don't truncate mid-sentence
6. **If criteria differs between lenders, clearly show the differences**

Current query: {query}

Available criteria context:
{context}

IMPORTANT INSTRUCTIONS:
- Only use the information provided in the context
- If the context doesn't contain the specific information requested, say so clearly
- Never guess or provide generic mortgage advice
- Format your response professionally with clear lender attribution
- Group information by lender for easy reading
- Provide complete sentences and complete information
- Do NOT include file names, source paths, or technical metadata in your response
- Focus on the actual mortgage criteria content

Format your response like this:
🏦 [Lender Name]
[Complete, readable criteria information]

🏦 [Next Lender Name]
[Complete, readable criteria information]

And so on..."#;

/// 시스템 프롬프트 생성
pub fn build_system_prompt(query: &str, context: &str) -> String {
    // context 안의 `{query}`가 다시 치환되지 않도록 query 먼저
    SYSTEM_PROMPT_TEMPLATE
        .replacen("{query}", query, 1)
        .replacen("{context}", context, 1)
}

pub struct AnswerGenerator {
    chat: Arc<dyn ChatProvider>,
    temperature: f32,
}

impl AnswerGenerator {
    pub fn new(chat: Arc<dyn ChatProvider>, temperature: f32) -> Self {
        Self { chat, temperature }
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// 답변 생성
    ///
    /// `conversation`이 현재 질의(user)로 끝나지 않으면 질의를 덧붙여 보냅니다.
    /// 모델 텍스트는 그대로 반환합니다.
    pub async fn generate(
        &self,
        conversation: &[ChatMessage],
        context: &str,
        query: &str,
    ) -> Result<String, GenerationError> {
        let mut messages = Vec::with_capacity(conversation.len() + 2);
        messages.push(ChatMessage::system(build_system_prompt(query, context)));
        messages.extend(conversation.iter().cloned());

        let ends_with_query = conversation
            .last()
            .is_some_and(|m| m.role == ChatRole::User && m.content == query);
        if !ends_with_query {
            messages.push(ChatMessage::user(query));
        }

        let text = self
            .chat
            .complete(&messages, self.temperature)
            .await
            .map_err(|e| GenerationError::Request(format!("{:#}", e)))?;

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        Ok(text)
    }
}
