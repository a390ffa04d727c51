//! Context Assembler - 검색 결과를 LLM 근거 텍스트로 변환

use crate::knowledge::ScoredChunk;
use crate::lender::LenderNameNormalizer;

/// 결과가 없을 때의 컨텍스트
pub const NO_CONTEXT: &str = "No relevant criteria found.";

/// 섹션이 없는 청크의 기본 섹션명
pub const DEFAULT_SECTION: &str = "General Criteria";

#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    normalizer: LenderNameNormalizer,
}

impl ContextAssembler {
    pub fn new(normalizer: LenderNameNormalizer) -> Self {
        Self { normalizer }
    }

    pub fn normalizer(&self) -> &LenderNameNormalizer {
        &self.normalizer
    }

    /// 결과 하나당 `LENDER/SECTION/CRITERIA/---` 블록, 입력 순서 유지
    pub fn assemble(&self, results: &[ScoredChunk]) -> String {
        if results.is_empty() {
            return NO_CONTEXT.to_string();
        }

        results
            .iter()
            .map(|result| self.block(result))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn block(&self, result: &ScoredChunk) -> String {
        let metadata = &result.record.metadata;
        let section = metadata
            .criteria_section
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_SECTION);

        format!(
            "\nLENDER: {}\nSECTION: {}\nCRITERIA: {}\n---\n",
            self.normalizer.normalize(&metadata.lender_name),
            section,
            result.record.text
        )
    }
}
