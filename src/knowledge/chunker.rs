//! Text Chunking Module
//!
//! 심사기준 문서를 섹션 단위로 나누고, 긴 섹션은 문단/줄 경계에서 다시 분할합니다.
//! 각 청크는 자신이 속한 섹션 제목(`criteria_section`)을 함께 가집니다.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::IngestConfig;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkConfig {
    /// 최소 청크 크기 (문자 수)
    pub min_characters: usize,
    /// 최대 청크 크기 (문자 수)
    pub max_characters: usize,
    /// 오버랩 크기 (문자 수)
    pub overlap_characters: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self::for_rag()
    }
}

impl ChunkConfig {
    /// RAG 최적화된 설정
    pub fn for_rag() -> Self {
        Self {
            min_characters: 300,
            max_characters: 1500,
            overlap_characters: 150,
        }
    }
}

impl From<&IngestConfig> for ChunkConfig {
    fn from(config: &IngestConfig) -> Self {
        Self {
            min_characters: config.min_characters,
            max_characters: config.max_characters,
            overlap_characters: config.overlap_characters,
        }
    }
}

/// 섹션 제목이 붙은 청크
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub text: String,
    pub section: Option<String>,
}

// ============================================================================
// CriteriaChunker
// ============================================================================

/// 심사기준 문서 청커
///
/// - Markdown 헤더(`#`~`######`)와 짧은 대문자 줄(`AGE LIMITS`)을 섹션 경계로 인식
/// - 섹션이 `max_characters`를 넘으면 문단, 그 다음 줄 경계에서 분할
/// - 같은 섹션 안에서만 작은 청크를 병합
/// - 이전 청크 끝부분을 다음 청크 앞에 오버랩으로 붙임
pub struct CriteriaChunker {
    config: ChunkConfig,
}

struct Section {
    title: Option<String>,
    body: String,
}

fn markdown_header() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#{1,6}\s+(.+?)\s*#*\s*$").ok())
        .as_ref()
}

/// 대문자 제목 줄 (최대 60자, 글자 2개 이상, 소문자 없음)
fn caps_heading(line: &str) -> Option<String> {
    let trimmed = line.trim().trim_end_matches(':').trim();
    if trimmed.is_empty() || trimmed.chars().count() > 60 {
        return None;
    }

    let letters = trimmed.chars().filter(|c| c.is_alphabetic()).count();
    if letters < 2 || trimmed.chars().any(|c| c.is_lowercase()) {
        return None;
    }

    Some(title_case(trimmed))
}

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn heading_of(line: &str) -> Option<String> {
    if let Some(caps) = markdown_header().and_then(|re| re.captures(line.trim_end())) {
        return caps.get(1).map(|m| m.as_str().trim().to_string());
    }
    caps_heading(line)
}

impl CriteriaChunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// 텍스트를 청크로 분할 (순서 유지)
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        if text.trim().is_empty() {
            return vec![];
        }

        let mut chunks = Vec::new();
        for section in self.split_sections(text) {
            let pieces = self.merge_small_chunks(self.split_long_section(&section.body));
            chunks.extend(pieces.into_iter().map(|piece| TextChunk {
                text: piece,
                section: section.title.clone(),
            }));
        }

        chunks.retain(|c| !c.text.trim().is_empty());
        self.apply_overlap(chunks)
    }

    /// 제목 줄을 기준으로 섹션 분할 (코드 블록 내부는 무시)
    fn split_sections(&self, text: &str) -> Vec<Section> {
        let mut sections = Vec::new();
        let mut current = Section {
            title: None,
            body: String::new(),
        };
        let mut in_code_block = false;

        for line in text.lines() {
            if line.trim_start().starts_with("```") {
                in_code_block = !in_code_block;
            }

            let heading = if in_code_block { None } else { heading_of(line) };

            if let Some(title) = heading {
                if !current.body.trim().is_empty() {
                    sections.push(current);
                }
                current = Section {
                    title: Some(title),
                    body: String::new(),
                };
            }

            current.body.push_str(line);
            current.body.push('\n');
        }

        if !current.body.trim().is_empty() {
            sections.push(current);
        }

        for section in &mut sections {
            section.body = section.body.trim().to_string();
        }
        sections
    }

    /// 긴 섹션을 문단 경계에서 분할
    fn split_long_section(&self, section: &str) -> Vec<String> {
        let max = self.config.max_characters;
        if section.len() <= max {
            return vec![section.to_string()];
        }

        let mut chunks = Vec::new();
        let mut current = String::new();

        for para in section.split("\n\n") {
            let para = para.trim();
            if para.is_empty() {
                continue;
            }

            if !current.is_empty() && current.len() + para.len() + 2 > max {
                chunks.push(std::mem::take(&mut current));
            }

            if para.len() > max {
                // 긴 문단은 줄 단위로
                for line in para.lines() {
                    for piece in split_hard(line, max) {
                        if !current.is_empty() && current.len() + piece.len() + 1 > max {
                            chunks.push(std::mem::take(&mut current));
                        }
                        if !current.is_empty() {
                            current.push('\n');
                        }
                        current.push_str(piece);
                    }
                }
            } else {
                if !current.is_empty() {
                    current.push_str("\n\n");
                }
                current.push_str(para);
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
    }

    /// 작은 청크 병합 (같은 섹션 안에서만 호출됨)
    fn merge_small_chunks(&self, chunks: Vec<String>) -> Vec<String> {
        if self.config.min_characters == 0 {
            return chunks;
        }

        let mut result: Vec<String> = Vec::new();

        for chunk in chunks {
            if let Some(last) = result.last_mut() {
                if last.len() < self.config.min_characters
                    && last.len() + chunk.len() + 2 <= self.config.max_characters
                {
                    last.push_str("\n\n");
                    last.push_str(&chunk);
                    continue;
                }
            }
            result.push(chunk);
        }

        result
    }

    /// 오버랩 적용: `...{이전 청크 끝}\n\n{청크}`
    fn apply_overlap(&self, chunks: Vec<TextChunk>) -> Vec<TextChunk> {
        if self.config.overlap_characters == 0 || chunks.len() < 2 {
            return chunks;
        }

        let mut result = Vec::with_capacity(chunks.len());

        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                result.push(chunk.clone());
                continue;
            }

            let prev = &chunks[i - 1].text;
            let overlap_start = floor_char_boundary(
                prev,
                prev.len().saturating_sub(self.config.overlap_characters),
            );

            // 단어 경계에서 시작
            let overlap_text = &prev[overlap_start..];
            let word_start = overlap_text
                .char_indices()
                .find(|(_, c)| c.is_whitespace())
                .map(|(p, c)| overlap_start + p + c.len_utf8())
                .unwrap_or(overlap_start);
            let overlap = prev[word_start..].trim();

            if overlap.len() > 20 {
                result.push(TextChunk {
                    text: format!("...{}\n\n{}", overlap, chunk.text),
                    section: chunk.section.clone(),
                });
            } else {
                result.push(chunk.clone());
            }
        }

        result
    }
}

impl Default for CriteriaChunker {
    fn default() -> Self {
        Self::new(ChunkConfig::default())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// UTF-8 경계 조정 (인덱스 이하로)
#[inline]
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        s.len()
    } else {
        let mut i = index;
        while i > 0 && !s.is_char_boundary(i) {
            i -= 1;
        }
        i
    }
}

/// 한 줄이 `max`보다 길면 문자 경계에서 강제로 자름
fn split_hard(line: &str, max: usize) -> Vec<&str> {
    if line.len() <= max || max == 0 {
        return vec![line];
    }

    let mut pieces = Vec::new();
    let mut rest = line;
    while rest.len() > max {
        let mut cut = floor_char_boundary(rest, max);
        if cut == 0 {
            cut = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
        }
        let (head, tail) = rest.split_at(cut);
        pieces.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

// ============================================================================
// Tests
// ============================================================================
