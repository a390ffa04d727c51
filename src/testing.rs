//! 테스트 전용 가짜 프로바이더

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::knowledge::{make_chunk_id, ChunkMetadata, ChunkRecord, SourceType};
use crate::llm::{ChatMessage, ChatProvider};

pub const TEST_DIMENSION: usize = 64;

/// 단어 해시 bag-of-words 임베딩 (결정적, 공통 단어가 많을수록 유사)
#[derive(Default)]
pub struct HashEmbedding {
    pub calls: AtomicUsize,
}

impl HashEmbedding {
    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; TEST_DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() as usize) % TEST_DIMENSION] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector_for(text))
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    fn name(&self) -> &str {
        "hash-embedding"
    }
}

/// 항상 실패하는 임베딩
#[derive(Default)]
pub struct FailingEmbedding {
    pub calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("connection refused")
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    fn name(&self) -> &str {
        "failing-embedding"
    }
}

/// 고정 응답 채팅 (호출 기록)
pub struct FakeChat {
    reply: Result<String, String>,
    pub calls: AtomicUsize,
    pub last_messages: Mutex<Vec<ChatMessage>>,
}

impl FakeChat {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatProvider for FakeChat {
    async fn complete(&self, messages: &[ChatMessage], _temperature: f32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_messages.lock() {
            *last = messages.to_vec();
        }
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(anyhow::anyhow!("{}", message)),
        }
    }

    fn name(&self) -> &str {
        "fake-chat"
    }
}

/// 해시 임베딩이 붙은 청크 레코드
pub fn chunk(lender: &str, filename: &str, index: usize, section: Option<&str>, text: &str) -> ChunkRecord {
    ChunkRecord {
        text: text.to_string(),
        metadata: ChunkMetadata {
            chunk_id: make_chunk_id(filename, index),
            criteria_section: section.map(str::to_string),
            filename: filename.to_string(),
            lender_name: lender.to_string(),
            page_numbers: None,
            source_type: SourceType::from_filename(filename),
        },
        vector: HashEmbedding::vector_for(text),
    }
}

/// 대출기관 3곳의 작은 심사기준 코퍼스
pub fn sample_corpus() -> Vec<ChunkRecord> {
    vec![
        chunk(
            "Barclays",
            "barclays_residential.txt",
            0,
            Some("Age Limits"),
            "Maximum age for mortgage applications is 70 at application and 75 at end of term.",
        ),
        chunk(
            "Barclays",
            "barclays_residential.txt",
            1,
            Some("Loan To Value"),
            "LTV limits: maximum 95% LTV for purchases, 90% LTV for remortgages.",
        ),
        chunk(
            "HSBC",
            "hsbc_residential_1.txt",
            0,
            Some("Age Limits"),
            "Minimum age 18. Maximum age at end of mortgage term is 75 for applications.",
        ),
        chunk(
            "HSBC",
            "hsbc_residential_1.txt",
            1,
            None,
            "LTV limits for new build flats are 85% LTV.",
        ),
        chunk(
            "Nationwide",
            "nationwide_building_society_residential.txt",
            0,
            Some("Income"),
            "Self employed applicants need two years of accounts.",
        ),
    ]
}
