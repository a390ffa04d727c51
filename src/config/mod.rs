//! 설정 모듈
//!
//! 우선순위: 환경변수 > 설정 파일(`config.toml`) > 기본값
//!
//! `.env` 파일은 `dotenvy`로 로드합니다.
//! 설정 파일 위치: `--config <path>` 또는 `<data_dir>/config.toml`

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::lender::{LenderNameNormalizer, CATALOG_FILE_NAME};
use crate::retry::RetryPolicy;

/// 설정 파일 기본 이름
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// 환경변수 이름
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_DATA_DIR: &str = "LENDER_RAG_DATA_DIR";
pub const ENV_CHAT_MODEL: &str = "LENDER_RAG_CHAT_MODEL";
pub const ENV_EMBEDDING_MODEL: &str = "LENDER_RAG_EMBEDDING_MODEL";

// ============================================================================
// Data Directory
// ============================================================================

/// 기본 데이터 디렉토리 (~/.local/share/.lender-criteria-rag 등)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lender-criteria-rag")
}

// ============================================================================
// Config Types
// ============================================================================

/// 전체 애플리케이션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// LanceDB, 레지스트리, 카탈로그가 저장되는 디렉토리
    pub data_dir: PathBuf,
    pub openai: OpenAiConfig,
    pub retrieval: RetrievalConfig,
    pub ingest: IngestConfig,
    pub lenders: LenderConfig,
    pub server: ServerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            openai: OpenAiConfig::default(),
            retrieval: RetrievalConfig::default(),
            ingest: IngestConfig::default(),
            lenders: LenderConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// OpenAI 호환 API 설정
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// API 키 (환경변수에서만 로드, 파일에 저장하지 않음)
    #[serde(skip)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub chat_model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1/".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            embedding_dimension: 1536,
            chat_model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            timeout_secs: 60,
        }
    }
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dimension", &self.embedding_dimension)
            .field("chat_model", &self.chat_model)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl OpenAiConfig {
    /// API 키 존재 여부
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// API 키 (없으면 에러)
    pub fn require_api_key(&self) -> anyhow::Result<&str> {
        match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => anyhow::bail!(
                "API key not found. Set {} environment variable (or add it to .env).",
                ENV_API_KEY
            ),
        }
    }

    /// `base_url` 기준 엔드포인트 URL
    pub fn endpoint(&self, path: &str) -> anyhow::Result<Url> {
        let mut base = self.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)?;
        Ok(base.join(path.trim_start_matches('/'))?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 검색 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// 기본 결과 수
    pub top_k: usize,
    /// 벡터 검색 재시도 횟수
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 15,
            max_retries: 2,
            initial_backoff_ms: 500,
        }
    }
}

impl RetrievalConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.initial_backoff_ms),
        )
    }
}

/// 수집(ingest) 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// 임베딩 배치 크기
    pub batch_size: usize,
    pub min_characters: usize,
    pub max_characters: usize,
    pub overlap_characters: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            min_characters: 300,
            max_characters: 1500,
            overlap_characters: 150,
        }
    }
}

/// 대출기관 이름/카탈로그 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LenderConfig {
    /// 카탈로그 경로 (없으면 `<data_dir>/lender_config.json`)
    pub catalog_path: Option<PathBuf>,
    /// 기본 테이블에 추가할 오버라이드 (정리 결과 → 표시 이름)
    pub overrides: BTreeMap<String, String>,
}

/// HTTP 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl AppConfig {
    /// 설정 로드
    ///
    /// `path`가 없으면 `<data_dir>/config.toml`을 찾고, 그것도 없으면 기본값을 사용합니다.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let env_data_dir = non_empty_env(ENV_DATA_DIR).map(PathBuf::from);

        let config_path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let dir = env_data_dir.clone().unwrap_or_else(default_data_dir);
                let candidate = dir.join(CONFIG_FILE_NAME);
                candidate.exists().then_some(candidate)
            }
        };

        let mut config = match config_path {
            Some(ref p) => Self::from_file(p)?,
            None => Self::default(),
        };

        if let Some(dir) = env_data_dir {
            config.data_dir = dir;
        }
        config.apply_env();
        config.validate()?;

        tracing::debug!("Loaded config: {:?}", config);
        Ok(config)
    }

    /// TOML 파일에서 로드 (환경변수 미적용)
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 환경변수 오버라이드 적용
    fn apply_env(&mut self) {
        self.openai.api_key = non_empty_env(ENV_API_KEY);
        if let Some(url) = non_empty_env(ENV_BASE_URL) {
            self.openai.base_url = url;
        }
        if let Some(model) = non_empty_env(ENV_CHAT_MODEL) {
            self.openai.chat_model = model;
        }
        if let Some(model) = non_empty_env(ENV_EMBEDDING_MODEL) {
            self.openai.embedding_model = model;
        }
    }

    /// 값 검증
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid("retrieval.top_k must be > 0".into()));
        }
        if self.openai.embedding_dimension == 0 {
            return Err(ConfigError::Invalid(
                "openai.embedding_dimension must be > 0".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.openai.temperature) {
            return Err(ConfigError::Invalid(format!(
                "openai.temperature must be between 0 and 2 (got {})",
                self.openai.temperature
            )));
        }
        if Url::parse(&self.openai.base_url).is_err() {
            return Err(ConfigError::Invalid(format!(
                "openai.base_url is not a valid URL: {}",
                self.openai.base_url
            )));
        }
        if self.ingest.batch_size == 0 {
            return Err(ConfigError::Invalid("ingest.batch_size must be > 0".into()));
        }
        if self.ingest.min_characters > self.ingest.max_characters {
            return Err(ConfigError::Invalid(
                "ingest.min_characters must not exceed ingest.max_characters".into(),
            ));
        }
        Ok(())
    }

    /// LanceDB 경로
    pub fn lance_path(&self) -> PathBuf {
        self.data_dir.join("lender_criteria.lance")
    }

    /// 수집 레지스트리 DB 경로
    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("registry.db")
    }

    /// 카탈로그 경로
    pub fn catalog_path(&self) -> PathBuf {
        self.lenders
            .catalog_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(CATALOG_FILE_NAME))
    }

    /// 설정된 오버라이드를 반영한 정규화기
    pub fn normalizer(&self) -> LenderNameNormalizer {
        LenderNameNormalizer::with_extra_overrides(
            self.lenders
                .overrides
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        )
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Tests
// ============================================================================
