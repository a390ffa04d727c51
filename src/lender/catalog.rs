//! 대출기관 카탈로그 (`lender_config.json`)
//!
//! 카테고리별 원시 식별자 목록입니다. 표현 계층(CLI, HTTP)에서
//! 필터 선택지를 채우는 용도로만 사용하며, 검색 코어는 참조하지 않습니다.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::normalizer::LenderNameNormalizer;

/// 카탈로그 파일 기본 이름
pub const CATALOG_FILE_NAME: &str = "lender_config.json";

/// 대출기관 카탈로그
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LenderCatalog {
    /// 카테고리 → 원시 식별자 (보통 파일명)
    pub lender_categories: BTreeMap<String, Vec<String>>,

    /// 파일 집계 정보 (선택)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lender_files_config: Option<LenderFilesConfig>,

    /// 알 수 없는 키 (저장 시 그대로 보존)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// 파일 집계 정보
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LenderFilesConfig {
    #[serde(default)]
    pub total_files: Option<usize>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl LenderCatalog {
    /// JSON 파일에서 로드
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lender catalog: {:?}", path))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse lender catalog: {:?}", path))
    }

    /// 파일이 있으면 로드, 없으면 `None`
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            tracing::debug!("No lender catalog at {:?}", path);
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Invalid lender catalog JSON")
    }

    /// JSON 파일로 저장 (들여쓰기 포함)
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize lender catalog")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write lender catalog: {:?}", path))
    }

    /// 수집 후 파일 집계 갱신
    pub fn record_ingest(&mut self, total_files: usize, date: NaiveDate) {
        let files = self.lender_files_config.get_or_insert_with(Default::default);
        files.total_files = Some(total_files);
        files.last_updated = Some(date.format("%Y-%m-%d").to_string());
    }

    /// 모든 원시 식별자 (카테고리 순서, 중복 포함)
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.lender_categories
            .values()
            .flat_map(|ids| ids.iter().map(String::as_str))
    }

    /// 전체 대출기관 수 (카테고리 합계)
    pub fn total_lenders(&self) -> usize {
        self.lender_categories.values().map(Vec::len).sum()
    }

    /// 원시 식별자가 속한 카테고리
    pub fn category_of(&self, identifier: &str) -> Option<&str> {
        self.lender_categories
            .iter()
            .find(|(_, ids)| ids.iter().any(|id| id == identifier))
            .map(|(category, _)| category.as_str())
    }

    /// 정렬/중복 제거된 표시 이름 목록 (필터 선택지용)
    pub fn display_names(&self, normalizer: &LenderNameNormalizer) -> Vec<String> {
        self.identifiers()
            .map(|id| normalizer.normalize(id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
