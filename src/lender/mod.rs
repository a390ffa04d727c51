//! Lender 모듈 - 대출기관 이름 정규화 및 카탈로그

mod catalog;
mod normalizer;

pub use catalog::{LenderCatalog, LenderFilesConfig, CATALOG_FILE_NAME};
pub use normalizer::{default_overrides, LenderNameNormalizer, SUFFIX_PATTERNS, UNKNOWN_LENDER};
