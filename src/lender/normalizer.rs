//! 대출기관 이름 정규화
//!
//! 파일명에서 유래한 원시 식별자(`barclays_residential.txt` 등)를
//! 사람이 읽을 수 있는 표시 이름(`Barclays`)으로 변환합니다.
//!
//! 순서가 고정된 정리 단계를 적용한 뒤, 알려진 잘못된 결과를
//! 주입 가능한 오버라이드 테이블로 교정합니다.

use std::collections::HashMap;

/// 1단계에서 제거할 패턴 (순서 고정)
pub const SUFFIX_PATTERNS: [&str; 7] = [
    "_residential.txt",
    "_residential.pdf",
    "_res",
    "_bank",
    "_building_society",
    "_mortgage",
    "_criteria",
];

/// 3단계에서 제거할 단독 단어
const RESIDUAL_WORDS: [&str; 2] = ["Residential", "Res"];

/// 3단계에서 제거할 파일 확장자 (대소문자 무시)
const FILE_EXTENSIONS: [&str; 3] = [".txt", ".pdf", ".md"];

/// 원시 이름이 비어있을 때의 표시 이름
pub const UNKNOWN_LENDER: &str = "Unknown Lender";

/// 기본 오버라이드 테이블 (정리 결과 → 표시 이름)
pub fn default_overrides() -> HashMap<String, String> {
    [
        ("Hsbcidential 1", "HSBC"),
        ("Skipton", "Skipton Building Society"),
        ("Halifaxidentialing Services", "Halifax"),
        ("Santanderidential 1", "Santander"),
    ]
    .into_iter()
    .map(|(from, to)| (from.to_string(), to.to_string()))
    .collect()
}

/// 대출기관 이름 정규화기
///
/// 순수 함수이며 상태를 갖지 않습니다 (오버라이드 테이블만 보유).
#[derive(Debug, Clone)]
pub struct LenderNameNormalizer {
    overrides: HashMap<String, String>,
}

impl Default for LenderNameNormalizer {
    fn default() -> Self {
        Self::new(default_overrides())
    }
}

impl LenderNameNormalizer {
    /// 오버라이드 테이블을 지정하여 생성
    pub fn new(overrides: HashMap<String, String>) -> Self {
        Self { overrides }
    }

    /// 기본 테이블에 추가 오버라이드를 병합하여 생성
    ///
    /// 같은 키는 `extra` 쪽이 우선합니다.
    pub fn with_extra_overrides<I>(extra: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut overrides = default_overrides();
        overrides.extend(extra);
        Self::new(overrides)
    }

    /// 오버라이드 테이블 조회
    pub fn overrides(&self) -> &HashMap<String, String> {
        &self.overrides
    }

    /// 원시 이름을 표시 이름으로 변환
    ///
    /// 빈 문자열을 반환하지 않습니다.
    pub fn normalize(&self, raw: &str) -> String {
        let cleaned = clean_name(raw);

        if let Some(fixed) = self.overrides.get(&cleaned) {
            return fixed.clone();
        }

        if cleaned.is_empty() {
            let fallback = raw.trim();
            if fallback.is_empty() {
                return UNKNOWN_LENDER.to_string();
            }
            tracing::warn!("Lender name '{}' normalized to nothing, using raw name", raw);
            return fallback.to_string();
        }

        if looks_garbled(&cleaned) {
            tracing::warn!(
                "Lender name '{}' normalized to '{}' which looks garbled; consider adding an override",
                raw,
                cleaned
            );
        }

        cleaned
    }
}

/// 1~4단계 정리
fn clean_name(raw: &str) -> String {
    // 1. 접미 패턴 제거
    let mut name = raw.trim().to_string();
    for pattern in SUFFIX_PATTERNS {
        name = name.replace(pattern, "");
    }

    // 2. 밑줄 → 공백, 토큰 첫 글자 대문자
    let name = name
        .replace('_', " ")
        .split_whitespace()
        .map(capitalize_first)
        .collect::<Vec<_>>()
        .join(" ");

    // 3. 끝 마침표와 확장자 제거 (더 벗길 것이 없을 때까지), 잔여 단어 제거
    let name = strip_trailing_extensions(&name);

    // 4. 공백 정리
    name.split_whitespace()
        .filter(|word| !RESIDUAL_WORDS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_trailing_extensions(name: &str) -> &str {
    let mut current = name;
    loop {
        let next = strip_extension(current.trim_end().trim_end_matches('.').trim_end());
        if next == current {
            return current;
        }
        current = next;
    }
}

fn capitalize_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn strip_extension(name: &str) -> &str {
    let lower = name.to_ascii_lowercase();
    FILE_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map(|ext| &name[..name.len() - ext.len()])
        .unwrap_or(name)
}

/// 오버라이드 후보로 보이는 결과인지 판단
fn looks_garbled(name: &str) -> bool {
    name.to_ascii_lowercase().contains("idential")
        || name.contains('.')
        || name.chars().any(|c| c.is_ascii_digit())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(raw: &str) -> String {
        LenderNameNormalizer::default().normalize(raw)
    }

    #[test]
    fn test_residential_text_file() {
        assert_eq!(normalize("barclays_residential.txt"), "Barclays");
        assert_eq!(normalize("natwest_residential.pdf"), "Natwest");
    }

    #[test]
    fn test_building_society_override() {
        assert_eq!(
            normalize("skipton_building_society.pdf"),
            "Skipton Building Society"
        );
    }

    #[test]
    fn test_garbled_names_are_overridden() {
        assert_eq!(normalize("hsbc_residential_1.txt"), "HSBC");
        assert_eq!(normalize("santander_residential_1.txt"), "Santander");
    }

    #[test]
    fn test_multiple_suffixes() {
        assert_eq!(
            normalize("nationwide_building_society_residential.txt"),
            "Nationwide"
        );
        assert_eq!(normalize("coventry_building_society_criteria.pdf"), "Coventry");
        assert_eq!(normalize("metro_bank_mortgage"), "Metro");
    }

    #[test]
    fn test_multi_word_names() {
        assert_eq!(normalize("virgin_money"), "Virgin Money");
        assert_eq!(normalize("the_mortgage_works"), "The Works");
        assert_eq!(normalize("bank_of_ireland"), "Bank Of Ireland");
    }

    #[test]
    fn test_residual_words_removed() {
        assert_eq!(normalize("Leeds Residential"), "Leeds");
        assert_eq!(normalize("Leeds Res criteria."), "Leeds Criteria");
        // 단어 일부인 경우는 유지
        assert_eq!(normalize("Resolute Finance"), "Resolute Finance");
    }

    #[test]
    fn test_whitespace_collapsed() {
        assert_eq!(normalize("  accord   mortgages  "), "Accord Mortgages");
    }

    #[test]
    fn test_never_empty() {
        assert_eq!(normalize("res"), "res");
        assert_eq!(normalize("Residential"), "Residential");
        assert_eq!(normalize(""), UNKNOWN_LENDER);
        assert_eq!(normalize("   "), UNKNOWN_LENDER);

        for raw in ["_res", "_bank", ".", "_residential.txt", "x"] {
            assert!(!normalize(raw).is_empty(), "empty for {:?}", raw);
        }
    }

    #[test]
    fn test_idempotent() {
        for raw in [
            "barclays_residential.txt",
            "skipton_building_society.pdf",
            "hsbc_residential_1.txt",
            "virgin_money",
            "res",
            "Kensington 2",
            "a.txt.",
            "a..txt",
            "coventry residential.pdf",
            "leeds.md.txt",
        ] {
            let once = normalize(raw);
            let twice = normalize(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_trailing_dot_before_extension() {
        assert_eq!(normalize("a.txt."), "A");
        assert_eq!(normalize("coventry.pdf. "), "Coventry");
        assert_eq!(normalize("Kensington Ltd."), "Kensington Ltd");
    }

    #[test]
    fn test_deterministic() {
        let normalizer = LenderNameNormalizer::default();
        assert_eq!(
            normalizer.normalize("halifax_residential.txt"),
            normalizer.normalize("halifax_residential.txt")
        );
    }

    #[test]
    fn test_extra_overrides() {
        let normalizer = LenderNameNormalizer::with_extra_overrides([(
            "Tsb".to_string(),
            "TSB".to_string(),
        )]);
        assert_eq!(normalizer.normalize("tsb_bank_residential.txt"), "TSB");
        // 기본 테이블 유지
        assert_eq!(normalizer.normalize("skipton.pdf"), "Skipton Building Society");
    }

    #[test]
    fn test_override_requires_exact_match() {
        assert_eq!(normalize("skipton_international"), "Skipton International");
    }

    #[test]
    fn test_first_letter_only_capitalized() {
        assert_eq!(normalize("HSBC"), "HSBC");
        assert_eq!(normalize("tsb"), "Tsb");
    }
}
