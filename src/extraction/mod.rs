//! Verification-code extraction: normalize, generate candidates, score, select.

pub mod candidates;
pub mod config;
pub mod normalize;
pub mod scoring;

use anyhow::Result;

pub use candidates::CandidateGenerator;
pub use config::{ExtractionConfig, ScoringWeights};
pub use normalize::normalize;
pub use scoring::{score_candidate, score_candidates, select, CandidateScore, ScoredCandidate};

/// Full text → code pipeline.
///
/// When AI detection is enabled the tokenized strategy runs first; the keyword pattern
/// strategy is the deterministic fallback whenever the first finds nothing.
#[derive(Debug, Clone)]
pub struct CodeExtractor {
    config: ExtractionConfig,
    generator: CandidateGenerator,
    ai_enabled: bool,
}

impl CodeExtractor {
    pub fn new(config: ExtractionConfig, ai_enabled: bool) -> Result<Self> {
        let generator = CandidateGenerator::new(&config)?;
        Ok(Self {
            config,
            generator,
            ai_enabled,
        })
    }

    pub fn ai_enabled(&self) -> bool {
        self.ai_enabled
    }

    pub fn set_ai_enabled(&mut self, enabled: bool) {
        self.ai_enabled = enabled;
    }

    /// Candidates in strategy priority order; the first non-empty strategy wins.
    pub fn generate(&self, normalized: &str) -> Vec<String> {
        if self.ai_enabled {
            let tokens = self.generator.tokenized(normalized);
            if !tokens.is_empty() {
                return tokens;
            }
        }
        self.generator.pattern(normalized)
    }

    pub fn extract(&self, text: &str) -> Option<String> {
        let normalized = normalize(text);
        let candidates = self.generate(&normalized);
        select(&candidates, &normalized, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn both_modes() -> [CodeExtractor; 2] {
        let config = ExtractionConfig::default();
        [
            CodeExtractor::new(config.clone(), false).unwrap(),
            CodeExtractor::new(config, true).unwrap(),
        ]
    }

    #[test]
    fn extracts_code_from_english_sentence() {
        let text = "Your verification code is 482913, valid for 10 minutes";
        for extractor in both_modes() {
            assert_eq!(extractor.generate(&normalize(text)), vec!["482913"]);
            assert_eq!(extractor.extract(text), Some("482913".into()));
        }
    }

    #[test]
    fn extracts_code_from_full_width_digits() {
        let text = "验证码：４８２９１３";
        assert_eq!(normalize(text), "验证码：482913");
        for extractor in both_modes() {
            assert_eq!(extractor.extract(text), Some("482913".into()));
        }
    }

    #[test]
    fn returns_none_without_code() {
        for extractor in both_modes() {
            assert_eq!(extractor.extract("Lunch at 12?"), None);
            assert_eq!(extractor.extract(""), None);
        }
    }

    #[test]
    fn single_digit_run_is_always_selected() {
        let texts = [
            "4821",
            "ref:1234567 thanks",
            "验证码482913请勿泄露",
            "abc99887766xyz",
            "Your PIN is 0000 ok",
            "コード 12345678",
            "use 123 or 45 then 909090",
        ];
        let expected = ["4821", "1234567", "482913", "99887766", "0000", "12345678", "909090"];
        for extractor in both_modes() {
            for (text, want) in texts.iter().zip(expected) {
                assert_eq!(extractor.extract(text).as_deref(), Some(want), "text {text:?}");
            }
        }
    }

    #[test]
    fn ai_mode_prefers_best_scored_token() {
        let extractor = CodeExtractor::new(ExtractionConfig::default(), true).unwrap();
        // Pattern strategy would stop at the first run after "code"; scoring prefers the
        // 6-digit token.
        assert_eq!(
            extractor.extract("code sent to 5678, your code 246810"),
            Some("246810".into())
        );
    }
}
