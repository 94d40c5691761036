/// Additive scoring weights. Each signal is independent; the total is their sum.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringWeights {
    /// Length signal for 6-digit candidates (the most common real-world format)
    pub length_six: f64,
    /// Length signal for 4-digit candidates
    pub length_four: f64,
    /// Length signal for any other length
    pub length_other: f64,

    /// Added once per context keyword present in the text (not capped)
    pub context_per_keyword: f64,

    pub digits_only: f64,
    pub digits_mixed: f64,

    /// Proximity score is `1 / (1 + distance / proximity_scale_chars)`
    pub proximity_scale_chars: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            length_six: 1.0,
            length_four: 0.8,
            length_other: 0.5,
            context_per_keyword: 1.0,
            digits_only: 1.0,
            digits_mixed: 0.2,
            proximity_scale_chars: 10.0,
        }
    }
}

/// Configuration for candidate generation and selection.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub min_code_len: usize,
    pub max_code_len: usize,

    /// Keywords anchoring the pattern strategy, tried in order
    pub prefix_keywords: Vec<String>,

    /// Keywords feeding the context and proximity signals
    pub context_keywords: Vec<String>,

    pub weights: ScoringWeights,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_code_len: 4,
            max_code_len: 8,
            prefix_keywords: to_owned(&[
                "验证码", "code", "verification", "验证", "校验码", "認証", "인증", "コード",
            ]),
            context_keywords: to_owned(&[
                "验证码", "code", "verification", "認証", "인증", "コード",
            ]),
            weights: ScoringWeights::default(),
        }
    }
}

fn to_owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}
