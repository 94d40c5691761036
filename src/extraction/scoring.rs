use super::config::{ExtractionConfig, ScoringWeights};

/// Per-signal breakdown of a candidate's score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateScore {
    pub length: f64,
    pub context: f64,
    pub purity: f64,
    pub proximity: f64,
}

impl CandidateScore {
    pub fn total(&self) -> f64 {
        self.length + self.context + self.purity + self.proximity
    }
}

/// A candidate paired with its score. Lives only for one extraction call.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub text: String,
    pub score: CandidateScore,
}

/// Keyword matches in the original text, computed once per selection. Positions are
/// character indices; matching folds case one character at a time.
struct ScoringContext {
    chars: Vec<char>,
    matched_keywords: usize,
    keyword_ends: Vec<usize>,
}

impl ScoringContext {
    fn new(text: &str, keywords: &[String]) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let mut matched_keywords = 0;
        let mut keyword_ends = Vec::new();
        for keyword in keywords.iter().filter(|keyword| !keyword.is_empty()) {
            let needle: Vec<char> = keyword.chars().collect();
            let starts = occurrences(&chars, &needle);
            if !starts.is_empty() {
                matched_keywords += 1;
            }
            keyword_ends.extend(starts.into_iter().map(|start| start + needle.len()));
        }
        Self {
            chars,
            matched_keywords,
            keyword_ends,
        }
    }
}

fn chars_match(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Start index of every case-insensitive occurrence of `needle`.
fn occurrences(haystack: &[char], needle: &[char]) -> Vec<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return Vec::new();
    }
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(|(_, window)| window.iter().zip(needle).all(|(a, b)| chars_match(*a, *b)))
        .map(|(start, _)| start)
        .collect()
}

/// Score every candidate, keeping input order.
pub fn score_candidates(
    candidates: &[String],
    original_text: &str,
    config: &ExtractionConfig,
) -> Vec<ScoredCandidate> {
    let context = ScoringContext::new(original_text, &config.context_keywords);
    candidates
        .iter()
        .map(|candidate| ScoredCandidate {
            text: candidate.clone(),
            score: score_with_context(candidate, &context, &config.weights),
        })
        .collect()
}

/// Score a single candidate against the text it came from.
pub fn score_candidate(
    candidate: &str,
    original_text: &str,
    config: &ExtractionConfig,
) -> CandidateScore {
    let context = ScoringContext::new(original_text, &config.context_keywords);
    score_with_context(candidate, &context, &config.weights)
}

/// Pick the candidate with the strictly highest total; ties keep the first seen.
pub fn select(
    candidates: &[String],
    original_text: &str,
    config: &ExtractionConfig,
) -> Option<String> {
    let mut best: Option<ScoredCandidate> = None;

    for scored in score_candidates(candidates, original_text, config) {
        let replace = match &best {
            Some(current) => scored.score.total() > current.score.total(),
            None => true,
        };
        if replace {
            best = Some(scored);
        }
    }

    best.map(|scored| scored.text)
}

fn score_with_context(
    candidate: &str,
    context: &ScoringContext,
    weights: &ScoringWeights,
) -> CandidateScore {
    CandidateScore {
        length: score_length(candidate, weights),
        context: score_context(context, weights),
        purity: score_purity(candidate, weights),
        proximity: score_proximity(candidate, context, weights),
    }
}

fn score_length(candidate: &str, weights: &ScoringWeights) -> f64 {
    match candidate.chars().count() {
        6 => weights.length_six,
        4 => weights.length_four,
        _ => weights.length_other,
    }
}

fn score_context(context: &ScoringContext, weights: &ScoringWeights) -> f64 {
    context.matched_keywords as f64 * weights.context_per_keyword
}

fn score_purity(candidate: &str, weights: &ScoringWeights) -> f64 {
    if !candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_digit()) {
        weights.digits_only
    } else {
        weights.digits_mixed
    }
}

/// Nearest keyword-end → candidate-start distance, in characters, over every pair of
/// occurrences where the candidate follows the keyword. Candidates before a keyword
/// earn nothing.
/// Nearest keyword-end to candidate-start distance over every pair of occurrences
/// where the candidate follows the keyword. Candidates before a keyword earn nothing.
fn score_proximity(candidate: &str, context: &ScoringContext, weights: &ScoringWeights) -> f64 {
    let needle: Vec<char> = candidate.chars().collect();
    let candidate_starts = occurrences(&context.chars, &needle);

    let min_distance = context
        .keyword_ends
        .iter()
        .flat_map(|&end| {
            candidate_starts
                .iter()
                .filter(move |&&start| start >= end)
                .map(move |&start| start - end)
        })
        .min();

    match min_distance {
        Some(distance) => 1.0 / (1.0 + distance as f64 / weights.proximity_scale_chars),
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ExtractionConfig {
        ExtractionConfig::default()
    }

    fn owned(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn length_signal_prefers_six_digits() {
        let cfg = config();
        assert_eq!(score_candidate("123456", "", &cfg).length, 1.0);
        assert_eq!(score_candidate("1234", "", &cfg).length, 0.8);
        assert_eq!(score_candidate("12345", "", &cfg).length, 0.5);
        assert_eq!(score_candidate("12345678", "", &cfg).length, 0.5);
    }

    #[test]
    fn context_signal_counts_every_keyword() {
        let cfg = config();
        let text = "Your Verification CODE: 4821 (验证码)";
        // "verification", "code" and "验证码"
        assert_eq!(score_candidate("4821", text, &cfg).context, 3.0);
        assert_eq!(score_candidate("4821", "nothing relevant", &cfg).context, 0.0);
    }

    #[test]
    fn purity_signal_penalizes_non_digits() {
        let cfg = config();
        assert_eq!(score_candidate("482913", "", &cfg).purity, 1.0);
        assert_eq!(score_candidate("48a913", "", &cfg).purity, 0.2);
    }

    #[test]
    fn proximity_uses_nearest_following_occurrence() {
        let cfg = config();
        // "code" ends right before " 482913": distance 1.
        let score = score_candidate("482913", "code 482913", &cfg);
        assert!((score.proximity - 1.0 / 1.1).abs() < 1e-9);

        // Distance 10 gives exactly one half.
        let score = score_candidate("4821", "code......... 4821", &cfg);
        assert!((score.proximity - 0.5).abs() < 1e-9);
    }

    #[test]
    fn proximity_ignores_candidates_before_keywords() {
        let cfg = config();
        let score = score_candidate("482913", "482913 is your code", &cfg);
        assert_eq!(score.proximity, 0.0);
        assert_eq!(score.context, 1.0);
    }

    #[test]
    fn proximity_counts_characters_not_bytes() {
        let cfg = config();
        // Two CJK characters between keyword and code.
        let score = score_candidate("482913", "验证码：是482913", &cfg);
        assert!((score.proximity - 1.0 / 1.2).abs() < 1e-9);
    }

    #[test]
    fn proximity_is_measured_in_the_original_text() {
        let cfg = config();
        // "İ" lowercases to two characters; the distance here is four.
        let score = score_candidate("482913", "code İİ 482913", &cfg);
        assert!((score.proximity - 1.0 / 1.4).abs() < 1e-9);

        let score = score_candidate("482913", "CODE 482913", &cfg);
        assert!((score.proximity - 1.0 / 1.1).abs() < 1e-9);
    }

    #[test]
    fn select_returns_none_for_empty_list() {
        assert_eq!(select(&[], "code 123456", &config()), None);
    }

    #[test]
    fn select_picks_highest_total() {
        let candidates = owned(&["2024", "482913"]);
        let text = "In 2024 we sent your code 482913";
        assert_eq!(select(&candidates, text, &config()), Some("482913".into()));
    }

    #[test]
    fn select_breaks_ties_by_first_seen() {
        let candidates = owned(&["111111", "222222"]);
        let text = "111111 or 222222";
        assert_eq!(select(&candidates, text, &config()), Some("111111".into()));

        let reversed = owned(&["222222", "111111"]);
        assert_eq!(select(&reversed, text, &config()), Some("222222".into()));
    }

    #[test]
    fn select_is_deterministic() {
        let candidates = owned(&["1234", "654321", "87654321"]);
        let text = "code 1234, backup 654321, ref 87654321";
        let first = select(&candidates, text, &config());
        for _ in 0..10 {
            assert_eq!(select(&candidates, text, &config()), first);
        }
    }

    #[test]
    fn six_digits_never_score_lower_than_other_lengths() {
        let cfg = config();
        let texts = ["", "code", "verification code", "验证码 認証 コード 인증"];
        for text in texts {
            let six = score_candidate("123456", text, &cfg).total();
            for other in ["1234", "12345", "1234567", "12345678"] {
                let other_total = score_candidate(other, text, &cfg).total();
                assert!(six >= other_total, "{other} outscored 123456 for {text:?}");
            }
        }
    }
}
