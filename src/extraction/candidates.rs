use anyhow::{Context, Result};
use regex::Regex;

use super::config::ExtractionConfig;

/// Produces candidate code strings from normalized text.
///
/// Two strategies share the same length bounds: a word-level tokenizer and a
/// keyword-anchored regex scan.
#[derive(Debug, Clone)]
pub struct CandidateGenerator {
    min_len: usize,
    max_len: usize,
    code_pattern: Regex,
    prefixes: Vec<Regex>,
}

impl CandidateGenerator {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let code_pattern = Regex::new(&format!(
            "[0-9]{{{},{}}}",
            config.min_code_len, config.max_code_len
        ))
        .context("invalid code length bounds")?;

        let prefixes = config
            .prefix_keywords
            .iter()
            .filter(|keyword| !keyword.is_empty())
            .map(|keyword| {
                Regex::new(&format!("(?i){}", regex::escape(keyword)))
                    .with_context(|| format!("invalid prefix keyword {keyword:?}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            min_len: config.min_code_len,
            max_len: config.max_code_len,
            code_pattern,
            prefixes,
        })
    }

    /// Word-level scan: every unit made only of digits whose length is within bounds,
    /// in order of appearance.
    pub fn tokenized(&self, text: &str) -> Vec<String> {
        word_units(text)
            .into_iter()
            .filter(|unit| unit.chars().all(|c| c.is_ascii_digit()))
            .filter(|unit| {
                let len = unit.chars().count();
                len >= self.min_len && len <= self.max_len
            })
            .map(str::to_string)
            .collect()
    }

    /// Keyword-anchored scan with a global fallback. Emits at most one candidate.
    pub fn pattern(&self, text: &str) -> Vec<String> {
        for prefix in &self.prefixes {
            let Some(keyword) = prefix.find(text) else {
                continue;
            };

            let remaining = &text[keyword.end()..];
            if let Some(found) = self.code_pattern.find(remaining) {
                return vec![strip_separators(found.as_str())];
            }
        }

        self.code_pattern
            .find(text)
            .map(|found| vec![strip_separators(found.as_str())])
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitClass {
    Ascii,
    Other,
}

fn classify(c: char) -> Option<UnitClass> {
    if c.is_ascii_alphanumeric() {
        Some(UnitClass::Ascii)
    } else if c.is_alphanumeric() {
        Some(UnitClass::Other)
    } else {
        None
    }
}

/// Split text into word-like units: maximal alphanumeric runs, broken again wherever
/// ASCII alphanumerics meet other scripts (`验证码482913` is two units).
fn word_units(text: &str) -> Vec<&str> {
    let mut units = Vec::new();
    let mut current: Option<(usize, UnitClass)> = None;

    for (idx, c) in text.char_indices() {
        let class = classify(c);
        match (current, class) {
            (Some((_, open)), Some(next)) if open == next => {}
            (Some((start, _)), next) => {
                units.push(&text[start..idx]);
                current = next.map(|class| (idx, class));
            }
            (None, next) => {
                current = next.map(|class| (idx, class));
            }
        }
    }

    if let Some((start, _)) = current {
        units.push(&text[start..]);
    }

    units
}

fn strip_separators(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}
