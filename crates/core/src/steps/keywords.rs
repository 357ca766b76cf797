//! Deterministic keyword extraction.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::executor::{StepError, StepHandler, StepInput, StepOutput};
use crate::pipeline::StepName;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9][a-z0-9'_-]*").unwrap());

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "from",
        "as", "is", "was", "are", "were", "been", "be", "have", "has", "had", "this", "that",
        "these", "those", "it", "its", "i", "me", "my", "we", "our", "you", "your", "he", "she",
        "they", "them", "their", "a", "an", "not", "no", "can", "cannot", "can't", "could",
        "would", "should", "will", "just", "do", "does", "did", "don't", "doesn't", "didn't",
        "i'm", "i've", "it's", "need", "needs", "please", "hi", "hello", "thanks", "thank",
        "there", "here", "when", "what", "which", "who", "how", "why", "all", "any", "some",
        "get", "got", "also", "very", "too", "so", "if", "then", "than", "into", "out", "up",
        "about", "again", "still", "now", "today", "fixed", "fix", "help", "issue", "problem",
    ]
    .into_iter()
    .collect()
});

/// Lowercased word tokens, stop words removed, ranked by frequency then by
/// first occurrence.
pub fn extract_keywords(text: &str, max: usize) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();

    for (position, m) in WORD.find_iter(&lowered).enumerate() {
        let word = m.as_str().trim_end_matches(['\'', '-', '_']);
        if word.len() < 3
            || STOP_WORDS.contains(word)
            || word.chars().all(|c| c.is_ascii_digit())
        {
            continue;
        }
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(&str, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked
        .into_iter()
        .take(max)
        .map(|(word, _)| word.to_string())
        .collect()
}

pub struct KeywordStep {
    max_keywords: usize,
}

impl KeywordStep {
    pub fn new(max_keywords: usize) -> Self {
        Self {
            max_keywords: max_keywords.max(1),
        }
    }
}

#[async_trait]
impl StepHandler for KeywordStep {
    fn step(&self) -> StepName {
        StepName::KeywordExtraction
    }

    async fn run(&self, input: &StepInput) -> Result<StepOutput, StepError> {
        let keywords = extract_keywords(&input.ticket.full_text(), self.max_keywords);
        if keywords.is_empty() {
            return Err(StepError::malformed("no extractable keywords in ticket text"));
        }
        Ok(StepOutput::KeywordExtraction { keywords })
    }
}
