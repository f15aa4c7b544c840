//! Tag and summary derivation.
//!
//! Tags come from the chat model first; when that fails or yields nothing, a
//! keyword heuristic over the same text is used.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use aera_core::{defaults, Error, GenerationBackend, GenerationOptions, Result};
use aera_inference::parse_tag_list;

const TAG_SYSTEM_PROMPT: &str = "You label documents in a personal knowledge workspace. \
Reply with a JSON array of short lowercase keyword tags and nothing else.";

const SUMMARY_SYSTEM_PROMPT: &str = "You summarize documents in a personal knowledge workspace. \
Reply with two or three plain sentences and nothing else.";

const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "her",
    "his", "how", "i", "if", "in", "into", "is", "it", "its", "me", "my", "no", "not", "of", "on",
    "or", "our", "out", "over", "she", "so", "some", "than", "that", "the", "their", "them",
    "then", "there", "these", "they", "this", "those", "to", "up", "us", "video", "was", "we",
    "were", "what", "when", "which", "who", "will", "with", "would", "you", "your",
];

/// Keyword tags for `text`, most frequent first.
///
/// Words shorter than three characters are skipped unless they contain a
/// digit, so "q3" survives while "of" does not.
pub fn keyword_tags(text: &str, max: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (position, word) in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .enumerate()
    {
        let word = word.to_lowercase();
        let has_digit = word.chars().any(|c| c.is_ascii_digit());
        if STOPWORDS.contains(&word.as_str()) || (word.chars().count() < 3 && !has_digit) {
            continue;
        }
        if word.chars().all(|c| c.is_ascii_digit()) && word.len() < 4 {
            continue;
        }
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked.into_iter().take(max).map(|(word, _)| word).collect()
}

/// Where a set of tags came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagSource {
    Model,
    Keywords,
}

/// Derives tags and summaries with a chat model.
#[derive(Clone)]
pub struct Tagger {
    generator: Arc<dyn GenerationBackend>,
    max_tags: usize,
}

impl Tagger {
    pub fn new(generator: Arc<dyn GenerationBackend>) -> Self {
        Self {
            generator,
            max_tags: defaults::MAX_TAGS,
        }
    }

    pub fn with_max_tags(mut self, max_tags: usize) -> Self {
        self.max_tags = max_tags;
        self
    }

    /// Ask the model for tags.
    pub async fn suggest_tags(&self, text: &str) -> Result<Vec<String>> {
        let prompt = format!(
            "Suggest up to {} tags for the following document.\n\n{}",
            self.max_tags, text
        );
        let reply = self
            .generator
            .generate_with_options(
                TAG_SYSTEM_PROMPT,
                &prompt,
                GenerationOptions {
                    max_tokens: Some(100),
                    temperature: Some(0.2),
                },
            )
            .await?;
        Ok(parse_tag_list(&reply, self.max_tags))
    }

    /// Model tags, falling back to keywords. Errors only when both are empty.
    pub async fn tags(&self, text: &str) -> Result<(Vec<String>, TagSource)> {
        match self.suggest_tags(text).await {
            Ok(tags) if !tags.is_empty() => return Ok((tags, TagSource::Model)),
            Ok(_) => debug!(
                subsystem = "ingest",
                component = "tagging",
                "Model returned no tags, using keywords"
            ),
            Err(e) => warn!(
                subsystem = "ingest",
                component = "tagging",
                error = %e,
                "Tag generation failed, using keywords"
            ),
        }

        let tags = keyword_tags(text, self.max_tags);
        if tags.is_empty() {
            return Err(Error::Inference(
                "No tags could be derived from the document text".to_string(),
            ));
        }
        Ok((tags, TagSource::Keywords))
    }

    /// A short summary of `text`.
    pub async fn summarize(&self, text: &str) -> Result<String> {
        let prompt = format!("Summarize the following document.\n\n{}", text);
        let summary = self
            .generator
            .generate_with_options(
                SUMMARY_SYSTEM_PROMPT,
                &prompt,
                GenerationOptions {
                    max_tokens: Some(200),
                    temperature: Some(0.3),
                },
            )
            .await?;

        let summary = summary.trim();
        if summary.is_empty() {
            return Err(Error::Inference("Model returned an empty summary".to_string()));
        }
        Ok(summary.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aera_inference::mock::MockInferenceBackend;

    #[test]
    fn test_keyword_tags_rank_by_frequency() {
        let tags = keyword_tags("Budget review: the budget for Q3 and the review of travel", 3);
        assert_eq!(tags, vec!["budget", "review", "q3"]);
    }

    #[test]
    fn test_keyword_tags_skip_stopwords_and_short_words() {
        let tags = keyword_tags("Video: A trip to the sea", 8);
        assert_eq!(tags, vec!["trip", "sea"]);
    }

    #[test]
    fn test_keyword_tags_empty_text() {
        assert!(keyword_tags("  ...  ", 8).is_empty());
    }

    #[tokio::test]
    async fn test_model_tags_preferred() {
        let backend = Arc::new(
            MockInferenceBackend::new().with_response_mapping("tags", r#"["finance", "q3"]"#),
        );
        let (tags, source) = Tagger::new(backend).tags("Quarterly Report").await.unwrap();
        assert_eq!(tags, vec!["finance", "q3"]);
        assert_eq!(source, TagSource::Model);
    }

    #[tokio::test]
    async fn test_keyword_fallback_on_model_failure() {
        let backend = Arc::new(MockInferenceBackend::new().failing_generation());
        let (tags, source) = Tagger::new(backend)
            .tags("Quarterly Report")
            .await
            .unwrap();
        assert_eq!(tags, vec!["quarterly", "report"]);
        assert_eq!(source, TagSource::Keywords);
    }

    #[tokio::test]
    async fn test_no_tags_at_all_is_error() {
        let backend = Arc::new(MockInferenceBackend::new().failing_generation());
        assert!(Tagger::new(backend).tags("a of").await.is_err());
    }

    #[tokio::test]
    async fn test_summary() {
        let backend = Arc::new(
            MockInferenceBackend::new().with_response_mapping("Summarize", " Q3 results. "),
        );
        let summary = Tagger::new(backend).summarize("Quarterly Report").await.unwrap();
        assert_eq!(summary, "Q3 results.");
    }

    #[tokio::test]
    async fn test_empty_summary_is_error() {
        let backend = Arc::new(MockInferenceBackend::new().with_fixed_response(" "));
        assert!(Tagger::new(backend).summarize("x").await.is_err());
    }
}
