//! Answer synthesis from retrieved context.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use aera_core::{defaults, GenerationBackend, GenerationOptions, Result};

/// System instruction sent with every question.
pub const ANSWER_SYSTEM_PROMPT: &str = "You are a helpful assistant for a personal knowledge \
workspace. Answer the user's question using only the provided context. If the context does not \
contain enough information to answer, say so plainly instead of guessing.";

/// Returned when the model produces no text.
pub const EMPTY_ANSWER: &str =
    "I wasn't able to produce an answer from the available documents.";

/// Build the user prompt; empty context becomes the placeholder.
pub fn build_prompt(question: &str, context: &str) -> String {
    let context = if context.trim().is_empty() {
        defaults::NO_CONTEXT_PLACEHOLDER
    } else {
        context
    };
    format!("Context:\n{}\n\nQuestion: {}", context, question.trim())
}

/// Sends question and context to a chat model.
#[derive(Clone)]
pub struct AnswerSynthesizer {
    generator: Arc<dyn GenerationBackend>,
    options: GenerationOptions,
}

impl AnswerSynthesizer {
    pub fn new(generator: Arc<dyn GenerationBackend>) -> Self {
        Self {
            generator,
            options: GenerationOptions {
                max_tokens: Some(defaults::ANSWER_MAX_TOKENS),
                temperature: Some(defaults::ANSWER_TEMPERATURE),
            },
        }
    }

    pub fn options(&self) -> GenerationOptions {
        self.options
    }

    /// Answer `question` from `context`. Provider errors propagate.
    pub async fn answer(&self, question: &str, context: &str) -> Result<String> {
        let start = Instant::now();
        let prompt = build_prompt(question, context);
        let answer = self
            .generator
            .generate_with_options(ANSWER_SYSTEM_PROMPT, &prompt, self.options)
            .await?;

        let answer = answer.trim();
        if answer.is_empty() {
            warn!(
                subsystem = "search",
                component = "answer",
                model = self.generator.model_name(),
                "Model returned an empty answer"
            );
            return Ok(EMPTY_ANSWER.to_string());
        }

        debug!(
            subsystem = "search",
            component = "answer",
            model = self.generator.model_name(),
            context_len = context.len(),
            answer_len = answer.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Answer synthesized"
        );
        Ok(answer.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aera_inference::mock::MockInferenceBackend;

    #[test]
    fn test_prompt_uses_placeholder_without_context() {
        let prompt = build_prompt("What is this?", "  ");
        assert!(prompt.contains(defaults::NO_CONTEXT_PLACEHOLDER));
        assert!(prompt.ends_with("Question: What is this?"));
    }

    #[test]
    fn test_prompt_includes_context() {
        let prompt = build_prompt("Which quarter?", "Q3 financial results");
        assert!(prompt.starts_with("Context:\nQ3 financial results"));
    }

    #[tokio::test]
    async fn test_answer_sends_system_prompt() {
        let backend = Arc::new(MockInferenceBackend::new().with_fixed_response("  Q3.  "));
        let synthesizer = AnswerSynthesizer::new(backend.clone());

        let answer = synthesizer.answer("Which quarter?", "Q3 results").await.unwrap();
        assert_eq!(answer, "Q3.");

        let calls = backend.get_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].input.starts_with(ANSWER_SYSTEM_PROMPT));
        assert_eq!(synthesizer.options().max_tokens, Some(1000));
    }

    #[tokio::test]
    async fn test_empty_model_output_is_replaced() {
        let backend = Arc::new(MockInferenceBackend::new().with_fixed_response(""));
        let answer = AnswerSynthesizer::new(backend).answer("q", "").await.unwrap();
        assert_eq!(answer, EMPTY_ANSWER);
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let backend = Arc::new(MockInferenceBackend::new().failing_generation());
        assert!(AnswerSynthesizer::new(backend).answer("q", "c").await.is_err());
    }
}
