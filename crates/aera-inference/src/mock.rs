//! Scripted backends for tests.
//!
//! Embeddings are derived from the input text, so the same text always maps
//! to the same vector and retrieval tests can match a query against a stored
//! document exactly.
//!
//! ```rust,ignore
//! let backend = MockInferenceBackend::new()
//!     .with_response_mapping("tags", r#"["finance"]"#)
//!     .throttled_embeddings(1);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use aera_core::{
    defaults, AnalysisProvider, AnalysisQuality, EmbeddingBackend, Error, GenerationBackend,
    GenerationOptions, InferenceBackend, Result, Vector,
};

use crate::image_analysis::{ImageAnalysis, ImageAnalyzer};
use crate::vision::VisionBackend;

/// One recorded call: which capability and what it was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub operation: &'static str,
    pub input: String,
}

#[derive(Debug, Clone)]
struct Script {
    dimension: usize,
    /// First needle found in the prompt picks the reply.
    replies: Vec<(String, String)>,
    fallback_reply: String,
    vision_reply: Option<String>,
    fail_embeddings: bool,
    fail_generation: bool,
    fail_vision: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            dimension: defaults::EMBED_DIMENSION,
            replies: Vec::new(),
            fallback_reply: "Mock response".to_string(),
            vision_reply: None,
            fail_embeddings: false,
            fail_generation: false,
            fail_vision: false,
        }
    }
}

/// Scripted stand-in for every provider capability.
///
/// Clones share the call log and the throttle counter.
#[derive(Clone)]
pub struct MockInferenceBackend {
    script: Arc<Script>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    /// Embedding calls still to be rejected as throttled.
    throttled_embeds: Arc<AtomicUsize>,
}

impl MockInferenceBackend {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Script::default()),
            calls: Arc::new(Mutex::new(Vec::new())),
            throttled_embeds: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn script_mut(&mut self) -> &mut Script {
        Arc::make_mut(&mut self.script)
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.script_mut().dimension = dimension;
        self
    }

    /// Reply used when no mapping matches.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        self.script_mut().fallback_reply = response.into();
        self
    }

    /// Reply with `output` whenever the prompt contains `needle`.
    pub fn with_response_mapping(
        mut self,
        needle: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        self.script_mut().replies.push((needle.into(), output.into()));
        self
    }

    /// Image descriptions otherwise follow the generation replies.
    pub fn with_vision_response(mut self, response: impl Into<String>) -> Self {
        self.script_mut().vision_reply = Some(response.into());
        self
    }

    /// Reject the next `calls` embedding requests with a rate-limit error.
    pub fn throttled_embeddings(self, calls: usize) -> Self {
        self.throttled_embeds.store(calls, Ordering::SeqCst);
        self
    }

    pub fn failing_embeddings(mut self) -> Self {
        self.script_mut().fail_embeddings = true;
        self
    }

    pub fn failing_generation(mut self) -> Self {
        self.script_mut().fail_generation = true;
        self
    }

    pub fn failing_vision(mut self) -> Self {
        self.script_mut().fail_vision = true;
        self
    }

    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn calls_to(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .map(|c| c.iter().filter(|call| call.operation == operation).count())
            .unwrap_or(0)
    }

    /// Texts sent for embedding, including rejected ones.
    pub fn embed_call_count(&self) -> usize {
        self.calls_to("embed")
    }

    pub fn generate_call_count(&self) -> usize {
        self.calls_to("generate")
    }

    pub fn vision_call_count(&self) -> usize {
        self.calls_to("vision")
    }

    fn record(&self, operation: &'static str, input: impl Into<String>) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(MockCall {
                operation,
                input: input.into(),
            });
        }
    }

    fn take_throttle(&self) -> bool {
        self.throttled_embeds
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn reply_for(&self, prompt: &str) -> String {
        self.script
            .replies
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.script.fallback_reply.clone())
    }
}

impl Default for MockInferenceBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingBackend for MockInferenceBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            self.record("embed", text.as_str());
            if self.take_throttle() {
                return Err(Error::RateLimited("mock provider throttled".to_string()));
            }
            if self.script.fail_embeddings {
                return Err(Error::Embedding("mock embedding failure".to_string()));
            }
            vectors.push(Vector::from(MockEmbeddingGenerator::generate(
                text,
                self.script.dimension,
            )));
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.script.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

#[async_trait]
impl GenerationBackend for MockInferenceBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.generate_with_options(system, prompt, GenerationOptions::default())
            .await
    }

    async fn generate_with_options(
        &self,
        system: &str,
        prompt: &str,
        _options: GenerationOptions,
    ) -> Result<String> {
        let input = if system.is_empty() {
            prompt.to_string()
        } else {
            format!("{}\n\n{}", system, prompt)
        };
        self.record("generate", input);

        if self.script.fail_generation {
            return Err(Error::Inference("mock generation failure".to_string()));
        }
        Ok(self.reply_for(prompt))
    }

    fn model_name(&self) -> &str {
        "mock-chat"
    }
}

#[async_trait]
impl InferenceBackend for MockInferenceBackend {
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[async_trait]
impl VisionBackend for MockInferenceBackend {
    async fn describe_image(
        &self,
        image_data: &[u8],
        mime_type: &str,
        prompt: Option<&str>,
    ) -> Result<String> {
        self.record("vision", format!("{} ({} bytes)", mime_type, image_data.len()));

        if self.script.fail_vision {
            return Err(Error::Inference("mock vision failure".to_string()));
        }
        Ok(self
            .script
            .vision_reply
            .clone()
            .unwrap_or_else(|| self.reply_for(prompt.unwrap_or_default())))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn model_name(&self) -> &str {
        "mock-vision"
    }
}

/// Image analyzer returning a canned analysis, or failing on demand.
#[derive(Clone)]
pub struct MockImageAnalyzer {
    analysis: Option<ImageAnalysis>,
    calls: Arc<AtomicUsize>,
}

impl MockImageAnalyzer {
    pub fn returning(analysis: ImageAnalysis) -> Self {
        Self {
            analysis: Some(analysis),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// An analyzer whose every call fails.
    pub fn failing() -> Self {
        Self {
            analysis: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageAnalyzer for MockImageAnalyzer {
    async fn analyze(
        &self,
        _image_data: &[u8],
        _mime_type: &str,
        _title: &str,
        _provider: AnalysisProvider,
        _quality: AnalysisQuality,
    ) -> Result<ImageAnalysis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.analysis
            .clone()
            .ok_or_else(|| Error::Inference("mock image analysis failure".to_string()))
    }
}

/// Character-bucket embeddings, normalized to unit length.
pub struct MockEmbeddingGenerator;

impl MockEmbeddingGenerator {
    pub fn generate(text: &str, dimension: usize) -> Vec<f32> {
        let dimension = dimension.max(1);
        let mut vec = vec![0.0; dimension];

        for (i, c) in text.to_lowercase().chars().enumerate() {
            let idx = (c as usize + i) % dimension;
            vec[idx] += 0.1;
        }
        // Empty input still yields a unit vector.
        if vec.iter().all(|x| *x == 0.0) {
            vec[0] = 1.0;
        }

        Self::normalize(&mut vec);
        vec
    }

    fn normalize(vec: &mut [f32]) {
        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vec.iter_mut().for_each(|x| *x /= magnitude);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aera_core::cosine_similarity;

    #[tokio::test]
    async fn test_mock_backend_embed() {
        let backend = MockInferenceBackend::new().with_dimension(128);
        let vectors = backend.embed_texts(&["test".to_string()]).await.unwrap();
        assert_eq!(vectors[0].as_slice().len(), 128);
    }

    #[tokio::test]
    async fn test_mock_backend_default_dimension_matches_index() {
        let backend = MockInferenceBackend::new();
        assert_eq!(backend.dimension(), defaults::EMBED_DIMENSION);
    }

    #[tokio::test]
    async fn test_mock_backend_deterministic() {
        let backend = MockInferenceBackend::new();
        let texts = vec!["quantum computing".to_string()];
        let e1 = backend.embed_texts(&texts).await.unwrap();
        let e2 = backend.embed_texts(&texts).await.unwrap();
        assert_eq!(e1, e2, "Embeddings should be deterministic");
    }

    #[tokio::test]
    async fn test_mock_backend_response_mapping_by_substring() {
        let backend = MockInferenceBackend::new()
            .with_fixed_response("fallback")
            .with_response_mapping("tags", "finance, report")
            .with_response_mapping("summary", "A quarterly report.");

        assert_eq!(
            backend.generate("Suggest tags for this").await.unwrap(),
            "finance, report"
        );
        assert_eq!(
            backend.generate("Write a summary").await.unwrap(),
            "A quarterly report."
        );
        assert_eq!(backend.generate("anything else").await.unwrap(), "fallback");
    }

    #[tokio::test]
    async fn test_mock_backend_call_logging() {
        let backend = MockInferenceBackend::new();
        backend
            .embed_texts(&["text1".to_string(), "text2".to_string()])
            .await
            .unwrap();
        backend.generate("prompt").await.unwrap();
        backend.describe_image(b"x", "image/png", None).await.unwrap();

        assert_eq!(backend.embed_call_count(), 2);
        assert_eq!(backend.generate_call_count(), 1);
        assert_eq!(backend.vision_call_count(), 1);
        assert_eq!(backend.get_calls().len(), 4);
        assert_eq!(backend.get_calls()[3].input, "image/png (1 bytes)");
    }

    #[tokio::test]
    async fn test_throttled_embeddings_recover_under_backoff() {
        use aera_core::BackoffPolicy;
        use std::time::Duration;

        let backend = MockInferenceBackend::new().throttled_embeddings(2);
        let texts = vec!["Q3 financial results".to_string()];

        let vectors = BackoffPolicy::new(3, Duration::ZERO)
            .run("embed", || backend.embed_texts(&texts))
            .await
            .unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(backend.embed_call_count(), 3);
    }

    #[tokio::test]
    async fn test_throttle_is_shared_between_clones() {
        let backend = MockInferenceBackend::new().throttled_embeddings(1);
        let clone = backend.clone();
        let err = clone.embed_texts(&["x".to_string()]).await.unwrap_err();
        assert!(err.is_rate_limited());
        assert!(backend.embed_texts(&["x".to_string()]).await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_embeddings() {
        let backend = MockInferenceBackend::new().failing_embeddings();
        let result = backend.embed_texts(&["test".to_string()]).await;
        assert!(matches!(result, Err(Error::Embedding(_))));
    }

    #[tokio::test]
    async fn test_targeted_failures() {
        let backend = MockInferenceBackend::new().failing_generation();
        assert!(backend.embed_texts(&["ok".to_string()]).await.is_ok());
        assert!(matches!(
            backend.generate("x").await,
            Err(Error::Inference(_))
        ));

        let vision = MockInferenceBackend::new().failing_vision();
        assert!(vision.describe_image(b"x", "image/png", None).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_image_analyzer() {
        let analysis = ImageAnalysis {
            description: "A cat".to_string(),
            tags: vec!["cat".to_string()],
            detailed: Default::default(),
            model: "mock-vision".to_string(),
        };
        let analyzer = MockImageAnalyzer::returning(analysis.clone());
        let result = analyzer
            .analyze(b"", "image/png", "", AnalysisProvider::Auto, AnalysisQuality::Fast)
            .await
            .unwrap();
        assert_eq!(result, analysis);

        let failing = MockImageAnalyzer::failing();
        assert!(failing
            .analyze(b"", "image/png", "", AnalysisProvider::Auto, AnalysisQuality::Fast)
            .await
            .is_err());
        assert_eq!(failing.call_count(), 1);
    }

    #[test]
    fn test_embedding_generator_normalized() {
        let embedding = MockEmbeddingGenerator::generate("test", 128);
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.01, "Should be normalized");

        let empty = MockEmbeddingGenerator::generate("", 16);
        assert!((empty[0] - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_identical_text_has_unit_similarity() {
        let a = MockEmbeddingGenerator::generate("Quarterly Report", 64);
        let b = MockEmbeddingGenerator::generate("Quarterly Report", 64);
        let similarity = cosine_similarity(&a, &b).unwrap();
        assert!((similarity - 1.0).abs() < 1e-5);
    }
}
