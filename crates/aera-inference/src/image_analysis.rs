//! Multi-provider image analysis.
//!
//! A vision model is asked for a JSON document describing the image. The
//! answer becomes an [`ImageAnalysis`]: a description, tags, and the
//! detailed fields used to build searchable text.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use aera_core::{
    defaults, AnalysisProvider, AnalysisQuality, DetailedAnalysis, Error, Result,
};

use crate::gemini::GeminiBackend;
use crate::json::parse_model_json;
use crate::openai::OpenAIBackend;
use crate::vision::VisionBackend;

/// Output of a single image analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAnalysis {
    pub description: String,
    pub tags: Vec<String>,
    pub detailed: DetailedAnalysis,
    /// Vision model that produced the analysis.
    pub model: String,
}

impl ImageAnalysis {
    /// Description followed by every non-empty detailed field.
    pub fn searchable_text(&self) -> String {
        let mut parts = Vec::new();
        if !self.description.trim().is_empty() {
            parts.push(self.description.trim().to_string());
        }
        parts.extend(self.detailed.text_fields());
        parts.join("\n")
    }
}

/// Anything that can turn image bytes into an [`ImageAnalysis`].
#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        image_data: &[u8],
        mime_type: &str,
        title: &str,
        provider: AnalysisProvider,
        quality: AnalysisQuality,
    ) -> Result<ImageAnalysis>;
}

/// JSON shape requested from the vision model. Every field is optional so a
/// partial answer still parses.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAnalysis {
    description: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    tags: Vec<String>,
    clothing: Option<String>,
    setting: Option<String>,
    mood: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    colors: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    objects: Vec<String>,
    style: Option<String>,
    people: Option<String>,
    text_content: Option<String>,
}

/// Models write `null` for lists they have nothing to put in.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

fn analysis_prompt(title: &str, quality: AnalysisQuality) -> String {
    let detail = match quality {
        AnalysisQuality::Fast => "Keep the description to one or two sentences.",
        AnalysisQuality::Standard => "Write a description of three to five sentences.",
        AnalysisQuality::High => {
            "Write a thorough description covering composition, subjects, lighting and any visible text."
        }
    };
    let title_hint = if title.trim().is_empty() {
        String::new()
    } else {
        format!("The image is titled \"{}\". ", title.trim())
    };
    format!(
        "{title_hint}Analyze this image. {detail}\n\
         Respond with a single JSON object with these keys:\n\
         \"description\" (string), \"tags\" (array of up to {max} short lowercase keywords),\n\
         \"clothing\", \"setting\", \"mood\", \"style\", \"people\", \"text_content\" (strings, omit if not applicable),\n\
         \"colors\" and \"objects\" (arrays of strings).\n\
         Return only the JSON.",
        max = defaults::MAX_TAGS
    )
}

/// Turn raw model output into an analysis. Output that is not JSON becomes
/// the description of an otherwise empty analysis.
fn interpret(raw_text: &str, model: &str) -> Result<ImageAnalysis> {
    if raw_text.trim().is_empty() {
        return Err(Error::Inference(format!("{} returned an empty analysis", model)));
    }

    match parse_model_json::<RawAnalysis>(raw_text) {
        Ok(raw) => {
            let description = raw
                .description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| raw_text.trim().to_string());
            let mut tags: Vec<String> = Vec::new();
            for tag in raw.tags {
                let tag = tag.trim().to_lowercase();
                if !tag.is_empty() && !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
            tags.truncate(defaults::MAX_TAGS);
            Ok(ImageAnalysis {
                description,
                tags,
                detailed: DetailedAnalysis {
                    clothing: raw.clothing,
                    setting: raw.setting,
                    mood: raw.mood,
                    style: raw.style,
                    people: raw.people,
                    text_content: raw.text_content,
                    colors: raw.colors,
                    objects: raw.objects,
                },
                model: model.to_string(),
            })
        }
        Err(e) => {
            warn!(
                subsystem = "inference",
                component = "image_analysis",
                model,
                error = %e,
                "Vision output was not JSON, using raw text as description"
            );
            Ok(ImageAnalysis {
                description: raw_text.trim().to_string(),
                tags: Vec::new(),
                detailed: DetailedAnalysis::default(),
                model: model.to_string(),
            })
        }
    }
}

/// Image analyzer that routes between Gemini and Mistral vision models.
#[derive(Clone, Default)]
pub struct MultiModelImageAnalyzer {
    gemini: Option<Arc<dyn VisionBackend>>,
    gemini_high: Option<Arc<dyn VisionBackend>>,
    mistral: Option<Arc<dyn VisionBackend>>,
}

impl MultiModelImageAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register Gemini backends; `high` serves [`AnalysisQuality::High`].
    pub fn with_gemini(
        mut self,
        standard: Arc<dyn VisionBackend>,
        high: Option<Arc<dyn VisionBackend>>,
    ) -> Self {
        self.gemini = Some(standard);
        self.gemini_high = high;
        self
    }

    pub fn with_mistral(mut self, backend: Arc<dyn VisionBackend>) -> Self {
        self.mistral = Some(backend);
        self
    }

    /// Build from configured hosted backends. Unconfigured providers are
    /// skipped.
    pub fn from_backends(gemini: Option<GeminiBackend>, mistral: Option<OpenAIBackend>) -> Self {
        let mut analyzer = Self::new();
        if let Some(gemini) = gemini.filter(|g| g.is_configured()) {
            let high: Arc<dyn VisionBackend> = Arc::new(gemini.high_quality());
            analyzer = analyzer.with_gemini(Arc::new(gemini), Some(high));
        }
        if let Some(mistral) = mistral.filter(|m| m.is_configured()) {
            analyzer = analyzer.with_mistral(Arc::new(mistral));
        }
        analyzer
    }

    pub fn has_provider(&self) -> bool {
        self.gemini.is_some() || self.mistral.is_some()
    }

    fn gemini_for(&self, quality: AnalysisQuality) -> Option<&Arc<dyn VisionBackend>> {
        match quality {
            AnalysisQuality::High => self.gemini_high.as_ref().or(self.gemini.as_ref()),
            _ => self.gemini.as_ref(),
        }
    }

    /// Backends to try, in order, for the requested provider.
    fn candidates(
        &self,
        provider: AnalysisProvider,
        quality: AnalysisQuality,
    ) -> Result<Vec<(&'static str, &Arc<dyn VisionBackend>)>> {
        let list: Vec<_> = match provider {
            AnalysisProvider::Auto => [
                self.gemini_for(quality).map(|b| ("gemini", b)),
                self.mistral.as_ref().map(|b| ("mistral", b)),
            ]
            .into_iter()
            .flatten()
            .collect(),
            AnalysisProvider::Gemini => self
                .gemini_for(quality)
                .map(|b| ("gemini", b))
                .into_iter()
                .collect(),
            AnalysisProvider::Mistral => self
                .mistral
                .as_ref()
                .map(|b| ("mistral", b))
                .into_iter()
                .collect(),
        };
        if list.is_empty() {
            return Err(Error::Config(format!(
                "No vision provider configured for '{}'",
                provider
            )));
        }
        Ok(list)
    }
}

#[async_trait]
impl ImageAnalyzer for MultiModelImageAnalyzer {
    async fn analyze(
        &self,
        image_data: &[u8],
        mime_type: &str,
        title: &str,
        provider: AnalysisProvider,
        quality: AnalysisQuality,
    ) -> Result<ImageAnalysis> {
        let prompt = analysis_prompt(title, quality);
        let mut last_error = None;

        for (name, backend) in self.candidates(provider, quality)? {
            let start = Instant::now();
            let attempt = backend
                .describe_image(image_data, mime_type, Some(&prompt))
                .await
                .and_then(|text| interpret(&text, backend.model_name()));

            match attempt {
                Ok(analysis) => {
                    info!(
                        subsystem = "inference",
                        component = "image_analysis",
                        provider = name,
                        model = %analysis.model,
                        tag_count = analysis.tags.len(),
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Image analyzed"
                    );
                    return Ok(analysis);
                }
                Err(e) => {
                    warn!(
                        subsystem = "inference",
                        component = "image_analysis",
                        provider = name,
                        error = %e,
                        "Vision provider failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        debug!(
            subsystem = "inference",
            component = "image_analysis",
            "All vision providers failed"
        );
        Err(last_error
            .unwrap_or_else(|| Error::Inference("No vision provider produced an analysis".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedVision {
        model: &'static str,
        reply: std::result::Result<&'static str, &'static str>,
        calls: AtomicUsize,
    }

    impl FixedVision {
        fn ok(model: &'static str, reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                model,
                reply: Ok(reply),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(model: &'static str) -> Arc<Self> {
            Arc::new(Self {
                model,
                reply: Err("service unavailable"),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl VisionBackend for FixedVision {
        async fn describe_image(&self, _: &[u8], _: &str, _: Option<&str>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .map(|s| s.to_string())
                .map_err(|e| Error::Inference(e.to_string()))
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn model_name(&self) -> &str {
            self.model
        }
    }

    const JSON_REPLY: &str = r#"```json
{"description": "A woman in a red coat on a beach", "tags": ["Beach", "coat", "beach"],
 "clothing": "red coat", "setting": "beach", "colors": ["red", "blue"], "objects": []}
```"#;

    #[tokio::test]
    async fn test_auto_prefers_gemini() {
        let gemini = FixedVision::ok("gemini-flash", JSON_REPLY);
        let mistral = FixedVision::ok("pixtral", JSON_REPLY);
        let analyzer = MultiModelImageAnalyzer::new()
            .with_gemini(gemini.clone(), None)
            .with_mistral(mistral.clone());

        let analysis = analyzer
            .analyze(b"img", "image/png", "Beach", AnalysisProvider::Auto, AnalysisQuality::Standard)
            .await
            .unwrap();

        assert_eq!(analysis.model, "gemini-flash");
        assert_eq!(analysis.tags, vec!["beach", "coat"]);
        assert_eq!(analysis.detailed.setting.as_deref(), Some("beach"));
        assert_eq!(gemini.calls.load(Ordering::SeqCst), 1);
        assert_eq!(mistral.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_auto_falls_back_to_mistral() {
        let gemini = FixedVision::failing("gemini-flash");
        let mistral = FixedVision::ok("pixtral", JSON_REPLY);
        let analyzer = MultiModelImageAnalyzer::new()
            .with_gemini(gemini.clone(), None)
            .with_mistral(mistral.clone());

        let analysis = analyzer
            .analyze(b"img", "image/png", "", AnalysisProvider::Auto, AnalysisQuality::Fast)
            .await
            .unwrap();
        assert_eq!(analysis.model, "pixtral");
        assert_eq!(gemini.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_explicit_provider_does_not_fall_back() {
        let gemini = FixedVision::failing("gemini-flash");
        let mistral = FixedVision::ok("pixtral", JSON_REPLY);
        let analyzer = MultiModelImageAnalyzer::new()
            .with_gemini(gemini, None)
            .with_mistral(mistral.clone());

        let result = analyzer
            .analyze(b"img", "image/png", "", AnalysisProvider::Gemini, AnalysisQuality::Standard)
            .await;
        assert!(result.is_err());
        assert_eq!(mistral.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_high_quality_uses_high_model() {
        let standard = FixedVision::ok("gemini-flash", JSON_REPLY);
        let high = FixedVision::ok("gemini-pro", JSON_REPLY);
        let analyzer = MultiModelImageAnalyzer::new().with_gemini(standard.clone(), Some(high as Arc<dyn VisionBackend>));

        let analysis = analyzer
            .analyze(b"img", "image/png", "", AnalysisProvider::Auto, AnalysisQuality::High)
            .await
            .unwrap();
        assert_eq!(analysis.model, "gemini-pro");
        assert_eq!(standard.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_provider_is_config_error() {
        let analyzer = MultiModelImageAnalyzer::new();
        assert!(!analyzer.has_provider());
        let err = analyzer
            .analyze(b"img", "image/png", "", AnalysisProvider::Auto, AnalysisQuality::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_malformed_output_becomes_description() {
        let analysis = interpret("A foggy harbour at dawn.", "pixtral").unwrap();
        assert_eq!(analysis.description, "A foggy harbour at dawn.");
        assert!(analysis.tags.is_empty());
        assert_eq!(analysis.detailed, DetailedAnalysis::default());
    }

    #[test]
    fn test_null_lists_keep_the_rest_of_the_analysis() {
        let raw = r#"{"description":"A man in a red coat","tags":["coat","winter"],"setting":"street","colors":null,"objects":null}"#;
        let analysis = interpret(raw, "gemini").unwrap();
        assert_eq!(analysis.description, "A man in a red coat");
        assert_eq!(analysis.tags, vec!["coat", "winter"]);
        assert_eq!(analysis.detailed.setting.as_deref(), Some("street"));
        assert!(analysis.detailed.colors.is_empty());
        assert!(analysis.detailed.objects.is_empty());

        let analysis = interpret(r#"{"description":"Snow","tags":null}"#, "gemini").unwrap();
        assert_eq!(analysis.description, "Snow");
        assert!(analysis.tags.is_empty());
    }

    #[test]
    fn test_empty_output_is_error() {
        assert!(interpret("  ", "pixtral").is_err());
    }

    #[test]
    fn test_searchable_text_includes_details() {
        let analysis = interpret(JSON_REPLY, "gemini").unwrap();
        let text = analysis.searchable_text();
        assert!(text.starts_with("A woman in a red coat on a beach"));
        assert!(text.contains("red coat"));
        assert!(text.contains("red, blue"));
    }

    #[test]
    fn test_prompt_mentions_title() {
        let prompt = analysis_prompt("Sunset", AnalysisQuality::High);
        assert!(prompt.contains("\"Sunset\""));
        assert!(prompt.contains("thorough"));
    }
}
