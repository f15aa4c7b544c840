//! Extraction of JSON payloads from free-form model output.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use aera_core::{Error, Result};

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("static regex is valid")
    })
}

/// Parse a JSON value of type `T` out of model output.
///
/// Accepts bare JSON, JSON inside a fenced code block, or JSON surrounded by
/// prose (the outermost `{ ... }` span is tried last).
pub fn parse_model_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str::<T>(trimmed) {
        return Ok(value);
    }

    if let Some(caps) = fence_regex().captures(trimmed) {
        if let Some(inner) = caps.get(1) {
            if let Ok(value) = serde_json::from_str::<T>(inner.as_str().trim()) {
                return Ok(value);
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return serde_json::from_str::<T>(&trimmed[start..=end]).map_err(Error::from);
        }
    }

    Err(Error::Serialization(format!(
        "No JSON object found in model output ({} chars)",
        trimmed.len()
    )))
}

/// Parse a tag list from model output.
///
/// Accepts a JSON array of strings, an object with a `tags` array, or a
/// comma/newline separated list. Tags are trimmed, lowercased, stripped of
/// leading `#`/`-` markers, de-duplicated and capped at `max`.
pub fn parse_tag_list(text: &str, max: usize) -> Vec<String> {
    #[derive(serde::Deserialize)]
    struct Wrapped {
        tags: Vec<String>,
    }

    let trimmed = text.trim();
    let raw: Vec<String> = if let Some(list) = json_array(trimmed) {
        list
    } else if let Ok(wrapped) = parse_model_json::<Wrapped>(trimmed) {
        wrapped.tags
    } else {
        trimmed
            .split([',', '\n'])
            .map(|s| s.to_string())
            .collect()
    };

    let mut tags: Vec<String> = Vec::new();
    for tag in raw {
        let cleaned = tag
            .trim()
            .trim_start_matches(['#', '-', '*'])
            .trim()
            .trim_matches(['"', '\'', '.'])
            .to_lowercase();
        if cleaned.is_empty() || cleaned.len() > 50 || tags.contains(&cleaned) {
            continue;
        }
        tags.push(cleaned);
        if tags.len() >= max {
            break;
        }
    }
    tags
}

fn json_array(text: &str) -> Option<Vec<String>> {
    if let Ok(list) = serde_json::from_str::<Vec<String>>(text) {
        return Some(list);
    }
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if start >= end {
        return None;
    }
    serde_json::from_str::<Vec<String>>(&text[start..=end]).ok()
}
