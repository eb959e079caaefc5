// src/topics.rs
//! Topic suggestion: a one-shot generation that proposes blog topics
//! from keywords and a tone, outside any workflow.

use crate::errors::ProviderError;
use crate::provider::{generate_with_timeout, GenerationProvider};
use crate::workflow::dispatcher::strip_code_fences;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_WORD_COUNT: u32 = 1000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSuggestion {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub estimated_word_count: u32,
    pub tone: String,
}

/// Wire shape the model is asked to produce; id and tone are assigned
/// after parsing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSuggestion {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    estimated_word_count: u32,
}

pub async fn suggest_topics(
    provider: &dyn GenerationProvider,
    keywords: &str,
    tone: &str,
    target_word_count: Option<u32>,
    timeout: Duration,
) -> Result<Vec<TopicSuggestion>, ProviderError> {
    let word_count = target_word_count.unwrap_or(DEFAULT_WORD_COUNT);
    let prompt = topics_prompt(keywords, tone, word_count);
    tracing::info!(keywords = %keywords, tone = %tone, "Generating topic suggestions");
    let raw = generate_with_timeout(provider, &prompt, timeout).await?;
    Ok(decode_suggestions(&raw, tone, word_count))
}

fn topics_prompt(keywords: &str, tone: &str, word_count: u32) -> String {
    format!(
        "Generate 5 blog post topic suggestions based on the following keywords: \"{keywords}\"\n\
         \n\
         Requirements:\n\
         - Tone: {tone}\n\
         - Target word count: approximately {word_count} words\n\
         - Each topic should be engaging and searchable\n\
         \n\
         For each topic, provide:\n\
         1. A compelling title\n\
         2. A brief description (2-3 sentences)\n\
         3. 3-5 relevant keywords\n\
         4. Estimated word count\n\
         \n\
         Format your response as a JSON array with this structure:\n\
         [\n\
           {{\n\
             \"title\": \"Example Blog Title\",\n\
             \"description\": \"Brief description of what this blog post will cover.\",\n\
             \"keywords\": [\"keyword1\", \"keyword2\", \"keyword3\"],\n\
             \"estimatedWordCount\": 1000\n\
           }}\n\
         ]\n\
         \n\
         Return ONLY the JSON array, no additional text."
    )
}

/// Parse the model's JSON array, assigning ids and the requested tone and
/// filling sane defaults. Unparseable output falls back to a single
/// suggestion so the caller never gets an empty error for a present reply.
fn decode_suggestions(raw: &str, tone: &str, default_word_count: u32) -> Vec<TopicSuggestion> {
    let cleaned = strip_code_fences(raw);
    match serde_json::from_str::<Vec<RawSuggestion>>(cleaned) {
        Ok(suggestions) => suggestions
            .into_iter()
            .map(|s| TopicSuggestion {
                id: Uuid::new_v4(),
                title: s.title,
                description: s.description,
                keywords: if s.keywords.is_empty() {
                    vec![tone.to_string(), "blog".to_string()]
                } else {
                    s.keywords
                },
                estimated_word_count: if s.estimated_word_count == 0 {
                    default_word_count
                } else {
                    s.estimated_word_count
                },
                tone: tone.to_string(),
            })
            .collect(),
        Err(e) => {
            tracing::error!("Failed to parse topic suggestions: {}", e);
            vec![TopicSuggestion {
                id: Uuid::new_v4(),
                title: format!("Blog Post about {} Content", tone),
                description: "An engaging blog post based on your keywords.".to_string(),
                keywords: vec![tone.to_string()],
                estimated_word_count: default_word_count,
                tone: tone.to_string(),
            }]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_fenced_json_array_and_assigns_id_and_tone() {
        let raw = "```json\n[{\"title\": \"Fasting myths\", \"description\": \"Debunking the big ones.\", \
                   \"keywords\": [\"fasting\", \"myths\"], \"estimatedWordCount\": 1200}]\n```";
        let suggestions = decode_suggestions(raw, "professional", 1000);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].title, "Fasting myths");
        assert_eq!(suggestions[0].description, "Debunking the big ones.");
        assert_eq!(suggestions[0].keywords, vec!["fasting", "myths"]);
        assert_eq!(suggestions[0].estimated_word_count, 1200);
        assert_eq!(suggestions[0].tone, "professional");
    }

    #[test]
    fn missing_word_count_and_keywords_get_defaults() {
        let raw = r#"[{"title": "Meal timing"}]"#;
        let suggestions = decode_suggestions(raw, "casual", 800);
        assert_eq!(suggestions[0].estimated_word_count, 800);
        assert_eq!(suggestions[0].keywords, vec!["casual", "blog"]);
    }

    #[test]
    fn malformed_output_becomes_a_single_fallback_suggestion() {
        let suggestions = decode_suggestions("1. Fasting myths\n2. Meal timing", "friendly", 1000);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].title, "Blog Post about friendly Content");
        assert_eq!(suggestions[0].keywords, vec!["friendly"]);
        assert_eq!(suggestions[0].estimated_word_count, 1000);
        assert_eq!(suggestions[0].tone, "friendly");
    }

    #[test]
    fn valid_empty_array_stays_empty() {
        assert!(decode_suggestions("[]", "casual", 1000).is_empty());
    }

    #[test]
    fn suggestion_serializes_camel_case() {
        let suggestion = TopicSuggestion {
            id: Uuid::new_v4(),
            title: "t".to_string(),
            description: "d".to_string(),
            keywords: vec!["k".to_string()],
            estimated_word_count: 900,
            tone: "casual".to_string(),
        };
        let json = serde_json::to_string(&suggestion).unwrap();
        assert!(json.contains("estimatedWordCount"));
        assert!(json.contains("\"tone\":\"casual\""));
    }
}
