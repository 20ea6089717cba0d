// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Inference gateway (`inference@v1`). Models are opaque agents behind the
// router; the gateway only shapes, bounds and caches requests.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{params, Dispatch, GatewayError, GatewayRequest, Volatility};

const MAX_TEMPERATURE: f64 = 2.0;
const MAX_TOKENS: u32 = 8192;
const MAX_RECOMMENDATIONS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentContext {
    #[default]
    Review,
    Feedback,
    Chat,
    Social,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    Similar,
    Complementary,
    Trending,
    #[default]
    Personalized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum InferenceRequest {
    GenerateText {
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temperature: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_tokens: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system_prompt: Option<String>,
    },
    Chat {
        messages: Vec<ChatMessage>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temperature: Option<f64>,
    },
    AnalyzeSentiment {
        text: String,
        #[serde(default)]
        context: SentimentContext,
    },
    Recommend {
        user_id: String,
        #[serde(default)]
        recommendation_type: RecommendationType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
        /// Free-form preferences and browsing context
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<serde_json::Value>,
    },
    StyleMatch {
        base_product_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        occasion: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style_preferences: Option<serde_json::Value>,
    },
    ModelInfo {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model_name: Option<String>,
    },
}

fn temperature_in_range(temperature: Option<f64>) -> Result<(), GatewayError> {
    match temperature {
        Some(t) if !(0.0..=MAX_TEMPERATURE).contains(&t) => Err(GatewayError::invalid(format!(
            "'temperature' must be between 0 and {}",
            MAX_TEMPERATURE
        ))),
        _ => Ok(()),
    }
}

fn not_blank(field: &str, value: &str) -> Result<(), GatewayError> {
    if value.trim().is_empty() {
        return Err(GatewayError::invalid(format!("'{}' must not be empty", field)));
    }
    Ok(())
}

impl GatewayRequest for InferenceRequest {
    const GATEWAY: &'static str = "inference@v1";

    fn operation(&self) -> &'static str {
        match self {
            InferenceRequest::GenerateText { .. } => "generate_text",
            InferenceRequest::Chat { .. } => "chat",
            InferenceRequest::AnalyzeSentiment { .. } => "analyze_sentiment",
            InferenceRequest::Recommend { .. } => "recommend",
            InferenceRequest::StyleMatch { .. } => "style_match",
            InferenceRequest::ModelInfo { .. } => "model_info",
        }
    }

    fn validate(&self) -> Result<(), GatewayError> {
        match self {
            InferenceRequest::GenerateText {
                prompt,
                temperature,
                max_tokens,
                ..
            } => {
                not_blank("prompt", prompt)?;
                temperature_in_range(*temperature)?;
                if max_tokens.is_some_and(|m| m == 0 || m > MAX_TOKENS) {
                    return Err(GatewayError::invalid(format!(
                        "'maxTokens' must be between 1 and {}",
                        MAX_TOKENS
                    )));
                }
                Ok(())
            }
            InferenceRequest::Chat {
                messages,
                temperature,
                ..
            } => {
                if messages.is_empty() {
                    return Err(GatewayError::invalid("'messages' must not be empty"));
                }
                temperature_in_range(*temperature)
            }
            InferenceRequest::AnalyzeSentiment { text, .. } => not_blank("text", text),
            InferenceRequest::Recommend { user_id, limit, .. } => {
                not_blank("userId", user_id)?;
                if limit.is_some_and(|l| l == 0 || l > MAX_RECOMMENDATIONS) {
                    return Err(GatewayError::invalid(format!(
                        "'limit' must be between 1 and {}",
                        MAX_RECOMMENDATIONS
                    )));
                }
                Ok(())
            }
            InferenceRequest::StyleMatch { base_product_id, .. } => {
                not_blank("baseProductId", base_product_id)
            }
            InferenceRequest::ModelInfo { .. } => Ok(()),
        }
    }

    fn normalize(self) -> Self {
        match self {
            InferenceRequest::AnalyzeSentiment { text, context } => InferenceRequest::AnalyzeSentiment {
                text: text.trim().to_string(),
                context,
            },
            InferenceRequest::Recommend {
                user_id,
                recommendation_type,
                limit,
                context,
            } => InferenceRequest::Recommend {
                user_id: user_id.trim().to_string(),
                recommendation_type,
                limit: Some(limit.unwrap_or(5)),
                context,
            },
            InferenceRequest::StyleMatch {
                base_product_id,
                occasion,
                style_preferences,
            } => InferenceRequest::StyleMatch {
                base_product_id: base_product_id.trim().to_string(),
                occasion: occasion
                    .map(|o| o.trim().to_lowercase())
                    .filter(|o| !o.is_empty()),
                style_preferences,
            },
            InferenceRequest::ModelInfo { model_name } => InferenceRequest::ModelInfo {
                model_name: model_name.map(|m| m.trim().to_string()),
            },
            other => other,
        }
    }

    fn volatility(&self) -> Volatility {
        match self {
            InferenceRequest::GenerateText { .. } | InferenceRequest::Chat { .. } => {
                Volatility::Uncacheable
            }
            InferenceRequest::AnalyzeSentiment { .. } | InferenceRequest::ModelInfo { .. } => {
                Volatility::Static
            }
            InferenceRequest::Recommend { .. } | InferenceRequest::StyleMatch { .. } => {
                Volatility::Volatile
            }
        }
    }

    fn plan(&self) -> Dispatch {
        let capability = match self {
            InferenceRequest::GenerateText { .. } => "inference.generate@v1",
            InferenceRequest::Chat { .. } => "inference.chat@v1",
            InferenceRequest::AnalyzeSentiment { .. } => "inference.sentiment@v1",
            InferenceRequest::Recommend { .. } => "inference.recommend@v1",
            InferenceRequest::StyleMatch { .. } => "inference.style-match@v1",
            InferenceRequest::ModelInfo { .. } => "inference.model-info@v1",
        };
        Dispatch::Capability {
            capability,
            payload: params(self),
        }
    }

    fn fallback_default(&self) -> Option<serde_json::Value> {
        match self {
            InferenceRequest::Recommend { .. } => Some(json!({"recommendations": []})),
            InferenceRequest::StyleMatch { .. } => Some(json!({"matches": []})),
            InferenceRequest::AnalyzeSentiment { .. } => {
                Some(json!({"sentiment": "neutral", "score": 0.0}))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_never_cached() {
        let request: InferenceRequest = serde_json::from_value(json!({
            "operation": "generate_text",
            "prompt": "Describe a summer outfit",
            "temperature": 0.7
        }))
        .unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.volatility(), Volatility::Uncacheable);
    }

    #[test]
    fn test_temperature_bounds() {
        let request = InferenceRequest::Chat {
            messages: vec![ChatMessage {
                role: ChatRole::User,
                content: "hi".into(),
            }],
            model: None,
            temperature: Some(3.5),
        };
        assert!(matches!(request.validate(), Err(GatewayError::Validation(_))));
    }

    #[test]
    fn test_sentiment_falls_back_to_neutral() {
        let request = InferenceRequest::AnalyzeSentiment {
            text: "Love it".into(),
            context: SentimentContext::Review,
        };
        assert_eq!(
            request.fallback_default(),
            Some(json!({"sentiment": "neutral", "score": 0.0}))
        );
        assert_eq!(
            request.plan(),
            Dispatch::Capability {
                capability: "inference.sentiment@v1",
                payload: json!({"text": "Love it", "context": "review"}),
            }
        );
    }
}
