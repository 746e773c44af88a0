use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use crate::expiry::{FetchedImage, PredictError, VisionModel};

const GEMINI_MODELS_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

pub struct GeminiModel {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiModel {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }
}

fn first_candidate_text(response: GenerateResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|part| part.text).collect();
    if text.trim().is_empty() { None } else { Some(text) }
}

#[async_trait]
impl VisionModel for GeminiModel {
    async fn generate(&self, prompt: &str, image: &FetchedImage) -> Result<String, PredictError> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    {
                        "inline_data": {
                            "mime_type": image.mime_type,
                            "data": STANDARD.encode(&image.bytes),
                        }
                    }
                ]
            }]
        });

        let url = format!("{GEMINI_MODELS_URL}/{}:generateContent", self.model);
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| PredictError::Model(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PredictError::Model(format!("status {status}: {detail}")));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|err| PredictError::Model(err.to_string()))?;

        first_candidate_text(parsed)
            .ok_or_else(|| PredictError::Model("response carried no text".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{first_candidate_text, GenerateResponse};

    #[test]
    fn text_parts_of_first_candidate_are_joined() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"foodName\":"},{"text":"\"Milk\"}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(
            first_candidate_text(response).as_deref(),
            Some(r#"{"foodName":"Milk"}"#)
        );
    }

    #[test]
    fn blocked_response_has_no_text() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert_eq!(first_candidate_text(response), None);
    }
}
