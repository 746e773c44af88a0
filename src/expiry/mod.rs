pub mod gemini;
pub mod shelf_life;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::AppError;

pub use gemini::GeminiModel;

pub const EXTRACTION_PROMPT: &str = r#"You are a food donation assistant.
Read the product in this image and reply with ONE JSON object and nothing else:

{
  "foodName": string | null,
  "brand": string | null,
  "expiryDate": string | null,
  "manufactureDate": string | null,
  "category": string | null
}

- No markdown and no text before or after the object.
- Use null for anything that is not visible.
- Dates are YYYY-MM-DD. When a printed expiry or best-before date is legible, put it in expiryDate."#;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("image fetch failed: {0}")]
    ImageFetch(String),

    #[error("model call failed: {0}")]
    Model(String),

    #[error("model returned unparseable output")]
    InvalidOutput { raw: String },
}

impl From<PredictError> for AppError {
    fn from(err: PredictError) -> Self {
        match err {
            PredictError::InvalidOutput { .. } => {
                AppError::Upstream("Invalid AI response format".to_string())
            }
            PredictError::ImageFetch(_) | PredictError::Model(_) => {
                AppError::Upstream("Prediction failed".to_string())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, PredictError>;
}

#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn generate(&self, prompt: &str, image: &FetchedImage) -> Result<String, PredictError>;
}

pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, PredictError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|err| PredictError::ImageFetch(err.to_string()))?;

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|err| PredictError::ImageFetch(err.to_string()))?;

        Ok(FetchedImage {
            bytes: bytes.to_vec(),
            mime_type,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryPrediction {
    pub food_name: String,
    pub food_type: String,
    pub expiry_date: String,
    pub estimated_expiry: bool,
}

pub struct ExpiryPredictor {
    fetcher: Arc<dyn ImageFetcher>,
    model: Arc<dyn VisionModel>,
}

impl ExpiryPredictor {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, model: Arc<dyn VisionModel>) -> Self {
        Self { fetcher, model }
    }

    pub async fn predict(&self, image_url: &str) -> Result<ExpiryPrediction, PredictError> {
        let image = self.fetcher.fetch(image_url).await?;
        debug!(bytes = image.bytes.len(), mime_type = %image.mime_type, "image fetched");

        let raw = self.model.generate(EXTRACTION_PROMPT, &image).await?;
        interpret(&raw)
    }
}

/// Removes a surrounding Markdown code fence (optionally tagged `json`).
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(mut body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    if body
        .get(..4)
        .is_some_and(|tag| tag.eq_ignore_ascii_case("json"))
    {
        body = &body[4..];
    }

    body.strip_suffix("```").unwrap_or(body).trim()
}

pub fn interpret(raw: &str) -> Result<ExpiryPrediction, PredictError> {
    let value = serde_json::from_str::<Value>(strip_code_fence(raw))
        .ok()
        .filter(Value::is_object)
        .ok_or_else(|| {
            warn!(raw, "model output is not a json object");
            PredictError::InvalidOutput {
                raw: raw.to_string(),
            }
        })?;

    let food_name = text_field(&value, "foodName");
    let mut expiry_date = text_field(&value, "expiryDate");
    let mut estimated_expiry = false;

    if expiry_date.is_none() {
        if let Some(manufactured) = text_field(&value, "manufactureDate") {
            let estimate = estimate_expiry(food_name.as_deref().unwrap_or(""), &manufactured);
            if estimate.is_some() {
                expiry_date = estimate;
                estimated_expiry = true;
            }
        }
    }

    Ok(ExpiryPrediction {
        food_name: food_name.unwrap_or_default(),
        food_type: text_field(&value, "category").unwrap_or_default(),
        expiry_date: expiry_date.unwrap_or_default(),
        estimated_expiry,
    })
}

/// Manufacture date plus the tabled shelf life, as `YYYY-MM-DD`.
pub fn estimate_expiry(food_name: &str, manufacture_date: &str) -> Option<String> {
    let days = shelf_life::days_for(food_name)?;
    let manufactured = parse_date(manufacture_date)?;
    let expiry = manufactured.checked_add_signed(Duration::days(days))?;
    Some(expiry.format("%Y-%m-%d").to_string())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::{estimate_expiry, interpret, strip_code_fence, PredictError};

    #[test]
    fn fences_are_stripped_with_or_without_tag() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```JSON {\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn printed_expiry_is_taken_verbatim() {
        let prediction = interpret(
            r#"{"foodName":"Milk","category":"dairy","expiryDate":"2025-03-10","manufactureDate":"2025-03-01"}"#,
        )
        .unwrap();
        assert_eq!(prediction.food_name, "Milk");
        assert_eq!(prediction.food_type, "dairy");
        assert_eq!(prediction.expiry_date, "2025-03-10");
        assert!(!prediction.estimated_expiry);
    }

    #[test]
    fn missing_expiry_is_estimated_from_manufacture_date() {
        let prediction = interpret(
            "```json\n{\"foodName\":\"Bread\",\"expiryDate\":null,\"manufactureDate\":\"2024-02-27\"}\n```",
        )
        .unwrap();
        assert_eq!(prediction.expiry_date, "2024-03-03");
        assert!(prediction.estimated_expiry);
    }

    #[test]
    fn unknown_food_leaves_expiry_empty() {
        let prediction =
            interpret(r#"{"foodName":"Truffle","manufactureDate":"2024-02-27"}"#).unwrap();
        assert_eq!(prediction.expiry_date, "");
        assert!(!prediction.estimated_expiry);
    }

    #[test]
    fn absent_fields_default_to_empty() {
        let prediction = interpret("{}").unwrap();
        assert_eq!(prediction.food_name, "");
        assert_eq!(prediction.food_type, "");
        assert_eq!(prediction.expiry_date, "");
        assert!(!prediction.estimated_expiry);
    }

    #[test]
    fn prose_is_invalid_output() {
        let err = interpret("Sorry, I cannot read this label.").unwrap_err();
        assert!(matches!(err, PredictError::InvalidOutput { .. }));
    }

    #[test]
    fn json_that_is_not_an_object_is_invalid_output() {
        for raw in ["null", "[]", "42", "\"Milk\"", "```json\nnull\n```"] {
            let err = interpret(raw).unwrap_err();
            assert!(matches!(err, PredictError::InvalidOutput { .. }), "{raw}");
        }
    }

    #[test]
    fn unparseable_manufacture_date_gives_no_estimate() {
        assert_eq!(estimate_expiry("milk", "last tuesday"), None);
        assert_eq!(
            estimate_expiry("rice", "2023-12-31"),
            Some("2024-12-30".to_string())
        );
    }
}
