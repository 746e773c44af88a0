use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use tracing::{info, warn};

use crate::api::rest::{present, ApiJson};
use crate::error::AppError;
use crate::expiry::ExpiryPrediction;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/predict-expiry", post(predict_expiry))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictExpiryRequest {
    pub image_url: Option<String>,
}

async fn predict_expiry(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<PredictExpiryRequest>,
) -> Result<Json<ExpiryPrediction>, AppError> {
    let image_url = present(&payload.image_url)
        .ok_or_else(|| AppError::BadRequest("imageUrl is required".to_string()))?;

    let Some(predictor) = state.predictor.as_ref() else {
        warn!("expiry prediction requested but no model is configured");
        state
            .metrics
            .expiry_predictions_total
            .with_label_values(&["unconfigured"])
            .inc();
        return Err(AppError::Upstream("Prediction failed".to_string()));
    };

    let started = Instant::now();
    let result = predictor.predict(&image_url).await;
    state
        .metrics
        .upstream_latency_seconds
        .with_label_values(&["gemini"])
        .observe(started.elapsed().as_secs_f64());

    match result {
        Ok(prediction) => {
            let outcome = if prediction.estimated_expiry {
                "estimated"
            } else {
                "read"
            };
            state
                .metrics
                .expiry_predictions_total
                .with_label_values(&[outcome])
                .inc();
            info!(
                food_name = %prediction.food_name,
                expiry_date = %prediction.expiry_date,
                estimated = prediction.estimated_expiry,
                "expiry predicted"
            );
            Ok(Json(prediction))
        }
        Err(err) => {
            warn!(error = %err, %image_url, "expiry prediction failed");
            state
                .metrics
                .expiry_predictions_total
                .with_label_values(&["failed"])
                .inc();
            Err(err.into())
        }
    }
}
