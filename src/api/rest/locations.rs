use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::rest::{present, ApiJson};
use crate::error::AppError;
use crate::models::location::{Location, LocationUpdate};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/location", post(report_location))
        .route(
            "/donations/locations/:user_id",
            get(get_location).put(update_location),
        )
}

#[derive(Debug, Deserialize)]
pub struct ReportLocationRequest {
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLocationRequest {
    pub role: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Serialize)]
pub struct LocationResponse {
    pub message: &'static str,
    pub location: Location,
}

async fn save(state: &AppState, update: LocationUpdate) -> Result<Location, AppError> {
    update.validate().map_err(AppError::BadRequest)?;

    let location = state.store.upsert_location(update).await?;
    state.metrics.location_updates_total.inc();
    debug!(
        user_id = %location.user_id,
        latitude = location.latitude,
        longitude = location.longitude,
        "location stored"
    );

    Ok(location)
}

async fn report_location(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<ReportLocationRequest>,
) -> Result<(StatusCode, Json<LocationResponse>), AppError> {
    let (Some(user_id), Some(role), Some(latitude), Some(longitude)) = (
        present(&payload.user_id),
        present(&payload.role),
        payload.latitude,
        payload.longitude,
    ) else {
        return Err(AppError::BadRequest("Missing required fields".to_string()));
    };

    let location = save(
        &state,
        LocationUpdate {
            user_id,
            role: Some(role),
            latitude,
            longitude,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(LocationResponse {
            message: "Location inserted/updated successfully",
            location,
        }),
    ))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    ApiJson(payload): ApiJson<UpdateLocationRequest>,
) -> Result<Json<LocationResponse>, AppError> {
    let (Some(latitude), Some(longitude)) = (payload.latitude, payload.longitude) else {
        return Err(AppError::BadRequest(
            "latitude and longitude are required".to_string(),
        ));
    };

    let location = save(
        &state,
        LocationUpdate {
            user_id,
            role: present(&payload.role),
            latitude,
            longitude,
        },
    )
    .await?;

    Ok(Json(LocationResponse {
        message: "Location updated",
        location,
    }))
}

async fn get_location(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Location>, AppError> {
    state
        .store
        .location(&user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no location recorded for {user_id}")))
}
