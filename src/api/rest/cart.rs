use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::rest::{parse_id, present, string_or_number, ApiJson};
use crate::auth::AuthUser;
use crate::engine::lifecycle::Transition;
use crate::error::AppError;
use crate::models::cart_order::CartOrder;
use crate::models::donation::{CheckoutCriteria, Donation};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cart/checkout", post(checkout))
        .route("/cart/orders/:donation_id", get(cart_orders))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub food_name: Option<String>,
    pub food_type: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub quantity: Option<String>,
    pub expiry_date: Option<String>,
    pub pickup_location: Option<String>,
}

impl CheckoutRequest {
    fn criteria(&self) -> Result<CheckoutCriteria, AppError> {
        let (Some(food_name), Some(quantity), Some(expiry_date), Some(pickup_location)) = (
            present(&self.food_name),
            present(&self.quantity),
            present(&self.expiry_date),
            present(&self.pickup_location),
        ) else {
            return Err(AppError::BadRequest("Missing required fields".to_string()));
        };

        let expiry_date = NaiveDate::parse_from_str(&expiry_date, "%Y-%m-%d")
            .map_err(|_| AppError::BadRequest("expiryDate must be YYYY-MM-DD".to_string()))?;

        Ok(CheckoutCriteria {
            food_name,
            food_type: present(&self.food_type),
            quantity,
            expiry_date,
            pickup_location,
        })
    }
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub message: &'static str,
    pub donation: Donation,
}

async fn checkout(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(payload): ApiJson<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let criteria = payload.criteria()?;

    let donation = state
        .store
        .checkout_donation(&criteria, &user.uid)
        .await
        .inspect_err(|err| state.record_rejection(Transition::Checkout, err))?
        .ok_or_else(|| {
            let err = AppError::NotFound("Donation not found or already processed.".to_string());
            state.record_rejection(Transition::Checkout, &err);
            err
        })?;

    state.record_transition(Transition::Checkout, &donation);
    info!(
        donation_id = %donation.id,
        recipient_id = %user.uid,
        "donation checked out"
    );

    Ok(Json(CheckoutResponse {
        message: "Donation marked as bought and completed.",
        donation,
    }))
}

async fn cart_orders(
    State(state): State<Arc<AppState>>,
    Path(donation_id): Path<String>,
) -> Result<Json<Vec<CartOrder>>, AppError> {
    let donation_id = parse_id(&donation_id)?;
    Ok(Json(state.store.cart_orders_for(donation_id).await?))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::CheckoutRequest;

    #[test]
    fn blank_food_type_matches_untyped_donations() {
        let request: CheckoutRequest = serde_json::from_str(
            r#"{"foodName":"Rice","foodType":"  ","quantity":"2 kg","expiryDate":"2025-01-31","pickupLocation":"Depot"}"#,
        )
        .unwrap();
        let criteria = request.criteria().unwrap();
        assert_eq!(criteria.food_type, None);
        assert_eq!(
            criteria.expiry_date,
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()
        );
    }

    #[test]
    fn missing_pickup_location_is_rejected() {
        let request: CheckoutRequest = serde_json::from_str(
            r#"{"foodName":"Rice","quantity":"2 kg","expiryDate":"2025-01-31"}"#,
        )
        .unwrap();
        assert!(request.criteria().is_err());
    }
}
