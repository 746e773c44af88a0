use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::api::rest::{parse_id, present, string_or_number, ApiJson};
use crate::auth::AuthUser;
use crate::engine::lifecycle::Transition;
use crate::error::AppError;
use crate::media::ImageUpload;
use crate::models::cart_order::CartOrder;
use crate::models::donation::{Donation, NewDonation};
use crate::state::AppState;

const UPLOAD_FOLDER: &str = "donations";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/donations", post(create_donation))
        .route("/donations/user/:user_id", get(donations_by_donor))
        .route("/donations/available/:user_id", get(available_donations))
        .route("/donations/booked", get(booked_donations))
        .route("/donations/buy/:id", patch(buy_donation))
        .route("/donations/volunteer/:id", patch(assign_volunteer))
        .route("/donations/complete/:id", patch(complete_donation))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationForm {
    pub food_name: Option<String>,
    pub food_type: Option<String>,
    pub expiry_date: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub quantity: Option<String>,
    pub pickup_location: Option<String>,
    pub from_location: Option<String>,
}

impl DonationForm {
    fn set(&mut self, name: &str, value: String) {
        let slot = match name {
            "foodName" => &mut self.food_name,
            "foodType" => &mut self.food_type,
            "expiryDate" => &mut self.expiry_date,
            "quantity" => &mut self.quantity,
            "pickupLocation" => &mut self.pickup_location,
            "fromLocation" => &mut self.from_location,
            _ => return,
        };
        *slot = Some(value);
    }

    pub fn validate(&self, donor_id: &str) -> Result<NewDonation, AppError> {
        let food_name = present(&self.food_name);
        let expiry_date = present(&self.expiry_date);
        let quantity = present(&self.quantity);
        let pickup_location = present(&self.pickup_location);

        let missing: Vec<&str> = [
            ("foodName", food_name.is_none()),
            ("expiryDate", expiry_date.is_none()),
            ("quantity", quantity.is_none()),
            ("pickupLocation", pickup_location.is_none()),
        ]
        .into_iter()
        .filter_map(|(field, absent)| absent.then_some(field))
        .collect();

        let (Some(food_name), Some(expiry_date), Some(quantity), Some(pickup_location)) =
            (food_name, expiry_date, quantity, pickup_location)
        else {
            return Err(AppError::BadRequest(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        };

        let expiry_date = NaiveDate::parse_from_str(&expiry_date, "%Y-%m-%d")
            .map_err(|_| AppError::BadRequest("expiryDate must be YYYY-MM-DD".to_string()))?;

        Ok(NewDonation {
            donor_id: donor_id.to_string(),
            food_name,
            food_type: present(&self.food_type),
            quantity,
            expiry_date,
            pickup_location,
            from_location: present(&self.from_location),
            image_url: None,
        })
    }
}

/// A donation body: `multipart/form-data` with an optional `image` part, or JSON.
pub struct DonationSubmission {
    pub form: DonationForm,
    pub image: Option<ImageUpload>,
}

#[async_trait]
impl<S> FromRequest<S> for DonationSubmission
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        if !is_multipart {
            let ApiJson(form) = ApiJson::<DonationForm>::from_request(req, state).await?;
            return Ok(Self { form, image: None });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

        let mut form = DonationForm::default();
        let mut image = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| AppError::BadRequest(err.body_text()))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if name == "image" {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::BadRequest(err.body_text()))?;
                if !bytes.is_empty() {
                    image = Some(ImageUpload {
                        bytes: bytes.to_vec(),
                        content_type,
                        file_name,
                    });
                }
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::BadRequest(err.body_text()))?;
                form.set(&name, value);
            }
        }

        Ok(Self { form, image })
    }
}

async fn create_donation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    submission: DonationSubmission,
) -> Result<(StatusCode, Json<Donation>), AppError> {
    let mut new = submission.form.validate(&user.uid)?;

    if let Some(image) = submission.image {
        let uploader = state
            .uploader
            .as_ref()
            .ok_or_else(|| AppError::Upstream("image upload is not configured".to_string()))?;

        let public_id = format!("donation-{}", Uuid::new_v4());
        let started = Instant::now();
        let uploaded = uploader.upload(image, UPLOAD_FOLDER, &public_id).await;
        state
            .metrics
            .upstream_latency_seconds
            .with_label_values(&["cloudinary"])
            .observe(started.elapsed().as_secs_f64());

        let url = uploaded?;
        debug!(%public_id, %url, "donation image uploaded");
        new.image_url = Some(url);
    }

    let donation = state.store.create_donation(new).await?;
    state.record_transition(Transition::Create, &donation);

    info!(
        donation_id = %donation.id,
        donor_id = %donation.donor_id,
        food_name = %donation.food_name,
        "donation created"
    );

    Ok((StatusCode::CREATED, Json(donation)))
}

async fn donations_by_donor(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Donation>>, AppError> {
    Ok(Json(state.store.donations_by_donor(&user_id).await?))
}

async fn available_donations(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Donation>>, AppError> {
    Ok(Json(state.store.available_donations(&user_id).await?))
}

async fn booked_donations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Donation>>, AppError> {
    Ok(Json(state.store.booked_donations().await?))
}

async fn buy_donation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Donation>, AppError> {
    let id = parse_id(&id)?;
    let donation = state
        .store
        .buy_donation(id)
        .await
        .inspect_err(|err| state.record_rejection(Transition::Buy, err))?;

    state.record_transition(Transition::Buy, &donation);
    info!(donation_id = %id, "donation booked");

    Ok(Json(donation))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignVolunteerRequest {
    pub volunteer_id: Option<String>,
}

async fn assign_volunteer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<AssignVolunteerRequest>,
) -> Result<Json<CartOrder>, AppError> {
    let id = parse_id(&id)?;
    let volunteer_id = present(&payload.volunteer_id)
        .ok_or_else(|| AppError::BadRequest("volunteerId is required".to_string()))?;

    let (donation, order) = state
        .store
        .assign_volunteer(id, &volunteer_id)
        .await
        .inspect_err(|err| state.record_rejection(Transition::AssignVolunteer, err))?;

    state.record_transition(Transition::AssignVolunteer, &donation);
    info!(donation_id = %id, %volunteer_id, "volunteer assigned");

    Ok(Json(order))
}

async fn complete_donation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Donation>, AppError> {
    let id = parse_id(&id)?;
    let donation = state
        .store
        .complete_donation(id)
        .await
        .inspect_err(|err| state.record_rejection(Transition::Complete, err))?;

    state.record_transition(Transition::Complete, &donation);
    info!(donation_id = %id, "donation delivered");

    Ok(Json(donation))
}

#[cfg(test)]
mod tests {
    use super::DonationForm;
    use crate::error::AppError;

    fn form() -> DonationForm {
        serde_json::from_str(
            r#"{"foodName":" Bread ","quantity":3,"expiryDate":"2025-06-01","pickupLocation":"Main St 4"}"#,
        )
        .unwrap()
    }

    #[test]
    fn numeric_quantity_is_accepted_as_text() {
        let new = form().validate("donor-1").unwrap();
        assert_eq!(new.quantity, "3");
        assert_eq!(new.food_name, "Bread");
        assert_eq!(new.food_type, None);
    }

    #[test]
    fn missing_fields_are_listed() {
        let err = DonationForm::default().validate("donor-1").unwrap_err();
        let AppError::BadRequest(msg) = err else {
            panic!("expected bad request");
        };
        assert_eq!(
            msg,
            "missing required fields: foodName, expiryDate, quantity, pickupLocation"
        );
    }

    #[test]
    fn malformed_expiry_is_rejected() {
        let mut form = form();
        form.expiry_date = Some("01/06/2025".to_string());
        assert!(matches!(
            form.validate("donor-1"),
            Err(AppError::BadRequest(msg)) if msg == "expiryDate must be YYYY-MM-DD"
        ));
    }
}
