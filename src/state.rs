use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::auth::TokenVerifier;
use crate::engine::lifecycle::Transition;
use crate::error::AppError;
use crate::expiry::ExpiryPredictor;
use crate::media::MediaUploader;
use crate::models::donation::Donation;
use crate::models::event::DonationEvent;
use crate::observability::metrics::Metrics;
use crate::store::DonationStore;

pub struct AppState {
    pub store: Arc<dyn DonationStore>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub uploader: Option<Arc<dyn MediaUploader>>,
    pub predictor: Option<ExpiryPredictor>,
    pub events_tx: broadcast::Sender<DonationEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DonationStore>,
        verifier: Arc<dyn TokenVerifier>,
        event_buffer_size: usize,
    ) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            store,
            verifier,
            uploader: None,
            predictor: None,
            events_tx,
            metrics: Metrics::new(),
        }
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn MediaUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn with_predictor(mut self, predictor: ExpiryPredictor) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn record_transition(&self, transition: Transition, donation: &Donation) {
        self.metrics
            .donation_transitions_total
            .with_label_values(&[transition.name(), "success"])
            .inc();

        let _ = self.events_tx.send(DonationEvent {
            donation_id: donation.id,
            transition: transition.name().to_string(),
            status: donation.status,
            at: Utc::now(),
        });
    }

    pub fn record_rejection(&self, transition: Transition, err: &AppError) {
        let outcome = match err {
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::BadRequest(_) => "invalid",
            _ => "error",
        };
        self.metrics
            .donation_transitions_total
            .with_label_values(&[transition.name(), outcome])
            .inc();
    }
}
