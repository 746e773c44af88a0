use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::donation::DonationStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonationEvent {
    pub donation_id: Uuid,
    pub transition: String,
    pub status: DonationStatus,
    pub at: DateTime<Utc>,
}
