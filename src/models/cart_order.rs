use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartOrder {
    pub id: Uuid,
    pub donation_id: Uuid,
    pub volunteer_id: String,
    pub assigned_at: DateTime<Utc>,
}
