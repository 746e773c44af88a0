use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Location {
    pub user_id: String,
    pub role: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub updated_at: DateTime<Utc>,
}

/// Last reported position of a user. A `None` role keeps whatever role is stored.
#[derive(Debug, Clone)]
pub struct LocationUpdate {
    pub user_id: String,
    pub role: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if self.user_id.trim().is_empty() {
            return Err("user_id cannot be empty".to_string());
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err("latitude must be within [-90, 90]".to_string());
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err("longitude must be within [-180, 180]".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::LocationUpdate;

    fn update(lat: f64, lng: f64) -> LocationUpdate {
        LocationUpdate {
            user_id: "volunteer-1".to_string(),
            role: Some("volunteer".to_string()),
            latitude: lat,
            longitude: lng,
        }
    }

    #[test]
    fn zero_coordinates_are_valid() {
        assert!(update(0.0, 0.0).validate().is_ok());
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        assert!(update(91.0, 13.4).validate().is_err());
        assert!(update(52.5, -180.5).validate().is_err());
    }
}
