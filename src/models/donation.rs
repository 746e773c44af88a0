use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "donation_status", rename_all = "snake_case")]
pub enum DonationStatus {
    Available,
    Booked,
    InTransit,
    Delivered,
    Completed,
}

impl DonationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DonationStatus::Available => "available",
            DonationStatus::Booked => "booked",
            DonationStatus::InTransit => "in_transit",
            DonationStatus::Delivered => "delivered",
            DonationStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "cart_status", rename_all = "snake_case")]
pub enum CartStatus {
    Available,
    Bought,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Donation {
    pub id: Uuid,
    pub donor_id: String,
    pub recipient_id: Option<String>,
    pub food_name: String,
    pub food_type: Option<String>,
    pub quantity: String,
    pub expiry_date: NaiveDate,
    pub pickup_location: String,
    pub from_location: Option<String>,
    pub image_url: Option<String>,
    pub status: DonationStatus,
    pub cart_status: CartStatus,
    pub is_bought: bool,
    pub donation_date: DateTime<Utc>,
    pub checkout_time: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewDonation {
    pub donor_id: String,
    pub food_name: String,
    pub food_type: Option<String>,
    pub quantity: String,
    pub expiry_date: NaiveDate,
    pub pickup_location: String,
    pub from_location: Option<String>,
    pub image_url: Option<String>,
}

impl NewDonation {
    pub fn into_donation(self, id: Uuid, now: DateTime<Utc>) -> Donation {
        Donation {
            id,
            donor_id: self.donor_id,
            recipient_id: None,
            food_name: self.food_name,
            food_type: self.food_type,
            quantity: self.quantity,
            expiry_date: self.expiry_date,
            pickup_location: self.pickup_location,
            from_location: self.from_location,
            image_url: self.image_url,
            status: DonationStatus::Available,
            cart_status: CartStatus::Available,
            is_bought: false,
            donation_date: now,
            checkout_time: None,
            delivered_at: None,
        }
    }
}

/// Attributes a recipient's cart entry is matched on during checkout.
#[derive(Debug, Clone)]
pub struct CheckoutCriteria {
    pub food_name: String,
    pub food_type: Option<String>,
    pub quantity: String,
    pub expiry_date: NaiveDate,
    pub pickup_location: String,
}

impl CheckoutCriteria {
    pub fn matches(&self, donation: &Donation) -> bool {
        donation.food_name == self.food_name
            && donation.food_type == self.food_type
            && donation.quantity == self.quantity
            && donation.expiry_date == self.expiry_date
            && donation.pickup_location == self.pickup_location
    }
}
