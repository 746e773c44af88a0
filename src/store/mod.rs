pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::cart_order::CartOrder;
use crate::models::donation::{CheckoutCriteria, Donation, NewDonation};
use crate::models::location::{Location, LocationUpdate};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Transitions are conditional writes on the current status, so concurrent
/// requests on one donation cannot both succeed.
#[async_trait]
pub trait DonationStore: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn create_donation(&self, new: NewDonation) -> Result<Donation, AppError>;

    async fn donations_by_donor(&self, donor_id: &str) -> Result<Vec<Donation>, AppError>;

    /// Unclaimed donations from anyone but `viewer_id`, newest first.
    async fn available_donations(&self, viewer_id: &str) -> Result<Vec<Donation>, AppError>;

    async fn booked_donations(&self) -> Result<Vec<Donation>, AppError>;

    async fn buy_donation(&self, id: Uuid) -> Result<Donation, AppError>;

    /// Claims the first available donation matching `criteria` for
    /// `recipient_id`. `Ok(None)` when nothing matches.
    async fn checkout_donation(
        &self,
        criteria: &CheckoutCriteria,
        recipient_id: &str,
    ) -> Result<Option<Donation>, AppError>;

    /// Moves the donation to `in_transit` and records the assignment; both
    /// happen or neither does.
    async fn assign_volunteer(
        &self,
        donation_id: Uuid,
        volunteer_id: &str,
    ) -> Result<(Donation, CartOrder), AppError>;

    async fn complete_donation(&self, id: Uuid) -> Result<Donation, AppError>;

    /// Assignments for a donation, oldest first.
    async fn cart_orders_for(&self, donation_id: Uuid) -> Result<Vec<CartOrder>, AppError>;

    async fn upsert_location(&self, update: LocationUpdate) -> Result<Location, AppError>;

    async fn location(&self, user_id: &str) -> Result<Option<Location>, AppError>;
}

pub(crate) fn donation_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("donation {id} not found"))
}
