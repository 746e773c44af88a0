use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::engine::lifecycle::{cart_state_consistent, Transition};
use crate::error::AppError;
use crate::models::cart_order::CartOrder;
use crate::models::donation::{CartStatus, CheckoutCriteria, Donation, DonationStatus, NewDonation};
use crate::models::location::{Location, LocationUpdate};
use crate::store::{donation_not_found, DonationStore};

/// In-process store used when no database is configured and by the tests.
/// Each transition runs under the donation's entry lock.
#[derive(Default)]
pub struct MemoryStore {
    donations: DashMap<Uuid, Donation>,
    cart_orders: DashMap<Uuid, CartOrder>,
    locations: DashMap<String, Location>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn donation_count(&self) -> usize {
        self.donations.len()
    }

    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    fn collect_sorted<F>(&self, keep: F) -> Vec<Donation>
    where
        F: Fn(&Donation) -> bool,
    {
        let mut donations: Vec<Donation> = self
            .donations
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        donations.sort_by(|a, b| b.donation_date.cmp(&a.donation_date));
        donations
    }

    fn apply<F>(&self, id: Uuid, transition: Transition, mutate: F) -> Result<Donation, AppError>
    where
        F: FnOnce(&mut Donation),
    {
        let mut donation = self
            .donations
            .get_mut(&id)
            .ok_or_else(|| donation_not_found(id))?;

        if !transition.permits(donation.status) {
            return Err(transition.rejected(id, donation.status));
        }

        donation.status = transition.target();
        mutate(&mut *donation);
        debug_assert!(cart_state_consistent(&donation));
        Ok(donation.clone())
    }
}

fn claim(donation: &mut Donation) {
    donation.cart_status = CartStatus::Bought;
    donation.is_bought = true;
    donation.checkout_time = Some(Utc::now());
}

#[async_trait]
impl DonationStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create_donation(&self, new: NewDonation) -> Result<Donation, AppError> {
        let donation = new.into_donation(Uuid::new_v4(), Utc::now());
        self.donations.insert(donation.id, donation.clone());
        Ok(donation)
    }

    async fn donations_by_donor(&self, donor_id: &str) -> Result<Vec<Donation>, AppError> {
        Ok(self.collect_sorted(|donation| donation.donor_id == donor_id))
    }

    async fn available_donations(&self, viewer_id: &str) -> Result<Vec<Donation>, AppError> {
        Ok(self.collect_sorted(|donation| {
            donation.status == DonationStatus::Available
                && donation.cart_status == CartStatus::Available
                && !donation.is_bought
                && donation.donor_id != viewer_id
        }))
    }

    async fn booked_donations(&self) -> Result<Vec<Donation>, AppError> {
        Ok(self.collect_sorted(|donation| {
            donation.status == DonationStatus::Booked
                && donation.cart_status == CartStatus::Bought
                && donation.is_bought
        }))
    }

    async fn buy_donation(&self, id: Uuid) -> Result<Donation, AppError> {
        self.apply(id, Transition::Buy, claim)
    }

    async fn checkout_donation(
        &self,
        criteria: &CheckoutCriteria,
        recipient_id: &str,
    ) -> Result<Option<Donation>, AppError> {
        let transition = Transition::Checkout;
        let claimable = |donation: &Donation| {
            transition.permits(donation.status)
                && donation.cart_status == CartStatus::Available
                && !donation.is_bought
                && criteria.matches(donation)
        };

        // Oldest first; each candidate is re-checked under its entry lock.
        let candidates: Vec<Uuid> = self
            .collect_sorted(&claimable)
            .into_iter()
            .rev()
            .map(|donation| donation.id)
            .collect();

        for id in candidates {
            let Some(mut donation) = self.donations.get_mut(&id) else {
                continue;
            };
            if claimable(&*donation) {
                donation.status = transition.target();
                claim(&mut *donation);
                donation.recipient_id = Some(recipient_id.to_string());
                debug_assert!(cart_state_consistent(&donation));
                return Ok(Some(donation.clone()));
            }
        }

        Ok(None)
    }

    async fn assign_volunteer(
        &self,
        donation_id: Uuid,
        volunteer_id: &str,
    ) -> Result<(Donation, CartOrder), AppError> {
        let order = CartOrder {
            id: Uuid::new_v4(),
            donation_id,
            volunteer_id: volunteer_id.to_string(),
            assigned_at: Utc::now(),
        };

        let donation = self.apply(donation_id, Transition::AssignVolunteer, |_| {
            self.cart_orders.insert(order.id, order.clone());
        })?;

        Ok((donation, order))
    }

    async fn complete_donation(&self, id: Uuid) -> Result<Donation, AppError> {
        self.apply(id, Transition::Complete, |donation| {
            donation.delivered_at = Some(Utc::now());
        })
    }

    async fn cart_orders_for(&self, donation_id: Uuid) -> Result<Vec<CartOrder>, AppError> {
        let mut orders: Vec<CartOrder> = self
            .cart_orders
            .iter()
            .filter(|entry| entry.value().donation_id == donation_id)
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| a.assigned_at.cmp(&b.assigned_at));
        Ok(orders)
    }

    async fn upsert_location(&self, update: LocationUpdate) -> Result<Location, AppError> {
        let now = Utc::now();
        let mut location = self
            .locations
            .entry(update.user_id.clone())
            .or_insert_with(|| Location {
                user_id: update.user_id.clone(),
                role: None,
                latitude: update.latitude,
                longitude: update.longitude,
                updated_at: now,
            });

        if update.role.is_some() {
            location.role = update.role;
        }
        location.latitude = update.latitude;
        location.longitude = update.longitude;
        location.updated_at = now;

        Ok(location.clone())
    }

    async fn location(&self, user_id: &str) -> Result<Option<Location>, AppError> {
        Ok(self.locations.get(user_id).map(|entry| entry.value().clone()))
    }
}
