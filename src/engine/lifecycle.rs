use uuid::Uuid;

use crate::error::AppError;
use crate::models::donation::{CartStatus, Donation, DonationStatus};

/// A status change driven by one endpoint. `Checkout` is the direct path to
/// `Completed` that skips `Booked` and `InTransit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Create,
    Buy,
    Checkout,
    AssignVolunteer,
    Complete,
}

impl Transition {
    pub fn name(self) -> &'static str {
        match self {
            Transition::Create => "create",
            Transition::Buy => "buy",
            Transition::Checkout => "checkout",
            Transition::AssignVolunteer => "assign_volunteer",
            Transition::Complete => "complete",
        }
    }

    pub fn sources(self) -> &'static [DonationStatus] {
        match self {
            Transition::Create => &[],
            Transition::Buy | Transition::Checkout => &[DonationStatus::Available],
            Transition::AssignVolunteer => &[DonationStatus::Booked],
            Transition::Complete => &[DonationStatus::Booked, DonationStatus::InTransit],
        }
    }

    pub fn target(self) -> DonationStatus {
        match self {
            Transition::Create => DonationStatus::Available,
            Transition::Buy => DonationStatus::Booked,
            Transition::Checkout => DonationStatus::Completed,
            Transition::AssignVolunteer => DonationStatus::InTransit,
            Transition::Complete => DonationStatus::Delivered,
        }
    }

    pub fn permits(self, from: DonationStatus) -> bool {
        self.sources().contains(&from)
    }

    /// Source states as text, for `status::text = ANY($n)` predicates.
    pub fn source_names(self) -> Vec<String> {
        self.sources()
            .iter()
            .map(|status| status.as_str().to_string())
            .collect()
    }

    /// Error for a transition attempted from an illegal state.
    pub fn rejected(self, id: Uuid, from: DonationStatus) -> AppError {
        AppError::Conflict(format!(
            "donation {id} is {from}; cannot {}",
            self.name().replace('_', " ")
        ))
    }
}

/// `is_bought` and `cart_status = bought` both hold exactly when the donation
/// has left `available`.
pub fn cart_state_consistent(donation: &Donation) -> bool {
    let claimed = donation.status != DonationStatus::Available;
    donation.is_bought == claimed && (donation.cart_status == CartStatus::Bought) == claimed
}
