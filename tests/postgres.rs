// Runs against a real database when `DATABASE_URL` is set; skipped otherwise.

use std::sync::Arc;

use chrono::NaiveDate;
use hungerheal::error::AppError;
use hungerheal::models::donation::{CartStatus, CheckoutCriteria, DonationStatus, NewDonation};
use hungerheal::models::location::LocationUpdate;
use hungerheal::store::{DonationStore, PgStore};
use uuid::Uuid;

async fn connect() -> Option<Arc<PgStore>> {
    let url = std::env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty())?;
    let store = PgStore::connect(&url, 8).await.unwrap();
    store.migrate().await.unwrap();
    Some(Arc::new(store))
}

// Rows from earlier runs stay in the table, so every test uses its own names.
fn submission(tag: &str) -> NewDonation {
    NewDonation {
        donor_id: format!("donor-{tag}"),
        food_name: format!("food-{tag}"),
        food_type: Some("bakery".to_string()),
        quantity: "3".to_string(),
        expiry_date: NaiveDate::from_ymd_opt(2030, 5, 1).unwrap(),
        pickup_location: "12 Market Rd".to_string(),
        from_location: None,
        image_url: None,
    }
}

fn criteria_for(new: &NewDonation) -> CheckoutCriteria {
    CheckoutCriteria {
        food_name: new.food_name.clone(),
        food_type: new.food_type.clone(),
        quantity: new.quantity.clone(),
        expiry_date: new.expiry_date,
        pickup_location: new.pickup_location.clone(),
    }
}

#[tokio::test]
async fn pg_second_buy_is_a_conflict() {
    let Some(store) = connect().await else { return };
    let donation = store.create_donation(submission(&Uuid::new_v4().to_string())).await.unwrap();

    let bought = store.buy_donation(donation.id).await.unwrap();
    assert_eq!(bought.status, DonationStatus::Booked);
    assert_eq!(bought.cart_status, CartStatus::Bought);
    assert!(bought.is_bought);

    let err = store.buy_donation(donation.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "{err:?}");
}

#[tokio::test]
async fn pg_unknown_donation_is_not_found() {
    let Some(store) = connect().await else { return };
    let err = store.buy_donation(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "{err:?}");
}

#[tokio::test]
async fn pg_rejected_assignment_leaves_no_cart_order() {
    let Some(store) = connect().await else { return };
    let donation = store.create_donation(submission(&Uuid::new_v4().to_string())).await.unwrap();

    let err = store.assign_volunteer(donation.id, "volunteer-1").await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "{err:?}");
    assert!(store.cart_orders_for(donation.id).await.unwrap().is_empty());

    store.buy_donation(donation.id).await.unwrap();
    let (assigned, order) = store.assign_volunteer(donation.id, "volunteer-1").await.unwrap();
    assert_eq!(assigned.status, DonationStatus::InTransit);
    assert_eq!(order.donation_id, donation.id);
    assert_eq!(store.cart_orders_for(donation.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn pg_checkout_claims_once() {
    let Some(store) = connect().await else { return };
    let new = submission(&Uuid::new_v4().to_string());
    let criteria = criteria_for(&new);
    let donation = store.create_donation(new).await.unwrap();

    let claimed = store.checkout_donation(&criteria, "recipient-1").await.unwrap().unwrap();
    assert_eq!(claimed.id, donation.id);
    assert_eq!(claimed.status, DonationStatus::Completed);
    assert_eq!(claimed.recipient_id.as_deref(), Some("recipient-1"));

    assert!(store.checkout_donation(&criteria, "recipient-2").await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pg_concurrent_buys_have_exactly_one_winner() {
    let Some(store) = connect().await else { return };
    let donation = store.create_donation(submission(&Uuid::new_v4().to_string())).await.unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.buy_donation(donation.id).await })
        })
        .collect();

    let mut wins = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => wins += 1,
            Err(AppError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(wins, 1);
}

#[tokio::test]
async fn pg_location_upsert_keeps_stored_role() {
    let Some(store) = connect().await else { return };
    let user_id = format!("user-{}", Uuid::new_v4());

    store
        .upsert_location(LocationUpdate {
            user_id: user_id.clone(),
            role: Some("volunteer".to_string()),
            latitude: 13.0,
            longitude: 80.2,
        })
        .await
        .unwrap();
    let updated = store
        .upsert_location(LocationUpdate {
            user_id: user_id.clone(),
            role: None,
            latitude: 13.1,
            longitude: 80.3,
        })
        .await
        .unwrap();

    assert_eq!(updated.role.as_deref(), Some("volunteer"));
    assert_eq!(updated.latitude, 13.1);
    let stored = store.location(&user_id).await.unwrap().unwrap();
    assert_eq!(stored.longitude, 80.3);
}
