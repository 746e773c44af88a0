use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::lifecycle::Transition;
use crate::error::AppError;
use crate::models::cart_order::CartOrder;
use crate::models::donation::{CheckoutCriteria, Donation, DonationStatus, NewDonation};
use crate::models::location::{Location, LocationUpdate};
use crate::store::{donation_not_found, DonationStore};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;

        info!(max_connections, "connected to postgres");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("database migrations applied");
        Ok(())
    }
}

/// Turns a conditional update that touched no row into 404 or 409.
async fn explain_miss(
    conn: &mut PgConnection,
    id: Uuid,
    transition: Transition,
) -> Result<AppError, AppError> {
    let current: Option<DonationStatus> =
        sqlx::query_scalar("SELECT status FROM donation WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(match current {
        Some(status) => {
            warn!(donation_id = %id, %status, transition = transition.name(), "illegal transition");
            transition.rejected(id, status)
        }
        None => donation_not_found(id),
    })
}

#[async_trait]
impl DonationStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn create_donation(&self, new: NewDonation) -> Result<Donation, AppError> {
        let donation = sqlx::query_as::<_, Donation>(
            "INSERT INTO donation
                (id, donor_id, food_name, food_type, expiry_date, quantity, pickup_location,
                 from_location, image_url, donation_date, status, cart_status, is_bought)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), 'available', 'available', FALSE)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&new.donor_id)
        .bind(&new.food_name)
        .bind(&new.food_type)
        .bind(new.expiry_date)
        .bind(&new.quantity)
        .bind(&new.pickup_location)
        .bind(&new.from_location)
        .bind(&new.image_url)
        .fetch_one(&self.pool)
        .await?;

        Ok(donation)
    }

    async fn donations_by_donor(&self, donor_id: &str) -> Result<Vec<Donation>, AppError> {
        let donations = sqlx::query_as::<_, Donation>(
            "SELECT * FROM donation WHERE donor_id = $1 ORDER BY donation_date DESC",
        )
        .bind(donor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(donations)
    }

    async fn available_donations(&self, viewer_id: &str) -> Result<Vec<Donation>, AppError> {
        let donations = sqlx::query_as::<_, Donation>(
            "SELECT * FROM donation
             WHERE status = 'available'
               AND cart_status = 'available'
               AND is_bought = FALSE
               AND donor_id <> $1
             ORDER BY donation_date DESC",
        )
        .bind(viewer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(donations)
    }

    async fn booked_donations(&self) -> Result<Vec<Donation>, AppError> {
        let donations = sqlx::query_as::<_, Donation>(
            "SELECT * FROM donation
             WHERE cart_status = 'bought' AND is_bought = TRUE AND status = 'booked'
             ORDER BY donation_date DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(donations)
    }

    async fn buy_donation(&self, id: Uuid) -> Result<Donation, AppError> {
        let transition = Transition::Buy;
        let updated = sqlx::query_as::<_, Donation>(
            "UPDATE donation
             SET status = 'booked', cart_status = 'bought', is_bought = TRUE,
                 checkout_time = CURRENT_TIMESTAMP
             WHERE id = $1 AND status::text = ANY($2)
             RETURNING *",
        )
        .bind(id)
        .bind(transition.source_names())
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(donation) => Ok(donation),
            None => {
                let mut conn = self.pool.acquire().await?;
                Err(explain_miss(&mut *conn, id, transition).await?)
            }
        }
    }

    async fn checkout_donation(
        &self,
        criteria: &CheckoutCriteria,
        recipient_id: &str,
    ) -> Result<Option<Donation>, AppError> {
        let transition = Transition::Checkout;
        let claimed = sqlx::query_as::<_, Donation>(
            "UPDATE donation
             SET status = 'completed', cart_status = 'bought', is_bought = TRUE,
                 checkout_time = CURRENT_TIMESTAMP, recipient_id = $7
             WHERE id = (
                 SELECT id FROM donation
                 WHERE food_name = $1
                   AND food_type IS NOT DISTINCT FROM $2
                   AND quantity = $3
                   AND expiry_date = $4
                   AND pickup_location = $5
                   AND status::text = ANY($6)
                   AND cart_status = 'available'
                   AND is_bought = FALSE
                 ORDER BY donation_date
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING *",
        )
        .bind(&criteria.food_name)
        .bind(&criteria.food_type)
        .bind(&criteria.quantity)
        .bind(criteria.expiry_date)
        .bind(&criteria.pickup_location)
        .bind(transition.source_names())
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(claimed)
    }

    async fn assign_volunteer(
        &self,
        donation_id: Uuid,
        volunteer_id: &str,
    ) -> Result<(Donation, CartOrder), AppError> {
        let transition = Transition::AssignVolunteer;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Donation>(
            "UPDATE donation SET status = 'in_transit'
             WHERE id = $1 AND status::text = ANY($2)
             RETURNING *",
        )
        .bind(donation_id)
        .bind(transition.source_names())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(donation) = updated else {
            let err = explain_miss(&mut *tx, donation_id, transition).await?;
            tx.rollback().await?;
            return Err(err);
        };

        let order = sqlx::query_as::<_, CartOrder>(
            "INSERT INTO cart_orders (id, donation_id, volunteer_id, assigned_at)
             VALUES ($1, $2, $3, NOW())
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(donation_id)
        .bind(volunteer_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((donation, order))
    }

    async fn complete_donation(&self, id: Uuid) -> Result<Donation, AppError> {
        let transition = Transition::Complete;
        let updated = sqlx::query_as::<_, Donation>(
            "UPDATE donation SET status = 'delivered', delivered_at = NOW()
             WHERE id = $1 AND status::text = ANY($2)
             RETURNING *",
        )
        .bind(id)
        .bind(transition.source_names())
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(donation) => Ok(donation),
            None => {
                let mut conn = self.pool.acquire().await?;
                Err(explain_miss(&mut *conn, id, transition).await?)
            }
        }
    }

    async fn cart_orders_for(&self, donation_id: Uuid) -> Result<Vec<CartOrder>, AppError> {
        let orders = sqlx::query_as::<_, CartOrder>(
            "SELECT * FROM cart_orders WHERE donation_id = $1 ORDER BY assigned_at",
        )
        .bind(donation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    async fn upsert_location(&self, update: LocationUpdate) -> Result<Location, AppError> {
        let location = sqlx::query_as::<_, Location>(
            "INSERT INTO locations (user_id, role, latitude, longitude, updated_at)
             VALUES ($1, $2, $3, $4, NOW())
             ON CONFLICT (user_id) DO UPDATE
             SET role = COALESCE(EXCLUDED.role, locations.role),
                 latitude = EXCLUDED.latitude,
                 longitude = EXCLUDED.longitude,
                 updated_at = NOW()
             RETURNING *",
        )
        .bind(&update.user_id)
        .bind(&update.role)
        .bind(update.latitude)
        .bind(update.longitude)
        .fetch_one(&self.pool)
        .await?;

        Ok(location)
    }

    async fn location(&self, user_id: &str) -> Result<Option<Location>, AppError> {
        let location = sqlx::query_as::<_, Location>("SELECT * FROM locations WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(location)
    }
}
