use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use trashtocash_domain::{round_currency, BookingStatus};

use crate::{
    db::models::{BookingRow, BOOKING_COLUMNS},
    error::Result,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/stats", get(stats))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentBooking {
    pub id: String,
    pub status: BookingStatus,
    pub pickup_date: String,
    pub total_estimated_price: f64,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_bookings: i64,
    pub pending_bookings: i64,
    pub completed_bookings: i64,
    pub total_revenue: f64,
    pub total_users: i64,
    pub active_users: i64,
    pub active_services: i64,
    pub total_contacts: i64,
    pub recent_bookings: Vec<RecentBooking>,
}

async fn stats(State(state): State<AppState>) -> Result<Json<DashboardStats>> {
    let pool = &state.db.pool;

    let (total_bookings, pending_bookings, completed_bookings, total_revenue) =
        sqlx::query_as::<_, (i64, i64, i64, f64)>(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN status = 'completed'
                                     THEN COALESCE(actual_price, total_estimated_price)
                                     ELSE 0.0 END), 0.0)
            FROM bookings
            "#,
        )
        .fetch_one(pool)
        .await?;

    let (total_users, active_users) = sqlx::query_as::<_, (i64, i64)>(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN is_active = 1 THEN 1 ELSE 0 END), 0) FROM users",
    )
    .fetch_one(pool)
    .await?;

    let active_services =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM services WHERE is_active = 1")
            .fetch_one(pool)
            .await?;

    let total_contacts = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM contacts")
        .fetch_one(pool)
        .await?;

    let recent_bookings = sqlx::query_as::<_, BookingRow>(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY created_at DESC LIMIT 5"
    ))
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| -> Result<RecentBooking> {
        Ok(RecentBooking {
            status: row.status()?,
            id: row.id,
            pickup_date: row.pickup_date,
            total_estimated_price: row.total_estimated_price,
            created_at: row.created_at,
        })
    })
    .collect::<Result<Vec<_>>>()?;

    Ok(Json(DashboardStats {
        total_bookings,
        pending_bookings,
        completed_bookings,
        total_revenue: round_currency(total_revenue),
        total_users,
        active_users,
        active_services,
        total_contacts,
        recent_bookings,
    }))
}
