use std::collections::HashMap;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use trashtocash_domain::{
    authorize_transition, booking::validate_pickup_date, ensure_feedback_allowed, quote, validate,
    BookingStatus, CatalogEntry, Feedback, FeedbackError, LineRequest, PaymentMethod, PaymentStatus,
    PricingError, Role, TimeSlot,
};
use uuid::Uuid;

use crate::{
    db::models::{
        Address, BookingImage, BookingItemRow, BookingRow, BookingView, Page, Pagination,
        ServiceRow, UserSummary, BOOKING_COLUMNS, SERVICE_COLUMNS,
    },
    error::{AppError, Result},
    extract::{AppJson, AppPath, AppQuery},
    middleware::auth::{require_admin, require_user, AuthUser},
    services::storage::{read_image_form, UploadScope, MAX_BOOKING_IMAGES, MAX_IMAGE_BYTES},
    AppState,
};

pub fn router(state: AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/:id/status", put(update_status))
        .route_layer(from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/", post(create_booking).get(list_bookings))
        .route("/:id", get(get_booking))
        .route("/:id/cancel", put(cancel_booking))
        .route("/:id/feedback", post(add_feedback))
        .route(
            "/:id/images",
            post(upload_images).layer(DefaultBodyLimit::max(
                MAX_BOOKING_IMAGES * MAX_IMAGE_BYTES + 256 * 1024,
            )),
        )
        .route_layer(from_fn_with_state(state, require_user))
        .merge(admin)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateBookingRequest {
    pub services: Vec<LineRequest>,
    pub pickup_address: Option<Address>,
    pub pickup_date: Option<String>,
    pub pickup_time_slot: Option<String>,
    pub contact_phone: Option<String>,
    pub alternate_phone: Option<String>,
    pub special_instructions: Option<String>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingQuery {
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
    pub assigned_to: Option<String>,
    pub actual_weight: Option<f64>,
    pub actual_price: Option<f64>,
    pub payment_status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FeedbackRequest {
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub booking: BookingView,
}

#[derive(Debug, Serialize)]
pub struct BookingListResponse {
    pub bookings: Vec<BookingView>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct ImageUploadResponse {
    pub message: String,
    pub images: Vec<BookingImage>,
}

fn parse_date(field: &str, value: &str) -> std::result::Result<NaiveDate, String> {
    // Accept a bare date or the date part of an ISO timestamp.
    let date = value.trim().split('T').next().unwrap_or_default();
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| format!("{field} must be a valid date (YYYY-MM-DD)"))
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn status_changed_concurrently() -> AppError {
    AppError::Conflict("Booking status was changed by another request, please retry".to_string())
}

/// Moves a booking from `from` to `to`, failing with a conflict if its
/// status is no longer `from`.
async fn move_status(
    pool: &SqlitePool,
    id: &str,
    from: BookingStatus,
    to: BookingStatus,
) -> Result<()> {
    let updated =
        sqlx::query("UPDATE bookings SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(to.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .bind(from.as_str())
            .execute(pool)
            .await?;

    if updated.rows_affected() == 0 {
        return Err(status_changed_concurrently());
    }
    Ok(())
}

async fn find_booking(pool: &SqlitePool, id: &str) -> Result<BookingRow> {
    sqlx::query_as::<_, BookingRow>(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))
}

/// Loads a booking the caller may act on. Other customers' bookings are
/// reported as missing.
async fn find_accessible_booking(pool: &SqlitePool, id: &str, user: &AuthUser) -> Result<BookingRow> {
    let row = find_booking(pool, id).await?;
    if !user.is_admin() && row.user_id != user.id {
        return Err(AppError::NotFound("Booking not found".to_string()));
    }
    Ok(row)
}

async fn user_summary(pool: &SqlitePool, id: &str) -> Result<Option<UserSummary>> {
    Ok(sqlx::query_as::<_, UserSummary>(
        "SELECT id, first_name, last_name, email, phone FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?)
}

async fn booking_view(pool: &SqlitePool, row: BookingRow) -> Result<BookingView> {
    let user = user_summary(pool, &row.user_id).await?;
    let assigned_to = match &row.assigned_to {
        Some(id) => user_summary(pool, id).await?,
        None => None,
    };

    let items = sqlx::query_as::<_, BookingItemRow>(
        r#"
        SELECT bi.service_id, bi.quantity, bi.estimated_price,
               s.name, s.category, s.price_per_kg, s.image
        FROM booking_items bi
        JOIN services s ON s.id = bi.service_id
        WHERE bi.booking_id = ?
        ORDER BY bi.position
        "#,
    )
    .bind(&row.id)
    .fetch_all(pool)
    .await?;

    let images = sqlx::query_as::<_, BookingImage>(
        "SELECT url, description, uploaded_at FROM booking_images WHERE booking_id = ? ORDER BY uploaded_at, rowid",
    )
    .bind(&row.id)
    .fetch_all(pool)
    .await?;

    BookingView::assemble(row, user, assigned_to, items, images)
}

async fn create_booking(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(body): AppJson<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>)> {
    let today = Local::now().date_naive();
    let mut problems = validate::Problems::new();

    if body.services.is_empty() {
        problems.push(PricingError::Empty.to_string());
    }

    let address = body.pickup_address.map(Address::trimmed);
    match &address {
        Some(address) => {
            for problem in address.problems("Pickup") {
                problems.push(problem);
            }
        }
        None => problems.push("Pickup address is required"),
    }

    let pickup_date = match body.pickup_date.as_deref() {
        Some(value) => match parse_date("Pickup date", value) {
            Ok(date) => {
                problems.check(validate_pickup_date(date, today));
                Some(date)
            }
            Err(problem) => {
                problems.push(problem);
                None
            }
        },
        None => {
            problems.push("Pickup date is required");
            None
        }
    };

    let time_slot = match body.pickup_time_slot.as_deref() {
        Some(value) => value
            .parse::<TimeSlot>()
            .map_err(|e| problems.push(e.to_string()))
            .ok(),
        None => {
            problems.push("Pickup time slot is required");
            None
        }
    };

    let contact_phone = body.contact_phone.unwrap_or_default().trim().to_string();
    problems.check(validate::phone("Contact phone", &contact_phone));

    let alternate_phone = optional_text(body.alternate_phone);
    if let Some(alternate) = &alternate_phone {
        problems.check(validate::phone("Alternate phone", alternate));
    }

    let special_instructions = optional_text(body.special_instructions);
    if let Some(notes) = &special_instructions {
        problems.check(validate::max_len(
            "Special instructions",
            notes,
            validate::MAX_NOTE_LEN,
        ));
    }

    let payment_method = match body.payment_method.as_deref() {
        Some(value) => value
            .parse::<PaymentMethod>()
            .map_err(|e| problems.push(e.to_string()))
            .ok(),
        None => Some(PaymentMethod::default()),
    };

    problems.finish().map_err(AppError::InvalidFields)?;

    let (Some(address), Some(pickup_date), Some(time_slot), Some(payment_method)) =
        (address, pickup_date, time_slot, payment_method)
    else {
        return Err(AppError::Internal("Booking validated without values".to_string()));
    };

    let mut tx = state.db.pool.begin().await?;

    let mut builder = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {SERVICE_COLUMNS} FROM services WHERE id IN ("
    ));
    let mut ids = builder.separated(", ");
    for line in &body.services {
        ids.push_bind(line.service_id.clone());
    }
    ids.push_unseparated(")");

    let catalog = builder
        .build_query_as::<ServiceRow>()
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(|row| row.catalog_entry().map(|entry| (row.id.clone(), entry)))
        .collect::<Result<HashMap<String, CatalogEntry>>>()?;

    // Prices always come from the catalog; any client total is ignored.
    let quote = quote(&body.services, |id| catalog.get(id))?;

    let booking_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO bookings (id, user_id, street, city, state, pincode, landmark, pickup_date,
                              pickup_time_slot, contact_phone, alternate_phone,
                              special_instructions, status, total_estimated_price,
                              payment_status, payment_method, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&booking_id)
    .bind(&user.id)
    .bind(&address.street)
    .bind(&address.city)
    .bind(&address.state)
    .bind(&address.pincode)
    .bind(&address.landmark)
    .bind(pickup_date.format("%Y-%m-%d").to_string())
    .bind(time_slot.as_str())
    .bind(&contact_phone)
    .bind(&alternate_phone)
    .bind(&special_instructions)
    .bind(BookingStatus::Pending.as_str())
    .bind(quote.total_estimated_price)
    .bind(PaymentStatus::default().as_str())
    .bind(payment_method.as_str())
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    for (position, line) in quote.lines.iter().enumerate() {
        sqlx::query(
            "INSERT INTO booking_items (booking_id, position, service_id, quantity, estimated_price) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&booking_id)
        .bind(position as i64)
        .bind(&line.service_id)
        .bind(line.quantity)
        .bind(line.estimated_price)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        booking_id = %booking_id,
        user_id = %user.id,
        total = quote.total_estimated_price,
        "Created booking"
    );

    let booking = booking_view(&state.db.pool, find_booking(&state.db.pool, &booking_id).await?).await?;
    Ok((
        StatusCode::CREATED,
        Json(BookingResponse {
            message: Some("Booking created successfully".to_string()),
            booking,
        }),
    ))
}

async fn list_bookings(
    State(state): State<AppState>,
    user: AuthUser,
    AppQuery(query): AppQuery<BookingQuery>,
) -> Result<Json<BookingListResponse>> {
    let page = Page::new(query.page, query.limit);

    let status = match query.status.as_deref() {
        None | Some("") | Some("all") => None,
        Some(status) => Some(status.parse::<BookingStatus>()?),
    };
    // The date window only applies when both ends are given.
    let window = match (query.start_date.as_deref(), query.end_date.as_deref()) {
        (Some(start), Some(end)) => Some((
            parse_date("Start date", start).map_err(AppError::Validation)?,
            parse_date("End date", end).map_err(AppError::Validation)?,
        )),
        _ => None,
    };

    let filtered = |select: &str| {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {select} FROM bookings WHERE 1 = 1"
        ));
        if !user.is_admin() {
            builder.push(" AND user_id = ").push_bind(user.id.clone());
        }
        if let Some(status) = status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some((start, end)) = window {
            builder
                .push(" AND pickup_date >= ")
                .push_bind(start.format("%Y-%m-%d").to_string())
                .push(" AND pickup_date <= ")
                .push_bind(end.format("%Y-%m-%d").to_string());
        }
        builder
    };

    let total_count = filtered("COUNT(*)")
        .build_query_scalar::<i64>()
        .fetch_one(&state.db.pool)
        .await?;

    let mut builder = filtered(BOOKING_COLUMNS);
    builder
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset());

    let rows = builder
        .build_query_as::<BookingRow>()
        .fetch_all(&state.db.pool)
        .await?;

    let mut bookings = Vec::with_capacity(rows.len());
    for row in rows {
        bookings.push(booking_view(&state.db.pool, row).await?);
    }

    Ok(Json(BookingListResponse {
        pagination: page.describe(bookings.len(), total_count),
        bookings,
    }))
}

async fn get_booking(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<String>,
) -> Result<Json<BookingResponse>> {
    let row = find_accessible_booking(&state.db.pool, &id, &user).await?;
    Ok(Json(BookingResponse {
        message: None,
        booking: booking_view(&state.db.pool, row).await?,
    }))
}

async fn update_status(
    State(state): State<AppState>,
    admin: AuthUser,
    AppPath(id): AppPath<String>,
    AppJson(body): AppJson<UpdateStatusRequest>,
) -> Result<Json<BookingResponse>> {
    let status: BookingStatus = body
        .status
        .as_deref()
        .ok_or_else(|| AppError::Validation("Status is required".to_string()))?
        .parse()?;
    let payment_status = body
        .payment_status
        .as_deref()
        .map(str::parse::<PaymentStatus>)
        .transpose()?;

    let mut problems = validate::Problems::new();
    for (field, value) in [
        ("Actual weight", body.actual_weight),
        ("Actual price", body.actual_price),
    ] {
        if matches!(value, Some(v) if !v.is_finite() || v < 0.0) {
            problems.push(format!("{field} cannot be negative"));
        }
    }
    problems.finish().map_err(AppError::InvalidFields)?;

    let row = find_booking(&state.db.pool, &id).await?;
    let current = row.status()?;
    authorize_transition(current, status, Role::Admin)?;

    let assigned_to = optional_text(body.assigned_to);
    if let Some(assignee) = &assigned_to {
        if user_summary(&state.db.pool, assignee).await?.is_none() {
            return Err(AppError::Validation("Assigned user not found".to_string()));
        }
    }

    // Guarded on the status that was authorized, so a concurrent change
    // (a cancellation, say) is never overwritten.
    let updated = sqlx::query(
        r#"
        UPDATE bookings
        SET status = ?,
            assigned_to = COALESCE(?, assigned_to),
            actual_weight = COALESCE(?, actual_weight),
            actual_price = COALESCE(?, actual_price),
            payment_status = COALESCE(?, payment_status),
            updated_at = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(status.as_str())
    .bind(&assigned_to)
    .bind(body.actual_weight)
    .bind(body.actual_price)
    .bind(payment_status.map(|p| p.as_str()))
    .bind(Utc::now().to_rfc3339())
    .bind(&id)
    .bind(current.as_str())
    .execute(&state.db.pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(status_changed_concurrently());
    }

    tracing::info!(booking_id = %id, admin = %admin.id, from = %current, to = %status, "Booking status changed");

    let booking = booking_view(&state.db.pool, find_booking(&state.db.pool, &id).await?).await?;
    Ok(Json(BookingResponse {
        message: Some("Booking status updated successfully".to_string()),
        booking,
    }))
}

async fn cancel_booking(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<String>,
) -> Result<Json<BookingResponse>> {
    let row = find_accessible_booking(&state.db.pool, &id, &user).await?;
    let current = row.status()?;
    authorize_transition(current, BookingStatus::Cancelled, user.role)?;

    move_status(&state.db.pool, &id, current, BookingStatus::Cancelled).await?;

    tracing::info!(booking_id = %id, user_id = %user.id, "Booking cancelled");

    let booking = booking_view(&state.db.pool, find_booking(&state.db.pool, &id).await?).await?;
    Ok(Json(BookingResponse {
        message: Some("Booking cancelled successfully".to_string()),
        booking,
    }))
}

async fn add_feedback(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<String>,
    AppJson(body): AppJson<FeedbackRequest>,
) -> Result<Json<BookingResponse>> {
    let feedback = Feedback::new(body.rating.unwrap_or_default(), body.comment)?;

    let row = find_accessible_booking(&state.db.pool, &id, &user).await?;
    ensure_feedback_allowed(row.status()?, row.has_feedback())?;

    // The guard on feedback_rating keeps a concurrent second submission out.
    let updated = sqlx::query(
        r#"
        UPDATE bookings
        SET feedback_rating = ?, feedback_comment = ?, feedback_submitted_at = ?, updated_at = ?
        WHERE id = ? AND feedback_rating IS NULL
        "#,
    )
    .bind(i64::from(feedback.rating))
    .bind(&feedback.comment)
    .bind(Utc::now().to_rfc3339())
    .bind(Utc::now().to_rfc3339())
    .bind(&id)
    .execute(&state.db.pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(FeedbackError::AlreadySubmitted.into());
    }

    let booking = booking_view(&state.db.pool, find_booking(&state.db.pool, &id).await?).await?;
    Ok(Json(BookingResponse {
        message: Some("Feedback submitted successfully".to_string()),
        booking,
    }))
}

async fn upload_images(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<String>,
    multipart: Multipart,
) -> Result<Json<ImageUploadResponse>> {
    find_accessible_booking(&state.db.pool, &id, &user).await?;

    let form = read_image_form(multipart, "bookingImages", MAX_BOOKING_IMAGES).await?;
    if form.images.is_empty() {
        return Err(AppError::Validation("No images uploaded".to_string()));
    }
    let description = form.field("description").unwrap_or_default().to_string();

    let urls = state
        .storage
        .save_all(UploadScope::Bookings, "booking", &form.images)
        .await?;
    let uploaded_at = Utc::now().to_rfc3339();
    let images: Vec<BookingImage> = urls
        .iter()
        .map(|url| BookingImage {
            url: url.clone(),
            description: description.clone(),
            uploaded_at: uploaded_at.clone(),
        })
        .collect();

    if let Err(e) = insert_images(&state.db.pool, &id, &images).await {
        state.storage.remove_all(&urls).await;
        return Err(e);
    }

    tracing::info!(booking_id = %id, count = images.len(), "Stored booking images");

    Ok(Json(ImageUploadResponse {
        message: "Images uploaded successfully".to_string(),
        images,
    }))
}

async fn insert_images(pool: &SqlitePool, booking_id: &str, images: &[BookingImage]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for image in images {
        sqlx::query(
            "INSERT INTO booking_images (id, booking_id, url, description, uploaded_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(booking_id)
        .bind(&image.url)
        .bind(&image.description)
        .bind(&image.uploaded_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn pool_with_booking(status: BookingStatus) -> SqlitePool {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.run_migrations().await.unwrap();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO users (id, first_name, last_name, email, phone, password_hash, created_at, updated_at) \
             VALUES ('u1', 'Asha', 'Rao', 'asha@example.com', '9876543210', 'x', ?, ?)",
        )
        .bind(&now)
        .bind(&now)
        .execute(&db.pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO bookings (id, user_id, street, city, state, pincode, pickup_date, pickup_time_slot, \
             contact_phone, status, total_estimated_price, created_at, updated_at) \
             VALUES ('b1', 'u1', '12 MG Road', 'Bengaluru', 'Karnataka', '560001', '2030-01-01', \
             '9:00 AM - 12:00 PM', '9876543210', ?, 10.0, ?, ?)",
        )
        .bind(status.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&db.pool)
        .await
        .unwrap();

        db.pool
    }

    async fn status_of(pool: &SqlitePool) -> BookingStatus {
        find_booking(pool, "b1").await.unwrap().status().unwrap()
    }

    #[tokio::test]
    async fn move_status_applies_from_the_expected_state() {
        let pool = pool_with_booking(BookingStatus::Confirmed).await;
        move_status(&pool, "b1", BookingStatus::Confirmed, BookingStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(status_of(&pool).await, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn stale_status_is_a_conflict_and_changes_nothing() {
        // Another request cancelled the booking after it was read as pending.
        let pool = pool_with_booking(BookingStatus::Cancelled).await;
        let err = move_status(&pool, "b1", BookingStatus::Pending, BookingStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(status_of(&pool).await, BookingStatus::Cancelled);
    }
}
