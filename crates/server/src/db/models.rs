//! Table rows and the JSON shapes they are served as.
//!
//! Rows keep enum columns as text; conversion into the API views parses
//! them into the closed domain enums.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use trashtocash_domain::{
    BookingStatus, CatalogEntry, ContactCategory, ContactPriority, ContactStatus, PaymentMethod,
    PaymentStatus, QuantityBounds, Role, ServiceCategory, TimeSlot,
};

use crate::error::{AppError, Result};

fn column<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| AppError::Internal(format!("Corrupt {name} column: {e}")))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmark: Option<String>,
}

impl Address {
    pub fn problems(&self, prefix: &str) -> Vec<String> {
        let mut problems = trashtocash_domain::validate::Problems::new();
        for (field, value) in [
            ("street", &self.street),
            ("city", &self.city),
            ("state", &self.state),
            ("pincode", &self.pincode),
        ] {
            problems.check(trashtocash_domain::validate::required(
                &format!("{prefix} {field}"),
                value,
            ));
        }
        problems.finish().err().unwrap_or_default()
    }

    pub fn trimmed(self) -> Self {
        Self {
            street: self.street.trim().to_string(),
            city: self.city.trim().to_string(),
            state: self.state.trim().to_string(),
            pincode: self.pincode.trim().to_string(),
            landmark: self
                .landmark
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty()),
        }
    }
}

fn address_from_columns(
    street: Option<String>,
    city: Option<String>,
    state: Option<String>,
    pincode: Option<String>,
    landmark: Option<String>,
) -> Option<Address> {
    Some(Address {
        street: street?,
        city: city?,
        state: state?,
        pincode: pincode?,
        landmark,
    })
}

// ---------------------------------------------------------------- users

pub const USER_COLUMNS: &str = "id, first_name, last_name, email, phone, password_hash, role, \
     street, city, state, pincode, landmark, profile_image, is_active, created_at, updated_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub role: String,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub landmark: Option<String>,
    pub profile_image: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl UserRow {
    pub fn role(&self) -> Result<Role> {
        column("role", &self.role)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub role: Role,
    pub address: Option<Address>,
    pub profile_image: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<UserRow> for UserView {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(Self {
            role: row.role()?,
            address: address_from_columns(row.street, row.city, row.state, row.pincode, row.landmark),
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            profile_image: row.profile_image,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// The identity fields embedded in bookings and contacts.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

// ---------------------------------------------------------------- services

pub const SERVICE_COLUMNS: &str = "id, name, description, category, price_per_kg, \
     minimum_quantity, maximum_quantity, image, is_active, features, processing_time, \
     available_areas, created_at, updated_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServiceRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price_per_kg: f64,
    pub minimum_quantity: f64,
    pub maximum_quantity: f64,
    pub image: Option<String>,
    pub is_active: bool,
    pub features: Json<Vec<String>>,
    pub processing_time: String,
    pub available_areas: Json<Vec<String>>,
    pub created_at: String,
    pub updated_at: String,
}

impl ServiceRow {
    pub fn catalog_entry(&self) -> Result<CatalogEntry> {
        let bounds = QuantityBounds::new(self.minimum_quantity, self.maximum_quantity)
            .map_err(|e| AppError::Internal(format!("Service {} has bad bounds: {e}", self.id)))?;
        Ok(CatalogEntry {
            id: self.id.clone(),
            name: self.name.clone(),
            price_per_kg: self.price_per_kg,
            bounds,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: ServiceCategory,
    pub price_per_kg: f64,
    pub minimum_quantity: f64,
    pub maximum_quantity: f64,
    pub image: Option<String>,
    pub is_active: bool,
    pub features: Vec<String>,
    pub processing_time: String,
    pub available_areas: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<ServiceRow> for ServiceView {
    type Error = AppError;

    fn try_from(row: ServiceRow) -> Result<Self> {
        Ok(Self {
            category: column("category", &row.category)?,
            id: row.id,
            name: row.name,
            description: row.description,
            price_per_kg: row.price_per_kg,
            minimum_quantity: row.minimum_quantity,
            maximum_quantity: row.maximum_quantity,
            image: row.image,
            is_active: row.is_active,
            features: row.features.0,
            processing_time: row.processing_time,
            available_areas: row.available_areas.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ---------------------------------------------------------------- bookings

pub const BOOKING_COLUMNS: &str = "id, user_id, street, city, state, pincode, landmark, \
     pickup_date, pickup_time_slot, contact_phone, alternate_phone, special_instructions, \
     status, total_estimated_price, actual_weight, actual_price, assigned_to, payment_status, \
     payment_method, feedback_rating, feedback_comment, feedback_submitted_at, created_at, \
     updated_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookingRow {
    pub id: String,
    pub user_id: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub landmark: Option<String>,
    pub pickup_date: String,
    pub pickup_time_slot: String,
    pub contact_phone: String,
    pub alternate_phone: Option<String>,
    pub special_instructions: Option<String>,
    pub status: String,
    pub total_estimated_price: f64,
    pub actual_weight: Option<f64>,
    pub actual_price: Option<f64>,
    pub assigned_to: Option<String>,
    pub payment_status: String,
    pub payment_method: String,
    pub feedback_rating: Option<i64>,
    pub feedback_comment: Option<String>,
    pub feedback_submitted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl BookingRow {
    pub fn status(&self) -> Result<BookingStatus> {
        column("status", &self.status)
    }

    pub fn has_feedback(&self) -> bool {
        self.feedback_rating.is_some()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookingItemRow {
    pub service_id: String,
    pub quantity: f64,
    pub estimated_price: f64,
    pub name: String,
    pub category: String,
    pub price_per_kg: f64,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BookingImage {
    pub url: String,
    pub description: String,
    pub uploaded_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookedService {
    pub id: String,
    pub name: String,
    pub category: ServiceCategory,
    pub price_per_kg: f64,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingLineView {
    pub service: BookedService,
    pub quantity: f64,
    pub estimated_price: f64,
}

impl TryFrom<BookingItemRow> for BookingLineView {
    type Error = AppError;

    fn try_from(row: BookingItemRow) -> Result<Self> {
        Ok(Self {
            service: BookedService {
                category: column("category", &row.category)?,
                id: row.service_id,
                name: row.name,
                price_per_kg: row.price_per_kg,
                image: row.image,
            },
            quantity: row.quantity,
            estimated_price: row.estimated_price,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackView {
    pub rating: i64,
    pub comment: Option<String>,
    pub submitted_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    pub id: String,
    pub user: Option<UserSummary>,
    pub services: Vec<BookingLineView>,
    pub pickup_address: Address,
    pub pickup_date: String,
    pub pickup_time_slot: TimeSlot,
    pub contact_phone: String,
    pub alternate_phone: Option<String>,
    pub special_instructions: Option<String>,
    pub status: BookingStatus,
    pub total_estimated_price: f64,
    pub actual_weight: Option<f64>,
    pub actual_price: Option<f64>,
    pub assigned_to: Option<UserSummary>,
    pub images: Vec<BookingImage>,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub feedback: Option<FeedbackView>,
    pub created_at: String,
    pub updated_at: String,
}

impl BookingView {
    pub fn assemble(
        row: BookingRow,
        user: Option<UserSummary>,
        assigned_to: Option<UserSummary>,
        items: Vec<BookingItemRow>,
        images: Vec<BookingImage>,
    ) -> Result<Self> {
        let services = items
            .into_iter()
            .map(BookingLineView::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            status: row.status()?,
            pickup_time_slot: column("pickup time slot", &row.pickup_time_slot)?,
            payment_status: column("payment status", &row.payment_status)?,
            payment_method: column("payment method", &row.payment_method)?,
            feedback: row.feedback_rating.map(|rating| FeedbackView {
                rating,
                comment: row.feedback_comment,
                submitted_at: row.feedback_submitted_at,
            }),
            id: row.id,
            user,
            services,
            pickup_address: Address {
                street: row.street,
                city: row.city,
                state: row.state,
                pincode: row.pincode,
                landmark: row.landmark,
            },
            pickup_date: row.pickup_date,
            contact_phone: row.contact_phone,
            alternate_phone: row.alternate_phone,
            special_instructions: row.special_instructions,
            total_estimated_price: row.total_estimated_price,
            actual_weight: row.actual_weight,
            actual_price: row.actual_price,
            assigned_to,
            images,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ---------------------------------------------------------------- contacts

pub const CONTACT_COLUMNS: &str = "id, user_id, name, email, phone, subject, message, category, \
     status, priority, assigned_to, response_message, responded_by, responded_at, is_read, \
     created_at, updated_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ContactRow {
    pub id: String,
    pub user_id: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub subject: String,
    pub message: String,
    pub category: String,
    pub status: String,
    pub priority: String,
    pub assigned_to: Option<String>,
    pub response_message: Option<String>,
    pub responded_by: Option<String>,
    pub responded_at: Option<String>,
    pub is_read: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactResponseView {
    pub message: String,
    pub responded_by: Option<String>,
    pub responded_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactView {
    pub id: String,
    pub user_id: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub subject: String,
    pub message: String,
    pub category: ContactCategory,
    pub status: ContactStatus,
    pub priority: ContactPriority,
    pub assigned_to: Option<String>,
    pub response: Option<ContactResponseView>,
    pub is_read: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<ContactRow> for ContactView {
    type Error = AppError;

    fn try_from(row: ContactRow) -> Result<Self> {
        Ok(Self {
            category: column("category", &row.category)?,
            status: column("status", &row.status)?,
            priority: column("priority", &row.priority)?,
            response: row.response_message.map(|message| ContactResponseView {
                message,
                responded_by: row.responded_by,
                responded_at: row.responded_at,
            }),
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            subject: row.subject,
            message: row.message,
            assigned_to: row.assigned_to,
            is_read: row.is_read,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ---------------------------------------------------------------- paging

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current: i64,
    pub total: i64,
    pub count: usize,
    pub total_count: i64,
}

/// `page`/`limit` query values clamped to sane ranges.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub const MAX_LIMIT: i64 = 100;
    /// Highest page whose offset still fits in an `i64` at any limit.
    pub const MAX_PAGE: i64 = i64::MAX / Self::MAX_LIMIT;

    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).clamp(1, Self::MAX_PAGE),
            limit: limit.unwrap_or(10).clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    pub fn describe(&self, count: usize, total_count: i64) -> Pagination {
        Pagination {
            current: self.page,
            total: (total_count + self.limit - 1) / self.limit,
            count,
            total_count,
        }
    }
}
