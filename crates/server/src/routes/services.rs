use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json as SqlJson, QueryBuilder, Sqlite};
use trashtocash_domain::{
    service::{DEFAULT_MAXIMUM_QUANTITY, DEFAULT_MINIMUM_QUANTITY, DEFAULT_PROCESSING_TIME},
    validate, QuantityBounds, ServiceCategory,
};
use uuid::Uuid;

use crate::{
    db::{
        models::{Page, Pagination, ServiceRow, ServiceView, SERVICE_COLUMNS},
        Database,
    },
    error::{AppError, Result},
    extract::{AppJson, AppPath, AppQuery},
    middleware::auth::require_admin,
    routes::auth::MessageResponse,
    services::storage::{read_image_form, UploadScope, MAX_IMAGE_BYTES},
    AppState,
};

const MAX_NAME_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 500;

pub fn router(state: AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/", post(create_service))
        .route("/:id", put(update_service).delete(delete_service))
        .route(
            "/:id/image",
            put(upload_service_image).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 64 * 1024)),
        )
        .route_layer(from_fn_with_state(state, require_admin));

    Router::new()
        .route("/", get(list_services))
        .route("/categories", get(list_categories))
        .route("/:id", get(get_service))
        .merge(admin)
}

/// Loads a service by id; `active_only` hides soft-deleted services.
pub(crate) async fn find_service(db: &Database, id: &str, active_only: bool) -> Result<ServiceRow> {
    sqlx::query_as::<_, ServiceRow>(&format!(
        "SELECT {SERVICE_COLUMNS} FROM services WHERE id = ? AND (is_active = 1 OR ? = 0)"
    ))
    .bind(id)
    .bind(active_only)
    .fetch_optional(&db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Service not found".to_string()))
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceSort {
    #[default]
    NameAsc,
    NameDesc,
    PriceAsc,
    PriceDesc,
}

impl ServiceSort {
    fn order_by(self) -> &'static str {
        match self {
            Self::NameAsc => "name ASC",
            Self::NameDesc => "name DESC",
            Self::PriceAsc => "price_per_kg ASC, name ASC",
            Self::PriceDesc => "price_per_kg DESC, name ASC",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ServiceQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub sort: ServiceSort,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price_per_kg: Option<f64>,
    pub minimum_quantity: Option<f64>,
    pub maximum_quantity: Option<f64>,
    pub features: Option<Vec<String>>,
    pub processing_time: Option<String>,
    pub available_areas: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ServiceListResponse {
    pub services: Vec<ServiceView>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct ServiceResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub service: ServiceView,
}

#[derive(Debug, Serialize)]
pub struct CategoryListResponse {
    pub categories: Vec<ServiceCategory>,
}

/// A service record after merging a request onto its current values.
struct ServiceDraft {
    name: String,
    description: String,
    category: ServiceCategory,
    price_per_kg: f64,
    bounds: QuantityBounds,
    features: Vec<String>,
    processing_time: String,
    available_areas: Vec<String>,
    is_active: bool,
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

impl ServiceDraft {
    /// Validates `request` on top of `current`, or on top of the defaults
    /// for a new service. Every problem is reported at once.
    fn merge(current: Option<&ServiceRow>, request: ServiceRequest) -> Result<Self> {
        let mut problems = validate::Problems::new();

        let name = request
            .name
            .or_else(|| current.map(|c| c.name.clone()))
            .unwrap_or_default()
            .trim()
            .to_string();
        problems.check(validate::required("Service name", &name));
        problems.check(validate::max_len("Service name", &name, MAX_NAME_LEN));

        let description = request
            .description
            .or_else(|| current.map(|c| c.description.clone()))
            .unwrap_or_default()
            .trim()
            .to_string();
        problems.check(validate::required("Description", &description));
        problems.check(validate::max_len("Description", &description, MAX_DESCRIPTION_LEN));

        let category = match request.category.or_else(|| current.map(|c| c.category.clone())) {
            Some(category) => match category.parse::<ServiceCategory>() {
                Ok(category) => Some(category),
                Err(e) => {
                    problems.push(e.to_string());
                    None
                }
            },
            None => {
                problems.push("Category is required");
                None
            }
        };

        let price_per_kg = request.price_per_kg.or(current.map(|c| c.price_per_kg));
        match price_per_kg {
            None => problems.push("Price per kg is required"),
            Some(price) if !price.is_finite() || price < 0.0 => {
                problems.push("Price per kg cannot be negative")
            }
            Some(_) => {}
        }

        let bounds = QuantityBounds::new(
            request
                .minimum_quantity
                .or(current.map(|c| c.minimum_quantity))
                .unwrap_or(DEFAULT_MINIMUM_QUANTITY),
            request
                .maximum_quantity
                .or(current.map(|c| c.maximum_quantity))
                .unwrap_or(DEFAULT_MAXIMUM_QUANTITY),
        );
        if let Err(e) = &bounds {
            problems.push(e.to_string());
        }

        problems.finish().map_err(AppError::InvalidFields)?;

        let (Some(category), Some(price_per_kg), Ok(bounds)) = (category, price_per_kg, bounds)
        else {
            return Err(AppError::Internal("Service draft validated without values".to_string()));
        };

        Ok(Self {
            name,
            description,
            category,
            price_per_kg,
            bounds,
            features: clean_list(
                request
                    .features
                    .or_else(|| current.map(|c| c.features.0.clone()))
                    .unwrap_or_default(),
            ),
            processing_time: request
                .processing_time
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .or_else(|| current.map(|c| c.processing_time.clone()))
                .unwrap_or_else(|| DEFAULT_PROCESSING_TIME.to_string()),
            available_areas: clean_list(
                request
                    .available_areas
                    .or_else(|| current.map(|c| c.available_areas.0.clone()))
                    .unwrap_or_default(),
            ),
            is_active: request
                .is_active
                .or(current.map(|c| c.is_active))
                .unwrap_or(true),
        })
    }
}

fn filtered(select: &str, query: &ServiceQuery) -> Result<QueryBuilder<'static, Sqlite>> {
    let mut builder =
        QueryBuilder::new(format!("SELECT {select} FROM services WHERE is_active = 1"));

    if let Some(category) = query.category.as_deref().filter(|c| !c.is_empty()) {
        let category: ServiceCategory = category.parse()?;
        builder.push(" AND category = ").push_bind(category.as_str());
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{search}%");
        builder.push(" AND (name LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR description LIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }

    Ok(builder)
}

async fn list_services(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ServiceQuery>,
) -> Result<Json<ServiceListResponse>> {
    let page = Page::new(query.page, query.limit);

    let total_count = filtered("COUNT(*)", &query)?
        .build_query_scalar::<i64>()
        .fetch_one(&state.db.pool)
        .await?;

    let mut builder = filtered(SERVICE_COLUMNS, &query)?;
    builder
        .push(" ORDER BY ")
        .push(query.sort.order_by())
        .push(" LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset());

    let services = builder
        .build_query_as::<ServiceRow>()
        .fetch_all(&state.db.pool)
        .await?
        .into_iter()
        .map(ServiceView::try_from)
        .collect::<Result<Vec<_>>>()?;

    Ok(Json(ServiceListResponse {
        pagination: page.describe(services.len(), total_count),
        services,
    }))
}

async fn list_categories(State(state): State<AppState>) -> Result<Json<CategoryListResponse>> {
    let categories = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT category FROM services WHERE is_active = 1 ORDER BY category",
    )
    .fetch_all(&state.db.pool)
    .await?
    .iter()
    .map(|c| c.parse::<ServiceCategory>().map_err(|e| AppError::Internal(e.to_string())))
    .collect::<Result<Vec<_>>>()?;

    Ok(Json(CategoryListResponse { categories }))
}

async fn get_service(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> Result<Json<ServiceResponse>> {
    let service = ServiceView::try_from(find_service(&state.db, &id, true).await?)?;
    Ok(Json(ServiceResponse {
        message: None,
        service,
    }))
}

async fn create_service(
    State(state): State<AppState>,
    AppJson(body): AppJson<ServiceRequest>,
) -> Result<(StatusCode, Json<ServiceResponse>)> {
    let draft = ServiceDraft::merge(None, body)?;
    let service_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO services (id, name, description, category, price_per_kg, minimum_quantity,
                              maximum_quantity, is_active, features, processing_time,
                              available_areas, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&service_id)
    .bind(&draft.name)
    .bind(&draft.description)
    .bind(draft.category.as_str())
    .bind(draft.price_per_kg)
    .bind(draft.bounds.minimum())
    .bind(draft.bounds.maximum())
    .bind(draft.is_active)
    .bind(SqlJson(&draft.features))
    .bind(&draft.processing_time)
    .bind(SqlJson(&draft.available_areas))
    .bind(&now)
    .bind(&now)
    .execute(&state.db.pool)
    .await?;

    tracing::info!(service_id = %service_id, name = %draft.name, "Created service");

    let service = ServiceView::try_from(find_service(&state.db, &service_id, false).await?)?;
    Ok((
        StatusCode::CREATED,
        Json(ServiceResponse {
            message: Some("Service created successfully".to_string()),
            service,
        }),
    ))
}

async fn update_service(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    AppJson(body): AppJson<ServiceRequest>,
) -> Result<Json<ServiceResponse>> {
    let current = find_service(&state.db, &id, false).await?;
    let draft = ServiceDraft::merge(Some(&current), body)?;

    sqlx::query(
        r#"
        UPDATE services
        SET name = ?, description = ?, category = ?, price_per_kg = ?, minimum_quantity = ?,
            maximum_quantity = ?, is_active = ?, features = ?, processing_time = ?,
            available_areas = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&draft.name)
    .bind(&draft.description)
    .bind(draft.category.as_str())
    .bind(draft.price_per_kg)
    .bind(draft.bounds.minimum())
    .bind(draft.bounds.maximum())
    .bind(draft.is_active)
    .bind(SqlJson(&draft.features))
    .bind(&draft.processing_time)
    .bind(SqlJson(&draft.available_areas))
    .bind(Utc::now().to_rfc3339())
    .bind(&id)
    .execute(&state.db.pool)
    .await?;

    let service = ServiceView::try_from(find_service(&state.db, &id, false).await?)?;
    Ok(Json(ServiceResponse {
        message: Some("Service updated successfully".to_string()),
        service,
    }))
}

async fn delete_service(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> Result<Json<MessageResponse>> {
    find_service(&state.db, &id, false).await?;

    sqlx::query("UPDATE services SET is_active = 0, updated_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    tracing::info!(service_id = %id, "Deactivated service");

    Ok(Json(MessageResponse {
        message: "Service deleted successfully".to_string(),
    }))
}

async fn upload_service_image(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    multipart: Multipart,
) -> Result<Json<ServiceResponse>> {
    let current = find_service(&state.db, &id, false).await?;

    let form = read_image_form(multipart, "image", 1).await?;
    let image = form
        .images
        .first()
        .ok_or_else(|| AppError::Validation("Please select an image to upload".to_string()))?;

    let url = state.storage.save(UploadScope::Services, "service", image).await?;

    let updated = sqlx::query("UPDATE services SET image = ?, updated_at = ? WHERE id = ?")
        .bind(&url)
        .bind(Utc::now().to_rfc3339())
        .bind(&id)
        .execute(&state.db.pool)
        .await;
    if let Err(e) = updated {
        state.storage.remove(&url).await;
        return Err(e.into());
    }

    if let Some(previous) = current.image {
        state.storage.remove(&previous).await;
    }

    let service = ServiceView::try_from(find_service(&state.db, &id, false).await?)?;
    Ok(Json(ServiceResponse {
        message: Some("Service image updated successfully".to_string()),
        service,
    }))
}
