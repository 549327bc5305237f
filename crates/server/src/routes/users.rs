use axum::{
    extract::State,
    routing::{get, put},
    Json, Router,
};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};
use trashtocash_domain::Role;

use crate::{
    db::{
        models::{Page, Pagination, UserRow, UserView, USER_COLUMNS},
        Database,
    },
    error::{AppError, Result},
    extract::{AppJson, AppPath, AppQuery},
    middleware::auth::AuthUser,
    routes::auth::MessageResponse,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/stats/dashboard", get(user_stats))
        .route("/:id", get(get_user).delete(delete_user))
        .route("/:id/status", put(update_status))
        .route("/:id/role", put(update_role))
}

pub(crate) async fn find_user(db: &Database, id: &str) -> Result<UserRow> {
    sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(&db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub search: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserView>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub user: UserView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_users: i64,
    pub active_users: i64,
    pub inactive_users: i64,
    pub customers: i64,
    pub admins: i64,
    pub new_this_month: i64,
}

fn filtered(select: &str, query: &UserQuery) -> Result<QueryBuilder<'static, Sqlite>> {
    let mut builder = QueryBuilder::new(format!("SELECT {select} FROM users WHERE 1 = 1"));

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{search}%");
        builder.push(" AND (first_name LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR last_name LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR email LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR phone LIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
    if let Some(role) = query.role.as_deref().filter(|r| !r.is_empty()) {
        let role: Role = role.parse()?;
        builder.push(" AND role = ").push_bind(role.as_str());
    }
    if let Some(is_active) = query.is_active {
        builder.push(" AND is_active = ").push_bind(is_active);
    }

    Ok(builder)
}

async fn list_users(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<UserQuery>,
) -> Result<Json<UserListResponse>> {
    let page = Page::new(query.page, query.limit);

    let total_count = filtered("COUNT(*)", &query)?
        .build_query_scalar::<i64>()
        .fetch_one(&state.db.pool)
        .await?;

    let mut builder = filtered(USER_COLUMNS, &query)?;
    builder
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset());

    let users = builder
        .build_query_as::<UserRow>()
        .fetch_all(&state.db.pool)
        .await?
        .into_iter()
        .map(UserView::try_from)
        .collect::<Result<Vec<_>>>()?;

    Ok(Json(UserListResponse {
        pagination: page.describe(users.len(), total_count),
        users,
    }))
}

async fn get_user(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> Result<Json<UserResponse>> {
    let user = UserView::try_from(find_user(&state.db, &id).await?)?;
    Ok(Json(UserResponse {
        message: None,
        user,
    }))
}

async fn update_status(
    State(state): State<AppState>,
    admin: AuthUser,
    AppPath(id): AppPath<String>,
    AppJson(body): AppJson<UpdateStatusRequest>,
) -> Result<Json<UserResponse>> {
    if id == admin.id && !body.is_active {
        return Err(AppError::Validation(
            "You cannot deactivate your own account".to_string(),
        ));
    }
    find_user(&state.db, &id).await?;

    sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
        .bind(body.is_active)
        .bind(Utc::now().to_rfc3339())
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    tracing::info!(admin = %admin.id, user = %id, is_active = body.is_active, "Changed account status");

    let user = UserView::try_from(find_user(&state.db, &id).await?)?;
    let verb = if body.is_active { "activated" } else { "deactivated" };
    Ok(Json(UserResponse {
        message: Some(format!("User {verb} successfully")),
        user,
    }))
}

async fn update_role(
    State(state): State<AppState>,
    admin: AuthUser,
    AppPath(id): AppPath<String>,
    AppJson(body): AppJson<UpdateRoleRequest>,
) -> Result<Json<UserResponse>> {
    let role: Role = body.role.parse()?;

    if id == admin.id && !role.is_admin() {
        return Err(AppError::Validation(
            "You cannot change your own admin role".to_string(),
        ));
    }
    find_user(&state.db, &id).await?;

    sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
        .bind(role.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    tracing::info!(admin = %admin.id, user = %id, %role, "Changed account role");

    let user = UserView::try_from(find_user(&state.db, &id).await?)?;
    Ok(Json(UserResponse {
        message: Some("User role updated successfully".to_string()),
        user,
    }))
}

async fn delete_user(
    State(state): State<AppState>,
    admin: AuthUser,
    AppPath(id): AppPath<String>,
) -> Result<Json<MessageResponse>> {
    if id == admin.id {
        return Err(AppError::Validation(
            "You cannot delete your own account".to_string(),
        ));
    }
    find_user(&state.db, &id).await?;

    // Accounts are deactivated, never removed: bookings keep referencing them.
    sqlx::query("UPDATE users SET is_active = 0, updated_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(MessageResponse {
        message: "User deleted successfully".to_string(),
    }))
}

async fn user_stats(State(state): State<AppState>) -> Result<Json<UserStats>> {
    let today = Utc::now().date_naive();
    let month_start = format!("{:04}-{:02}-01", today.year(), today.month());

    let (total_users, active_users, customers, admins, new_this_month) =
        sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN is_active = 1 THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN role = 'customer' THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN role = 'admin' THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN created_at >= ? THEN 1 ELSE 0 END), 0)
            FROM users
            "#,
        )
        .bind(month_start)
        .fetch_one(&state.db.pool)
        .await?;

    Ok(Json(UserStats {
        total_users,
        active_users,
        inactive_users: total_users - active_users,
        customers,
        admins,
        new_this_month,
    }))
}
