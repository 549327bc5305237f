use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use trashtocash_domain::{
    contact::{MAX_MESSAGE_LEN, MAX_NAME_LEN, MAX_SUBJECT_LEN},
    validate, ContactCategory, ContactPriority, ContactStatus,
};
use uuid::Uuid;

use crate::{
    db::models::{ContactRow, ContactView, Page, Pagination, CONTACT_COLUMNS},
    error::{AppError, Result},
    extract::{AppJson, AppPath, AppQuery},
    middleware::auth::{optional_user, require_admin, AuthUser, MaybeUser},
    services::mailer::{contact_admin_notice, contact_confirmation, contact_reply, deliver},
    AppState,
};

pub fn router(state: AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/", get(list_contacts))
        .route("/stats/dashboard", get(contact_stats))
        .route("/:id", get(get_contact))
        .route("/:id/status", put(update_status))
        .route("/:id/respond", post(respond))
        .route_layer(from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/", post(submit_contact))
        .route_layer(from_fn_with_state(state, optional_user))
        .merge(admin)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub subject: String,
    pub message: String,
    pub category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub search: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateContactRequest {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RespondRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub message: String,
    pub contact_id: String,
}

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub contact: ContactView,
}

#[derive(Debug, Serialize)]
pub struct ContactListResponse {
    pub contacts: Vec<ContactView>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactCounts {
    pub total: i64,
    pub new: i64,
    pub resolved: i64,
    pub in_progress: i64,
}

#[derive(Debug, Serialize)]
pub struct CategoryCount {
    pub category: ContactCategory,
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactStats {
    pub stats: ContactCounts,
    pub recent_contacts: Vec<ContactView>,
    pub category_stats: Vec<CategoryCount>,
}

async fn find_contact(pool: &SqlitePool, id: &str) -> Result<ContactRow> {
    sqlx::query_as::<_, ContactRow>(&format!(
        "SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Contact not found".to_string()))
}

/// Parses an optional filter value; empty and `all` mean no filter.
fn filter_value<T>(value: Option<&str>) -> Result<Option<T>>
where
    T: std::str::FromStr<Err = trashtocash_domain::UnknownVariant>,
{
    match value {
        None | Some("") | Some("all") => Ok(None),
        Some(value) => Ok(Some(value.parse()?)),
    }
}

fn parse_day(field: &str, value: &str) -> Result<NaiveDate> {
    let day = value.trim().split('T').next().unwrap_or_default();
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("{field} must be a valid date (YYYY-MM-DD)")))
}

async fn submit_contact(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    AppJson(body): AppJson<ContactRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>)> {
    let name = body.name.trim();
    let email = body.email.trim().to_lowercase();
    let phone = body.phone.trim();
    let subject = body.subject.trim();
    let message = body.message.trim();

    let mut problems = validate::Problems::new();
    problems.check(validate::required("Name", name));
    problems.check(validate::max_len("Name", name, MAX_NAME_LEN));
    problems.check(validate::email(&email));
    problems.check(validate::phone("Phone number", phone));
    problems.check(validate::required("Subject", subject));
    problems.check(validate::max_len("Subject", subject, MAX_SUBJECT_LEN));
    problems.check(validate::required("Message", message));
    problems.check(validate::max_len("Message", message, MAX_MESSAGE_LEN));
    let category = match body.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(category) => category
            .parse::<ContactCategory>()
            .map_err(|e| problems.push(e.to_string()))
            .unwrap_or_default(),
        None => ContactCategory::default(),
    };
    problems.finish().map_err(AppError::InvalidFields)?;

    let contact_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO contacts (id, user_id, name, email, phone, subject, message, category,
                              status, priority, is_read, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(&contact_id)
    .bind(user.as_ref().map(|u| u.id.as_str()))
    .bind(name)
    .bind(&email)
    .bind(phone)
    .bind(subject)
    .bind(message)
    .bind(category.as_str())
    .bind(ContactStatus::default().as_str())
    .bind(ContactPriority::default().as_str())
    .bind(&now)
    .bind(&now)
    .execute(&state.db.pool)
    .await?;

    tracing::info!(contact_id = %contact_id, %category, "Contact inquiry received");

    let contact = ContactView::try_from(find_contact(&state.db.pool, &contact_id).await?)?;
    deliver(state.mailer.as_ref(), contact_confirmation(&contact)).await;
    deliver(
        state.mailer.as_ref(),
        contact_admin_notice(&contact, &state.config.admin_mailbox),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            message: "Thank you for your message. We will get back to you soon!".to_string(),
            contact_id,
        }),
    ))
}

async fn list_contacts(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ContactQuery>,
) -> Result<Json<ContactListResponse>> {
    let page = Page::new(query.page, query.limit);

    let status = filter_value::<ContactStatus>(query.status.as_deref())?;
    let category = filter_value::<ContactCategory>(query.category.as_deref())?;
    let priority = filter_value::<ContactPriority>(query.priority.as_deref())?;
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{s}%"));
    let window = match (query.start_date.as_deref(), query.end_date.as_deref()) {
        (Some(start), Some(end)) => {
            let start = parse_day("Start date", start)?;
            let end = parse_day("End date", end)?;
            // Inclusive of the whole end day.
            let end = end.checked_add_days(Days::new(1)).unwrap_or(end);
            Some((start.to_string(), end.to_string()))
        }
        _ => None,
    };

    let filtered = |select: &str| {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {select} FROM contacts WHERE 1 = 1"));
        if let Some(status) = status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(category) = category {
            builder.push(" AND category = ").push_bind(category.as_str());
        }
        if let Some(priority) = priority {
            builder.push(" AND priority = ").push_bind(priority.as_str());
        }
        if let Some(pattern) = &search {
            builder.push(" AND (name LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR email LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR subject LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR message LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(")");
        }
        if let Some((start, end)) = &window {
            builder
                .push(" AND created_at >= ")
                .push_bind(start.clone())
                .push(" AND created_at < ")
                .push_bind(end.clone());
        }
        builder
    };

    let total_count = filtered("COUNT(*)")
        .build_query_scalar::<i64>()
        .fetch_one(&state.db.pool)
        .await?;

    let mut builder = filtered(CONTACT_COLUMNS);
    builder
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset());

    let contacts = builder
        .build_query_as::<ContactRow>()
        .fetch_all(&state.db.pool)
        .await?
        .into_iter()
        .map(ContactView::try_from)
        .collect::<Result<Vec<_>>>()?;

    // Listed entries count as seen; the response still shows which were new.
    let unread: Vec<&str> = contacts
        .iter()
        .filter(|c| !c.is_read)
        .map(|c| c.id.as_str())
        .collect();
    if !unread.is_empty() {
        let mut mark = QueryBuilder::<Sqlite>::new("UPDATE contacts SET is_read = 1 WHERE id IN (");
        let mut ids = mark.separated(", ");
        for id in unread {
            ids.push_bind(id);
        }
        ids.push_unseparated(")");
        mark.build().execute(&state.db.pool).await?;
    }

    Ok(Json(ContactListResponse {
        pagination: page.describe(contacts.len(), total_count),
        contacts,
    }))
}

async fn get_contact(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> Result<Json<ContactResponse>> {
    let row = find_contact(&state.db.pool, &id).await?;

    if !row.is_read {
        sqlx::query("UPDATE contacts SET is_read = 1 WHERE id = ?")
            .bind(&id)
            .execute(&state.db.pool)
            .await?;
    }

    let mut contact = ContactView::try_from(row)?;
    contact.is_read = true;

    Ok(Json(ContactResponse {
        message: None,
        contact,
    }))
}

async fn update_status(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    AppJson(body): AppJson<UpdateContactRequest>,
) -> Result<Json<ContactResponse>> {
    let status = body
        .status
        .as_deref()
        .map(str::parse::<ContactStatus>)
        .transpose()?;
    let priority = body
        .priority
        .as_deref()
        .map(str::parse::<ContactPriority>)
        .transpose()?;
    let assigned_to = body
        .assigned_to
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty());

    find_contact(&state.db.pool, &id).await?;

    if let Some(assignee) = &assigned_to {
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
            .bind(assignee)
            .fetch_one(&state.db.pool)
            .await?;
        if exists == 0 {
            return Err(AppError::Validation("Assigned user not found".to_string()));
        }
    }

    sqlx::query(
        r#"
        UPDATE contacts
        SET status = COALESCE(?, status),
            priority = COALESCE(?, priority),
            assigned_to = COALESCE(?, assigned_to),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(status.map(|s| s.as_str()))
    .bind(priority.map(|p| p.as_str()))
    .bind(&assigned_to)
    .bind(Utc::now().to_rfc3339())
    .bind(&id)
    .execute(&state.db.pool)
    .await?;

    let contact = ContactView::try_from(find_contact(&state.db.pool, &id).await?)?;
    Ok(Json(ContactResponse {
        message: Some("Contact status updated successfully".to_string()),
        contact,
    }))
}

async fn respond(
    State(state): State<AppState>,
    admin: AuthUser,
    AppPath(id): AppPath<String>,
    AppJson(body): AppJson<RespondRequest>,
) -> Result<Json<ContactResponse>> {
    let response = body.message.trim();
    if response.is_empty() {
        return Err(AppError::Validation(
            "Response message is required".to_string(),
        ));
    }
    validate::max_len("Response message", response, MAX_MESSAGE_LEN)
        .map_err(AppError::Validation)?;

    find_contact(&state.db.pool, &id).await?;

    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        UPDATE contacts
        SET response_message = ?, responded_by = ?, responded_at = ?, status = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(response)
    .bind(&admin.id)
    .bind(&now)
    .bind(ContactStatus::Resolved.as_str())
    .bind(&now)
    .bind(&id)
    .execute(&state.db.pool)
    .await?;

    tracing::info!(contact_id = %id, admin = %admin.id, "Responded to contact inquiry");

    let contact = ContactView::try_from(find_contact(&state.db.pool, &id).await?)?;
    deliver(state.mailer.as_ref(), contact_reply(&contact, response)).await;

    Ok(Json(ContactResponse {
        message: Some("Response sent successfully".to_string()),
        contact,
    }))
}

async fn contact_stats(State(state): State<AppState>) -> Result<Json<ContactStats>> {
    let (total, new, resolved, in_progress) = sqlx::query_as::<_, (i64, i64, i64, i64)>(
        r#"
        SELECT COUNT(*),
               COALESCE(SUM(CASE WHEN status = 'new' THEN 1 ELSE 0 END), 0),
               COALESCE(SUM(CASE WHEN status = 'resolved' THEN 1 ELSE 0 END), 0),
               COALESCE(SUM(CASE WHEN status = 'in_progress' THEN 1 ELSE 0 END), 0)
        FROM contacts
        "#,
    )
    .fetch_one(&state.db.pool)
    .await?;

    let recent_contacts = sqlx::query_as::<_, ContactRow>(&format!(
        "SELECT {CONTACT_COLUMNS} FROM contacts ORDER BY created_at DESC LIMIT 5"
    ))
    .fetch_all(&state.db.pool)
    .await?
    .into_iter()
    .map(ContactView::try_from)
    .collect::<Result<Vec<_>>>()?;

    let category_stats = sqlx::query_as::<_, (String, i64)>(
        "SELECT category, COUNT(*) AS count FROM contacts GROUP BY category ORDER BY count DESC, category",
    )
    .fetch_all(&state.db.pool)
    .await?
    .into_iter()
    .map(|(category, count)| -> Result<CategoryCount> {
        Ok(CategoryCount {
            category: category.parse()?,
            count,
        })
    })
    .collect::<Result<Vec<_>>>()?;

    Ok(Json(ContactStats {
        stats: ContactCounts {
            total,
            new,
            resolved,
            in_progress,
        },
        recent_contacts,
        category_stats,
    }))
}
