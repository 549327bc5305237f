use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use trashtocash_domain::{validate, Role};
use uuid::Uuid;

use crate::{
    config::AdminSeed,
    db::{
        models::{Address, UserRow, UserView, USER_COLUMNS},
        Database,
    },
    error::{AppError, Result},
    extract::AppJson,
    middleware::auth::{require_user, AuthUser},
    routes::users::find_user,
    services::storage::{read_image_form, UploadScope, MAX_IMAGE_BYTES},
    AppState,
};

pub fn router(state: AppState) -> Router<AppState> {
    let account = Router::new()
        .route("/me", get(me))
        .route("/profile", put(update_profile))
        .route(
            "/profile/image",
            put(upload_profile_image).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 64 * 1024)),
        )
        .route("/change-password", put(change_password))
        .route_layer(from_fn_with_state(state, require_user));

    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .merge(account)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub address: Option<Address>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Address>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub token: String,
    pub user: UserView,
}

#[derive(Debug, Serialize)]
pub struct UserEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub user: UserView,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub role: Role,
    pub exp: usize,
}

pub(crate) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| AppError::Internal("Failed to hash password".to_string()))
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn create_token(user_id: &str, role: Role, secret: &str, ttl_days: i64) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(chrono::Duration::days(ttl_days))
        .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AppError::Internal("Failed to create token".to_string()))
}

/// A registration that lost the race for an email to a concurrent one
/// reports the same error as the up-front check.
fn email_conflict(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Validation("User already exists with this email".to_string())
        }
        other => AppError::Database(other),
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn register(
    State(state): State<AppState>,
    AppJson(body): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let email = normalize_email(&body.email);
    let phone = body.phone.trim();
    let address = body.address.map(Address::trimmed);

    let mut problems = validate::Problems::new();
    problems.check(validate::required("First name", &body.first_name));
    problems.check(validate::required("Last name", &body.last_name));
    problems.check(validate::email(&email));
    problems.check(validate::phone("Phone number", phone));
    problems.check(validate::password(&body.password));
    if let Some(address) = &address {
        for problem in address.problems("Address") {
            problems.push(problem);
        }
    }
    problems.finish().map_err(AppError::InvalidFields)?;

    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&email)
        .fetch_one(&state.db.pool)
        .await?;

    if existing > 0 {
        return Err(AppError::Validation(
            "User already exists with this email".to_string(),
        ));
    }

    let password_hash = hash_password(&body.password)?;
    let user_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    let address = address.as_ref();

    sqlx::query(
        r#"
        INSERT INTO users (id, first_name, last_name, email, phone, password_hash, role,
                           street, city, state, pincode, landmark, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(&user_id)
    .bind(body.first_name.trim())
    .bind(body.last_name.trim())
    .bind(&email)
    .bind(phone)
    .bind(&password_hash)
    .bind(Role::Customer.as_str())
    .bind(address.map(|a| a.street.as_str()))
    .bind(address.map(|a| a.city.as_str()))
    .bind(address.map(|a| a.state.as_str()))
    .bind(address.map(|a| a.pincode.as_str()))
    .bind(address.and_then(|a| a.landmark.as_deref()))
    .bind(&now)
    .bind(&now)
    .execute(&state.db.pool)
    .await
    .map_err(email_conflict)?;

    tracing::info!(user_id = %user_id, "Registered new customer");

    let user = UserView::try_from(find_user(&state.db, &user_id).await?)?;
    let token = create_token(
        &user.id,
        user.role,
        &state.config.jwt_secret,
        state.config.token_ttl_days,
    )?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered successfully".to_string(),
            token,
            user,
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    AppJson(body): AppJson<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let user = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
    ))
    .bind(normalize_email(&body.email))
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(invalid)?;

    if !verify_password(&body.password, &user.password_hash)? {
        return Err(invalid());
    }

    if !user.is_active {
        return Err(AppError::Unauthorized("Account is deactivated".to_string()));
    }

    let user = UserView::try_from(user)?;
    let token = create_token(
        &user.id,
        user.role,
        &state.config.jwt_secret,
        state.config.token_ttl_days,
    )?;

    Ok(Json(AuthResponse {
        message: "Login successful".to_string(),
        token,
        user,
    }))
}

async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<UserEnvelope>> {
    let user = UserView::try_from(find_user(&state.db, &user.id).await?)?;
    Ok(Json(UserEnvelope {
        message: None,
        user,
    }))
}

async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(body): AppJson<UpdateProfileRequest>,
) -> Result<Json<UserEnvelope>> {
    let address = body.address.map(Address::trimmed);

    let mut problems = validate::Problems::new();
    if let Some(first_name) = &body.first_name {
        problems.check(validate::required("First name", first_name));
    }
    if let Some(last_name) = &body.last_name {
        problems.check(validate::required("Last name", last_name));
    }
    if let Some(phone) = &body.phone {
        problems.check(validate::phone("Phone number", phone.trim()));
    }
    if let Some(address) = &address {
        for problem in address.problems("Address") {
            problems.push(problem);
        }
    }
    problems.finish().map_err(AppError::InvalidFields)?;

    let now = Utc::now().to_rfc3339();
    let mut tx = state.db.pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE users
        SET first_name = COALESCE(?, first_name),
            last_name = COALESCE(?, last_name),
            phone = COALESCE(?, phone),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(body.first_name.as_deref().map(str::trim))
    .bind(body.last_name.as_deref().map(str::trim))
    .bind(body.phone.as_deref().map(str::trim))
    .bind(&now)
    .bind(&user.id)
    .execute(&mut *tx)
    .await?;

    if let Some(address) = &address {
        sqlx::query(
            "UPDATE users SET street = ?, city = ?, state = ?, pincode = ?, landmark = ? WHERE id = ?",
        )
        .bind(&address.street)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.pincode)
        .bind(&address.landmark)
        .bind(&user.id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let user = UserView::try_from(find_user(&state.db, &user.id).await?)?;
    Ok(Json(UserEnvelope {
        message: Some("Profile updated successfully".to_string()),
        user,
    }))
}

async fn upload_profile_image(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<Json<UserEnvelope>> {
    let form = read_image_form(multipart, "profileImage", 1).await?;
    let image = form
        .images
        .first()
        .ok_or_else(|| AppError::Validation("Please select an image to upload".to_string()))?;

    let previous = find_user(&state.db, &user.id).await?.profile_image;
    let url = state.storage.save(UploadScope::Users, "profile", image).await?;

    let updated = sqlx::query("UPDATE users SET profile_image = ?, updated_at = ? WHERE id = ?")
        .bind(&url)
        .bind(Utc::now().to_rfc3339())
        .bind(&user.id)
        .execute(&state.db.pool)
        .await;
    if let Err(e) = updated {
        state.storage.remove(&url).await;
        return Err(e.into());
    }

    if let Some(previous) = previous {
        state.storage.remove(&previous).await;
    }

    let user = UserView::try_from(find_user(&state.db, &user.id).await?)?;
    Ok(Json(UserEnvelope {
        message: Some("Profile image updated successfully".to_string()),
        user,
    }))
}

async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(body): AppJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>> {
    let mut problems = validate::Problems::new();
    problems.check(validate::required("Current password", &body.current_password));
    problems.check(validate::password(&body.new_password));
    problems.finish().map_err(AppError::InvalidFields)?;

    let row = find_user(&state.db, &user.id).await?;
    if !verify_password(&body.current_password, &row.password_hash)? {
        return Err(AppError::Validation(
            "Current password is incorrect".to_string(),
        ));
    }

    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(hash_password(&body.new_password)?)
        .bind(Utc::now().to_rfc3339())
        .bind(&user.id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(MessageResponse {
        message: "Password changed successfully".to_string(),
    }))
}

/// Creates the configured admin account unless its email is already taken.
pub async fn seed_admin(db: &Database, seed: &AdminSeed) -> Result<()> {
    let email = normalize_email(&seed.email);
    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&email)
        .fetch_one(&db.pool)
        .await?;

    if existing > 0 {
        return Ok(());
    }

    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO users (id, first_name, last_name, email, phone, password_hash, role,
                           is_active, created_at, updated_at)
        VALUES (?, 'Admin', 'User', ?, '0000000000', ?, ?, 1, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&email)
    .bind(hash_password(&seed.password)?)
    .bind(Role::Admin.as_str())
    .bind(&now)
    .bind(&now)
    .execute(&db.pool)
    .await?;

    tracing::info!("Seeded admin account {email}");
    Ok(())
}
