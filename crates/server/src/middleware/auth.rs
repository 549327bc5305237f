use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, errors::ErrorKind, DecodingKey, Validation};
use trashtocash_domain::Role;

use crate::{
    db::models::{UserRow, USER_COLUMNS},
    error::{AppError, Result},
    routes::auth::Claims,
    AppState,
};

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// The caller on optional-auth routes; `None` for anonymous requests.
#[derive(Clone, Debug, Default)]
pub struct MaybeUser(pub Option<AuthUser>);

/// Resolves the bearer token in `headers` to an active account.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthUser> {
    let bearer = headers
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| AppError::Unauthorized("No token provided, access denied".to_string()))?;

    let token_data = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::Unauthorized("Token has expired".to_string()),
        _ => AppError::Unauthorized("Invalid token".to_string()),
    })?;

    let user = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
    ))
    .bind(&token_data.claims.sub)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::Unauthorized("Token is not valid - user not found".to_string()))?;

    if !user.is_active {
        return Err(AppError::Unauthorized("Account is deactivated".to_string()));
    }

    Ok(AuthUser {
        role: user.role()?,
        id: user.id,
        email: user.email,
        first_name: user.first_name,
        last_name: user.last_name,
    })
}

pub async fn require_user(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let user = authenticate(&state, request.headers()).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let user = authenticate(&state, request.headers()).await?;
    if !user.is_admin() {
        return Err(AppError::Forbidden(
            "Access denied. Admin privileges required.".to_string(),
        ));
    }
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Never rejects: a missing, invalid or stale token yields an anonymous caller.
pub async fn optional_user(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let user = match authenticate(&state, request.headers()).await {
        Ok(user) => Some(user),
        Err(AppError::Unauthorized(reason)) => {
            tracing::debug!("Continuing anonymously: {reason}");
            None
        }
        Err(e) => {
            tracing::warn!("Continuing anonymously after auth failure: {e}");
            None
        }
    };
    request.extensions_mut().insert(MaybeUser(user));
    next.run(request).await
}

// Extractors for the caller resolved by the layers above
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        Ok(parts.extensions.get::<MaybeUser>().cloned().unwrap_or_default())
    }
}
