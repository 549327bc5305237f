use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub upload_path: String,
    pub static_path: String,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub mail_from: String,
    pub admin_mailbox: String,
    pub admin_seed: Option<AdminSeed>,
}

/// Credentials for the admin account created on first start.
#[derive(Clone, Debug)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
}

impl Config {
    pub fn from_env() -> Self {
        let mail_from =
            env::var("MAIL_FROM").unwrap_or_else(|_| "no-reply@trashtocash.co.in".to_string());

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./data/trashtocash.db?mode=rwc".to_string()),
            upload_path: env::var("UPLOAD_PATH").unwrap_or_else(|_| "./data/uploads".to_string()),
            static_path: env::var("STATIC_PATH").unwrap_or_else(|_| "static".to_string()),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "development-secret-change-in-production".to_string()),
            token_ttl_days: env::var("TOKEN_TTL_DAYS")
                .ok()
                .and_then(|d| d.parse().ok())
                .filter(|d| *d > 0)
                .unwrap_or(7),
            admin_mailbox: env::var("ADMIN_MAILBOX").unwrap_or_else(|_| mail_from.clone()),
            mail_from,
            admin_seed: match (env::var("ADMIN_EMAIL"), env::var("ADMIN_PASSWORD")) {
                (Ok(email), Ok(password)) if !email.is_empty() && !password.is_empty() => {
                    Some(AdminSeed { email, password })
                }
                _ => None,
            },
        }
    }
}
