#![allow(dead_code)]

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use axum::{
    async_trait,
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Days, Local};
use serde_json::{json, Value};
use tower::ServiceExt;
use trashtocash_server::{
    build_router,
    config::{AdminSeed, Config},
    db::Database,
    routes::auth::seed_admin,
    services::mailer::{Email, Mailer},
    AppState,
};
use uuid::Uuid;

pub const ADMIN_EMAIL: &str = "admin@trashtocash.test";
pub const ADMIN_PASSWORD: &str = "admin-password";
pub const PASSWORD: &str = "password123";

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<Email>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: Email) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _email: Email) -> anyhow::Result<()> {
        anyhow::bail!("smtp connection refused")
    }
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    upload_dir: PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.upload_dir);
    }
}

fn test_config(upload_dir: &PathBuf) -> Config {
    Config {
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        upload_path: upload_dir.to_string_lossy().into_owned(),
        static_path: "static".to_string(),
        jwt_secret: "test-secret".to_string(),
        token_ttl_days: 7,
        mail_from: "no-reply@trashtocash.test".to_string(),
        admin_mailbox: "ops@trashtocash.test".to_string(),
        admin_seed: Some(AdminSeed {
            email: ADMIN_EMAIL.to_string(),
            password: ADMIN_PASSWORD.to_string(),
        }),
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(None).await
}

/// Builds an app whose mail goes to `mailer` instead of the recorder.
pub async fn spawn_app_with(mailer: Option<Arc<dyn Mailer>>) -> TestApp {
    let upload_dir = std::env::temp_dir().join(format!("ttc-test-{}", Uuid::new_v4()));
    let config = test_config(&upload_dir);

    let db = Database::connect(&config.database_url).await.unwrap();
    db.run_migrations().await.unwrap();
    if let Some(seed) = &config.admin_seed {
        seed_admin(&db, seed).await.unwrap();
    }

    let recorder = Arc::new(RecordingMailer::default());
    let mailer = mailer.unwrap_or_else(|| recorder.clone() as Arc<dyn Mailer>);
    let state = AppState::new(db, config, mailer);
    state.storage.init().await.unwrap();

    TestApp {
        router: build_router(state.clone()),
        state,
        mailer: recorder,
        upload_dir,
    }
}

pub fn pickup_date_in(days: u64) -> String {
    Local::now()
        .date_naive()
        .checked_add_days(Days::new(days))
        .unwrap()
        .format("%Y-%m-%d")
        .to_string()
}

pub fn address() -> Value {
    json!({
        "street": "12 MG Road",
        "city": "Bengaluru",
        "state": "Karnataka",
        "pincode": "560001"
    })
}

pub fn booking_body(services: Value) -> Value {
    json!({
        "services": services,
        "pickupAddress": address(),
        "pickupDate": pickup_date_in(2),
        "pickupTimeSlot": "9:00 AM - 12:00 PM",
        "contactPhone": "9876543210"
    })
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn multipart(
        &self,
        method: Method,
        uri: &str,
        token: &str,
        parts: &[Part<'_>],
    ) -> (StatusCode, Value) {
        let boundary = "----trashtocash-test-boundary";
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File {
                    name,
                    file_name,
                    content_type,
                    data,
                } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Registers a customer and returns `(token, user id)`.
    pub async fn register(&self, email: &str) -> (String, String) {
        let (status, body) = self
            .post(
                "/api/auth/register",
                None,
                json!({
                    "firstName": "Asha",
                    "lastName": "Rao",
                    "email": email,
                    "phone": "9876543210",
                    "password": PASSWORD
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    pub async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.post(
            "/api/auth/login",
            None,
            json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Logs in the seeded admin and returns `(token, user id)`.
    pub async fn admin(&self) -> (String, String) {
        let (status, body) = self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    pub async fn create_service(
        &self,
        admin_token: &str,
        name: &str,
        price_per_kg: f64,
        minimum_quantity: f64,
        maximum_quantity: f64,
    ) -> String {
        let (status, body) = self
            .post(
                "/api/services",
                Some(admin_token),
                json!({
                    "name": name,
                    "description": format!("{name} collection"),
                    "category": "Plastic",
                    "pricePerKg": price_per_kg,
                    "minimumQuantity": minimum_quantity,
                    "maximumQuantity": maximum_quantity
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["service"]["id"].as_str().unwrap().to_string()
    }

    /// Books `quantity` kg of `service_id` and returns the booking id.
    pub async fn book(&self, token: &str, service_id: &str, quantity: f64) -> String {
        let (status, body) = self
            .post(
                "/api/bookings",
                Some(token),
                booking_body(json!([{ "serviceId": service_id, "quantity": quantity }])),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["booking"]["id"].as_str().unwrap().to_string()
    }

    pub async fn set_status(&self, admin_token: &str, booking_id: &str, status: &str) -> (StatusCode, Value) {
        self.put(
            &format!("/api/bookings/{booking_id}/status"),
            Some(admin_token),
            json!({ "status": status }),
        )
        .await
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.state.db.pool)
            .await
            .unwrap()
    }
}
