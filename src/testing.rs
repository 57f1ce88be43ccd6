use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use jsonwebtoken::Algorithm;
use serde_json::Value;
use tower::ServiceExt;

use crate::{
    app::build_app,
    auth::repo::InMemoryUserStore,
    config::{AppConfig, JwtConfig},
    products::repo::{InMemoryProductStore, NewProduct, Product, ProductError, ProductStore},
    state::AppState,
};

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: None,
        max_connections: 1,
        jwt: JwtConfig {
            secret: "test-secret".into(),
            algorithm: Algorithm::HS256,
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: Some(5),
        },
    }
}

/// Full router over in-memory stores, with handles kept for direct inspection.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub users: InMemoryUserStore,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_products(Arc::new(InMemoryProductStore::new()))
    }

    pub fn with_products(products: Arc<dyn ProductStore>) -> Self {
        let users = InMemoryUserStore::new();
        let state = AppState::from_parts(&test_config(), Arc::new(users.clone()), products);
        Self {
            router: build_app(state.clone()),
            state,
            users,
        }
    }

    /// Signs up and logs in `testuser`, returning the access token.
    pub async fn token(&self) -> String {
        signup(self, "testuser", "Test@123").await;
        let (status, body) = login(self, "testuser", "Test@123").await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["access_token"]
            .as_str()
            .expect("access_token")
            .to_string()
    }
}

pub async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let res = app.router.clone().oneshot(req).await.expect("router is infallible");
    let status = res.status();
    let headers = res.headers().clone();
    let bytes = res.into_body().collect().await.expect("body").to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, headers, body)
}

pub async fn send_json(
    app: &TestApp,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Value,
) -> (StatusCode, HeaderMap, Value) {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    send(app, req.body(Body::from(body.to_string())).unwrap()).await
}

pub async fn send_empty(
    app: &TestApp,
    method: &str,
    uri: &str,
    token: Option<&str>,
) -> (StatusCode, HeaderMap, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    send(app, req.body(Body::empty()).unwrap()).await
}

pub async fn send_form(app: &TestApp, uri: &str, form: &str) -> (StatusCode, HeaderMap, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap();
    send(app, req).await
}

pub async fn signup(app: &TestApp, username: &str, password: &str) -> (StatusCode, Value) {
    let body = serde_json::json!({
        "username": username,
        "email": format!("{username}@example.com"),
        "password": password,
    });
    let (status, _, body) = send_json(app, "POST", "/signup", None, body).await;
    (status, body)
}

pub async fn login(app: &TestApp, username: &str, password: &str) -> (StatusCode, Value) {
    let form = format!("username={username}&password={password}");
    let (status, _, body) = send_form(app, "/login", &form).await;
    (status, body)
}

/// Product store whose every call fails the way a lost database would.
pub struct FailingProductStore;

fn storage_down() -> ProductError {
    ProductError::Storage(sqlx::Error::Protocol(
        "connection to 10.0.0.5:5432 refused".into(),
    ))
}

#[async_trait]
impl ProductStore for FailingProductStore {
    async fn list(&self, _offset: i64, _limit: i64) -> Result<Vec<Product>, ProductError> {
        Err(storage_down())
    }
    async fn get_by_id(&self, _id: i64) -> Result<Option<Product>, ProductError> {
        Err(storage_down())
    }
    async fn create(&self, _product: &NewProduct) -> Result<Product, ProductError> {
        Err(storage_down())
    }
    async fn update(&self, _id: i64, _product: &NewProduct) -> Result<Product, ProductError> {
        Err(storage_down())
    }
    async fn delete_by_id(&self, _id: i64) -> Result<i64, ProductError> {
        Err(storage_down())
    }
    async fn delete_all(&self) -> Result<u64, ProductError> {
        Err(storage_down())
    }
}
