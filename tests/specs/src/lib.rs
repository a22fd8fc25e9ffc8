// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end session tests.
//!
//! [`Shop`] is an in-process storefront API with rotating token pairs.
//! [`run_cli`] drives the real `storefront` binary against it.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

pub const EMAIL: &str = "lin@example.com";
pub const PASSWORD: &str = "hunter22";

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Resolve the path to the compiled `storefront` binary.
pub fn storefront_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("storefront")
}

struct Tokens {
    generation: u32,
    access: String,
    refresh: String,
}

#[derive(Default)]
struct Counters {
    refresh: AtomicU32,
    logout: AtomicU32,
    orders: AtomicU32,
}

struct ShopInner {
    tokens: Mutex<Tokens>,
    counters: Counters,
    refresh_delay_ms: AtomicU64,
    orders: Mutex<Vec<Value>>,
}

impl ShopInner {
    fn issue(&self) -> (String, String) {
        let mut tokens = self.tokens.lock();
        tokens.generation += 1;
        tokens.access = format!("at-{}", tokens.generation);
        tokens.refresh = format!("rt-{}", tokens.generation);
        (tokens.access.clone(), tokens.refresh.clone())
    }

    fn bearer_ok(&self, headers: &HeaderMap) -> bool {
        let presented = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        presented == Some(self.tokens.lock().access.as_str())
    }
}

/// In-process storefront API. The server task lives as long as the runtime.
#[derive(Clone)]
pub struct Shop {
    addr: SocketAddr,
    inner: Arc<ShopInner>,
}

fn user() -> Value {
    json!({
        "id": "u-42",
        "email": EMAIL,
        "firstName": "Lin",
        "lastName": "Chen",
        "role": "customer"
    })
}

fn session_body(access: &str, refresh: &str) -> Value {
    json!({ "user": user(), "accessToken": access, "refreshToken": refresh })
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": message }))).into_response()
}

async fn login(State(s): State<Arc<ShopInner>>, Json(body): Json<Value>) -> Response {
    if body["email"] != EMAIL || body["password"] != PASSWORD {
        return unauthorized("Invalid credentials");
    }
    let (access, refresh) = s.issue();
    Json(session_body(&access, &refresh)).into_response()
}

async fn refresh(State(s): State<Arc<ShopInner>>, Json(body): Json<Value>) -> Response {
    s.counters.refresh.fetch_add(1, Ordering::SeqCst);
    let delay = s.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    let current = s.tokens.lock().refresh.clone();
    if body["refreshToken"].as_str() != Some(current.as_str()) {
        return unauthorized("Invalid refresh token");
    }
    let (access, refresh) = s.issue();
    Json(session_body(&access, &refresh)).into_response()
}

async fn logout(State(s): State<Arc<ShopInner>>) -> Response {
    s.counters.logout.fetch_add(1, Ordering::SeqCst);
    s.tokens.lock().refresh = "logged-out".to_owned();
    StatusCode::NO_CONTENT.into_response()
}

async fn me(State(s): State<Arc<ShopInner>>, headers: HeaderMap) -> Response {
    if !s.bearer_ok(&headers) {
        return unauthorized("Unauthorized");
    }
    Json(user()).into_response()
}

async fn list_orders(State(s): State<Arc<ShopInner>>, headers: HeaderMap) -> Response {
    s.counters.orders.fetch_add(1, Ordering::SeqCst);
    if !s.bearer_ok(&headers) {
        return unauthorized("Unauthorized");
    }
    Json(Value::Array(s.orders.lock().clone())).into_response()
}

async fn create_order(
    State(s): State<Arc<ShopInner>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    s.counters.orders.fetch_add(1, Ordering::SeqCst);
    if !s.bearer_ok(&headers) {
        return unauthorized("Unauthorized");
    }
    let mut orders = s.orders.lock();
    let order = json!({ "id": orders.len() + 1, "items": body["items"].clone() });
    orders.push(order.clone());
    (StatusCode::CREATED, Json(order)).into_response()
}

impl Shop {
    pub async fn start() -> anyhow::Result<Self> {
        ensure_crypto();
        let inner = Arc::new(ShopInner {
            tokens: Mutex::new(Tokens {
                generation: 0,
                access: String::new(),
                refresh: String::new(),
            }),
            counters: Counters::default(),
            refresh_delay_ms: AtomicU64::new(0),
            orders: Mutex::new(Vec::new()),
        });
        let api = Router::new()
            .route("/auth/login", post(login))
            .route("/auth/refresh", post(refresh))
            .route("/auth/logout", post(logout))
            .route("/auth/me", get(me))
            .route("/orders", get(list_orders).post(create_order))
            .with_state(Arc::clone(&inner));
        let app = Router::new().nest("/api", api);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self { addr, inner })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Rotate the access token server-side so the client's copy goes stale.
    pub fn expire_access(&self) {
        let mut tokens = self.inner.tokens.lock();
        tokens.access = format!("at-{}-reissued", tokens.generation);
    }

    /// Invalidate the outstanding refresh token (revoked from another device).
    pub fn revoke_refresh(&self) {
        self.inner.tokens.lock().refresh = "revoked".to_owned();
    }

    pub fn current_refresh(&self) -> String {
        self.inner.tokens.lock().refresh.clone()
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.inner.refresh_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn refresh_calls(&self) -> u32 {
        self.inner.counters.refresh.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> u32 {
        self.inner.counters.logout.load(Ordering::SeqCst)
    }

    pub fn order_calls(&self) -> u32 {
        self.inner.counters.orders.load(Ordering::SeqCst)
    }
}

/// Read the refresh token the file cache persisted, if any.
pub fn cached_refresh_token(path: &Path) -> anyhow::Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    let map: Value = serde_json::from_str(&raw)?;
    Ok(map[storefront::token_cache::REFRESH_TOKEN_KEY].as_str().map(str::to_owned))
}

/// Captured result of one `storefront` invocation.
#[derive(Debug)]
pub struct CliOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CliOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn json(&self) -> anyhow::Result<Value> {
        Ok(serde_json::from_str(&self.stdout)?)
    }
}

/// Run the `storefront` binary against `shop`, caching tokens in `token_file`.
pub async fn run_cli(shop: &Shop, token_file: &Path, args: &[&str]) -> anyhow::Result<CliOutput> {
    let binary = storefront_binary();
    anyhow::ensure!(binary.exists(), "storefront binary not found at {}", binary.display());

    let output = tokio::process::Command::new(&binary)
        .args(args)
        .env("STOREFRONT_API_URL", shop.base_url())
        .env("STOREFRONT_TOKEN_FILE", token_file)
        .env("STOREFRONT_LOG_LEVEL", "warn")
        .env_remove("STOREFRONT_EMAIL")
        .env_remove("STOREFRONT_PASSWORD")
        .kill_on_drop(true)
        .output()
        .await?;

    Ok(CliOutput {
        code: output.status.code(),
        stdout: String::from_utf8(output.stdout)?,
        stderr: String::from_utf8(output.stderr)?,
    })
}
