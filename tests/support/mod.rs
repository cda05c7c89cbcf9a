// Scripted stand-in for the TaleName API shared by the integration tests.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, mpsc},
    time::Duration,
};

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use talename_extension::frameworks::config::ExtensionSettings;
use talename_extension::use_cases::{ClaimUiSettings, DetectionSettings};

pub const COOKIE_DOMAIN: &str = "talename.test";
pub const HYTALE_HOST: &str = "accounts.hytale.com";
pub const PROFILES_URL: &str = "https://accounts.hytale.com/profiles";

// One request as the mock saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub cookie: Option<String>,
    pub body: Option<Value>,
}

#[derive(Clone)]
struct Scripted {
    status: StatusCode,
    body: String,
}

#[derive(Default)]
struct MockState {
    routes: Mutex<HashMap<(String, String), Scripted>>,
    requests: Mutex<Vec<Recorded>>,
}

pub struct MockApi {
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockApi {
    // Each mock runs on its own thread so it outlives the `#[tokio::test]` runtime that started it.
    pub fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new().fallback(respond).with_state(Arc::clone(&state));
        let (published_tx, published_rx) = mpsc::channel();

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("mock runtime");
            runtime.block_on(async move {
                // Ephemeral port so parallel tests never collide.
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral mock port");
                let addr = listener.local_addr().expect("get local addr");
                let _ = published_tx.send(format!("http://{addr}"));
                axum::serve(listener, app).await.expect("mock server failed");
            });
        });

        let base_url = published_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("mock server did not start in time");
        Self { base_url, state }
    }

    /// Script the reply for `method path`; an empty body is sent as-is.
    pub fn reply(&self, method: &str, path: &str, status: u16, body: &str) {
        let scripted = Scripted {
            status: StatusCode::from_u16(status).expect("valid status code"),
            body: body.to_string(),
        };
        self.state
            .routes
            .lock()
            .expect("routes mutex poisoned")
            .insert((method.to_string(), path.to_string()), scripted);
    }

    pub fn reply_json(&self, method: &str, path: &str, status: u16, body: Value) {
        self.reply(method, path, status, &body.to_string());
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.state
            .requests
            .lock()
            .expect("requests mutex poisoned")
            .iter()
            .filter(|request| request.path == path)
            .cloned()
            .collect()
    }

    /// Settings pointing the background at this mock, with short UI timings.
    pub fn settings(&self) -> ExtensionSettings {
        ExtensionSettings {
            api_base_url: self.base_url.clone(),
            cookie_domain: COOKIE_DOMAIN.to_string(),
            api_timeout: Duration::from_secs(5),
            claim_ui: ClaimUiSettings {
                poll_interval: Duration::from_millis(200),
                recheck_delay: Duration::from_millis(20),
                profiles_host: HYTALE_HOST.to_string(),
                login_url: "https://talename.test/login".to_string(),
                profiles_url: PROFILES_URL.to_string(),
            },
            detection: DetectionSettings {
                target_host: HYTALE_HOST.to_string(),
                claimed_reset_delay: Duration::from_millis(50),
            },
        }
    }
}

async fn respond(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let recorded = Recorded {
        method: method.to_string(),
        path: uri.path().to_string(),
        cookie: headers
            .get(header::COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_str(&body).ok(),
    };
    let key = (recorded.method.clone(), recorded.path.clone());
    state
        .requests
        .lock()
        .expect("requests mutex poisoned")
        .push(recorded);

    let scripted = state
        .routes
        .lock()
        .expect("routes mutex poisoned")
        .get(&key)
        .cloned();
    match scripted {
        Some(Scripted { status, body }) if body.is_empty() => status.into_response(),
        Some(Scripted { status, body }) => {
            (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "application/json")],
            r#"{"error":"no route scripted"}"#,
        )
            .into_response(),
    }
}
