//! In-process fakes for the services the crate talks to.

use crate::antispam::akismet::{ClassifyError, ContentClassifier};
use crate::antispam::turnstile::{CaptchaVerifier, VerifyError};
use crate::mailer::transport::{DeliveryError, MailTransport};
use crate::mailer::RenderedMessage;
use crate::submission::{RoleValues, Submission};
use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Form, Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Cloudflare's documented dummy secret that always passes.
pub const PASS_SECRET: &str = "1x0000000000000000000000000000000AA";
/// Cloudflare's documented dummy secret that always fails.
pub const FAIL_SECRET: &str = "2x0000000000000000000000000000000AA";
pub const DUMMY_TOKEN: &str = "XXXX.DUMMY.TOKEN.XXXX";
pub const INVALID_AKISMET_KEY: &str = "invalid-key";

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Emulates the Turnstile site-verify endpoint using Cloudflare's dummy-key rules.
pub async fn fake_turnstile() -> String {
    let router = Router::new()
        .route("/siteverify", post(siteverify))
        .route(
            "/silent",
            post(|| async { Json(json!({ "success": false, "error-codes": [] })) }),
        )
        .route(
            "/broken",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded") }),
        )
        .route("/garbled", post(|| async { "<html>not json</html>" }))
        .route(
            "/slow",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({ "success": true }))
            }),
        );
    spawn(router).await
}

async fn siteverify(Json(request): Json<Value>) -> Json<Value> {
    let secret = request["secret"].as_str().unwrap_or_default();
    let token = request["response"].as_str().unwrap_or_default();

    let mut codes = Vec::new();
    if secret.is_empty() {
        codes.push("missing-input-secret");
    } else if secret != PASS_SECRET && secret != FAIL_SECRET {
        codes.push("invalid-input-secret");
    }
    if token.is_empty() {
        if !secret.is_empty() {
            codes.push("missing-input-response");
        }
    } else if secret == FAIL_SECRET {
        codes.push("invalid-input-response");
    }

    Json(json!({
        "success": codes.is_empty(),
        "error-codes": codes,
        "challenge_ts": "2024-01-01T00:00:00.000Z",
        "hostname": "example.com",
        "action": "",
        "cdata": "",
    }))
}

/// Emulates Akismet `comment-check`, including its guaranteed-spam author.
pub async fn fake_akismet() -> String {
    let router = Router::new()
        .route("/1.1/comment-check", post(comment_check))
        .route(
            "/down",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
        );
    spawn(router).await
}

async fn comment_check(Form(params): Form<HashMap<String, String>>) -> axum::response::Response {
    if params.get("api_key").map(String::as_str) == Some(INVALID_AKISMET_KEY) {
        return (
            [("X-akismet-debug-help", "We were unable to verify your api key.")],
            "invalid",
        )
            .into_response();
    }
    let spam = params.get("comment_author").map(String::as_str) == Some("akismet-guaranteed-spam");
    let verdict = if spam { "true" } else { "false" };
    verdict.into_response()
}

/// Counts calls and answers with a fixed outcome.
pub struct StubVerifier {
    pub calls: AtomicUsize,
    outcome: fn() -> Result<(), VerifyError>,
}

impl StubVerifier {
    pub fn new(outcome: fn() -> Result<(), VerifyError>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            outcome,
        }
    }
}

#[async_trait]
impl CaptchaVerifier for StubVerifier {
    async fn verify(&self, _secret: &str, _token: &str) -> Result<(), VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.outcome)()
    }
}

pub struct StubClassifier {
    pub calls: AtomicUsize,
    outcome: fn() -> Result<bool, ClassifyError>,
}

impl StubClassifier {
    pub fn new(outcome: fn() -> Result<bool, ClassifyError>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            outcome,
        }
    }
}

#[async_trait]
impl ContentClassifier for StubClassifier {
    async fn is_spam(
        &self,
        _submission: &Submission,
        _fields: &RoleValues<'_>,
    ) -> Result<bool, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.outcome)()
    }
}

/// Keeps every message it is asked to send; optionally refuses them all.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<RenderedMessage>>,
    pub refuse: bool,
}

impl RecordingTransport {
    pub fn refusing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            refuse: true,
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, message: RenderedMessage) -> Result<(), DeliveryError> {
        if self.refuse {
            return Err(DeliveryError::Smtp("554 transaction failed".to_string()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}
