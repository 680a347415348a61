use crate::config::Config;
use crate::handler::{FormError, FormHandler};
use crate::submission::{RawSubmission, RequestMeta};
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower_http::catch_panic::CatchPanicLayer;

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<FormHandler>,
}

pub fn router(handler: Arc<FormHandler>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/:form_id", post(submit))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn(access_log))
        .with_state(AppState { handler })
}

async fn submit(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Unknown forms are reported before the body is looked at
    if state.handler.registry().get(&form_id).is_none() {
        return FormError::UnknownForm(form_id).into_response();
    }
    if !is_form_encoded(&headers) {
        return (StatusCode::UNSUPPORTED_MEDIA_TYPE, "Expected a form-encoded body").into_response();
    }

    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(&body).into_owned().collect();
    let raw = RawSubmission {
        form_id,
        pairs,
        meta: request_meta(&headers, connect_info.map(|ConnectInfo(addr)| addr)),
    };

    match state.handler.handle(raw).await {
        Ok(accepted) => match accepted.redirect {
            Some(target) => Redirect::to(&target).into_response(),
            None => (StatusCode::OK, "OK").into_response(),
        },
        Err(e) => e.into_response(),
    }
}

fn is_form_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| {
            mime.trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
}

impl IntoResponse for FormError {
    fn into_response(self) -> Response {
        match self {
            FormError::UnknownForm(id) => {
                log::info!("Submission for unknown form '{id}'");
                (StatusCode::NOT_FOUND, "Not Found").into_response()
            }
            FormError::Spam(_) => (StatusCode::BAD_REQUEST, "Spam detected").into_response(),
            FormError::Compose(e) => {
                log::error!("Could not compose message: {e}");
                internal_error()
            }
            FormError::Delivery(e) => {
                log::error!("Could not deliver message: {e}");
                internal_error()
            }
        }
    }
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    log::error!("Request handler panicked: {detail}");
    internal_error()
}

/// Client IP is the first `X-Forwarded-For` hop when a proxy supplied one.
pub fn request_meta(headers: &HeaderMap, peer: Option<SocketAddr>) -> RequestMeta {
    let header_str = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    let client_ip = match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => String::new(),
    };

    RequestMeta {
        client_ip,
        user_agent: header_str(header::USER_AGENT),
        referrer: header_str(header::REFERER),
    }
}

async fn access_log(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = request_meta(request.headers(), peer).client_ip;

    let response = next.run(request).await;

    log::info!(
        target: "formgate::access",
        "{} {} {} {}ms {}",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis(),
        if client.is_empty() { "-" } else { client.as_str() }
    );
    response
}

/// Serve until `shutdown` resolves, then let in-flight requests finish.
pub async fn run<F>(listener: TcpListener, handler: Arc<FormHandler>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(handler).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let handler = Arc::new(FormHandler::from_config(config)?);
    // A form without any usable template is a deployment mistake
    for id in handler.registry().ids() {
        handler.composer().template_for(id)?;
    }

    let bind_addr = format!("{}:{}", config.global.host, config.global.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    let stop = Arc::new(Notify::new());
    let signal = stop.clone();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, finishing in-flight requests...");
        signal.notify_one();
    })?;

    log::info!(
        "Listening on {bind_addr} with {} form(s): {}",
        handler.registry().len(),
        handler.registry().ids().join(", ")
    );
    run(listener, handler, async move { stop.notified().await }).await?;
    log::info!("Server stopped");
    Ok(())
}
