//! Webhook HTTP routes

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes, HttpBody};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::peer::{PeerCertificates, PeerIdentity};
use crate::constants::{HANDLER_SUBJECT_ACCESS_REVIEWS, HANDLER_TOKEN_REVIEWS};
use crate::observability::{record_request, render_metrics, track_in_flight};
use crate::registry::ProviderRegistry;
use crate::types::{
    AccessRequest, SubjectAccessReview, SubjectAccessReviewStatus, TokenReview,
    TokenReviewStatus,
};
use crate::{Error, Result};

/// Largest review body accepted
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Clone)]
struct AppState {
    registry: Arc<ProviderRegistry>,
}

/// Build the webhook router.
///
/// Requests must carry a [`PeerCertificates`] extension; the connection
/// loop attaches it after the TLS handshake.
pub fn router(registry: Arc<ProviderRegistry>, write_timeout: Duration) -> Router {
    let webhooks = Router::new()
        .route("/tokenreviews", post(token_reviews))
        .route("/subjectaccessreviews", post(subject_access_reviews))
        .route_layer(middleware::from_fn(track_metrics));

    Router::new()
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(webhooks)
        .with_state(AppState { registry })
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            write_timeout,
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
}

async fn token_reviews(State(state): State<AppState>, request: Request) -> Response {
    match review_token(&state, request).await {
        Ok(review) => Json(review).into_response(),
        Err(e) => client_error(&e),
    }
}

async fn review_token(state: &AppState, request: Request) -> Result<TokenReview> {
    let peer = PeerIdentity::from_certificates(request.extensions().get::<PeerCertificates>())?;
    let review: TokenReview = decode_body(request).await?;

    let authenticator = state.registry.authenticator_for(&peer.org())?;

    if review.spec.token.is_empty() {
        return Err(Error::MalformedRequest("token is missing".into()));
    }

    let status = match authenticator.authenticate(&review.spec.token).await {
        Ok(identity) => {
            tracing::debug!(
                org = %peer.org(),
                username = %identity.username,
                "Token authenticated"
            );
            TokenReviewStatus::authenticated(identity.into())
        }
        Err(e) => {
            tracing::info!(org = %peer.org(), error = %e, "Token rejected");
            TokenReviewStatus::unauthenticated(e.to_string())
        }
    };

    Ok(TokenReview::response(status))
}

async fn subject_access_reviews(State(state): State<AppState>, request: Request) -> Response {
    match review_access(&state, request).await {
        Ok(review) => Json(review).into_response(),
        Err(e) => client_error(&e),
    }
}

async fn review_access(state: &AppState, request: Request) -> Result<SubjectAccessReview> {
    let peer = PeerIdentity::from_certificates(request.extensions().get::<PeerCertificates>())?;
    let review: SubjectAccessReview = decode_body(request).await?;

    let authorizer = state.registry.authorizer_for(&peer.org())?;
    let access = AccessRequest::try_from(review.spec.clone())?;

    let status = match authorizer.check(&access).await {
        Ok(decision) => SubjectAccessReviewStatus::from(decision),
        Err(e) => {
            tracing::error!(
                org = %peer.org(),
                user = %access.user,
                verb = %access.verb(),
                namespace = access.namespace().unwrap_or_default(),
                error = %e,
                "Authorization check failed"
            );
            SubjectAccessReviewStatus {
                allowed: false,
                denied: true,
                reason: e.to_string(),
                evaluation_error: String::new(),
            }
        }
    };

    Ok(SubjectAccessReview::response(review.spec, status))
}

async fn decode_body<T: DeserializeOwned>(request: Request) -> Result<T> {
    let body = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|e| Error::MalformedRequest(e.to_string()))?;
    decode(&body)
}

fn decode<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| Error::MalformedRequest(e.to_string()))
}

fn client_error(err: &Error) -> Response {
    tracing::warn!(error = %err, "Rejecting webhook request");
    (err.status_code(), err.to_string()).into_response()
}

async fn track_metrics(request: Request, next: Next) -> Response {
    let handler = if request.uri().path().starts_with("/tokenreviews") {
        HANDLER_TOKEN_REVIEWS
    } else {
        HANDLER_SUBJECT_ACCESS_REVIEWS
    };
    let method = request.method().clone();

    let _in_flight = track_in_flight(handler);
    let start = Instant::now();
    let response = next.run(request).await;

    record_request(
        handler,
        method.as_str(),
        response.status().as_u16(),
        start.elapsed(),
        response.body().size_hint().exact(),
    );
    response
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        Body::from(render_metrics()),
    )
}
