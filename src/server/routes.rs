use crate::crypto::MAC_HEADER;
use crate::server::service::{MacedResponse, SigningService};
use crate::utils::errors::{ErrorKind, IssuanceError, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub const CA_CONTENT_TYPE: &str = "application/x-x509-ca-cert";
pub const USER_CERT_CONTENT_TYPE: &str = "application/x-x509-user-cert";

/// `GET /ca` and `POST /sign` bound to one shared service
pub fn router(service: Arc<SigningService>) -> Router {
    Router::new()
        .route("/ca", get(get_ca))
        .route("/sign", post(sign))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serve until the process is stopped
pub async fn serve(service: Arc<SigningService>, listen: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(service)).await?;
    Ok(())
}

async fn get_ca(State(service): State<Arc<SigningService>>) -> Response {
    certificate_response(service.ca_certificate(), CA_CONTENT_TYPE)
}

async fn sign(
    State(service): State<Arc<SigningService>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mac = headers.get(MAC_HEADER).and_then(|v| v.to_str().ok());

    match service.sign(&body, mac).await {
        Ok(response) => certificate_response(response, USER_CERT_CONTENT_TYPE),
        Err(e) => error_response(&e),
    }
}

fn certificate_response(response: MacedResponse, content_type: &'static str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    match HeaderValue::from_str(&response.mac) {
        Ok(mac) => {
            headers.insert(MAC_HEADER, mac);
        }
        Err(e) => {
            tracing::error!("unable to encode {MAC_HEADER} header: {e}");
            return error_response(&IssuanceError::Internal(e.to_string()));
        }
    }
    (StatusCode::OK, headers, response.body).into_response()
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Integrity | ErrorKind::Replay => StatusCode::UNAUTHORIZED,
        ErrorKind::Validation | ErrorKind::Csr => StatusCode::BAD_REQUEST,
        ErrorKind::Persistence | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: &IssuanceError) -> Response {
    let status = status_for(error.kind());
    if status.is_server_error() {
        tracing::error!("sign request failed: {error}");
    } else {
        tracing::info!("sign request rejected ({}): {error}", status.as_u16());
    }
    (status, error.public_message()).into_response()
}
