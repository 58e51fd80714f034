pub mod routes;
pub mod service;

pub use routes::{router, serve, status_for, CA_CONTENT_TYPE, USER_CERT_CONTENT_TYPE};
pub use service::{MacedResponse, SigningRequest, SigningService, DEFAULT_REQUEST_TIMEOUT};
