pub mod nonce;
pub mod validator;

pub use nonce::{NonceRecord, NonceStore, CULL_INTERVAL, NONCE_RETENTION};
pub use validator::{RequestValidator, SecurityBlock, FRESHNESS_WINDOW, FUTURE_TOLERANCE, NONCE_LENGTH};
