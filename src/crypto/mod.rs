pub mod integrity;
pub mod keys;

pub use integrity::{IntegrityGuard, MAC_HEADER, MAC_LENGTH};
pub use keys::AuthKey;
