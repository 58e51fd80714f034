pub mod auth;
pub mod cert;
pub mod cli;
pub mod client;
pub mod crypto;
pub mod server;
pub mod storage;
pub mod utils;

// Re-export specific items to avoid conflicts
pub use cert::{CertificateAuthority, CertificateParser, IssuanceParams, SignedCertificateRecord};
pub use client::ZcertClient;
pub use crypto::{AuthKey, IntegrityGuard};
pub use server::SigningService;
pub use utils::{config, errors, paths};
