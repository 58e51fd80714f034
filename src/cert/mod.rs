pub mod authority;
pub mod csr;
pub mod metadata;
pub mod params;
pub mod parser;
pub mod serial;

pub use authority::{
    initialize_authority, AuthorityIdentity, AuthorityOptions, CertificateAuthority,
    IssuedCertificate,
};
pub use csr::{CertificateRequest, CsrValidator};
pub use metadata::{RecordColumn, SignedCertificateRecord};
pub use params::IssuanceParams;
pub use parser::{CertificateParser, CertificateSummary};
pub use serial::{SerialAllocator, SerialNumber};
