//! mail-scan: IMAP retrieval and normalization of recent messages.

pub mod config;
pub mod error;
pub mod links;
pub mod normalize;
pub mod scanner;
pub mod session;
pub mod types;

pub use config::{EnvelopeErrorPolicy, ImapConfig, ScanConfig, SubjectFilter};
pub use error::{Error, Result};
pub use scanner::{run, scan};
pub use types::NormalizedEmail;
