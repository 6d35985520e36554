pub mod fingerprint;
pub mod store;
pub mod types;

pub use fingerprint::{CaseFoldFingerprint, Fingerprinter};
pub use store::{MemoryError, MemoryStore};
pub use types::{Citation, WisdomEntry};
