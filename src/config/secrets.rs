//! Secret handling.
//!
//! Re-exports the secrecy types used for the reporting credentials.

pub use secrecy::{ExposeSecret, SecretString};
