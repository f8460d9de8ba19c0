//! `CredentialStore` adapters.
//!
//! - `InMemoryCredentialStore`: dev/tests; also owns registration and password changes.
//! - `HttpCredentialStore`: JSON client for the hosted credential backend.

pub mod http;
pub mod in_memory;

pub use http::HttpCredentialStore;
pub use in_memory::{AccountError, InMemoryCredentialStore};
