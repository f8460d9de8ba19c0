//! `keyward-auth` — password verification, stateless sessions and cross-service trust.
//!
//! Decoupled from HTTP and from any concrete storage: the credential store is a trait,
//! time is always passed in.

pub mod assertion;
pub mod claims;
pub mod credentials;
pub mod error;
pub mod password;
pub mod principal;
pub mod revalidation;
pub mod roles;
pub mod seal;
pub mod session;

pub use assertion::{AssertionError, AssertionVerifier, ServiceAssertion, ServiceAssertionSigner};
pub use claims::{AssertionClaims, TokenValidationError, validate_claims};
pub use credentials::{Credential, CredentialStore, CredentialStoreError, SharedSecret};
pub use error::AuthError;
pub use principal::{Identity, normalize_email};
pub use revalidation::{RevalidationOutcome, Revalidator, RevocationCache};
pub use roles::Role;
pub use seal::{SealError, SessionSealer};
pub use session::{ProfileUpdate, Session, SessionIssuer};
