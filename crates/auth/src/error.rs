use thiserror::Error;

use crate::credentials::CredentialStoreError;

/// Authentication-layer error taxonomy.
///
/// `InvalidCredentials` and `Unauthorized` are terminal and user-visible.
/// `Configuration` and `TransientStore` degrade gracefully and are operator-visible only.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown e-mail or wrong password; deliberately indistinguishable.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// A shared secret was missing or wrong at a trust boundary.
    #[error("unauthorized")]
    Unauthorized,

    /// Missing or malformed key material / settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The credential store could not be reached.
    #[error("credential store unavailable: {0}")]
    TransientStore(String),
}

impl From<CredentialStoreError> for AuthError {
    fn from(value: CredentialStoreError) -> Self {
        match value {
            CredentialStoreError::Unauthorized => AuthError::Unauthorized,
            CredentialStoreError::Unavailable(msg) => AuthError::TransientStore(msg),
        }
    }
}
