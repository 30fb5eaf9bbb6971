use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    /// The local key store is missing, unreadable, or holds a corrupt key.
    #[error("encryption key unavailable: {0}")]
    KeyUnavailable(String),

    /// AEAD verification failed: tampered envelope or a different key.
    #[error("envelope authentication failed")]
    AuthenticationFailure,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Record id is absent or owned by someone else. The two are deliberately
    /// indistinguishable.
    #[error("record not found")]
    NotFound,

    #[error("network failure: {0}")]
    Network(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VaultError {
    /// Only transport failures are worth retrying; everything else is either
    /// fatal or a definitive answer from the server.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::Network(_))
    }

    /// Errors that condemn a single record rather than the whole operation.
    pub fn is_record_local(&self) -> bool {
        matches!(
            self,
            VaultError::AuthenticationFailure | VaultError::MalformedEnvelope(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_is_retryable() {
        assert!(VaultError::Network("timeout".into()).is_retryable());
        assert!(!VaultError::NotFound.is_retryable());
        assert!(!VaultError::KeyUnavailable("gone".into()).is_retryable());
        assert!(!VaultError::Server {
            status: 500,
            message: "Server error".into()
        }
        .is_retryable());
    }

    #[test]
    fn cipher_errors_are_record_local() {
        assert!(VaultError::AuthenticationFailure.is_record_local());
        assert!(VaultError::MalformedEnvelope("bad base64".into()).is_record_local());
        assert!(!VaultError::Network("reset".into()).is_record_local());
    }
}
