//! Authentication error types.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] atelier_core::EmailError),

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// The action needs a signed-in user.
    #[error("not signed in")]
    NotSignedIn,

    /// Backend call failed for another reason.
    #[error("backend error: {0}")]
    Backend(BackendError),
}

impl From<BackendError> for AuthError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Api { code: Some(code), .. }
                if matches!(code.as_str(), "invalid_credentials" | "invalid_grant") =>
            {
                Self::InvalidCredentials
            }
            BackendError::Api { code: Some(code), .. }
                if matches!(code.as_str(), "user_already_exists" | "email_exists") =>
            {
                Self::UserAlreadyExists
            }
            BackendError::Api {
                code: Some(code),
                message,
                ..
            } if code == "weak_password" => Self::WeakPassword(message),
            BackendError::NotSignedIn => Self::NotSignedIn,
            other => Self::Backend(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(code: &str) -> BackendError {
        BackendError::Api {
            status: 400,
            code: Some(code.to_string()),
            message: "Password should contain a digit".to_string(),
        }
    }

    #[test]
    fn test_backend_codes_are_classified() {
        assert!(matches!(
            AuthError::from(api("invalid_credentials")),
            AuthError::InvalidCredentials
        ));
        assert!(matches!(
            AuthError::from(api("invalid_grant")),
            AuthError::InvalidCredentials
        ));
        assert!(matches!(
            AuthError::from(api("email_exists")),
            AuthError::UserAlreadyExists
        ));
        assert!(matches!(
            AuthError::from(api("weak_password")),
            AuthError::WeakPassword(msg) if msg.contains("digit")
        ));
    }

    #[test]
    fn test_other_backend_errors_pass_through() {
        assert!(matches!(
            AuthError::from(api("over_email_send_rate_limit")),
            AuthError::Backend(BackendError::Api { .. })
        ));
        assert!(matches!(
            AuthError::from(BackendError::RateLimited(3)),
            AuthError::Backend(BackendError::RateLimited(3))
        ));
        assert!(matches!(
            AuthError::from(BackendError::NotSignedIn),
            AuthError::NotSignedIn
        ));
    }
}
