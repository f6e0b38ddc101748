use thiserror::Error;

use crate::auth::validate::MIN_PASSWORD_LEN;

pub type ApiResult<T> = Result<T, ApiError>;

/// PostgreSQL `unique_violation`, passed through by the REST layer.
pub const UNIQUE_VIOLATION: &str = "23505";

const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

/// Failure of a single remote call.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("remote error ({status}): {message}")]
    Remote {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    /// An operation that needs a signed-in user ran without one. The UI
    /// should never have offered the action.
    #[error("no authenticated user")]
    NotAuthenticated,

    #[error("invalid input: {0}")]
    Invalid(String),
}

impl ApiError {
    /// Uniqueness conflict, e.g. joining a community twice.
    pub fn is_conflict(&self) -> bool {
        match self {
            ApiError::Remote { status, code, .. } => {
                *status == 409 || code.as_deref() == Some(UNIQUE_VIOLATION)
            }
            _ => false,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }

    pub fn is_programming_error(&self) -> bool {
        matches!(self, ApiError::NotAuthenticated)
    }

    /// Text suitable for an inline error message.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Remote { message, .. } => message.clone(),
            ApiError::NotFound(what) => format!("{what} not found"),
            ApiError::NotAuthenticated => "You need to be signed in to do that.".to_owned(),
            ApiError::Invalid(reason) => reason.clone(),
            ApiError::Network(_) | ApiError::Serde(_) => GENERIC_FAILURE.to_owned(),
        }
    }
}

/// Why a sign-up, sign-in or password operation did not go through.
///
/// The display text is what the form shows inline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("Please enter a valid email address")]
    InvalidEmail,

    #[error("Password must be at least {min} characters")]
    WeakPassword { min: usize },

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("An account with this email already exists")]
    DuplicateAccount,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Please confirm your email address before signing in")]
    EmailNotConfirmed,

    #[error("{0}")]
    Rejected(String),

    #[error("Could not reach the server. Please check your connection and try again.")]
    Network,

    #[error("Something went wrong. Please try again.")]
    Unexpected(String),
}

impl AuthFailure {
    /// Caught on the client before anything was sent.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AuthFailure::InvalidEmail | AuthFailure::WeakPassword { .. } | AuthFailure::PasswordMismatch
        )
    }

    fn from_remote(code: Option<&str>, message: &str) -> Self {
        let lowered = message.to_lowercase();
        match code {
            Some("email_not_confirmed") => AuthFailure::EmailNotConfirmed,
            Some("user_already_exists" | "email_exists") => AuthFailure::DuplicateAccount,
            Some("weak_password") => AuthFailure::WeakPassword { min: MIN_PASSWORD_LEN },
            Some("email_address_invalid") => AuthFailure::InvalidEmail,
            Some("invalid_credentials") => AuthFailure::InvalidCredentials,
            _ if lowered.contains("email not confirmed") => AuthFailure::EmailNotConfirmed,
            _ if lowered.contains("already registered") => AuthFailure::DuplicateAccount,
            _ if lowered.contains("invalid login credentials") => AuthFailure::InvalidCredentials,
            _ if lowered.contains("unable to validate email") => AuthFailure::InvalidEmail,
            _ if lowered.contains("password should be") => AuthFailure::WeakPassword { min: MIN_PASSWORD_LEN },
            _ => AuthFailure::Rejected(message.to_owned()),
        }
    }
}

impl From<ApiError> for AuthFailure {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Remote { code, message, .. } => AuthFailure::from_remote(code.as_deref(), &message),
            ApiError::Network(_) => AuthFailure::Network,
            other => AuthFailure::Unexpected(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}
