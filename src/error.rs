use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{error, warn};

use crate::types::ErrorRes;

/// Why a signed URL could not be produced.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SignError {
    /// Host or secret is missing, empty, a placeholder, or unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The target path or the user record cannot be signed.
    #[error("validation error: {0}")]
    Validation(String),

    /// The operating system random source failed; no nonce was produced.
    #[error("randomness unavailable: {0}")]
    Randomness(String),
}

impl SignError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "ConfigurationError",
            Self::Validation(_) => "ValidationError",
            Self::Randomness(_) => "RandomnessError",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Configuration(_) | Self::Randomness(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SignError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let message = match &self {
            Self::Validation(msg) => {
                warn!(code = self.error_code(), "{msg}");
                msg.clone()
            }
            Self::Configuration(_) => {
                error!(code = self.error_code(), "{self}");
                "Invalid Configuration".to_string()
            }
            Self::Randomness(_) => {
                error!(code = self.error_code(), "{self}");
                "internal".to_string()
            }
        };
        let body = ErrorRes {
            code: self.error_code(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// Why a signed URL was rejected by [`crate::signer::verify_signed_url`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("malformed signed url: {0}")]
    Malformed(String),

    #[error("missing signed parameter: {0}")]
    MissingParameter(&'static str),

    #[error("signature does not match")]
    SignatureMismatch,
}

/// Startup configuration problems. These stop the server before it binds.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}
