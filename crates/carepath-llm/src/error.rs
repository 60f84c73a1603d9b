use carepath_config::BackendKind;
use carepath_core::HttpError;
use http::StatusCode;
use thiserror::Error;

/// Errors raised while talking to an inference backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// Backend could not be reached or timed out
    #[error("backend '{backend}' unavailable: {message}")]
    Unavailable { backend: String, message: String },

    /// Backend answered with a non-success status
    #[error("backend '{backend}' returned {status}: {body}")]
    Upstream { backend: String, status: u16, body: String },

    /// Backend answered with a body we could not interpret
    #[error("malformed backend response: {0}")]
    Malformed(String),

    /// Error while reading a streamed response
    #[error("streaming error: {0}")]
    Streaming(String),

    /// No backend is configured for the requested slot
    #[error("backend '{0}' is not configured")]
    NotConfigured(BackendKind),

    /// Client sent a malformed or invalid request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl BackendError {
    pub(crate) fn unavailable(backend: &str, error: &reqwest::Error) -> Self {
        Self::Unavailable {
            backend: backend.to_owned(),
            message: error.to_string(),
        }
    }

    /// Whether the backend itself could not be reached
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl HttpError for BackendError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unavailable { .. } | Self::Upstream { .. } | Self::Malformed(_) => StatusCode::BAD_GATEWAY,
            Self::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Streaming(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Unavailable { .. } => "backend_unavailable",
            Self::Upstream { .. } => "upstream_error",
            Self::Malformed(_) => "malformed_response",
            Self::Streaming(_) => "streaming_error",
            Self::NotConfigured(_) => "backend_not_configured",
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::Internal(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "an internal error occurred".to_owned(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_backend_maps_to_bad_gateway() {
        let err = BackendError::Unavailable {
            backend: "local".to_owned(),
            message: "connection refused".to_owned(),
        };

        assert!(err.is_unavailable());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.error_type(), "backend_unavailable");
    }

    #[test]
    fn internal_details_are_hidden() {
        let err = BackendError::Internal(anyhow::anyhow!("pool poisoned"));

        assert_eq!(err.client_message(), "an internal error occurred");
        assert!(err.to_string().contains("pool poisoned"));
    }

    #[test]
    fn missing_backend_is_service_unavailable() {
        let err = BackendError::NotConfigured(BackendKind::Local);

        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.client_message(), "backend 'local' is not configured");
    }
}
