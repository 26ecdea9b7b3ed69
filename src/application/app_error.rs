use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Unknown payment provider: {0}")]
    UnknownProvider(String),

    #[error("Missing request body")]
    MissingBody,

    #[error("Webhook signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("Unknown webhook event type: {0}")]
    UnknownEventType(String),

    #[error("Payment provider not configured: {0}")]
    UnconfiguredProvider(String),

    #[error("Payment provider not supported: {0}")]
    UnsupportedProvider(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether retrying the same operation later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Queue(_)
                | AppError::Gateway(_)
                | AppError::Internal(_)
        )
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::InvalidInput(_) => ErrorCode::InvalidInput,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Conflict(_) => ErrorCode::Conflict,
            AppError::Forbidden => ErrorCode::Forbidden,
            AppError::Unauthorized => ErrorCode::Unauthorized,
            AppError::UnknownProvider(_) => ErrorCode::UnknownProvider,
            AppError::MissingBody => ErrorCode::MissingBody,
            AppError::SignatureVerification(_) => ErrorCode::InvalidSignature,
            AppError::UnknownEventType(_) => ErrorCode::UnknownEventType,
            AppError::UnconfiguredProvider(_) => ErrorCode::ProviderNotConfigured,
            AppError::UnsupportedProvider(_) => ErrorCode::ProviderNotSupported,
            AppError::Gateway(_) => ErrorCode::GatewayError,
            AppError::Queue(_) => ErrorCode::QueueError,
            AppError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    DatabaseError,
    InvalidInput,
    NotFound,
    Conflict,
    Forbidden,
    Unauthorized,
    UnknownProvider,
    MissingBody,
    InvalidSignature,
    UnknownEventType,
    ProviderNotConfigured,
    ProviderNotSupported,
    GatewayError,
    QueueError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::UnknownProvider => "UNKNOWN_PROVIDER",
            ErrorCode::MissingBody => "MISSING_BODY",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::UnknownEventType => "UNKNOWN_EVENT_TYPE",
            ErrorCode::ProviderNotConfigured => "PROVIDER_NOT_CONFIGURED",
            ErrorCode::ProviderNotSupported => "PROVIDER_NOT_SUPPORTED",
            ErrorCode::GatewayError => "GATEWAY_ERROR",
            ErrorCode::QueueError => "QUEUE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(AppError::Database("timeout".into()).is_retryable());
        assert!(AppError::Gateway("502".into()).is_retryable());
        assert!(AppError::Queue("closed".into()).is_retryable());
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        assert!(!AppError::InvalidInput("bad".into()).is_retryable());
        assert!(!AppError::SignatureVerification("mismatch".into()).is_retryable());
        assert!(!AppError::NotFound("subscription".into()).is_retryable());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            AppError::UnconfiguredProvider("coinbase".into()).code().as_str(),
            "PROVIDER_NOT_CONFIGURED"
        );
        assert_eq!(AppError::MissingBody.code().as_str(), "MISSING_BODY");
    }
}
