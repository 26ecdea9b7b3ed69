use crate::app_error::{AppError, ErrorCode};
use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the error before it gets converted into a status response.
        tracing::error!(error = ?self, "Request failed");

        let code = self.code();
        match self {
            AppError::UnknownProvider(provider) => error_resp(
                StatusCode::NOT_FOUND,
                code,
                Some(format!("unknown payment provider '{provider}'")),
            ),
            AppError::NotFound(what) => {
                error_resp(StatusCode::NOT_FOUND, code, Some(format!("{what} not found")))
            }
            AppError::MissingBody => error_resp(StatusCode::BAD_REQUEST, code, None),
            AppError::InvalidInput(msg) => error_resp(StatusCode::BAD_REQUEST, code, Some(msg)),
            AppError::SignatureVerification(msg) => {
                error_resp(StatusCode::BAD_REQUEST, code, Some(msg))
            }
            AppError::UnknownEventType(raw) => error_resp(StatusCode::BAD_REQUEST, code, Some(raw)),
            AppError::UnconfiguredProvider(provider) | AppError::UnsupportedProvider(provider) => {
                error_resp(StatusCode::BAD_REQUEST, code, Some(provider))
            }
            AppError::Conflict(msg) => error_resp(StatusCode::CONFLICT, code, Some(msg)),
            AppError::Forbidden => error_resp(StatusCode::FORBIDDEN, code, None),
            AppError::Unauthorized => error_resp(StatusCode::UNAUTHORIZED, code, None),
            AppError::Gateway(_) => error_resp(StatusCode::BAD_GATEWAY, code, None),
            AppError::Database(_) | AppError::Queue(_) | AppError::Internal(_) => {
                error_resp(StatusCode::INTERNAL_SERVER_ERROR, code, None)
            }
        }
    }
}

fn error_resp(status: StatusCode, code: ErrorCode, message: Option<String>) -> Response {
    let body = match message {
        Some(msg) => serde_json::json!({ "code": code.as_str(), "message": msg }),
        None => serde_json::json!({ "code": code.as_str() }),
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn internal_details_are_not_leaked() {
        let (status, body) = render(AppError::Database("password=hunter2".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, serde_json::json!({ "code": "DATABASE_ERROR" }));
    }

    #[tokio::test]
    async fn webhook_gate_statuses() {
        let (status, body) = render(AppError::UnknownProvider("paypal".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "UNKNOWN_PROVIDER");

        let (status, _) = render(AppError::MissingBody).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = render(AppError::SignatureVerification("mismatch".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_SIGNATURE");
    }

    #[tokio::test]
    async fn gateway_failures_are_bad_gateway() {
        let (status, body) = render(AppError::Gateway("stripe 503".into())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.get("message").is_none());
    }
}
