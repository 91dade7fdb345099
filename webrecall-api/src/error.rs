//! Error-to-response mapping: every failure leaves the API as the standard
//! envelope with the right status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use webrecall_core::error::{Error, FetchKind};
use webrecall_core::types::now_rfc3339;

/// Wrapper turning the shared error taxonomy into HTTP responses.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation { .. } | Error::Blocked { .. } => StatusCode::BAD_REQUEST,
        Error::Auth(_) => StatusCode::UNAUTHORIZED,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        Error::Fetch { kind, .. } => match kind {
            FetchKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        },
        Error::Embed(_)
        | Error::Storage(_)
        | Error::Contention(_)
        | Error::Sync(_)
        | Error::Serialization(_)
        | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = json!({
            "success": false,
            "error": self.0.to_string(),
            "timestamp": now_rfc3339(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            status_for(&Error::validation("url", "bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Error::Auth("no".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_for(&Error::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            status_for(&Error::Fetch {
                kind: FetchKind::Timeout,
                message: String::new()
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&Error::Fetch {
                kind: FetchKind::Http,
                message: String::new()
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&Error::Storage("broken".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
