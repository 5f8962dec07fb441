use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use luna_common::Error;
use serde_json::json;
use tracing::error;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// An error response: a status and a human-readable message, sent as
/// `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

/// Marker attached to 500 responses so production deployments can replace
/// the detail with a generic message.
#[derive(Debug, Clone, Copy)]
pub struct InternalError;

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        Error::Forbidden(_) => StatusCode::FORBIDDEN,
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::Billing(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = status_for(&err);
        let message = match &err {
            Error::NotFound(what) => format!("{what} not found"),
            Error::Unauthorized(why) => why.clone(),
            Error::Conflict(why) => why.clone(),
            _ => err.to_string(),
        };
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let internal = self.status.is_server_error() && self.status != StatusCode::SERVICE_UNAVAILABLE;
        if internal {
            error!("request failed with {}: {}", self.status, self.message);
        }

        let mut response = (self.status, Json(json!({ "error": self.message }))).into_response();
        if internal {
            response.extensions_mut().insert(InternalError);
        }
        response
    }
}

/// Replace the body of internal errors with a generic message.
pub async fn mask_internal_errors(response: Response) -> Response {
    if response.extensions().get::<InternalError>().is_none() {
        return response;
    }
    let status = response.status();
    (status, Json(json!({ "error": "Internal server error" }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::ApiError;
    use axum::http::StatusCode;
    use luna_common::Error;

    #[test]
    fn domain_errors_map_to_statuses() {
        let cases = [
            (Error::NotFound("companion c1".into()), StatusCode::NOT_FOUND),
            (Error::Unauthorized("bad token".into()), StatusCode::UNAUTHORIZED),
            (Error::Forbidden("upgrade".into()), StatusCode::FORBIDDEN),
            (Error::Validation("name is required".into()), StatusCode::BAD_REQUEST),
            (Error::Conflict("taken".into()), StatusCode::CONFLICT),
            (Error::Billing("stripe down".into()), StatusCode::BAD_GATEWAY),
            (Error::Database("disk full".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (Error::Provider("timeout".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn messages_stay_human_readable() {
        assert_eq!(
            ApiError::from(Error::NotFound("companion c1".into())).message,
            "companion c1 not found"
        );
        assert_eq!(
            ApiError::from(Error::Forbidden("Upgrade to premium.".into())).message,
            "Upgrade to premium."
        );
    }
}
