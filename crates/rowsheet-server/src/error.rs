use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rowsheet_common::{ErrorKind, RowError};
use serde_json::json;

/// A [`RowError`] on its way out as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError(pub RowError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::MissingField | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::RemoteRead | ErrorKind::RemoteWrite => match self.0.remote_status() {
                Some(_) => StatusCode::BAD_GATEWAY,
                None => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<RowError> for ApiError {
    fn from(err: RowError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self.0, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "request rejected");
        }
        (status, Json(json!({ "error": self.0.message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowsheet_common::RemoteError;

    #[test]
    fn status_mapping() {
        let status = |err: RowError| ApiError(err).status();
        assert_eq!(status(RowError::not_found("x")), StatusCode::NOT_FOUND);
        assert_eq!(status(RowError::missing_field("id")), StatusCode::BAD_REQUEST);
        assert_eq!(status(RowError::invalid("x")), StatusCode::BAD_REQUEST);
        assert_eq!(status(RowError::auth("x")), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(RowError::remote_read(RemoteError::new(403, "denied"))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(RowError::remote_write(RemoteError::transport("reset"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
