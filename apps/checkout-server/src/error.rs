// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::config::OfferCopy;
use crate::submission::SubmissionError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    /// Map a submission failure to a response carrying the visitor-facing
    /// copy for it.
    pub fn from_submission(err: SubmissionError, copy: &OfferCopy) -> Self {
        match err {
            SubmissionError::Validation(message) => Self::bad_request(message),
            SubmissionError::AlreadyPending(_) => {
                Self::conflict(copy.already_pending_message.clone())
            }
            SubmissionError::Initiate(_) => Self::bad_gateway(copy.initiate_error_message.clone()),
            SubmissionError::MissingCheckoutId => {
                Self::bad_gateway(copy.missing_checkout_id_message.clone())
            }
            SubmissionError::ShuttingDown => Self::unavailable("service is shutting down"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayError;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);

        let conflict = ApiError::conflict("busy");
        assert_eq!(conflict.status, StatusCode::CONFLICT);

        let upstream = ApiError::bad_gateway("down");
        assert_eq!(upstream.status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn submission_errors_map_to_status_and_copy() {
        let copy = OfferCopy::default();

        let err = ApiError::from_submission(
            SubmissionError::Validation("name is required".to_string()),
            &copy,
        );
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "name is required");

        let err = ApiError::from_submission(
            SubmissionError::AlreadyPending("254712345678".to_string()),
            &copy,
        );
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.message, copy.already_pending_message);

        let err = ApiError::from_submission(
            SubmissionError::Initiate(GatewayError::Request("refused".to_string())),
            &copy,
        );
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.message, copy.initiate_error_message);

        let err = ApiError::from_submission(SubmissionError::MissingCheckoutId, &copy);
        assert_eq!(err.message, copy.missing_checkout_id_message);

        let err = ApiError::from_submission(SubmissionError::ShuttingDown, &copy);
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }
}
