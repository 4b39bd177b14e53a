// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{compiler::ValidationError, querier::QuerierError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Querier(#[from] QuerierError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Config(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_data"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Querier(QuerierError::Compile(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "compile_error")
            }
            Self::Querier(_) => (StatusCode::BAD_GATEWAY, "querier_error"),
            Self::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        let body = ErrorResponse {
            status: "error",
            error_type,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    status: &'a str,
    #[serde(rename = "errorType")]
    error_type: &'a str,
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_errors_are_unprocessable() {
        let err = AppError::from(QuerierError::Compile("unknown tag `foo`".into()));
        assert_eq!(
            err.status_and_type(),
            (StatusCode::UNPROCESSABLE_ENTITY, "compile_error")
        );
        assert_eq!(err.to_string(), "sql compiler rejected payload: unknown tag `foo`");
    }

    #[test]
    fn validation_errors_are_bad_requests() {
        let err = AppError::from(ValidationError::MissingWhereOperand);
        assert_eq!(err.status_and_type().0, StatusCode::BAD_REQUEST);
        assert_eq!(err.status_and_type().1, "validation");
    }

    #[test]
    fn transport_errors_map_to_bad_gateway() {
        let err = AppError::from(QuerierError::Status {
            status: 500,
            body: "boom".into(),
        });
        assert_eq!(err.status_and_type().0, StatusCode::BAD_GATEWAY);
    }
}
