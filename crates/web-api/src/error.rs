use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::{DomainError, RepositoryError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        match error {
            ApplicationError::Domain(DomainError::InvalidArgument { field, reason }) => {
                ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "INVALID_ARGUMENT",
                    format!("{field}: {reason}"),
                )
            }
            ApplicationError::Domain(DomainError::SelfConversation) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "SELF_CONVERSATION",
                "cannot start a conversation with yourself",
            ),
            ApplicationError::Domain(DomainError::UserNotFound) => {
                ApiError::new(StatusCode::NOT_FOUND, "USER_NOT_FOUND", "user not found")
            }
            ApplicationError::Domain(DomainError::ConversationNotFound) => ApiError::new(
                StatusCode::NOT_FOUND,
                "CONVERSATION_NOT_FOUND",
                DomainError::ConversationNotFound.to_string(),
            ),
            ApplicationError::Domain(DomainError::ThreadNotFound) => {
                ApiError::new(StatusCode::NOT_FOUND, "THREAD_NOT_FOUND", "thread not found")
            }
            ApplicationError::Repository(RepositoryError::NotFound) => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "requested resource not found",
            ),
            ApplicationError::Repository(RepositoryError::Conflict(message)) => {
                ApiError::new(StatusCode::CONFLICT, "CONFLICT", message)
            }
            ApplicationError::Repository(RepositoryError::Storage { message }) => {
                tracing::error!(error = %message, "存储层错误");
                ApiError::internal_server_error("database error")
            }
            ApplicationError::Authentication => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "AUTHENTICATION_FAILED",
                "authentication failed",
            ),
            err @ ApplicationError::ShortIdExhausted { .. } => {
                tracing::error!(error = %err, "短ID分配失败");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SHORT_ID_EXHAUSTED",
                    "could not allocate a post id, please retry",
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_application_errors_to_status_codes() {
        let cases = [
            (
                ApplicationError::from(DomainError::invalid_argument("board", "Board is required")),
                StatusCode::BAD_REQUEST,
            ),
            (ApplicationError::from(DomainError::SelfConversation), StatusCode::BAD_REQUEST),
            (ApplicationError::from(DomainError::UserNotFound), StatusCode::NOT_FOUND),
            (ApplicationError::from(DomainError::ThreadNotFound), StatusCode::NOT_FOUND),
            (
                ApplicationError::from(DomainError::ConversationNotFound),
                StatusCode::NOT_FOUND,
            ),
            (ApplicationError::Authentication, StatusCode::UNAUTHORIZED),
            (
                ApplicationError::from(RepositoryError::conflict("taken")),
                StatusCode::CONFLICT,
            ),
            (
                ApplicationError::ShortIdExhausted { attempts: 3 },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status(), expected);
        }
    }

    #[test]
    fn storage_details_are_not_exposed() {
        let error = ApiError::from(ApplicationError::from(RepositoryError::storage(
            "password authentication failed for user postgres",
        )));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.body.message, "database error");
    }
}
