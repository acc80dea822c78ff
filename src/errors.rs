use crate::api::ApiResponse;
use axum::{http::StatusCode, response::Json};
use tracing::{error, info, warn};

/// Failures of the quiz workflows, kept distinct internally so handlers can
/// map them to the right HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Failed to extract text from document {index}: {message}")]
    Extraction { index: usize, message: String },

    #[error("Completion service error: {0}")]
    Upstream(String),

    #[error("Grading response has no unique entry for question '{0}'")]
    Lookup(String),

    #[error("Persistence error: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl QuizError {
    /// Short machine-readable name used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            QuizError::NotFound(_) => "not_found",
            QuizError::Extraction { .. } => "extraction",
            QuizError::Upstream(_) => "upstream",
            QuizError::Lookup(_) => "lookup",
            QuizError::Persistence(_) => "persistence",
            QuizError::InvalidInput(_) => "invalid_input",
        }
    }
}

/// Centralized error types for consistent API error handling
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Service(#[from] QuizError),
}

/// Error context for structured logging
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub resource_id: Option<String>,
    pub resource_type: String,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            resource_id: None,
            resource_type: resource_type.to_string(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }
}

pub type ErrorResponse = (StatusCode, Json<ApiResponse<()>>);

const GENERIC_FAILURE: &str = "An internal error occurred. Please try again.";

impl ApiError {
    /// Convert API error to HTTP response with consistent structure and logging.
    /// Only not-found, bad-request and auth failures carry a specific message;
    /// everything else is reported generically and logged in full.
    pub fn to_response_with_context(self, context: ErrorContext) -> ErrorResponse {
        match self {
            ApiError::NotFound(_) | ApiError::Service(QuizError::NotFound(_)) => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Resource not found"
                );
                (
                    StatusCode::NOT_FOUND,
                    Json(ApiResponse::error(format!("{} not found", context.resource_type))),
                )
            }
            ApiError::BadRequest(_) | ApiError::Service(QuizError::InvalidInput(_)) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Bad request"
                );
                let message = match &self {
                    ApiError::Service(QuizError::InvalidInput(msg)) | ApiError::BadRequest(msg) => {
                        msg.clone()
                    }
                    _ => self.to_string(),
                };
                (StatusCode::BAD_REQUEST, Json(ApiResponse::error(message)))
            }
            ApiError::Unauthorized(_) => {
                warn!(
                    operation = %context.operation,
                    error = %self,
                    "Unauthorized request"
                );
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ApiResponse::error("Authentication required".to_string())),
                )
            }
            ApiError::Service(QuizError::Extraction { .. }) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    error = %self,
                    "Document extraction failed"
                );
                (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error(
                        "Uploaded document could not be read as a PDF".to_string(),
                    )),
                )
            }
            ApiError::Service(ref inner) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error_kind = inner.kind(),
                    error = %inner,
                    "Request failed"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error(GENERIC_FAILURE.to_string())),
                )
            }
        }
    }

    /// Simple conversion without context
    pub fn to_response(self) -> ErrorResponse {
        let context = ErrorContext::new("unknown", "resource");
        self.to_response_with_context(context)
    }
}

/// Helper macro for structured error responses
#[macro_export]
macro_rules! api_error {
    (not_found, $operation:expr, $resource_type:expr, $id:expr) => {
        $crate::errors::ApiError::NotFound(format!("{} with id '{}' not found", $resource_type, $id))
            .to_response_with_context(
                $crate::errors::ErrorContext::new($operation, $resource_type).with_id($id),
            )
    };

    (bad_request, $operation:expr, $resource_type:expr, $message:expr) => {
        $crate::errors::ApiError::BadRequest($message.to_string())
            .to_response_with_context($crate::errors::ErrorContext::new($operation, $resource_type))
    };

    (service, $operation:expr, $resource_type:expr, $id:expr, $error:expr) => {
        $crate::errors::ApiError::Service($error).to_response_with_context(
            $crate::errors::ErrorContext::new($operation, $resource_type).with_id($id),
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_creation() {
        let context = ErrorContext::new("submit_quiz", "quiz")
            .with_id("123");

        assert_eq!(context.operation, "submit_quiz");
        assert_eq!(context.resource_type, "quiz");
        assert_eq!(context.resource_id, Some("123".to_string()));
    }

    #[test]
    fn test_status_mapping() {
        let (status, _) = ApiError::Service(QuizError::NotFound("Quiz".into())).to_response();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = ApiError::BadRequest("missing grade".into()).to_response();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = ApiError::Unauthorized("no token".into()).to_response();
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = ApiError::Service(QuizError::Lookup("q2".into())).to_response();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, _) = ApiError::Service(QuizError::Upstream("timeout".into())).to_response();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let error = ApiError::Service(QuizError::Persistence(anyhow::anyhow!(
            "disk I/O error at /var/lib/secret.db"
        )));
        let (status, Json(body)) = error.to_response();

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body.error.unwrap();
        assert!(!message.contains("secret.db"));
        assert_eq!(message, GENERIC_FAILURE);
    }

    #[test]
    fn test_not_found_uses_resource_type() {
        let context = ErrorContext::new("get_quiz", "Quiz").with_id("abc");
        let (_, Json(body)) = ApiError::NotFound("Quiz abc".into()).to_response_with_context(context);
        assert_eq!(body.error.as_deref(), Some("Quiz not found"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(QuizError::Lookup("q1".into()).kind(), "lookup");
        assert_eq!(
            QuizError::Extraction { index: 0, message: "bad".into() }.kind(),
            "extraction"
        );
    }
}
