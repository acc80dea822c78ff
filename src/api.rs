use axum::{
    Router,
    extract::{
        DefaultBodyLimit, FromRef, Multipart, Path, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::{HeaderValue, Method, StatusCode, header},
    response::Json,
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::{
    api_error,
    auth::{CurrentUser, IdentityVerifier},
    errors::{ApiError, ErrorContext, ErrorResponse},
    models::*,
    quiz_service::QuizService,
};

// Import logging macros
use crate::{log_api_start, log_api_success, log_api_warn, log_validation};

#[derive(Clone)]
pub struct AppState {
    pub quiz_service: QuizService,
    pub identity: Arc<dyn IdentityVerifier>,
    pub upload_limit: usize,
}

impl FromRef<AppState> for Arc<dyn IdentityVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.identity.clone()
    }
}

/// Envelope for error bodies
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Path ids that are not UUIDs cannot name a stored entity
fn parse_id(raw: &str, operation: &str, resource_type: &str) -> Result<Uuid, ErrorResponse> {
    Uuid::parse_str(raw).map_err(|_| api_error!(not_found, operation, resource_type, raw))
}

fn multipart_failure(operation: &str, error: MultipartError) -> ErrorResponse {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        log_validation!(failure, operation, error = error);
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(ApiResponse::error("Upload exceeds the size limit".to_string())),
        );
    }
    api_error!(bad_request, operation, "upload", format!("Malformed upload: {}", error.body_text()))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn upload(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ErrorResponse> {
    log_api_start!("upload", user_id = identity.username);

    let mut multipart = multipart.map_err(|rejection| {
        api_error!(bad_request, "upload", "upload", rejection.body_text())
    })?;

    let mut grade: Option<String> = None;
    let mut distribution: Option<Distribution> = None;
    let mut notes: Vec<Vec<u8>> = Vec::new();
    let mut past_test: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_failure("upload", e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "notes" | "past_test" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_failure("upload", e))?;
                // Browsers send an empty part for an unused file input
                if bytes.is_empty() {
                    continue;
                }
                if name == "notes" {
                    notes.push(bytes.to_vec());
                } else {
                    past_test = Some(bytes.to_vec());
                }
            }
            "grade" => {
                let text = field.text().await.map_err(|e| multipart_failure("upload", e))?;
                grade = Some(text);
            }
            "question_distribution" => {
                let text = field.text().await.map_err(|e| multipart_failure("upload", e))?;
                let parsed = serde_json::from_str::<Distribution>(&text).map_err(|e| {
                    api_error!(
                        bad_request,
                        "upload",
                        "upload",
                        format!("Invalid question_distribution: {}", e)
                    )
                })?;
                distribution = Some(parsed);
            }
            other => {
                log_api_warn!("upload", format!("ignoring unexpected field '{}'", other));
            }
        }
    }

    let grade = match grade.map(|g| g.trim().to_string()) {
        Some(grade) if !grade.is_empty() => grade,
        _ => return Err(api_error!(bad_request, "upload", "upload", "grade is required")),
    };
    if notes.is_empty() {
        return Err(api_error!(
            bad_request,
            "upload",
            "upload",
            "at least one notes file is required"
        ));
    }
    log_validation!(success, "upload", "upload form accepted");

    let request = GenerateQuizRequest {
        grade,
        notes,
        past_test,
        distribution: distribution.unwrap_or_default(),
    };

    match state
        .quiz_service
        .generate_quiz(&identity.username, request)
        .await
    {
        Ok(quiz_id) => {
            log_api_success!("upload", quiz_id = quiz_id, "quiz generated");
            Ok(Json(UploadResponse { quiz_id }))
        }
        Err(e) => Err(ApiError::Service(e)
            .to_response_with_context(ErrorContext::new("upload", "Quiz"))),
    }
}

pub async fn get_quiz(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Quiz>, ErrorResponse> {
    let id = parse_id(&raw_id, "get_quiz", "Quiz")?;
    log_api_start!("get_quiz", quiz_id = id);

    match state.quiz_service.get_quiz(id).await {
        Ok(quiz) => {
            log_api_success!("get_quiz", quiz_id = id, "quiz retrieved successfully");
            Ok(Json(quiz))
        }
        Err(e) => Err(api_error!(service, "get_quiz", "Quiz", &raw_id, e)),
    }
}

pub async fn list_quizzes(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> Result<Json<Vec<Quiz>>, ErrorResponse> {
    log_api_start!("list_quizzes", user_id = identity.username);

    match state.quiz_service.list_quizzes(&identity.username).await {
        Ok(quizzes) => {
            log_api_success!("list_quizzes", count = quizzes.len(), "quizzes listed");
            Ok(Json(quizzes))
        }
        Err(e) => Err(ApiError::Service(e)
            .to_response_with_context(ErrorContext::new("list_quizzes", "Quiz"))),
    }
}

pub async fn submit_quiz(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(raw_id): Path<String>,
    answers: Result<Json<HashMap<String, String>>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ErrorResponse> {
    let id = parse_id(&raw_id, "submit_quiz", "Quiz")?;
    log_api_start!("submit_quiz", quiz_id = id);

    let Json(answers) = answers.map_err(|rejection| {
        api_error!(bad_request, "submit_quiz", "Quiz", rejection.body_text())
    })?;

    match state
        .quiz_service
        .grade_submission(id, &identity.username, answers)
        .await
    {
        Ok(result_id) => {
            log_api_success!("submit_quiz", result_id = result_id, "submission graded");
            Ok(Json(SubmitResponse { result_id }))
        }
        Err(e) => Err(api_error!(service, "submit_quiz", "Quiz", &raw_id, e)),
    }
}

pub async fn get_result(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(raw_id): Path<String>,
) -> Result<Json<QuizResultDetail>, ErrorResponse> {
    let id = parse_id(&raw_id, "get_result", "Result")?;
    log_api_start!("get_result", result_id = id);

    match state.quiz_service.get_result(id, &identity.username).await {
        Ok(detail) => {
            log_api_success!("get_result", result_id = id, "result retrieved successfully");
            Ok(Json(detail))
        }
        Err(e) => Err(api_error!(service, "get_result", "Result", &raw_id, e)),
    }
}

pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.upload_limit;

    Router::new()
        .route("/api/health", get(health))
        // Quiz routes
        .route("/api/upload", post(upload))
        .route("/api/quiz/:id", get(get_quiz))
        .route("/api/quizzes", get(list_quizzes))
        .route("/api/quiz/:id/submit", post(submit_quiz))
        // Result routes
        .route("/api/result/:id", get(get_result))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the presentation tier's origin, allowing credentials
pub fn cors_layer(allowed_origin: HeaderValue) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(allowed_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}
