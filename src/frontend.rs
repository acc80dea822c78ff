//! Presentation tier: a thin HTML front end that forwards every user action
//! to the quiz API, passing along the caller's bearer token.
//!
//! The token is taken from the incoming `Authorization` header or a `token`
//! cookie. Pages are plain server-rendered HTML with all dynamic text escaped.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{
        DefaultBodyLimit, FromRequestParts, Multipart, Path, State, multipart::MultipartRejection,
        rejection::JsonRejection,
    },
    http::{StatusCode, header, request::Parts},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::bearer_token;
use crate::models::{Distribution, Quiz, QuizResultDetail, SubmitResponse, UploadResponse};

const BACKEND_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error)]
pub enum FrontendError {
    #[error("authentication required")]
    Unauthorized,

    #[error("backend responded with status {0}")]
    Backend(StatusCode),

    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid form submission: {0}")]
    InvalidForm(String),

    #[error("no page for id '{0}'")]
    NotFound(String),
}

/// A document picked in the upload form
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Everything the upload form collects
#[derive(Debug, Clone)]
pub struct UploadForm {
    pub grade: String,
    pub distribution: Distribution,
    pub notes: Vec<UploadFile>,
    pub past_test: Option<UploadFile>,
}

/// HTTP client for the quiz API
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Result<Self, FrontendError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::builder().timeout(BACKEND_TIMEOUT).build()?,
        })
    }

    fn request(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.base_url, endpoint));
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, FrontendError> {
        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(FrontendError::Unauthorized);
        }
        if !status.is_success() {
            debug!(status = %status, "Backend request was not successful");
            return Err(FrontendError::Backend(status));
        }

        Ok(response.json::<T>().await?)
    }

    pub async fn upload(&self, token: Option<&str>, form: UploadForm) -> Result<Uuid, FrontendError> {
        let distribution = serde_json::to_string(&form.distribution)
            .map_err(|e| FrontendError::InvalidForm(e.to_string()))?;

        let mut multipart = Form::new()
            .text("grade", form.grade)
            .text("question_distribution", distribution);

        for file in form.notes {
            multipart = multipart.part("notes", pdf_part(file)?);
        }
        if let Some(file) = form.past_test {
            multipart = multipart.part("past_test", pdf_part(file)?);
        }

        let builder = self
            .request(reqwest::Method::POST, "/api/upload", token)
            .multipart(multipart);
        let response: UploadResponse = self.send(builder).await?;
        Ok(response.quiz_id)
    }

    pub async fn get_quiz(&self, token: Option<&str>, quiz_id: Uuid) -> Result<Quiz, FrontendError> {
        let builder = self.request(reqwest::Method::GET, &format!("/api/quiz/{}", quiz_id), token);
        self.send(builder).await
    }

    pub async fn list_quizzes(&self, token: Option<&str>) -> Result<Vec<Quiz>, FrontendError> {
        let builder = self.request(reqwest::Method::GET, "/api/quizzes", token);
        self.send(builder).await
    }

    pub async fn submit_answers(
        &self,
        token: Option<&str>,
        quiz_id: Uuid,
        answers: &HashMap<String, String>,
    ) -> Result<Uuid, FrontendError> {
        let builder = self
            .request(
                reqwest::Method::POST,
                &format!("/api/quiz/{}/submit", quiz_id),
                token,
            )
            .json(answers);
        let response: SubmitResponse = self.send(builder).await?;
        Ok(response.result_id)
    }

    pub async fn get_result(
        &self,
        token: Option<&str>,
        result_id: Uuid,
    ) -> Result<QuizResultDetail, FrontendError> {
        let builder = self.request(
            reqwest::Method::GET,
            &format!("/api/result/{}", result_id),
            token,
        );
        self.send(builder).await
    }
}

fn pdf_part(file: UploadFile) -> Result<Part, FrontendError> {
    Ok(Part::bytes(file.bytes)
        .file_name(file.file_name)
        .mime_str("application/pdf")?)
}

#[derive(Clone)]
pub struct FrontendState {
    pub client: BackendClient,
    pub upload_limit: usize,
}

/// The caller's bearer token, if one was supplied
#[derive(Debug, Clone, Default)]
pub struct CallerToken(pub Option<String>);

impl CallerToken {
    fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

const TOKEN_COOKIE: &str = "token";

fn token_from_jar(jar: &CookieJar) -> Option<String> {
    jar.get(TOKEN_COOKIE)
        .map(|cookie| cookie.value_trimmed().to_string())
        .filter(|value| !value.is_empty())
}

/// Ids are parsed before they reach a backend URL
fn parse_id(raw: &str) -> Result<Uuid, FrontendError> {
    Uuid::parse_str(raw).map_err(|_| FrontendError::NotFound(raw.to_string()))
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerToken
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let from_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .map(str::to_string);

        let token = from_header.or_else(|| token_from_jar(&CookieJar::from_headers(&parts.headers)));

        Ok(CallerToken(token))
    }
}

impl IntoResponse for FrontendError {
    fn into_response(self) -> Response {
        let status = match &self {
            FrontendError::Unauthorized => StatusCode::UNAUTHORIZED,
            FrontendError::NotFound(_) => StatusCode::NOT_FOUND,
            FrontendError::Backend(status) if *status == StatusCode::NOT_FOUND => StatusCode::NOT_FOUND,
            FrontendError::InvalidForm(_) => StatusCode::BAD_REQUEST,
            FrontendError::Backend(_) | FrontendError::Transport(_) => StatusCode::BAD_GATEWAY,
        };
        warn!(status = %status, error = %self, "Front end request failed");

        let message = match &self {
            FrontendError::Unauthorized => "Please sign in to continue.".to_string(),
            FrontendError::NotFound(_) => "That page could not be found.".to_string(),
            FrontendError::Backend(StatusCode::NOT_FOUND) => "That page could not be found.".to_string(),
            FrontendError::InvalidForm(detail) => format!("The form could not be read: {}", detail),
            _ => "Something went wrong. Please try again.".to_string(),
        };

        (status, Html(render::error_page(&message))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index() -> Html<String> {
    Html(render::index_page())
}

fn parse_count(value: &str, default: u32) -> u32 {
    value.trim().parse().unwrap_or(default)
}

async fn upload(
    State(state): State<FrontendState>,
    token: CallerToken,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Redirect, FrontendError> {
    let mut multipart = multipart.map_err(|e| FrontendError::InvalidForm(e.body_text()))?;

    let defaults = Distribution::default();
    let mut distribution = defaults;
    let mut grade = String::new();
    let mut notes = Vec::new();
    let mut past_test = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| FrontendError::InvalidForm(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().unwrap_or("upload.pdf").to_string();

        if name == "notes" || name == "past_test" {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| FrontendError::InvalidForm(e.body_text()))?;
            if bytes.is_empty() {
                continue;
            }
            let file = UploadFile { file_name, bytes: bytes.to_vec() };
            if name == "notes" {
                notes.push(file);
            } else {
                past_test = Some(file);
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| FrontendError::InvalidForm(e.body_text()))?;
        match name.as_str() {
            "grade" => grade = value,
            "multipleChoice" => distribution.multiple_choice = parse_count(&value, defaults.multiple_choice),
            "knowledge" => distribution.knowledge = parse_count(&value, defaults.knowledge),
            "thinking" => distribution.thinking = parse_count(&value, defaults.thinking),
            "application" => distribution.application = parse_count(&value, defaults.application),
            "communication" => distribution.communication = parse_count(&value, defaults.communication),
            _ => {}
        }
    }

    let form = UploadForm {
        grade,
        distribution,
        notes,
        past_test,
    };
    let quiz_id = state.client.upload(token.as_deref(), form).await?;
    Ok(Redirect::to(&format!("/quiz/{}", quiz_id)))
}

async fn past_materials(
    State(state): State<FrontendState>,
    token: CallerToken,
) -> Result<Html<String>, FrontendError> {
    let quizzes = state.client.list_quizzes(token.as_deref()).await?;
    Ok(Html(render::past_materials_page(&quizzes)))
}

async fn take_quiz(
    State(state): State<FrontendState>,
    token: CallerToken,
    Path(quiz_id): Path<String>,
) -> Result<Html<String>, FrontendError> {
    let quiz_id = parse_id(&quiz_id)?;
    let quiz = state.client.get_quiz(token.as_deref(), quiz_id).await?;
    Ok(Html(render::quiz_page(&quiz)))
}

async fn submit_quiz(
    State(state): State<FrontendState>,
    token: CallerToken,
    Path(quiz_id): Path<String>,
    answers: Result<Json<HashMap<String, String>>, JsonRejection>,
) -> Response {
    let failed = || {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Failed to submit quiz" })),
        )
            .into_response()
    };

    let Ok(Json(answers)) = answers else {
        return failed();
    };
    let Ok(quiz_id) = parse_id(&quiz_id) else {
        return failed();
    };

    match state
        .client
        .submit_answers(token.as_deref(), quiz_id, &answers)
        .await
    {
        Ok(result_id) => Redirect::to(&format!("/result/{}", result_id)).into_response(),
        Err(FrontendError::Transport(e)) => {
            warn!(error = %e, "Quiz submission could not reach the backend");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
        Err(e) => {
            debug!(error = %e, "Quiz submission rejected");
            failed()
        }
    }
}

async fn view_result(
    State(state): State<FrontendState>,
    token: CallerToken,
    Path(result_id): Path<String>,
) -> Result<Html<String>, FrontendError> {
    let result_id = parse_id(&result_id)?;
    let result = state.client.get_result(token.as_deref(), result_id).await?;
    Ok(Html(render::result_page(&result)))
}

pub fn create_frontend_router(state: FrontendState) -> Router {
    let upload_limit = state.upload_limit;

    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload))
        .route("/past-materials", get(past_materials))
        .route("/quiz/:id", get(take_quiz))
        .route("/quiz/:id/submit", post(submit_quiz))
        .route("/result/:id", get(view_result))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

mod render {
    use ammonia::clean_text;

    use crate::models::{Distribution, Quiz, QuizResultDetail};

    fn layout(title: &str, body: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
</head>
<body>
<nav><a href="/">New quiz</a> | <a href="/past-materials">Past materials</a></nav>
<main>
{body}
</main>
</body>
</html>"#,
            title = clean_text(title),
        )
    }

    pub fn error_page(message: &str) -> String {
        layout("Error", &format!(r#"<p class="error">{}</p>"#, clean_text(message)))
    }

    pub fn index_page() -> String {
        let defaults = Distribution::default();
        let counts = [
            ("multipleChoice", "Multiple Choice", defaults.multiple_choice),
            ("knowledge", "Knowledge", defaults.knowledge),
            ("thinking", "Thinking", defaults.thinking),
            ("application", "Application", defaults.application),
            ("communication", "Communication", defaults.communication),
        ]
        .iter()
        .map(|(name, label, value)| {
            format!(
                r#"<label>{label} <input type="number" min="0" name="{name}" value="{value}"></label>"#
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

        layout(
            "Generate a quiz",
            &format!(
                r#"<h1>Generate a practice quiz</h1>
<form method="post" action="/upload" enctype="multipart/form-data">
<label>Notes (PDF) <input type="file" name="notes" accept="application/pdf" multiple required></label>
<label>Past test (optional PDF) <input type="file" name="past_test" accept="application/pdf"></label>
<label>Grade <input type="text" name="grade" required></label>
<fieldset>
<legend>Question distribution</legend>
{counts}
</fieldset>
<button type="submit">Generate</button>
</form>"#
            ),
        )
    }

    pub fn past_materials_page(quizzes: &[Quiz]) -> String {
        if quizzes.is_empty() {
            return layout(
                "Past materials",
                "<h1>Past materials</h1>\n<p>You have not generated any quizzes yet.</p>",
            );
        }

        let items = quizzes
            .iter()
            .map(|quiz| {
                format!(
                    r#"<li><a href="/quiz/{id}">Grade {grade}</a> ({count} questions, {created})</li>"#,
                    id = quiz.id,
                    grade = clean_text(&quiz.grade),
                    count = quiz.questions.len(),
                    created = quiz.created_at.format("%Y-%m-%d %H:%M UTC"),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        layout("Past materials", &format!("<h1>Past materials</h1>\n<ul>\n{items}\n</ul>"))
    }

    pub fn quiz_page(quiz: &Quiz) -> String {
        let questions = quiz
            .questions
            .iter()
            .enumerate()
            .map(|(index, question)| {
                let input = match &question.options {
                    Some(options) => options
                        .iter()
                        .map(|option| {
                            let option = clean_text(option);
                            format!(
                                r#"<label><input type="radio" name="{id}" value="{option}"> {option}</label>"#,
                                id = clean_text(&question.id),
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n"),
                    None => format!(
                        r#"<textarea name="{}" rows="3"></textarea>"#,
                        clean_text(&question.id)
                    ),
                };
                format!(
                    "<section class=\"question\">\n<h3>{number}. {text}</h3>\n<p class=\"category\">{category}</p>\n{input}\n</section>",
                    number = index + 1,
                    text = clean_text(&question.text),
                    category = question.question_type.label(),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let script = format!(
            r#"<script>
document.getElementById('quiz-form').addEventListener('submit', function (event) {{
  event.preventDefault();
  var answers = {{}};
  new FormData(event.target).forEach(function (value, key) {{ answers[key] = value; }});
  fetch('/quiz/{id}/submit', {{
    method: 'POST',
    headers: {{ 'Content-Type': 'application/json' }},
    body: JSON.stringify(answers)
  }}).then(function (response) {{
    if (response.redirected) {{ window.location = response.url; }}
    else {{ alert('Failed to submit quiz'); }}
  }});
}});
</script>"#,
            id = quiz.id,
        );

        layout(
            "Quiz",
            &format!(
                "<h1>Grade {grade} quiz</h1>\n<form id=\"quiz-form\">\n{questions}\n<button type=\"submit\">Submit answers</button>\n</form>\n{script}",
                grade = clean_text(&quiz.grade),
            ),
        )
    }

    pub fn result_page(detail: &QuizResultDetail) -> String {
        let answers = detail
            .answers
            .iter()
            .map(|answer| {
                let question_text = answer
                    .question
                    .as_ref()
                    .map(|question| clean_text(&question.text))
                    .unwrap_or_else(|| clean_text(&answer.detail.question_id));
                let expected = answer
                    .question
                    .as_ref()
                    .map(|question| format!("<p>Expected: {}</p>", clean_text(&question.answer)))
                    .unwrap_or_default();
                format!(
                    "<section class=\"{class}\">\n<h3>{question_text}</h3>\n<p>Your answer: {user_answer}</p>\n{expected}\n<p>{explanation}</p>\n</section>",
                    class = if answer.detail.is_correct { "correct" } else { "incorrect" },
                    user_answer = clean_text(&answer.detail.user_answer),
                    explanation = clean_text(&answer.detail.explanation),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        layout(
            "Result",
            &format!(
                "<h1>Score: {score} / {total}</h1>\n<p>Grade {grade}</p>\n{answers}",
                score = detail.result.score,
                total = detail.result.total_questions,
                grade = clean_text(&detail.quiz.grade),
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jar(cookie_header: &'static str) -> CookieJar {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(header::COOKIE, axum::http::HeaderValue::from_static(cookie_header));
        CookieJar::from_headers(&headers)
    }

    #[test]
    fn test_token_from_cookie_jar() {
        assert_eq!(
            token_from_jar(&jar("theme=dark; token=abc.def; lang=en")),
            Some("abc.def".to_string())
        );
        assert_eq!(token_from_jar(&jar("theme=dark")), None);
        assert_eq!(token_from_jar(&jar("token=")), None);
    }

    #[test]
    fn test_quoted_token_cookie_is_unwrapped() {
        assert_eq!(
            token_from_jar(&jar("token=\"abc.def\"")),
            Some("abc.def".to_string())
        );
    }

    #[test]
    fn test_parse_id_rejects_paths() {
        assert!(matches!(parse_id("../quizzes"), Err(FrontendError::NotFound(_))));
        assert!(parse_id(&Uuid::new_v4().to_string()).is_ok());
    }

    #[test]
    fn test_parse_count_falls_back_to_default() {
        assert_eq!(parse_count("7", 5), 7);
        assert_eq!(parse_count("", 5), 5);
        assert_eq!(parse_count("-1", 3), 3);
    }

    #[test]
    fn test_dynamic_text_is_escaped() {
        let page = render::error_page("<script>alert(1)</script>");
        assert!(!page.contains("<script>alert(1)</script>"));
        assert!(page.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_index_page_has_default_counts() {
        let page = render::index_page();
        assert!(page.contains(r#"name="multipleChoice" value="5""#));
        assert!(page.contains(r#"name="communication" value="2""#));
    }
}
