mod common;

use axum::http::{HeaderValue, StatusCode, header};
use axum_test::TestServer;
use axum_test::multipart::{MultipartForm, Part};
use common::{bearer, generation_response, grading_response, pdf_with_text, test_server, test_state};
use quiz_generator::MockProvider;
use quiz_generator::api::{cors_layer, create_router};
use serde_json::{Value, json};
use uuid::Uuid;

fn upload_form(grade: &str) -> MultipartForm {
    MultipartForm::new()
        .add_text("grade", grade)
        .add_text(
            "question_distribution",
            r#"{"multipleChoice":0,"knowledge":2,"thinking":0,"application":0,"communication":0}"#,
        )
        .add_part(
            "notes",
            Part::bytes(pdf_with_text("Plate tectonics"))
                .file_name("notes.pdf")
                .mime_type("application/pdf"),
        )
}

async fn upload_quiz(server: &axum_test::TestServer, user: &str) -> String {
    let (name, value) = bearer(user);
    let response = server
        .post("/api/upload")
        .add_header(name, value)
        .multipart(upload_form("Grade 8"))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    body["quiz_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let server = test_server(&MockProvider::new()).await;

    let response = server.get("/api/health").await;
    response.assert_status_ok();
    response.assert_json(&json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_upload_and_fetch_quiz() {
    let mock = MockProvider::with_responses([generation_response(2)]);
    let server = test_server(&mock).await;

    let quiz_id = upload_quiz(&server, "alice").await;
    assert!(Uuid::parse_str(&quiz_id).is_ok());

    // Quizzes can be read without a token
    let response = server.get(&format!("/api/quiz/{}", quiz_id)).await;
    response.assert_status_ok();
    let quiz: Value = response.json();
    assert_eq!(quiz["id"], quiz_id);
    assert_eq!(quiz["grade"], "Grade 8");
    assert_eq!(quiz["user_id"], "alice");
    assert_eq!(quiz["distribution"]["knowledge"], 2);
    assert_eq!(quiz["questions"][0]["id"], "q1");
    assert_eq!(quiz["questions"][0]["type"], "knowledge");
}

#[tokio::test]
async fn test_upload_requires_token() {
    let mock = MockProvider::with_responses([generation_response(1)]);
    let server = test_server(&mock).await;

    let response = server.post("/api/upload").multipart(upload_form("5")).await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_upload_rejects_bad_distribution() {
    let server = test_server(&MockProvider::new()).await;
    let (name, value) = bearer("alice");

    let form = MultipartForm::new()
        .add_text("grade", "5")
        .add_text("question_distribution", "not json")
        .add_part("notes", Part::bytes(pdf_with_text("Cells")).file_name("n.pdf"));

    let response = server
        .post("/api/upload")
        .add_header(name, value)
        .multipart(form)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_requires_notes() {
    let server = test_server(&MockProvider::new()).await;
    let (name, value) = bearer("alice");

    let form = MultipartForm::new().add_text("grade", "5");
    let response = server
        .post("/api/upload")
        .add_header(name, value)
        .multipart(form)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_with_unreadable_pdf_is_bad_request() {
    let mock = MockProvider::with_responses([generation_response(1)]);
    let server = test_server(&mock).await;
    let (name, value) = bearer("alice");

    let form = MultipartForm::new()
        .add_text("grade", "5")
        .add_part("notes", Part::bytes(b"garbage".to_vec()).file_name("n.pdf"));
    let response = server
        .post("/api/upload")
        .add_header(name, value)
        .multipart(form)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_generation_failure_is_generic_500() {
    let mock = MockProvider::new();
    mock.push_failure("api key sk-secret rejected");
    let server = test_server(&mock).await;
    let (name, value) = bearer("alice");

    let response = server
        .post("/api/upload")
        .add_header(name, value)
        .multipart(upload_form("5"))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert!(!body["error"].as_str().unwrap().contains("sk-secret"));
}

#[tokio::test]
async fn test_unknown_and_malformed_quiz_ids_are_not_found() {
    let server = test_server(&MockProvider::new()).await;

    server
        .get(&format!("/api/quiz/{}", Uuid::new_v4()))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .get("/api/quiz/not-a-uuid")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_and_view_result() {
    let mock = MockProvider::with_responses([
        generation_response(2),
        grading_response(&[("q1", true), ("q2", false)]),
    ]);
    let server = test_server(&mock).await;
    let quiz_id = upload_quiz(&server, "alice").await;

    let (name, value) = bearer("alice");
    let response = server
        .post(&format!("/api/quiz/{}/submit", quiz_id))
        .add_header(name, value)
        .json(&json!({ "q1": "Answer 1", "q2": "wrong" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let result_id = body["result_id"].as_str().unwrap().to_string();

    let (name, value) = bearer("alice");
    let response = server
        .get(&format!("/api/result/{}", result_id))
        .add_header(name, value)
        .await;
    response.assert_status_ok();
    let result: Value = response.json();
    assert_eq!(result["id"], result_id);
    assert_eq!(result["score"], 1);
    assert_eq!(result["total_questions"], 2);
    assert_eq!(result["quiz"]["id"], quiz_id);
    assert_eq!(result["answers"][0]["question_id"], "q1");
    assert_eq!(result["answers"][0]["is_correct"], true);
    assert_eq!(result["answers"][1]["question"]["text"], "Question number 2");

    // Someone else cannot see it
    let (name, value) = bearer("mallory");
    server
        .get(&format!("/api/result/{}", result_id))
        .add_header(name, value)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_to_missing_quiz() {
    let mock = MockProvider::with_responses([grading_response(&[("q1", true)])]);
    let server = test_server(&mock).await;
    let (name, value) = bearer("alice");

    let response = server
        .post(&format!("/api/quiz/{}/submit", Uuid::new_v4()))
        .add_header(name, value)
        .json(&json!({ "q1": "x" }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_submit_requires_token() {
    let server = test_server(&MockProvider::new()).await;

    server
        .post(&format!("/api/quiz/{}/submit", Uuid::new_v4()))
        .json(&json!({}))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_incomplete_grading_is_server_error() {
    let mock = MockProvider::with_responses([
        generation_response(2),
        grading_response(&[("q1", true)]),
    ]);
    let server = test_server(&mock).await;
    let quiz_id = upload_quiz(&server, "alice").await;

    let (name, value) = bearer("alice");
    server
        .post(&format!("/api/quiz/{}/submit", quiz_id))
        .add_header(name, value)
        .json(&json!({ "q1": "a", "q2": "b" }))
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_list_quizzes_for_caller() {
    let mock = MockProvider::with_responses([
        generation_response(1),
        generation_response(1),
    ]);
    let server = test_server(&mock).await;
    let mine = upload_quiz(&server, "alice").await;
    upload_quiz(&server, "bob").await;

    let (name, value) = bearer("alice");
    let response = server.get("/api/quizzes").add_header(name, value).await;
    response.assert_status_ok();
    let quizzes: Value = response.json();
    let quizzes = quizzes.as_array().unwrap();
    assert_eq!(quizzes.len(), 1);
    assert_eq!(quizzes[0]["id"], mine);

    server
        .get("/api/quizzes")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_token_is_rejected() {
    let server = test_server(&MockProvider::new()).await;

    server
        .get("/api/quizzes")
        .add_header(
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderValue::from_static("Bearer not.a.jwt"),
        )
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let mock = MockProvider::new();
    let mut state = test_state(&mock).await;
    state.upload_limit = 1024;
    let server = TestServer::new(create_router(state)).unwrap();

    let (name, value) = bearer("alice");
    let form = MultipartForm::new().add_text("grade", "Grade 8").add_part(
        "notes",
        Part::bytes(vec![b'x'; 4096])
            .file_name("notes.pdf")
            .mime_type("application/pdf"),
    );
    let response = server.post("/api/upload").add_header(name, value).multipart(form).await;

    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Upload exceeds the size limit");
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_cors_allows_configured_origin() {
    let origin = HeaderValue::from_static("http://localhost:3000");
    let app = create_router(test_state(&MockProvider::new()).await).layer(cors_layer(origin.clone()));
    let server = TestServer::new(app).unwrap();

    let response = server
        .get("/api/health")
        .add_header(header::ORIGIN, origin.clone())
        .await;
    response.assert_status_ok();
    let headers = response.headers();
    assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN), Some(&origin));
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS),
        Some(&HeaderValue::from_static("true"))
    );

    let foreign = server
        .get("/api/health")
        .add_header(header::ORIGIN, HeaderValue::from_static("http://evil.example"))
        .await;
    assert!(foreign.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}
