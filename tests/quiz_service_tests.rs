mod common;

use std::collections::HashMap;

use common::{generation_response, grading_response, pdf_with_text, test_service};
use quiz_generator::{
    Database, Distribution, GenerateQuizRequest, LLMService, MockProvider, QuizError, QuizService,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use uuid::Uuid;

fn upload_request(notes: &str, past_test: Option<&str>) -> GenerateQuizRequest {
    GenerateQuizRequest {
        grade: "Grade 7".to_string(),
        notes: vec![pdf_with_text(notes)],
        past_test: past_test.map(pdf_with_text),
        distribution: Distribution::default(),
    }
}

fn answers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(id, answer)| (id.to_string(), answer.to_string()))
        .collect()
}

#[tokio::test]
async fn test_generate_quiz_persists_questions() {
    let mock = MockProvider::with_responses([generation_response(3)]);
    let (service, _) = test_service(&mock).await;

    let quiz_id = service
        .generate_quiz("u1", upload_request("Volcanoes", None))
        .await
        .unwrap();

    let quiz = service.get_quiz(quiz_id).await.unwrap();
    assert_eq!(quiz.grade, "Grade 7");
    assert_eq!(quiz.user_id.as_deref(), Some("u1"));
    assert_eq!(quiz.distribution, Distribution::default());
    let ids: Vec<_> = quiz.questions.iter().map(|q| q.id.as_str()).collect();
    assert_eq!(ids, vec!["q1", "q2", "q3"]);
    assert!(quiz.notes_text.contains("Volcanoes"));
    assert!(quiz.past_test_text.is_none());

    let calls = mock.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].prompt.contains("Grade 7"));
    assert!(calls[0].prompt.contains("Volcanoes"));
    assert!(calls[0].prompt.contains("- Multiple Choice: 5"));
    assert!(!calls[0].prompt.contains("Use this past test as reference"));
}

#[tokio::test]
async fn test_past_test_is_used_as_reference() {
    let mock = MockProvider::with_responses([generation_response(1)]);
    let (service, _) = test_service(&mock).await;

    let quiz_id = service
        .generate_quiz("u1", upload_request("Rivers", Some("Erosion")))
        .await
        .unwrap();

    let prompt = &mock.calls()[0].prompt;
    assert!(prompt.contains("Use this past test as reference for question style:"));
    assert!(prompt.contains("Erosion"));

    let quiz = service.get_quiz(quiz_id).await.unwrap();
    assert!(quiz.past_test_text.unwrap().contains("Erosion"));
}

#[tokio::test]
async fn test_unreadable_notes_skip_completion() {
    let mock = MockProvider::with_responses([generation_response(1)]);
    let (service, _) = test_service(&mock).await;

    let mut request = upload_request("ignored", None);
    request.notes = vec![b"not a pdf at all".to_vec()];

    let result = service.generate_quiz("u1", request).await;
    assert!(matches!(result, Err(QuizError::Extraction { index: 0, .. })));
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_generation_failure_persists_nothing() {
    let mock = MockProvider::new();
    mock.push_failure("upstream timeout");
    let (service, _) = test_service(&mock).await;

    let result = service.generate_quiz("u1", upload_request("Atoms", None)).await;
    assert!(matches!(result, Err(QuizError::Upstream(_))));
    assert!(service.list_quizzes("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_single_question_grading() {
    let mock = MockProvider::with_responses([
        generation_response(1),
        grading_response(&[("q1", true)]),
    ]);
    let (service, _) = test_service(&mock).await;
    let quiz_id = service
        .generate_quiz("u1", upload_request("Gravity", None))
        .await
        .unwrap();

    let result_id = service
        .grade_submission(quiz_id, "u1", answers(&[("q1", "Answer 1")]))
        .await
        .unwrap();

    let detail = service.get_result(result_id, "u1").await.unwrap();
    assert_eq!(detail.result.score, 1);
    assert_eq!(detail.result.total_questions, 1);
    assert_eq!(detail.answers.len(), 1);
    assert!(detail.answers[0].detail.is_correct);
    assert_eq!(detail.answers[0].detail.user_answer, "Answer 1");
    assert_eq!(detail.quiz.id, quiz_id);
    assert_eq!(
        detail.answers[0].question.as_ref().map(|q| q.id.as_str()),
        Some("q1")
    );

    let grading_prompt = &mock.calls()[1].prompt;
    assert!(grading_prompt.contains("\"userAnswer\": \"Answer 1\""));
}

#[tokio::test]
async fn test_skipped_questions_are_graded_with_empty_answer() {
    let mock = MockProvider::with_responses([
        generation_response(2),
        grading_response(&[("q1", true), ("q2", false)]),
    ]);
    let (service, _) = test_service(&mock).await;
    let quiz_id = service
        .generate_quiz("u1", upload_request("Magnets", None))
        .await
        .unwrap();

    let result_id = service
        .grade_submission(quiz_id, "u1", answers(&[("q1", "Answer 1")]))
        .await
        .unwrap();

    let detail = service.get_result(result_id, "u1").await.unwrap();
    assert_eq!(detail.result.score, 1);
    assert_eq!(detail.result.total_questions, 2);
    assert_eq!(detail.answers[1].detail.user_answer, "");
    assert!(mock.calls()[1].prompt.contains("\"userAnswer\": \"\""));
}

#[tokio::test]
async fn test_missing_graded_id_persists_nothing() {
    let path = std::env::temp_dir().join(format!("quiz-generator-{}.db", Uuid::new_v4()));
    let url = format!("sqlite:{}", path.display());

    let mock = MockProvider::with_responses([
        generation_response(2),
        grading_response(&[("q1", true)]),
    ]);
    let db = Database::new(&url).await.unwrap();
    let service = QuizService::new(db, LLMService::from_provider(Arc::new(mock.clone())));

    let quiz_id = service
        .generate_quiz("u1", upload_request("Tides", None))
        .await
        .unwrap();

    let result = service
        .grade_submission(quiz_id, "u1", answers(&[("q1", "x"), ("q2", "y")]))
        .await;
    match result {
        Err(QuizError::Lookup(id)) => assert_eq!(id, "q2"),
        other => panic!("expected lookup error, got {:?}", other),
    }

    let pool = SqlitePoolOptions::new().connect(&url).await.unwrap();
    let results: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quiz_results")
        .fetch_one(&pool)
        .await
        .unwrap();
    let details: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM answer_details")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(results, 0);
    assert_eq!(details, 0);

    pool.close().await;
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_submit_for_missing_quiz_skips_completion() {
    let mock = MockProvider::with_responses([grading_response(&[("q1", true)])]);
    let (service, _) = test_service(&mock).await;

    let result = service
        .grade_submission(Uuid::new_v4(), "u1", answers(&[("q1", "x")]))
        .await;

    assert!(matches!(result, Err(QuizError::NotFound(_))));
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_results_are_private_to_their_owner() {
    let mock = MockProvider::with_responses([
        generation_response(1),
        grading_response(&[("q1", false)]),
    ]);
    let (service, _) = test_service(&mock).await;
    let quiz_id = service
        .generate_quiz("u1", upload_request("Weather", None))
        .await
        .unwrap();
    let result_id = service
        .grade_submission(quiz_id, "u1", answers(&[("q1", "no idea")]))
        .await
        .unwrap();

    assert!(matches!(
        service.get_result(result_id, "u2").await,
        Err(QuizError::NotFound(_))
    ));
    assert!(service.get_result(result_id, "u1").await.is_ok());
}

#[tokio::test]
async fn test_list_quizzes_only_returns_callers_quizzes() {
    let mock = MockProvider::with_responses([
        generation_response(1),
        generation_response(1),
        generation_response(1),
    ]);
    let (service, _) = test_service(&mock).await;

    let older = service.generate_quiz("u1", upload_request("One", None)).await.unwrap();
    service.generate_quiz("u2", upload_request("Two", None)).await.unwrap();
    let newer = service.generate_quiz("u1", upload_request("Three", None)).await.unwrap();

    let ids: Vec<Uuid> = service
        .list_quizzes("u1")
        .await
        .unwrap()
        .iter()
        .map(|q| q.id)
        .collect();
    assert_eq!(ids, vec![newer, older]);
}
