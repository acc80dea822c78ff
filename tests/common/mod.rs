#![allow(dead_code)]

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, header};
use axum_test::TestServer;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use quiz_generator::{
    Database, JwtVerifier, LLMService, MockProvider, QuizService,
    api::{AppState, create_router},
    auth::sign_token,
};
use serde_json::json;

pub const SECRET: &str = "integration-test-secret";

/// Build a PDF with one page per entry, each page showing its text in Courier
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(page_id.into());
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Count" => kids.len() as i64,
        "Kids" => kids,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

pub fn pdf_with_text(text: &str) -> Vec<u8> {
    pdf_with_pages(&[text])
}

pub fn token_for(username: &str) -> String {
    sign_token(username, SECRET, 3600).unwrap()
}

pub fn bearer(username: &str) -> (HeaderName, HeaderValue) {
    (
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token_for(username))).unwrap(),
    )
}

/// A generation reply with `count` knowledge questions
pub fn generation_response(count: usize) -> String {
    let questions: Vec<_> = (1..=count)
        .map(|n| {
            json!({
                "text": format!("Question number {}", n),
                "type": "knowledge",
                "options": null,
                "answer": format!("Answer {}", n),
            })
        })
        .collect();
    json!({ "questions": questions }).to_string()
}

/// A grading reply marking each listed id correct or not
pub fn grading_response(entries: &[(&str, bool)]) -> String {
    let graded: Vec<_> = entries
        .iter()
        .map(|(id, correct)| {
            json!({
                "id": id,
                "isCorrect": correct,
                "explanation": format!("Explanation for {}", id),
            })
        })
        .collect();
    serde_json::to_string(&graded).unwrap()
}

pub async fn test_db() -> Database {
    Database::new("sqlite::memory:").await.unwrap()
}

pub async fn test_service(mock: &MockProvider) -> (QuizService, Database) {
    let db = test_db().await;
    let llm = LLMService::from_provider(Arc::new(mock.clone()));
    (QuizService::new(db.clone(), llm), db)
}

pub async fn test_state(mock: &MockProvider) -> AppState {
    let (quiz_service, _) = test_service(mock).await;
    AppState {
        quiz_service,
        identity: Arc::new(JwtVerifier::new(SECRET)),
        upload_limit: 25 * 1024 * 1024,
    }
}

pub async fn test_server(mock: &MockProvider) -> TestServer {
    TestServer::new(create_router(test_state(mock).await)).unwrap()
}
