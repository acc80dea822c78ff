use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

use crate::database::Database;
use crate::errors::QuizError;
use crate::llm_service::LLMService;
use crate::models::*;
use crate::pdf_extractor;

// Import logging macros
use crate::{log_service_error, log_service_start, log_service_success, log_service_warn};

const SERVICE: &str = "quiz_service";

/// Upload and submit workflows: extraction, completion calls and storage.
#[derive(Clone)]
pub struct QuizService {
    db: Database,
    llm: LLMService,
}

impl QuizService {
    pub fn new(db: Database, llm: LLMService) -> Self {
        Self { db, llm }
    }

    /// Turn uploaded study material into a stored quiz and return its id.
    pub async fn generate_quiz(
        &self,
        user_id: &str,
        request: GenerateQuizRequest,
    ) -> Result<Uuid, QuizError> {
        let started = Instant::now();
        log_service_start!(SERVICE, "generate_quiz", document_count = request.notes.len());

        let grade = request.grade.trim().to_string();
        if grade.is_empty() {
            return Err(QuizError::InvalidInput("grade is required".to_string()));
        }
        if request.notes.is_empty() {
            return Err(QuizError::InvalidInput(
                "at least one notes file is required".to_string(),
            ));
        }

        let notes_text = pdf_extractor::extract_text(request.notes).await?;
        let past_test_text = match request.past_test {
            Some(document) => Some(pdf_extractor::extract_text(vec![document]).await?),
            None => None,
        };

        let questions = self
            .llm
            .generate_questions(
                &grade,
                &notes_text,
                past_test_text.as_deref(),
                &request.distribution,
            )
            .await
            .inspect_err(|e| {
                log_service_error!(SERVICE, "generate_quiz", error = e);
            })?;

        let quiz = self
            .db
            .create_quiz(NewQuiz {
                grade,
                questions,
                distribution: request.distribution,
                notes_text,
                past_test_text,
                user_id: Some(user_id.to_string()),
            })
            .await
            .map_err(QuizError::Persistence)?;

        log_service_success!(
            SERVICE,
            "generate_quiz",
            quiz_id = quiz.id,
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(quiz.id)
    }

    pub async fn get_quiz(&self, id: Uuid) -> Result<Quiz, QuizError> {
        self.db
            .get_quiz(id)
            .await
            .map_err(QuizError::Persistence)?
            .ok_or_else(|| QuizError::NotFound("Quiz".to_string()))
    }

    pub async fn list_quizzes(&self, user_id: &str) -> Result<Vec<Quiz>, QuizError> {
        self.db
            .list_quizzes(Some(user_id))
            .await
            .map_err(QuizError::Persistence)
    }

    /// A result is only visible to the caller who submitted it
    pub async fn get_result(&self, id: Uuid, user_id: &str) -> Result<QuizResultDetail, QuizError> {
        let detail = self
            .db
            .get_quiz_result(id)
            .await
            .map_err(QuizError::Persistence)?
            .ok_or_else(|| QuizError::NotFound("Result".to_string()))?;

        if detail.result.user_id != user_id {
            log_service_warn!(SERVICE, "get_result", "result requested by a different user");
            return Err(QuizError::NotFound("Result".to_string()));
        }

        Ok(detail)
    }

    /// Grade submitted answers and store the result with one detail row per question.
    pub async fn grade_submission(
        &self,
        quiz_id: Uuid,
        user_id: &str,
        answers: HashMap<String, String>,
    ) -> Result<Uuid, QuizError> {
        let started = Instant::now();
        log_service_start!(SERVICE, "grade_submission", quiz_id = quiz_id);

        let quiz = self.get_quiz(quiz_id).await?;

        let questions_with_answers: Vec<QuestionWithAnswer> = quiz
            .questions
            .iter()
            .map(|question| QuestionWithAnswer {
                id: question.id.clone(),
                text: question.text.clone(),
                question_type: question.question_type,
                options: question.options.clone(),
                correct_answer: question.answer.clone(),
                user_answer: answers.get(&question.id).cloned().unwrap_or_default(),
            })
            .collect();

        let graded = self
            .llm
            .grade_answers(&questions_with_answers)
            .await
            .inspect_err(|e| {
                log_service_error!(SERVICE, "grade_submission", quiz_id = quiz_id, error = e);
            })?;

        let details = match_graded_answers(&questions_with_answers, graded)?;
        let score = details.iter().filter(|detail| detail.is_correct).count() as i64;

        let result = self
            .db
            .create_quiz_result(NewQuizResult {
                quiz_id,
                user_id: user_id.to_string(),
                score,
                total_questions: questions_with_answers.len() as i64,
                answers: details,
            })
            .await
            .map_err(QuizError::Persistence)?;

        log_service_success!(
            SERVICE,
            "grade_submission",
            result_id = result.id,
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(result.id)
    }
}

/// Pair every question with exactly one graded entry, in question order.
///
/// A question with no entry, or with more than one, is a lookup failure.
/// Entries for ids the quiz does not contain are dropped.
pub fn match_graded_answers(
    questions: &[QuestionWithAnswer],
    graded: Vec<GradedAnswer>,
) -> Result<Vec<NewAnswerDetail>, QuizError> {
    let mut by_id: HashMap<String, Vec<GradedAnswer>> = HashMap::new();
    for entry in graded {
        by_id.entry(entry.id.clone()).or_default().push(entry);
    }

    let mut details = Vec::with_capacity(questions.len());
    for question in questions {
        let entry = match by_id.remove(&question.id) {
            Some(mut entries) if entries.len() == 1 => entries.remove(0),
            _ => return Err(QuizError::Lookup(question.id.clone())),
        };

        details.push(NewAnswerDetail {
            question_id: question.id.clone(),
            user_answer: question.user_answer.clone(),
            is_correct: entry.is_correct,
            explanation: entry.explanation,
        });
    }

    for unknown in by_id.keys() {
        log_service_warn!(
            SERVICE,
            "match_graded_answers",
            format!("ignoring graded entry for unknown question '{}'", unknown)
        );
    }

    Ok(details)
}
