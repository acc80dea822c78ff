use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::errors::QuizError;
use crate::llm_providers::{
    CompletionProvider, JsonResponseParser, LLMProviderFactory, LLMProviderType,
};
use crate::models::{
    Distribution, GeneratedQuiz, GradedAnswer, Question, QuestionCategory, QuestionWithAnswer,
};

// Import logging macros
use crate::log_llm_operation;

const GENERATION_SYSTEM_MESSAGE: &str =
    "You are a helpful assistant that generates practice questions based on study materials.";
const GRADING_SYSTEM_MESSAGE: &str = "You are a helpful tutor evaluating student answers.";

/// Builds instructions for the completion service and turns its replies
/// into questions and graded answers.
#[derive(Clone)]
pub struct LLMService {
    provider: Arc<dyn CompletionProvider>,
    json_parser: JsonResponseParser,
}

impl LLMService {
    pub fn new_with_provider(
        api_key: String,
        base_url: Option<String>,
        provider_type: LLMProviderType,
        model: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let provider =
            LLMProviderFactory::create_provider(provider_type, api_key, base_url, model, timeout)?;
        Ok(Self::from_provider(Arc::new(provider)))
    }

    pub fn from_provider(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            json_parser: JsonResponseParser,
        }
    }

    /// Get the provider name for logging and testing
    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    /// Get the model name being used
    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    async fn complete(
        &self,
        operation: &str,
        system_message: &str,
        prompt: &str,
    ) -> Result<String, QuizError> {
        let started = Instant::now();
        debug!(operation = operation, prompt = %prompt, "Sending completion request");

        match self.provider.complete(Some(system_message), prompt).await {
            Ok(response) => {
                log_llm_operation!(
                    success,
                    operation,
                    provider = self.provider_name(),
                    duration_ms = started.elapsed().as_millis() as u64
                );
                debug!(operation = operation, response_content = %response, "Raw LLM response");
                Ok(response)
            }
            Err(e) => {
                log_llm_operation!(error, operation, provider = self.provider_name(), error = e);
                Err(QuizError::Upstream(e.to_string()))
            }
        }
    }

    // ------------------------------------------------------------------
    // Question generation
    // ------------------------------------------------------------------

    pub async fn generate_questions(
        &self,
        grade: &str,
        notes: &str,
        past_test: Option<&str>,
        distribution: &Distribution,
    ) -> Result<Vec<Question>, QuizError> {
        log_llm_operation!(
            start,
            "generate_questions",
            provider = self.provider_name(),
            question_count = distribution.total()
        );

        let prompt = build_generation_prompt(grade, notes, past_test, distribution);
        let response_text = self
            .complete("generate_questions", GENERATION_SYSTEM_MESSAGE, &prompt)
            .await?;

        self.parse_generated_questions(&response_text, distribution)
    }

    /// Parse and validate the generation reply, assigning ids `q1..qN` in order
    pub fn parse_generated_questions(
        &self,
        raw: &str,
        distribution: &Distribution,
    ) -> Result<Vec<Question>, QuizError> {
        let generated: GeneratedQuiz = self.json_parser.parse_json_response(raw).map_err(|e| {
            error!(
                error = %e,
                json_content = %JsonResponseParser::extract_json_from_response(raw),
                "Failed to parse quiz generation JSON response"
            );
            QuizError::Upstream(format!("unreadable question list: {}", e))
        })?;

        if generated.questions.is_empty() {
            return Err(QuizError::Upstream("no questions were generated".to_string()));
        }

        let mut questions = Vec::with_capacity(generated.questions.len());
        for (position, item) in generated.questions.into_iter().enumerate() {
            let id = format!("q{}", position + 1);

            if item.text.trim().is_empty() || item.answer.trim().is_empty() {
                return Err(QuizError::Upstream(format!(
                    "question {} is missing its text or answer",
                    id
                )));
            }

            let options = item.options.filter(|options| !options.is_empty());
            if item.question_type == QuestionCategory::MultipleChoice && options.is_none() {
                return Err(QuizError::Upstream(format!(
                    "multiple choice question {} has no options",
                    id
                )));
            }

            questions.push(Question {
                id,
                text: item.text,
                question_type: item.question_type,
                options,
                answer: item.answer,
            });
        }

        let requested = distribution.total() as usize;
        if questions.len() != requested {
            warn!(
                requested = requested,
                generated = questions.len(),
                "Generated question count differs from requested distribution"
            );
        }

        info!(question_count = questions.len(), "Successfully generated quiz questions");
        Ok(questions)
    }

    // ------------------------------------------------------------------
    // Grading
    // ------------------------------------------------------------------

    pub async fn grade_answers(
        &self,
        questions: &[QuestionWithAnswer],
    ) -> Result<Vec<GradedAnswer>, QuizError> {
        log_llm_operation!(
            start,
            "grade_answers",
            provider = self.provider_name(),
            question_count = questions.len()
        );

        let prompt = build_grading_prompt(questions)?;
        let response_text = self
            .complete("grade_answers", GRADING_SYSTEM_MESSAGE, &prompt)
            .await?;

        self.parse_grading_response(&response_text)
    }

    /// Read the grader's JSON array of `{id, isCorrect, explanation}`
    pub fn parse_grading_response(&self, raw: &str) -> Result<Vec<GradedAnswer>, QuizError> {
        self.json_parser
            .parse_json_response::<Vec<GradedAnswer>>(raw)
            .map_err(|e| {
                error!(
                    error = %e,
                    json_content = %JsonResponseParser::extract_json_from_response(raw),
                    "Failed to parse grading JSON response"
                );
                QuizError::Upstream(format!("unreadable grading response: {}", e))
            })
    }
}

/// Instruction asking for practice questions for `grade` from `notes`.
///
/// The past-test sentence is only included when a non-blank past test was
/// supplied.
pub fn build_generation_prompt(
    grade: &str,
    notes: &str,
    past_test: Option<&str>,
    distribution: &Distribution,
) -> String {
    let reference = match past_test.map(str::trim) {
        Some(text) if !text.is_empty() => {
            format!("Use this past test as reference for question style: {}\n", text)
        }
        _ => String::new(),
    };

    let counts = QuestionCategory::ALL
        .iter()
        .map(|category| format!("- {}: {}", category.label(), distribution.count(*category)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Based on the following notes and grade level {grade}, generate practice questions.
{reference}
Notes:
{notes}

Generate questions according to this distribution:
{counts}

Please respond with a JSON object in this exact format:
{{
    "questions": [
        {{
            "text": "Question text here",
            "type": "multiple_choice|knowledge|thinking|application|communication",
            "options": ["Option 1", "Option 2", "Option 3", "Option 4"] or null,
            "answer": "The expected correct answer"
        }}
    ]
}}

Guidelines:
- Provide options only for multiple_choice questions
- For multiple_choice, the answer must be the text of the correct option"#
    )
}

/// Instruction asking the grader to evaluate every answer in `questions`.
pub fn build_grading_prompt(questions: &[QuestionWithAnswer]) -> Result<String, QuizError> {
    let questions_json = serde_json::to_string_pretty(questions)
        .map_err(|e| QuizError::InvalidInput(format!("could not encode answers: {}", e)))?;

    Ok(format!(
        r#"For each of the following questions, evaluate the student's answer and provide:
1. Whether the answer is correct or incorrect
2. A detailed explanation of why the answer is correct or incorrect
3. For incorrect answers, explain the correct approach

Questions and Answers:
{questions_json}

Format your response as a JSON array with the following structure:
[
    {{
        "id": "question_id",
        "isCorrect": true/false,
        "explanation": "Detailed explanation"
    }}
]"#
    ))
}
