use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The five fixed question categories a quiz can be generated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionCategory {
    #[serde(alias = "multipleChoice", alias = "multiple-choice")]
    MultipleChoice,
    #[serde(alias = "Knowledge")]
    Knowledge,
    #[serde(alias = "Thinking")]
    Thinking,
    #[serde(alias = "Application")]
    Application,
    #[serde(alias = "Communication")]
    Communication,
}

impl QuestionCategory {
    pub const ALL: [QuestionCategory; 5] = [
        QuestionCategory::MultipleChoice,
        QuestionCategory::Knowledge,
        QuestionCategory::Thinking,
        QuestionCategory::Application,
        QuestionCategory::Communication,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionCategory::MultipleChoice => "multiple_choice",
            QuestionCategory::Knowledge => "knowledge",
            QuestionCategory::Thinking => "thinking",
            QuestionCategory::Application => "application",
            QuestionCategory::Communication => "communication",
        }
    }

    /// Human-readable label used in prompts and pages
    pub fn label(&self) -> &'static str {
        match self {
            QuestionCategory::MultipleChoice => "Multiple Choice",
            QuestionCategory::Knowledge => "Knowledge",
            QuestionCategory::Thinking => "Thinking",
            QuestionCategory::Application => "Application",
            QuestionCategory::Communication => "Communication",
        }
    }
}

impl fmt::Display for QuestionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuestionCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| format!("unknown question category '{}'", s))
    }
}

/// Requested number of questions per category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub multiple_choice: u32,
    pub knowledge: u32,
    pub thinking: u32,
    pub application: u32,
    pub communication: u32,
}

impl Default for Distribution {
    fn default() -> Self {
        Self {
            multiple_choice: 5,
            knowledge: 3,
            thinking: 3,
            application: 2,
            communication: 2,
        }
    }
}

impl Distribution {
    pub fn count(&self, category: QuestionCategory) -> u32 {
        match category {
            QuestionCategory::MultipleChoice => self.multiple_choice,
            QuestionCategory::Knowledge => self.knowledge,
            QuestionCategory::Thinking => self.thinking,
            QuestionCategory::Application => self.application,
            QuestionCategory::Communication => self.communication,
        }
    }

    pub fn total(&self) -> u32 {
        QuestionCategory::ALL.iter().map(|c| self.count(*c)).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionCategory,
    pub options: Option<Vec<String>>,
    pub answer: String,
}

/// A question as returned by the completion service, before ids are assigned
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedQuestion {
    #[serde(alias = "question")]
    pub text: String,
    #[serde(rename = "type", alias = "question_type")]
    pub question_type: QuestionCategory,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(alias = "correct_answer", alias = "correctAnswer")]
    pub answer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedQuiz {
    pub questions: Vec<GeneratedQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: Uuid,
    pub grade: String,
    pub questions: Vec<Question>,
    pub distribution: Distribution,
    pub notes_text: String,
    pub past_test_text: Option<String>,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewQuiz {
    pub grade: String,
    pub questions: Vec<Question>,
    pub distribution: Distribution,
    pub notes_text: String,
    pub past_test_text: Option<String>,
    pub user_id: Option<String>,
}

/// Everything an upload carries once the multipart form has been read
#[derive(Debug, Clone)]
pub struct GenerateQuizRequest {
    pub grade: String,
    pub notes: Vec<Vec<u8>>,
    pub past_test: Option<Vec<u8>>,
    pub distribution: Distribution,
}

/// One question as sent to the grader, together with the learner's answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionWithAnswer {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionCategory,
    pub options: Option<Vec<String>>,
    pub correct_answer: String,
    pub user_answer: String,
}

/// One entry of the grader's JSON array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedAnswer {
    pub id: String,
    #[serde(rename = "isCorrect")]
    pub is_correct: bool,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizResult {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub user_id: String,
    pub score: i64,
    pub total_questions: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerDetail {
    pub id: i64,
    pub result_id: Uuid,
    pub question_id: String,
    pub user_answer: String,
    pub is_correct: bool,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAnswerDetail {
    pub question_id: String,
    pub user_answer: String,
    pub is_correct: bool,
    pub explanation: String,
}

#[derive(Debug, Clone)]
pub struct NewQuizResult {
    pub quiz_id: Uuid,
    pub user_id: String,
    pub score: i64,
    pub total_questions: i64,
    pub answers: Vec<NewAnswerDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizSummary {
    pub id: Uuid,
    pub grade: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerDetailWithQuestion {
    #[serde(flatten)]
    pub detail: AnswerDetail,
    pub question: Option<Question>,
}

/// A result joined with its quiz summary and per-question details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizResultDetail {
    #[serde(flatten)]
    pub result: QuizResult,
    pub quiz: QuizSummary,
    pub answers: Vec<AnswerDetailWithQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub quiz_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub result_id: Uuid,
}
