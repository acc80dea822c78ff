use anyhow::{Result, anyhow};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Instant;
use uuid::Uuid;

use crate::models::*;

// Import logging macros
use crate::log_db_operation;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    // Fixed width so lexical order matches chronological order
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // A private in-memory database only exists while a connection holds it
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let db = Database { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quizzes (
                id TEXT PRIMARY KEY,
                grade TEXT NOT NULL,
                distribution TEXT NOT NULL,
                notes_text TEXT NOT NULL,
                past_test_text TEXT,
                user_id TEXT,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS questions (
                quiz_id TEXT NOT NULL,
                id TEXT NOT NULL,
                position INTEGER NOT NULL,
                text TEXT NOT NULL,
                question_type TEXT NOT NULL,
                options TEXT,
                answer TEXT NOT NULL,
                PRIMARY KEY (quiz_id, id),
                FOREIGN KEY (quiz_id) REFERENCES quizzes(id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quiz_results (
                id TEXT PRIMARY KEY,
                quiz_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                score INTEGER NOT NULL,
                total_questions INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (quiz_id) REFERENCES quizzes(id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS answer_details (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                result_id TEXT NOT NULL,
                question_id TEXT NOT NULL,
                user_answer TEXT NOT NULL,
                is_correct BOOLEAN NOT NULL,
                explanation TEXT NOT NULL,
                FOREIGN KEY (result_id) REFERENCES quiz_results(id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_quizzes_user ON quizzes(user_id, created_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_answer_details_result ON answer_details(result_id)")
            .execute(&self.pool)
            .await?;

        log_db_operation!(info, "migrate", "schema ready");
        Ok(())
    }

    // Quiz operations
    pub async fn create_quiz(&self, request: NewQuiz) -> Result<Quiz> {
        let started = Instant::now();
        let quiz = Quiz {
            id: Uuid::new_v4(),
            grade: request.grade,
            questions: request.questions,
            distribution: request.distribution,
            notes_text: request.notes_text,
            past_test_text: request.past_test_text,
            user_id: request.user_id,
            created_at: now(),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO quizzes (id, grade, distribution, notes_text, past_test_text, user_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(quiz.id.to_string())
        .bind(&quiz.grade)
        .bind(serde_json::to_string(&quiz.distribution)?)
        .bind(&quiz.notes_text)
        .bind(&quiz.past_test_text)
        .bind(&quiz.user_id)
        .bind(format_timestamp(&quiz.created_at))
        .execute(&mut *tx)
        .await?;

        for (position, question) in quiz.questions.iter().enumerate() {
            let options_json = question.options.as_ref().map(serde_json::to_string).transpose()?;

            sqlx::query(
                r#"
                INSERT INTO questions (quiz_id, id, position, text, question_type, options, answer)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(quiz.id.to_string())
            .bind(&question.id)
            .bind(position as i64)
            .bind(&question.text)
            .bind(question.question_type.as_str())
            .bind(options_json)
            .bind(&question.answer)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        log_db_operation!(
            debug,
            "create_quiz",
            id = quiz.id,
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(quiz)
    }

    pub async fn get_quiz(&self, id: Uuid) -> Result<Option<Quiz>> {
        let row = sqlx::query("SELECT * FROM quizzes WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_quiz(&row).await?)),
            None => Ok(None),
        }
    }

    /// All quizzes, or only those created by `user_id`, newest first
    pub async fn list_quizzes(&self, user_id: Option<&str>) -> Result<Vec<Quiz>> {
        let started = Instant::now();
        let rows = match user_id {
            Some(user_id) => {
                sqlx::query(
                    "SELECT * FROM quizzes WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM quizzes ORDER BY created_at DESC, rowid DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut quizzes = Vec::with_capacity(rows.len());
        for row in &rows {
            quizzes.push(self.row_to_quiz(row).await?);
        }

        log_db_operation!(
            debug,
            "list_quizzes",
            count = quizzes.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(quizzes)
    }

    async fn row_to_quiz(&self, row: &SqliteRow) -> Result<Quiz> {
        let id = Uuid::parse_str(&row.get::<String, _>("id"))?;
        let questions = self.get_questions(id).await?;

        Ok(Quiz {
            id,
            grade: row.get("grade"),
            questions,
            distribution: serde_json::from_str(&row.get::<String, _>("distribution"))?,
            notes_text: row.get("notes_text"),
            past_test_text: row.get("past_test_text"),
            user_id: row.get("user_id"),
            created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        })
    }

    async fn get_questions(&self, quiz_id: Uuid) -> Result<Vec<Question>> {
        let rows = sqlx::query(
            "SELECT id, text, question_type, options, answer FROM questions WHERE quiz_id = ?1 ORDER BY position ASC",
        )
        .bind(quiz_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_question).collect()
    }

    // Result operations
    pub async fn create_quiz_result(&self, request: NewQuizResult) -> Result<QuizResult> {
        if request.answers.len() as i64 != request.total_questions {
            return Err(anyhow!(
                "result has {} answer details but {} questions",
                request.answers.len(),
                request.total_questions
            ));
        }

        let started = Instant::now();
        let result = QuizResult {
            id: Uuid::new_v4(),
            quiz_id: request.quiz_id,
            user_id: request.user_id,
            score: request.score,
            total_questions: request.total_questions,
            created_at: now(),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO quiz_results (id, quiz_id, user_id, score, total_questions, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(result.id.to_string())
        .bind(result.quiz_id.to_string())
        .bind(&result.user_id)
        .bind(result.score)
        .bind(result.total_questions)
        .bind(format_timestamp(&result.created_at))
        .execute(&mut *tx)
        .await?;

        for answer in &request.answers {
            sqlx::query(
                r#"
                INSERT INTO answer_details (result_id, question_id, user_answer, is_correct, explanation)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(result.id.to_string())
            .bind(&answer.question_id)
            .bind(&answer.user_answer)
            .bind(answer.is_correct)
            .bind(&answer.explanation)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        log_db_operation!(
            debug,
            "create_quiz_result",
            id = result.id,
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(result)
    }

    /// A result with its quiz summary and each answer joined to its question
    pub async fn get_quiz_result(&self, id: Uuid) -> Result<Option<QuizResultDetail>> {
        let started = Instant::now();
        let row = sqlx::query(
            r#"
            SELECT r.id, r.quiz_id, r.user_id, r.score, r.total_questions, r.created_at,
                   q.grade AS quiz_grade, q.created_at AS quiz_created_at
            FROM quiz_results r
            JOIN quizzes q ON q.id = r.quiz_id
            WHERE r.id = ?1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let result = QuizResult {
            id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            quiz_id: Uuid::parse_str(&row.get::<String, _>("quiz_id"))?,
            user_id: row.get("user_id"),
            score: row.get("score"),
            total_questions: row.get("total_questions"),
            created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        };
        let quiz = QuizSummary {
            id: result.quiz_id,
            grade: row.get("quiz_grade"),
            created_at: parse_timestamp(&row.get::<String, _>("quiz_created_at"))?,
        };

        let answer_rows = sqlx::query(
            r#"
            SELECT a.id, a.result_id, a.question_id, a.user_answer, a.is_correct, a.explanation,
                   q.id AS q_id, q.text AS q_text, q.question_type AS q_type,
                   q.options AS q_options, q.answer AS q_answer
            FROM answer_details a
            LEFT JOIN questions q ON q.quiz_id = ?2 AND q.id = a.question_id
            WHERE a.result_id = ?1
            ORDER BY a.id ASC
            "#,
        )
        .bind(result.id.to_string())
        .bind(result.quiz_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut answers = Vec::with_capacity(answer_rows.len());
        for row in &answer_rows {
            let detail = AnswerDetail {
                id: row.get("id"),
                result_id: Uuid::parse_str(&row.get::<String, _>("result_id"))?,
                question_id: row.get("question_id"),
                user_answer: row.get("user_answer"),
                is_correct: row.get("is_correct"),
                explanation: row.get("explanation"),
            };

            let question = match row.get::<Option<String>, _>("q_id") {
                Some(question_id) => Some(Question {
                    id: question_id,
                    text: row.get("q_text"),
                    question_type: parse_category(&row.get::<String, _>("q_type"))?,
                    options: parse_options(row.get("q_options"))?,
                    answer: row.get("q_answer"),
                }),
                None => None,
            };

            answers.push(AnswerDetailWithQuestion { detail, question });
        }

        log_db_operation!(
            debug,
            "get_quiz_result",
            id = result.id,
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(Some(QuizResultDetail {
            result,
            quiz,
            answers,
        }))
    }
}

fn row_to_question(row: &SqliteRow) -> Result<Question> {
    Ok(Question {
        id: row.get("id"),
        text: row.get("text"),
        question_type: parse_category(&row.get::<String, _>("question_type"))?,
        options: parse_options(row.get("options"))?,
        answer: row.get("answer"),
    })
}

fn parse_category(value: &str) -> Result<QuestionCategory> {
    value.parse::<QuestionCategory>().map_err(|e| anyhow!(e))
}

fn parse_options(value: Option<String>) -> Result<Option<Vec<String>>> {
    Ok(value.map(|json| serde_json::from_str(&json)).transpose()?)
}
