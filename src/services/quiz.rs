use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::db::DatabaseProxy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    FillBlank,
    DragDrop,
}

impl QuestionType {
    pub fn parse(s: &str) -> Self {
        match s {
            "multiple_choice" => Self::MultipleChoice,
            "true_false" => Self::TrueFalse,
            "fill_blank" => Self::FillBlank,
            _ => Self::DragDrop,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Quiz {
    pub id: String,
    pub topic_id: Option<String>,
    pub title: String,
    pub passing_percentage: f64,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct QuizQuestion {
    pub id: String,
    pub question_type: QuestionType,
    pub question: String,
    pub options: Option<serde_json::Value>,
    pub correct_answer: String,
    pub points: i64,
    pub explanation: Option<String>,
}

/// Submitted answer payload: a single string, an ordered sequence
/// (drag and drop), or nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Sequence(Vec<String>),
    Null,
}

impl AnswerValue {
    fn as_text(&self) -> String {
        match self {
            AnswerValue::Text(s) => s.clone(),
            AnswerValue::Sequence(items) => items.join(","),
            AnswerValue::Null => String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: String,
    pub answer: AnswerValue,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerBreakdown {
    pub question_id: String,
    pub correct: bool,
    pub answer: AnswerValue,
    pub correct_answer: String,
    pub explanation: Option<String>,
    pub points_awarded: i64,
    pub points_possible: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResult {
    pub attempt_id: String,
    pub score: i64,
    pub max_score: i64,
    pub percentage: f64,
    pub passed: bool,
    pub breakdown: Vec<AnswerBreakdown>,
}

/// Per-type correctness rules. multiple_choice compares trimmed and
/// case-sensitive, true_false case-insensitive, fill_blank trimmed and
/// case-insensitive. Anything else (drag_drop) compares a sequence answer
/// against the stored correct answer in serialized JSON form.
pub fn is_answer_correct(question: &QuizQuestion, answer: &AnswerValue) -> bool {
    let correct = question.correct_answer.as_str();
    match question.question_type {
        QuestionType::MultipleChoice => answer.as_text().trim() == correct.trim(),
        QuestionType::TrueFalse => answer.as_text().to_lowercase() == correct.to_lowercase(),
        QuestionType::FillBlank => {
            answer.as_text().trim().to_lowercase() == correct.trim().to_lowercase()
        }
        QuestionType::DragDrop => match answer {
            AnswerValue::Sequence(items) => {
                serde_json::to_string(items).map(|s| s == correct).unwrap_or(false)
            }
            other => other.as_text() == correct,
        },
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Scores one attempt. Answers referencing unknown question ids are
/// ignored and do not count toward the max score. Order-independent.
pub fn score_attempt(
    questions: &[QuizQuestion],
    answers: &[SubmittedAnswer],
    passing_percentage: f64,
) -> AttemptResult {
    let mut score = 0i64;
    let mut max_score = 0i64;
    let mut breakdown = Vec::with_capacity(answers.len());

    for submitted in answers {
        let Some(question) = questions.iter().find(|q| q.id == submitted.question_id) else {
            continue;
        };

        let points_possible = question.points.max(0);
        max_score += points_possible;

        let correct = is_answer_correct(question, &submitted.answer);
        let points_awarded = if correct { points_possible } else { 0 };
        score += points_awarded;

        breakdown.push(AnswerBreakdown {
            question_id: question.id.clone(),
            correct,
            answer: submitted.answer.clone(),
            correct_answer: question.correct_answer.clone(),
            explanation: question.explanation.clone(),
            points_awarded,
            points_possible,
        });
    }

    let percentage = if max_score == 0 {
        0.0
    } else {
        round2(score as f64 / max_score as f64 * 100.0)
    };
    let passed = percentage >= passing_percentage;

    AttemptResult {
        attempt_id: String::new(),
        score,
        max_score,
        percentage,
        passed,
        breakdown,
    }
}

/// Uniform shuffle for presentation. Scoring never depends on order.
pub fn shuffle_questions(questions: &mut [QuizQuestion]) {
    questions.shuffle(&mut rand::rng());
}

pub async fn get_quiz(proxy: &DatabaseProxy, quiz_id: &str) -> Result<Option<Quiz>, String> {
    let pool = proxy.pool();
    let row = sqlx::query(
        r#"SELECT id, topic_id, title, passing_percentage, is_active FROM quizzes WHERE id = $1"#,
    )
    .bind(quiz_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| format!("failed to load quiz: {e}"))?;

    Ok(row.map(|row| Quiz {
        id: row.try_get("id").unwrap_or_default(),
        topic_id: row.try_get("topic_id").ok(),
        title: row.try_get("title").unwrap_or_default(),
        passing_percentage: row.try_get("passing_percentage").unwrap_or(70.0),
        is_active: row.try_get("is_active").unwrap_or(false),
    }))
}

pub async fn get_quiz_questions(
    proxy: &DatabaseProxy,
    quiz_id: &str,
) -> Result<Vec<QuizQuestion>, String> {
    let pool = proxy.pool();
    let rows = sqlx::query(
        r#"
        SELECT id, question_type, question, options, correct_answer, points, explanation
        FROM quiz_questions
        WHERE quiz_id = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await
    .map_err(|e| format!("failed to load quiz questions: {e}"))?;

    Ok(rows
        .into_iter()
        .map(|row| QuizQuestion {
            id: row.try_get("id").unwrap_or_default(),
            question_type: QuestionType::parse(
                &row.try_get::<String, _>("question_type").unwrap_or_default(),
            ),
            question: row.try_get("question").unwrap_or_default(),
            options: row
                .try_get::<sqlx::types::Json<serde_json::Value>, _>("options")
                .ok()
                .map(|json| json.0),
            correct_answer: row.try_get("correct_answer").unwrap_or_default(),
            points: row.try_get::<i32, _>("points").map(|v| v as i64).unwrap_or(1),
            explanation: row.try_get("explanation").ok(),
        })
        .collect())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttemptPayload {
    pub quiz_id: String,
    pub topic_id: String,
    pub answers: Vec<SubmittedAnswer>,
    #[serde(default)]
    pub time_taken_seconds: Option<i64>,
}

/// Scores and persists one immutable attempt row, returning the breakdown
/// for immediate feedback.
pub async fn submit_quiz_attempt(
    proxy: &DatabaseProxy,
    user_id: &str,
    payload: &QuizAttemptPayload,
) -> Result<AttemptResult, String> {
    let quiz = get_quiz(proxy, &payload.quiz_id)
        .await?
        .ok_or_else(|| "Quiz not found".to_string())?;
    if !quiz.is_active {
        return Err("Quiz is not active".to_string());
    }

    let questions = get_quiz_questions(proxy, &payload.quiz_id).await?;
    let mut result = score_attempt(&questions, &payload.answers, quiz.passing_percentage);

    let attempt_id = insert_attempt(proxy.pool(), user_id, payload, &result).await?;
    result.attempt_id = attempt_id;
    Ok(result)
}

async fn insert_attempt(
    pool: &PgPool,
    user_id: &str,
    payload: &QuizAttemptPayload,
    result: &AttemptResult,
) -> Result<String, String> {
    let attempt_id = Uuid::new_v4().to_string();
    let answers_json =
        serde_json::to_value(&payload.answers).map_err(|e| format!("failed to encode answers: {e}"))?;

    sqlx::query(
        r#"
        INSERT INTO quiz_attempts
          (id, user_id, quiz_id, topic_id, answers, score, max_score, percentage, passed, time_taken_seconds, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
        "#,
    )
    .bind(&attempt_id)
    .bind(user_id)
    .bind(&payload.quiz_id)
    .bind(&payload.topic_id)
    .bind(sqlx::types::Json(answers_json))
    .bind(result.score)
    .bind(result.max_score)
    .bind(result.percentage)
    .bind(result.passed)
    .bind(payload.time_taken_seconds)
    .execute(pool)
    .await
    .map_err(|e| format!("failed to save quiz attempt: {e}"))?;

    Ok(attempt_id)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentAttempt {
    pub id: String,
    pub quiz_id: String,
    pub topic_id: Option<String>,
    pub percentage: f64,
    pub passed: bool,
    pub created_at: String,
}

pub async fn get_recent_quiz_attempts(
    proxy: &DatabaseProxy,
    user_id: &str,
    limit: i64,
) -> Result<Vec<RecentAttempt>, String> {
    let pool = proxy.pool();
    let rows = sqlx::query(
        r#"
        SELECT id, quiz_id, topic_id, percentage, passed, created_at
        FROM quiz_attempts
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|e| format!("failed to load quiz attempts: {e}"))?;

    Ok(rows
        .into_iter()
        .map(|row| RecentAttempt {
            id: row.try_get("id").unwrap_or_default(),
            quiz_id: row.try_get("quiz_id").unwrap_or_default(),
            topic_id: row.try_get("topic_id").ok(),
            percentage: row.try_get("percentage").unwrap_or(0.0),
            passed: row.try_get("passed").unwrap_or(false),
            created_at: row
                .try_get::<chrono::NaiveDateTime, _>("created_at")
                .map(|dt| {
                    chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(dt, chrono::Utc)
                        .to_rfc3339()
                })
                .unwrap_or_default(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, qtype: QuestionType, correct: &str, points: i64) -> QuizQuestion {
        QuizQuestion {
            id: id.to_string(),
            question_type: qtype,
            question: format!("question {id}"),
            options: None,
            correct_answer: correct.to_string(),
            points,
            explanation: Some("because".to_string()),
        }
    }

    fn text_answer(question_id: &str, answer: &str) -> SubmittedAnswer {
        SubmittedAnswer {
            question_id: question_id.to_string(),
            answer: AnswerValue::Text(answer.to_string()),
        }
    }

    #[test]
    fn test_fill_blank_trims_and_ignores_case() {
        let q = question("q1", QuestionType::FillBlank, "Paris", 1);
        assert!(is_answer_correct(&q, &AnswerValue::Text(" paris ".into())));
        assert!(!is_answer_correct(&q, &AnswerValue::Text("PARIS!".into())));
    }

    #[test]
    fn test_multiple_choice_is_case_sensitive() {
        let q = question("q1", QuestionType::MultipleChoice, "Option B", 1);
        assert!(is_answer_correct(&q, &AnswerValue::Text(" Option B ".into())));
        assert!(!is_answer_correct(&q, &AnswerValue::Text("option b".into())));
    }

    #[test]
    fn test_true_false_ignores_case() {
        let q = question("q1", QuestionType::TrueFalse, "True", 1);
        assert!(is_answer_correct(&q, &AnswerValue::Text("true".into())));
        assert!(!is_answer_correct(&q, &AnswerValue::Text("false".into())));
    }

    #[test]
    fn test_drag_drop_compares_serialized_sequence() {
        let q = question("q1", QuestionType::DragDrop, r#"["a","b","c"]"#, 2);
        assert!(is_answer_correct(
            &q,
            &AnswerValue::Sequence(vec!["a".into(), "b".into(), "c".into()])
        ));
        assert!(!is_answer_correct(
            &q,
            &AnswerValue::Sequence(vec!["c".into(), "b".into(), "a".into()])
        ));
    }

    #[test]
    fn test_percentage_rounds_to_two_decimals() {
        let questions = vec![
            question("q1", QuestionType::FillBlank, "x", 7),
            question("q2", QuestionType::FillBlank, "y", 2),
        ];
        let answers = vec![text_answer("q1", "x"), text_answer("q2", "z")];
        let result = score_attempt(&questions, &answers, 70.0);
        assert_eq!(result.score, 7);
        assert_eq!(result.max_score, 9);
        assert_eq!(result.percentage, 77.78);
        assert!(result.passed);
    }

    #[test]
    fn test_unknown_question_ids_are_ignored() {
        let questions = vec![question("q1", QuestionType::FillBlank, "x", 5)];
        let answers = vec![text_answer("q1", "x"), text_answer("ghost", "x")];
        let result = score_attempt(&questions, &answers, 50.0);
        assert_eq!(result.max_score, 5);
        assert_eq!(result.score, 5);
        assert_eq!(result.breakdown.len(), 1);
    }

    #[test]
    fn test_empty_max_score_yields_zero_percentage() {
        let questions: Vec<QuizQuestion> = Vec::new();
        let answers = vec![text_answer("q1", "x")];
        let result = score_attempt(&questions, &answers, 50.0);
        assert_eq!(result.max_score, 0);
        assert_eq!(result.percentage, 0.0);
        assert!(!result.passed);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let questions = vec![
            question("q1", QuestionType::MultipleChoice, "A", 3),
            question("q2", QuestionType::TrueFalse, "false", 2),
        ];
        let answers = vec![text_answer("q1", "A"), text_answer("q2", "FALSE")];
        let a = score_attempt(&questions, &answers, 60.0);
        let b = score_attempt(&questions, &answers, 60.0);
        assert_eq!(a.score, b.score);
        assert_eq!(a.percentage, b.percentage);
        assert_eq!(a.passed, b.passed);
    }

    #[test]
    fn test_shuffle_preserves_question_set() {
        let mut questions: Vec<QuizQuestion> = (0..10)
            .map(|i| question(&format!("q{i}"), QuestionType::TrueFalse, "true", 1))
            .collect();
        let mut ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
        shuffle_questions(&mut questions);
        let mut shuffled: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
        ids.sort();
        shuffled.sort();
        assert_eq!(ids, shuffled);
    }
}
