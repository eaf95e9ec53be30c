use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One participant's response to one question. `answer` is `None` when the
/// window closed before the participant submitted anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_id: String,
    pub answer: Option<String>,
    pub correct: bool,
    pub points: i64,
    /// Client-reported time spent, milliseconds. Informational only; the
    /// server clock decides acceptance and scoring.
    pub time_spent_ms: u64,
    /// Server-side elapsed time from window open to acceptance.
    pub answer_time_ms: i64,
    pub submitted_at: DateTime<Utc>,
}

/// Private verdict returned to the submitter once their answer is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerVerdict {
    pub question_id: String,
    pub correct: bool,
    pub points_awarded: i64,
    pub total_score: i64,
}
