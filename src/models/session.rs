use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::answer::AnswerRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    Running,
    Completed,
}

/// A user attached to a live session. Owned by the session task for the
/// session's duration; a disconnect flips `connected` but keeps the answer
/// history and score so a re-join with the same user id resumes.
#[derive(Debug, Clone)]
pub struct Participant {
    pub user_id: String,
    pub username: String,
    pub connected: bool,
    pub score: i64,
    pub total_answer_time_ms: i64,
    pub joined_at: DateTime<Utc>,
    pub answers: HashMap<String, AnswerRecord>,
}

impl Participant {
    pub fn new(user_id: String, username: String, joined_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            username,
            connected: true,
            score: 0,
            total_answer_time_ms: 0,
            joined_at,
            answers: HashMap::new(),
        }
    }
}

/// Connected-participant summary broadcast on membership changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub user_id: String,
    pub username: String,
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub title: String,
    pub status: SessionStatus,
    /// 1-based index of the question currently on screen, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_question: Option<u32>,
    pub total_questions: u32,
    pub participant_count: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuizResponse {
    pub session_id: Uuid,
    /// Authorizes `start`/`end` for this session. Returned once, to the
    /// creator only.
    pub host_key: String,
    pub title: String,
    pub question_count: u32,
    pub status: SessionStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostCommandRequest {
    pub host_key: String,
}
