use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::answer::AnswerVerdict;
use super::quiz::QuestionPayload;
use super::session::ParticipantInfo;
use crate::services::leaderboard::LeaderboardEntry;

/// Frames a client may send on the live channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Join(JoinPayload),
    Start(HostKeyPayload),
    End(HostKeyPayload),
    SubmitAnswer(SubmitAnswerPayload),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    pub quiz_id: Uuid,
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostKeyPayload {
    pub host_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerPayload {
    pub quiz_id: Uuid,
    pub user_id: String,
    pub question_id: String,
    pub answer: String,
    /// Client-reported milliseconds, carried into the answer record.
    #[serde(default)]
    pub time_spent: u64,
}

/// Frames the server pushes. Broadcast frames fan out to every connection
/// of a session; `Joined`, `Rejected`, `AnswerResult` and `Error` are only
/// ever sent to the connection they answer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Joined(JoinedPayload),
    Rejected(RejectedPayload),
    ParticipantUpdate(ParticipantUpdatePayload),
    QuizStarted,
    Question(QuestionBroadcast),
    TimerUpdate(TimerUpdatePayload),
    AnswerResult(AnswerVerdict),
    LeaderboardUpdate(LeaderboardPayload),
    QuizEnded,
    Error(ErrorPayload),
}

impl ServerMessage {
    /// Stable frame name, used as the metrics label.
    pub fn frame_name(&self) -> &'static str {
        match self {
            ServerMessage::Joined(_) => "joined",
            ServerMessage::Rejected(_) => "rejected",
            ServerMessage::ParticipantUpdate(_) => "participant_update",
            ServerMessage::QuizStarted => "quiz_started",
            ServerMessage::Question(_) => "question",
            ServerMessage::TimerUpdate(_) => "timer_update",
            ServerMessage::AnswerResult(_) => "answer_result",
            ServerMessage::LeaderboardUpdate(_) => "leaderboard_update",
            ServerMessage::QuizEnded => "quiz_ended",
            ServerMessage::Error(_) => "error",
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedPayload {
    pub session_id: Uuid,
    pub user_id: String,
    pub username: String,
    pub score: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedPayload {
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantUpdatePayload {
    pub participants: Vec<ParticipantInfo>,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionBroadcast {
    pub question: QuestionPayload,
    pub question_number: u32,
    pub total_questions: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerUpdatePayload {
    pub time_remaining: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardPayload {
    pub leaderboard: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
}
