use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::metrics::{ANSWERS_SUBMITTED_TOTAL, PARTICIPANTS_CONNECTED};
use crate::models::message::{
    JoinedPayload, LeaderboardPayload, ParticipantUpdatePayload, QuestionBroadcast,
    SubmitAnswerPayload, TimerUpdatePayload,
};
use crate::models::{
    quiz::option_index, AnswerRecord, AnswerVerdict, Participant, ParticipantInfo, Question,
    QuestionPayload, ServerMessage, SessionSnapshot, SessionStatus,
};

use super::leaderboard::{self, LeaderboardEntry};

/// Why a join, host command or answer was refused. `reason_code` is the
/// stable identifier clients branch on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("quiz session not found")]
    NotFound,
    #[error("quiz session has already completed")]
    Completed,
    #[error("quiz session is already running")]
    AlreadyRunning,
    #[error("quiz session is not running")]
    NotRunning,
    #[error("quiz session is full")]
    SessionFull,
    #[error("question {0} is not the active question")]
    QuestionNotActive(String),
    #[error("answer window for question {0} has closed")]
    WindowClosed(String),
    #[error("answer for question {0} was already submitted")]
    AlreadyAnswered(String),
    #[error("unknown participant {0}")]
    UnknownParticipant(String),
    #[error("option {0} does not exist on the active question")]
    UnknownOption(String),
    #[error("invalid host key")]
    InvalidHostKey,
    #[error("invalid quiz definition: {0}")]
    InvalidQuiz(String),
}

impl SessionError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            SessionError::NotFound => "not_found",
            SessionError::Completed => "session_completed",
            SessionError::AlreadyRunning => "already_running",
            SessionError::NotRunning => "session_not_running",
            SessionError::SessionFull => "session_full",
            SessionError::QuestionNotActive(_) => "question_not_active",
            SessionError::WindowClosed(_) => "window_closed",
            SessionError::AlreadyAnswered(_) => "already_answered",
            SessionError::UnknownParticipant(_) => "unknown_participant",
            SessionError::UnknownOption(_) => "unknown_option",
            SessionError::InvalidHostKey => "invalid_host_key",
            SessionError::InvalidQuiz(_) => "invalid_quiz",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LiveOptions {
    pub live_leaderboard_size: usize,
    pub final_leaderboard_size: usize,
    pub max_participants: usize,
    /// Close the window early once every connected participant has
    /// answered. Off by default: clients expect the full countdown.
    pub advance_on_all_answered: bool,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            live_leaderboard_size: 5,
            final_leaderboard_size: 10,
            max_participants: 500,
            advance_on_all_answered: false,
        }
    }
}

/// Frames produced by a join: `reply` goes only to the joining connection,
/// `broadcast` fans out to the whole session.
#[derive(Debug)]
pub struct JoinResult {
    pub reply: Vec<ServerMessage>,
    pub broadcast: Vec<ServerMessage>,
}

#[derive(Debug)]
struct ActiveQuestion {
    index: usize,
    remaining_seconds: u32,
    window_open: bool,
    opened_at: DateTime<Utc>,
}

/// State of one live quiz run. All mutation goes through the methods below,
/// and the owning session task is the only caller, so acceptance decisions
/// ("already answered?", "window still open?") are atomic with respect to
/// concurrent submissions.
pub struct LiveSession {
    session_id: Uuid,
    title: String,
    host_key: String,
    questions: Vec<Question>,
    options: LiveOptions,
    status: SessionStatus,
    current: Option<ActiveQuestion>,
    participants: HashMap<String, Participant>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl LiveSession {
    pub fn new(
        session_id: Uuid,
        title: String,
        host_key: String,
        questions: Vec<Question>,
        options: LiveOptions,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            title,
            host_key,
            questions,
            options,
            status: SessionStatus::Waiting,
            current: None,
            participants: HashMap::new(),
            created_at: now,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// True while the countdown should be running.
    pub fn tick_armed(&self) -> bool {
        self.status == SessionStatus::Running
            && self.current.as_ref().is_some_and(|aq| aq.window_open)
    }

    pub fn join(
        &mut self,
        user_id: &str,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<JoinResult, SessionError> {
        if self.status == SessionStatus::Completed {
            return Err(SessionError::Completed);
        }

        match self.participants.get_mut(user_id) {
            Some(existing) => {
                // Re-join with a known user id resumes the prior score.
                if !existing.connected {
                    existing.connected = true;
                    PARTICIPANTS_CONNECTED.inc();
                }
                existing.username = username.to_string();
                tracing::info!(
                    "Participant re-joined: session={}, user={}",
                    self.session_id,
                    user_id
                );
            }
            None => {
                if self.participants.len() >= self.options.max_participants {
                    return Err(SessionError::SessionFull);
                }
                self.participants.insert(
                    user_id.to_string(),
                    Participant::new(user_id.to_string(), username.to_string(), now),
                );
                PARTICIPANTS_CONNECTED.inc();
                tracing::info!(
                    "Participant joined: session={}, user={}, connected={}",
                    self.session_id,
                    user_id,
                    self.connected_count()
                );
            }
        }

        let score = self.participants[user_id].score;
        let mut reply = vec![ServerMessage::Joined(JoinedPayload {
            session_id: self.session_id,
            user_id: user_id.to_string(),
            username: username.to_string(),
            score,
        })];

        // Catch a late or returning joiner up with the question on screen.
        if self.status == SessionStatus::Running {
            if let Some(aq) = &self.current {
                reply.push(ServerMessage::QuizStarted);
                reply.push(self.question_frame(aq.index));
                reply.push(ServerMessage::TimerUpdate(TimerUpdatePayload {
                    time_remaining: aq.remaining_seconds,
                }));
            }
        }

        Ok(JoinResult {
            reply,
            broadcast: vec![self.participant_update()],
        })
    }

    /// Marks a participant disconnected. Their answers and score stay in
    /// the leaderboard history; remaining questions count them as absent.
    pub fn disconnect(&mut self, user_id: &str) -> Vec<ServerMessage> {
        match self.participants.get_mut(user_id) {
            Some(p) if p.connected => {
                p.connected = false;
                PARTICIPANTS_CONNECTED.dec();
                tracing::info!(
                    "Participant disconnected: session={}, user={}, connected={}",
                    self.session_id,
                    user_id,
                    self.connected_count()
                );
                vec![self.participant_update()]
            }
            _ => Vec::new(),
        }
    }

    pub fn start(
        &mut self,
        host_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ServerMessage>, SessionError> {
        self.check_host_key(host_key)?;
        match self.status {
            SessionStatus::Waiting => {}
            SessionStatus::Running => return Err(SessionError::AlreadyRunning),
            SessionStatus::Completed => return Err(SessionError::Completed),
        }

        self.status = SessionStatus::Running;
        self.started_at = Some(now);
        tracing::info!(
            "Quiz started: session={}, questions={}, participants={}",
            self.session_id,
            self.questions.len(),
            self.participants.len()
        );

        let mut frames = vec![ServerMessage::QuizStarted];
        frames.extend(self.open_question(0, now));
        Ok(frames)
    }

    /// Host-issued early end. Honored even mid-question: the answer window
    /// closes immediately and no further question is ever broadcast.
    pub fn end(
        &mut self,
        host_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ServerMessage>, SessionError> {
        self.check_host_key(host_key)?;
        if self.status == SessionStatus::Completed {
            return Err(SessionError::Completed);
        }
        tracing::info!("Quiz ended by host: session={}", self.session_id);
        Ok(self.complete(now))
    }

    /// One countdown tick. Broadcasts the remaining time; at zero, closes
    /// the window, publishes standings and advances or completes.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<ServerMessage> {
        if self.status != SessionStatus::Running {
            return Vec::new();
        }
        let Some(aq) = self.current.as_mut() else {
            return Vec::new();
        };
        if !aq.window_open {
            return Vec::new();
        }
        aq.remaining_seconds = aq.remaining_seconds.saturating_sub(1);
        let remaining = aq.remaining_seconds;

        let mut frames = vec![ServerMessage::TimerUpdate(TimerUpdatePayload {
            time_remaining: remaining,
        })];
        if remaining == 0 {
            frames.extend(self.close_window_and_advance(now));
        }
        frames
    }

    pub fn submit_answer(
        &mut self,
        payload: &SubmitAnswerPayload,
        now: DateTime<Utc>,
    ) -> Result<(AnswerVerdict, Vec<ServerMessage>), SessionError> {
        if self.status != SessionStatus::Running {
            ANSWERS_SUBMITTED_TOTAL.with_label_values(&["rejected"]).inc();
            return Err(SessionError::NotRunning);
        }
        let result = self.try_accept_answer(payload, now);
        match &result {
            Ok((verdict, _)) => {
                let outcome = if verdict.correct {
                    "accepted_correct"
                } else {
                    "accepted_incorrect"
                };
                ANSWERS_SUBMITTED_TOTAL.with_label_values(&[outcome]).inc();
            }
            Err(_) => {
                ANSWERS_SUBMITTED_TOTAL.with_label_values(&["rejected"]).inc();
            }
        }
        result
    }

    fn try_accept_answer(
        &mut self,
        payload: &SubmitAnswerPayload,
        now: DateTime<Utc>,
    ) -> Result<(AnswerVerdict, Vec<ServerMessage>), SessionError> {
        let aq = self.current.as_ref().ok_or(SessionError::NotRunning)?;
        let question = &self.questions[aq.index];

        if payload.question_id != question.id {
            // An already-closed question gets its own rejection so a late
            // arrival is distinguishable from a stale or unknown id.
            let past = self.questions[..aq.index]
                .iter()
                .any(|q| q.id == payload.question_id);
            return Err(if past {
                SessionError::WindowClosed(payload.question_id.clone())
            } else {
                SessionError::QuestionNotActive(payload.question_id.clone())
            });
        }
        if !aq.window_open || aq.remaining_seconds == 0 {
            return Err(SessionError::WindowClosed(payload.question_id.clone()));
        }

        let remaining = aq.remaining_seconds;
        let opened_at = aq.opened_at;
        let time_limit = question.time_limit_seconds;
        let correct_index = question.correct_index();
        let option_count = question.option_count();
        let question_id = question.id.clone();

        let participant = self
            .participants
            .get_mut(&payload.user_id)
            .ok_or_else(|| SessionError::UnknownParticipant(payload.user_id.clone()))?;
        if participant.answers.contains_key(&question_id) {
            return Err(SessionError::AlreadyAnswered(question_id));
        }

        let chosen = option_index(&payload.answer)
            .filter(|i| *i < option_count)
            .ok_or_else(|| SessionError::UnknownOption(payload.answer.clone()))?;

        let correct = Some(chosen) == correct_index;
        let points = if correct {
            points_for(remaining, time_limit)
        } else {
            0
        };
        let answer_time_ms = (now - opened_at).num_milliseconds().max(0);

        participant.answers.insert(
            question_id.clone(),
            AnswerRecord {
                question_id: question_id.clone(),
                answer: Some(payload.answer.to_uppercase()),
                correct,
                points,
                time_spent_ms: payload.time_spent,
                answer_time_ms,
                submitted_at: now,
            },
        );
        participant.score += points;
        participant.total_answer_time_ms += answer_time_ms;

        let verdict = AnswerVerdict {
            question_id: question_id.clone(),
            correct,
            points_awarded: points,
            total_score: participant.score,
        };
        tracing::debug!(
            "Answer accepted: session={}, user={}, question={}, correct={}, points={}",
            self.session_id,
            payload.user_id,
            question_id,
            correct,
            points
        );

        let mut broadcast = Vec::new();
        if self.options.advance_on_all_answered && self.all_connected_answered() {
            broadcast.push(ServerMessage::TimerUpdate(TimerUpdatePayload {
                time_remaining: 0,
            }));
            broadcast.extend(self.close_window_and_advance(now));
        }
        Ok((verdict, broadcast))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            title: self.title.clone(),
            status: self.status,
            current_question: self.current.as_ref().map(|aq| (aq.index + 1) as u32),
            total_questions: self.questions.len() as u32,
            participant_count: self.participants.len() as u32,
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }

    pub fn leaderboard_full(&self) -> Vec<LeaderboardEntry> {
        leaderboard::standings(self.participants.values())
    }

    /// All answer records for one participant, in question order.
    pub fn responses(&self, user_id: &str) -> Result<Vec<AnswerRecord>, SessionError> {
        let participant = self
            .participants
            .get(user_id)
            .ok_or_else(|| SessionError::UnknownParticipant(user_id.to_string()))?;
        Ok(self
            .questions
            .iter()
            .filter_map(|q| participant.answers.get(&q.id).cloned())
            .collect())
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    fn check_host_key(&self, host_key: &str) -> Result<(), SessionError> {
        if host_key != self.host_key {
            return Err(SessionError::InvalidHostKey);
        }
        Ok(())
    }

    fn connected_count(&self) -> u32 {
        self.participants.values().filter(|p| p.connected).count() as u32
    }

    fn all_connected_answered(&self) -> bool {
        let Some(aq) = &self.current else {
            return false;
        };
        let question_id = &self.questions[aq.index].id;
        let connected: Vec<_> = self.participants.values().filter(|p| p.connected).collect();
        !connected.is_empty()
            && connected
                .iter()
                .all(|p| p.answers.contains_key(question_id))
    }

    fn participant_update(&self) -> ServerMessage {
        let mut participants: Vec<&Participant> = self.participants.values().collect();
        participants.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.user_id.cmp(&b.user_id)));
        ServerMessage::ParticipantUpdate(ParticipantUpdatePayload {
            participants: participants
                .into_iter()
                .map(|p| ParticipantInfo {
                    user_id: p.user_id.clone(),
                    username: p.username.clone(),
                    connected: p.connected,
                })
                .collect(),
            count: self.connected_count(),
        })
    }

    fn question_frame(&self, index: usize) -> ServerMessage {
        ServerMessage::Question(QuestionBroadcast {
            question: QuestionPayload::from(&self.questions[index]),
            question_number: (index + 1) as u32,
            total_questions: self.questions.len() as u32,
        })
    }

    fn open_question(&mut self, index: usize, now: DateTime<Utc>) -> Vec<ServerMessage> {
        let time_limit = self.questions[index].time_limit_seconds;
        self.current = Some(ActiveQuestion {
            index,
            remaining_seconds: time_limit,
            window_open: true,
            opened_at: now,
        });
        tracing::info!(
            "Question opened: session={}, question={}/{}, budget={}s",
            self.session_id,
            index + 1,
            self.questions.len(),
            time_limit
        );
        vec![self.question_frame(index)]
    }

    /// Closes the active window, records absences, publishes standings and
    /// either opens the next question or completes the session.
    fn close_window_and_advance(&mut self, now: DateTime<Utc>) -> Vec<ServerMessage> {
        let Some(aq) = self.current.as_mut() else {
            return Vec::new();
        };
        aq.window_open = false;
        let index = aq.index;
        self.record_absences(index, now);

        let last = index + 1 >= self.questions.len();
        if last {
            self.complete(now)
        } else {
            let mut frames = vec![self.leaderboard_frame(self.options.live_leaderboard_size)];
            frames.extend(self.open_question(index + 1, now));
            frames
        }
    }

    /// Terminal transition: freeze the leaderboard and stop the countdown.
    fn complete(&mut self, now: DateTime<Utc>) -> Vec<ServerMessage> {
        if let Some(aq) = self.current.take() {
            if aq.window_open {
                self.record_absences(aq.index, now);
            }
        }
        self.status = SessionStatus::Completed;
        self.ended_at = Some(now);
        tracing::info!(
            "Quiz completed: session={}, participants={}",
            self.session_id,
            self.participants.len()
        );
        vec![
            self.leaderboard_frame(self.options.final_leaderboard_size),
            ServerMessage::QuizEnded,
        ]
    }

    /// Every participant without an answer for `index` gets an empty record
    /// so the per-question history is complete.
    fn record_absences(&mut self, index: usize, now: DateTime<Utc>) {
        let question_id = self.questions[index].id.clone();
        for participant in self.participants.values_mut() {
            participant
                .answers
                .entry(question_id.clone())
                .or_insert_with(|| AnswerRecord {
                    question_id: question_id.clone(),
                    answer: None,
                    correct: false,
                    points: 0,
                    time_spent_ms: 0,
                    answer_time_ms: 0,
                    submitted_at: now,
                });
        }
    }

    fn leaderboard_frame(&self, size: usize) -> ServerMessage {
        let full = self.leaderboard_full();
        ServerMessage::LeaderboardUpdate(LeaderboardPayload {
            leaderboard: leaderboard::top(&full, size),
        })
    }
}

/// Points for a correct answer: a 50-point floor plus up to 50 speed
/// points, measured against the server countdown at acceptance. Integer
/// math keeps the award deterministic.
fn points_for(remaining_seconds: u32, time_limit_seconds: u32) -> i64 {
    if time_limit_seconds == 0 {
        return 50;
    }
    let bonus = (50 * remaining_seconds as i64).div_ceil(time_limit_seconds as i64);
    50 + bonus
}
