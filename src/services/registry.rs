use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::metrics::{SESSIONS_ACTIVE, SESSIONS_TOTAL};
use crate::models::{
    quiz::option_index, CreateQuizRequest, CreateQuizResponse, Question, SessionStatus,
};

use super::live_session::{LiveOptions, LiveSession, SessionError};
use super::runner::{self, SessionHandle};

/// Registry defaults applied to every session, taken from `Config`.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub tick_interval: Duration,
    pub live_options: LiveOptions,
    /// How long completed sessions stay queryable before eviction.
    pub archive_retention: chrono::Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            live_options: LiveOptions::default(),
            archive_retention: chrono::Duration::minutes(30),
        }
    }
}

/// All live and recently-completed sessions. Sessions are independent;
/// this map is the only structure shared across them.
pub struct SessionRegistry {
    settings: RegistrySettings,
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(settings: RegistrySettings) -> Self {
        Self {
            settings,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Validates the quiz definition, spawns the session task and returns
    /// the id plus the host key that authorizes `start`/`end`.
    pub async fn create_session(
        &self,
        req: CreateQuizRequest,
    ) -> Result<CreateQuizResponse, SessionError> {
        let questions = build_questions(&req)?;
        let session_id = Uuid::new_v4();
        let host_key = Uuid::new_v4().to_string();

        let session = LiveSession::new(
            session_id,
            req.title.clone(),
            host_key.clone(),
            questions,
            self.settings.live_options.clone(),
            Utc::now(),
        );
        let question_count = req.questions.len() as u32;
        let handle = runner::spawn(session, self.settings.tick_interval);

        self.sessions.write().await.insert(session_id, handle);
        SESSIONS_TOTAL.with_label_values(&["created"]).inc();
        SESSIONS_ACTIVE.inc();
        tracing::info!(
            "Session created: session={}, title={:?}, questions={}",
            session_id,
            req.title,
            question_count
        );

        Ok(CreateQuizResponse {
            session_id,
            host_key,
            title: req.title,
            question_count,
            status: SessionStatus::Waiting,
        })
    }

    pub async fn get(&self, session_id: &Uuid) -> Result<SessionHandle, SessionError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or(SessionError::NotFound)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Evicts sessions that completed longer than the retention period
    /// ago. Dropping the handle lets the session task wind down once the
    /// last connection goes away.
    pub async fn sweep_archived(&self, now: DateTime<Utc>) -> usize {
        let handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();

        let mut expired = Vec::new();
        for handle in handles {
            if let Ok(snapshot) = handle.snapshot().await {
                if snapshot.status == SessionStatus::Completed {
                    if let Some(ended_at) = snapshot.ended_at {
                        if now - ended_at >= self.settings.archive_retention {
                            expired.push(handle.session_id);
                        }
                    }
                }
            }
        }

        if expired.is_empty() {
            return 0;
        }
        let mut sessions = self.sessions.write().await;
        let mut removed = 0;
        for session_id in expired {
            if sessions.remove(&session_id).is_some() {
                removed += 1;
                SESSIONS_TOTAL.with_label_values(&["evicted"]).inc();
                SESSIONS_ACTIVE.dec();
                tracing::info!("Archived session evicted: session={}", session_id);
            }
        }
        removed
    }
}

fn build_questions(req: &CreateQuizRequest) -> Result<Vec<Question>, SessionError> {
    let mut questions = Vec::with_capacity(req.questions.len());
    for (i, input) in req.questions.iter().enumerate() {
        let id = input
            .id
            .clone()
            .unwrap_or_else(|| format!("q{}", i + 1));
        let correct = option_index(&input.correct_option)
            .filter(|idx| *idx < input.options.len())
            .ok_or_else(|| {
                SessionError::InvalidQuiz(format!(
                    "question {} has no option labeled {:?}",
                    i + 1,
                    input.correct_option
                ))
            })?;
        questions.push(Question {
            id,
            text: input.text.clone(),
            image: input.image.clone(),
            options: input.options.clone(),
            correct_option: crate::models::quiz::OPTION_LABELS[correct].to_string(),
            time_limit_seconds: input.time_limit_seconds,
        });
    }

    let mut seen = std::collections::HashSet::new();
    for q in &questions {
        if !seen.insert(q.id.as_str()) {
            return Err(SessionError::InvalidQuiz(format!(
                "duplicate question id {:?}",
                q.id
            )));
        }
    }
    Ok(questions)
}
