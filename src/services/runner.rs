use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::metrics::FRAMES_BROADCAST_TOTAL;
use crate::models::message::SubmitAnswerPayload;
use crate::models::{AnswerRecord, AnswerVerdict, ServerMessage, SessionSnapshot};

use super::leaderboard::LeaderboardEntry;
use super::live_session::{JoinResult, LiveSession, SessionError};

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

/// Commands a connection or REST handler may send to a session task.
/// Replies that must stay private travel on the oneshot channels here;
/// everything else is broadcast.
pub enum SessionCommand {
    Join {
        user_id: String,
        username: String,
        reply: oneshot::Sender<Result<Vec<ServerMessage>, SessionError>>,
    },
    Disconnect {
        user_id: String,
    },
    Start {
        host_key: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    End {
        host_key: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    SubmitAnswer {
        payload: SubmitAnswerPayload,
        reply: oneshot::Sender<Result<AnswerVerdict, SessionError>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Leaderboard {
        reply: oneshot::Sender<Vec<LeaderboardEntry>>,
    },
    Responses {
        user_id: String,
        reply: oneshot::Sender<Result<Vec<AnswerRecord>, SessionError>>,
    },
}

/// Cheap handle to a running session task.
#[derive(Clone)]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub commands: mpsc::Sender<SessionCommand>,
    pub events: broadcast::Sender<ServerMessage>,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| SessionError::NotFound)?;
        rx.await.map_err(|_| SessionError::NotFound)
    }

    pub async fn join(
        &self,
        user_id: String,
        username: String,
    ) -> Result<Vec<ServerMessage>, SessionError> {
        self.request(|reply| SessionCommand::Join {
            user_id,
            username,
            reply,
        })
        .await?
    }

    pub async fn disconnect(&self, user_id: String) {
        let _ = self
            .commands
            .send(SessionCommand::Disconnect { user_id })
            .await;
    }

    pub async fn start(&self, host_key: String) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Start { host_key, reply })
            .await?
    }

    pub async fn end(&self, host_key: String) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::End { host_key, reply })
            .await?
    }

    pub async fn submit_answer(
        &self,
        payload: SubmitAnswerPayload,
    ) -> Result<AnswerVerdict, SessionError> {
        self.request(|reply| SessionCommand::SubmitAnswer { payload, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, SessionError> {
        self.request(|reply| SessionCommand::Leaderboard { reply })
            .await
    }

    pub async fn responses(&self, user_id: String) -> Result<Vec<AnswerRecord>, SessionError> {
        self.request(|reply| SessionCommand::Responses { user_id, reply })
            .await?
    }
}

/// Spawns the single-writer task that owns a session's state and timer.
pub fn spawn(session: LiveSession, tick_interval: Duration) -> SessionHandle {
    let session_id = session.session_id();
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let handle = SessionHandle {
        session_id,
        commands: cmd_tx,
        events: event_tx.clone(),
    };
    tokio::spawn(run(session, cmd_rx, event_tx, tick_interval));
    handle
}

async fn run(
    mut session: LiveSession,
    mut commands: mpsc::Receiver<SessionCommand>,
    events: broadcast::Sender<ServerMessage>,
    tick_interval: Duration,
) {
    let session_id = session.session_id();
    tracing::debug!("Session task started: session={}", session_id);

    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(command) => handle_command(&mut session, command, &events, &mut ticker),
                    // Registry dropped the handle and every connection is
                    // gone; nothing can reach this session any more.
                    None => break,
                }
            }
            _ = ticker.tick(), if session.tick_armed() => {
                broadcast_frames(&events, session.tick(Utc::now()));
            }
        }
    }

    tracing::debug!("Session task stopped: session={}", session_id);
}

fn handle_command(
    session: &mut LiveSession,
    command: SessionCommand,
    events: &broadcast::Sender<ServerMessage>,
    ticker: &mut tokio::time::Interval,
) {
    match command {
        SessionCommand::Join {
            user_id,
            username,
            reply,
        } => {
            let result = session.join(&user_id, &username, Utc::now());
            match result {
                Ok(JoinResult {
                    reply: frames,
                    broadcast,
                }) => {
                    let _ = reply.send(Ok(frames));
                    broadcast_frames(events, broadcast);
                }
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            }
        }
        SessionCommand::Disconnect { user_id } => {
            broadcast_frames(events, session.disconnect(&user_id));
        }
        SessionCommand::Start { host_key, reply } => {
            match session.start(&host_key, Utc::now()) {
                Ok(frames) => {
                    // Align the first tick with the question going out.
                    ticker.reset();
                    let _ = reply.send(Ok(()));
                    broadcast_frames(events, frames);
                }
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            }
        }
        SessionCommand::End { host_key, reply } => match session.end(&host_key, Utc::now()) {
            Ok(frames) => {
                let _ = reply.send(Ok(()));
                broadcast_frames(events, frames);
            }
            Err(err) => {
                let _ = reply.send(Err(err));
            }
        },
        SessionCommand::SubmitAnswer { payload, reply } => {
            match session.submit_answer(&payload, Utc::now()) {
                Ok((verdict, broadcast)) => {
                    if !broadcast.is_empty() {
                        // Early advance closed the window; restart the
                        // cadence for the next question.
                        ticker.reset();
                    }
                    let _ = reply.send(Ok(verdict));
                    broadcast_frames(events, broadcast);
                }
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            }
        }
        SessionCommand::Snapshot { reply } => {
            let _ = reply.send(session.snapshot());
        }
        SessionCommand::Leaderboard { reply } => {
            let _ = reply.send(session.leaderboard_full());
        }
        SessionCommand::Responses { user_id, reply } => {
            let _ = reply.send(session.responses(&user_id));
        }
    }
}

fn broadcast_frames(events: &broadcast::Sender<ServerMessage>, frames: Vec<ServerMessage>) {
    for frame in frames {
        FRAMES_BROADCAST_TOTAL
            .with_label_values(&[frame.frame_name()])
            .inc();
        // send only fails when no connection is subscribed; frames are
        // moment-in-time state, so that is fine to drop.
        let _ = events.send(frame);
    }
}
