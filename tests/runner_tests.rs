use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use uuid::Uuid;

use quizlive_api::models::message::SubmitAnswerPayload;
use quizlive_api::models::quiz::QuestionInput;
use quizlive_api::models::{CreateQuizRequest, Question, ServerMessage, SessionStatus};
use quizlive_api::services::live_session::{LiveOptions, LiveSession};
use quizlive_api::services::registry::{RegistrySettings, SessionRegistry};
use quizlive_api::services::runner;

const HOST_KEY: &str = "host-key";
const TICK: Duration = Duration::from_secs(1);

fn live_session(count: usize, time_limit_seconds: u32) -> LiveSession {
    let questions = (0..count)
        .map(|i| Question {
            id: format!("q{}", i + 1),
            text: format!("Question {}", i + 1),
            image: None,
            options: vec!["Alpha".to_string(), "Beta".to_string()],
            correct_option: "A".to_string(),
            time_limit_seconds,
        })
        .collect();
    LiveSession::new(
        Uuid::new_v4(),
        "Night shift quiz".to_string(),
        HOST_KEY.to_string(),
        questions,
        LiveOptions::default(),
        Utc::now(),
    )
}

async fn next_frame(
    events: &mut tokio::sync::broadcast::Receiver<ServerMessage>,
) -> ServerMessage {
    timeout(Duration::from_secs(120), events.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("event channel closed")
}

#[tokio::test(start_paused = true)]
async fn countdown_runs_the_session_to_completion() {
    let handle = runner::spawn(live_session(1, 2), TICK);
    let mut events = handle.subscribe();

    handle
        .join("u1".to_string(), "Imani".to_string())
        .await
        .unwrap();
    assert_eq!(next_frame(&mut events).await.frame_name(), "participant_update");

    handle.start(HOST_KEY.to_string()).await.unwrap();
    assert_eq!(next_frame(&mut events).await.frame_name(), "quiz_started");

    // The question reaches subscribers before any of its timer updates.
    match next_frame(&mut events).await {
        ServerMessage::Question(q) => {
            assert_eq!(q.question_number, 1);
            assert_eq!(q.total_questions, 1);
        }
        other => panic!("expected question, got {}", other.frame_name()),
    }

    match next_frame(&mut events).await {
        ServerMessage::TimerUpdate(t) => assert_eq!(t.time_remaining, 1),
        other => panic!("expected timer_update, got {}", other.frame_name()),
    }
    match next_frame(&mut events).await {
        ServerMessage::TimerUpdate(t) => assert_eq!(t.time_remaining, 0),
        other => panic!("expected timer_update, got {}", other.frame_name()),
    }
    assert_eq!(next_frame(&mut events).await.frame_name(), "leaderboard_update");
    assert_eq!(next_frame(&mut events).await.frame_name(), "quiz_ended");

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert!(snapshot.ended_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn answers_submitted_between_ticks_are_scored_and_private() {
    let handle = runner::spawn(live_session(1, 5), TICK);
    let mut events = handle.subscribe();

    handle
        .join("u1".to_string(), "Imani".to_string())
        .await
        .unwrap();

    handle.start(HOST_KEY.to_string()).await.unwrap();

    let verdict = handle
        .submit_answer(SubmitAnswerPayload {
            quiz_id: handle.session_id,
            user_id: "u1".to_string(),
            question_id: "q1".to_string(),
            answer: "A".to_string(),
            time_spent: 900,
        })
        .await
        .unwrap();
    assert!(verdict.correct);
    assert_eq!(verdict.total_score, 100);

    // Nothing about the individual answer reaches the broadcast channel.
    let mut saw = Vec::new();
    for _ in 0..4 {
        saw.push(next_frame(&mut events).await.frame_name());
    }
    assert_eq!(
        saw,
        vec!["participant_update", "quiz_started", "question", "timer_update"]
    );

    let board = handle.leaderboard().await.unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].score, 100);
    assert_eq!(board[0].rank, 1);
}

fn one_question_request() -> CreateQuizRequest {
    CreateQuizRequest {
        title: "Triage refresher".to_string(),
        questions: vec![QuestionInput {
            id: None,
            text: "First action on arrival?".to_string(),
            image: None,
            options: vec!["Airway check".to_string(), "Paperwork".to_string()],
            correct_option: "A".to_string(),
            time_limit_seconds: 10,
        }],
    }
}

#[tokio::test]
async fn sweep_evicts_completed_sessions_after_retention() {
    let registry = SessionRegistry::new(RegistrySettings {
        tick_interval: TICK,
        live_options: LiveOptions::default(),
        archive_retention: chrono::Duration::seconds(60),
    });

    let created = registry.create_session(one_question_request()).await.unwrap();
    let handle = registry.get(&created.session_id).await.unwrap();
    handle.end(created.host_key.clone()).await.unwrap();

    // Freshly completed sessions stay queryable.
    assert_eq!(registry.sweep_archived(Utc::now()).await, 0);
    assert!(registry.get(&created.session_id).await.is_ok());

    let later = Utc::now() + chrono::Duration::seconds(61);
    assert_eq!(registry.sweep_archived(later).await, 1);
    assert!(registry.get(&created.session_id).await.is_err());
}

#[tokio::test]
async fn waiting_sessions_are_never_swept() {
    let registry = SessionRegistry::new(RegistrySettings {
        tick_interval: TICK,
        live_options: LiveOptions::default(),
        archive_retention: chrono::Duration::seconds(0),
    });

    let created = registry.create_session(one_question_request()).await.unwrap();
    let far_future = Utc::now() + chrono::Duration::days(7);
    assert_eq!(registry.sweep_archived(far_future).await, 0);
    assert!(registry.get(&created.session_id).await.is_ok());
}
