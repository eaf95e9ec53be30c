use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use quizlive_api::models::message::SubmitAnswerPayload;
use quizlive_api::models::{Question, ServerMessage, SessionStatus};
use quizlive_api::services::live_session::{LiveOptions, LiveSession, SessionError};

const HOST_KEY: &str = "host-key";

fn questions(count: usize, time_limit_seconds: u32) -> Vec<Question> {
    (0..count)
        .map(|i| Question {
            id: format!("q{}", i + 1),
            text: format!("Question {}", i + 1),
            image: None,
            options: vec![
                "Alpha".to_string(),
                "Beta".to_string(),
                "Gamma".to_string(),
            ],
            correct_option: "B".to_string(),
            time_limit_seconds,
        })
        .collect()
}

fn new_session(count: usize, time_limit_seconds: u32) -> LiveSession {
    new_session_with(count, time_limit_seconds, LiveOptions::default())
}

fn new_session_with(count: usize, time_limit_seconds: u32, options: LiveOptions) -> LiveSession {
    LiveSession::new(
        Uuid::new_v4(),
        "Ward round warm-up".to_string(),
        HOST_KEY.to_string(),
        questions(count, time_limit_seconds),
        options,
        Utc::now(),
    )
}

fn submit(
    session: &mut LiveSession,
    user_id: &str,
    question_id: &str,
    answer: &str,
    now: DateTime<Utc>,
) -> Result<(quizlive_api::models::AnswerVerdict, Vec<ServerMessage>), SessionError> {
    session.submit_answer(
        &SubmitAnswerPayload {
            quiz_id: session.session_id(),
            user_id: user_id.to_string(),
            question_id: question_id.to_string(),
            answer: answer.to_string(),
            time_spent: 1_500,
        },
        now,
    )
}

fn frame_names(frames: &[ServerMessage]) -> Vec<&'static str> {
    frames.iter().map(|f| f.frame_name()).collect()
}

/// Runs the countdown to zero, returning the frames of the final tick
/// (timer zero, leaderboard, then next question or quiz end).
fn run_out_clock(
    session: &mut LiveSession,
    time_limit_seconds: u32,
    clock: &mut DateTime<Utc>,
) -> Vec<ServerMessage> {
    let mut last = Vec::new();
    for _ in 0..time_limit_seconds {
        *clock += Duration::seconds(1);
        last = session.tick(*clock);
        assert!(!last.is_empty(), "armed session must broadcast each tick");
    }
    last
}

#[test]
fn join_broadcasts_participant_update() {
    let mut session = new_session(1, 10);
    let now = Utc::now();

    let result = session.join("u1", "Dr. Adeyemi", now).unwrap();

    assert_eq!(frame_names(&result.reply), vec!["joined"]);
    assert_eq!(frame_names(&result.broadcast), vec!["participant_update"]);
    match &result.broadcast[0] {
        ServerMessage::ParticipantUpdate(update) => {
            assert_eq!(update.count, 1);
            assert_eq!(update.participants.len(), 1);
            assert!(update.participants[0].connected);
        }
        other => panic!("expected participant_update, got {:?}", other.frame_name()),
    }
}

#[test]
fn join_after_completion_is_rejected() {
    let mut session = new_session(1, 10);
    let now = Utc::now();
    session.join("u1", "Dr. Adeyemi", now).unwrap();
    session.start(HOST_KEY, now).unwrap();
    session.end(HOST_KEY, now).unwrap();

    let err = session.join("u2", "Dr. Haddad", now).unwrap_err();
    assert_eq!(err, SessionError::Completed);
}

#[test]
fn start_opens_question_one_for_everyone() {
    let mut session = new_session(3, 10);
    let now = Utc::now();
    session.join("u1", "Dr. Adeyemi", now).unwrap();

    let frames = session.start(HOST_KEY, now).unwrap();

    assert_eq!(frame_names(&frames), vec!["quiz_started", "question"]);
    match &frames[1] {
        ServerMessage::Question(q) => {
            assert_eq!(q.question_number, 1);
            assert_eq!(q.total_questions, 3);
            assert_eq!(q.question.time_limit, 10);
        }
        other => panic!("expected question, got {:?}", other.frame_name()),
    }
    assert_eq!(session.status(), SessionStatus::Running);

    assert_eq!(
        session.start(HOST_KEY, now).unwrap_err(),
        SessionError::AlreadyRunning
    );
    assert_eq!(
        session.start("wrong-key", now).unwrap_err(),
        SessionError::InvalidHostKey
    );
}

#[test]
fn second_submission_for_same_question_is_rejected() {
    let mut session = new_session(2, 10);
    let mut clock = Utc::now();
    session.join("u1", "Dr. Adeyemi", clock).unwrap();
    session.start(HOST_KEY, clock).unwrap();

    clock += Duration::milliseconds(800);
    let (verdict, _) = submit(&mut session, "u1", "q1", "B", clock).unwrap();
    assert!(verdict.correct);
    assert_eq!(verdict.points_awarded, 100);

    // A different answer on the second try must not rescore anything.
    clock += Duration::milliseconds(200);
    let err = submit(&mut session, "u1", "q1", "A", clock).unwrap_err();
    assert_eq!(err, SessionError::AlreadyAnswered("q1".to_string()));

    let records = session.responses("u1").unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].answer.as_deref(), Some("B"));
    assert_eq!(records[0].points, 100);
}

#[test]
fn answers_after_window_close_are_rejected() {
    let mut session = new_session(2, 5);
    let mut clock = Utc::now();
    session.join("u1", "Dr. Adeyemi", clock).unwrap();
    session.start(HOST_KEY, clock).unwrap();

    let frames = run_out_clock(&mut session, 5, &mut clock);
    // Window closed: standings go out, then question 2 opens.
    assert_eq!(
        frame_names(&frames),
        vec!["timer_update", "leaderboard_update", "question"]
    );

    let err = submit(&mut session, "u1", "q1", "B", clock).unwrap_err();
    assert_eq!(err, SessionError::WindowClosed("q1".to_string()));
    let board = session.leaderboard_full();
    assert_eq!(board[0].score, 0);
}

#[test]
fn timer_expiry_on_last_question_completes_the_session() {
    let mut session = new_session(1, 3);
    let mut clock = Utc::now();
    session.join("u1", "Dr. Adeyemi", clock).unwrap();
    session.start(HOST_KEY, clock).unwrap();

    let frames = run_out_clock(&mut session, 3, &mut clock);

    assert_eq!(
        frame_names(&frames),
        vec!["timer_update", "leaderboard_update", "quiz_ended"]
    );
    assert_eq!(session.status(), SessionStatus::Completed);

    // Submissions bounce once the session has completed.
    let err = submit(&mut session, "u1", "q1", "B", clock).unwrap_err();
    assert_eq!(err, SessionError::NotRunning);

    // The countdown is gone; nothing fires against a completed session.
    clock += Duration::seconds(1);
    assert!(session.tick(clock).is_empty());
}

#[test]
fn three_participants_over_two_questions() {
    let mut session = new_session(2, 10);
    let mut clock = Utc::now();
    for (user_id, name) in [("p1", "Imani"), ("p2", "Luca"), ("p3", "Wei")] {
        session.join(user_id, name, clock).unwrap();
    }
    session.start(HOST_KEY, clock).unwrap();

    // Everyone answers Q1 correctly within three seconds, at full speed
    // points, in p1 -> p2 -> p3 order.
    for (i, user_id) in ["p1", "p2", "p3"].iter().enumerate() {
        let at = clock + Duration::seconds(i as i64 + 1) - Duration::milliseconds(500);
        let (verdict, _) = submit(&mut session, user_id, "q1", "B", at).unwrap();
        assert!(verdict.correct);
        assert_eq!(verdict.points_awarded, 100);
    }

    run_out_clock(&mut session, 10, &mut clock);

    // Three-way tie on score; earlier cumulative answer time wins.
    let board = session.leaderboard_full();
    assert_eq!(
        board.iter().map(|e| e.user_id.as_str()).collect::<Vec<_>>(),
        vec!["p1", "p2", "p3"]
    );
    assert!(board.iter().all(|e| e.score == 100));
    assert_eq!(board.iter().map(|e| e.rank).collect::<Vec<_>>(), vec![1, 2, 3]);

    // Only p1 and p2 answer Q2; p3 sits it out.
    let at = clock + Duration::milliseconds(700);
    submit(&mut session, "p1", "q2", "B", at).unwrap();
    submit(&mut session, "p2", "q2", "B", at).unwrap();

    let frames = run_out_clock(&mut session, 10, &mut clock);
    assert_eq!(
        frame_names(&frames),
        vec!["timer_update", "leaderboard_update", "quiz_ended"]
    );

    let board = session.leaderboard_full();
    assert_eq!(board.len(), 3);
    assert_eq!(board[0].user_id, "p1");
    assert_eq!(board[0].score, 200);
    assert_eq!(board[1].user_id, "p2");
    assert_eq!(board[1].score, 200);
    // p3's score is frozen at the Q1 result.
    assert_eq!(board[2].user_id, "p3");
    assert_eq!(board[2].score, 100);

    // The absence is recorded against Q2 for the full history.
    let records = session.responses("p3").unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].answer, None);
    assert_eq!(records[1].points, 0);
}

#[test]
fn host_end_mid_question_stops_everything_immediately() {
    let mut session = new_session(5, 20);
    let mut clock = Utc::now();
    session.join("u1", "Dr. Adeyemi", clock).unwrap();
    session.start(HOST_KEY, clock).unwrap();

    clock += Duration::seconds(1);
    session.tick(clock);

    assert_eq!(
        session.end("wrong-key", clock).unwrap_err(),
        SessionError::InvalidHostKey
    );

    let frames = session.end(HOST_KEY, clock).unwrap();
    assert_eq!(frame_names(&frames), vec!["leaderboard_update", "quiz_ended"]);
    assert!(
        !frame_names(&frames).contains(&"question"),
        "no question may follow an early end"
    );
    assert_eq!(session.status(), SessionStatus::Completed);

    // In-flight submissions for the interrupted question are rejected.
    let err = submit(&mut session, "u1", "q1", "B", clock).unwrap_err();
    assert_eq!(err, SessionError::NotRunning);

    clock += Duration::seconds(1);
    assert!(session.tick(clock).is_empty());
}

#[test]
fn speed_scoring_decays_with_the_countdown() {
    let mut session = new_session(1, 10);
    let mut clock = Utc::now();
    session.join("u1", "Imani", clock).unwrap();
    session.join("u2", "Luca", clock).unwrap();
    session.start(HOST_KEY, clock).unwrap();

    let (fast, _) = submit(&mut session, "u1", "q1", "B", clock).unwrap();
    assert_eq!(fast.points_awarded, 100);

    // Three ticks later the bonus has shrunk: 50 + ceil(50 * 7 / 10).
    for _ in 0..3 {
        clock += Duration::seconds(1);
        session.tick(clock);
    }
    let (slow, _) = submit(&mut session, "u2", "q1", "B", clock).unwrap();
    assert_eq!(slow.points_awarded, 85);
}

#[test]
fn unknown_option_is_rejected_without_consuming_the_attempt() {
    let mut session = new_session(1, 10);
    let clock = Utc::now();
    session.join("u1", "Dr. Adeyemi", clock).unwrap();
    session.start(HOST_KEY, clock).unwrap();

    let err = submit(&mut session, "u1", "q1", "Z", clock).unwrap_err();
    assert_eq!(err, SessionError::UnknownOption("Z".to_string()));

    // Option D exists on four-option questions only; this quiz has three.
    let err = submit(&mut session, "u1", "q1", "D", clock).unwrap_err();
    assert_eq!(err, SessionError::UnknownOption("D".to_string()));

    let (verdict, _) = submit(&mut session, "u1", "q1", "a", clock).unwrap();
    assert!(!verdict.correct);
    assert_eq!(verdict.points_awarded, 0);
}

#[test]
fn stale_question_id_is_distinguished_from_closed_window() {
    let mut session = new_session(2, 5);
    let mut clock = Utc::now();
    session.join("u1", "Dr. Adeyemi", clock).unwrap();
    session.start(HOST_KEY, clock).unwrap();

    // Unknown id while q1 is live.
    let err = submit(&mut session, "u1", "q9", "B", clock).unwrap_err();
    assert_eq!(err, SessionError::QuestionNotActive("q9".to_string()));

    run_out_clock(&mut session, 5, &mut clock);

    // q1 is now a closed window, q9 is still simply unknown.
    let err = submit(&mut session, "u1", "q1", "B", clock).unwrap_err();
    assert_eq!(err, SessionError::WindowClosed("q1".to_string()));
    let err = submit(&mut session, "u1", "q9", "B", clock).unwrap_err();
    assert_eq!(err, SessionError::QuestionNotActive("q9".to_string()));
}

#[test]
fn disconnect_keeps_score_and_rejoin_resumes_it() {
    let mut session = new_session(2, 10);
    let mut clock = Utc::now();
    session.join("u1", "Dr. Adeyemi", clock).unwrap();
    session.join("u2", "Dr. Haddad", clock).unwrap();
    session.start(HOST_KEY, clock).unwrap();
    submit(&mut session, "u1", "q1", "B", clock).unwrap();

    let frames = session.disconnect("u1");
    match &frames[0] {
        ServerMessage::ParticipantUpdate(update) => {
            assert_eq!(update.count, 1);
            assert_eq!(update.participants.len(), 2);
        }
        other => panic!("expected participant_update, got {:?}", other.frame_name()),
    }
    // A second disconnect for the same user is a no-op.
    assert!(session.disconnect("u1").is_empty());

    // Still ranked while away.
    assert_eq!(session.leaderboard_full()[0].user_id, "u1");

    clock += Duration::seconds(2);
    let rejoined = session.join("u1", "Dr. Adeyemi", clock).unwrap();
    match &rejoined.reply[0] {
        ServerMessage::Joined(joined) => assert_eq!(joined.score, 100),
        other => panic!("expected joined, got {:?}", other.frame_name()),
    }
    // A mid-question rejoin is caught up with the live state.
    assert_eq!(
        frame_names(&rejoined.reply),
        vec!["joined", "quiz_started", "question", "timer_update"]
    );
}

#[test]
fn early_advance_closes_window_once_everyone_answered() {
    let options = LiveOptions {
        advance_on_all_answered: true,
        ..LiveOptions::default()
    };
    let mut session = new_session_with(2, 30, options);
    let clock = Utc::now();
    session.join("u1", "Imani", clock).unwrap();
    session.join("u2", "Luca", clock).unwrap();
    session.start(HOST_KEY, clock).unwrap();

    let (_, broadcast) = submit(&mut session, "u1", "q1", "B", clock).unwrap();
    assert!(broadcast.is_empty(), "one answer outstanding, window stays open");

    let (_, broadcast) = submit(&mut session, "u2", "q1", "A", clock).unwrap();
    assert_eq!(
        frame_names(&broadcast),
        vec!["timer_update", "leaderboard_update", "question"]
    );
    match &broadcast[0] {
        ServerMessage::TimerUpdate(t) => assert_eq!(t.time_remaining, 0),
        other => panic!("expected timer_update, got {:?}", other.frame_name()),
    }
    match &broadcast[2] {
        ServerMessage::Question(q) => assert_eq!(q.question_number, 2),
        other => panic!("expected question, got {:?}", other.frame_name()),
    }
}
