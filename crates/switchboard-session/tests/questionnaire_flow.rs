//! Integration tests for the questionnaire state machine: advancement,
//! retry ceiling, validator failure handling, silence timeout, and finalize
//! idempotence.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use switchboard_ai::{AiError, AnswerValidator};
use switchboard_db::{create_pool, load_call_record, run_migrations, DbPool, DbRuntimeSettings};
use switchboard_session::{
    CallTerminator, QuestionnaireEngine, RelaySink, SessionRegistry, COMPLETION_MESSAGE,
    INVALID_ANSWERS_MESSAGE,
};
use switchboard_telephony::{CallControl, TelephonyError};
use switchboard_types::{
    AnswerValue, AnswerVerdict, Question, QuestionKind, SessionStatus, TerminationReason,
    TextFrame,
};
use tokio::sync::mpsc;

/// Validator that replays a scripted sequence of verdicts.
struct ScriptedValidator {
    script: Mutex<VecDeque<Result<AnswerVerdict, AiError>>>,
}

impl ScriptedValidator {
    fn new(script: Vec<Result<AnswerVerdict, AiError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
        })
    }
}

#[async_trait]
impl AnswerValidator for ScriptedValidator {
    async fn validate_answer(
        &self,
        _question: &Question,
        _raw_answer: &str,
    ) -> Result<AnswerVerdict, AiError> {
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .expect("validator script exhausted")
    }
}

/// Call-control sink that records invocations instead of calling out.
#[derive(Default)]
struct RecordingControl {
    calls: Mutex<Vec<(String, String)>>,
    count: AtomicUsize,
}

#[async_trait]
impl CallControl for RecordingControl {
    async fn end_call(&self, call_sid: &str, spoken_text: &str) -> Result<(), TelephonyError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .expect("calls lock")
            .push((call_sid.to_string(), spoken_text.to_string()));
        Ok(())
    }
}

fn test_pool() -> DbPool {
    let db_file = tempfile::NamedTempFile::new().expect("temp db file");
    let db_path = db_file.path().to_str().expect("utf-8 path").to_string();
    // Leak the tempfile so it persists for the duration of the test.
    std::mem::forget(db_file);

    let pool = create_pool(&db_path, DbRuntimeSettings::default()).expect("pool");
    {
        let conn = pool.get().expect("conn");
        run_migrations(&conn).expect("migrations");
    }
    pool
}

fn two_questions() -> Vec<Question> {
    vec![
        Question::new("name", "Could you tell me your name?", QuestionKind::Name),
        Question::new(
            "consent",
            "Do you agree to the recording? Yes or no.",
            QuestionKind::YesNo,
        ),
    ]
}

struct Harness {
    engine: QuestionnaireEngine,
    registry: SessionRegistry,
    pool: DbPool,
    control: Arc<RecordingControl>,
    sink: RelaySink,
    rx: mpsc::Receiver<String>,
}

fn harness(
    questions: Vec<Question>,
    script: Vec<Result<AnswerVerdict, AiError>>,
    silence_timeout: Duration,
) -> Harness {
    let pool = test_pool();
    let registry = SessionRegistry::new();
    let control = Arc::new(RecordingControl::default());
    let terminator = Arc::new(CallTerminator::new(
        registry.clone(),
        pool.clone(),
        control.clone() as Arc<dyn CallControl>,
    ));
    let engine = QuestionnaireEngine::new(
        registry.clone(),
        ScriptedValidator::new(script),
        terminator,
        questions,
        silence_timeout,
    );

    let (tx, rx) = mpsc::channel(64);
    Harness {
        engine,
        registry,
        pool,
        control,
        sink: RelaySink::new(tx),
        rx,
    }
}

/// Collects one spoken turn: the partial tokens up to and including the
/// terminal frame, concatenated.
async fn spoken_turn(rx: &mut mpsc::Receiver<String>) -> String {
    let mut text = String::new();
    loop {
        let raw = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("channel closed");
        let frame: TextFrame = serde_json::from_str(&raw).expect("valid frame json");
        if frame.last {
            return text;
        }
        text.push_str(&frame.token);
    }
}

#[tokio::test]
async fn valid_answer_advances_and_stores() {
    let mut h = harness(
        two_questions(),
        vec![Ok(AnswerVerdict::Valid(AnswerValue::Text("Dana".into())))],
        Duration::from_secs(30),
    );

    h.engine.on_setup("A", &h.sink).await;
    assert_eq!(spoken_turn(&mut h.rx).await, "Could you tell me your name?");

    h.engine.on_prompt("A", "My name is Dana", &h.sink).await;
    assert_eq!(
        spoken_turn(&mut h.rx).await,
        "Do you agree to the recording? Yes or no."
    );

    let snapshot = h.registry.snapshot("A").await.expect("session exists");
    assert_eq!(snapshot.question_index, 1);
    assert_eq!(snapshot.invalid_attempts, 0);
    assert_eq!(
        snapshot.answers.get("name"),
        Some(&AnswerValue::Text("Dana".into()))
    );
    assert_eq!(snapshot.status, SessionStatus::InProgress);
}

#[tokio::test]
async fn completing_every_question_finalizes_once() {
    let mut h = harness(
        two_questions(),
        vec![
            Ok(AnswerVerdict::Valid(AnswerValue::Text("Dana".into()))),
            Ok(AnswerVerdict::Valid(AnswerValue::Text("yes".into()))),
        ],
        Duration::from_secs(30),
    );

    h.engine.on_setup("A", &h.sink).await;
    let _ = spoken_turn(&mut h.rx).await;
    h.engine.on_prompt("A", "Dana", &h.sink).await;
    let _ = spoken_turn(&mut h.rx).await;
    h.engine.on_prompt("A", "yes please", &h.sink).await;

    let snapshot = h.registry.snapshot("A").await.expect("session exists");
    assert!(snapshot.terminated);
    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert_eq!(snapshot.termination_reason, TerminationReason::Completed);

    let conn = h.pool.get().expect("conn");
    let record = load_call_record(&conn, "A")
        .expect("load")
        .expect("record exists");
    assert_eq!(record.status, SessionStatus::Completed);
    assert_eq!(record.answers.get("name"), Some(&AnswerValue::Text("Dana".into())));
    assert_eq!(record.answers.get("consent"), Some(&AnswerValue::Text("yes".into())));

    assert_eq!(h.control.count.load(Ordering::SeqCst), 1);
    let calls = h.control.calls.lock().expect("calls lock");
    assert_eq!(calls[0], ("A".to_string(), COMPLETION_MESSAGE.to_string()));
}

#[tokio::test]
async fn three_invalid_answers_terminate_with_one_record() {
    let mut h = harness(
        two_questions(),
        vec![
            Ok(AnswerVerdict::Invalid { feedback: None }),
            Ok(AnswerVerdict::Invalid {
                feedback: Some("Please just give me a name.".into()),
            }),
            Ok(AnswerVerdict::Invalid { feedback: None }),
        ],
        Duration::from_secs(30),
    );

    h.engine.on_setup("B", &h.sink).await;
    let _ = spoken_turn(&mut h.rx).await;

    h.engine.on_prompt("B", "mumble", &h.sink).await;
    let retry = spoken_turn(&mut h.rx).await;
    assert!(retry.ends_with("Could you tell me your name?"));
    assert_eq!(
        h.registry.snapshot("B").await.expect("session").invalid_attempts,
        1
    );

    h.engine.on_prompt("B", "mumble", &h.sink).await;
    let retry = spoken_turn(&mut h.rx).await;
    assert!(retry.starts_with("Please just give me a name."));

    h.engine.on_prompt("B", "mumble", &h.sink).await;

    let snapshot = h.registry.snapshot("B").await.expect("session exists");
    assert!(snapshot.terminated);
    assert_eq!(snapshot.status, SessionStatus::Terminated);
    assert_eq!(snapshot.termination_reason, TerminationReason::InvalidAnswers);
    assert_eq!(snapshot.invalid_attempts, 3, "attempts never exceed the ceiling");

    let conn = h.pool.get().expect("conn");
    let record = load_call_record(&conn, "B")
        .expect("load")
        .expect("record persisted");
    assert_eq!(record.termination_reason, TerminationReason::InvalidAnswers);

    assert_eq!(h.control.count.load(Ordering::SeqCst), 1);
    let calls = h.control.calls.lock().expect("calls lock");
    assert_eq!(calls[0].1, INVALID_ANSWERS_MESSAGE);
}

#[tokio::test]
async fn validator_failure_reasks_without_consuming_an_attempt() {
    let mut h = harness(
        two_questions(),
        vec![
            Err(AiError::Provider("upstream 500".into())),
            Ok(AnswerVerdict::Valid(AnswerValue::Text("Dana".into()))),
        ],
        Duration::from_secs(30),
    );

    h.engine.on_setup("C", &h.sink).await;
    let _ = spoken_turn(&mut h.rx).await;

    h.engine.on_prompt("C", "Dana", &h.sink).await;
    let spoken = spoken_turn(&mut h.rx).await;
    assert!(spoken.ends_with("Could you tell me your name?"));

    let snapshot = h.registry.snapshot("C").await.expect("session exists");
    assert_eq!(snapshot.invalid_attempts, 0, "errors are not invalid attempts");
    assert_eq!(snapshot.question_index, 0, "errors do not advance");

    // The same question accepts a valid answer afterwards.
    h.engine.on_prompt("C", "Dana", &h.sink).await;
    let snapshot = h.registry.snapshot("C").await.expect("session exists");
    assert_eq!(snapshot.question_index, 1);
}

#[tokio::test]
async fn silence_timeout_terminates_the_call() {
    let mut h = harness(two_questions(), vec![], Duration::from_millis(100));

    h.engine.on_setup("D", &h.sink).await;
    let _ = spoken_turn(&mut h.rx).await;

    tokio::time::sleep(Duration::from_millis(400)).await;

    let snapshot = h.registry.snapshot("D").await.expect("session exists");
    assert!(snapshot.terminated);
    assert_eq!(snapshot.termination_reason, TerminationReason::Silence);

    let conn = h.pool.get().expect("conn");
    let record = load_call_record(&conn, "D")
        .expect("load")
        .expect("record persisted");
    assert_eq!(record.status, SessionStatus::Terminated);
    assert_eq!(record.termination_reason, TerminationReason::Silence);
    assert_eq!(h.control.count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn prompt_resets_the_silence_clock() {
    let mut h = harness(
        two_questions(),
        vec![Ok(AnswerVerdict::Valid(AnswerValue::Text("Dana".into())))],
        Duration::from_millis(500),
    );

    h.engine.on_setup("E", &h.sink).await;
    let _ = spoken_turn(&mut h.rx).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    h.engine.on_prompt("E", "Dana", &h.sink).await;
    let _ = spoken_turn(&mut h.rx).await;

    // 600ms after setup, but only 300ms after the prompt: still alive.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let snapshot = h.registry.snapshot("E").await.expect("session exists");
    assert!(!snapshot.terminated, "prompt must re-arm the watchdog");

    tokio::time::sleep(Duration::from_millis(500)).await;
    let snapshot = h.registry.snapshot("E").await.expect("session exists");
    assert!(snapshot.terminated);
    assert_eq!(snapshot.termination_reason, TerminationReason::Silence);
}

#[tokio::test]
async fn disconnect_cancels_the_watchdog() {
    let mut h = harness(two_questions(), vec![], Duration::from_millis(100));

    h.engine.on_setup("F", &h.sink).await;
    let _ = spoken_turn(&mut h.rx).await;
    h.engine.on_disconnect("F").await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!h.registry.contains("F").await);
    assert_eq!(
        h.control.count.load(Ordering::SeqCst),
        0,
        "no termination side effect after cleanup"
    );
}

#[tokio::test]
async fn prompt_without_setup_is_a_guarded_noop() {
    let mut h = harness(two_questions(), vec![], Duration::from_secs(30));

    h.engine.on_prompt("ghost", "hello", &h.sink).await;
    h.engine.on_interrupt("ghost", "hello").await;

    assert!(h.rx.try_recv().is_err(), "no frames for unbound calls");
    assert!(!h.registry.contains("ghost").await);
}

#[tokio::test]
async fn terminated_session_absorbs_further_prompts() {
    let mut h = harness(
        vec![two_questions().remove(0)],
        vec![Ok(AnswerVerdict::Valid(AnswerValue::Text("Dana".into())))],
        Duration::from_secs(30),
    );

    h.engine.on_setup("G", &h.sink).await;
    let _ = spoken_turn(&mut h.rx).await;
    h.engine.on_prompt("G", "Dana", &h.sink).await;

    let snapshot = h.registry.snapshot("G").await.expect("session exists");
    assert!(snapshot.terminated);
    assert_eq!(snapshot.status, SessionStatus::Completed);

    // A late prompt against the latched session must not reach the
    // validator (the script is exhausted) nor speak anything.
    h.engine.on_prompt("G", "anything", &h.sink).await;
    assert!(h.rx.try_recv().is_err());
    assert_eq!(h.control.count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn finalize_is_idempotent() {
    let pool = test_pool();
    let registry = SessionRegistry::new();
    let control = Arc::new(RecordingControl::default());
    let terminator = CallTerminator::new(
        registry.clone(),
        pool.clone(),
        control.clone() as Arc<dyn CallControl>,
    );

    registry.create("I").await;

    let first = terminator
        .finalize(
            "I",
            COMPLETION_MESSAGE,
            SessionStatus::Completed,
            TerminationReason::Completed,
            None,
        )
        .await
        .expect("first finalize");
    assert!(first, "first invocation sets the latch");

    let second = terminator
        .finalize(
            "I",
            INVALID_ANSWERS_MESSAGE,
            SessionStatus::Terminated,
            TerminationReason::InvalidAnswers,
            None,
        )
        .await
        .expect("second finalize");
    assert!(!second, "second invocation is absorbed");

    let conn = pool.get().expect("conn");
    let record = load_call_record(&conn, "I")
        .expect("load")
        .expect("exactly one record exists");
    assert_eq!(record.status, SessionStatus::Completed);
    assert_eq!(record.termination_reason, TerminationReason::Completed);

    assert_eq!(
        control.count.load(Ordering::SeqCst),
        1,
        "at most one call-control invocation"
    );
}

#[tokio::test]
async fn setup_on_reused_identifier_restarts_fresh() {
    let mut h = harness(
        vec![two_questions().remove(0)],
        vec![Ok(AnswerVerdict::Valid(AnswerValue::Text("Dana".into())))],
        Duration::from_secs(30),
    );

    h.engine.on_setup("H", &h.sink).await;
    let _ = spoken_turn(&mut h.rx).await;
    h.engine.on_prompt("H", "Dana", &h.sink).await;
    assert!(h.registry.snapshot("H").await.expect("session").terminated);

    h.engine.on_setup("H", &h.sink).await;
    assert_eq!(spoken_turn(&mut h.rx).await, "Could you tell me your name?");
    let snapshot = h.registry.snapshot("H").await.expect("session exists");
    assert!(!snapshot.terminated);
    assert_eq!(snapshot.question_index, 0);
}
