//! Shared test harness: an in-process server with scripted collaborators.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use switchboard_ai::{AiError, AnswerValidator, ChatStream, TokenStream, TranscriptClassifier};
use switchboard_compliance::CompliancePipeline;
use switchboard_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use switchboard_server::config::RelayMode;
use switchboard_server::observers::ObserverManager;
use switchboard_server::{app, AppState};
use switchboard_session::{
    CallTerminator, ConversationEngine, ConversationRegistry, QuestionnaireEngine, SessionRegistry,
};
use switchboard_telephony::{CallControl, TelephonyError};
use switchboard_types::{
    AnswerVerdict, ComplianceVerdict, Question, QuestionKind, Role, Turn,
};
use tokio::net::TcpListener;

/// Validator that replays a scripted sequence of verdicts.
pub struct ScriptedValidator {
    script: Mutex<VecDeque<Result<AnswerVerdict, AiError>>>,
}

impl ScriptedValidator {
    pub fn new(script: Vec<Result<AnswerVerdict, AiError>>) -> Arc<Self> {
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

/// Chat source that echoes the last user turn in two tokens.
pub struct EchoChat;

#[async_trait]
impl ChatStream for EchoChat {
    async fn stream_reply(&self, turns: &[Turn]) -> Result<TokenStream, AiError> {
        let last_user = turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.clone())
            .unwrap_or_default();
        let stream = async_stream::stream! {
            yield Ok("You said: ".to_string());
            yield Ok(last_user);
        };
        Ok(Box::pin(stream))
    }
}

/// Classifier returning a fixed verdict.
pub struct StaticClassifier {
    pub verdict: ComplianceVerdict,
}

#[async_trait]
impl TranscriptClassifier for StaticClassifier {
    async fn classify(
        &self,
        _transcript: &str,
        _context: &[String],
    ) -> Result<ComplianceVerdict, AiError> {
        Ok(self.verdict.clone())
    }
}

/// Call-control sink that records invocations instead of calling out.
#[derive(Default)]
pub struct RecordingControl {
    pub calls: Mutex<Vec<(String, String)>>,
    pub count: AtomicUsize,
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

pub fn test_pool() -> DbPool {
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

pub fn two_questions() -> Vec<Question> {
    vec![
        Question::new("name", "Could you tell me your name?", QuestionKind::Name),
        Question::new(
            "consent",
            "Do you agree to the recording? Yes or no.",
            QuestionKind::YesNo,
        ),
    ]
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub pool: DbPool,
    pub control: Arc<RecordingControl>,
}

impl TestServer {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

/// Spawns a server with scripted collaborators on an ephemeral port.
pub async fn spawn_server(
    mode: RelayMode,
    validator_script: Vec<Result<AnswerVerdict, AiError>>,
    classifier_verdict: ComplianceVerdict,
) -> TestServer {
    let pool = test_pool();
    let registry = SessionRegistry::new();
    let control = Arc::new(RecordingControl::default());
    let terminator = Arc::new(CallTerminator::new(
        registry.clone(),
        pool.clone(),
        control.clone() as Arc<dyn CallControl>,
    ));
    let questionnaire = Arc::new(QuestionnaireEngine::new(
        registry,
        ScriptedValidator::new(validator_script),
        terminator,
        two_questions(),
        Duration::from_secs(30),
    ));
    let conversation = Arc::new(ConversationEngine::new(
        ConversationRegistry::new(),
        Arc::new(EchoChat),
        "You are a test assistant.",
    ));
    let pipeline = Arc::new(CompliancePipeline::new(Arc::new(StaticClassifier {
        verdict: classifier_verdict,
    })));

    let state = AppState {
        pool: pool.clone(),
        mode,
        questionnaire,
        conversation,
        pipeline,
        observers: ObserverManager::new(),
        ws_url: "wss://relay.test.invalid/ws".to_string(),
        greeting: "Hi! This is the switchboard test greeting.".to_string(),
    };

    let app = app(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    TestServer {
        addr,
        pool,
        control,
    }
}
