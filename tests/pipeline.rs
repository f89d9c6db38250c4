//! End-to-end tests of the session controller with fake model services.
//!
//! `CountingEmbedder` embeds text as keyword counts and records every call;
//! `ScriptedChat` answers from a queue and records every request, so the
//! tests can assert exactly what reached each external service.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use healthdoc::config::Config;
use healthdoc::console::{ConsoleEvent, MemoryConsole};
use healthdoc::controller::{ProcessError, SessionController, Submission};
use healthdoc::embedding::EmbeddingProvider;
use healthdoc::http::ServiceError;
use healthdoc::index::CacheStatus;
use healthdoc::llm::{ChatError, ChatMessage, ChatModel, Role};
use healthdoc::models::{Speaker, UploadedFile};
use healthdoc::session::SessionError;

const KEYWORDS: &[&str] = &["metformin", "cholesterol", "allergy", "pressure"];

#[derive(Default)]
struct CountingEmbedder {
    calls: AtomicUsize,
    texts: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    fn model_name(&self) -> &str {
        "counting"
    }
    fn dims(&self) -> usize {
        KEYWORDS.len()
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                KEYWORDS
                    .iter()
                    .map(|k| lower.matches(k).count() as f32 + 0.01)
                    .collect()
            })
            .collect())
    }
}

/// Replies from a queue; an empty queue means the service is down.
#[derive(Default)]
struct ScriptedChat {
    replies: Mutex<VecDeque<Result<String, ChatError>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChat {
    fn reply(&self, text: &str) {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
    }
    fn fail(&self, err: ChatError) {
        self.replies.lock().unwrap().push_back(Err(err));
    }
    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
    fn last_request(&self) -> Vec<ChatMessage> {
        self.requests.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn model_name(&self) -> &str {
        "scripted"
    }
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ChatError::Transport("no scripted reply".to_string())))
    }
}

struct Harness {
    controller: SessionController,
    embedder: Arc<CountingEmbedder>,
    chat: Arc<ScriptedChat>,
    console: MemoryConsole,
}

fn harness_with(config: Config) -> Harness {
    let embedder = Arc::new(CountingEmbedder::default());
    let chat = Arc::new(ScriptedChat::default());
    let console = MemoryConsole::new();
    let controller = SessionController::new(
        config,
        embedder.clone(),
        chat.clone(),
        Box::new(console.clone()),
    );
    Harness {
        controller,
        embedder,
        chat,
        console,
    }
}

fn harness() -> Harness {
    harness_with(Config::default())
}

fn records() -> Vec<UploadedFile> {
    vec![
        UploadedFile::new(
            "meds.txt",
            "Current medication: metformin 500mg twice daily with meals.\n\n",
        ),
        UploadedFile::new(
            "labs.txt",
            "Lipid panel: total cholesterol 190 mg/dL, LDL 110.\n\n",
        ),
        UploadedFile::new("allergies.txt", "Known allergy: penicillin (rash).\n"),
    ]
}

fn warnings(console: &MemoryConsole) -> Vec<String> {
    console
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ConsoleEvent::Warning(msg) => Some(msg),
            _ => None,
        })
        .collect()
}

fn errors(console: &MemoryConsole) -> Vec<String> {
    console
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ConsoleEvent::Error(msg) => Some(msg),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn submit_without_session_warns_and_calls_nothing() {
    let mut h = harness();

    let outcome = h.controller.submit("What is my dose?").await.unwrap();

    assert!(matches!(outcome, Submission::NoSession));
    assert!(!h.controller.has_session());
    assert!(h.controller.history().is_empty());
    assert_eq!(h.chat.request_count(), 0);
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(warnings(&h.console).len(), 1);
}

#[tokio::test]
async fn empty_file_list_reports_no_extractable_text() {
    let mut h = harness();

    let err = h.controller.process(Vec::new()).await.unwrap_err();

    assert!(matches!(err, ProcessError::NoExtractableText));
    assert!(!h.controller.has_session());
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(errors(&h.console).len(), 1);
}

#[tokio::test]
async fn only_failing_files_report_each_failure_and_no_text() {
    let mut h = harness();
    let files = vec![
        UploadedFile::new("scan.png", vec![0u8; 8]),
        UploadedFile::new("broken.pdf", b"nope".to_vec()),
    ];

    let err = h.controller.process(files).await.unwrap_err();

    assert!(matches!(err, ProcessError::NoExtractableText));
    let errs = errors(&h.console);
    assert_eq!(errs.len(), 3);
    assert!(errs[0].contains("scan.png"));
    assert!(errs[1].contains("broken.pdf"));
    assert!(errs[2].contains("could not extract text"));
}

#[tokio::test]
async fn process_builds_a_session() {
    let mut h = harness();

    let report = h.controller.process(records()).await.unwrap();

    assert!(h.controller.has_session());
    assert_eq!(report.files_read, 3);
    assert!(report.failures.is_empty());
    assert_eq!(report.chunks, 1);
    assert_eq!(report.cache, CacheStatus::Built);
    assert_eq!(h.embedder.texts.load(Ordering::SeqCst), 1);
    assert!(h.console.events().iter().any(|e| matches!(
        e,
        ConsoleEvent::Processed {
            files: 3,
            chunks: 1,
            cached: false,
            ..
        }
    )));
}

#[tokio::test]
async fn reprocessing_identical_documents_reuses_the_index() {
    let mut h = harness();

    h.controller.process(records()).await.unwrap();
    let calls_after_first = h.embedder.calls.load(Ordering::SeqCst);
    assert!(calls_after_first > 0);

    let report = h.controller.process(records()).await.unwrap();

    assert_eq!(report.cache, CacheStatus::Hit);
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), calls_after_first);
}

#[tokio::test]
async fn ask_appends_user_then_assistant() {
    let mut h = harness();
    h.controller.process(records()).await.unwrap();
    h.chat.reply("You take metformin 500mg twice daily.");

    let outcome = h.controller.submit("What is my metformin dose?").await.unwrap();

    let Submission::Answered(reply) = outcome else {
        panic!("expected an answer");
    };
    assert_eq!(reply.answer, "You take metformin 500mg twice daily.");
    assert_eq!(reply.history.len(), 2);
    assert_eq!(reply.history[0].speaker, Speaker::User);
    assert_eq!(reply.history[0].text, "What is my metformin dose?");
    assert_eq!(reply.history[1].speaker, Speaker::Assistant);
    assert_eq!(h.controller.history(), reply.history.as_slice());
    assert!(!reply.sources.is_empty());
    for source in &reply.sources {
        assert!(uuid::Uuid::parse_str(&source.chunk_id).is_ok());
    }

    // First question: no condensing, one chat call carrying the context.
    assert_eq!(h.chat.request_count(), 1);
    let request = h.chat.last_request();
    assert_eq!(request[0].role, Role::System);
    assert!(request[0].content.contains("metformin 500mg"));
    assert_eq!(
        request.last().unwrap(),
        &ChatMessage::user("What is my metformin dose?")
    );
}

#[tokio::test]
async fn follow_up_is_condensed_and_history_resent() {
    let mut h = harness();
    h.controller.process(records()).await.unwrap();
    h.chat.reply("Penicillin.");
    h.controller.submit("What am I allergic to?").await.unwrap();

    h.chat.reply("What reaction does the penicillin allergy cause?");
    h.chat.reply("A rash.");
    let outcome = h.controller.submit("What reaction?").await.unwrap();

    let Submission::Answered(reply) = outcome else {
        panic!("expected an answer");
    };
    assert_eq!(reply.answer, "A rash.");
    assert_eq!(reply.history.len(), 4);
    // One call for the first question, two (condense + answer) for the follow-up.
    assert_eq!(h.chat.request_count(), 3);

    let request = h.chat.last_request();
    assert_eq!(request.len(), 4);
    assert_eq!(request[1], ChatMessage::user("What am I allergic to?"));
    assert_eq!(request[2], ChatMessage::assistant("Penicillin."));
    assert_eq!(request[3], ChatMessage::user("What reaction?"));
}

#[tokio::test]
async fn condensing_can_be_disabled() {
    let mut config = Config::default();
    config.chat.condense_question = false;
    let mut h = harness_with(config);
    h.controller.process(records()).await.unwrap();

    h.chat.reply("first");
    h.chat.reply("second");
    h.controller.submit("one").await.unwrap();
    h.controller.submit("two").await.unwrap();

    assert_eq!(h.chat.request_count(), 2);
    assert_eq!(h.controller.history().len(), 4);
}

#[tokio::test]
async fn chat_failure_keeps_history_and_surfaces_error() {
    let mut h = harness();
    h.controller.process(records()).await.unwrap();
    h.chat.reply("Penicillin.");
    h.controller.submit("What am I allergic to?").await.unwrap();
    let before = h.controller.history().to_vec();

    h.chat.fail(ChatError::RateLimited("slow down".to_string()));
    let err = h.controller.submit("Anything else?").await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Chat(ServiceError::RateLimited(_))
    ));
    assert_eq!(h.controller.history(), before.as_slice());
    assert!(errors(&h.console)
        .iter()
        .any(|e| e.contains("chat model failed")));
}

/// Embeds like `CountingEmbedder` until switched off.
#[derive(Default)]
struct SwitchableEmbedder {
    inner: CountingEmbedder,
    down: AtomicBool,
}

#[async_trait]
impl EmbeddingProvider for SwitchableEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
    fn dims(&self) -> usize {
        self.inner.dims()
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(ServiceError::Api {
                status: 503,
                body: "embedding service unavailable".to_string(),
            });
        }
        self.inner.embed(texts).await
    }
}

#[tokio::test]
async fn retrieval_failure_keeps_history_and_surfaces_error() {
    let embedder = Arc::new(SwitchableEmbedder::default());
    let chat = Arc::new(ScriptedChat::default());
    let console = MemoryConsole::new();
    let mut controller = SessionController::new(
        Config::default(),
        embedder.clone(),
        chat.clone(),
        Box::new(console.clone()),
    );
    controller.process(records()).await.unwrap();

    embedder.down.store(true, Ordering::SeqCst);
    let err = controller.submit("What is my metformin dose?").await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Retrieval(ServiceError::Api { status: 503, .. })
    ));
    assert!(controller.has_session());
    assert!(controller.history().is_empty());
    assert_eq!(chat.request_count(), 0);
    assert!(errors(&console).iter().any(|e| e.contains("retrieval failed")));
}

#[tokio::test]
async fn condense_failure_keeps_history_and_surfaces_error() {
    let mut h = harness();
    h.controller.process(records()).await.unwrap();
    h.chat.reply("Penicillin.");
    h.controller.submit("What am I allergic to?").await.unwrap();
    let before = h.controller.history().to_vec();
    let embed_calls = h.embedder.calls.load(Ordering::SeqCst);

    h.chat.fail(ChatError::Timeout);
    let err = h.controller.submit("What reaction?").await.unwrap_err();

    assert!(matches!(err, SessionError::Chat(ServiceError::Timeout)));
    assert_eq!(h.controller.history().len(), 2);
    assert_eq!(h.controller.history(), before.as_slice());
    // The condense call failed, so nothing was retrieved or answered.
    assert_eq!(h.chat.request_count(), 2);
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), embed_calls);
}

#[tokio::test]
async fn empty_question_is_rejected_before_any_call() {
    let mut h = harness();
    h.controller.process(records()).await.unwrap();
    let embed_calls = h.embedder.calls.load(Ordering::SeqCst);

    let err = h.controller.submit("   ").await.unwrap_err();

    assert!(matches!(err, SessionError::EmptyQuestion));
    assert_eq!(h.chat.request_count(), 0);
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), embed_calls);
    assert!(h.controller.history().is_empty());
}

#[tokio::test]
async fn rendered_history_puts_user_on_even_indices() {
    let mut h = harness();
    h.controller.process(records()).await.unwrap();
    h.chat.reply("a1");
    h.controller.submit("q1").await.unwrap();
    h.chat.reply("standalone q2");
    h.chat.reply("a2");
    h.console.clear();
    h.controller.submit("q2").await.unwrap();

    let turns: Vec<(usize, Speaker, String)> = h
        .console
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ConsoleEvent::Turn {
                index,
                speaker,
                text,
                ..
            } => Some((index, speaker, text)),
            _ => None,
        })
        .collect();

    assert_eq!(turns.len(), 4);
    let stamps: Vec<_> = h
        .console
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ConsoleEvent::Turn { at, .. } => Some(at),
            _ => None,
        })
        .collect();
    let history_stamps: Vec<_> = h.controller.history().iter().map(|t| t.at).collect();
    assert_eq!(stamps, history_stamps);
    for (i, (index, speaker, _)) in turns.iter().enumerate() {
        assert_eq!(*index, i);
        let expected = if i % 2 == 0 {
            Speaker::User
        } else {
            Speaker::Assistant
        };
        assert_eq!(*speaker, expected);
    }
    assert_eq!(turns[3].2, "a2");
}

#[tokio::test]
async fn processing_new_documents_replaces_the_session() {
    let mut h = harness();
    h.controller.process(records()).await.unwrap();
    h.chat.reply("answer");
    h.controller.submit("question").await.unwrap();
    assert_eq!(h.controller.history().len(), 2);

    let report = h
        .controller
        .process(vec![UploadedFile::new(
            "bp.txt",
            "Blood pressure 128/82 at rest.",
        )])
        .await
        .unwrap();

    assert_eq!(report.cache, CacheStatus::Built);
    assert!(h.controller.history().is_empty());
}

#[tokio::test]
async fn failed_reprocess_keeps_the_existing_session() {
    let mut h = harness();
    h.controller.process(records()).await.unwrap();
    h.chat.reply("answer");
    h.controller.submit("question").await.unwrap();

    let err = h
        .controller
        .process(vec![UploadedFile::new("blank.txt", "   ")])
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::NoExtractableText));
    assert!(h.controller.has_session());
    assert_eq!(h.controller.history().len(), 2);
}

#[tokio::test]
async fn retrieval_uses_top_k_from_config() {
    let mut config = Config::default();
    config.chunking.chunk_size = 80;
    config.chunking.chunk_overlap = 10;
    config.retrieval.top_k = 2;
    let mut h = harness_with(config);

    let report = h.controller.process(records()).await.unwrap();
    assert!(report.chunks > 2);

    h.chat.reply("LDL 110.");
    let Submission::Answered(reply) = h.controller.submit("cholesterol?").await.unwrap() else {
        panic!("expected an answer");
    };
    assert_eq!(reply.sources.len(), 2);
    assert!(reply.sources[0].text.contains("cholesterol"));
}

#[tokio::test]
async fn embedding_failure_during_process_is_an_index_error() {
    struct DownEmbedder;

    #[async_trait]
    impl EmbeddingProvider for DownEmbedder {
        fn model_name(&self) -> &str {
            "down"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
            Err(ServiceError::Unauthorized { status: 401 })
        }
    }

    let console = MemoryConsole::new();
    let mut controller = SessionController::new(
        Config::default(),
        Arc::new(DownEmbedder),
        Arc::new(ScriptedChat::default()),
        Box::new(console.clone()),
    );

    let err = controller.process(records()).await.unwrap_err();

    assert!(matches!(err, ProcessError::Index(_)));
    assert!(!controller.has_session());
    assert_eq!(errors(&console).len(), 1);
}
