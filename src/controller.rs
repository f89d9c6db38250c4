//! The session controller: documents in, conversation out.
//!
//! [`SessionController`] owns at most one [`RetrievalChatSession`] plus
//! the [`IndexCache`] that outlives it. It is a plain value: the caller
//! owns it and drives it through `&mut self`, and several controllers
//! can coexist without sharing state.
//!
//! ```text
//! process(files) ─▶ extract ─▶ chunk ─▶ index (cached) ─▶ new session
//! submit(question) ─▶ session.ask ─▶ render history
//! ```

use std::sync::Arc;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::console::{Console, ConsoleEvent};
use crate::embedding::EmbeddingProvider;
use crate::extract::extract_batch;
use crate::index::{CacheStatus, IndexCache, IndexError};
use crate::llm::ChatModel;
use crate::models::{Turn, UploadedFile};
use crate::session::{Reply, RetrievalChatSession, SessionError, SessionOptions};

const NO_SESSION_WARNING: &str = "upload and process documents before asking a question";

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("could not extract text from the documents")]
    NoExtractableText,
    #[error("failed to build the index: {0}")]
    Index(#[from] IndexError),
}

/// Summary of a successful [`SessionController::process`].
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub files_read: usize,
    /// `(filename, message)` for every file that contributed no text.
    pub failures: Vec<(String, String)>,
    pub chunks: usize,
    pub cache: CacheStatus,
}

/// Outcome of [`SessionController::submit`].
#[derive(Debug)]
pub enum Submission {
    /// No documents have been processed yet; nothing was sent.
    NoSession,
    Answered(Reply),
}

pub struct SessionController {
    config: Config,
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatModel>,
    console: Box<dyn Console>,
    cache: IndexCache,
    session: Option<RetrievalChatSession>,
}

impl SessionController {
    pub fn new(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatModel>,
        console: Box<dyn Console>,
    ) -> Self {
        Self {
            config,
            embedder,
            chat,
            console,
            cache: IndexCache::new(),
            session: None,
        }
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Current turns; empty when there is no session.
    pub fn history(&self) -> &[Turn] {
        match &self.session {
            Some(session) => session.history(),
            None => &[],
        }
    }

    /// Build a fresh session from `files`, replacing the current one.
    ///
    /// On any error the current session, if there is one, is kept.
    pub async fn process(
        &mut self,
        files: Vec<UploadedFile>,
    ) -> Result<ProcessReport, ProcessError> {
        let extraction = extract_batch(&files, &self.config.extraction);
        drop(files);

        let failures: Vec<(String, String)> = extraction
            .failures
            .iter()
            .map(|f| (f.filename.clone(), f.error.to_string()))
            .collect();
        for (filename, message) in &failures {
            self.console.emit(ConsoleEvent::Error(format!(
                "error processing file {}: {}",
                filename, message
            )));
        }

        if extraction.is_empty() {
            let err = ProcessError::NoExtractableText;
            self.console.emit(ConsoleEvent::Error(format!(
                "{}; check the files",
                err
            )));
            return Err(err);
        }

        let chunks = chunk_text(&extraction.text, &self.config.chunking);
        let chunk_count = chunks.len();
        tracing::info!(chunks = chunk_count, "Chunked document text");

        let (index, cache) = match self
            .cache
            .get_or_build(chunks, self.embedder.as_ref(), self.config.embedding.batch_size)
            .await
        {
            Ok(built) => built,
            Err(e) => {
                let err = ProcessError::from(e);
                self.console.emit(ConsoleEvent::Error(err.to_string()));
                return Err(err);
            }
        };

        self.session = Some(RetrievalChatSession::new(
            index,
            Arc::clone(&self.embedder),
            Arc::clone(&self.chat),
            SessionOptions::from(&self.config),
        ));

        let report = ProcessReport {
            files_read: extraction.extracted.len(),
            failures,
            chunks: chunk_count,
            cache,
        };
        self.console.emit(ConsoleEvent::Processed {
            files: report.files_read,
            failed: report.failures.len(),
            chunks: report.chunks,
            cached: report.cache == CacheStatus::Hit,
        });
        Ok(report)
    }

    /// Ask the active session and render the updated history.
    ///
    /// Without a session this warns and makes no model call.
    pub async fn submit(&mut self, question: &str) -> Result<Submission, SessionError> {
        let Some(session) = self.session.as_mut() else {
            self.console
                .emit(ConsoleEvent::Warning(NO_SESSION_WARNING.to_string()));
            return Ok(Submission::NoSession);
        };

        match session.ask(question).await {
            Ok(reply) => {
                self.render_history();
                Ok(Submission::Answered(reply))
            }
            Err(e) => {
                self.console.emit(ConsoleEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Emit every turn in order.
    pub fn render_history(&self) {
        for (index, turn) in self.history().iter().enumerate() {
            self.console.emit(ConsoleEvent::Turn {
                index,
                speaker: turn.speaker,
                text: turn.text.clone(),
                at: turn.at,
            });
        }
    }
}
