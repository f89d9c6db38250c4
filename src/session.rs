//! Retrieval-augmented chat over one embedding index.
//!
//! A [`RetrievalChatSession`] is bound to a single [`EmbeddingIndex`] for
//! its whole life and keeps an unbounded, append-only turn history. Each
//! [`ask`](RetrievalChatSession::ask) runs:
//!
//! 1. **Condense**: with prior turns, the chat model rewrites the
//!    follow-up as a standalone question. The rewrite is used for
//!    retrieval only.
//! 2. **Retrieve**: top-k chunks for the (standalone) question.
//! 3. **Prompt**: system message with instructions and the retrieved
//!    context, every prior turn, then the question verbatim.
//! 4. **Complete**: one chat call.
//! 5. **Record**: append the user question and the assistant answer.
//!
//! Turns are appended only after the answer arrives, so a failed call
//! leaves the history exactly as it was.

use std::sync::Arc;

use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::http::ServiceError;
use crate::index::EmbeddingIndex;
use crate::llm::{ChatError, ChatMessage, ChatModel};
use crate::models::Turn;

const ANSWER_INSTRUCTIONS: &str = "You are a careful assistant answering questions about the \
user's medical documents. Use only the context below to answer. If the context does not \
contain the answer, say that you don't know instead of guessing.";

const CONDENSE_INSTRUCTIONS: &str = "Given the conversation so far and a follow-up question, \
rephrase the follow-up as a standalone question that can be understood without the \
conversation. Reply with the standalone question only.";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("question is empty")]
    EmptyQuestion,
    #[error("retrieval failed: {0}")]
    Retrieval(ServiceError),
    #[error("chat model failed: {0}")]
    Chat(ChatError),
}

/// Retrieval and condensing knobs for a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub top_k: usize,
    pub condense_question: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            top_k: 4,
            condense_question: true,
        }
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            condense_question: config.chat.condense_question,
        }
    }
}

/// A chunk that was placed in the prompt for an answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub chunk_id: String,
    pub chunk_index: usize,
    pub score: f32,
    pub text: String,
}

/// Result of a successful [`RetrievalChatSession::ask`].
#[derive(Debug, Clone)]
pub struct Reply {
    pub answer: String,
    /// Full history including the turns just appended.
    pub history: Vec<Turn>,
    pub sources: Vec<Source>,
}

pub struct RetrievalChatSession {
    index: Arc<EmbeddingIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatModel>,
    options: SessionOptions,
    history: Vec<Turn>,
}

impl RetrievalChatSession {
    /// Bind a new session with empty history to `index`.
    pub fn new(
        index: Arc<EmbeddingIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatModel>,
        options: SessionOptions,
    ) -> Self {
        Self {
            index,
            embedder,
            chat,
            options,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Answer `question` from the index and the conversation so far.
    pub async fn ask(&mut self, question: &str) -> Result<Reply, SessionError> {
        if question.trim().is_empty() {
            return Err(SessionError::EmptyQuestion);
        }

        let standalone = self.standalone_question(question).await?;

        let hits = self
            .index
            .search(self.embedder.as_ref(), &standalone, self.options.top_k)
            .await
            .map_err(SessionError::Retrieval)?;
        let sources: Vec<Source> = hits
            .iter()
            .map(|hit| Source {
                chunk_id: hit.chunk.id.clone(),
                chunk_index: hit.chunk.index,
                score: hit.score,
                text: hit.chunk.text.clone(),
            })
            .collect();
        tracing::debug!(
            hits = sources.len(),
            chunk_ids = ?sources.iter().map(|s| s.chunk_id.as_str()).collect::<Vec<_>>(),
            "Retrieved context"
        );

        let messages = answer_messages(&sources, &self.history, question);
        tracing::debug!(
            messages = messages.len(),
            prompt_chars = messages.iter().map(|m| m.content.len()).sum::<usize>(),
            "Requesting answer"
        );
        let answer = self
            .chat
            .complete(&messages)
            .await
            .map_err(SessionError::Chat)?;

        self.history.push(Turn::user(question));
        self.history.push(Turn::assistant(answer.clone()));

        Ok(Reply {
            answer,
            history: self.history.clone(),
            sources,
        })
    }

    /// The question to retrieve with: rephrased when there is history to
    /// resolve it against, otherwise the question itself.
    async fn standalone_question(&self, question: &str) -> Result<String, SessionError> {
        if self.history.is_empty() || !self.options.condense_question {
            return Ok(question.to_string());
        }

        let rewritten = self
            .chat
            .complete(&condense_messages(&self.history, question))
            .await
            .map_err(SessionError::Chat)?;
        let rewritten = rewritten.trim();
        tracing::debug!(standalone = rewritten, "Condensed follow-up question");

        if rewritten.is_empty() {
            Ok(question.to_string())
        } else {
            Ok(rewritten.to_string())
        }
    }
}

fn condense_messages(history: &[Turn], question: &str) -> Vec<ChatMessage> {
    let mut transcript = String::new();
    for turn in history {
        transcript.push_str(turn.speaker.as_str());
        transcript.push_str(": ");
        transcript.push_str(&turn.text);
        transcript.push('\n');
    }

    vec![
        ChatMessage::system(CONDENSE_INSTRUCTIONS),
        ChatMessage::user(format!(
            "Conversation:\n{}\nFollow-up question: {}",
            transcript, question
        )),
    ]
}

fn answer_messages(sources: &[Source], history: &[Turn], question: &str) -> Vec<ChatMessage> {
    let context = sources
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(format!(
        "{}\n\nContext:\n{}",
        ANSWER_INSTRUCTIONS, context
    )));
    messages.extend(history.iter().map(ChatMessage::from));
    messages.push(ChatMessage::user(question));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    fn source(index: usize, text: &str) -> Source {
        Source {
            chunk_id: format!("chunk-{}", index),
            chunk_index: index,
            score: 1.0,
            text: text.to_string(),
        }
    }

    #[test]
    fn answer_prompt_layout() {
        let history = vec![Turn::user("What dose?"), Turn::assistant("5mg daily.")];
        let messages = answer_messages(
            &[source(0, "Metformin 5mg"), source(3, "Take with food")],
            &history,
            "With food?",
        );

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0]
            .content
            .ends_with("Context:\nMetformin 5mg\n\nTake with food"));
        assert_eq!(messages[1], ChatMessage::user("What dose?"));
        assert_eq!(messages[2], ChatMessage::assistant("5mg daily."));
        assert_eq!(messages[3], ChatMessage::user("With food?"));
    }

    #[test]
    fn condense_prompt_carries_transcript() {
        let history = vec![Turn::user("Who is the patient?"), Turn::assistant("Jane Doe.")];
        let messages = condense_messages(&history, "How old is she?");
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("user: Who is the patient?\n"));
        assert!(messages[1].content.contains("assistant: Jane Doe.\n"));
        assert!(messages[1]
            .content
            .ends_with("Follow-up question: How old is she?"));
    }

    #[test]
    fn options_follow_config() {
        let mut config = Config::default();
        config.retrieval.top_k = 7;
        config.chat.condense_question = false;
        let options = SessionOptions::from(&config);
        assert_eq!(options.top_k, 7);
        assert!(!options.condense_question);
    }
}
