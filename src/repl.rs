//! `healthdoc chat`: the interactive question loop.
//!
//! Reads one line at a time from stdin. Plain lines are questions for the
//! active session; lines starting with `:` are commands:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `:load <paths...>` | process a new batch, replacing the session; quote paths with spaces |
//! | `:history` | re-render the conversation |
//! | `:help` | list commands |
//! | `:quit` | exit (so does end of input) |
//!
//! Failures of a single action are rendered and the loop continues.

use anyhow::Result;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;

use crate::config::{self, Config};
use crate::console::{Console, ConsoleEvent, OutputMode};
use crate::controller::SessionController;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::files::collect_files;
use crate::llm::{ChatModel, OpenAIChat};

const HELP: &str = "Ask a question about your documents, or use a command:
  :load <paths...>   process files or directories (replaces the current session);
                     wrap paths containing spaces in double quotes
  :history           show the conversation so far
  :help              show this help
  :quit              exit";

/// One parsed line of input.
#[derive(Debug, PartialEq, Eq)]
pub enum ReplCommand {
    Ask(String),
    Load(Vec<PathBuf>),
    History,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_line(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    let Some(rest) = line.strip_prefix(':') else {
        return ReplCommand::Ask(line.to_string());
    };

    let rest = rest.trim_start();
    let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    match name {
        "load" | "l" => {
            ReplCommand::Load(split_args(args).into_iter().map(PathBuf::from).collect())
        }
        "history" | "h" => ReplCommand::History,
        "help" | "?" => ReplCommand::Help,
        "quit" | "q" | "exit" => ReplCommand::Quit,
        other => ReplCommand::Unknown(other.to_string()),
    }
}

/// Split on whitespace, keeping double-quoted runs together. An
/// unterminated quote extends to the end of the line.
fn split_args(args: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;

    for c in args.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    out.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        out.push(current);
    }
    out
}

/// Run `healthdoc chat`. Fails only at startup (credential, providers).
pub async fn run_chat(config: &Config, paths: &[PathBuf], mode: OutputMode) -> Result<()> {
    let api_key = config::api_key_from_env()?;

    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::from(create_provider(&config.embedding, Some(&api_key))?);
    let chat: Arc<dyn ChatModel> = Arc::new(OpenAIChat::new(&config.chat, &api_key)?);
    tracing::info!(
        embedding_model = embedder.model_name(),
        chat_model = chat.model_name(),
        "Starting chat"
    );

    let console = mode.console();
    let mut controller = SessionController::new(config.clone(), embedder, chat, mode.console());

    if !paths.is_empty() {
        load(&mut controller, console.as_ref(), paths).await;
    } else {
        console.emit(ConsoleEvent::Warning(
            "no documents loaded yet; use :load <paths...> to add some".to_string(),
        ));
    }

    let interactive = mode == OutputMode::Human && atty::is(atty::Stream::Stdin);
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        if interactive {
            let mut err = std::io::stderr().lock();
            let _ = write!(err, "healthdoc> ");
            let _ = err.flush();
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_line(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Ask(question) => {
                // Errors are already rendered by the controller.
                let _ = controller.submit(&question).await;
            }
            ReplCommand::Load(paths) if paths.is_empty() => {
                console.emit(ConsoleEvent::Warning(
                    "upload at least one document: :load <paths...>".to_string(),
                ));
            }
            ReplCommand::Load(paths) => load(&mut controller, console.as_ref(), &paths).await,
            ReplCommand::History => controller.render_history(),
            ReplCommand::Help => eprintln!("{}", HELP),
            ReplCommand::Quit => break,
            ReplCommand::Unknown(cmd) => console.emit(ConsoleEvent::Warning(format!(
                "unknown command ':{}' (try :help)",
                cmd
            ))),
        }
    }

    Ok(())
}

async fn load(controller: &mut SessionController, console: &dyn Console, paths: &[PathBuf]) {
    match collect_files(paths) {
        Ok(files) => {
            let _ = controller.process(files).await;
        }
        Err(e) => console.emit(ConsoleEvent::Error(format!("{:#}", e))),
    }
}
