//! # HealthDoc
//!
//! Ask questions about your medical documents.
//!
//! HealthDoc extracts text from PDF, DOCX, and plain-text files, splits it
//! into overlapping chunks, embeds the chunks into an in-memory similarity
//! index, and answers follow-up questions through a retrieval-augmented
//! chat loop backed by a hosted chat model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌──────────────┐   ┌───────────────┐
//! │ Extract  │──▶│  Chunk  │──▶│ Index +      │──▶│ Retrieval     │
//! │ PDF/DOCX │   │ 1000/200│   │ memo cache   │   │ chat session  │
//! └──────────┘   └─────────┘   └──────────────┘   └──────┬────────┘
//!                                                        │
//!                                                  ┌─────▼──────┐
//!                                                  │ Controller │──▶ console
//!                                                  └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! healthdoc chat ./labs/ discharge-summary.pdf
//! healthdoc inspect ./labs/          # extract + chunk only, no network
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF / DOCX / TXT text extraction |
//! | [`chunk`] | Greedy recursive text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory vector index and its cache |
//! | [`llm`] | Chat-completion model |
//! | [`session`] | Retrieval-augmented chat session |
//! | [`controller`] | Active-session controller |
//! | [`console`] | Rendering for humans and scripts |
//! | [`files`] | Collecting files from disk |
//! | [`inspect`] | Offline extract-and-chunk report |
//! | [`repl`] | Interactive chat loop |

pub mod chunk;
pub mod config;
pub mod console;
pub mod controller;
pub mod embedding;
pub mod extract;
pub mod files;
pub mod http;
pub mod index;
pub mod inspect;
pub mod llm;
pub mod models;
pub mod repl;
pub mod session;
