//! # md-assist
//!
//! Two small utilities for working with large markdown documents and a
//! hosted assistant:
//!
//! - a **chunker** that packs a document's paragraphs into word-bounded
//!   chunks and writes each chunk to its own file, and
//! - an **assistant client** that uploads a document, creates or reuses an
//!   assistant and a conversation thread, submits a query against the
//!   document, and polls the run for the answer.
//!
//! The two are independent: chunk output is never fed to the assistant
//! automatically.
//!
//! ## Quick Start
//!
//! ```bash
//! mda chunk docs/Spec.md --max-words 4000     # Spec.md_chunk_1.md, ...
//! mda upload docs/Spec.md                      # upload once, remember the id
//! mda ask "How do the requester and responder interact?"
//! mda session                                  # show remembered ids
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`chunk_cmd`] | Chunk a file and write chunk files |
//! | [`assistant`] | Assistant API trait, HTTP client, polling, session ids |
//! | [`ask_cmd`] | Upload / ask / session commands |
//! | [`logging`] | Tracing subscriber setup |

pub mod ask_cmd;
pub mod assistant;
pub mod chunk_cmd;
pub mod config;
pub mod logging;

pub use md_assist_core::chunk;
pub use md_assist_core::models;
