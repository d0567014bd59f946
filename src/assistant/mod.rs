//! Hosted assistant client.
//!
//! Defines the [`AssistantApi`] trait (the network boundary), the
//! [`OpenAiClient`] implementation, and the operations built on top of it:
//!
//! - [`upload_document`]: upload a file or reuse the session's file id
//! - [`obtain_assistant`]: retrieve the session's assistant or create one
//! - [`obtain_thread`]: retrieve the session's thread or create one
//! - [`submit_query`]: post a query referencing the file and poll its run
//! - [`poll_run`]: poll a run until a terminal status or the deadline
//!
//! # Polling
//!
//! ```text
//!  sleep(interval) ──▶ retrieve run ──▶ terminal? ──yes──▶ RunOutcome
//!        ▲                                  │
//!        └──── interval = min(2×, max) ◀─no─┘   (until deadline → TimedOut)
//! ```
//!
//! A failed, cancelled, or expired run is reported as a [`RunOutcome`]
//! variant, not as an error. `Err` is reserved for transport and API
//! failures. The polling future holds no remote state, so dropping it
//! stops polling immediately.

pub mod openai;
pub mod session;
pub mod types;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::AssistantConfig;
pub use openai::OpenAiClient;
pub use session::{Session, SessionStore};
use types::{Assistant, FileObject, Message, NewAssistant, Run, RunStatus, Thread, ToolSpec};

/// Remote operations of the assistant service.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    async fn upload_file(&self, path: &Path) -> Result<FileObject>;
    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject>;
    async fn create_assistant(&self, request: &NewAssistant) -> Result<Assistant>;
    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<Assistant>;
    async fn create_thread(&self) -> Result<Thread>;
    async fn retrieve_thread(&self, thread_id: &str) -> Result<Thread>;
    /// Post a user message with `file_id` attached for file search.
    async fn create_message(&self, thread_id: &str, content: &str, file_id: &str)
        -> Result<Message>;
    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run>;
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;
    /// Messages produced by `run_id`, newest first.
    async fn list_messages(&self, thread_id: &str, run_id: &str) -> Result<Vec<Message>>;
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;
}

/// Interval and deadline settings for [`poll_run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub deadline: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(8),
            deadline: Duration::from_secs(600),
        }
    }
}

/// How a polled run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Text of the first response message.
    Completed(String),
    /// The run failed; carries the service's error description when given.
    Failed(Option<String>),
    Cancelled,
    Expired,
    /// The local deadline passed before the run reached a terminal status.
    TimedOut,
}

impl RunOutcome {
    pub fn response(&self) -> Option<&str> {
        match self {
            RunOutcome::Completed(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed(_) => write!(f, "Run completed"),
            RunOutcome::Failed(Some(reason)) => write!(f, "Run failed: {}", reason),
            RunOutcome::Failed(None) => write!(f, "Run failed"),
            RunOutcome::Cancelled => write!(f, "Run cancelled"),
            RunOutcome::Expired => write!(f, "Run expired"),
            RunOutcome::TimedOut => write!(f, "Run did not finish before the polling deadline"),
        }
    }
}

/// Ids a query is submitted against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTarget {
    pub assistant_id: String,
    pub thread_id: String,
    pub file_id: String,
}

/// Reuse the session's file, or upload `path` when there is none.
///
/// A remembered file id wins over `path`: the document is not uploaded
/// again.
pub async fn upload_document(
    api: &dyn AssistantApi,
    session: &mut Session,
    path: Option<&Path>,
) -> Result<FileObject> {
    if let Some(id) = &session.file_id {
        match path {
            Some(path) => tracing::info!(
                file_id = %id,
                path = %path.display(),
                "reusing remembered upload; document not uploaded again"
            ),
            None => tracing::debug!(file_id = %id, "reusing uploaded file"),
        }
        return api.retrieve_file(id).await;
    }
    let Some(path) = path else {
        bail!("No uploaded file in the session and no document given to upload");
    };
    let file = api.upload_file(path).await?;
    println!("Uploaded file: {}", file.id);
    tracing::info!(file_id = %file.id, path = %path.display(), "uploaded document");
    session.file_id = Some(file.id.clone());
    Ok(file)
}

pub async fn obtain_assistant(
    api: &dyn AssistantApi,
    session: &mut Session,
    settings: &AssistantConfig,
) -> Result<Assistant> {
    if let Some(id) = &session.assistant_id {
        tracing::debug!(assistant_id = %id, "reusing assistant");
        return api.retrieve_assistant(id).await;
    }
    let request = NewAssistant {
        model: settings.model.clone(),
        name: settings.name.clone(),
        instructions: settings.instructions().to_string(),
        tools: vec![ToolSpec::file_search()],
    };
    let assistant = api.create_assistant(&request).await?;
    println!("Created assistant: {}", assistant.id);
    tracing::info!(assistant_id = %assistant.id, model = %request.model, "created assistant");
    session.assistant_id = Some(assistant.id.clone());
    Ok(assistant)
}

pub async fn obtain_thread(api: &dyn AssistantApi, session: &mut Session) -> Result<Thread> {
    if let Some(id) = &session.thread_id {
        tracing::debug!(thread_id = %id, "reusing thread");
        return api.retrieve_thread(id).await;
    }
    let thread = api.create_thread().await?;
    println!("Created thread: {}", thread.id);
    tracing::info!(thread_id = %thread.id, "created thread");
    session.thread_id = Some(thread.id.clone());
    Ok(thread)
}

/// Post `query` to the thread and start a run. Does not wait for it.
pub async fn start_query(api: &dyn AssistantApi, target: &QueryTarget, query: &str) -> Result<Run> {
    let message = api
        .create_message(&target.thread_id, query, &target.file_id)
        .await?;
    tracing::debug!(message_id = %message.id, thread_id = %target.thread_id, "posted query");
    let run = api
        .create_run(&target.thread_id, &target.assistant_id)
        .await?;
    tracing::debug!(run_id = %run.id, status = ?run.status, "started run");
    Ok(run)
}

/// Post `query` and poll the resulting run to completion.
pub async fn submit_query(
    api: &dyn AssistantApi,
    target: &QueryTarget,
    query: &str,
    policy: &PollPolicy,
) -> Result<RunOutcome> {
    let run = start_query(api, target, query).await?;
    poll_run(api, &target.thread_id, &run.id, policy).await
}

/// Poll a run with exponential backoff until it is terminal or the
/// deadline passes.
pub async fn poll_run(
    api: &dyn AssistantApi,
    thread_id: &str,
    run_id: &str,
    policy: &PollPolicy,
) -> Result<RunOutcome> {
    let deadline = Instant::now() + policy.deadline;
    let mut interval = policy.initial_interval;

    loop {
        let now = Instant::now();
        if now >= deadline {
            tracing::warn!(run_id, "polling deadline reached");
            return Ok(RunOutcome::TimedOut);
        }
        tokio::time::sleep(interval.min(deadline - now)).await;

        let run = api.retrieve_run(thread_id, run_id).await?;
        tracing::debug!(run_id, status = ?run.status, "polled run");

        if run.status.is_terminal() {
            return finish(api, thread_id, &run).await;
        }
        interval = (interval * 2).min(policy.max_interval);
    }
}

async fn finish(api: &dyn AssistantApi, thread_id: &str, run: &Run) -> Result<RunOutcome> {
    let reason = run.last_error.as_ref().map(|e| e.describe());
    let outcome = match run.status {
        RunStatus::Completed => {
            let messages = api.list_messages(thread_id, &run.id).await?;
            let Some(first) = messages.first() else {
                bail!("Run {} completed without any messages", run.id);
            };
            let Some(text) = first.first_text() else {
                bail!("Message {} has no text content", first.id);
            };
            return Ok(RunOutcome::Completed(text.to_string()));
        }
        RunStatus::Cancelled => RunOutcome::Cancelled,
        RunStatus::Expired => RunOutcome::Expired,
        RunStatus::Incomplete => {
            RunOutcome::Failed(Some(reason.unwrap_or_else(|| "run incomplete".to_string())))
        }
        RunStatus::RequiresAction => {
            RunOutcome::Failed(Some("run requires a tool call this client cannot make".to_string()))
        }
        _ => RunOutcome::Failed(reason),
    };
    tracing::warn!(run_id = %run.id, status = ?run.status, "{}", outcome);
    Ok(outcome)
}
