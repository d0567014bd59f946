//! `mda upload`, `mda ask`, and `mda session`.
//!
//! Each command opens the [`SessionStore`] at `assistant.state_path` with
//! `MDA_*_ID` environment overrides applied, and persists every newly
//! created remote resource as soon as it exists so the next run reuses it.
//! Overridden ids are used but never written to the state file.

use anyhow::{bail, Result};
use std::future::Future;
use std::path::{Path, PathBuf};

use crate::assistant::{
    obtain_assistant, obtain_thread, poll_run, start_query, upload_document, AssistantApi,
    OpenAiClient, QueryTarget, RunOutcome, SessionStore,
};
use crate::config::Config;

/// Entry point for `mda upload`.
pub async fn run_upload(config: &Config, path: &Path) -> Result<()> {
    let api = OpenAiClient::new(&config.assistant)?;
    let mut store = SessionStore::open(&config.assistant.state_path)?;

    let remembered = store.active().file_id.clone();
    let file = upload_document(&api, store.active_mut(), Some(path)).await?;
    store.persist()?;
    if let Some(id) = remembered {
        println!(
            "Reusing remembered upload {} ({} was not uploaded)",
            id,
            path.display()
        );
    }
    println!("file_id: {}", file.id);
    Ok(())
}

/// Upload (or reuse) the document, obtain the assistant and thread, and
/// persist each id as soon as it is created.
pub async fn prepare_target(
    api: &dyn AssistantApi,
    config: &Config,
    store: &mut SessionStore,
    document: Option<&Path>,
) -> Result<QueryTarget> {
    let file = upload_document(api, store.active_mut(), document).await?;
    store.persist()?;
    let assistant = obtain_assistant(api, store.active_mut(), &config.assistant).await?;
    store.persist()?;
    let thread = obtain_thread(api, store.active_mut()).await?;
    store.persist()?;

    Ok(QueryTarget {
        assistant_id: assistant.id,
        thread_id: thread.id,
        file_id: file.id,
    })
}

/// Submit `query` and wait for the run.
///
/// If `interrupt` resolves first, the remote run is cancelled (best effort)
/// and an error is returned.
pub async fn ask<I>(
    api: &dyn AssistantApi,
    config: &Config,
    target: &QueryTarget,
    query: &str,
    interrupt: I,
) -> Result<RunOutcome>
where
    I: Future<Output = ()>,
{
    let policy = config.assistant.poll.policy();
    let run = start_query(api, target, query).await?;

    tokio::select! {
        outcome = poll_run(api, &target.thread_id, &run.id, &policy) => outcome,
        _ = interrupt => {
            eprintln!("Interrupted; cancelling run {}", run.id);
            if let Err(e) = api.cancel_run(&target.thread_id, &run.id).await {
                tracing::warn!(run_id = %run.id, error = %e, "failed to cancel run");
            }
            bail!("Interrupted while waiting for run {}", run.id);
        }
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Entry point for `mda ask`.
pub async fn run_ask(config: &Config, query: &str, file: Option<PathBuf>) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }
    let api = OpenAiClient::new(&config.assistant)?;
    let mut store = SessionStore::open(&config.assistant.state_path)?;
    let document = file.or_else(|| config.assistant.document.clone());

    let target = prepare_target(&api, config, &mut store, document.as_deref()).await?;
    match ask(&api, config, &target, query, ctrl_c()).await? {
        RunOutcome::Completed(text) => {
            println!("{}", text);
            Ok(())
        }
        other => bail!("{}", other),
    }
}

/// Entry point for `mda session`.
pub fn run_session(config: &Config) -> Result<()> {
    let store = SessionStore::open(&config.assistant.state_path)?;
    let session = store.active();
    let show = |id: &Option<String>| id.clone().unwrap_or_else(|| "(none)".to_string());

    println!("state file:   {}", store.path().display());
    println!("assistant_id: {}", show(&session.assistant_id));
    println!("thread_id:    {}", show(&session.thread_id));
    println!("file_id:      {}", show(&session.file_id));
    Ok(())
}
