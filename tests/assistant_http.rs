//! End-to-end tests for the assistant client against an in-process fake
//! of the Assistants v2 HTTP API.

use axum::{
    body::Bytes,
    extract::{Path as UrlPath, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use md_assist::ask_cmd::{ask, prepare_target};
use md_assist::assistant::session::{ENV_ASSISTANT_ID, ENV_FILE_ID};
use md_assist::assistant::{AssistantApi, OpenAiClient, RunOutcome, Session, SessionStore};
use md_assist::config::{parse_config, Config};

const API_KEY: &str = "sk-test";
const ANSWER: &str = "The requester sends GET_VERSION first.";

struct FakeState {
    requests: Vec<String>,
    message_bodies: Vec<Value>,
    upload_body: Vec<u8>,
    polls: usize,
    final_status: &'static str,
    fail_create_assistant: bool,
}

type Shared = Arc<Mutex<FakeState>>;

fn check(state: &Shared, headers: &HeaderMap, request: String) -> Result<(), StatusCode> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let beta = headers
        .get("openai-beta")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if auth != format!("Bearer {}", API_KEY) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    if beta != "assistants=v2" {
        return Err(StatusCode::BAD_REQUEST);
    }
    state.lock().unwrap().requests.push(request);
    Ok(())
}

async fn create_file(
    State(state): State<Shared>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, StatusCode> {
    check(&state, &headers, "POST /files".into())?;
    state.lock().unwrap().upload_body = body.to_vec();
    Ok(Json(json!({
        "id": "file_fake",
        "object": "file",
        "filename": "doc.md",
        "bytes": body.len(),
        "purpose": "assistants"
    })))
}

async fn retrieve_file(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<Value>, StatusCode> {
    check(&state, &headers, format!("GET /files/{}", id))?;
    Ok(Json(json!({ "id": id, "object": "file" })))
}

async fn create_assistant(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    check(&state, &headers, "POST /assistants".into())?;
    if state.lock().unwrap().fail_create_assistant {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(json!({
        "id": "asst_fake",
        "object": "assistant",
        "name": body["name"],
        "model": body["model"],
        "instructions": body["instructions"],
        "tools": body["tools"]
    })))
}

async fn retrieve_assistant(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<Value>, StatusCode> {
    check(&state, &headers, format!("GET /assistants/{}", id))?;
    Ok(Json(json!({ "id": id, "object": "assistant" })))
}

async fn create_thread(
    State(state): State<Shared>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    check(&state, &headers, "POST /threads".into())?;
    Ok(Json(json!({ "id": "thread_fake", "object": "thread" })))
}

async fn retrieve_thread(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<Value>, StatusCode> {
    check(&state, &headers, format!("GET /threads/{}", id))?;
    Ok(Json(json!({ "id": id, "object": "thread" })))
}

async fn create_message(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(thread): UrlPath<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    check(&state, &headers, format!("POST /threads/{}/messages", thread))?;
    state.lock().unwrap().message_bodies.push(body.clone());
    Ok(Json(json!({
        "id": "msg_user",
        "object": "thread.message",
        "role": "user",
        "content": [{ "type": "text", "text": { "value": body["content"], "annotations": [] } }]
    })))
}

async fn list_messages(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(thread): UrlPath<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    check(&state, &headers, format!("GET /threads/{}/messages", thread))?;
    if params.get("order").map(String::as_str) != Some("desc") {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(Json(json!({
        "object": "list",
        "data": [
            {
                "id": "msg_reply",
                "role": "assistant",
                "run_id": params.get("run_id"),
                "content": [
                    { "type": "text", "text": { "value": ANSWER, "annotations": [] } }
                ]
            },
            {
                "id": "msg_user",
                "role": "user",
                "content": [
                    { "type": "text", "text": { "value": "question", "annotations": [] } }
                ]
            }
        ]
    })))
}

async fn create_run(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(thread): UrlPath<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    check(&state, &headers, format!("POST /threads/{}/runs", thread))?;
    if body["assistant_id"].as_str().is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(Json(json!({ "id": "run_fake", "status": "queued" })))
}

async fn retrieve_run(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath((thread, run)): UrlPath<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    check(&state, &headers, format!("GET /threads/{}/runs/{}", thread, run))?;
    let mut s = state.lock().unwrap();
    s.polls += 1;
    if s.polls < 2 {
        return Ok(Json(json!({ "id": run, "status": "in_progress" })));
    }
    let last_error = if s.final_status == "failed" {
        json!({ "code": "server_error", "message": "model overloaded" })
    } else {
        Value::Null
    };
    Ok(Json(json!({
        "id": run,
        "status": s.final_status,
        "last_error": last_error
    })))
}

async fn cancel_run(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath((thread, run)): UrlPath<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    check(
        &state,
        &headers,
        format!("POST /threads/{}/runs/{}/cancel", thread, run),
    )?;
    Ok(Json(json!({ "id": run, "status": "cancelling" })))
}

async fn spawn_fake(final_status: &'static str) -> (String, Shared) {
    let state = Arc::new(Mutex::new(FakeState {
        requests: Vec::new(),
        message_bodies: Vec::new(),
        upload_body: Vec::new(),
        polls: 0,
        final_status,
        fail_create_assistant: false,
    }));

    let app = Router::new()
        .route("/v1/files", post(create_file))
        .route("/v1/files/{id}", get(retrieve_file))
        .route("/v1/assistants", post(create_assistant))
        .route("/v1/assistants/{id}", get(retrieve_assistant))
        .route("/v1/threads", post(create_thread))
        .route("/v1/threads/{id}", get(retrieve_thread))
        .route(
            "/v1/threads/{id}/messages",
            post(create_message).get(list_messages),
        )
        .route("/v1/threads/{id}/runs", post(create_run))
        .route("/v1/threads/{id}/runs/{run}", get(retrieve_run))
        .route("/v1/threads/{id}/runs/{run}/cancel", post(cancel_run))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/v1", addr), state)
}

fn test_config(base_url: &str, root: &Path) -> String {
    format!(
        r#"[assistant]
base_url = "{}"
model = "gpt-4o-mini"
name = "Test Analyzer"
state_path = "{}/state/session.toml"
timeout_secs = 5

[assistant.poll]
initial_interval_ms = 5
max_interval_ms = 20
deadline_secs = 5
"#,
        base_url,
        root.display()
    )
}

fn setup(base_url: &str) -> (TempDir, Config, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let cfg = parse_config(&test_config(base_url, tmp.path())).unwrap();
    let doc = tmp.path().join("doc.md");
    std::fs::write(&doc, "# SPDM\n\nGET_VERSION comes first.").unwrap();
    (tmp, cfg, doc)
}

fn client(base_url: &str) -> OpenAiClient {
    OpenAiClient::with_api_key(base_url, API_KEY, Duration::from_secs(5)).unwrap()
}

fn empty_store(cfg: &Config) -> SessionStore {
    SessionStore::open_with(&cfg.assistant.state_path, |_| None).unwrap()
}

#[tokio::test]
async fn test_first_ask_creates_resources_and_answers() {
    let (base_url, state) = spawn_fake("completed").await;
    let (_tmp, cfg, doc) = setup(&base_url);
    let api = client(&base_url);
    let mut store = empty_store(&cfg);

    let target = prepare_target(&api, &cfg, &mut store, Some(&doc))
        .await
        .unwrap();
    assert_eq!(target.assistant_id, "asst_fake");
    assert_eq!(target.thread_id, "thread_fake");
    assert_eq!(target.file_id, "file_fake");

    let saved = Session::load(&cfg.assistant.state_path).unwrap();
    assert_eq!(&saved, store.active());
    assert_eq!(saved.file_id.as_deref(), Some("file_fake"));

    let outcome = ask(
        &api,
        &cfg,
        &target,
        "How does SPDM start?",
        std::future::pending(),
    )
    .await
    .unwrap();
    assert_eq!(outcome, RunOutcome::Completed(ANSWER.to_string()));

    let s = state.lock().unwrap();
    assert_eq!(
        s.requests,
        vec![
            "POST /files",
            "POST /assistants",
            "POST /threads",
            "POST /threads/thread_fake/messages",
            "POST /threads/thread_fake/runs",
            "GET /threads/thread_fake/runs/run_fake",
            "GET /threads/thread_fake/runs/run_fake",
            "GET /threads/thread_fake/messages",
        ]
    );
    let upload = String::from_utf8_lossy(&s.upload_body);
    assert!(upload.contains("assistants"));
    assert!(upload.contains("doc.md"));
    assert!(upload.contains("GET_VERSION comes first."));

    let message = &s.message_bodies[0];
    assert_eq!(message["role"], "user");
    assert_eq!(message["content"], "How does SPDM start?");
    assert_eq!(message["attachments"][0]["file_id"], "file_fake");
    assert_eq!(message["attachments"][0]["tools"][0]["type"], "file_search");
}

#[tokio::test]
async fn test_known_session_reuses_resources() {
    let (base_url, state) = spawn_fake("completed").await;
    let (_tmp, cfg, _doc) = setup(&base_url);
    let api = client(&base_url);
    Session {
        assistant_id: Some("asst_old".into()),
        thread_id: Some("thread_old".into()),
        file_id: Some("file_old".into()),
    }
    .save(&cfg.assistant.state_path)
    .unwrap();
    let mut store = SessionStore::open_with(&cfg.assistant.state_path, |_| None).unwrap();

    let target = prepare_target(&api, &cfg, &mut store, None)
        .await
        .unwrap();
    assert_eq!(target.assistant_id, "asst_old");
    assert_eq!(target.thread_id, "thread_old");
    assert_eq!(target.file_id, "file_old");

    assert_eq!(
        state.lock().unwrap().requests,
        vec![
            "GET /files/file_old",
            "GET /assistants/asst_old",
            "GET /threads/thread_old",
        ]
    );
}

#[tokio::test]
async fn test_failed_run_is_reported_as_outcome() {
    let (base_url, _state) = spawn_fake("failed").await;
    let (_tmp, cfg, doc) = setup(&base_url);
    let api = client(&base_url);
    let mut store = empty_store(&cfg);

    let target = prepare_target(&api, &cfg, &mut store, Some(&doc))
        .await
        .unwrap();
    let outcome = ask(&api, &cfg, &target, "question", std::future::pending())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Failed(Some("server_error: model overloaded".into()))
    );
}

#[tokio::test]
async fn test_cancelled_run_is_reported_as_outcome() {
    let (base_url, _state) = spawn_fake("cancelled").await;
    let (_tmp, cfg, doc) = setup(&base_url);
    let api = client(&base_url);
    let mut store = empty_store(&cfg);

    let target = prepare_target(&api, &cfg, &mut store, Some(&doc))
        .await
        .unwrap();
    let outcome = ask(&api, &cfg, &target, "question", std::future::pending())
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::Cancelled);
}

#[tokio::test]
async fn test_upload_is_saved_when_assistant_creation_fails() {
    let (base_url, state) = spawn_fake("completed").await;
    state.lock().unwrap().fail_create_assistant = true;
    let (_tmp, cfg, doc) = setup(&base_url);
    let api = client(&base_url);
    let mut store = empty_store(&cfg);

    let err = prepare_target(&api, &cfg, &mut store, Some(&doc))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("500"), "error was: {}", err);

    let saved = Session::load(&cfg.assistant.state_path).unwrap();
    assert_eq!(saved.file_id.as_deref(), Some("file_fake"));
    assert_eq!(saved.assistant_id, None);

    // The retry reuses the uploaded file instead of uploading again.
    state.lock().unwrap().fail_create_assistant = false;
    let mut store = empty_store(&cfg);
    let target = prepare_target(&api, &cfg, &mut store, Some(&doc))
        .await
        .unwrap();
    assert_eq!(target.file_id, "file_fake");
    assert_eq!(
        state.lock().unwrap().requests,
        vec![
            "POST /files",
            "POST /assistants",
            "GET /files/file_fake",
            "POST /assistants",
            "POST /threads",
        ]
    );
}

#[tokio::test]
async fn test_overridden_ids_are_not_saved() {
    let (base_url, state) = spawn_fake("completed").await;
    let (_tmp, cfg, doc) = setup(&base_url);
    let api = client(&base_url);
    let env: HashMap<&str, &str> =
        HashMap::from([(ENV_ASSISTANT_ID, "asst_env"), (ENV_FILE_ID, "file_env")]);
    let mut store =
        SessionStore::open_with(&cfg.assistant.state_path, |k| env.get(k).map(|v| v.to_string()))
            .unwrap();

    let target = prepare_target(&api, &cfg, &mut store, Some(&doc))
        .await
        .unwrap();
    assert_eq!(target.assistant_id, "asst_env");
    assert_eq!(target.file_id, "file_env");
    assert_eq!(target.thread_id, "thread_fake");

    let saved = Session::load(&cfg.assistant.state_path).unwrap();
    assert_eq!(
        saved,
        Session {
            assistant_id: None,
            thread_id: Some("thread_fake".into()),
            file_id: None,
        }
    );
    assert!(!state
        .lock()
        .unwrap()
        .requests
        .contains(&"POST /files".to_string()));
}

#[tokio::test]
async fn test_interrupt_cancels_run() {
    let (base_url, state) = spawn_fake("completed").await;
    let (_tmp, cfg, doc) = setup(&base_url);
    let api = client(&base_url);
    let mut store = empty_store(&cfg);

    let target = prepare_target(&api, &cfg, &mut store, Some(&doc))
        .await
        .unwrap();
    let err = ask(&api, &cfg, &target, "question", std::future::ready(()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Interrupted"), "error was: {}", err);

    let requests = state.lock().unwrap().requests.clone();
    assert!(requests.contains(&"POST /threads/thread_fake/runs/run_fake/cancel".to_string()));
    assert!(!requests.contains(&"GET /threads/thread_fake/messages".to_string()));
}

#[tokio::test]
async fn test_api_error_includes_status() {
    let (base_url, state) = spawn_fake("completed").await;
    let api = OpenAiClient::with_api_key(&base_url, "sk-wrong", Duration::from_secs(5)).unwrap();

    let err = api.create_thread().await.unwrap_err();
    assert!(err.to_string().contains("401"), "error was: {}", err);
    assert!(state.lock().unwrap().requests.is_empty());
}

#[tokio::test]
async fn test_cancel_run_request() {
    let (base_url, state) = spawn_fake("completed").await;
    let api = client(&base_url);

    let run = api.cancel_run("thread_fake", "run_fake").await.unwrap();
    assert_eq!(run.id, "run_fake");
    assert_eq!(
        state.lock().unwrap().requests,
        vec!["POST /threads/thread_fake/runs/run_fake/cancel"]
    );
}

fn run_mda(cwd: &Path, config: &Path, args: &[&str]) -> std::process::Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_mda"))
        .current_dir(cwd)
        .env("OPENAI_API_KEY", API_KEY)
        .env_remove("MDA_ASSISTANT_ID")
        .env_remove("MDA_THREAD_ID")
        .env_remove("MDA_FILE_ID")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cli_ask_then_session() {
    let (base_url, _state) = spawn_fake("completed").await;
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("mda.toml");
    std::fs::write(&config, test_config(&base_url, tmp.path())).unwrap();
    let doc = tmp.path().join("doc.md");
    std::fs::write(&doc, "# SPDM\n\nGET_VERSION comes first.").unwrap();

    let cwd = tmp.path().to_path_buf();
    let config_arg = config.clone();
    let doc_arg = doc.to_str().unwrap().to_string();
    let output = tokio::task::spawn_blocking(move || {
        run_mda(&cwd, &config_arg, &["ask", "How does SPDM start?", "--file", &doc_arg])
    })
    .await
    .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Uploaded file: file_fake"));
    assert!(stdout.contains("Created assistant: asst_fake"));
    assert!(stdout.contains("Created thread: thread_fake"));
    assert!(stdout.contains(ANSWER));

    let cwd = tmp.path().to_path_buf();
    let config_arg = config.clone();
    let output = tokio::task::spawn_blocking(move || run_mda(&cwd, &config_arg, &["session"]))
        .await
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("assistant_id: asst_fake"), "stdout={}", stdout);
    assert!(stdout.contains("thread_id:    thread_fake"), "stdout={}", stdout);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cli_failed_run_exits_nonzero() {
    let (base_url, _state) = spawn_fake("failed").await;
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("mda.toml");
    std::fs::write(&config, test_config(&base_url, tmp.path())).unwrap();
    let doc = tmp.path().join("doc.md");
    std::fs::write(&doc, "text").unwrap();

    let cwd = tmp.path().to_path_buf();
    let doc_arg = doc.to_str().unwrap().to_string();
    let output = tokio::task::spawn_blocking(move || {
        run_mda(&cwd, &config, &["ask", "question", "--file", &doc_arg])
    })
    .await
    .unwrap();

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("Run failed: server_error: model overloaded"), "stderr={}", stderr);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cli_upload_reports_remembered_file() {
    let (base_url, state) = spawn_fake("completed").await;
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("mda.toml");
    std::fs::write(&config, test_config(&base_url, tmp.path())).unwrap();
    let doc = tmp.path().join("other.md");
    std::fs::write(&doc, "text").unwrap();
    Session {
        assistant_id: None,
        thread_id: None,
        file_id: Some("file_old".into()),
    }
    .save(&tmp.path().join("state/session.toml"))
    .unwrap();

    let cwd = tmp.path().to_path_buf();
    let doc_arg = doc.to_str().unwrap().to_string();
    let output =
        tokio::task::spawn_blocking(move || run_mda(&cwd, &config, &["upload", &doc_arg]))
            .await
            .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout={}", stdout);
    assert!(
        stdout.contains("Reusing remembered upload file_old"),
        "stdout={}",
        stdout
    );
    assert!(stdout.contains("other.md was not uploaded"), "stdout={}", stdout);
    assert!(stdout.contains("file_id: file_old"), "stdout={}", stdout);
    assert_eq!(state.lock().unwrap().requests, vec!["GET /files/file_old"]);
}
