//! [`AssistantApi`] over the OpenAI Assistants v2 HTTP API.
//!
//! Requires the `OPENAI_API_KEY` environment variable. Every request
//! carries the `OpenAI-Beta: assistants=v2` header. Requests are not
//! retried: a non-2xx response fails with the status and response body.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;

use super::types::{Assistant, FileObject, Message, MessageList, NewAssistant, Run, Thread};
use super::AssistantApi;
use crate::config::AssistantConfig;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    /// Build a client from `[assistant]` settings and `OPENAI_API_KEY`.
    pub fn new(settings: &AssistantConfig) -> Result<Self> {
        let api_key = match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!("{} environment variable not set", API_KEY_ENV),
        };
        Self::with_api_key(&settings.base_url, &api_key, settings.timeout())
    }

    pub fn with_api_key(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .send()
            .await
            .context("Request to the assistant API failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }
        response
            .json::<T>()
            .await
            .context("Invalid response from the assistant API")
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        tracing::debug!(path, "GET");
        self.send(self.client.get(self.url(path))).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &serde_json::Value) -> Result<T> {
        tracing::debug!(path, "POST");
        self.send(self.client.post(self.url(path)).json(body)).await
    }
}

#[async_trait]
impl AssistantApi for OpenAiClient {
    async fn upload_file(&self, path: &Path) -> Result<FileObject> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read document: {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.md".to_string());
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("text/markdown")?;
        let form = Form::new().text("purpose", "assistants").part("file", part);

        tracing::debug!(path = %path.display(), "POST /files");
        self.send(self.client.post(self.url("/files")).multipart(form))
            .await
    }

    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject> {
        self.get(&format!("/files/{}", file_id)).await
    }

    async fn create_assistant(&self, request: &NewAssistant) -> Result<Assistant> {
        self.post("/assistants", &serde_json::to_value(request)?)
            .await
    }

    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<Assistant> {
        self.get(&format!("/assistants/{}", assistant_id)).await
    }

    async fn create_thread(&self) -> Result<Thread> {
        self.post("/threads", &serde_json::json!({})).await
    }

    async fn retrieve_thread(&self, thread_id: &str) -> Result<Thread> {
        self.get(&format!("/threads/{}", thread_id)).await
    }

    async fn create_message(
        &self,
        thread_id: &str,
        content: &str,
        file_id: &str,
    ) -> Result<Message> {
        let body = serde_json::json!({
            "role": "user",
            "content": content,
            "attachments": [
                { "file_id": file_id, "tools": [{ "type": "file_search" }] }
            ],
        });
        self.post(&format!("/threads/{}/messages", thread_id), &body)
            .await
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        let body = serde_json::json!({ "assistant_id": assistant_id });
        self.post(&format!("/threads/{}/runs", thread_id), &body)
            .await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        self.get(&format!("/threads/{}/runs/{}", thread_id, run_id))
            .await
    }

    async fn list_messages(&self, thread_id: &str, run_id: &str) -> Result<Vec<Message>> {
        let list: MessageList = self
            .get(&format!(
                "/threads/{}/messages?order=desc&run_id={}",
                thread_id, run_id
            ))
            .await?;
        Ok(list.data)
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        self.post(
            &format!("/threads/{}/runs/{}/cancel", thread_id, run_id),
            &serde_json::json!({}),
        )
        .await
    }
}
