use std::error::Error;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{
    Assistant, CreateAssistantRequest, CreateMessageRequest, CreateRunRequest, FileObject,
    MessageList, Run, SubmitToolOutputsRequest, Thread, ThreadMessage, ToolOutput,
};
use crate::utils::url::{construct_api_url, endpoint_path};

const ASSISTANTS_BETA_HEADER: &str = "OpenAI-Beta";
const ASSISTANTS_BETA_VALUE: &str = "assistants=v2";
pub const MESSAGE_PAGE_LIMIT: u32 = 100;

/// Failures talking to the assistant service.
#[derive(Debug)]
pub enum ApiError {
    /// The request never produced a response (DNS, TLS, connection reset...).
    Network(reqwest::Error),
    /// The service answered with a non-success status.
    Status { status: u16, message: String },
    /// The response body did not match the expected payload.
    Decode(String),
    /// A local file could not be read for upload.
    Io(std::io::Error),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Network(err) => write!(f, "network error: {err}"),
            ApiError::Status { status, message } => write!(f, "HTTP {status}: {message}"),
            ApiError::Decode(detail) => write!(f, "unexpected response: {detail}"),
            ApiError::Io(err) => write!(f, "file error: {err}"),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ApiError::Network(err) => Some(err),
            ApiError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(err)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Io(err)
    }
}

/// The remote operations a session needs.
///
/// [`HttpAssistantsClient`] is the production implementation; tests drive the
/// session through scripted fakes.
#[async_trait]
pub trait AssistantsApi: Send + Sync {
    async fn create_thread(&self) -> Result<Thread, ApiError>;

    async fn create_user_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<ThreadMessage, ApiError>;

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, ApiError>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ApiError>;

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, ApiError>;

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ApiError>;

    /// One page of messages created after `after`, oldest first.
    async fn list_messages_after(
        &self,
        thread_id: &str,
        after: &str,
    ) -> Result<MessageList, ApiError>;

    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject, ApiError>;

    async fn file_content(&self, file_id: &str) -> Result<Vec<u8>, ApiError>;

    async fn upload_file(&self, path: &Path) -> Result<FileObject, ApiError>;

    async fn create_assistant(
        &self,
        request: &CreateAssistantRequest,
    ) -> Result<Assistant, ApiError>;
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct HttpAssistantsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpAssistantsClient {
    /// Build a client whose requests fail instead of hanging on a dead connection.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, base_url, api_key))
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn request(&self, method: reqwest::Method, endpoint: &str) -> reqwest::RequestBuilder {
        let url = construct_api_url(&self.base_url, endpoint);
        debug!(%method, %url, "assistants request");
        self.client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header(ASSISTANTS_BETA_HEADER, ASSISTANTS_BETA_VALUE)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let response = self.request(reqwest::Method::GET, endpoint).send().await?;
        decode_json(response).await
    }

    async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .request(reqwest::Method::POST, endpoint)
            .json(body)
            .send()
            .await?;
        decode_json(response).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    Err(ApiError::Status {
        status: status.as_u16(),
        message: format_api_error(&body),
    })
}

async fn decode_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let response = check_status(response).await?;
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|err| {
        let preview: String = String::from_utf8_lossy(&bytes).chars().take(200).collect();
        ApiError::Decode(format!("{err} (body starts with: {preview})"))
    })
}

#[async_trait]
impl AssistantsApi for HttpAssistantsClient {
    async fn create_thread(&self) -> Result<Thread, ApiError> {
        self.post_json("threads", &serde_json::json!({})).await
    }

    async fn create_user_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<ThreadMessage, ApiError> {
        let request = CreateMessageRequest {
            role: "user".to_string(),
            content: content.to_string(),
        };
        self.post_json(&endpoint_path(&["threads", thread_id, "messages"]), &request)
            .await
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, ApiError> {
        let request = CreateRunRequest {
            assistant_id: assistant_id.to_string(),
        };
        self.post_json(&endpoint_path(&["threads", thread_id, "runs"]), &request)
            .await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ApiError> {
        self.get_json(&endpoint_path(&["threads", thread_id, "runs", run_id]))
            .await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, ApiError> {
        let request = SubmitToolOutputsRequest {
            tool_outputs: outputs,
        };
        self.post_json(
            &endpoint_path(&["threads", thread_id, "runs", run_id, "submit_tool_outputs"]),
            &request,
        )
        .await
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ApiError> {
        self.post_json(
            &endpoint_path(&["threads", thread_id, "runs", run_id, "cancel"]),
            &serde_json::json!({}),
        )
        .await
    }

    async fn list_messages_after(
        &self,
        thread_id: &str,
        after: &str,
    ) -> Result<MessageList, ApiError> {
        let limit = MESSAGE_PAGE_LIMIT.to_string();
        let response = self
            .request(
                reqwest::Method::GET,
                &endpoint_path(&["threads", thread_id, "messages"]),
            )
            .query(&[("order", "asc"), ("after", after), ("limit", limit.as_str())])
            .send()
            .await?;
        decode_json(response).await
    }

    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject, ApiError> {
        self.get_json(&endpoint_path(&["files", file_id])).await
    }

    async fn file_content(&self, file_id: &str) -> Result<Vec<u8>, ApiError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &endpoint_path(&["files", file_id, "content"]),
            )
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn upload_file(&self, path: &Path) -> Result<FileObject, ApiError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        // The service wants every assistants upload as raw bytes, whatever the content.
        let part = multipart::Part::bytes(bytes).file_name(file_name);
        let form = multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", part);
        let response = self
            .request(reqwest::Method::POST, "files")
            .multipart(form)
            .send()
            .await?;
        decode_json(response).await
    }

    async fn create_assistant(
        &self,
        request: &CreateAssistantRequest,
    ) -> Result<Assistant, ApiError> {
        self.post_json("assistants", request).await
    }
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value
                .get("error")
                .and_then(|v| v.as_str().map(str::to_owned))
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Reduce an error body to something readable in a status line.
///
/// JSON bodies become their `error.message` summary followed by the
/// pretty-printed document; anything else is passed through trimmed.
pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let pretty = serde_json::to_string_pretty(&json_value).unwrap_or_else(|_| trimmed.into());
        return match extract_error_summary(&json_value) {
            Some(summary) if !summary.is_empty() => format!("{summary}\n{pretty}"),
            _ => pretty,
        };
    }

    trimmed.to_string()
}
