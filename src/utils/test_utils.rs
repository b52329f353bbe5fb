//! Scripted stand-in for the remote service, shared by session, download and
//! registration tests.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::api::{
    ApiError, Assistant, AssistantsApi, CreateAssistantRequest, FileObject, FunctionCall,
    MessageContent, MessageList, RequiredAction, RequiredToolCall, Run, RunError, RunStatus,
    SubmitToolOutputsAction, TextContent, Thread, ThreadMessage, ToolOutput,
};

pub const TEST_THREAD: &str = "thread_test";
pub const TEST_USER_MESSAGE: &str = "msg_user";

#[derive(Default)]
pub struct FakeState {
    /// Returned by `create_run`.
    pub created_run: Option<Run>,
    /// Returned by successive `retrieve_run` calls; the last entry repeats.
    pub polls: VecDeque<Run>,
    /// Returned by successive `submit_tool_outputs` calls; the last entry repeats.
    pub after_submit: VecDeque<Run>,
    pub message_pages: VecDeque<MessageList>,
    pub files: HashMap<String, (String, Vec<u8>)>,
    pub fail_file_content: bool,
    /// `retrieve_run` never answers.
    pub stall_polls: bool,
    /// `retrieve_run` answers with this HTTP status.
    pub fail_polls: Option<u16>,

    pub calls: Vec<String>,
    pub posted_messages: Vec<String>,
    pub submitted: Vec<Vec<ToolOutput>>,
    pub cancelled: Vec<String>,
    pub list_cursors: Vec<String>,
    pub uploaded: Vec<PathBuf>,
    pub assistant_requests: Vec<Value>,
}

#[derive(Clone, Default)]
pub struct FakeAssistantsApi {
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeAssistantsApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(self, configure: impl FnOnce(&mut FakeState)) -> Self {
        configure(&mut self.state.lock().expect("fake state"));
        self
    }

    pub fn inspect<R>(&self, read: impl FnOnce(&FakeState) -> R) -> R {
        read(&self.state.lock().expect("fake state"))
    }

    fn record(&self, call: String) {
        self.state.lock().expect("fake state").calls.push(call);
    }
}

fn next_or_last(queue: &mut VecDeque<Run>, what: &str) -> Result<Run, ApiError> {
    if queue.len() > 1 {
        queue
            .pop_front()
            .ok_or_else(|| ApiError::Decode(format!("no scripted {what}")))
    } else {
        queue
            .front()
            .cloned()
            .ok_or_else(|| ApiError::Decode(format!("no scripted {what}")))
    }
}

pub fn run(id: &str, status: RunStatus) -> Run {
    Run {
        id: id.to_string(),
        thread_id: TEST_THREAD.to_string(),
        status,
        required_action: None,
        last_error: None,
        incomplete_details: None,
    }
}

pub fn failed_run(id: &str, code: &str, message: &str) -> Run {
    Run {
        last_error: Some(RunError {
            code: code.to_string(),
            message: message.to_string(),
        }),
        ..run(id, RunStatus::Failed)
    }
}

/// A run blocked on `(call_id, function_name, arguments)` tool calls.
pub fn run_requiring(id: &str, calls: &[(&str, &str, &str)]) -> Run {
    let tool_calls = calls
        .iter()
        .map(|(call_id, name, arguments)| RequiredToolCall {
            id: call_id.to_string(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        })
        .collect();
    Run {
        required_action: Some(RequiredAction {
            kind: "submit_tool_outputs".to_string(),
            submit_tool_outputs: SubmitToolOutputsAction { tool_calls },
        }),
        ..run(id, RunStatus::RequiresAction)
    }
}

pub fn text_message(id: &str, role: &str, value: &str) -> ThreadMessage {
    ThreadMessage {
        id: id.to_string(),
        role: role.to_string(),
        content: vec![MessageContent::Text {
            text: TextContent {
                value: value.to_string(),
                annotations: Vec::new(),
            },
        }],
        run_id: None,
        created_at: None,
    }
}

pub fn page(data: Vec<ThreadMessage>, has_more: bool) -> MessageList {
    let last_id = data.last().map(|message| message.id.clone());
    MessageList {
        data,
        last_id,
        has_more,
    }
}

#[async_trait]
impl AssistantsApi for FakeAssistantsApi {
    async fn create_thread(&self) -> Result<Thread, ApiError> {
        self.record("create_thread".to_string());
        Ok(Thread {
            id: TEST_THREAD.to_string(),
            created_at: None,
        })
    }

    async fn create_user_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<ThreadMessage, ApiError> {
        let mut state = self.state.lock().expect("fake state");
        state.calls.push(format!("create_user_message {thread_id}"));
        state.posted_messages.push(content.to_string());
        Ok(text_message(TEST_USER_MESSAGE, "user", content))
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, ApiError> {
        let mut state = self.state.lock().expect("fake state");
        state
            .calls
            .push(format!("create_run {thread_id} {assistant_id}"));
        state
            .created_run
            .clone()
            .ok_or_else(|| ApiError::Decode("no scripted run".to_string()))
    }

    async fn retrieve_run(&self, _thread_id: &str, run_id: &str) -> Result<Run, ApiError> {
        let stall = {
            let mut state = self.state.lock().expect("fake state");
            state.calls.push(format!("retrieve_run {run_id}"));
            if let Some(status) = state.fail_polls {
                return Err(ApiError::Status {
                    status,
                    message: "transient".to_string(),
                });
            }
            state.stall_polls
        };
        if stall {
            std::future::pending::<()>().await;
        }
        let mut state = self.state.lock().expect("fake state");
        next_or_last(&mut state.polls, "poll")
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, ApiError> {
        let mut state = self.state.lock().expect("fake state");
        state.calls.push(format!("submit_tool_outputs {run_id}"));
        state.submitted.push(outputs.to_vec());
        next_or_last(&mut state.after_submit, "submission")
    }

    async fn cancel_run(&self, _thread_id: &str, run_id: &str) -> Result<Run, ApiError> {
        let mut state = self.state.lock().expect("fake state");
        state.calls.push(format!("cancel_run {run_id}"));
        state.cancelled.push(run_id.to_string());
        Ok(run(run_id, RunStatus::Cancelling))
    }

    async fn list_messages_after(
        &self,
        _thread_id: &str,
        after: &str,
    ) -> Result<MessageList, ApiError> {
        let mut state = self.state.lock().expect("fake state");
        state.calls.push(format!("list_messages_after {after}"));
        state.list_cursors.push(after.to_string());
        Ok(state
            .message_pages
            .pop_front()
            .unwrap_or_else(|| page(Vec::new(), false)))
    }

    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject, ApiError> {
        let mut state = self.state.lock().expect("fake state");
        state.calls.push(format!("retrieve_file {file_id}"));
        let (filename, bytes) = state.files.get(file_id).ok_or(ApiError::Status {
            status: 404,
            message: format!("No such File object: {file_id}"),
        })?;
        Ok(FileObject {
            id: file_id.to_string(),
            filename: filename.clone(),
            bytes: Some(bytes.len() as u64),
            purpose: Some("assistants_output".to_string()),
        })
    }

    async fn file_content(&self, file_id: &str) -> Result<Vec<u8>, ApiError> {
        let mut state = self.state.lock().expect("fake state");
        state.calls.push(format!("file_content {file_id}"));
        if state.fail_file_content {
            return Err(ApiError::Status {
                status: 500,
                message: "storage unavailable".to_string(),
            });
        }
        state
            .files
            .get(file_id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or(ApiError::Status {
                status: 404,
                message: format!("No such File object: {file_id}"),
            })
    }

    async fn upload_file(&self, path: &Path) -> Result<FileObject, ApiError> {
        let mut state = self.state.lock().expect("fake state");
        let index = state.uploaded.len();
        state.calls.push(format!("upload_file {}", path.display()));
        state.uploaded.push(path.to_path_buf());
        Ok(FileObject {
            id: format!("file-up{index}"),
            filename: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            bytes: None,
            purpose: Some("assistants".to_string()),
        })
    }

    async fn create_assistant(
        &self,
        request: &CreateAssistantRequest,
    ) -> Result<Assistant, ApiError> {
        let mut state = self.state.lock().expect("fake state");
        state.calls.push("create_assistant".to_string());
        let value = serde_json::to_value(request).map_err(|err| ApiError::Decode(err.to_string()))?;
        state.assistant_requests.push(value);
        Ok(Assistant {
            id: "asst_new".to_string(),
            name: Some(request.name.clone()),
            model: Some(request.model.clone()),
        })
    }
}
