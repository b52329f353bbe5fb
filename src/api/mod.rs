//! Wire payloads for the Assistants API (v2) and the client that speaks it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod client;

pub use client::{ApiError, AssistantsApi, HttpAssistantsClient};

#[derive(Debug, Clone, Deserialize)]
pub struct Thread {
    pub id: String,
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateMessageRequest {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub content: Vec<MessageContent>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextContent },
    ImageFile { image_file: FileReference },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextContent {
    pub value: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Annotation {
    FileCitation {
        text: String,
        #[serde(default)]
        start_index: Option<usize>,
        #[serde(default)]
        end_index: Option<usize>,
        file_citation: FileCitation,
    },
    FilePath {
        text: String,
        #[serde(default)]
        start_index: Option<usize>,
        #[serde(default)]
        end_index: Option<usize>,
        file_path: FileReference,
    },
    #[serde(other)]
    Unsupported,
}

impl Annotation {
    /// The span of message text this annotation marks, if known.
    pub fn text(&self) -> Option<&str> {
        match self {
            Annotation::FileCitation { text, .. } | Annotation::FilePath { text, .. } => {
                Some(text.as_str())
            }
            Annotation::Unsupported => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileCitation {
    pub file_id: String,
    #[serde(default)]
    pub quote: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileReference {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageList {
    pub data: Vec<ThreadMessage>,
    #[serde(default)]
    pub last_id: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateRunRequest {
    pub assistant_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
            RunStatus::Unknown => "unknown",
        }
    }

    /// True once the service will no longer change this run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Cancelled
                | RunStatus::Failed
                | RunStatus::Completed
                | RunStatus::Incomplete
                | RunStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    #[serde(default)]
    pub last_error: Option<RunError>,
    #[serde(default)]
    pub incomplete_details: Option<IncompleteDetails>,
}

impl Run {
    /// Tool calls the run is blocked on; empty unless status is `requires_action`.
    pub fn pending_tool_calls(&self) -> &[RequiredToolCall] {
        self.required_action
            .as_ref()
            .map(|action| action.submit_tool_outputs.tool_calls.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequiredAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub submit_tool_outputs: SubmitToolOutputsAction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitToolOutputsAction {
    pub tool_calls: Vec<RequiredToolCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequiredToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncompleteDetails {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitToolOutputsRequest<'a> {
    pub tool_outputs: &'a [ToolOutput],
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileObject {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantTool {
    CodeInterpreter,
    FileSearch,
    Function { function: FunctionDefinition },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolResources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_interpreter: Option<CodeInterpreterResources>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_search: Option<FileSearchResources>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeInterpreterResources {
    pub file_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSearchResources {
    pub vector_stores: Vec<VectorStoreSeed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VectorStoreSeed {
    pub file_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateAssistantRequest {
    pub name: String,
    pub instructions: String,
    pub model: String,
    pub tools: Vec<AssistantTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_resources: Option<ToolResources>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Assistant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_with_required_action_exposes_tool_calls() {
        let raw = r#"{
            "id": "run_1",
            "object": "thread.run",
            "thread_id": "thread_1",
            "status": "requires_action",
            "required_action": {
                "type": "submit_tool_outputs",
                "submit_tool_outputs": {
                    "tool_calls": [
                        {"id": "call_a", "type": "function",
                         "function": {"name": "get_random_letters", "arguments": "{\"count\":5}"}}
                    ]
                }
            },
            "last_error": null
        }"#;
        let run: Run = serde_json::from_str(raw).expect("run should parse");
        assert_eq!(run.status, RunStatus::RequiresAction);
        let calls = run.pending_tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].function.name, "get_random_letters");
        assert_eq!(calls[0].function.arguments, r#"{"count":5}"#);
    }

    #[test]
    fn completed_run_has_no_pending_calls() {
        let raw = r#"{"id":"run_2","thread_id":"thread_1","status":"completed"}"#;
        let run: Run = serde_json::from_str(raw).expect("run should parse");
        assert!(run.pending_tool_calls().is_empty());
        assert!(run.status.is_terminal());
        assert!(!RunStatus::Cancelling.is_terminal());
    }

    #[test]
    fn unrecognised_run_status_parses_as_unknown() {
        let raw = r#"{"id":"run_3","thread_id":"thread_1","status":"paused"}"#;
        let run: Run = serde_json::from_str(raw).expect("run should parse");
        assert_eq!(run.status, RunStatus::Unknown);
        assert!(!run.status.is_terminal());
    }

    #[test]
    fn message_content_parses_annotations_and_skips_unknown_parts() {
        let raw = r#"{
            "id": "msg_2",
            "role": "assistant",
            "content": [
                {"type": "text", "text": {
                    "value": "See the manual【4:0†source】 and data.csv",
                    "annotations": [
                        {"type": "file_citation", "text": "【4:0†source】",
                         "start_index": 14, "end_index": 26,
                         "file_citation": {"file_id": "file-pdf"}},
                        {"type": "file_path", "text": "sandbox:/mnt/data/data.csv",
                         "file_path": {"file_id": "file-csv"}},
                        {"type": "something_new", "text": "x"}
                    ]
                }},
                {"type": "image_file", "image_file": {"file_id": "file-png"}},
                {"type": "refusal", "refusal": "no"}
            ]
        }"#;
        let message: ThreadMessage = serde_json::from_str(raw).expect("message should parse");
        assert_eq!(message.content.len(), 3);
        match &message.content[0] {
            MessageContent::Text { text } => {
                assert_eq!(text.annotations.len(), 3);
                assert_eq!(text.annotations[0].text(), Some("【4:0†source】"));
                assert!(matches!(text.annotations[2], Annotation::Unsupported));
            }
            other => panic!("expected text content, got {other:?}"),
        }
        assert!(matches!(
            &message.content[1],
            MessageContent::ImageFile { image_file } if image_file.file_id == "file-png"
        ));
        assert!(matches!(message.content[2], MessageContent::Unsupported));
    }

    #[test]
    fn assistant_request_serializes_tool_tags() {
        let request = CreateAssistantRequest {
            name: "All Tools Assistant".to_string(),
            instructions: "Be brief.".to_string(),
            model: "gpt-4o".to_string(),
            tools: vec![
                AssistantTool::CodeInterpreter,
                AssistantTool::FileSearch,
                AssistantTool::Function {
                    function: FunctionDefinition {
                        name: "get_random_digit".to_string(),
                        description: "Get a random digit".to_string(),
                        parameters: serde_json::json!({"type": "object", "properties": {}}),
                    },
                },
            ],
            tool_resources: None,
        };
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value["tools"][0]["type"], "code_interpreter");
        assert_eq!(value["tools"][1]["type"], "file_search");
        assert_eq!(value["tools"][2]["type"], "function");
        assert_eq!(value["tools"][2]["function"]["name"], "get_random_digit");
        assert!(value.get("tool_resources").is_none());
    }
}
