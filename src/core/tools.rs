//! Local functions the remote assistant may call mid-run.
//!
//! Each tool has a JSON-Schema declaration advertised when the assistant is
//! registered and a typed decoder used when a run asks for it. Arguments are
//! checked against the declaration before decoding, so a bad call becomes a
//! [`ToolError`] rather than a panic or an opaque invocation failure.

use std::error::Error;
use std::fmt;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::api::{FunctionDefinition, RequiredToolCall, ToolOutput};

pub const RANDOM_DIGIT_TOOL: &str = "get_random_digit";
pub const RANDOM_LETTERS_TOOL: &str = "get_random_letters";
pub const MAX_RANDOM_LETTERS: u32 = 1024;

const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const MIXED_CASE: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    UnknownTool(String),
    InvalidArguments { tool: String, reason: String },
    Randomness(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::UnknownTool(name) => write!(f, "assistant requested unknown tool '{name}'"),
            ToolError::InvalidArguments { tool, reason } => {
                write!(f, "invalid arguments for {tool}: {reason}")
            }
            ToolError::Randomness(detail) => write!(f, "random source unavailable: {detail}"),
        }
    }
}

impl Error for ToolError {}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RandomLettersArgs {
    pub count: u32,
    #[serde(default)]
    pub case_sensitive: bool,
}

/// A decoded, validated tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    RandomDigit,
    RandomLetters(RandomLettersArgs),
}

/// Declarations for every registered tool, in advertisement order.
pub fn tool_definitions() -> Vec<FunctionDefinition> {
    vec![
        FunctionDefinition {
            name: RANDOM_DIGIT_TOOL.to_string(),
            description: "Get a random digit".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {},
            }),
        },
        FunctionDefinition {
            name: RANDOM_LETTERS_TOOL.to_string(),
            description: "Get a string of random letters".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "count": {
                        "type": "integer",
                        "minimum": 0,
                        "maximum": MAX_RANDOM_LETTERS,
                        "description": "Number of letters to return"
                    },
                    "case_sensitive": {
                        "type": "boolean",
                        "description": "Whether to include lower-case letters. Default only returns upper-case letters."
                    }
                },
                "required": ["count"]
            }),
        },
    ]
}

impl ToolInvocation {
    /// Resolve a tool call by exact name and decode its JSON argument string.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, ToolError> {
        let definition = tool_definitions()
            .into_iter()
            .find(|definition| definition.name == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let invalid = |reason: String| ToolError::InvalidArguments {
            tool: name.to_string(),
            reason,
        };

        let arguments = if arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str::<Value>(arguments).map_err(|err| invalid(err.to_string()))?
        };

        let validator = jsonschema::validator_for(&definition.parameters)
            .map_err(|err| invalid(format!("tool schema rejected: {err}")))?;
        let violations: Vec<String> = validator
            .iter_errors(&arguments)
            .map(|err| err.to_string())
            .collect();
        if !violations.is_empty() {
            return Err(invalid(violations.join("; ")));
        }

        match name {
            RANDOM_DIGIT_TOOL => Ok(ToolInvocation::RandomDigit),
            RANDOM_LETTERS_TOOL => serde_json::from_value::<RandomLettersArgs>(arguments)
                .map(ToolInvocation::RandomLetters)
                .map_err(|err| invalid(err.to_string())),
            _ => Err(ToolError::UnknownTool(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolInvocation::RandomDigit => RANDOM_DIGIT_TOOL,
            ToolInvocation::RandomLetters(_) => RANDOM_LETTERS_TOOL,
        }
    }

    pub fn execute(&self) -> Result<Value, ToolError> {
        match self {
            ToolInvocation::RandomDigit => Ok(json!(get_random_digit()?)),
            ToolInvocation::RandomLetters(args) => {
                Ok(json!(get_random_letters(args.count, args.case_sensitive)?))
            }
        }
    }
}

pub fn get_random_digit() -> Result<u8, ToolError> {
    Ok(random_below(10)? as u8)
}

pub fn get_random_letters(count: u32, case_sensitive: bool) -> Result<String, ToolError> {
    let alphabet = if case_sensitive { MIXED_CASE } else { UPPERCASE };
    (0..count)
        .map(|_| random_below(alphabet.len() as u32).map(|i| alphabet[i as usize] as char))
        .collect()
}

/// Uniform value in `0..bound`, rejecting the biased tail of the u32 range.
fn random_below(bound: u32) -> Result<u32, ToolError> {
    let zone = u32::MAX - (u32::MAX % bound);
    loop {
        let mut bytes = [0_u8; 4];
        getrandom::fill(&mut bytes).map_err(|err| ToolError::Randomness(err.to_string()))?;
        let value = u32::from_le_bytes(bytes);
        if value < zone {
            return Ok(value % bound);
        }
    }
}

/// A tool call that was executed, kept for display and logging.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedToolCall {
    pub tool_call_id: String,
    pub name: String,
    pub arguments: String,
    pub output: String,
}

/// Run every requested call in order, producing one output per call id.
///
/// Stops at the first call that cannot be resolved; nothing is submitted for
/// a partially resolved batch.
pub fn resolve_tool_calls(
    calls: &[RequiredToolCall],
) -> Result<(Vec<ToolOutput>, Vec<ResolvedToolCall>), ToolError> {
    let mut outputs = Vec::with_capacity(calls.len());
    let mut resolved = Vec::with_capacity(calls.len());

    for call in calls {
        let invocation = ToolInvocation::parse(&call.function.name, &call.function.arguments)?;
        let value = invocation.execute()?;
        let output = serde_json::to_string(&value).map_err(|err| ToolError::InvalidArguments {
            tool: call.function.name.clone(),
            reason: format!("output not serializable: {err}"),
        })?;
        debug!(
            tool = invocation.name(),
            tool_call_id = %call.id,
            arguments = %call.function.arguments,
            output = %output,
            "resolved tool call"
        );
        outputs.push(ToolOutput {
            tool_call_id: call.id.clone(),
            output: output.clone(),
        });
        resolved.push(ResolvedToolCall {
            tool_call_id: call.id.clone(),
            name: call.function.name.clone(),
            arguments: call.function.arguments.clone(),
            output,
        });
    }

    Ok((outputs, resolved))
}
