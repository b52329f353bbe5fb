//! One-time registration of the remote assistant.

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::api::{
    ApiError, AssistantTool, AssistantsApi, CodeInterpreterResources, CreateAssistantRequest,
    FileSearchResources, ToolResources, VectorStoreSeed,
};
use crate::core::config::{AssistantProfile, Config};
use crate::core::tools::tool_definitions;

#[derive(Debug)]
pub enum RegistrationError {
    MissingFile(PathBuf),
    Api(ApiError),
    Save(String),
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::MissingFile(path) => {
                write!(f, "reference file not found: {}", path.display())
            }
            RegistrationError::Api(err) => write!(f, "could not register assistant: {err}"),
            RegistrationError::Save(detail) => {
                write!(f, "assistant registered but its id could not be saved: {detail}")
            }
        }
    }
}

impl Error for RegistrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RegistrationError::Api(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ApiError> for RegistrationError {
    fn from(err: ApiError) -> Self {
        RegistrationError::Api(err)
    }
}

/// Return the configured assistant id, registering a new assistant first if
/// there is none. A fresh id is written back to `config_path`.
pub async fn ensure_assistant(
    api: &dyn AssistantsApi,
    config: &mut Config,
    config_path: &Path,
) -> Result<String, RegistrationError> {
    if let Some(id) = config.assistant_id.as_deref().filter(|id| !id.is_empty()) {
        info!(assistant_id = %id, "reusing registered assistant");
        return Ok(id.to_string());
    }

    let profile = &config.assistant;
    let code_interpreter_ids = upload_all(api, &profile.code_interpreter_files).await?;
    let retrieval_ids = upload_all(api, &profile.retrieval_files).await?;
    let request = build_request(profile, code_interpreter_ids, retrieval_ids);

    let assistant = api.create_assistant(&request).await?;
    info!(assistant_id = %assistant.id, name = %request.name, "registered assistant");

    config
        .remember_assistant(&assistant.id, config_path)
        .map_err(|err| RegistrationError::Save(err.to_string()))?;
    Ok(assistant.id)
}

async fn upload_all(
    api: &dyn AssistantsApi,
    paths: &[PathBuf],
) -> Result<Vec<String>, RegistrationError> {
    let mut ids = Vec::with_capacity(paths.len());
    for path in paths {
        if !path.is_file() {
            return Err(RegistrationError::MissingFile(path.clone()));
        }
        let file = api.upload_file(path).await?;
        info!(file_id = %file.id, path = %path.display(), "uploaded reference file");
        ids.push(file.id);
    }
    Ok(ids)
}

fn build_request(
    profile: &AssistantProfile,
    code_interpreter_ids: Vec<String>,
    retrieval_ids: Vec<String>,
) -> CreateAssistantRequest {
    let mut tools = vec![AssistantTool::CodeInterpreter, AssistantTool::FileSearch];
    tools.extend(
        tool_definitions()
            .into_iter()
            .map(|function| AssistantTool::Function { function }),
    );

    let resources = ToolResources {
        code_interpreter: (!code_interpreter_ids.is_empty()).then(|| CodeInterpreterResources {
            file_ids: code_interpreter_ids,
        }),
        file_search: (!retrieval_ids.is_empty()).then(|| FileSearchResources {
            vector_stores: vec![VectorStoreSeed {
                file_ids: retrieval_ids,
            }],
        }),
    };
    let has_resources = resources.code_interpreter.is_some() || resources.file_search.is_some();

    CreateAssistantRequest {
        name: profile.name.clone(),
        instructions: profile.instructions.clone(),
        model: profile.model.clone(),
        tools,
        tool_resources: has_resources.then_some(resources),
    }
}
