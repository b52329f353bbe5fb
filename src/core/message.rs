use serde::{Deserialize, Serialize};

use crate::core::annotations::Footnote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// A file the assistant produced that the user can save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadableFile {
    pub file_id: String,
    pub filename: String,
}

/// A thread message prepared for display: footnote markers in the body and
/// the footnote lines appended after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub footnotes: Vec<Footnote>,
    /// Generated images, which arrive as content parts rather than annotations.
    pub images: Vec<DownloadableFile>,
}

impl ChatMessage {
    /// Every file in this message the user may want to save, in order.
    pub fn downloads(&self) -> Vec<DownloadableFile> {
        self.footnotes
            .iter()
            .filter(|note| note.is_download())
            .map(|note| DownloadableFile {
                file_id: note.file_id.clone(),
                filename: note.filename.clone(),
            })
            .chain(self.images.iter().cloned())
            .collect()
    }
}
