//! Append-only markdown transcript of each session.
//!
//! The file is opened, appended and closed on every write; no handle is held
//! between turns.

use crate::core::message::ChatMessage;
use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct TranscriptLog {
    file_path: Option<PathBuf>,
    is_active: bool,
}

impl TranscriptLog {
    pub fn new(log_file: Option<PathBuf>) -> Self {
        let is_active = log_file.is_some();
        TranscriptLog {
            file_path: log_file,
            is_active,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Pause or resume writing. Returns a status line for the UI.
    pub fn toggle_logging(&mut self) -> Result<String, Box<dyn std::error::Error>> {
        match &self.file_path {
            Some(path) => {
                self.is_active = !self.is_active;
                if self.is_active {
                    Ok(format!("Logging resumed to: {}", path.display()))
                } else {
                    Ok(format!("Logging paused (file: {})", path.display()))
                }
            }
            None => Err("No transcript file configured.".into()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn get_status_string(&self) -> String {
        let file_name = |path: &Path| {
            path.file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .into_owned()
        };
        match (&self.file_path, self.is_active) {
            (None, _) => "disabled".to_string(),
            (Some(path), true) => format!("active ({})", file_name(path)),
            (Some(path), false) => format!("paused ({})", file_name(path)),
        }
    }

    pub fn log_session_start(&self, thread_id: &str) -> std::io::Result<()> {
        self.log_session_start_at(thread_id, Local::now())
    }

    pub fn log_session_start_at(
        &self,
        thread_id: &str,
        started: DateTime<Local>,
    ) -> std::io::Result<()> {
        self.append(&format!(
            "# {}\nBeginning {}\n\n",
            started.format("%Y-%m-%d %H:%M:%S"),
            thread_id
        ))
    }

    pub fn log_user_message(&self, text: &str) -> std::io::Result<()> {
        self.append(&format!("**User:** `{text}`\n"))
    }

    /// One assistant block per completed turn, closed by a horizontal rule.
    pub fn log_assistant_messages(&self, messages: &[ChatMessage]) -> std::io::Result<()> {
        let mut block = String::from("\n**Assistant**:\n");
        for message in messages {
            block.push_str(&message.content);
            block.push('\n');
        }
        block.push_str("\n---\n");
        self.append(&block)
    }

    fn append(&self, content: &str) -> std::io::Result<()> {
        let Some(file_path) = self.file_path.as_ref().filter(|_| self.is_active) else {
            return Ok(());
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(content.as_bytes())?;
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Role;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    fn assistant(content: &str) -> ChatMessage {
        ChatMessage {
            id: "msg".to_string(),
            role: Role::Assistant,
            content: content.to_string(),
            footnotes: Vec::new(),
            images: Vec::new(),
        }
    }

    #[test]
    fn writes_session_in_transcript_format() {
        let temp_dir = TempDir::new().expect("temp dir");
        let path = temp_dir.path().join("AssistantLog.md");
        let log = TranscriptLog::new(Some(path.clone()));

        let started = Local
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
            .single()
            .expect("valid time");
        log.log_session_start_at("thread_abc", started).expect("start");
        log.log_user_message("What is 2+2?").expect("user");
        log.log_assistant_messages(&[assistant("4"), assistant("Anything else?")])
            .expect("assistant");

        let contents = fs::read_to_string(&path).expect("read log");
        assert_eq!(
            contents,
            "# 2024-03-09 14:05:07\nBeginning thread_abc\n\n\
             **User:** `What is 2+2?`\n\
             \n**Assistant**:\n4\nAnything else?\n\n---\n"
        );
    }

    #[test]
    fn appends_across_instances() {
        let temp_dir = TempDir::new().expect("temp dir");
        let path = temp_dir.path().join("log.md");

        TranscriptLog::new(Some(path.clone()))
            .log_user_message("first")
            .expect("first");
        TranscriptLog::new(Some(path.clone()))
            .log_user_message("second")
            .expect("second");

        let contents = fs::read_to_string(&path).expect("read log");
        assert_eq!(contents, "**User:** `first`\n**User:** `second`\n");
    }

    #[test]
    fn paused_log_writes_nothing() {
        let temp_dir = TempDir::new().expect("temp dir");
        let path = temp_dir.path().join("log.md");
        let mut log = TranscriptLog::new(Some(path.clone()));

        let status = log.toggle_logging().expect("toggle");
        assert!(status.starts_with("Logging paused"));
        assert_eq!(log.get_status_string(), "paused (log.md)");
        log.log_user_message("hidden").expect("no-op");
        assert!(!path.exists());

        log.toggle_logging().expect("toggle back");
        assert!(log.is_active());
        assert_eq!(log.get_status_string(), "active (log.md)");
    }

    #[test]
    fn disabled_log_cannot_toggle() {
        let mut log = TranscriptLog::disabled();
        assert!(log.toggle_logging().is_err());
        assert_eq!(log.get_status_string(), "disabled");
        assert!(log.log_user_message("ignored").is_ok());
    }
}
