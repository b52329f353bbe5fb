//! Persistent configuration stored as TOML in the platform config directory.
//!
//! Besides user preferences this file remembers the id of the remote
//! assistant once it has been registered, so later launches reuse it instead
//! of uploading the reference files again.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

use crate::utils::url::DEFAULT_BASE_URL;

pub const DEFAULT_LOG_FILE: &str = "AssistantLog.md";
pub const DEFAULT_ASSISTANT_NAME: &str = "All Tools Assistant";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_INSTRUCTIONS: &str = "Format your responses in markdown. \
Reference the provided files for any request involving them. \
If you use information from the files, note that and list the filename of each file you used.";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AssistantProfile {
    pub name: String,
    pub model: String,
    pub instructions: String,
    /// Files the code interpreter can open.
    #[serde(default)]
    pub code_interpreter_files: Vec<PathBuf>,
    /// Files indexed for retrieval (file search).
    #[serde(default)]
    pub retrieval_files: Vec<PathBuf>,
}

impl Default for AssistantProfile {
    fn default() -> Self {
        Self {
            name: DEFAULT_ASSISTANT_NAME.to_string(),
            model: DEFAULT_MODEL.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            code_interpreter_files: Vec::new(),
            retrieval_files: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub backoff_factor: f64,
    pub max_wait_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1000,
            max_interval_ms: 8000,
            backoff_factor: 1.5,
            max_wait_secs: 600,
        }
    }
}

/// Backoff schedule for polling a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSettings {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub backoff_factor: f64,
    pub max_wait: Duration,
}

impl PollSettings {
    /// The interval that follows `current`, never shorter than it and never
    /// longer than `max_interval`.
    pub fn next_interval(&self, current: Duration) -> Duration {
        let factor = if self.backoff_factor.is_finite() && self.backoff_factor >= 1.0 {
            self.backoff_factor
        } else {
            1.0
        };
        Duration::try_from_secs_f64(current.as_secs_f64() * factor)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        PollingConfig::default().into()
    }
}

impl From<PollingConfig> for PollSettings {
    fn from(config: PollingConfig) -> Self {
        let initial = Duration::from_millis(config.initial_interval_ms.max(1));
        Self {
            initial_interval: initial,
            max_interval: Duration::from_millis(config.max_interval_ms).max(initial),
            backoff_factor: config.backoff_factor,
            max_wait: Duration::from_secs(config.max_wait_secs),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// API base URL; defaults to the public OpenAI endpoint.
    pub base_url: Option<String>,
    /// API key stored in plain text. The keyring is preferred.
    pub api_key: Option<String>,
    /// Remote assistant created on first use.
    pub assistant_id: Option<String>,
    /// Transcript file; defaults to `AssistantLog.md` in the working directory.
    pub log_file: Option<PathBuf>,
    /// Where generated files are saved; defaults to the user's download directory.
    pub download_dir: Option<PathBuf>,
    #[serde(default)]
    pub assistant: AssistantProfile,
    #[serde(default)]
    pub polling: PollingConfig,
}

impl Config {
    pub fn load() -> Result<Config, Box<dyn Error>> {
        Self::load_from_path(&Self::config_path()?)
    }

    pub fn load_from_path(config_path: &Path) -> Result<Config, Box<dyn Error>> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save_to_path(&self, config_path: &Path) -> Result<(), Box<dyn Error>> {
        let parent = config_path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let contents = toml::to_string_pretty(self)?;

        // Write beside the target and rename, so a crash never leaves half a file.
        let mut temp_file = NamedTempFile::new_in(parent)?;
        temp_file.write_all(contents.as_bytes())?;
        temp_file.flush()?;
        temp_file.persist(config_path)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf, Box<dyn Error>> {
        let proj_dirs = ProjectDirs::from("org", "palaver", "palaver")
            .ok_or("Failed to determine config directory")?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(|| {
                directories::UserDirs::new()
                    .and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
            })
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn poll_settings(&self) -> PollSettings {
        self.polling.clone().into()
    }

    /// Record the assistant id and write it back to `config_path`.
    pub fn remember_assistant(
        &mut self,
        assistant_id: &str,
        config_path: &Path,
    ) -> Result<(), Box<dyn Error>> {
        self.assistant_id = Some(assistant_id.to_string());
        self.save_to_path(config_path)
    }

    pub fn print_all(&self) {
        println!("Current configuration:");
        println!("  base-url: {}", self.base_url());
        match &self.api_key {
            Some(_) => println!("  api-key: (set in config)"),
            None => println!("  api-key: (unset)"),
        }
        match &self.assistant_id {
            Some(id) => println!("  assistant-id: {id}"),
            None => println!("  assistant-id: (not registered yet)"),
        }
        println!("  log-file: {}", self.log_file().display());
        println!("  download-dir: {}", self.download_dir().display());
        println!("  assistant:");
        println!("    name: {}", self.assistant.name);
        println!("    model: {}", self.assistant.model);
        println!(
            "    code-interpreter-files: {}",
            self.assistant.code_interpreter_files.len()
        );
        println!("    retrieval-files: {}", self.assistant.retrieval_files.len());
        println!("  polling:");
        println!(
            "    interval: {}ms → {}ms (x{})",
            self.polling.initial_interval_ms,
            self.polling.max_interval_ms,
            self.polling.backoff_factor
        );
        println!("    max-wait: {}s", self.polling.max_wait_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_nonexistent_config_gives_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("missing.toml");

        let config = Config::load_from_path(&config_path).expect("Failed to load config");
        assert_eq!(config, Config::default());
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.log_file(), PathBuf::from(DEFAULT_LOG_FILE));
        assert_eq!(config.assistant.name, DEFAULT_ASSISTANT_NAME);
    }

    #[test]
    fn remembered_assistant_survives_reload() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config
            .remember_assistant("asst_123", &config_path)
            .expect("Failed to save config");

        let loaded = Config::load_from_path(&config_path).expect("Failed to load config");
        assert_eq!(loaded.assistant_id.as_deref(), Some("asst_123"));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
base_url = "http://localhost:4010/v1"

[assistant]
name = "Docs"
model = "gpt-4o-mini"
instructions = "Answer from the docs."
retrieval_files = ["manual.pdf"]

[polling]
max_wait_secs = 30
"#,
        )
        .expect("write config");

        let config = Config::load_from_path(&config_path).expect("Failed to load config");
        assert_eq!(config.base_url(), "http://localhost:4010/v1");
        assert_eq!(config.assistant.retrieval_files, vec![PathBuf::from("manual.pdf")]);
        assert!(config.assistant.code_interpreter_files.is_empty());
        assert_eq!(config.polling.max_wait_secs, 30);
        assert_eq!(config.polling.initial_interval_ms, 1000);

        let poll = config.poll_settings();
        assert_eq!(poll.max_wait, Duration::from_secs(30));
        assert_eq!(poll.initial_interval, Duration::from_secs(1));
    }

    #[test]
    fn backoff_grows_then_caps() {
        let poll = PollSettings {
            initial_interval: Duration::from_millis(1000),
            max_interval: Duration::from_millis(3000),
            backoff_factor: 2.0,
            max_wait: Duration::from_secs(60),
        };
        let second = poll.next_interval(poll.initial_interval);
        assert_eq!(second, Duration::from_millis(2000));
        assert_eq!(poll.next_interval(second), Duration::from_millis(3000));
        assert_eq!(
            poll.next_interval(Duration::from_millis(3000)),
            Duration::from_millis(3000)
        );
    }

    #[test]
    fn shrinking_backoff_factor_is_ignored() {
        let poll = PollSettings {
            backoff_factor: 0.5,
            ..PollSettings::default()
        };
        assert_eq!(
            poll.next_interval(Duration::from_secs(2)),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn enormous_backoff_factor_caps_instead_of_overflowing() {
        let poll: PollSettings = PollingConfig {
            backoff_factor: 1e300,
            ..PollingConfig::default()
        }
        .into();
        assert_eq!(poll.next_interval(poll.initial_interval), poll.max_interval);
        assert_eq!(poll.next_interval(poll.max_interval), poll.max_interval);
    }

    #[test]
    fn max_interval_never_below_initial() {
        let poll: PollSettings = PollingConfig {
            initial_interval_ms: 5000,
            max_interval_ms: 100,
            ..PollingConfig::default()
        }
        .into();
        assert_eq!(poll.max_interval, Duration::from_millis(5000));
    }
}
