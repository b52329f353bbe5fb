//! API key lookup and the `auth` / `deauth` commands.
//!
//! Lookup order is the `OPENAI_API_KEY` environment variable, then
//! `api_key` in the config file, then the system keyring.

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::core::config::Config;
use crate::core::keyring::{self, KeyringAccessError};

mod prompt;

use self::prompt::prompt_masked;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
const MASKED_INPUT_PROMPT: &str = "Enter your OpenAI API key (F2 reveals the last 4 chars): ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    ConfigFile,
    Keyring,
}

impl CredentialSource {
    pub fn describe(self) -> &'static str {
        match self {
            CredentialSource::Environment => API_KEY_ENV,
            CredentialSource::ConfigFile => "config file",
            CredentialSource::Keyring => "system keyring",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub api_key: String,
    pub source: CredentialSource,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Resolve a key from the given environment value, the config, then the
/// keyring lookup. The keyring is only consulted when the first two are empty.
pub fn resolve_api_key_with<F>(
    env_value: Option<&str>,
    config: &Config,
    keyring_lookup: F,
) -> Result<Option<Credential>, KeyringAccessError>
where
    F: FnOnce() -> Result<Option<String>, KeyringAccessError>,
{
    if let Some(api_key) = non_empty(env_value) {
        return Ok(Some(Credential {
            api_key,
            source: CredentialSource::Environment,
        }));
    }
    if let Some(api_key) = non_empty(config.api_key.as_deref()) {
        return Ok(Some(Credential {
            api_key,
            source: CredentialSource::ConfigFile,
        }));
    }
    Ok(non_empty(keyring_lookup()?.as_deref()).map(|api_key| Credential {
        api_key,
        source: CredentialSource::Keyring,
    }))
}

pub fn resolve_api_key(config: &Config) -> Result<Option<Credential>, KeyringAccessError> {
    let env_value = std::env::var(API_KEY_ENV).ok();
    let credential = resolve_api_key_with(env_value.as_deref(), config, keyring::load_api_key)?;
    if let Some(credential) = &credential {
        debug!(source = credential.source.describe(), "resolved API key");
    }
    Ok(credential)
}

/// Block until a key is available, re-reading the config and keyring each
/// time the user presses Enter. Fails when input closes.
pub fn wait_for_credential(
    config_path: &Path,
) -> Result<(Config, Credential), Box<dyn Error>> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    wait_for_credential_with(config_path, &mut stdin.lock(), &mut stdout, resolve_api_key)
}

pub fn wait_for_credential_with<R, W, F>(
    config_path: &Path,
    input: &mut R,
    output: &mut W,
    mut resolve: F,
) -> Result<(Config, Credential), Box<dyn Error>>
where
    R: BufRead,
    W: Write,
    F: FnMut(&Config) -> Result<Option<Credential>, KeyringAccessError>,
{
    loop {
        let config = Config::load_from_path(config_path)?;
        match resolve(&config) {
            Ok(Some(credential)) => return Ok((config, credential)),
            Ok(None) => {
                writeln!(output, "No OpenAI API key found.")?;
                writeln!(
                    output,
                    "Set {API_KEY_ENV}, add api_key to {}, or run `palaver auth` in another terminal.",
                    config_path.display()
                )?;
            }
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "keyring unavailable");
                writeln!(output, "The system keyring is unavailable: {err}")?;
            }
            Err(err) => return Err(Box::new(err)),
        }
        writeln!(output, "Press Enter to try again.")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err("no API key available".into());
        }
    }
}

pub fn interactive_auth() -> Result<(), Box<dyn Error>> {
    println!("🔐 palaver authentication");
    println!("The key is stored in the system keyring (service \"{}\").", keyring::KEYRING_SERVICE);
    let api_key = prompt_masked(MASKED_INPUT_PROMPT)?;
    if api_key.is_empty() {
        return Err("API key cannot be empty".into());
    }
    keyring::store_api_key(&api_key)?;
    println!("✅ API key saved.");
    Ok(())
}

pub fn interactive_deauth() -> Result<(), Box<dyn Error>> {
    if keyring::remove_api_key()? {
        println!("✅ API key removed from the system keyring.");
    } else {
        println!("No API key was stored in the system keyring.");
    }
    if std::env::var(API_KEY_ENV).is_ok_and(|value| !value.trim().is_empty()) {
        println!("Note: {API_KEY_ENV} is still set in this environment.");
    }
    Ok(())
}
