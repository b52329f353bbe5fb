//! Masked single-line prompt for entering an API key.

use ratatui::crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

const REVEAL_TAIL_CHARS: usize = 4;

#[derive(Debug, Clone)]
pub struct PromptError {
    message: String,
}

impl PromptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PromptError {}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaskedInput {
    pub text: String,
    pub reveal_tail: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskedOutcome {
    Continue,
    Submit(String),
    Cancelled,
}

impl MaskedInput {
    pub fn apply_key(&mut self, key: &KeyEvent) -> MaskedOutcome {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Enter => MaskedOutcome::Submit(self.text.trim().to_string()),
            KeyCode::Esc => MaskedOutcome::Cancelled,
            KeyCode::Char('c') if ctrl => MaskedOutcome::Cancelled,
            KeyCode::Char('u') if ctrl => {
                self.text.clear();
                MaskedOutcome::Continue
            }
            KeyCode::Backspace => {
                self.text.pop();
                MaskedOutcome::Continue
            }
            KeyCode::F(2) => {
                self.reveal_tail = !self.reveal_tail;
                MaskedOutcome::Continue
            }
            KeyCode::Char(c) if !ctrl => {
                self.text.push(c);
                MaskedOutcome::Continue
            }
            _ => MaskedOutcome::Continue,
        }
    }

    pub fn paste(&mut self, text: &str) {
        self.text
            .extend(text.chars().filter(|c| !c.is_control() && !c.is_whitespace()));
    }

    pub fn display(&self) -> String {
        let len = self.text.chars().count();
        if self.reveal_tail && len >= REVEAL_TAIL_CHARS {
            let hidden = len - REVEAL_TAIL_CHARS;
            let tail: String = self.text.chars().skip(hidden).collect();
            format!("{}{}", "*".repeat(hidden), tail)
        } else {
            "*".repeat(len)
        }
    }
}

/// Read a secret from the terminal without echoing it.
pub fn prompt_masked(prompt: &str) -> Result<String, PromptError> {
    let io_err = |err: io::Error| PromptError::new(err.to_string());
    enable_raw_mode().map_err(io_err)?;
    let mut stdout = io::stdout();
    execute!(stdout, event::EnableBracketedPaste).map_err(io_err)?;

    let result = (|| -> Result<String, PromptError> {
        let mut input = MaskedInput::default();
        redraw(prompt, &input).map_err(io_err)?;
        loop {
            if !event::poll(Duration::from_millis(100)).map_err(io_err)? {
                continue;
            }
            match event::read().map_err(io_err)? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    match input.apply_key(&key) {
                        MaskedOutcome::Continue => {}
                        MaskedOutcome::Submit(value) => break Ok(value),
                        MaskedOutcome::Cancelled => {
                            break Err(PromptError::new("Cancelled by user"))
                        }
                    }
                }
                Event::Paste(text) => input.paste(&text),
                _ => continue,
            }
            redraw(prompt, &input).map_err(io_err)?;
        }
    })();

    let restore_raw = disable_raw_mode().map_err(io_err);
    let restore_paste = execute!(stdout, event::DisableBracketedPaste).map_err(io_err);
    println!();

    let value = result?;
    restore_raw?;
    restore_paste?;
    Ok(value)
}

fn redraw(prompt: &str, input: &MaskedInput) -> io::Result<()> {
    print!("\r\x1b[K{}{}", prompt, input.display());
    io::stdout().flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn typing_and_submit() {
        let mut input = MaskedInput::default();
        for c in "sk-abc1".chars() {
            assert_eq!(input.apply_key(&key(KeyCode::Char(c))), MaskedOutcome::Continue);
        }
        input.apply_key(&key(KeyCode::Backspace));
        assert_eq!(input.display(), "******");
        assert_eq!(
            input.apply_key(&key(KeyCode::Enter)),
            MaskedOutcome::Submit("sk-abc".to_string())
        );
    }

    #[test]
    fn f2_reveals_last_four_characters() {
        let mut input = MaskedInput::default();
        input.paste("sk-secret-1234\n");
        input.apply_key(&key(KeyCode::F(2)));
        assert_eq!(input.display(), "**********1234");
        input.apply_key(&key(KeyCode::F(2)));
        assert_eq!(input.display(), "*".repeat(14));
    }

    #[test]
    fn escape_and_ctrl_c_cancel() {
        let mut input = MaskedInput::default();
        assert_eq!(input.apply_key(&key(KeyCode::Esc)), MaskedOutcome::Cancelled);
        assert_eq!(
            input.apply_key(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            MaskedOutcome::Cancelled
        );
    }
}
