//! Conversation state shown by the chat screen.
//!
//! The view owns everything the renderer reads. Session events are folded in
//! through [`ChatView::apply_event`]; nothing here talks to the network.

use std::time::Instant;

use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

use crate::api::RunStatus;
use crate::core::message::{ChatMessage, DownloadableFile};
use crate::core::session::SessionEvent;
use crate::utils::scroll::ScrollCalculator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    User(String),
    Assistant(String),
    Tool(String),
    Notice(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitState {
    pub status: RunStatus,
    pub polls: u32,
}

#[derive(Debug)]
pub struct ChatView {
    pub entries: Vec<Entry>,
    pub waiting: Option<WaitState>,
    pub busy: bool,
    pub scroll_offset: u16,
    pub auto_scroll: bool,
    pub pulse_start: Instant,
}

impl Default for ChatView {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            waiting: None,
            busy: false,
            scroll_offset: 0,
            auto_scroll: true,
            pulse_start: Instant::now(),
        }
    }
}

impl ChatView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_turn(&mut self, text: &str) {
        self.entries.push(Entry::User(text.to_string()));
        self.busy = true;
        self.waiting = None;
        self.auto_scroll = true;
        self.pulse_start = Instant::now();
    }

    pub fn notice(&mut self, text: impl Into<String>) {
        self.entries.push(Entry::Notice(text.into()));
        self.auto_scroll = true;
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.entries.push(Entry::Error(text.into()));
        self.auto_scroll = true;
    }

    /// Fold one session event into the view. Returns the files a completed
    /// reply wants saved.
    pub fn apply_event(&mut self, event: SessionEvent) -> Vec<DownloadableFile> {
        match event {
            SessionEvent::Waiting { status, polls, .. } => {
                self.waiting = Some(WaitState { status, polls });
                Vec::new()
            }
            SessionEvent::ToolCalls(calls) => {
                for call in calls {
                    self.entries.push(Entry::Tool(format!(
                        "{}({}) → {}",
                        call.name, call.arguments, call.output
                    )));
                }
                self.auto_scroll = true;
                Vec::new()
            }
            SessionEvent::Response(messages) => {
                self.finish_turn();
                self.push_replies(&messages);
                messages.iter().flat_map(ChatMessage::downloads).collect()
            }
            SessionEvent::Failed(message) => {
                self.finish_turn();
                self.error(message);
                Vec::new()
            }
            SessionEvent::FileSaved { filename, path } => {
                self.notice(format!("Saved {filename} to {}", path.display()));
                Vec::new()
            }
            SessionEvent::DownloadFailed { filename, error } => {
                self.error(format!("Could not save {filename}: {error}"));
                Vec::new()
            }
        }
    }

    fn finish_turn(&mut self) {
        self.busy = false;
        self.waiting = None;
        self.auto_scroll = true;
    }

    fn push_replies(&mut self, messages: &[ChatMessage]) {
        if messages.is_empty() {
            self.notice("The assistant finished without a reply.");
            return;
        }
        for message in messages {
            self.entries.push(Entry::Assistant(message.content.clone()));
        }
    }

    /// One line per text line, with a blank line between entries.
    pub fn build_display_lines(&self) -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        for entry in &self.entries {
            let (prefix, style, text) = match entry {
                Entry::User(text) => (
                    "You: ",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    text,
                ),
                Entry::Assistant(text) => ("", Style::default(), text),
                Entry::Tool(text) => ("🔧 ", Style::default().fg(Color::DarkGray), text),
                Entry::Notice(text) => ("", Style::default().fg(Color::Green), text),
                Entry::Error(text) => ("❌ ", Style::default().fg(Color::Red), text),
            };
            for (index, line) in text.lines().enumerate() {
                let lead = if index == 0 { prefix } else { "" };
                lines.push(Line::from(vec![
                    Span::styled(lead.to_string(), style),
                    Span::styled(line.to_string(), style),
                ]));
            }
            lines.push(Line::default());
        }
        lines
    }

    pub fn status_text(&self) -> String {
        match &self.waiting {
            Some(wait) => format!(
                "Assistant is working ({}, check {})",
                wait.status.as_str().replace('_', " "),
                wait.polls
            ),
            None if self.busy => "Sending…".to_string(),
            None => String::new(),
        }
    }

    fn max_offset(&self, width: u16, height: u16) -> u16 {
        let total =
            ScrollCalculator::calculate_wrapped_line_count(&self.build_display_lines(), width);
        ScrollCalculator::calculate_max_scroll_offset(total, height)
    }

    /// The offset to draw with, pinned to the bottom while auto-scrolling.
    pub fn effective_offset(&mut self, width: u16, height: u16) -> u16 {
        let max = self.max_offset(width, height);
        if self.auto_scroll {
            self.scroll_offset = max;
        }
        self.scroll_offset = self.scroll_offset.min(max);
        self.scroll_offset
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.auto_scroll = false;
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16, width: u16, height: u16) {
        let max = self.max_offset(width, height);
        self.scroll_offset = self.scroll_offset.saturating_add(lines).min(max);
        self.auto_scroll = self.scroll_offset >= max;
    }
}
