//! Event loop for the full-screen chat.
//!
//! Terminal input and session events are multiplexed on the main task; each
//! send runs on its own task so the screen keeps redrawing while a run is
//! polled.

mod lifecycle;

use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use ratatui::crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tui_textarea::TextArea;

use crate::cli::StartedSession;
use crate::core::session::{AssistantSession, SessionError, SessionEvent, TurnHandle};
use crate::ui::renderer::ui;
use crate::ui::view::ChatView;

use self::lifecycle::{restore_terminal, setup_terminal, ChatTerminal};

const ANIMATION_TICK: Duration = Duration::from_millis(100);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Quit,
    StopWaiting,
    ToggleLog,
    Submit,
    NewLine,
    ScrollUp,
    ScrollDown,
    PageUp,
    PageDown,
    Edit,
}

pub fn command_for_key(key: &KeyEvent) -> KeyCommand {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c') if ctrl => KeyCommand::Quit,
        KeyCode::Char('l') if ctrl => KeyCommand::ToggleLog,
        KeyCode::Esc => KeyCommand::StopWaiting,
        KeyCode::Enter
            if key
                .modifiers
                .intersects(KeyModifiers::SHIFT | KeyModifiers::ALT) =>
        {
            KeyCommand::NewLine
        }
        KeyCode::Enter => KeyCommand::Submit,
        KeyCode::Up => KeyCommand::ScrollUp,
        KeyCode::Down => KeyCommand::ScrollDown,
        KeyCode::PageUp => KeyCommand::PageUp,
        KeyCode::PageDown => KeyCommand::PageDown,
        _ => KeyCommand::Edit,
    }
}

struct ChatState {
    session: Arc<AssistantSession>,
    download_dir: PathBuf,
    view: ChatView,
    textarea: TextArea<'static>,
    active_turn: Option<TurnHandle>,
    exit_requested: bool,
}

impl ChatState {
    fn new(session: Arc<AssistantSession>, download_dir: PathBuf) -> Self {
        Self {
            session,
            download_dir,
            view: ChatView::new(),
            textarea: TextArea::default(),
            active_turn: None,
            exit_requested: false,
        }
    }

    fn log_status(&self) -> String {
        self.session
            .transcript()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_status_string()
    }

    fn handle_terminal_event(&mut self, event: Event, page: u16, width: u16) {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                self.handle_key(key, page, width)
            }
            Event::Paste(text) => {
                self.textarea.insert_str(text.replace('\r', ""));
            }
            _ => {}
        }
    }

    fn handle_key(&mut self, key: KeyEvent, page: u16, width: u16) {
        match command_for_key(&key) {
            KeyCommand::Quit => self.exit_requested = true,
            KeyCommand::StopWaiting => {
                if let Some(turn) = &self.active_turn {
                    turn.cancel.cancel();
                    self.view.notice("Stopping…");
                }
            }
            KeyCommand::ToggleLog => {
                let transcript = self.session.transcript();
                let mut log = transcript.lock().unwrap_or_else(PoisonError::into_inner);
                match log.toggle_logging() {
                    Ok(status) => self.view.notice(status),
                    Err(err) => self.view.error(err.to_string()),
                }
            }
            KeyCommand::Submit => self.submit(),
            KeyCommand::NewLine => self.textarea.insert_newline(),
            KeyCommand::ScrollUp => self.view.scroll_up(1),
            KeyCommand::ScrollDown => self.view.scroll_down(1, width, page),
            KeyCommand::PageUp => self.view.scroll_up(page),
            KeyCommand::PageDown => self.view.scroll_down(page, width, page),
            KeyCommand::Edit => {
                self.textarea.input(key);
            }
        }
    }

    fn submit(&mut self) {
        let text = self.textarea.lines().join("\n");
        if text.trim().is_empty() {
            return;
        }
        match self.session.spawn_send(text.clone()) {
            Ok(turn) => {
                debug!(chars = text.len(), "submitted message");
                self.view.begin_turn(&text);
                self.active_turn = Some(turn);
                self.textarea = TextArea::default();
            }
            Err(SessionError::RunInProgress) => self
                .view
                .notice("Still waiting for the previous reply (Esc to stop waiting)."),
            Err(err) => self.view.error(err.to_string()),
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        let turn_over = matches!(event, SessionEvent::Response(_) | SessionEvent::Failed(_));
        let downloads = self.view.apply_event(event);
        if turn_over {
            self.active_turn = None;
        }
        if !downloads.is_empty() {
            info!(count = downloads.len(), "saving generated files");
            self.session
                .spawn_downloads(downloads, self.download_dir.clone());
        }
    }

    async fn run(
        &mut self,
        terminal: &mut ChatTerminal,
        ui_rx: &mut mpsc::UnboundedReceiver<Event>,
        session_rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
    ) -> Result<(), Box<dyn Error>> {
        while !self.exit_requested {
            let log_status = self.log_status();
            let frame =
                terminal.draw(|f| ui(f, &mut self.view, &mut self.textarea, &log_status))?;
            let page = frame.area.height.saturating_sub(6).max(1);
            let width = frame.area.width;

            tokio::select! {
                Some(event) = ui_rx.recv() => self.handle_terminal_event(event, page, width),
                Some(event) = session_rx.recv() => self.handle_session_event(event),
                _ = tokio::time::sleep(ANIMATION_TICK), if self.view.busy => {}
                else => break,
            }
        }

        if let Some(turn) = self.active_turn.take() {
            turn.cancel.cancel();
            if tokio::time::timeout(SHUTDOWN_GRACE, turn.join).await.is_err() {
                warn!("turn did not stop in time; leaving it behind");
            }
        }
        Ok(())
    }
}

fn spawn_event_reader(event_tx: mpsc::UnboundedSender<Event>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Ok(true) = event::poll(Duration::from_millis(10)) {
                match event::read() {
                    Ok(ev) => {
                        if event_tx.send(ev).is_err() {
                            break;
                        }
                    }
                    Err(_) => continue,
                }
            } else {
                tokio::task::yield_now().await;
            }
        }
    })
}

pub async fn run_chat(started: StartedSession) -> Result<(), Box<dyn Error>> {
    let StartedSession {
        session,
        events: mut session_rx,
        download_dir,
    } = started;

    let mut terminal = setup_terminal()?;
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let event_reader_handle = spawn_event_reader(event_tx);

    let mut state = ChatState::new(session, download_dir);
    state
        .view
        .notice(format!("Connected to thread {}.", state.session.thread_id()));
    let result = state.run(&mut terminal, &mut event_rx, &mut session_rx).await;

    event_reader_handle.abort();
    restore_terminal(&mut terminal)?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RunStatus;
    use crate::core::config::PollSettings;
    use crate::core::session::SessionSettings;
    use crate::utils::logging::TranscriptLog;
    use crate::utils::test_utils::{page, run, text_message, FakeAssistantsApi};
    use std::sync::Mutex;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(
            command_for_key(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            KeyCommand::Quit
        );
        assert_eq!(
            command_for_key(&key(KeyCode::Enter, KeyModifiers::NONE)),
            KeyCommand::Submit
        );
        assert_eq!(
            command_for_key(&key(KeyCode::Enter, KeyModifiers::SHIFT)),
            KeyCommand::NewLine
        );
        assert_eq!(
            command_for_key(&key(KeyCode::Esc, KeyModifiers::NONE)),
            KeyCommand::StopWaiting
        );
        assert_eq!(
            command_for_key(&key(KeyCode::Char('l'), KeyModifiers::CONTROL)),
            KeyCommand::ToggleLog
        );
        assert_eq!(
            command_for_key(&key(KeyCode::Char('l'), KeyModifiers::NONE)),
            KeyCommand::Edit
        );
    }

    async fn state_with(
        api: FakeAssistantsApi,
    ) -> (ChatState, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let settings = SessionSettings {
            assistant_id: "asst_1".to_string(),
            poll: PollSettings {
                initial_interval: Duration::from_millis(1),
                max_interval: Duration::from_millis(2),
                backoff_factor: 2.0,
                max_wait: Duration::from_secs(5),
            },
        };
        let transcript = Arc::new(Mutex::new(TranscriptLog::disabled()));
        let session = AssistantSession::begin_session(Arc::new(api), settings, transcript, tx)
            .await
            .expect("session");
        (ChatState::new(Arc::new(session), PathBuf::from(".")), rx)
    }

    #[tokio::test]
    async fn submitting_runs_a_turn_and_shows_the_reply() {
        let api = FakeAssistantsApi::new().with_state(|state| {
            state.created_run = Some(run("run_1", RunStatus::Completed));
            state.message_pages = [page(vec![text_message("msg_a", "assistant", "4")], false)].into();
        });
        let (mut state, mut rx) = state_with(api).await;

        state.textarea.insert_str("What is 2+2?");
        state.handle_key(key(KeyCode::Enter, KeyModifiers::NONE), 10, 80);
        assert!(state.view.busy);
        assert!(state.textarea.is_empty());

        while let Some(event) = rx.recv().await {
            let done = matches!(event, SessionEvent::Response(_));
            state.handle_session_event(event);
            if done {
                break;
            }
        }
        assert!(!state.view.busy);
        assert!(!state.session.is_busy());
        assert!(state.active_turn.is_none());
        assert_eq!(
            state.view.entries.last(),
            Some(&crate::ui::view::Entry::Assistant("4".to_string()))
        );
    }

    #[tokio::test]
    async fn blank_input_is_not_sent() {
        let (mut state, _rx) = state_with(FakeAssistantsApi::new()).await;
        state.textarea.insert_str("   ");
        state.handle_key(key(KeyCode::Enter, KeyModifiers::NONE), 10, 80);
        assert!(!state.view.busy);
        assert!(state.active_turn.is_none());
    }

    #[tokio::test]
    async fn toggling_a_disabled_log_reports_an_error() {
        let (mut state, _rx) = state_with(FakeAssistantsApi::new()).await;
        state.handle_key(key(KeyCode::Char('l'), KeyModifiers::CONTROL), 10, 80);
        assert!(matches!(
            state.view.entries.last(),
            Some(crate::ui::view::Entry::Error(_))
        ));
        assert_eq!(state.log_status(), "disabled");
    }
}
