//! Remote session manager: one thread, at most one outstanding run.
//!
//! A turn posts the user's message, starts a run, and polls it. When the run
//! asks for tool output the calls are resolved locally and submitted in one
//! batch; when it completes, every message created after the user's message
//! is fetched, footnoted, written to the transcript, and delivered on the
//! event channel.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiError, AssistantsApi, MessageContent, Run, RunStatus, ThreadMessage};
use crate::core::annotations::{annotation_file, append_footnotes, replace_spans, Footnote};
use crate::core::config::PollSettings;
use crate::core::downloads::save_file;
use crate::core::message::{ChatMessage, DownloadableFile, Role};
use crate::core::tools::{resolve_tool_calls, ResolvedToolCall, ToolError};
use crate::utils::logging::TranscriptLog;

const ABANDON_TIMEOUT: Duration = Duration::from_secs(5);

pub type SharedTranscript = Arc<Mutex<TranscriptLog>>;

/// Everything a session needs that used to live in process globals.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub assistant_id: String,
    pub poll: PollSettings,
}

/// Notifications for the interactive surface.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The run is still queued or in progress; fires once per poll.
    Waiting {
        run_id: String,
        status: RunStatus,
        polls: u32,
    },
    /// Tool calls that were executed and submitted for the current run.
    ToolCalls(Vec<ResolvedToolCall>),
    /// Messages added after the user's message, oldest first.
    Response(Vec<ChatMessage>),
    Failed(String),
    FileSaved {
        filename: String,
        path: PathBuf,
    },
    DownloadFailed {
        filename: String,
        error: String,
    },
}

#[derive(Debug)]
pub enum SessionError {
    EmptyMessage,
    /// A turn is already outstanding on this session.
    RunInProgress,
    Api(ApiError),
    Tool(ToolError),
    RunFailed {
        run_id: String,
        code: Option<String>,
        message: Option<String>,
    },
    RunCancelled {
        run_id: String,
    },
    RunExpired {
        run_id: String,
    },
    TimedOut {
        run_id: String,
        waited: Duration,
    },
    /// The caller cancelled the turn.
    Cancelled {
        run_id: String,
    },
    /// The service reported a run status this client does not know.
    UnknownStatus {
        run_id: String,
    },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::EmptyMessage => write!(f, "cannot send an empty message"),
            SessionError::RunInProgress => {
                write!(f, "the assistant is still working on the previous message")
            }
            SessionError::Api(err) => write!(f, "assistant service error: {err}"),
            SessionError::Tool(err) => write!(f, "{err}"),
            SessionError::RunFailed {
                run_id,
                code,
                message,
            } => {
                write!(f, "run {run_id} failed")?;
                if let Some(code) = code {
                    write!(f, " ({code})")?;
                }
                if let Some(message) = message {
                    write!(f, ": {message}")?;
                }
                Ok(())
            }
            SessionError::RunCancelled { run_id } => write!(f, "run {run_id} was cancelled"),
            SessionError::RunExpired { run_id } => write!(f, "run {run_id} expired"),
            SessionError::TimedOut { run_id, waited } => write!(
                f,
                "gave up on run {run_id} after {}s",
                waited.as_secs()
            ),
            SessionError::Cancelled { run_id } => write!(f, "cancelled run {run_id}"),
            SessionError::UnknownStatus { run_id } => {
                write!(f, "run {run_id} reported an unrecognised status")
            }
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionError::Api(err) => Some(err),
            SessionError::Tool(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ApiError> for SessionError {
    fn from(err: ApiError) -> Self {
        SessionError::Api(err)
    }
}

impl From<ToolError> for SessionError {
    fn from(err: ToolError) -> Self {
        SessionError::Tool(err)
    }
}

/// Clears the session's busy flag when the turn ends, however it ends.
struct TurnGuard {
    active: Arc<AtomicBool>,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

/// When a turn started and how it can be stopped. Every remote call made
/// while waiting on a run is raced against both.
struct TurnBudget<'a> {
    started: Instant,
    max_wait: Duration,
    cancel: &'a CancellationToken,
}

impl TurnBudget<'_> {
    async fn bound<T, F>(&self, run_id: &str, call: F) -> Result<T, SessionError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        let remaining = self.max_wait.saturating_sub(self.started.elapsed());
        tokio::select! {
            result = call => result.map_err(SessionError::from),
            _ = self.cancel.cancelled() => Err(SessionError::Cancelled {
                run_id: run_id.to_string(),
            }),
            _ = tokio::time::sleep(remaining) => Err(SessionError::TimedOut {
                run_id: run_id.to_string(),
                waited: self.started.elapsed(),
            }),
        }
    }
}

/// A turn running on a background task.
pub struct TurnHandle {
    pub cancel: CancellationToken,
    pub join: JoinHandle<()>,
}

pub struct AssistantSession {
    api: Arc<dyn AssistantsApi>,
    settings: SessionSettings,
    thread_id: String,
    transcript: SharedTranscript,
    events: mpsc::UnboundedSender<SessionEvent>,
    turn_active: Arc<AtomicBool>,
}

impl AssistantSession {
    /// Create a fresh thread and mark the start of the session in the transcript.
    pub async fn begin_session(
        api: Arc<dyn AssistantsApi>,
        settings: SessionSettings,
        transcript: SharedTranscript,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self, SessionError> {
        let thread = api.create_thread().await?;
        info!(thread_id = %thread.id, assistant_id = %settings.assistant_id, "created assistant thread");

        let session = Self {
            api,
            settings,
            thread_id: thread.id,
            transcript,
            events,
            turn_active: Arc::new(AtomicBool::new(false)),
        };
        session.write_transcript(|log| log.log_session_start(&session.thread_id));
        Ok(session)
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn api(&self) -> Arc<dyn AssistantsApi> {
        Arc::clone(&self.api)
    }

    pub fn transcript(&self) -> SharedTranscript {
        Arc::clone(&self.transcript)
    }

    pub fn is_busy(&self) -> bool {
        self.turn_active.load(Ordering::Acquire)
    }

    /// Run one turn to completion on the current task.
    pub async fn send(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChatMessage>, SessionError> {
        let guard = self.start_turn(text)?;
        let result = self.run_turn(text, cancel).await;
        drop(guard);
        if let Ok(messages) = &result {
            self.emit(SessionEvent::Response(messages.clone()));
        }
        result
    }

    /// Run one turn on a background task so the caller's loop stays live.
    ///
    /// The busy check happens before spawning, so a second call made while the
    /// first turn is outstanding fails immediately with
    /// [`SessionError::RunInProgress`]. Errors from the turn itself arrive as
    /// [`SessionEvent::Failed`]. The session is idle again by the time the
    /// final event is sent.
    pub fn spawn_send(self: &Arc<Self>, text: String) -> Result<TurnHandle, SessionError> {
        let guard = self.start_turn(&text)?;
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let session = Arc::clone(self);

        let join = tokio::spawn(async move {
            let result = session.run_turn(&text, &token).await;
            drop(guard);
            match result {
                Ok(messages) => session.emit(SessionEvent::Response(messages)),
                Err(err) => {
                    warn!(error = %err, thread_id = %session.thread_id, "turn failed");
                    session.emit(SessionEvent::Failed(err.to_string()));
                }
            }
        });

        Ok(TurnHandle { cancel, join })
    }

    /// Save generated files in the background, reporting each one as an event.
    pub fn spawn_downloads(
        self: &Arc<Self>,
        files: Vec<DownloadableFile>,
        dir: PathBuf,
    ) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            for file in files {
                match save_file(session.api.as_ref(), &file, &dir).await {
                    Ok(path) => session.emit(SessionEvent::FileSaved {
                        filename: file.filename,
                        path,
                    }),
                    Err(err) => {
                        warn!(file_id = %file.file_id, error = %err, "download failed");
                        session.emit(SessionEvent::DownloadFailed {
                            filename: file.filename,
                            error: err.to_string(),
                        });
                    }
                }
            }
        })
    }

    fn start_turn(&self, text: &str) -> Result<TurnGuard, SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        self.turn_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SessionError::RunInProgress)?;
        Ok(TurnGuard {
            active: Arc::clone(&self.turn_active),
        })
    }

    async fn run_turn(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChatMessage>, SessionError> {
        let message = self
            .api
            .create_user_message(&self.thread_id, text)
            .await?;
        debug!(message_id = %message.id, "posted user message");
        self.write_transcript(|log| log.log_user_message(text));

        let run = self
            .api
            .create_run(&self.thread_id, &self.settings.assistant_id)
            .await?;
        info!(run_id = %run.id, status = run.status.as_str(), "started run");

        let budget = TurnBudget {
            started: Instant::now(),
            max_wait: self.settings.poll.max_wait,
            cancel,
        };
        let run = self.wait_on_run(run, &budget).await?;
        if run.status == RunStatus::Incomplete {
            let reason = run
                .incomplete_details
                .as_ref()
                .and_then(|details| details.reason.as_deref())
                .unwrap_or("unspecified");
            warn!(run_id = %run.id, reason, "run ended incomplete; delivering partial reply");
        }

        let messages = self
            .collect_new_messages(&run.id, &message.id, &budget)
            .await?;
        info!(run_id = %run.id, count = messages.len(), "run finished");
        self.write_transcript(|log| log.log_assistant_messages(&messages));
        Ok(messages)
    }

    /// Poll until the run reaches `completed` or `incomplete`, resolving tool
    /// calls along the way. Every other terminal state is an error.
    async fn wait_on_run(
        &self,
        mut run: Run,
        budget: &TurnBudget<'_>,
    ) -> Result<Run, SessionError> {
        let poll = self.settings.poll;
        let started = budget.started;
        let mut interval = poll.initial_interval;
        let mut polls = 0_u32;

        loop {
            match run.status {
                RunStatus::RequiresAction if !run.pending_tool_calls().is_empty() => {
                    let (outputs, resolved) = match resolve_tool_calls(run.pending_tool_calls()) {
                        Ok(resolved) => resolved,
                        Err(err) => {
                            self.abandon_run(&run).await;
                            return Err(err.into());
                        }
                    };
                    info!(run_id = %run.id, count = outputs.len(), "submitting tool outputs");
                    self.emit(SessionEvent::ToolCalls(resolved));
                    let submitted = budget
                        .bound(
                            &run.id,
                            self.api
                                .submit_tool_outputs(&self.thread_id, &run.id, &outputs),
                        )
                        .await;
                    run = match submitted {
                        Ok(next) => next,
                        Err(err) => {
                            self.abandon_run(&run).await;
                            return Err(err);
                        }
                    };
                    interval = poll.initial_interval;
                }
                RunStatus::Queued
                | RunStatus::InProgress
                | RunStatus::Cancelling
                | RunStatus::RequiresAction => {
                    let elapsed = started.elapsed();
                    if elapsed >= poll.max_wait {
                        self.abandon_run(&run).await;
                        return Err(SessionError::TimedOut {
                            run_id: run.id,
                            waited: elapsed,
                        });
                    }

                    polls += 1;
                    self.emit(SessionEvent::Waiting {
                        run_id: run.id.clone(),
                        status: run.status,
                        polls,
                    });

                    let pause = interval.min(poll.max_wait - elapsed);
                    tokio::select! {
                        _ = budget.cancel.cancelled() => {
                            self.abandon_run(&run).await;
                            return Err(SessionError::Cancelled { run_id: run.id });
                        }
                        _ = tokio::time::sleep(pause) => {}
                    }
                    interval = poll.next_interval(interval);

                    let polled = budget
                        .bound(&run.id, self.api.retrieve_run(&self.thread_id, &run.id))
                        .await;
                    run = match polled {
                        Ok(next) => next,
                        Err(err) => {
                            self.abandon_run(&run).await;
                            return Err(err);
                        }
                    };
                    debug!(run_id = %run.id, status = run.status.as_str(), polls, "polled run");
                }
                RunStatus::Completed | RunStatus::Incomplete => return Ok(run),
                RunStatus::Failed => {
                    let (code, message) = match run.last_error {
                        Some(error) => (Some(error.code), Some(error.message)),
                        None => (None, None),
                    };
                    return Err(SessionError::RunFailed {
                        run_id: run.id,
                        code,
                        message,
                    });
                }
                RunStatus::Cancelled => return Err(SessionError::RunCancelled { run_id: run.id }),
                RunStatus::Expired => return Err(SessionError::RunExpired { run_id: run.id }),
                RunStatus::Unknown => {
                    warn!(run_id = %run.id, "run reported an unrecognised status");
                    self.abandon_run(&run).await;
                    return Err(SessionError::UnknownStatus { run_id: run.id });
                }
            }
        }
    }

    /// Ask the service to stop a run we no longer wait for; a thread with an
    /// active run refuses new messages.
    async fn abandon_run(&self, run: &Run) {
        if run.status.is_terminal() || run.status == RunStatus::Cancelling {
            return;
        }
        let request = self.api.cancel_run(&self.thread_id, &run.id);
        match tokio::time::timeout(ABANDON_TIMEOUT, request).await {
            Ok(Ok(cancelled)) => {
                info!(run_id = %run.id, status = cancelled.status.as_str(), "cancelled run")
            }
            Ok(Err(err)) => warn!(run_id = %run.id, error = %err, "could not cancel run"),
            Err(_) => warn!(run_id = %run.id, "cancel request timed out"),
        }
    }

    async fn collect_new_messages(
        &self,
        run_id: &str,
        after: &str,
        budget: &TurnBudget<'_>,
    ) -> Result<Vec<ChatMessage>, SessionError> {
        let mut raw = Vec::new();
        let mut cursor = after.to_string();
        loop {
            let page = budget
                .bound(run_id, self.api.list_messages_after(&self.thread_id, &cursor))
                .await?;
            let next = page
                .last_id
                .clone()
                .or_else(|| page.data.last().map(|message| message.id.clone()));
            raw.extend(page.data);
            match next {
                Some(next) if page.has_more && next != cursor => cursor = next,
                _ => break,
            }
        }

        let mut filenames = HashMap::new();
        let mut messages = Vec::with_capacity(raw.len());
        for message in raw {
            messages.push(
                self.render_message(message, &mut filenames, run_id, budget)
                    .await?,
            );
        }
        Ok(messages)
    }

    async fn render_message(
        &self,
        message: ThreadMessage,
        filenames: &mut HashMap<String, String>,
        run_id: &str,
        budget: &TurnBudget<'_>,
    ) -> Result<ChatMessage, SessionError> {
        let mut bodies = Vec::new();
        let mut footnotes: Vec<Footnote> = Vec::new();
        let mut images = Vec::new();

        for part in &message.content {
            match part {
                MessageContent::Text { text } => {
                    let mut spans = Vec::new();
                    for annotation in &text.annotations {
                        let Some((file_id, kind)) = annotation_file(annotation) else {
                            continue;
                        };
                        let index = footnotes.len();
                        let filename = self
                            .filename_for(file_id, filenames, run_id, budget)
                            .await?;
                        spans.push((annotation.text().unwrap_or_default(), index));
                        footnotes.push(Footnote {
                            index,
                            file_id: file_id.to_string(),
                            filename,
                            kind,
                        });
                    }
                    bodies.push(replace_spans(&text.value, &spans));
                }
                MessageContent::ImageFile { image_file } => {
                    let filename = self
                        .filename_for(&image_file.file_id, filenames, run_id, budget)
                        .await?;
                    images.push(DownloadableFile {
                        file_id: image_file.file_id.clone(),
                        filename,
                    });
                }
                MessageContent::Unsupported => {
                    debug!(message_id = %message.id, "skipping unsupported content part")
                }
            }
        }

        Ok(ChatMessage {
            role: Role::try_from(message.role.as_str()).unwrap_or(Role::Assistant),
            content: append_footnotes(&bodies.join("\n"), &footnotes),
            id: message.id,
            footnotes,
            images,
        })
    }

    async fn filename_for(
        &self,
        file_id: &str,
        cache: &mut HashMap<String, String>,
        run_id: &str,
        budget: &TurnBudget<'_>,
    ) -> Result<String, SessionError> {
        if let Some(name) = cache.get(file_id) {
            return Ok(name.clone());
        }
        let file = budget.bound(run_id, self.api.retrieve_file(file_id)).await?;
        cache.insert(file_id.to_string(), file.filename.clone());
        Ok(file.filename)
    }

    fn emit(&self, event: SessionEvent) {
        // A closed channel only means the surface has gone away.
        let _ = self.events.send(event);
    }

    fn write_transcript<F>(&self, write: F)
    where
        F: FnOnce(&TranscriptLog) -> std::io::Result<()>,
    {
        let log = self.transcript.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = write(&log) {
            warn!(error = %err, "could not write transcript");
        }
    }
}
