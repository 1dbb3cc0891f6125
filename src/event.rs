use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// How a dispatch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler ran and returned normally.
    Ok,
    /// No handler is registered for the command; the reply stays empty.
    Miss,
    /// The handler returned an error or panicked.
    Failed { cause: String },
}

/// One line of input travelling through the bus.
#[derive(Debug)]
pub struct Event {
    id: u64,
    txt: String,
    cmd: String,
    args: Vec<String>,
    rest: String,
    orig: Option<String>,
    created: DateTime<Utc>,
    started: Instant,
    result: Mutex<Vec<String>>,
    outcome: OnceLock<DispatchOutcome>,
    done: watch::Sender<bool>,
}

impl Event {
    pub fn new(txt: impl Into<String>) -> Self {
        let txt = txt.into();
        let trimmed = txt.trim();
        let (cmd, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd.to_string(), rest.trim_start().to_string()),
            None => (trimmed.to_string(), String::new()),
        };
        let args = rest.split_whitespace().map(str::to_string).collect();
        let (done, _) = watch::channel(false);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            txt,
            cmd,
            args,
            rest,
            orig: None,
            created: Utc::now(),
            started: Instant::now(),
            result: Mutex::new(Vec::new()),
            outcome: OnceLock::new(),
            done,
        }
    }

    /// Tag the event with where it came from (e.g. `console`).
    pub fn with_origin(mut self, orig: impl Into<String>) -> Self {
        self.orig = Some(orig.into());
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn txt(&self) -> &str {
        &self.txt
    }

    /// First whitespace-delimited token.
    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    /// Tokens after the command.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Text after the command, leading whitespace removed.
    pub fn rest(&self) -> &str {
        &self.rest
    }

    pub fn orig(&self) -> Option<&str> {
        self.orig.as_deref()
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn reply(&self, txt: impl Into<String>) {
        self.result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(txt.into());
    }

    /// Reply lines in the order they were added.
    pub fn replies(&self) -> Vec<String> {
        self.result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_done(&self) -> bool {
        *self.done.borrow()
    }

    pub fn outcome(&self) -> Option<&DispatchOutcome> {
        self.outcome.get()
    }

    /// Captured handler failure, if any.
    pub fn error(&self) -> Option<&str> {
        match self.outcome.get() {
            Some(DispatchOutcome::Failed { cause }) => Some(cause),
            _ => None,
        }
    }

    /// Record the outcome and wake waiters. Only the first call has effect.
    pub(crate) fn finish(&self, outcome: DispatchOutcome) -> bool {
        if self.outcome.set(outcome).is_err() {
            return false;
        }
        self.done.send_replace(true);
        true
    }

    /// Block until the event is done. No timeout; wrap in
    /// `tokio::time::timeout` when one is needed.
    pub async fn wait(&self) -> DispatchOutcome {
        let mut rx = self.done.subscribe();
        // the sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|done| *done).await;
        self.outcome.get().cloned().unwrap_or(DispatchOutcome::Miss)
    }
}
