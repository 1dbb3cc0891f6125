use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::info;

use crate::commands::{CommandTable, Module};
use crate::config::Config;
use crate::event::{DispatchOutcome, Event};
use crate::metrics::Metrics;
use crate::registry::Registry;
use crate::store::Store;

/// Process-wide state shared by the bus, its workers and every handler.
///
/// Built once at startup and handed around as `Arc<Context>`.
pub struct Context {
    pub config: Config,
    pub registry: Arc<Registry>,
    pub store: Store,
    pub commands: CommandTable,
    metrics: Mutex<Metrics>,
    events: Mutex<VecDeque<Arc<Event>>>,
    errors: Mutex<Vec<Arc<Event>>>,
    started: Instant,
}

impl Context {
    pub fn new(config: Config) -> Arc<Self> {
        let registry = Arc::new(Registry::new());
        let store = Store::new(&config.workdir, Arc::clone(&registry));
        Arc::new(Self {
            config,
            registry,
            store,
            commands: CommandTable::new(),
            metrics: Mutex::new(Metrics::new()),
            events: Mutex::new(VecDeque::new()),
            errors: Mutex::new(Vec::new()),
            started: Instant::now(),
        })
    }

    /// Register a module's kinds and commands.
    pub fn scan(&self, module: Module) {
        let (name, commands, kinds) = module.into_parts();
        for ctor in kinds {
            self.registry.add(ctor);
        }
        let count = commands.len();
        for (cmd, handler) in commands {
            self.commands.insert(cmd, handler);
        }
        self.commands.add_module(name);
        info!(module = %name, commands = count, "module scanned");
    }

    /// Remember an event, dropping the oldest beyond the configured bound.
    pub fn track(&self, event: Arc<Event>) {
        let limit = self.config.recent_events.max(1);
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.push_back(event);
        while events.len() > limit {
            events.pop_front();
        }
    }

    /// Recent events, oldest first.
    pub fn events(&self) -> Vec<Arc<Event>> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn event(&self, index: usize) -> Option<Arc<Event>> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
    }

    /// Tracked events whose handler has not finished.
    pub fn running(&self) -> Vec<Arc<Event>> {
        self.events().into_iter().filter(|e| !e.is_done()).collect()
    }

    /// Finish a failed event and append it to the error list under one lock.
    /// The list only ever holds finished events, and a waiter woken by the
    /// finish already finds its event listed.
    pub(crate) fn record_error(&self, event: Arc<Event>, cause: String) {
        let mut errors = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
        if event.finish(DispatchOutcome::Failed { cause }) {
            errors.push(event);
        }
    }

    /// Events whose handler failed, in failure order.
    pub fn errors(&self) -> Vec<Arc<Event>> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain the failure list for a final report.
    pub fn take_errors(&self) -> Vec<Arc<Event>> {
        std::mem::take(&mut *self.errors.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn with_metrics<R>(&self, f: impl FnOnce(&mut Metrics) -> R) -> R {
        f(&mut self.metrics.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn metrics(&self) -> Metrics {
        self.with_metrics(|m| m.clone())
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}
