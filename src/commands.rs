use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::context::Context;
use crate::event::Event;
use crate::object::Kind;
use crate::registry::Ctor;

/// Command handler result
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A command handler. Reads the event, appends replies, or fails.
pub type Handler = Arc<dyn Fn(&Context, &Event) -> HandlerResult + Send + Sync>;

/// A named group of commands and the record kinds they persist.
pub struct Module {
    name: &'static str,
    commands: Vec<(&'static str, Handler)>,
    kinds: Vec<Ctor>,
}

impl Module {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            commands: Vec::new(),
            kinds: Vec::new(),
        }
    }

    pub fn command<F>(mut self, name: &'static str, handler: F) -> Self
    where
        F: Fn(&Context, &Event) -> HandlerResult + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        self.commands.push((name, handler));
        self
    }

    pub fn kind<K: Kind>(mut self) -> Self {
        let ctor: Ctor = K::template;
        self.kinds.push(ctor);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    #[allow(clippy::type_complexity)]
    pub(crate) fn into_parts(self) -> (&'static str, Vec<(&'static str, Handler)>, Vec<Ctor>) {
        (self.name, self.commands, self.kinds)
    }
}

/// Command name to handler mapping. Last registration for a name wins.
#[derive(Default)]
pub struct CommandTable {
    handlers: RwLock<HashMap<String, Handler>>,
    modules: RwLock<Vec<String>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&self, name: &str, handler: F)
    where
        F: Fn(&Context, &Event) -> HandlerResult + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        self.insert(name, handler);
    }

    pub fn insert(&self, name: &str, handler: Handler) {
        info!(command = %name, "registering command");
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Handler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Registered command names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub(crate) fn add_module(&self, name: &str) {
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        if !modules.iter().any(|m| m == name) {
            modules.push(name.to_string());
        }
    }

    /// Names of scanned modules, in scan order
    pub fn modules(&self) -> Vec<String> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
