pub mod bus;
pub mod codec;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod metrics;
/// Built-in command modules: runtime status and a todo list.
pub mod modules;
pub mod object;
pub mod registry;
/// Plain-file record store, keyed by kind and creation time.
pub mod store;

pub use bus::{dispatch, Bus};
pub use commands::{CommandTable, Handler, HandlerResult, Module};
pub use config::Config;
pub use context::Context;
pub use error::{BusError, ConfigError, DecodeError, StoreError};
pub use event::{DispatchOutcome, Event};
pub use object::{Kind, Object, Value};
pub use registry::Registry;
pub use store::{fntime, Query, Source, Store, TimeRange};
