//! Action registry
//!
//! Maps action names to callables and their risk classification. Tasks only
//! carry the name, so they stay serializable; the engine resolves it at
//! dispatch time.

#![warn(missing_docs)]

pub mod r#trait;
pub mod registry;
pub mod builtin;

pub use r#trait::{Action, ActionContext, FnAction};
pub use registry::{ActionRegistry, RegisteredAction, RegistryError};
pub use builtin::{CommandAction, DryRunAction, EchoAction, FailAction, NoopAction, SleepAction};
