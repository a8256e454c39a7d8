//! Action registry.

use crate::builtin::{CommandAction, EchoAction, FailAction, NoopAction, SleepAction};
use crate::r#trait::{Action, ActionContext, FnAction};
use orchestra_core::{ParseError, RiskLevel};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

/// Errors raised by the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No action under that name
    #[error("action not found: {0}")]
    NotFound(String),

    /// Name already taken
    #[error("action already registered: {0}")]
    Duplicate(String),

    /// Empty or whitespace-only name
    #[error("invalid action name: '{0}'")]
    InvalidName(String),

    /// Unknown risk tag
    #[error(transparent)]
    InvalidRisk(#[from] ParseError),
}

/// A resolved registry entry.
#[derive(Clone)]
pub struct RegisteredAction {
    /// Registry key
    pub name: String,
    /// Risk classification declared at registration
    pub risk: RiskLevel,
    /// The callable
    pub action: Arc<dyn Action>,
}

impl std::fmt::Debug for RegisteredAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredAction")
            .field("name", &self.name)
            .field("risk", &self.risk)
            .finish_non_exhaustive()
    }
}

/// Registry of named actions.
///
/// Registration is allowed at any time, including while the engine is
/// dispatching; lookups take a read lock.
pub struct ActionRegistry {
    actions: RwLock<HashMap<String, RegisteredAction>>,
}

impl ActionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            actions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry with the builtin actions.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        let builtins: [(&str, Arc<dyn Action>, RiskLevel); 5] = [
            ("noop", Arc::new(NoopAction), RiskLevel::Low),
            ("echo", Arc::new(EchoAction), RiskLevel::Low),
            ("sleep", Arc::new(SleepAction), RiskLevel::Low),
            ("fail", Arc::new(FailAction), RiskLevel::Low),
            ("command", Arc::new(CommandAction), RiskLevel::High),
        ];
        for (name, action, risk) in builtins {
            let registered = registry.register(name, action, risk);
            debug_assert!(registered.is_ok(), "builtin action '{}' failed to register", name);
            if let Err(e) = registered {
                tracing::error!(action = %name, error = %e, "Failed to register builtin action");
            }
        }
        registry
    }

    /// Register an action.
    pub fn register(
        &self,
        name: impl Into<String>,
        action: Arc<dyn Action>,
        risk: RiskLevel,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RegistryError::InvalidName(name));
        }

        let mut actions = self.actions.write().unwrap_or_else(PoisonError::into_inner);
        if actions.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }

        tracing::debug!(action = %name, risk = %risk, "Registered action");
        actions.insert(name.clone(), RegisteredAction { name, risk, action });
        Ok(())
    }

    /// Register an action with a textual risk tag, validating the tag.
    pub fn register_tagged(
        &self,
        name: impl Into<String>,
        action: Arc<dyn Action>,
        risk: &str,
    ) -> Result<(), RegistryError> {
        let risk: RiskLevel = risk.parse()?;
        self.register(name, action, risk)
    }

    /// Register an async closure.
    pub fn register_fn<F, Fut>(
        &self,
        name: impl Into<String>,
        risk: RiskLevel,
        f: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(Value, ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, anyhow::Error>> + Send + 'static,
    {
        self.register(name, Arc::new(FnAction::new(f)), risk)
    }

    /// Remove an action.
    pub fn unregister(&self, name: &str) -> Option<RegisteredAction> {
        self.actions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Look up an action by name.
    pub fn resolve(&self, name: &str) -> Result<RegisteredAction, RegistryError> {
        self.actions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Whether a name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.actions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .actions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.actions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
