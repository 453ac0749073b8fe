// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of named executors: the run executor
//! looks up a step's `executor_config.type` here, falling back to the
//! built-in command executor for plain `command`/`script` steps.

use crate::command::CommandExecutor;
use crate::error::ExecutorError;
use crate::executor::Executor;
use crate::mail::MailExecutor;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Name of the executor used for plain `command`/`script` steps that
/// declare no `executor_config`.
pub const DEFAULT_EXECUTOR: &str = "command";

#[derive(Clone)]
pub struct ExecutorRegistry {
    executors: Arc<HashMap<String, Arc<dyn Executor>>>,
}

impl ExecutorRegistry {
    pub fn builder() -> ExecutorRegistryBuilder {
        ExecutorRegistryBuilder { executors: HashMap::new() }
    }

    /// A registry containing every executor type this crate ships:
    /// `"command"` and `"mail"`.
    pub fn with_builtins() -> Self {
        Self::builder()
            .register(DEFAULT_EXECUTOR, Arc::new(CommandExecutor::new()))
            .register("mail", Arc::new(MailExecutor::new()))
            .build()
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Executor>, ExecutorError> {
        self.executors.get(name).cloned().ok_or_else(|| ExecutorError::Unregistered(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }

    pub fn known_names(&self) -> std::collections::HashSet<&str> {
        self.executors.keys().map(|s| s.as_str()).collect()
    }
}

pub struct ExecutorRegistryBuilder {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistryBuilder {
    pub fn register(mut self, name: impl Into<String>, executor: Arc<dyn Executor>) -> Self {
        self.executors.insert(name.into(), executor);
        self
    }

    pub fn build(self) -> ExecutorRegistry {
        ExecutorRegistry { executors: Arc::new(self.executors) }
    }
}

static GLOBAL: OnceLock<ExecutorRegistry> = OnceLock::new();

/// The process-wide registry, lazily initialized with the built-in
/// executors on first access. Daemons that need custom executor types
/// should build their own [`ExecutorRegistry`] explicitly instead of
/// relying on this — it exists for the CLI/single-binary path where no
/// bespoke wiring is needed.
pub fn global() -> &'static ExecutorRegistry {
    GLOBAL.get_or_init(ExecutorRegistry::with_builtins)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_registry_knows_command_and_mail() {
        let registry = ExecutorRegistry::with_builtins();
        assert!(registry.contains("command"));
        assert!(registry.contains("mail"));
        assert!(!registry.contains("docker"));
    }

    #[test]
    fn unregistered_lookup_is_an_error() {
        let registry = ExecutorRegistry::with_builtins();
        assert!(matches!(registry.get("docker"), Err(ExecutorError::Unregistered(_))));
    }

    #[test]
    fn global_registry_is_populated() {
        assert!(global().contains(DEFAULT_EXECUTOR));
    }
}
