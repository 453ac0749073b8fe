// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Variable namespacing and propagation helpers.

use std::collections::HashMap;

/// Known variable scope prefixes, narrowed to what a DAG run actually
/// has: run params and step outputs.
const SCOPE_PREFIXES: &[&str] = &["var.", "params.", "item."];

fn has_scope_prefix(key: &str) -> bool {
    SCOPE_PREFIXES.iter().any(|p| key.starts_with(p))
}

/// Namespace bare keys under `var.`, leaving already-scoped keys as-is.
pub fn namespace_vars(input: &HashMap<String, String>) -> HashMap<String, String> {
    input
        .iter()
        .map(|(k, v)| {
            if has_scope_prefix(k) {
                (k.clone(), v.clone())
            } else {
                (format!("var.{k}"), v.clone())
            }
        })
        .collect()
}

/// A run's accumulated variable map: DAG-level `params`/`default_params`,
/// plus each completed step's captured `output`, keyed by step `ref_name`.
#[derive(Debug, Clone, Default)]
pub struct VarScope {
    vars: HashMap<String, String>,
}

impl VarScope {
    pub fn new(params: &HashMap<String, String>) -> Self {
        Self { vars: namespace_vars(params) }
    }

    /// Record a step's captured output under `var.<step_ref>`, so
    /// downstream `${var.<step_ref>}` references resolve.
    pub fn record_output(&mut self, step_ref: &str, value: String) {
        self.vars.insert(format!("var.{step_ref}"), value);
    }

    /// The full var map as seen by template interpolation / env
    /// injection for a step about to run.
    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.vars
    }

    /// Render this scope as process environment variables for a step:
    /// dotted keys become `DAGCTL_VAR_<UPPER_SNAKE>`.
    pub fn as_env(&self) -> HashMap<String, String> {
        self.vars
            .iter()
            .map(|(k, v)| {
                let env_key = format!("DAGCTL_{}", k.to_uppercase().replace('.', "_"));
                (env_key, v.clone())
            })
            .collect()
    }
}
