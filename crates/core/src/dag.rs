// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The DAG data model: immutable once parsed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A precondition: a command whose exit code (or expected stdout) gates
/// whether a step/DAG proceeds. Evaluating false yields `Skipped`, not an
/// error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precondition {
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
}

/// Retry policy applied when a step's executor returns an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RetryPolicy {
    /// Maximum number of re-attempts after the first failure.
    #[serde(default)]
    pub limit: u32,
    /// Base backoff between attempts, in seconds.
    #[serde(default)]
    pub interval_secs: u64,
    /// Only retry when the executor's exit code is in this set. Empty means
    /// "retry on any failure".
    #[serde(default)]
    pub exit_codes: Vec<i32>,
}

/// Repeat mode: whether the step keeps re-running while a condition holds
/// or until a condition becomes true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    While,
    Until,
}

/// Repeat policy applied after a step completes (success or failure,
/// depending on `condition`/`exit_code`), independent of [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatPolicy {
    pub mode: RepeatMode,
    /// Interval between repeats, in seconds.
    pub interval_secs: u64,
    /// Maximum number of repeats. `0` means no repeats.
    #[serde(default)]
    pub limit: u32,
    /// Repeat while/until the executor exits with this code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Repeat while/until this shell condition holds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Whether the DAG keeps going past this step's failure/skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContinueOn {
    #[serde(default)]
    pub failure: bool,
    #[serde(default)]
    pub skipped: bool,
}

/// Executor-specific configuration, keyed by a registered type name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// The execution kind of a step. Exactly one must be present. Untagged so that a
/// step's YAML looks like a flat set of fields (`command: ...`,
/// `args: [...]`) rather than a nested block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepExec {
    Command { command: String, #[serde(default)] args: Vec<String> },
    Script { script: String },
    SubDag { sub_dag: String },
    Parallel { parallel: ParallelSpec },
}

/// Fan-out over an array of parameter sets, capped by `max_concurrent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelSpec {
    pub sub_dag: String,
    pub items: Vec<HashMap<String, String>>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,
}

fn default_max_concurrent() -> u32 {
    1
}

/// A single step in a DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub exec: StepExec,
    #[serde(default)]
    pub depends: BTreeSet<String>,
    #[serde(default)]
    pub preconditions: Vec<Precondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_policy: Option<RepeatPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default)]
    pub continue_on: ContinueOn,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default)]
    pub worker_selector: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_config: Option<ExecutorConfig>,
    /// Per-step timeout in seconds, honored by the executor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Marks a step that suspends waiting for an external human signal.
    /// A sub-DAG containing an `hitl` step cannot be reached through a
    /// step with a non-empty `worker_selector`: dispatched tasks cannot
    /// stall indefinitely on a remote worker.
    #[serde(default)]
    pub hitl: bool,
}

impl Step {
    /// The alias used to reference this step from `depends`: `id` if set,
    /// else `name`.
    pub fn ref_name(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}

/// Handlers run after all regular steps reach terminal status:
/// `onSuccess`/`onFailure`/`onCancel`, then always `onExit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HandlerOn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel: Option<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<Step>,
}

/// An immutable, parsed DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dag {
    pub name: String,
    #[serde(default)]
    pub group: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub handler_on: HandlerOn,
    /// Cron expressions (5-field, standard crontab syntax).
    #[serde(default)]
    pub schedule: Vec<String>,
    /// `0` = unbounded.
    #[serde(default)]
    pub max_active_runs: i64,
    /// Bound on concurrently-running steps within one run. `0` = unbounded.
    #[serde(default)]
    pub max_active_steps: i64,
    /// Defaults to `name` if absent; resolved by the parser, see
    /// [`Dag::queue_name`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub default_params: HashMap<String, String>,
    #[serde(default)]
    pub hist_retention_days: i64,
    #[serde(default)]
    pub preconditions: Vec<Precondition>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Dag {
    /// Effective queue name: the declared `queue`, or the DAG's own name.
    pub fn queue_name(&self) -> &str {
        self.queue.as_deref().unwrap_or(&self.name)
    }

    /// Look up a step by name or `id` alias.
    pub fn find_step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.ref_name() == name || s.name == name)
    }

    /// Unbounded concurrency iff `max_active_runs == 0`.
    pub fn is_unbounded(&self) -> bool {
        self.max_active_runs <= 0
    }

    /// Effective cap on concurrently-running steps; `None` means
    /// unbounded (run as many ready steps in parallel as exist).
    pub fn max_active_steps(&self) -> Option<usize> {
        if self.max_active_steps <= 0 {
            None
        } else {
            Some(self.max_active_steps as usize)
        }
    }
}

crate::builder! {
    pub struct StepBuilder => Step {
        into {
            name: String = "step",
        }
        set {
            depends: BTreeSet<String> = BTreeSet::new(),
            preconditions: Vec<Precondition> = Vec::new(),
            continue_on: ContinueOn = ContinueOn::default(),
            worker_selector: HashMap<String, String> = HashMap::new(),
            hitl: bool = false,
        }
        option {
            id: String = None,
            repeat_policy: RepeatPolicy = None,
            retry_policy: RetryPolicy = None,
            output: String = None,
            executor_config: ExecutorConfig = None,
            timeout_secs: u64 = None,
        }
        computed {
            exec: StepExec = StepExec::Command { command: "true".to_string(), args: Vec::new() },
        }
    }
}

crate::builder! {
    pub struct DagBuilder => Dag {
        into {
            name: String = "test-dag",
            group: String = "",
        }
        set {
            steps: Vec<Step> = Vec::new(),
            handler_on: HandlerOn = HandlerOn::default(),
            schedule: Vec<String> = Vec::new(),
            max_active_runs: i64 = 0,
            max_active_steps: i64 = 0,
            params: HashMap<String, String> = HashMap::new(),
            default_params: HashMap<String, String> = HashMap::new(),
            hist_retention_days: i64 = 30,
            preconditions: Vec<Precondition> = Vec::new(),
            env: HashMap<String, String> = HashMap::new(),
        }
        option {
            queue: String = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_name_defaults_to_dag_name() {
        let dag = Dag::builder().name("lin").build();
        assert_eq!(dag.queue_name(), "lin");
    }

    #[test]
    fn queue_name_uses_declared_queue() {
        let dag = Dag::builder().name("lin").queue("shared").build();
        assert_eq!(dag.queue_name(), "shared");
    }

    #[test]
    fn step_ref_name_prefers_id() {
        let step = Step::builder().name("build-the-thing").id("build").build();
        assert_eq!(step.ref_name(), "build");
    }

    #[test]
    fn unbounded_when_zero_or_negative() {
        let dag = Dag::builder().max_active_runs(0).build();
        assert!(dag.is_unbounded());
        let dag2 = Dag::builder().max_active_runs(2).build();
        assert!(!dag2.is_unbounded());
    }

    #[test]
    fn max_active_steps_none_means_unbounded() {
        let dag = Dag::builder().max_active_steps(0).build();
        assert_eq!(dag.max_active_steps(), None);
        let dag2 = Dag::builder().max_active_steps(4).build();
        assert_eq!(dag2.max_active_steps(), Some(4));
    }
}
