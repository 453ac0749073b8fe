// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use dagctl_core::ErrorKind;
use thiserror::Error;

/// Errors raised while parsing a DAG document.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Validate(#[from] ValidateError),
}

impl ParseError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Config
    }
}

/// Structural errors found while validating an otherwise well-formed DAG.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidateError {
    #[error("step name {name:?} is used more than once in DAG {dag:?}")]
    DuplicateStepName { dag: String, name: String },
    #[error("step {step:?} depends on unknown step {depends_on:?}")]
    UnknownDependency { step: String, depends_on: String },
    #[error("DAG {dag:?} contains a dependency cycle involving step {step:?}")]
    Cycle { dag: String, step: String },
    #[error("step {step:?} uses unregistered executor type {executor_type:?}")]
    UnknownExecutorType { step: String, executor_type: String },
    #[error("cron expression on DAG {dag:?} is invalid: {source}")]
    Cron {
        dag: String,
        #[source]
        source: crate::cron::CronError,
    },
}

impl ValidateError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Config
    }
}
