// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DAG document parsing and structural validation.

use crate::cron::CronSet;
use crate::error::{ParseError, ValidateError};
use dagctl_core::Dag;
use std::collections::{HashMap, HashSet};

/// Parse a DAG document and validate its structural invariants. The
/// result is ready to schedule/run: steps reference each other only
/// through existing names, the dependency graph is acyclic, and declared
/// cron expressions are well-formed.
///
/// Executor-type validation is deliberately NOT performed here — the set
/// of registered executor types is a runtime concern of the process
/// embedding this crate (see [`validate_executor_types`]).
pub fn parse(bytes: &[u8]) -> Result<Dag, ParseError> {
    let dag: Dag = serde_yaml::from_slice(bytes)?;
    validate(&dag)?;
    Ok(dag)
}

/// Run structural validation against an already-parsed [`Dag`], e.g. one
/// built programmatically rather than from YAML.
pub fn validate(dag: &Dag) -> Result<(), ValidateError> {
    let mut seen = HashSet::new();
    for step in &dag.steps {
        let ref_name = step.ref_name();
        if !seen.insert(ref_name) {
            return Err(ValidateError::DuplicateStepName {
                dag: dag.name.clone(),
                name: ref_name.to_string(),
            });
        }
    }

    for step in &dag.steps {
        for dep in &step.depends {
            if !seen.contains(dep.as_str()) {
                return Err(ValidateError::UnknownDependency {
                    step: step.ref_name().to_string(),
                    depends_on: dep.clone(),
                });
            }
        }
    }

    detect_cycle(dag)?;

    if !dag.schedule.is_empty() {
        CronSet::parse(&dag.schedule)
            .map_err(|source| ValidateError::Cron { dag: dag.name.clone(), source })?;
    }

    Ok(())
}

/// Check that every step's `executor_config.type` (if set) is present in
/// `known`. Plain `command`/`script`/`sub_dag`/`parallel` steps without an
/// explicit `executor_config` always pass.
pub fn validate_executor_types(dag: &Dag, known: &HashSet<&str>) -> Result<(), ValidateError> {
    for step in &dag.steps {
        if let Some(cfg) = &step.executor_config {
            if !known.contains(cfg.kind.as_str()) {
                return Err(ValidateError::UnknownExecutorType {
                    step: step.ref_name().to_string(),
                    executor_type: cfg.kind.clone(),
                });
            }
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

fn detect_cycle(dag: &Dag) -> Result<(), ValidateError> {
    let mut colors: HashMap<&str, Color> =
        dag.steps.iter().map(|s| (s.ref_name(), Color::White)).collect();

    for step in &dag.steps {
        if colors[step.ref_name()] == Color::White {
            visit(dag, step.ref_name(), &mut colors)?;
        }
    }
    Ok(())
}

fn visit<'a>(
    dag: &'a Dag,
    name: &'a str,
    colors: &mut HashMap<&'a str, Color>,
) -> Result<(), ValidateError> {
    colors.insert(name, Color::Gray);
    if let Some(step) = dag.find_step(name) {
        for dep in &step.depends {
            match colors.get(dep.as_str()).copied() {
                Some(Color::Gray) => {
                    return Err(ValidateError::Cycle { dag: dag.name.clone(), step: name.to_string() });
                }
                Some(Color::White) => visit(dag, dep.as_str(), colors)?,
                _ => {}
            }
        }
    }
    colors.insert(name, Color::Black);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagctl_core::Step;

    #[test]
    fn parses_minimal_yaml_dag() {
        let yaml = br#"
name: lin
steps:
  - name: build
    command: make
    args: ["all"]
"#;
        let dag = parse(yaml).unwrap();
        assert_eq!(dag.name, "lin");
        assert_eq!(dag.steps.len(), 1);
    }

    #[test]
    fn accepts_empty_steps() {
        let dag = Dag::builder().name("empty").build();
        assert_eq!(validate(&dag), Ok(()));
    }

    #[test]
    fn rejects_duplicate_step_names() {
        let dag = Dag::builder()
            .name("dup")
            .steps(vec![Step::builder().name("a").build(), Step::builder().name("a").build()])
            .build();
        assert!(matches!(validate(&dag), Err(ValidateError::DuplicateStepName { .. })));
    }

    #[test]
    fn rejects_unknown_dependency() {
        let mut step = Step::builder().name("b").build();
        step.depends.insert("missing".to_string());
        let dag = Dag::builder().name("bad-dep").steps(vec![step]).build();
        assert!(matches!(validate(&dag), Err(ValidateError::UnknownDependency { .. })));
    }

    #[test]
    fn rejects_two_step_cycle() {
        let mut a = Step::builder().name("a").build();
        a.depends.insert("b".to_string());
        let mut b = Step::builder().name("b").build();
        b.depends.insert("a".to_string());
        let dag = Dag::builder().name("cyclic").steps(vec![a, b]).build();
        assert!(matches!(validate(&dag), Err(ValidateError::Cycle { .. })));
    }

    #[test]
    fn accepts_diamond_dependency_shape() {
        let a = Step::builder().name("a").build();
        let mut b = Step::builder().name("b").build();
        b.depends.insert("a".to_string());
        let mut c = Step::builder().name("c").build();
        c.depends.insert("a".to_string());
        let mut d = Step::builder().name("d").build();
        d.depends.insert("b".to_string());
        d.depends.insert("c".to_string());
        let dag = Dag::builder().name("diamond").steps(vec![a, b, c, d]).build();
        assert!(validate(&dag).is_ok());
    }

    #[test]
    fn rejects_malformed_cron_expression() {
        let dag = Dag::builder()
            .name("scheduled")
            .steps(vec![Step::builder().name("a").build()])
            .schedule(vec!["not a cron".to_string()])
            .build();
        assert!(matches!(validate(&dag), Err(ValidateError::Cron { .. })));
    }

    #[test]
    fn executor_type_validation_rejects_unregistered_kind() {
        use dagctl_core::ExecutorConfig;
        let mut step = Step::builder().name("a").build();
        step.executor_config = Some(ExecutorConfig { kind: "mystery".to_string(), config: serde_json::Value::Null });
        let dag = Dag::builder().name("d").steps(vec![step]).build();
        let known: HashSet<&str> = ["command", "subdag"].into_iter().collect();
        assert!(matches!(
            validate_executor_types(&dag, &known),
            Err(ValidateError::UnknownExecutorType { .. })
        ));
    }
}
