// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parameter interpolation for step commands/scripts.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// `${name}` or `${step.output_name}` references.
#[allow(clippy::expect_used)]
static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_-]*)*)\}")
        .expect("constant regex pattern is valid")
});

/// `${VAR:-default}` environment variable expansion.
#[allow(clippy::expect_used)]
static ENV_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{(\w+):-([^}]*)\}").expect("constant regex pattern is valid"));

/// Escape a string for embedding inside a single-quoted shell argument.
pub fn escape_for_shell(s: &str) -> String {
    s.replace('\'', "'\\''")
}

/// Interpolate `${name}` placeholders with values from `vars`. Unknown
/// variables are left as-is so a typo surfaces in the executed command
/// rather than silently becoming an empty string.
pub fn interpolate(template: &str, vars: &HashMap<String, String>) -> String {
    interpolate_inner(template, vars, false)
}

/// Like [`interpolate`], but escapes substituted values for safe use in
/// shell command strings.
pub fn interpolate_shell(template: &str, vars: &HashMap<String, String>) -> String {
    interpolate_inner(template, vars, true)
}

fn interpolate_inner(template: &str, vars: &HashMap<String, String>, shell_escape: bool) -> String {
    let env_expanded = ENV_PATTERN
        .replace_all(template, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = &caps[2];
            std::env::var(var_name).unwrap_or_else(|_| default_value.to_string())
        })
        .to_string();

    VAR_PATTERN
        .replace_all(&env_expanded, |caps: &regex::Captures| {
            let name = &caps[1];
            match vars.get(name) {
                Some(val) if shell_escape => escape_for_shell(val),
                Some(val) => val.clone(),
                None => caps[0].to_string(),
            }
        })
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn substitutes_known_variable() {
        let out = interpolate("echo ${name}", &vars(&[("name", "world")]));
        assert_eq!(out, "echo world");
    }

    #[test]
    fn leaves_unknown_variable_untouched() {
        let out = interpolate("echo ${missing}", &vars(&[]));
        assert_eq!(out, "echo ${missing}");
    }

    #[test]
    fn namespaced_reference_resolves() {
        let out = interpolate("echo ${build.artifact_path}", &vars(&[("build.artifact_path", "/tmp/out")]));
        assert_eq!(out, "echo /tmp/out");
    }

    #[test]
    fn shell_escape_protects_single_quotes() {
        let out = interpolate_shell("echo '${msg}'", &vars(&[("msg", "it's fine")]));
        assert_eq!(out, "echo 'it'\\''s fine'");
    }

    #[test]
    fn env_default_used_when_var_unset() {
        let out = interpolate("${THIS_VAR_SHOULD_NOT_EXIST:-fallback}", &vars(&[]));
        assert_eq!(out, "fallback");
    }
}
