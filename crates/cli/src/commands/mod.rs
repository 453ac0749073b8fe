// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod enqueue;
pub mod queue;
pub mod run;
pub mod status;

/// Parse `key=value` pairs from repeated `--param` flags, shared by
/// `dagctl run` and `dagctl enqueue`.
pub fn parse_params(raw: &[String]) -> anyhow::Result<std::collections::HashMap<String, String>> {
    let mut params = std::collections::HashMap::new();
    for entry in raw {
        let (k, v) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("invalid --param '{entry}', expected key=value"))?;
        params.insert(k.to_string(), v.to_string());
    }
    Ok(params)
}
