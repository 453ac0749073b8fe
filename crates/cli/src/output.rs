// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Text/JSON output formatting shared by every subcommand: a format
//! switch owns the decision once, callers only supply the text renderer.

use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Render a list as a text block or pretty JSON.
pub fn handle_list<T: Serialize>(
    format: OutputFormat,
    items: &[T],
    empty_msg: &str,
    render_text: impl FnOnce(&[T]),
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(items)?),
        OutputFormat::Text => {
            if items.is_empty() {
                println!("{empty_msg}");
            } else {
                render_text(items);
            }
        }
    }
    Ok(())
}

/// Render a single value as JSON, or call `text_fn` for the text path.
pub fn format_or_json<T: Serialize>(format: OutputFormat, data: &T, text_fn: impl FnOnce()) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(data)?),
        OutputFormat::Text => text_fn(),
    }
    Ok(())
}

/// Relative-age rendering for `enqueued_at`/heartbeat columns.
pub fn format_age_ms(now_ms: u64, at_ms: u64) -> String {
    let elapsed_secs = now_ms.saturating_sub(at_ms) / 1000;
    match elapsed_secs {
        0..=59 => format!("{elapsed_secs}s"),
        60..=3599 => format!("{}m", elapsed_secs / 60),
        3600..=86399 => format!("{}h", elapsed_secs / 3600),
        _ => format!("{}d", elapsed_secs / 86400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_age_buckets() {
        assert_eq!(format_age_ms(10_000, 5_000), "5s");
        assert_eq!(format_age_ms(130_000, 10_000), "2m");
        assert_eq!(format_age_ms(3 * 3_600_000 + 1_000, 1_000), "3h");
        assert_eq!(format_age_ms(2 * 86_400_000 + 1_000, 1_000), "2d");
    }

    #[test]
    fn handle_list_prints_empty_message_for_text() {
        let items: Vec<i32> = vec![];
        handle_list(OutputFormat::Text, &items, "nothing here", |_| {}).unwrap();
    }
}
