// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dagctl` — the client binary: run a DAG document locally, enqueue a
//! run, inspect its status, and poke the queue store directly. The
//! daemons (`schedulerd`/`coordinatord`/`workerd`) are separate bins in
//! this same crate.

use clap::{Parser, Subcommand};
use dagctl::commands::{enqueue, parse_params, queue, run, status};
use dagctl::output::OutputFormat;
use dagctl_core::DagRunId;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "dagctl", version, about = "Distributed DAG workflow orchestrator client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a DAG document to a terminal status in this process.
    Run {
        dag_path: PathBuf,
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
    /// Read the run-status store for a DAG, or one of its runs.
    Status {
        dag_name: String,
        dag_run_id: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
    /// Place a new run at the tail of a DAG's queue.
    Enqueue {
        dag_name: String,
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },
    /// Inspect or edit the queue store directly.
    #[command(subcommand)]
    Queue(QueueCommand),
}

#[derive(Subcommand)]
enum QueueCommand {
    /// List queued items, optionally filtered to one DAG.
    Ls {
        dag_name: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
    /// Remove one queued item by its exact coordinates.
    Rm { dag_name: String, dag_run_id: String, enqueued_at_ms: u64 },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run { dag_path, params, output } => {
            let params = match parse_params(&params) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("error: {e}");
                    return ExitCode::from(2);
                }
            };
            run::exec(run::RunArgs { dag_path, params, format: output }).await
        }
        Command::Status { dag_name, dag_run_id, output } => {
            let dag_run_id = dag_run_id.map(DagRunId::from_string);
            status::exec(status::StatusArgs { dag_name, dag_run_id, format: output })
        }
        Command::Enqueue { dag_name, params } => {
            let params = match parse_params(&params) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("error: {e}");
                    return ExitCode::from(2);
                }
            };
            enqueue::exec(enqueue::EnqueueArgs { dag_name, params }).map(|_| ())
        }
        Command::Queue(QueueCommand::Ls { dag_name, output }) => queue::list(queue::ListArgs { dag_name, format: output }),
        Command::Queue(QueueCommand::Rm { dag_name, dag_run_id, enqueued_at_ms }) => {
            queue::remove(queue::RemoveArgs { dag_name, dag_run_id: DagRunId::from_string(dag_run_id), enqueued_at_ms })
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.code.clamp(0, 255) as u8)
        }
    }
}
