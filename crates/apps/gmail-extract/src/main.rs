//! gmail-extract - run a Gmail search and write matching messages as JSON rows
//!
//! Rows go to stdout (or `--output`); logs and prompts go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use gmail_input::{
    Checkpoint, GmailAuth, GmailClient, GmailCredentials, InputTask, JsonLinesSink,
    LogDiagnostics, RowMapper, run_task,
};

/// Default checkpoint file name in the config directory
const STATE_FILE: &str = "state.json";

#[derive(Parser)]
#[command(name = "gmail-extract")]
#[command(about = "Extract Gmail messages as typed rows", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search, fetch and write one row per message
    Run {
        /// Task file (JSON)
        #[arg(long)]
        task: PathBuf,

        /// Checkpoint file for incremental tasks
        #[arg(long)]
        state: Option<PathBuf>,

        /// Write rows here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run the OAuth flow and store tokens in the task's tokens directory
    Auth {
        #[arg(long)]
        task: PathBuf,

        /// Discard stored tokens first
        #[arg(long)]
        force: bool,
    },

    /// Validate the task's columns and print them
    Schema {
        #[arg(long)]
        task: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let result = match cli.cmd {
        Command::Run {
            task,
            state,
            output,
        } => run(&task, state, output),
        Command::Auth { task, force } => auth(&task, force),
        Command::Schema { task } => schema(&task),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn client_for(task: &InputTask) -> Result<GmailClient> {
    info!(
        "Try login use '{}' and '{}'",
        task.client_secret.display(),
        task.tokens_directory.display()
    );
    let credentials = GmailCredentials::from_file(&task.client_secret)?;
    let auth = GmailAuth::new(credentials, &task.tokens_directory);
    Ok(GmailClient::new(auth).with_max_messages(task.max_messages))
}

fn state_path(state: Option<PathBuf>) -> Result<PathBuf> {
    match state {
        Some(path) => Ok(path),
        None => config::config_path(STATE_FILE).context("Could not determine config directory"),
    }
}

fn run(task_path: &Path, state: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let task = InputTask::from_file(task_path)?;
    // Column errors surface here, before anything is fetched
    let mapper = RowMapper::new(task.schema()?);

    let state = state_path(state)?;
    let previous: Option<Checkpoint> = if task.incremental {
        config::load_json_file_opt(&state)?
    } else {
        None
    };
    if let Some(checkpoint) = &previous {
        info!("Resuming after checkpoint {}", checkpoint.after);
    }

    let client = client_for(&task)?;

    let writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };
    let mut sink = JsonLinesSink::new(writer, mapper.schema());
    let mut diagnostics = LogDiagnostics::new();

    let report = run_task(
        &task,
        &mapper,
        &client,
        &mut sink,
        &mut diagnostics,
        previous.as_ref(),
        chrono::Utc::now(),
    )?;

    info!("Task report: {}", serde_json::to_string(&report)?);

    if let Some(error) = report.source_error {
        anyhow::bail!("Run produced no rows: {}", error);
    }

    if let Some(checkpoint) = report.next_checkpoint {
        config::save_json_file(&state, &checkpoint)?;
        info!("Saved checkpoint {} to {}", checkpoint.after, state.display());
    }

    Ok(())
}

fn auth(task_path: &Path, force: bool) -> Result<()> {
    let task = InputTask::from_file(task_path)?;
    let credentials = GmailCredentials::from_file(&task.client_secret)?;
    let auth = GmailAuth::new(credentials, &task.tokens_directory);

    if force {
        auth.logout()?;
    }

    let client = GmailClient::new(auth);
    client.authenticate()?;
    info!("Tokens stored in {}", task.tokens_directory.display());
    Ok(())
}

fn schema(task_path: &Path) -> Result<()> {
    let task = InputTask::from_file(task_path)?;
    let schema = task.schema()?;

    let mut out = std::io::stdout().lock();
    for column in schema.columns() {
        writeln!(
            out,
            "{}\t{}\t{}",
            column.index,
            column.name,
            column.kind.column_type()
        )?;
    }
    Ok(())
}
