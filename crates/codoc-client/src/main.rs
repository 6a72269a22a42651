//! codoc terminal client
//!
//! Interactive line-oriented client for a codoc relay: each submitted line
//! becomes a user edit, peer edits print as they arrive, and the full buffer
//! is snapshotted to the server on the periodic save interval.
//!
//! # Usage
//!
//! ```bash
//! # Join a document on the local relay
//! codoc notes-2024
//!
//! # Remote relay
//! codoc --url ws://example.com:5000 notes-2024
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use colored::*;
use parking_lot::Mutex;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;

use codoc_client::{
    Delta, Editor, LineEditor, LocalEdit, SyncAdapter, SyncConfig, WsTransport,
    DEFAULT_SAVE_INTERVAL_MS,
};

/// codoc terminal client
#[derive(Parser, Debug)]
#[command(name = "codoc")]
#[command(author, version, about = "codoc - collaborative document terminal client")]
struct Args {
    /// Document to join
    document_id: String,

    /// Relay URL
    #[arg(long, default_value = "ws://127.0.0.1:5000", env = "CODOC_URL")]
    url: String,

    /// Periodic save interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_SAVE_INTERVAL_MS, env = "CODOC_SAVE_INTERVAL_MS")]
    save_interval_ms: u64,

    /// Quiet mode (no banner)
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if !args.quiet {
        println!(
            "{}",
            format!(
                "codoc - joining '{}' via {}\nType lines to edit, Ctrl-D to leave.",
                args.document_id, args.url
            )
            .cyan()
        );
    }

    let editor = Arc::new(Mutex::new(LineEditor::new().with_remote_hook(|text| {
        println!("{} {}", "peer:".blue(), text.trim_end());
    })));

    let transport = WsTransport::connect(&args.url).await?;
    let config = SyncConfig::new(&args.document_id)
        .with_save_interval(Duration::from_millis(args.save_interval_ms));
    let (edit_tx, edit_rx) = mpsc::unbounded_channel();

    let adapter = SyncAdapter::new(transport, editor.clone(), config);
    let session = tokio::spawn(adapter.run(edit_rx));

    // The readline loop is blocking; edits flow out through the channel.
    let prompt_editor = editor.clone();
    let input = tokio::task::spawn_blocking(move || read_lines(prompt_editor, edit_tx));

    let result = session.await?;
    input.abort();

    match result {
        Ok(()) => {
            if !args.quiet {
                println!("{}", "Session ended.".yellow());
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            Err(e.into())
        }
    }
}

fn read_lines(
    editor: Arc<Mutex<LineEditor>>,
    edits: mpsc::UnboundedSender<LocalEdit>,
) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let history_path = home_dir().map(|p| p.join(".codoc_history")).unwrap_or_default();
    let _ = rl.load_history(&history_path);

    loop {
        let prompt = format!("{}> ", "codoc".green());
        match rl.readline(&prompt) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                if !editor.lock().is_enabled() {
                    println!("{}", "Still loading, edit dropped.".yellow());
                    continue;
                }

                let _ = rl.add_history_entry(line.as_str());

                let text = format!("{}\n", line);
                // Mirror the edit locally, then notify the adapter the way
                // an editor capability reports a user-originated change.
                {
                    let mut ed = editor.lock();
                    let delta = Delta::insert(text.clone());
                    ed.apply_local(&text);
                    if edits.send(LocalEdit::user(delta)).is_err() {
                        break;
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
    Ok(())
}

fn home_dir() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(std::path::PathBuf::from)
}
