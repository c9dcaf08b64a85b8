// src/core/repl.rs

//! The shell loop: reads lines from the terminal (with editing and history)
//! or, when stdin is not a terminal, from the input stream.
//!
//! In both modes a line ending in `\` continues on the next one. The history
//! keeps the entry as typed; the interpreter receives the joined line.

use crate::{
    CancellationToken,
    constants::HISTORY_CAPACITY,
    core::{
        history::HistoryStore,
        interpreter::{Interpreter, LineOutcome, ShellState},
        mount_table::MountTable,
        paths,
    },
    engine::js::Evaluator,
    system::{launcher::ProcessLauncher, signals},
};
use anyhow::Result;
use colored::*;
use dialoguer::{
    Input,
    console::{Style, style},
    theme::ColorfulTheme,
};
use std::collections::BTreeMap;
use std::io::{self, BufRead, ErrorKind, IsTerminal};
use std::sync::Arc;

const PROMPT: &str = "jsh>";
const CONTINUATION_PROMPT: &str = "...";

/// What the shell starts from.
pub struct ShellSetup {
    pub env: BTreeMap<String, String>,
    pub aliases: BTreeMap<String, String>,
    pub mounts: Arc<MountTable>,
    pub evaluator: Box<dyn Evaluator>,
}

/// Runs the shell on this process's stdin until `exit` or end of input.
pub fn run_shell(setup: ShellSetup, cancel: CancellationToken) -> Result<i32> {
    let interactive = io::stdin().is_terminal();
    let history = if interactive {
        open_history()
    } else {
        HistoryStore::in_memory(HISTORY_CAPACITY)
    };

    let launcher = ProcessLauncher::new(setup.mounts.specs());
    let state = ShellState {
        env: setup.env,
        aliases: setup.aliases,
        mounts: setup.mounts,
        history,
        evaluator: setup.evaluator,
    };
    let mut interpreter = Interpreter::new(state, Box::new(launcher), cancel.clone());

    if interactive {
        run_interactive(&mut interpreter, cancel)
    } else {
        run_batch(&mut interpreter, io::stdin().lock())
    }
}

fn open_history() -> HistoryStore {
    let opened = paths::get_history_path()
        .map_err(anyhow::Error::from)
        .and_then(|path| Ok(HistoryStore::open(path, HISTORY_CAPACITY)?));
    match opened {
        Ok(store) => store,
        Err(e) => {
            log::warn!("History will not be saved: {:#}", e);
            HistoryStore::in_memory(HISTORY_CAPACITY)
        }
    }
}

fn shell_theme() -> ColorfulTheme {
    ColorfulTheme {
        prompt_prefix: style(String::new()),
        prompt_suffix: style(String::new()),
        success_prefix: style(String::new()),
        success_suffix: style(String::new()),
        prompt_style: Style::new().for_stderr().cyan().bold(),
        ..ColorfulTheme::default()
    }
}

fn run_interactive(interpreter: &mut Interpreter, cancel: CancellationToken) -> Result<i32> {
    // Without the listener Ctrl+C still ends the shell, so this is not fatal.
    if let Err(e) = signals::install_interrupt_listener(cancel) {
        log::warn!("Could not install the interrupt listener: {}", e);
    }

    println!(
        "{}",
        format!(t!("repl.banner"), version = env!("CARGO_PKG_VERSION")).bold()
    );
    println!("{}", t!("repl.hint").dimmed());

    let theme = shell_theme();
    let mut pending = PendingEntry::default();
    loop {
        let prompt = if pending.is_empty() {
            PROMPT
        } else {
            CONTINUATION_PROMPT
        };
        let read = Input::<String>::with_theme(&theme)
            .with_prompt(prompt)
            .allow_empty(true)
            .history_with(&mut interpreter.state_mut().history)
            .interact_text();

        let line = match read {
            Ok(line) => line,
            Err(dialoguer::Error::IO(e))
                if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::UnexpectedEof) =>
            {
                log::debug!("Prompt closed ({:?}); leaving the shell.", e.kind());
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        if let Some((line, entry)) = pending.push(&line) {
            if let LineOutcome::Terminate = interpreter.execute_entry(&line, &entry) {
                return Ok(0);
            }
        }
    }
}

/// Runs every line of `input`. The result is that of the last line, or 0
/// once `exit` is reached.
pub fn run_batch(interpreter: &mut Interpreter, input: impl BufRead) -> Result<i32> {
    let mut pending = PendingEntry::default();
    let mut status = 0;
    for line in input.lines() {
        let line = line?;
        if let Some((line, entry)) = pending.push(&line) {
            match interpreter.execute_entry(&line, &entry) {
                LineOutcome::Completed(code) => status = code,
                LineOutcome::Terminate => return Ok(0),
            }
        }
    }

    // A dangling continuation at end of input still runs.
    if let Some((line, entry)) = pending.finish() {
        match interpreter.execute_entry(&line, &entry) {
            LineOutcome::Completed(code) => status = code,
            LineOutcome::Terminate => return Ok(0),
        }
    }
    Ok(status)
}

/// Collects the physical lines of one logical entry.
#[derive(Debug, Default)]
struct PendingEntry {
    raw: Vec<String>,
}

impl PendingEntry {
    fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Adds a physical line. Returns `(line, entry)` once the entry is
    /// complete and not blank.
    fn push(&mut self, line: &str) -> Option<(String, String)> {
        self.raw.push(line.to_string());
        if line.ends_with('\\') {
            return None;
        }
        self.finish()
    }

    /// Completes the entry: `line` is what runs (continuation backslashes
    /// removed), `entry` is what the history keeps (lines joined by `\n`).
    fn finish(&mut self) -> Option<(String, String)> {
        let raw = std::mem::take(&mut self.raw);
        let line: String = raw
            .iter()
            .map(|l| l.strip_suffix('\\').unwrap_or(l))
            .collect();
        if line.trim().is_empty() {
            return None;
        }
        Some((line, raw.join("\n")))
    }
}
