// src/system/executor.rs

use crate::{
    CancellationToken,
    constants::EXIT_UNKNOWN,
    system::{launcher::PreparedProcess, secret_box::SecretBox},
};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, ChildStdout, ExitStatus, Stdio};
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command '{0}' could not be started: {1}")]
    Spawn(String, #[source] std::io::Error),
    #[error("Could not wait for command '{0}': {1}")]
    Wait(String, #[source] std::io::Error),
    #[error("Pipeline has no running stage to wait for.")]
    NothingToWait,
    #[error("Operation was cancelled by the user.")]
    Interrupted,
}

/// Where a stage reads its standard input from.
#[derive(Debug)]
pub enum StageInput {
    /// The shell's own stdin (first stage of a pipeline).
    Inherit,
    /// The stdout of the previous child.
    Child(ChildStdout),
    /// Output already produced by an in-process command.
    Buffer(Vec<u8>),
    /// Nothing; the child sees end-of-file immediately.
    Closed,
}

/// Where a stage writes its standard output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutput {
    /// The shell's own stdout (last stage).
    Inherit,
    /// A pipe the next stage will read from.
    Piped,
    /// Discarded, because the next stage does not read input.
    Discard,
}

struct RunningStage {
    name: String,
    child: Child,
    transport: Option<PathBuf>,
}

/// The external processes of one pipeline.
///
/// Children are started in order with [`spawn`](Self::spawn); the caller
/// then waits for the terminal one (or, when the terminal stage is
/// in-process, for all of them) and calls [`finish`](Self::finish) to reap
/// or stop the rest. Dropping a `RunningPipeline` without finishing it
/// also stops its children.
#[derive(Default)]
pub struct RunningPipeline {
    stages: Vec<RunningStage>,
    feeders: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for RunningPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.stages.iter().map(|s| s.name.as_str()).collect();
        f.debug_struct("RunningPipeline")
            .field("stages", &names)
            .field("feeders", &self.feeders.len())
            .finish()
    }
}

impl RunningPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Starts one external stage.
    ///
    /// Returns the child's stdout when `output` is [`StageOutput::Piped`].
    /// If the process cannot be started its transport file is discarded.
    pub fn spawn(
        &mut self,
        name: &str,
        prepared: PreparedProcess,
        input: StageInput,
        output: StageOutput,
    ) -> Result<Option<ChildStdout>, ExecutionError> {
        let PreparedProcess {
            mut command,
            transport,
        } = prepared;

        // Covers every early return below. Disarmed once the child owns the file.
        let guard = scopeguard::guard(transport, |transport| {
            if let Some(path) = transport {
                SecretBox::discard(&path);
            }
        });

        let mut buffered = None;
        match input {
            StageInput::Inherit => {
                command.stdin(Stdio::inherit());
            }
            StageInput::Child(stdout) => {
                command.stdin(Stdio::from(stdout));
            }
            StageInput::Buffer(bytes) => {
                command.stdin(Stdio::piped());
                buffered = Some(bytes);
            }
            StageInput::Closed => {
                command.stdin(Stdio::null());
            }
        }
        match output {
            StageOutput::Inherit => command.stdout(Stdio::inherit()),
            StageOutput::Piped => command.stdout(Stdio::piped()),
            StageOutput::Discard => command.stdout(Stdio::null()),
        };
        command.stderr(Stdio::inherit());

        let mut child = command
            .spawn()
            .map_err(|e| ExecutionError::Spawn(name.to_string(), e))?;
        let transport = scopeguard::ScopeGuard::into_inner(guard);
        log::debug!("Spawned '{}' (PID: {}).", name, child.id());

        // Written from a helper thread so a child that fills its stdout pipe
        // before draining stdin cannot deadlock the shell.
        if let (Some(bytes), Some(mut stdin)) = (buffered, child.stdin.take()) {
            let feeder = thread::spawn(move || {
                if let Err(e) = stdin.write_all(&bytes) {
                    log::debug!("Stage input closed early: {}", e);
                }
            });
            self.feeders.push(feeder);
        }

        let stdout = child.stdout.take();
        self.stages.push(RunningStage {
            name: name.to_string(),
            child,
            transport,
        });
        Ok(stdout)
    }

    /// Blocks until the last spawned child exits and returns its exit code.
    ///
    /// Polls instead of blocking in `wait` so an interrupt can be honoured:
    /// when `cancel` is raised every child of the pipeline is killed and
    /// [`ExecutionError::Interrupted`] is returned.
    pub fn wait_for_terminal(&mut self, cancel: &CancellationToken) -> Result<i32, ExecutionError> {
        let Some(terminal) = self.stages.last_mut() else {
            return Err(ExecutionError::NothingToWait);
        };

        loop {
            match terminal.child.try_wait() {
                Ok(Some(status)) => {
                    let code = exit_code(status);
                    log::debug!("'{}' exited with code {}.", terminal.name, code);
                    return Ok(code);
                }
                Ok(None) => {
                    if cancel.load(Ordering::SeqCst) {
                        log::debug!("Interrupt received, stopping pipeline.");
                        self.stop_all();
                        return Err(ExecutionError::Interrupted);
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(ExecutionError::Wait(terminal.name.clone(), e)),
            }
        }
    }

    /// Blocks until every spawned child has exited.
    ///
    /// Used when the terminal stage ran in-process, so no child is "last".
    /// Interruptible the same way as [`wait_for_terminal`](Self::wait_for_terminal).
    pub fn wait_all(&mut self, cancel: &CancellationToken) -> Result<(), ExecutionError> {
        loop {
            let mut running = false;
            for stage in &mut self.stages {
                match stage.child.try_wait() {
                    Ok(Some(_)) => {}
                    Ok(None) => running = true,
                    Err(e) => return Err(ExecutionError::Wait(stage.name.clone(), e)),
                }
            }
            if !running {
                return Ok(());
            }
            if cancel.load(Ordering::SeqCst) {
                log::debug!("Interrupt received, stopping pipeline.");
                self.stop_all();
                return Err(ExecutionError::Interrupted);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Reaps children that already exited and kills the ones still running.
    pub fn finish(mut self) {
        self.stop_all();
    }

    fn stop_all(&mut self) {
        for mut stage in self.stages.drain(..) {
            match stage.child.try_wait() {
                Ok(Some(_)) => {}
                _ => {
                    log::debug!(
                        "Stopping '{}' (PID: {})...",
                        stage.name,
                        stage.child.id()
                    );
                    if let Err(e) = stage.child.kill() {
                        log::warn!("Failed to kill child process {}: {}", stage.child.id(), e);
                    }
                    stage.child.wait().ok();
                }
            }
            // A child stopped before it claimed its transport leaves it behind.
            if let Some(path) = &stage.transport {
                SecretBox::discard(path);
            }
        }
        for feeder in self.feeders.drain(..) {
            feeder.join().ok();
        }
    }
}

impl Drop for RunningPipeline {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Maps a process status to a shell exit code.
///
/// A child ended by a signal reports `128 + signal`, the way POSIX shells do.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    EXIT_UNKNOWN
}
