// src/core/interpreter.rs

use crate::{
    CancellationToken,
    cli::dispatcher::{self, CommandDefinition, Dispatch, DispatchError},
    constants::{EXIT_UNKNOWN, EXIT_USAGE},
    core::{
        history::HistoryStore,
        mount_table::MountTable,
        parser::{self, Pipeline, Statement},
    },
    engine::js::{Evaluator, ScriptScope},
    models::ScriptValue,
    system::{
        executor::{RunningPipeline, StageInput, StageOutput},
        launcher::Launch,
    },
};
use colored::*;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::io::{self, Write};
use std::mem;
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Everything internal commands can read or change.
pub struct ShellState {
    pub env: BTreeMap<String, String>,
    pub aliases: BTreeMap<String, String>,
    pub mounts: Arc<MountTable>,
    pub history: HistoryStore,
    pub evaluator: Box<dyn Evaluator>,
}

impl std::fmt::Debug for ShellState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env_keys: Vec<&String> = self.env.keys().collect();
        f.debug_struct("ShellState")
            .field("env", &env_keys)
            .field("aliases", &self.aliases)
            .field("mounts", &self.mounts.entries().len())
            .field("history", &self.history.len())
            .finish()
    }
}

impl ShellState {
    /// The scope a script evaluated in-process sees.
    pub fn scope(&self, argv: Vec<String>) -> ScriptScope {
        ScriptScope {
            argv,
            env: self.env.clone(),
        }
    }

    /// The virtual working directory.
    pub fn cwd(&self) -> &str {
        self.env.get("PWD").map(String::as_str).unwrap_or("/")
    }
}

/// What a line did to the shell loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// The line ran; this is its result code.
    Completed(i32),
    /// `exit` or `quit` was reached.
    Terminate,
}

enum PipelineOutcome {
    Status(i32),
    Terminate,
}

/// A command after alias expansion and resolution.
struct ResolvedCommand {
    name: String,
    args: Vec<String>,
    dispatch: Dispatch,
}

/// Runs shell lines: parses them, dispatches every command internally or to
/// a new process, and applies the `&&` / `;` policy.
pub struct Interpreter {
    state: ShellState,
    launcher: Box<dyn Launch>,
    cancel: CancellationToken,
    output: Box<dyn Write>,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("state", &self.state)
            .finish()
    }
}

impl Interpreter {
    pub fn new(state: ShellState, launcher: Box<dyn Launch>, cancel: CancellationToken) -> Self {
        Self {
            state,
            launcher,
            cancel,
            output: Box::new(io::stdout()),
        }
    }

    /// Sends the output of terminal internal commands to `output` instead of stdout.
    pub fn with_output(mut self, output: Box<dyn Write>) -> Self {
        self.output = output;
        self
    }

    pub fn state(&self) -> &ShellState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ShellState {
        &mut self.state
    }

    /// Runs one line and records it in the history.
    pub fn execute_line(&mut self, line: &str) -> LineOutcome {
        self.execute_entry(line, line)
    }

    /// Runs `line`, recording `entry` (the text as the user typed it) in the
    /// history unless the line was blank or terminated the shell.
    pub fn execute_entry(&mut self, line: &str, entry: &str) -> LineOutcome {
        self.cancel.store(false, Ordering::SeqCst);
        let outcome = self.run(line);

        if outcome != LineOutcome::Terminate {
            if let Err(e) = self.state.history.add(entry) {
                log::warn!("Could not record history entry: {}", e);
            }
        }
        outcome
    }

    fn run(&mut self, line: &str) -> LineOutcome {
        let expanded = self.expand(line);
        let command_line = match parser::parse_line(&expanded) {
            Ok(parsed) => parsed,
            Err(e) => {
                report(&e.to_string());
                return LineOutcome::Completed(EXIT_USAGE);
            }
        };

        let mut status = 0;
        for statement in &command_line.statements {
            match self.run_statement(statement) {
                PipelineOutcome::Status(code) => status = code,
                PipelineOutcome::Terminate => return LineOutcome::Terminate,
            }
        }
        LineOutcome::Completed(status)
    }

    /// `$NAME` and `${NAME}` from the shell environment; unknown names
    /// expand to nothing.
    fn expand(&self, line: &str) -> String {
        let env = &self.state.env;
        let lookup = |name: &str| -> Result<Option<String>, Infallible> {
            Ok(Some(env.get(name).cloned().unwrap_or_default()))
        };
        match shellexpand::env_with_context(line, lookup) {
            Ok(expanded) => expanded.into_owned(),
            Err(_) => line.to_string(),
        }
    }

    fn run_statement(&mut self, statement: &Statement) -> PipelineOutcome {
        let mut status = 0;
        for pipeline in &statement.pipelines {
            match self.run_pipeline(pipeline) {
                Ok(PipelineOutcome::Status(code)) => status = code,
                Ok(PipelineOutcome::Terminate) => return PipelineOutcome::Terminate,
                Err(e) => {
                    report(&e.to_string());
                    status = e.exit_code();
                }
            }
            if status != 0 {
                log::debug!("Stopping statement after exit code {}.", status);
                break;
            }
        }
        PipelineOutcome::Status(status)
    }

    /// Applies aliases to every stage of `pipeline`.
    fn expand_aliases(&self, pipeline: &Pipeline) -> Vec<(String, Vec<String>)> {
        pipeline
            .commands
            .iter()
            .map(|command| {
                dispatcher::expand_alias(&self.state.aliases, &command.name, &command.args)
                    .unwrap_or_else(|| (command.name.clone(), command.args.clone()))
            })
            .collect()
    }

    /// Resolves every command first, so an unknown name aborts the pipeline
    /// before anything is started.
    fn resolve_pipeline(
        &self,
        stages: Vec<(String, Vec<String>)>,
    ) -> Result<Vec<ResolvedCommand>, DispatchError> {
        stages
            .into_iter()
            .map(|(name, args)| {
                let dispatch = dispatcher::resolve(&name, &self.state.mounts, &self.state.env)?;
                Ok(ResolvedCommand {
                    name,
                    args,
                    dispatch,
                })
            })
            .collect()
    }

    fn run_pipeline(&mut self, pipeline: &Pipeline) -> Result<PipelineOutcome, DispatchError> {
        // `exit` anywhere wins over stages that would fail to resolve.
        let stages = self.expand_aliases(pipeline);
        if stages
            .iter()
            .any(|(name, _)| dispatcher::is_exit_sentinel(name))
        {
            return Ok(PipelineOutcome::Terminate);
        }
        let resolved = self.resolve_pipeline(stages)?;

        let mut running = RunningPipeline::new();
        let mut input = StageInput::Inherit;
        let mut status = 0;
        let last = resolved.len().saturating_sub(1);

        for (i, command) in resolved.iter().enumerate() {
            let is_last = i == last;
            let next_is_external = resolved
                .get(i + 1)
                .is_some_and(|next| matches!(next.dispatch, Dispatch::External(_)));

            match &command.dispatch {
                Dispatch::Internal(definition) => {
                    // Internal commands do not read stdin.
                    drop(mem::replace(&mut input, StageInput::Closed));
                    if is_last {
                        let value = self.run_internal(definition, &command.args, None)?;
                        status = self.report_value(value)?;
                    } else {
                        let mut buffer = Vec::new();
                        self.run_internal(definition, &command.args, Some(&mut buffer))?;
                        input = StageInput::Buffer(buffer);
                    }
                }
                Dispatch::External(script) => {
                    let output = if is_last {
                        StageOutput::Inherit
                    } else if next_is_external {
                        StageOutput::Piped
                    } else {
                        StageOutput::Discard
                    };

                    let mut argv = vec![script.clone()];
                    argv.extend(command.args.iter().cloned());
                    let prepared = self.launcher.build(None, argv, self.state.env.clone())?;

                    let stdin = mem::replace(&mut input, StageInput::Closed);
                    let stdout = running.spawn(&command.name, prepared, stdin, output)?;
                    if let Some(stdout) = stdout {
                        input = StageInput::Child(stdout);
                    }
                }
                Dispatch::Exit => {}
            }
        }

        if resolved
            .last()
            .is_some_and(|c| matches!(c.dispatch, Dispatch::External(_)))
        {
            status = running.wait_for_terminal(&self.cancel)?;
        } else {
            // Earlier stages keep running after an in-process terminal stage.
            running.wait_all(&self.cancel)?;
        }
        running.finish();

        if self.cancel.load(Ordering::SeqCst) {
            return Err(DispatchError::Interrupted);
        }
        Ok(PipelineOutcome::Status(status))
    }

    /// Runs a handler, writing to `buffer` or, if `None`, to the shell output.
    fn run_internal(
        &mut self,
        definition: &CommandDefinition,
        args: &[String],
        buffer: Option<&mut Vec<u8>>,
    ) -> Result<ScriptValue, DispatchError> {
        log::debug!("Running internal command '{}'.", definition.name);
        let result = match buffer {
            Some(buffer) => (definition.handler)(&mut self.state, args, buffer),
            None => (definition.handler)(&mut self.state, args, &mut self.output),
        };
        result.map_err(|e| DispatchError::from_handler(definition.name, e))
    }

    /// Turns a terminal result into an exit code, printing non-integral values.
    fn report_value(&mut self, value: ScriptValue) -> Result<i32, DispatchError> {
        let code = match value {
            ScriptValue::Int(code) => i32::try_from(code).unwrap_or(EXIT_UNKNOWN),
            ScriptValue::Text(text) => {
                writeln!(self.output, "{}", text).map_err(DispatchError::Pipe)?;
                EXIT_UNKNOWN
            }
            ScriptValue::Undefined => EXIT_UNKNOWN,
        };
        self.output.flush().map_err(DispatchError::Pipe)?;
        Ok(code)
    }
}

/// Prints a shell-level error on stderr.
pub(crate) fn report(message: &str) {
    eprintln!("{}: {}", "jsh".red().bold(), message);
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::{
        engine::js::EvalError,
        models::{MountSource, MountSpec},
        system::launcher::{LaunchError, PreparedProcess},
    };
    use std::cell::RefCell;
    use std::process::Command;
    use std::rc::Rc;
    use std::sync::atomic::AtomicBool;
    use tempfile::TempDir;

    // --- Test doubles ---

    /// Evaluates `"<n>"` to `Int(n)`, anything else to `Text`.
    struct StubEvaluator;

    impl Evaluator for StubEvaluator {
        fn eval(&mut self, source: &str, _scope: &ScriptScope) -> Result<ScriptValue, EvalError> {
            if source == "throw" {
                return Err(EvalError::Script("thrown".to_string()));
            }
            Ok(source
                .trim()
                .parse::<i64>()
                .map(ScriptValue::Int)
                .unwrap_or_else(|_| ScriptValue::Text(source.to_string())))
        }
    }

    /// Records every launch and runs the script's file contents with `sh`.
    #[derive(Clone)]
    struct RecordingLauncher {
        calls: Rc<RefCell<Vec<Vec<String>>>>,
        work: std::path::PathBuf,
    }

    impl Launch for RecordingLauncher {
        fn build(
            &self,
            _code: Option<String>,
            args: Vec<String>,
            _env: BTreeMap<String, String>,
        ) -> Result<PreparedProcess, LaunchError> {
            self.calls.borrow_mut().push(args.clone());
            let script = args.first().ok_or(LaunchError::NoScript)?;
            let host = self
                .work
                .join(script.trim_start_matches("/work/"));
            let mut command = Command::new("sh");
            command.arg(host).args(args.iter().skip(1));
            Ok(PreparedProcess::plain(command))
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    // --- Setup ---

    struct Harness {
        interpreter: Interpreter,
        calls: Rc<RefCell<Vec<Vec<String>>>>,
        output: SharedBuffer,
        work: TempDir,
    }

    impl Harness {
        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.borrow().clone()
        }

        fn history(&self) -> Vec<String> {
            self.interpreter
                .state()
                .history
                .entries()
                .map(str::to_string)
                .collect()
        }
    }

    fn harness() -> Harness {
        let work = TempDir::new().unwrap();
        // "Scripts" are shell snippets so the launcher double can run them.
        std::fs::write(work.path().join("ok.js"), "exit 0\n").unwrap();
        std::fs::write(work.path().join("fail.js"), "exit 3\n").unwrap();
        std::fs::write(
            work.path().join("mark.js"),
            "echo \"$1\" >> \"$(dirname \"$0\")/marks.txt\"\n",
        )
        .unwrap();
        std::fs::write(work.path().join("pwd.js"), "exit 9\n").unwrap();
        std::fs::write(work.path().join("sleepy.js"), "sleep 30\n").unwrap();

        let specs = vec![
            MountSpec::builtin_root(),
            MountSpec::new("/work", MountSource::Host(work.path().to_path_buf())),
        ];
        let mounts = Arc::new(MountTable::from_specs(&specs).unwrap());

        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), "/work".to_string());
        env.insert("PWD".to_string(), "/work".to_string());
        env.insert("HOME".to_string(), "/work".to_string());
        let mut aliases = BTreeMap::new();
        aliases.insert("again".to_string(), "mark again".to_string());

        let state = ShellState {
            env,
            aliases,
            mounts,
            history: HistoryStore::in_memory(100),
            evaluator: Box::new(StubEvaluator),
        };

        let calls = Rc::new(RefCell::new(Vec::new()));
        let launcher = RecordingLauncher {
            calls: Rc::clone(&calls),
            work: work.path().to_path_buf(),
        };
        let output = SharedBuffer::default();
        let interpreter = Interpreter::new(
            state,
            Box::new(launcher),
            Arc::new(AtomicBool::new(false)),
        )
        .with_output(Box::new(output.clone()));

        Harness {
            interpreter,
            calls,
            output,
            work,
        }
    }

    fn marks(h: &Harness) -> String {
        std::fs::read_to_string(h.work.path().join("marks.txt")).unwrap_or_default()
    }

    // --- Operator policy ---

    #[test]
    fn test_and_then_stops_at_first_failure() {
        let mut h = harness();
        let outcome = h.interpreter.execute_line("fail && mark second");
        assert_eq!(outcome, LineOutcome::Completed(3));
        assert_eq!(h.calls().len(), 1);
        assert_eq!(marks(&h), "");
    }

    #[test]
    fn test_sequence_always_continues() {
        let mut h = harness();
        let outcome = h.interpreter.execute_line("fail ; mark second");
        assert_eq!(outcome, LineOutcome::Completed(0));
        assert_eq!(h.calls().len(), 2);
        assert_eq!(marks(&h), "second\n");
    }

    #[test]
    fn test_and_then_runs_all_on_success() {
        let mut h = harness();
        let outcome = h.interpreter.execute_line("ok && mark a && mark b");
        assert_eq!(outcome, LineOutcome::Completed(0));
        assert_eq!(marks(&h), "a\nb\n");
    }

    #[test]
    fn test_failure_in_one_statement_does_not_skip_the_next() {
        let mut h = harness();
        h.interpreter.execute_line("fail && mark skipped ; mark ran");
        assert_eq!(marks(&h), "ran\n");
    }

    // --- Exit sentinel ---

    #[test]
    fn test_exit_terminates_and_is_not_recorded() {
        let mut h = harness();
        assert_eq!(h.interpreter.execute_line("exit"), LineOutcome::Terminate);
        assert_eq!(h.interpreter.execute_line("quit"), LineOutcome::Terminate);
        assert!(h.history().is_empty());
    }

    #[test]
    fn test_exit_anywhere_in_pipeline_runs_nothing() {
        let mut h = harness();
        assert_eq!(
            h.interpreter.execute_line("mark x | exit"),
            LineOutcome::Terminate
        );
        assert!(h.calls().is_empty());
        assert!(h.history().is_empty());
    }

    #[test]
    fn test_exit_wins_over_unknown_stage() {
        let mut h = harness();
        assert_eq!(
            h.interpreter.execute_line("frobnicate | exit"),
            LineOutcome::Terminate
        );
        assert_eq!(
            h.interpreter.execute_line("quit | frobnicate"),
            LineOutcome::Terminate
        );
        assert!(h.calls().is_empty());
        assert!(h.history().is_empty());
    }

    #[test]
    fn test_alias_to_exit_terminates() {
        let mut h = harness();
        h.interpreter
            .state_mut()
            .aliases
            .insert("bye".to_string(), "exit".to_string());
        assert_eq!(
            h.interpreter.execute_line("frobnicate | bye"),
            LineOutcome::Terminate
        );
        assert!(h.history().is_empty());
    }

    // --- Dispatch ---

    #[test]
    fn test_internal_command_never_launches() {
        let mut h = harness();
        let outcome = h.interpreter.execute_line("pwd");
        assert_eq!(outcome, LineOutcome::Completed(0));
        assert!(h.calls().is_empty());
        assert_eq!(h.output.text(), "/work\n");
    }

    #[test]
    fn test_unknown_command_is_reported() {
        let mut h = harness();
        let outcome = h.interpreter.execute_line("frobnicate");
        assert_eq!(outcome, LineOutcome::Completed(127));
        assert!(h.calls().is_empty());
        assert_eq!(h.history(), vec!["frobnicate"]);
    }

    #[test]
    fn test_unknown_stage_aborts_whole_pipeline() {
        let mut h = harness();
        let outcome = h.interpreter.execute_line("mark x | frobnicate");
        assert_eq!(outcome, LineOutcome::Completed(127));
        assert!(h.calls().is_empty());
    }

    #[test]
    fn test_external_gets_resolved_path_and_args() {
        let mut h = harness();
        h.interpreter.execute_line("mark hello");
        assert_eq!(
            h.calls(),
            vec![vec!["/work/mark.js".to_string(), "hello".to_string()]]
        );
    }

    #[test]
    fn test_alias_expansion_precedes_dispatch() {
        let mut h = harness();
        h.interpreter.execute_line("again");
        assert_eq!(h.calls()[0], vec!["/work/mark.js", "again"]);
        assert_eq!(marks(&h), "again\n");
    }

    #[test]
    fn test_internal_wins_over_script_of_same_name() {
        let mut h = harness();
        // /work/pwd.js exists, but the internal `pwd` runs.
        assert_eq!(h.interpreter.execute_line("pwd"), LineOutcome::Completed(0));
        assert!(h.calls().is_empty());
    }

    #[test]
    fn test_env_expansion_happens_before_parsing() {
        let mut h = harness();
        h.interpreter.execute_line("export WHO=world");
        h.interpreter.execute_line("mark $WHO ; mark ${WHO}2 ; mark x$NOPE");
        assert_eq!(marks(&h), "world\nworld2\nx\n");
        // The pre-expansion text is what gets recorded.
        assert_eq!(h.history().last().unwrap(), "mark $WHO ; mark ${WHO}2 ; mark x$NOPE");
    }

    // --- Results ---

    #[test]
    fn test_integer_result_is_exit_code() {
        let mut h = harness();
        assert_eq!(h.interpreter.execute_line("eval 5"), LineOutcome::Completed(5));
    }

    #[test]
    fn test_other_results_are_shown_with_unknown_code() {
        let mut h = harness();
        assert_eq!(
            h.interpreter.execute_line("eval hello there"),
            LineOutcome::Completed(EXIT_UNKNOWN)
        );
        assert_eq!(h.output.text(), "hello there\n");
    }

    #[test]
    fn test_evaluation_errors_fail_the_line() {
        let mut h = harness();
        assert_eq!(
            h.interpreter.execute_line("eval throw"),
            LineOutcome::Completed(1)
        );
    }

    #[test]
    fn test_parse_errors_use_usage_code() {
        let mut h = harness();
        assert_eq!(
            h.interpreter.execute_line("mark 'unterminated"),
            LineOutcome::Completed(EXIT_USAGE)
        );
        assert_eq!(
            h.interpreter.execute_line("ok || ok"),
            LineOutcome::Completed(EXIT_USAGE)
        );
        assert!(h.calls().is_empty());
    }

    // --- Pipelines ---

    #[test]
    fn test_internal_output_feeds_external_stage() {
        let mut h = harness();
        std::fs::write(
            h.work.path().join("save.js"),
            "cat > \"$(dirname \"$0\")/saved.txt\"\n",
        )
        .unwrap();
        let outcome = h.interpreter.execute_line("pwd | save");
        assert_eq!(outcome, LineOutcome::Completed(0));
        assert_eq!(
            std::fs::read_to_string(h.work.path().join("saved.txt")).unwrap(),
            "/work\n"
        );
        assert_eq!(h.output.text(), "");
    }

    #[test]
    fn test_internal_terminal_waits_for_feeding_children() {
        let mut h = harness();
        std::fs::write(
            h.work.path().join("slowmark.js"),
            "sleep 1; echo done >> \"$(dirname \"$0\")/marks.txt\"\n",
        )
        .unwrap();
        let outcome = h.interpreter.execute_line("slowmark | pwd");
        assert_eq!(outcome, LineOutcome::Completed(0));
        assert_eq!(h.output.text(), "/work\n");
        assert_eq!(marks(&h), "done\n");
    }

    #[test]
    fn test_pipeline_result_is_terminal_stage() {
        let mut h = harness();
        assert_eq!(
            h.interpreter.execute_line("fail | ok"),
            LineOutcome::Completed(0)
        );
        assert_eq!(
            h.interpreter.execute_line("ok | fail"),
            LineOutcome::Completed(3)
        );
    }

    // --- History ---

    #[test]
    fn test_blank_lines_are_not_recorded() {
        let mut h = harness();
        assert_eq!(h.interpreter.execute_line("   "), LineOutcome::Completed(0));
        assert!(h.history().is_empty());
    }

    #[test]
    fn test_entry_text_is_recorded_verbatim() {
        let mut h = harness();
        h.interpreter.execute_entry("mark a b", "mark a \\\nb");
        assert_eq!(h.history(), vec!["mark a \\\nb"]);
    }
}
