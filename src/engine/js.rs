// src/engine/js.rs

use crate::{
    CancellationToken,
    constants::PROGRAM_NAME,
    core::mount_table::MountTable,
    models::ScriptValue,
    system::{
        executor::{RunningPipeline, StageInput, StageOutput},
        launcher::Launch,
    },
    vfs::path,
};
use rquickjs::{
    CatchResultExt, Context, Ctx, Exception, Function, Object, Runtime, Value,
    convert::Coerced, function::Rest,
};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("Could not start the script engine: {0}")]
    Setup(String),
    #[error("{0}")]
    Script(String),
    #[error("Interrupted.")]
    Interrupted,
}

/// What a script can see of its process: argv and environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptScope {
    pub argv: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl ScriptScope {
    /// argv for inline code: `["jsh", "-C", args...]`.
    pub fn for_inline(args: &[String], env: BTreeMap<String, String>) -> Self {
        let mut argv = vec![PROGRAM_NAME.to_string(), "-C".to_string()];
        argv.extend(args.iter().cloned());
        Self { argv, env }
    }

    /// argv for a script file: `["jsh", script, args...]`.
    pub fn for_script(script: &str, args: &[String], env: BTreeMap<String, String>) -> Self {
        let mut argv = vec![PROGRAM_NAME.to_string(), script.to_string()];
        argv.extend(args.iter().cloned());
        Self { argv, env }
    }

    /// The virtual working directory (`PWD`, or `/`).
    pub fn cwd(&self) -> &str {
        self.env.get("PWD").map(String::as_str).unwrap_or("/")
    }
}

/// The opaque "run this source" capability the shell is built on.
pub trait Evaluator {
    fn eval(&mut self, source: &str, scope: &ScriptScope) -> Result<ScriptValue, EvalError>;
}

/// Host state handed to native modules when they are installed.
#[derive(Clone)]
pub struct HostBindings {
    pub mounts: Arc<MountTable>,
    pub scope: ScriptScope,
    pub launcher: Option<Rc<dyn Launch>>,
    pub cancel: CancellationToken,
}

impl fmt::Debug for HostBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBindings")
            .field("scope", &self.scope.argv)
            .field("mounts", &self.mounts.entries().len())
            .field("launcher", &self.launcher.is_some())
            .finish()
    }
}

impl HostBindings {
    fn resolve(&self, virtual_path: &str) -> String {
        path::absolutize(self.scope.cwd(), virtual_path)
    }

    /// Runs `script` in a new process sharing this terminal and returns its
    /// exit code.
    fn exec(&self, script: String, args: Vec<String>) -> anyhow::Result<i32> {
        let launcher = self
            .launcher
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("process.exec is not available in this engine"))?;

        let name = script.clone();
        let mut argv = vec![script];
        argv.extend(args);
        let prepared = launcher.build(None, argv, self.scope.env.clone())?;

        let mut running = RunningPipeline::new();
        running.spawn(&name, prepared, StageInput::Inherit, StageOutput::Inherit)?;
        let code = running.wait_for_terminal(&self.cancel);
        running.finish();
        Ok(code?)
    }
}

/// Builds the object a native module exposes under its global name.
pub type ModuleInit = for<'js> fn(&Ctx<'js>, &HostBindings) -> rquickjs::Result<Object<'js>>;

/// CommonJS loader. Called with the native modules, the host's resolver and
/// reader, and the directory bare relative names start from.
const REQUIRE_PRELUDE: &str = r#"
(function (natives, resolve, load, cwd) {
    const cache = Object.create(null);
    const makeRequire = (base) => function require(name) {
        name = String(name);
        if (Object.prototype.hasOwnProperty.call(natives, name)) {
            return natives[name];
        }
        const file = resolve(name, base);
        if (file == null) {
            throw new Error("Cannot find module '" + name + "'");
        }
        if (cache[file]) {
            return cache[file].exports;
        }
        const module = { id: file, exports: {} };
        cache[file] = module;
        const dir = file.slice(0, file.lastIndexOf("/")) || "/";
        try {
            const body = new Function("module", "exports", "require", "__filename", "__dirname", load(file));
            body.call(module.exports, module, module.exports, makeRequire(dir), file, dir);
        } catch (e) {
            delete cache[file];
            throw e;
        }
        return module.exports;
    };
    return makeRequire(cwd);
})
"#;

/// Embedded JavaScript evaluator.
///
/// One engine context lives as long as the evaluator, so globals defined by
/// one `eval` are visible to the next. Native modules and `require` are
/// reinstalled on every call so they always reflect the current scope.
pub struct JsEvaluator {
    context: Context,
    runtime: Runtime,
    mounts: Arc<MountTable>,
    modules: Vec<(&'static str, ModuleInit)>,
    launcher: Option<Rc<dyn Launch>>,
    cancel: CancellationToken,
}

impl fmt::Debug for JsEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.modules.iter().map(|(name, _)| *name).collect();
        f.debug_struct("JsEvaluator")
            .field("modules", &names)
            .field("mounts", &self.mounts.entries().len())
            .field("launcher", &self.launcher.is_some())
            .finish()
    }
}

impl JsEvaluator {
    /// Creates an engine with the built-in `console`, `process` and `fs`
    /// modules.
    pub fn new(mounts: Arc<MountTable>) -> Result<Self, EvalError> {
        let runtime = Runtime::new().map_err(|e| EvalError::Setup(e.to_string()))?;
        let context = Context::full(&runtime).map_err(|e| EvalError::Setup(e.to_string()))?;

        let mut evaluator = Self {
            context,
            runtime,
            mounts,
            modules: Vec::new(),
            launcher: None,
            cancel: Arc::new(AtomicBool::new(false)),
        };
        evaluator.register_module("console", console_module);
        evaluator.register_module("process", process_module);
        evaluator.register_module("fs", fs_module);
        Ok(evaluator)
    }

    /// Lets scripts start processes (`process.exec`) through `launcher`.
    pub fn with_launcher(mut self, launcher: Rc<dyn Launch>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Aborts running scripts once `cancel` is raised.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        let flag = Arc::clone(&cancel);
        self.runtime
            .set_interrupt_handler(Some(Box::new(move || flag.load(Ordering::SeqCst))));
        self.cancel = cancel;
        self
    }

    /// Exposes a native module to scripts as the global `name`, and to
    /// `require(name)`. Registering a name again replaces the earlier module.
    pub fn register_module(&mut self, name: &'static str, init: ModuleInit) {
        self.modules.retain(|(existing, _)| *existing != name);
        self.modules.push((name, init));
    }
}

impl Evaluator for JsEvaluator {
    fn eval(&mut self, source: &str, scope: &ScriptScope) -> Result<ScriptValue, EvalError> {
        let bindings = HostBindings {
            mounts: Arc::clone(&self.mounts),
            scope: scope.clone(),
            launcher: self.launcher.clone(),
            cancel: Arc::clone(&self.cancel),
        };
        let modules = &self.modules;

        let result = self.context.with(|ctx| {
            let globals = ctx.globals();
            let natives =
                Object::new(ctx.clone()).map_err(|e| EvalError::Setup(e.to_string()))?;
            for (name, init) in modules {
                init(&ctx, &bindings)
                    .and_then(|module| {
                        natives.set(*name, module.clone())?;
                        globals.set(*name, module)
                    })
                    .map_err(|e| EvalError::Setup(format!("module '{}': {}", name, e)))?;
            }
            install_require(&ctx, natives, &bindings)
                .map_err(|e| EvalError::Setup(format!("require: {}", e)))?;

            let value: Value<'_> = ctx
                .eval(source)
                .catch(&ctx)
                .map_err(|e| EvalError::Script(e.to_string()))?;
            Ok(to_script_value(&ctx, &value))
        });

        match result {
            Err(EvalError::Script(message)) if self.cancel.load(Ordering::SeqCst) => {
                log::debug!("Script stopped by interrupt: {}", message);
                Err(EvalError::Interrupted)
            }
            other => other,
        }
    }
}

fn install_require<'js>(
    ctx: &Ctx<'js>,
    natives: Object<'js>,
    bindings: &HostBindings,
) -> rquickjs::Result<()> {
    let factory: Function<'js> = ctx.eval(REQUIRE_PRELUDE)?;

    let host = bindings.clone();
    let resolve = Function::new(ctx.clone(), move |name: String, base: String| {
        path::resolve_module(&host.mounts, &host.scope.env, &base, &name)
    })?;
    let host = bindings.clone();
    let load = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, file: String| -> rquickjs::Result<String> {
            host.mounts.read_to_string(&file).map_err(|e| throw(&ctx, e))
        },
    )?;

    let require: Function<'js> =
        factory.call((natives, resolve, load, bindings.scope.cwd().to_string()))?;
    ctx.globals().set("require", require)
}

fn to_script_value<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> ScriptValue {
    if value.is_undefined() {
        ScriptValue::Undefined
    } else if let Some(int) = value.as_int() {
        ScriptValue::Int(i64::from(int))
    } else {
        ScriptValue::Text(render(ctx, value))
    }
}

/// Formats a value the way `console.log` shows it.
fn render<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> String {
    if let Some(text) = value.as_string() {
        return text.to_string().unwrap_or_default();
    }
    if value.is_undefined() {
        return "undefined".to_string();
    }
    if let Some(int) = value.as_int() {
        return int.to_string();
    }
    if let Some(float) = value.as_float() {
        return float.to_string();
    }
    if let Some(flag) = value.as_bool() {
        return flag.to_string();
    }
    match ctx.json_stringify(value.clone()) {
        Ok(Some(json)) => json.to_string().unwrap_or_default(),
        _ => "[object]".to_string(),
    }
}

fn render_all<'js>(ctx: &Ctx<'js>, values: &[Value<'js>]) -> String {
    values
        .iter()
        .map(|v| render(ctx, v))
        .collect::<Vec<_>>()
        .join(" ")
}

fn throw(ctx: &Ctx<'_>, error: impl fmt::Display) -> rquickjs::Error {
    Exception::throw_message(ctx, &error.to_string())
}

// --- Built-in modules ---

fn console_module<'js>(ctx: &Ctx<'js>, _bindings: &HostBindings) -> rquickjs::Result<Object<'js>> {
    let console = Object::new(ctx.clone())?;

    let println = |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
        println!("{}", render_all(&ctx, &args.0));
    };
    console.set("log", Function::new(ctx.clone(), println)?)?;
    console.set("println", Function::new(ctx.clone(), println)?)?;
    console.set(
        "print",
        Function::new(ctx.clone(), |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
            print!("{}", render_all(&ctx, &args.0));
            std::io::stdout().flush().ok();
        })?,
    )?;
    console.set(
        "error",
        Function::new(ctx.clone(), |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
            eprintln!("{}", render_all(&ctx, &args.0));
        })?,
    )?;
    Ok(console)
}

fn process_module<'js>(ctx: &Ctx<'js>, bindings: &HostBindings) -> rquickjs::Result<Object<'js>> {
    let process = Object::new(ctx.clone())?;
    process.set("argv", bindings.scope.argv.clone())?;

    let env = Object::new(ctx.clone())?;
    for (name, value) in &bindings.scope.env {
        env.set(name.as_str(), value.as_str())?;
    }
    process.set("env", env)?;

    let cwd = bindings.scope.cwd().to_string();
    process.set("cwd", Function::new(ctx.clone(), move || cwd.clone())?)?;

    let host = bindings.clone();
    process.set(
        "which",
        Function::new(ctx.clone(), move |name: String| {
            path::which(&host.mounts, &host.scope.env, &name)
        })?,
    )?;

    let host = bindings.clone();
    process.set(
        "exec",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, script: String, args: Rest<Coerced<String>>| -> rquickjs::Result<i32> {
                let args = args.0.into_iter().map(|arg| arg.0).collect();
                host.exec(script, args)
                    .map_err(|e| throw(&ctx, format!("{:#}", e)))
            },
        )?,
    )?;
    Ok(process)
}

fn fs_module<'js>(ctx: &Ctx<'js>, bindings: &HostBindings) -> rquickjs::Result<Object<'js>> {
    let fs = Object::new(ctx.clone())?;

    let host = bindings.clone();
    fs.set(
        "readFile",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, file: String| -> rquickjs::Result<String> {
                host.mounts
                    .read_to_string(&host.resolve(&file))
                    .map_err(|e| throw(&ctx, e))
            },
        )?,
    )?;

    let host = bindings.clone();
    fs.set(
        "writeFile",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, file: String, data: String| -> rquickjs::Result<()> {
                host.mounts
                    .write(&host.resolve(&file), data.as_bytes())
                    .map_err(|e| throw(&ctx, e))
            },
        )?,
    )?;

    let host = bindings.clone();
    fs.set(
        "readDir",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, dir: String| -> rquickjs::Result<Vec<String>> {
                host.mounts
                    .read_dir(&host.resolve(&dir))
                    .map(|entries| entries.into_iter().map(|e| e.name).collect())
                    .map_err(|e| throw(&ctx, e))
            },
        )?,
    )?;

    let host = bindings.clone();
    fs.set(
        "stat",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, file: String| -> rquickjs::Result<Object<'js>> {
                let meta = host
                    .mounts
                    .stat(&host.resolve(&file))
                    .map_err(|e| throw(&ctx, e))?;
                let stat = Object::new(ctx.clone())?;
                stat.set("name", meta.name.as_str())?;
                stat.set("size", meta.size as f64)?;
                stat.set("isDir", meta.is_dir())?;
                stat.set("isFile", meta.is_file())?;
                Ok(stat)
            },
        )?,
    )?;

    let host = bindings.clone();
    fs.set(
        "exists",
        Function::new(ctx.clone(), move |file: String| {
            host.mounts.stat(&host.resolve(&file)).is_ok()
        })?,
    )?;

    Ok(fs)
}
