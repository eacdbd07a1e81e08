// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command-line interface for the runlet execution engine.
//!
//! `runlet run` streams a child's output live (or as JSON lines) and exits
//! with the child's code; `plan`, `env`, `clone`, and `scan` expose the
//! engine's planning, discovery, and workspace helpers.

#![deny(unsafe_code)]

mod config;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use runlet_core::{CommandSpec, ErrorCode, OutputEvent, Platform};
use runlet_env::{CondaResolver, DiscoveryOverrides};
use runlet_exec::{
    BackendKind, CancelReason, CommandKind, Engine, ExecOptions, TempScriptPolicy, BACKEND_ENV,
};
use runlet_workspace::{clone_repository, scan_directory};
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const BLUE: &str = "\x1b[34m";
const RESET: &str = "\x1b[0m";

#[derive(Parser, Debug)]
#[command(name = "runlet", version, about = "Streaming runner for external commands")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long, global = true)]
    verbose: bool,

    /// Config file path (defaults to ./runlet.toml when present).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a command and stream its output.
    Run {
        #[command(flatten)]
        spec: SpecArgs,

        /// Pump backend override.
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,

        /// Where wrapper scripts are materialized.
        #[arg(long, value_enum)]
        script_dir: Option<ScriptDirArg>,

        /// Print one JSON event per line instead of live text.
        #[arg(long)]
        json: bool,
    },
    /// Show what a run would do, without spawning anything.
    Plan {
        #[command(flatten)]
        spec: SpecArgs,

        /// Print the plan as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show the discovered manager layout and the child environment.
    Env {
        /// Print layout and environment as JSON.
        #[arg(long)]
        json: bool,

        /// Drop the cached discovery and probe again.
        #[arg(long)]
        refresh: bool,
    },
    /// Clone a git repository, capturing the output.
    Clone {
        /// Repository URL.
        url: String,

        /// Destination directory.
        dest: PathBuf,

        /// Remove an existing destination first.
        #[arg(long)]
        clean: bool,
    },
    /// List files and directories under a path.
    Scan {
        /// Directory to scan (defaults to the current directory).
        dir: Option<PathBuf>,

        /// Limit recursion depth.
        #[arg(long, value_name = "N")]
        max_depth: Option<usize>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Command input shared by `run` and `plan`: a shell line or a trailing
/// argv, plus the working directory.
#[derive(Args, Debug)]
struct SpecArgs {
    /// Shell-syntax command line (POSIX quoting rules).
    #[arg(short = 'c', long = "command", value_name = "LINE")]
    command: Option<String>,

    /// Argument vector, given after `--`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGV")]
    argv: Vec<String>,

    /// Working directory for the child.
    #[arg(long, value_name = "DIR")]
    cwd: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    /// One reader task per pipe.
    Tasks,
    /// A single task multiplexing both pipes.
    Select,
}

impl From<BackendArg> for BackendKind {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Tasks => BackendKind::TaskPerStream,
            BackendArg::Select => BackendKind::Multiplexed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ScriptDirArg {
    /// Next to the run's working directory.
    Colocated,
    /// In the system temp directory.
    SystemTemp,
}

impl From<ScriptDirArg> for TempScriptPolicy {
    fn from(value: ScriptDirArg) -> Self {
        match value {
            ScriptDirArg::Colocated => TempScriptPolicy::Colocated,
            ScriptDirArg::SystemTemp => TempScriptPolicy::SystemTemp,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let cfg = config::load(cli.config.as_deref())?;

    let code = match cli.command {
        Commands::Run {
            spec,
            backend,
            script_dir,
            json,
        } => {
            let spec = build_spec(spec)?;
            let engine = build_engine(&cfg.engine, backend, script_dir);
            cmd_run(&engine, &spec, json).await?
        }
        Commands::Plan { spec, json } => {
            let spec = build_spec(spec)?;
            let engine = build_engine(&cfg.engine, None, None);
            cmd_plan(&engine, &spec, json)?;
            0
        }
        Commands::Env { json, refresh } => {
            let resolver = build_resolver(&cfg.engine);
            cmd_env(&resolver, json, refresh)?;
            0
        }
        Commands::Clone { url, dest, clean } => cmd_clone(&url, &dest, clean).await?,
        Commands::Scan {
            dir,
            max_depth,
            json,
        } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from("."));
            cmd_scan(&dir, max_depth, json)?;
            0
        }
    };

    let status = process_exit_code(code);
    if status != 0 {
        std::process::exit(status);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(
            "runlet_core=debug,runlet_env=debug,runlet_exec=debug,runlet_workspace=debug,runlet_cli=debug",
        )
    } else {
        EnvFilter::new("runlet_exec=info,runlet_env=info")
    };
    // Logs go to stderr so `run --json` keeps stdout parseable.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn build_spec(args: SpecArgs) -> Result<CommandSpec> {
    let mut spec = match (args.command, args.argv.is_empty()) {
        (Some(line), true) => CommandSpec::line(line),
        (None, false) => CommandSpec::argv(args.argv),
        (Some(_), false) => anyhow::bail!("pass either -c <LINE> or a trailing argv, not both"),
        (None, true) => anyhow::bail!("no command given; use -c <LINE> or `-- <argv...>`"),
    };
    if let Some(dir) = args.cwd {
        spec = spec.with_cwd(dir);
    }
    Ok(spec)
}

fn build_resolver(cfg: &config::EngineConfig) -> CondaResolver {
    let mut overrides = DiscoveryOverrides::from_env();
    if overrides.explicit_exe.is_none() {
        overrides.explicit_exe = cfg.conda_exe.clone();
    }
    CondaResolver::with_overrides(Platform::current(), overrides)
}

fn build_engine(
    cfg: &config::EngineConfig,
    backend: Option<BackendArg>,
    script_dir: Option<ScriptDirArg>,
) -> Engine {
    let options = exec_options(
        cfg,
        backend,
        script_dir,
        std::env::var_os(BACKEND_ENV).is_some(),
    );
    Engine::with_resolver(Arc::new(build_resolver(cfg)), options)
}

/// Merge file-level tuning with command-line flags. Flags win; the
/// `RUNLET_BACKEND` variable keeps its place between flag and file, so the
/// file value is only forwarded when the variable is absent.
fn exec_options(
    cfg: &config::EngineConfig,
    backend: Option<BackendArg>,
    script_dir: Option<ScriptDirArg>,
    env_has_backend: bool,
) -> ExecOptions {
    let mut options = ExecOptions::default();
    let file_backend = if env_has_backend {
        None
    } else {
        cfg.backend.map(BackendKind::from)
    };
    options.backend = backend.map(BackendKind::from).or(file_backend);
    if let Some(policy) = script_dir
        .map(TempScriptPolicy::from)
        .or_else(|| cfg.script_dir.map(TempScriptPolicy::from))
    {
        options.script_policy = policy;
    }
    if let Some(ms) = cfg.kill_grace_ms {
        options.kill_grace = Duration::from_millis(ms);
    }
    options
}

async fn cmd_run(engine: &Engine, spec: &CommandSpec, json: bool) -> Result<i32> {
    let printer = StreamPrinter::new(json);
    let (run_id, mut events, cancel, driver) = engine.execute(spec).into_parts();
    debug!(%run_id, command = %spec.display_line(), "run started");

    let mut code = ErrorCode::Internal.exit_code();
    loop {
        tokio::select! {
            maybe = events.next() => match maybe {
                Some(event) => {
                    if let OutputEvent::ReturnCode { code: final_code } = &event {
                        code = *final_code;
                    }
                    printer.print(&event)?;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                eprintln!("interrupted, stopping child");
                cancel.cancel(CancelReason::Explicit);
            }
        }
    }
    let _ = driver.await;
    Ok(code)
}

fn cmd_plan(engine: &Engine, spec: &CommandSpec, json: bool) -> Result<()> {
    let plan = engine.plan(spec)?;
    let view = plan.view();
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }
    println!("{:<10} {}", "command", view.command);
    println!("{:<10} {}", "kind", kind_str(view.kind));
    println!("{:<10} {}", "platform", view.platform);
    println!("{:<10} {}", "via shell", yes_no(view.via_shell));
    println!("{:<10} {}", "script", yes_no(view.script));
    if let Some(cwd) = &view.cwd {
        println!("{:<10} {}", "cwd", cwd.display());
    }
    println!("{:<10} {}", "env keys", view.env_keys.join(", "));
    if let Some(preview) = &view.script_preview {
        println!("script body:");
        for line in preview.lines() {
            println!("  {line}");
        }
    }
    Ok(())
}

fn cmd_env(resolver: &CondaResolver, json: bool, refresh: bool) -> Result<()> {
    let layout = if refresh {
        resolver.refresh()
    } else {
        resolver.resolve()
    };
    let env = resolver.restricted_env();
    if json {
        let doc = serde_json::json!({ "layout": &*layout, "environment": env });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }
    println!("{:<12} {}", "manager", path_or_dash(layout.exe.as_deref()));
    println!("{:<12} {}", "root", path_or_dash(layout.root.as_deref()));
    println!(
        "{:<12} {}",
        "scripts",
        path_or_dash(layout.scripts_dir.as_deref())
    );
    println!(
        "{:<12} {}",
        "condabin",
        path_or_dash(layout.condabin_dir.as_deref())
    );
    println!(
        "{:<12} {}",
        "library bin",
        path_or_dash(layout.library_bin_dir.as_deref())
    );
    println!(
        "{:<12} {}",
        "activate",
        path_or_dash(layout.activate_script.as_deref())
    );
    println!();
    let sep = resolver.platform().path_list_separator();
    for (key, value) in &env {
        if key == "PATH" {
            println!("PATH:");
            for entry in value.split(sep) {
                println!("  {entry}");
            }
        } else {
            println!("{key}={value}");
        }
    }
    Ok(())
}

async fn cmd_clone(url: &str, dest: &Path, clean: bool) -> Result<i32> {
    let outcome = clone_repository(url, dest, clean).await?;
    for line in &outcome.stdout_lines {
        println!("{line}");
    }
    for line in &outcome.stderr_lines {
        eprintln!("{line}");
    }
    if outcome.success() {
        eprintln!("cloned {url} into {}", dest.display());
    }
    Ok(outcome.return_code)
}

fn cmd_scan(dir: &Path, max_depth: Option<usize>, json: bool) -> Result<()> {
    let report = scan_directory(dir, max_depth)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for name in &report.directories {
        println!("{name}/");
    }
    for name in &report.files {
        println!("{name}");
    }
    eprintln!(
        "{}: {} files, {} directories",
        report.base_path,
        report.files.len(),
        report.directories.len()
    );
    Ok(())
}

/// Writes events as they arrive: live text with per-stream colors on a
/// terminal, or one compact JSON object per line.
struct StreamPrinter {
    json: bool,
    color_out: bool,
    color_err: bool,
}

impl StreamPrinter {
    fn new(json: bool) -> Self {
        Self {
            json,
            color_out: !json && io::stdout().is_terminal(),
            color_err: !json && io::stderr().is_terminal(),
        }
    }

    fn print(&self, event: &OutputEvent) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(event)?);
            return Ok(());
        }
        match event {
            OutputEvent::Stdout { text } => {
                if self.color_out {
                    print!("{GREEN}{text}{RESET}");
                } else {
                    print!("{text}");
                }
                // Chunks rarely end on a line boundary.
                io::stdout().flush()?;
            }
            OutputEvent::Stderr { text } => {
                if self.color_err {
                    eprint!("{RED}{text}{RESET}");
                } else {
                    eprint!("{text}");
                }
            }
            OutputEvent::ReturnCode { code } => {
                if self.color_err {
                    eprintln!("{BLUE}exit code: {code}{RESET}");
                } else {
                    eprintln!("exit code: {code}");
                }
            }
        }
        Ok(())
    }
}

/// The process exit status for a run's final code.
///
/// Reserved engine codes are negative and cannot round-trip through a
/// process exit status, so they collapse to `1`.
fn process_exit_code(code: i32) -> i32 {
    if code < 0 { 1 } else { code }
}

fn kind_str(kind: CommandKind) -> &'static str {
    match kind {
        CommandKind::Plain => "plain",
        CommandKind::Manager => "manager",
        CommandKind::ManagerRun => "manager_run",
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn path_or_dash(path: Option<&Path>) -> String {
    match path {
        Some(p) => p.display().to_string(),
        None => "-".to_string(),
    }
}
