// SPDX-License-Identifier: MIT OR Apache-2.0
//! Spawns a planned child and drives it to the terminal event.
//!
//! The driver runs as a background task per execution. It materializes
//! the wrapper script when the plan calls for one, spawns the child with
//! the restricted environment, pumps both pipes through the negotiated
//! backend, decodes chunks incrementally, and closes the stream with
//! exactly one `return_code` event. Cancellation and handle drop both
//! route through the same escalating shutdown.

use crate::backend::{backend_for, negotiate, ChildStreams, PumpOptions, RawChunk};
use crate::cancel::{CancelReason, CancelToken};
use crate::guard::LifecycleGuard;
use crate::plan::{ExecutionPlan, Invocation, TempScriptPolicy, CMD_WRAPPER};
use crate::ExecOptions;
use runlet_core::{
    EngineError, ErrorCode, EventLog, OutputEvent, Platform, RunPhase, StreamSource,
    Utf8StreamDecoder,
};
use std::io::Write;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tempfile::TempPath;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};
use uuid::Uuid;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

/// Buffered events between the driver and the consumer.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Buffered raw chunks between the backend and the driver.
const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// Creation flag suppressing a console window for spawned children.
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

// ---------------------------------------------------------------------------
// ExecutionHandle
// ---------------------------------------------------------------------------

/// A live execution: the event stream plus its control surfaces.
///
/// Dropping the handle abandons the run; the driver then terminates the
/// child and removes any wrapper script in the background. Use
/// [`ExecutionHandle::into_parts`] to keep the pieces without that
/// behavior.
pub struct ExecutionHandle {
    /// Correlation id for this run, present in the driver's log lines.
    pub run_id: Uuid,
    /// Ordered stream of output events, closed after the terminal
    /// `return_code` event.
    pub events: ReceiverStream<OutputEvent>,
    /// Cancels the run; the child is terminated and the stream still
    /// ends with a terminal event.
    pub cancel: CancelToken,
    /// Join handle for the background driver task.
    pub driver: tokio::task::JoinHandle<()>,
}

impl ExecutionHandle {
    /// Collect every remaining event into an [`EventLog`].
    pub async fn collect(mut self) -> EventLog {
        use tokio_stream::StreamExt;

        let mut log = EventLog::new();
        while let Some(event) = self.events.next().await {
            log.push(event);
        }
        log
    }

    /// Split the handle into its fields, disabling abandon-on-drop.
    #[allow(clippy::type_complexity)]
    #[allow(unsafe_code)]
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        Uuid,
        ReceiverStream<OutputEvent>,
        CancelToken,
        tokio::task::JoinHandle<()>,
    ) {
        let this = std::mem::ManuallyDrop::new(self);
        // SAFETY: every field is read exactly once and the destructor is
        // suppressed by ManuallyDrop, so no field is dropped twice.
        unsafe {
            (
                std::ptr::read(&this.run_id),
                std::ptr::read(&this.events),
                std::ptr::read(&this.cancel),
                std::ptr::read(&this.driver),
            )
        }
    }
}

impl Drop for ExecutionHandle {
    fn drop(&mut self) {
        self.cancel.cancel(CancelReason::Abandoned);
    }
}

impl std::fmt::Debug for ExecutionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("run_id", &self.run_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Launch the driver task for `plan`.
///
/// Must be called from within a tokio runtime.
pub(crate) fn start(plan: ExecutionPlan, options: &ExecOptions) -> ExecutionHandle {
    let run_id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let cancel = CancelToken::new();
    let driver = tokio::spawn(drive(plan, options.clone(), tx, cancel.clone(), run_id));
    ExecutionHandle {
        run_id,
        events: ReceiverStream::new(rx),
        cancel,
        driver,
    }
}

/// A handle whose stream replays a planning failure: one `stderr` event
/// and the code's reserved negative `return_code`. Nothing is spawned.
pub(crate) fn failed(error: &EngineError) -> ExecutionHandle {
    let (tx, rx) = mpsc::channel(2);
    let _ = tx.try_send(OutputEvent::stderr(format!("ERROR: {error}")));
    let _ = tx.try_send(OutputEvent::return_code(error.exit_code()));
    drop(tx);
    ExecutionHandle {
        run_id: Uuid::new_v4(),
        events: ReceiverStream::new(rx),
        cancel: CancelToken::new(),
        driver: tokio::spawn(async {}),
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

async fn drive(
    plan: ExecutionPlan,
    options: ExecOptions,
    tx: mpsc::Sender<OutputEvent>,
    cancel: CancelToken,
    run_id: Uuid,
) {
    let mut guard = LifecycleGuard::new(options.kill_grace);

    let argv = match prepare_invocation(&plan, &mut guard) {
        Ok(argv) => argv,
        Err(error) => {
            warn!(run_id = %run_id, %error, "run setup failed");
            emit_failure(&tx, &error).await;
            guard.finish(Some("setup failed".into()));
            return;
        }
    };

    let mut child = match spawn_child(&argv, &plan) {
        Ok(child) => child,
        Err(error) => {
            warn!(run_id = %run_id, %error, "spawn failed");
            emit_failure(&tx, &error).await;
            guard.finish(Some("spawn failed".into()));
            return;
        }
    };
    debug!(run_id = %run_id, pid = ?child.id(), line = %plan.display_line(), "child spawned");
    guard.advance(RunPhase::Running, Some(format!("pid {:?}", child.id())));

    let streams = match take_streams(&mut child) {
        Ok(streams) => streams,
        Err(error) => {
            warn!(run_id = %run_id, %error, "child pipes unavailable");
            guard.shutdown(&mut child, "pipe setup failed").await;
            emit_failure(&tx, &error).await;
            guard.finish(Some("pipe setup failed".into()));
            return;
        }
    };

    let selection = negotiate(Platform::current(), options.backend);
    debug!(
        run_id = %run_id,
        backend = %selection.kind,
        origin = ?selection.origin,
        "pump backend selected"
    );
    let backend = backend_for(selection.kind);
    let pump_opts = PumpOptions {
        chunk_size: options.chunk_size,
        poll_interval: options.poll_interval,
    };

    let mut decoders = StreamDecoders::new();
    let (chunk_tx, mut chunk_rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);

    // `why` is set when the run was interrupted rather than drained.
    let mut interrupted: Option<&'static str> = None;
    {
        let pump = backend.pump(&mut child, streams, chunk_tx, pump_opts);
        tokio::pin!(pump);
        let mut pump_done = false;
        loop {
            tokio::select! {
                chunk = chunk_rx.recv() => match chunk {
                    Some(chunk) => {
                        if !forward_chunk(chunk, &mut decoders, &tx, &mut guard).await {
                            interrupted = Some("event stream receiver dropped");
                            break;
                        }
                    }
                    // Backend done and every buffered chunk forwarded.
                    None => break,
                },
                result = &mut pump, if !pump_done => {
                    pump_done = true;
                    if let Err(error) = result {
                        warn!(run_id = %run_id, %error, "stream backend failed");
                    }
                    // Keep looping to drain chunks still in the channel.
                }
                () = cancel.cancelled() => {
                    interrupted = Some(cancel_label(&cancel));
                    break;
                }
            }
        }
    }

    let status = if let Some(why) = interrupted {
        guard.shutdown(&mut child, why).await
    } else {
        // Pipes are closed but the child may outlive them; stay
        // cancellable while waiting for the real exit.
        tokio::select! {
            result = child.wait() => match result {
                Ok(status) => Some(status),
                Err(error) => {
                    warn!(run_id = %run_id, %error, "wait on child failed");
                    None
                }
            },
            () = cancel.cancelled() => {
                guard.shutdown(&mut child, cancel_label(&cancel)).await
            }
        }
    };

    let code = status.map_or_else(|| ErrorCode::Internal.exit_code(), exit_code_of);
    guard.advance(RunPhase::Exited, Some(format!("code {code}")));

    flush_decoders(&mut decoders, &tx).await;
    let _ = tx.send(OutputEvent::return_code(code)).await;
    guard.finish(None);
    debug!(run_id = %run_id, code, "run finished");
}

/// Short description of why a cancellation fired, for shutdown logs.
fn cancel_label(cancel: &CancelToken) -> &'static str {
    match cancel.reason() {
        Some(CancelReason::Abandoned) => "handle dropped",
        _ => "cancelled",
    }
}

// ---------------------------------------------------------------------------
// Chunk forwarding and decoding
// ---------------------------------------------------------------------------

/// One incremental decoder per child stream.
struct StreamDecoders {
    stdout: Utf8StreamDecoder,
    stderr: Utf8StreamDecoder,
}

impl StreamDecoders {
    fn new() -> Self {
        Self {
            stdout: Utf8StreamDecoder::new(),
            stderr: Utf8StreamDecoder::new(),
        }
    }

    fn get_mut(&mut self, source: StreamSource) -> &mut Utf8StreamDecoder {
        match source {
            StreamSource::Stdout => &mut self.stdout,
            StreamSource::Stderr => &mut self.stderr,
        }
    }
}

/// Decode one chunk and forward the resulting event, if any.
///
/// Returns `false` when the consumer has dropped the event stream and
/// the run should be interrupted.
async fn forward_chunk(
    chunk: RawChunk,
    decoders: &mut StreamDecoders,
    tx: &mpsc::Sender<OutputEvent>,
    guard: &mut LifecycleGuard,
) -> bool {
    match chunk {
        RawChunk::Data { source, bytes } => {
            let text = decoders.get_mut(source).decode_chunk(&bytes);
            if text.is_empty() {
                // All bytes were carried as an incomplete sequence.
                return true;
            }
            tx.send(OutputEvent::for_stream(source, text)).await.is_ok()
        }
        RawChunk::Eof { source } => {
            guard.advance(RunPhase::StreamsDraining, Some(format!("{source} closed")));
            let tail = decoders.get_mut(source).finish();
            if tail.is_empty() {
                return true;
            }
            tx.send(OutputEvent::for_stream(source, tail)).await.is_ok()
        }
    }
}

/// Flush any carried bytes left in the decoders. Finishing an already
/// finished decoder yields nothing, so this is safe on every exit path.
async fn flush_decoders(decoders: &mut StreamDecoders, tx: &mpsc::Sender<OutputEvent>) {
    for source in [StreamSource::Stdout, StreamSource::Stderr] {
        let tail = decoders.get_mut(source).finish();
        if !tail.is_empty() {
            let _ = tx.send(OutputEvent::for_stream(source, tail)).await;
        }
    }
}

/// Forward a failure as the event pair every consumer understands.
async fn emit_failure(tx: &mpsc::Sender<OutputEvent>, error: &EngineError) {
    let _ = tx.send(OutputEvent::stderr(format!("ERROR: {error}"))).await;
    let _ = tx.send(OutputEvent::return_code(error.exit_code())).await;
}

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

/// Turn the plan's invocation into a spawnable argv, materializing the
/// wrapper script when required.
fn prepare_invocation(
    plan: &ExecutionPlan,
    guard: &mut LifecycleGuard,
) -> Result<Vec<String>, EngineError> {
    match &plan.invocation {
        Invocation::Direct { argv } => Ok(argv.clone()),
        Invocation::Script { body } => {
            let script = materialize_script(body, plan.script_policy, plan.cwd.as_deref())?;
            let mut argv: Vec<String> = CMD_WRAPPER.iter().map(|t| (*t).to_string()).collect();
            argv.push(script.display().to_string());
            guard.attach_script(script);
            Ok(argv)
        }
    }
}

/// Write the script body to a uniquely named `.bat` file.
///
/// Colocated placement prefers the run's working directory so relative
/// references inside the script resolve there; on failure the system
/// temp directory is the fallback, and only a failure there too aborts
/// the run.
fn materialize_script(
    body: &str,
    policy: TempScriptPolicy,
    cwd: Option<&Path>,
) -> Result<TempPath, EngineError> {
    if policy == TempScriptPolicy::Colocated {
        if let Some(dir) = cwd {
            match write_script(dir, body) {
                Ok(script) => return Ok(script),
                Err(error) => {
                    warn!(
                        dir = %dir.display(),
                        %error,
                        "could not colocate wrapper script; using system temp"
                    );
                }
            }
        }
    }
    write_script(&std::env::temp_dir(), body).map_err(|error| {
        EngineError::new(ErrorCode::Internal, "failed to create wrapper script").with_source(error)
    })
}

fn write_script(dir: &Path, body: &str) -> std::io::Result<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("runlet-")
        .suffix(".bat")
        .tempfile_in(dir)?;
    file.write_all(body.as_bytes())?;
    file.flush()?;
    Ok(file.into_temp_path())
}

/// Spawn the child with the plan's environment and both pipes captured.
fn spawn_child(argv: &[String], plan: &ExecutionPlan) -> Result<Child, EngineError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| EngineError::new(ErrorCode::InvalidCommand, "empty argument vector"))?;

    let mut command = Command::new(program);
    command
        .args(args)
        .env_clear()
        .envs(&plan.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &plan.cwd {
        command.current_dir(cwd);
    }
    #[cfg(windows)]
    command.creation_flags(CREATE_NO_WINDOW);

    command.spawn().map_err(|error| spawn_error(program, error))
}

fn spawn_error(program: &str, error: std::io::Error) -> EngineError {
    if error.kind() == std::io::ErrorKind::NotFound {
        EngineError::new(
            ErrorCode::ExecutableNotFound,
            format!("executable not found: {program}"),
        )
        .with_source(error)
        .with_context("program", program)
    } else {
        EngineError::new(ErrorCode::SpawnFailed, format!("failed to spawn {program}"))
            .with_source(error)
            .with_context("program", program)
    }
}

fn take_streams(child: &mut Child) -> Result<ChildStreams, EngineError> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| EngineError::new(ErrorCode::Internal, "child stdout pipe unavailable"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| EngineError::new(ErrorCode::Internal, "child stderr pipe unavailable"))?;
    Ok(ChildStreams { stdout, stderr })
}

/// Map an exit status to the engine's result code: the plain exit code,
/// `128 + signo` for signal deaths, and the internal reserve when the
/// platform reports neither.
fn exit_code_of(status: ExitStatus) -> i32 {
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
    ErrorCode::Internal.exit_code()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failed_handle_replays_the_error() {
        let error = EngineError::new(ErrorCode::ManagerNotFound, "conda.bat was not found");
        let log = failed(&error).collect().await;

        assert_eq!(log.return_code(), Some(-105));
        assert!(log.stderr_text().starts_with("ERROR: [MANAGER_NOT_FOUND]"));
        assert_eq!(log.counts()["stderr"], 1);
    }

    #[tokio::test]
    async fn failed_handle_stream_is_finite() {
        let error = EngineError::new(ErrorCode::InvalidCommand, "empty command");
        let log = failed(&error).collect().await;
        assert_eq!(log.len(), 2);
        assert!(log.events()[1].is_terminal());
    }

    #[test]
    fn spawn_error_maps_not_found() {
        let err = spawn_error(
            "pytho",
            std::io::Error::new(std::io::ErrorKind::NotFound, "nope"),
        );
        assert_eq!(err.code, ErrorCode::ExecutableNotFound);
        assert_eq!(err.exit_code(), -101);
    }

    #[test]
    fn spawn_error_maps_other_failures() {
        let err = spawn_error(
            "prog",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.code, ErrorCode::SpawnFailed);
        assert_eq!(err.exit_code(), -99);
    }

    #[test]
    fn exit_code_prefers_the_plain_code() {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            assert_eq!(exit_code_of(ExitStatus::from_raw(0)), 0);
            // Raw wait status 9 is "killed by SIGKILL".
            assert_eq!(exit_code_of(ExitStatus::from_raw(9)), 128 + 9);
            // Exit code 3 sits in the high byte of a raw wait status.
            assert_eq!(exit_code_of(ExitStatus::from_raw(3 << 8)), 3);
        }
    }

    #[test]
    fn script_materializes_in_the_given_directory() {
        let dir = tempfile::tempdir().unwrap();
        let script = materialize_script(
            "@echo off\r\nEXIT /B 0\r\n",
            TempScriptPolicy::Colocated,
            Some(dir.path()),
        )
        .unwrap();

        assert_eq!(script.parent(), Some(dir.path()));
        let name = script.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("runlet-"));
        assert!(name.ends_with(".bat"));
        assert_eq!(
            std::fs::read_to_string(&script).unwrap(),
            "@echo off\r\nEXIT /B 0\r\n"
        );
    }

    #[test]
    fn colocation_without_cwd_uses_system_temp() {
        let script =
            materialize_script("@echo off\r\n", TempScriptPolicy::Colocated, None).unwrap();
        assert_eq!(script.parent(), Some(std::env::temp_dir().as_path()));
    }

    #[test]
    fn unreachable_cwd_falls_back_to_system_temp() {
        let missing = Path::new("/definitely/not/a/real/directory");
        let script =
            materialize_script("@echo off\r\n", TempScriptPolicy::Colocated, Some(missing))
                .unwrap();
        assert_eq!(script.parent(), Some(std::env::temp_dir().as_path()));
    }

    #[tokio::test]
    async fn forward_chunk_carries_split_utf8_across_chunks() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut decoders = StreamDecoders::new();
        let mut guard = LifecycleGuard::new(std::time::Duration::from_millis(100));

        // "é" split across two chunks: no event until it completes.
        let first = RawChunk::Data {
            source: StreamSource::Stdout,
            bytes: vec![0xC3],
        };
        let second = RawChunk::Data {
            source: StreamSource::Stdout,
            bytes: vec![0xA9, b'!'],
        };
        assert!(forward_chunk(first, &mut decoders, &tx, &mut guard).await);
        assert!(rx.try_recv().is_err());
        assert!(forward_chunk(second, &mut decoders, &tx, &mut guard).await);
        assert_eq!(rx.try_recv().unwrap(), OutputEvent::stdout("é!"));
    }

    #[tokio::test]
    async fn eof_flushes_the_carry_as_replacement() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut decoders = StreamDecoders::new();
        let mut guard = LifecycleGuard::new(std::time::Duration::from_millis(100));
        guard.advance(RunPhase::Running, None);

        let data = RawChunk::Data {
            source: StreamSource::Stderr,
            bytes: vec![0xE2, 0x82],
        };
        let eof = RawChunk::Eof {
            source: StreamSource::Stderr,
        };
        assert!(forward_chunk(data, &mut decoders, &tx, &mut guard).await);
        assert!(forward_chunk(eof, &mut decoders, &tx, &mut guard).await);
        assert_eq!(rx.try_recv().unwrap(), OutputEvent::stderr("\u{FFFD}"));
        assert_eq!(guard.phases().phase(), RunPhase::StreamsDraining);
    }
}
