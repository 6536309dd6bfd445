/*
    Every child process the queue launches goes through `ProcessRunner`, whether a long render or a
    short version probe. The runner keeps a record of each process until the owner discards it, so a
    failed render can still be inspected afterwards.

    Children are started in their own process group on unix so that terminating one also reaches
    any helpers the render tool forked. Windows relies on `taskkill /T` for the same effect.
*/
use crate::models::event::Stream;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    ffi::OsStr,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    time::timeout,
};
use uuid::Uuid;

/// Upper bound of captured text kept per process.
pub const LOG_CEILING: usize = 200_000;
// Helpers that inherited the pipes may keep them open after the main process is gone.
const READER_GRACE: Duration = Duration::from_millis(500);
#[cfg(unix)]
const KILL_ESCALATION: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("No tracked process with id {0}")]
    NotFound(Uuid),
    #[error("Process {0} is not running")]
    NotRunning(Uuid),
    #[error("Failed to signal process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Running,
    Exited,
    Errored,
}

/// Captured output with the oldest text evicted past `LOG_CEILING`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputLog {
    text: String,
    #[serde(skip)]
    closed: bool,
}

impl OutputLog {
    fn push(&mut self, chunk: &str) {
        if self.closed {
            return;
        }
        self.text.push_str(chunk);
        if self.text.len() > LOG_CEILING {
            let mut cut = self.text.len() - LOG_CEILING;
            while !self.text.is_char_boundary(cut) {
                cut += 1;
            }
            self.text.drain(..cut);
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Record of a process the runner launched, kept after exit until discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedProcess {
    pub id: Uuid,
    pub pid: Option<u32>,
    pub name: String,
    pub command_line: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: ProcessStatus,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub error: Option<String>,
    pub log: OutputLog,
}

impl TrackedProcess {
    pub fn is_running(&self) -> bool {
        self.status == ProcessStatus::Running
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct ProcessMeta {
    /// Logical role, e.g. "render" or "probe".
    pub name: String,
}

impl ProcessMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Delivered in the order the OS produced them. `Exited` or `Failed` is always last.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    Output { stream: Stream, text: String },
    Exited { code: Option<i32>, signal: Option<i32> },
    Failed(String),
}

#[derive(Debug)]
pub struct ProcessHandle {
    pub id: Uuid,
    pub pid: Option<u32>,
    pub events: UnboundedReceiver<ProcessEvent>,
}

type Registry = Arc<Mutex<HashMap<Uuid, TrackedProcess>>>;

#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    processes: Registry,
}

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<Uuid, TrackedProcess>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

fn append(registry: &Registry, id: &Uuid, text: &str) {
    if let Some(process) = lock(registry).get_mut(id) {
        process.log.push(text);
    }
}

// Take the decodable prefix, keeping an incomplete trailing sequence for the next read.
fn decode(pending: &mut Vec<u8>) -> String {
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_owned();
            pending.clear();
            text
        }
        Err(e) if e.error_len().is_none() => {
            let rest = pending.split_off(e.valid_up_to());
            let text = String::from_utf8_lossy(pending).into_owned();
            *pending = rest;
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    }
}

async fn pump<R>(
    mut reader: R,
    stream: Stream,
    id: Uuid,
    registry: Registry,
    tx: UnboundedSender<ProcessEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 8192];
    let mut pending: Vec<u8> = Vec::new();
    loop {
        let read = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(read) => read,
        };
        pending.extend_from_slice(&buf[..read]);
        let text = decode(&mut pending);
        if text.is_empty() {
            continue;
        }
        append(&registry, &id, &text);
        let _ = tx.send(ProcessEvent::Output { stream, text });
    }

    if !pending.is_empty() {
        let text = String::from_utf8_lossy(&pending).into_owned();
        append(&registry, &id, &text);
        let _ = tx.send(ProcessEvent::Output { stream, text });
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch `program` and start streaming its output. Never fails: a spawn error is recorded as
    /// an `Errored` process and reported through the handle as `ProcessEvent::Failed`.
    pub fn spawn_tracked<S: AsRef<OsStr>>(
        &self,
        program: impl AsRef<Path>,
        args: &[S],
        options: SpawnOptions,
        meta: ProcessMeta,
    ) -> ProcessHandle {
        let program = program.as_ref();
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut command_line = vec![program.to_string_lossy().into_owned()];
        command_line.extend(args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()));

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &options.working_dir {
            command.current_dir(dir);
        }
        for (key, value) in &options.env {
            command.env(key, value);
        }
        #[cfg(unix)]
        command.process_group(0);

        let mut record = TrackedProcess {
            id,
            pid: None,
            name: meta.name,
            command_line,
            working_dir: options.working_dir,
            started_at: Utc::now(),
            ended_at: None,
            status: ProcessStatus::Running,
            exit_code: None,
            signal: None,
            error: None,
            log: OutputLog::default(),
        };

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("Failed to start {}: {e}", program.display());
                tracing::warn!(%id, "{message}");
                record.status = ProcessStatus::Errored;
                record.ended_at = Some(Utc::now());
                record.error = Some(message.clone());
                record.log.close();
                lock(&self.processes).insert(id, record);
                let _ = tx.send(ProcessEvent::Failed(message));
                return ProcessHandle {
                    id,
                    pid: None,
                    events: rx,
                };
            }
        };

        let pid = child.id();
        record.pid = pid;
        tracing::info!(%id, ?pid, name = %record.name, "spawned {}", record.command_line.join(" "));
        lock(&self.processes).insert(id, record);

        let stdout = child.stdout.take().map(|out| {
            tokio::spawn(pump(
                out,
                Stream::Stdout,
                id,
                self.processes.clone(),
                tx.clone(),
            ))
        });
        let stderr = child.stderr.take().map(|err| {
            tokio::spawn(pump(
                err,
                Stream::Stderr,
                id,
                self.processes.clone(),
                tx.clone(),
            ))
        });

        let registry = self.processes.clone();
        tokio::spawn(async move {
            let status = child.wait().await;

            for reader in [stdout, stderr].into_iter().flatten() {
                let abort = reader.abort_handle();
                if timeout(READER_GRACE, reader).await.is_err() {
                    abort.abort();
                }
            }

            let event = {
                let mut processes = lock(&registry);
                let process = processes.get_mut(&id);
                match status {
                    Ok(status) => {
                        let code = status.code();
                        let signal = exit_signal(&status);
                        tracing::info!(%id, ?code, ?signal, "process exited");
                        if let Some(process) = process {
                            process.status = ProcessStatus::Exited;
                            process.exit_code = code;
                            process.signal = signal;
                            process.ended_at = Some(Utc::now());
                            process.log.close();
                        }
                        ProcessEvent::Exited { code, signal }
                    }
                    Err(e) => {
                        let message = format!("Failed to wait for process: {e}");
                        tracing::warn!(%id, "{message}");
                        if let Some(process) = process {
                            process.status = ProcessStatus::Errored;
                            process.error = Some(message.clone());
                            process.ended_at = Some(Utc::now());
                            process.log.close();
                        }
                        ProcessEvent::Failed(message)
                    }
                }
            };
            let _ = tx.send(event);
        });

        ProcessHandle {
            id,
            pid,
            events: rx,
        }
    }

    /// Ask a running process to stop. `forceful` escalates to killing the whole process tree.
    pub async fn terminate(&self, id: Uuid, forceful: bool) -> Result<(), ProcessError> {
        let pid = {
            let processes = lock(&self.processes);
            let process = processes.get(&id).ok_or(ProcessError::NotFound(id))?;
            match (process.status, process.pid) {
                (ProcessStatus::Running, Some(pid)) => pid,
                _ => return Err(ProcessError::NotRunning(id)),
            }
        };
        tracing::debug!(%id, pid, forceful, "terminating process tree");
        kill_tree(pid, forceful).await
    }

    pub fn get(&self, id: &Uuid) -> Option<TrackedProcess> {
        lock(&self.processes).get(id).cloned()
    }

    pub fn list(&self) -> Vec<TrackedProcess> {
        let mut list: Vec<TrackedProcess> = lock(&self.processes).values().cloned().collect();
        list.sort_by_key(|p| p.started_at);
        list
    }

    /// Drop a finished record. Running processes are kept.
    pub fn discard(&self, id: &Uuid) -> Option<TrackedProcess> {
        let mut processes = lock(&self.processes);
        match processes.get(id) {
            Some(process) if !process.is_running() => processes.remove(id),
            _ => None,
        }
    }

    pub fn running_count(&self) -> usize {
        lock(&self.processes)
            .values()
            .filter(|p| p.is_running())
            .count()
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) -> std::io::Result<()> {
    // SAFETY: plain kill(2); a negative pid addresses the process group created at spawn.
    let result = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn signal_process(pid: u32, signal: libc::c_int) -> std::io::Result<()> {
    // SAFETY: plain kill(2) on a single pid.
    let result = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(unix)]
async fn kill_tree(pid: u32, forceful: bool) -> Result<(), ProcessError> {
    // the pid is still ours here, the record was Running a moment ago
    signal_group(pid, libc::SIGTERM)
        .or_else(|_| signal_process(pid, libc::SIGTERM))
        .map_err(|source| ProcessError::Signal { pid, source })?;
    if forceful {
        tokio::time::sleep(KILL_ESCALATION).await;
        // Group only. After the delay the pid may have been reaped and reused.
        let _ = signal_group(pid, libc::SIGKILL);
    }
    Ok(())
}

#[cfg(windows)]
async fn kill_tree(pid: u32, forceful: bool) -> Result<(), ProcessError> {
    let pid_arg = pid.to_string();
    let mut command = Command::new("taskkill");
    command.args(["/PID", pid_arg.as_str(), "/T"]);
    if forceful {
        command.arg("/F");
    }
    let output = command
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|source| ProcessError::Signal { pid, source })?;
    if output.success() {
        Ok(())
    } else {
        Err(ProcessError::Signal {
            pid,
            source: std::io::Error::other(format!("taskkill exited with {output}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn group_signal_never_reaches_a_lone_pid() {
        // spawned without its own group, so its pid names no process group
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        assert!(signal_group(pid, 0).is_err());
        assert!(signal_process(pid, 0).is_ok());
        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn log_evicts_oldest_text() {
        let mut log = OutputLog::default();
        log.push(&"a".repeat(LOG_CEILING));
        log.push("tail");
        assert_eq!(log.len(), LOG_CEILING);
        assert!(log.as_str().ends_with("tail"));

        log.close();
        log.push("ignored");
        assert!(log.as_str().ends_with("tail"));
    }

    #[test]
    fn log_eviction_respects_char_boundaries() {
        let mut log = OutputLog::default();
        log.push(&"é".repeat(LOG_CEILING / 2 + 1));
        assert!(log.len() <= LOG_CEILING);
        assert!(log.as_str().chars().all(|c| c == 'é'));
    }

    #[test]
    fn decode_keeps_split_sequences() {
        let bytes = "héllo".as_bytes();
        let mut pending = bytes[..2].to_vec();
        assert_eq!(decode(&mut pending), "h");
        pending.extend_from_slice(&bytes[2..]);
        assert_eq!(decode(&mut pending), "éllo");
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn spawn_failure_is_an_event() {
        let runner = ProcessRunner::new();
        let mut handle = runner.spawn_tracked(
            "/definitely/not/a/real/binary",
            &["-b"],
            SpawnOptions::default(),
            ProcessMeta::new("render"),
        );
        assert!(matches!(
            handle.events.recv().await,
            Some(ProcessEvent::Failed(_))
        ));
        let record = runner.get(&handle.id).unwrap();
        assert_eq!(record.status, ProcessStatus::Errored);
        assert_eq!(runner.running_count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn output_then_exit() {
        let runner = ProcessRunner::new();
        let mut handle = runner.spawn_tracked(
            "/bin/sh",
            &["-c", "echo hello; echo oops 1>&2; exit 3"],
            SpawnOptions::default(),
            ProcessMeta::new("probe"),
        );

        let mut stdout = String::new();
        let mut exit = None;
        while let Some(event) = handle.events.recv().await {
            match event {
                ProcessEvent::Output {
                    stream: Stream::Stdout,
                    text,
                } => stdout.push_str(&text),
                ProcessEvent::Output { .. } => {}
                other => exit = Some(other),
            }
        }
        assert_eq!(stdout, "hello\n");
        assert_eq!(
            exit,
            Some(ProcessEvent::Exited {
                code: Some(3),
                signal: None
            })
        );

        let record = runner.get(&handle.id).unwrap();
        assert_eq!(record.status, ProcessStatus::Exited);
        assert_eq!(record.exit_code, Some(3));
        assert!(record.log.as_str().contains("oops"));
        assert!(runner.discard(&handle.id).is_some());
        assert!(runner.get(&handle.id).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn forceful_terminate_reports_signal() {
        let runner = ProcessRunner::new();
        let mut handle = runner.spawn_tracked(
            "/bin/sh",
            &["-c", "trap '' TERM; sleep 30"],
            SpawnOptions::default(),
            ProcessMeta::new("render"),
        );
        runner.terminate(handle.id, true).await.unwrap();

        let mut last = None;
        while let Some(event) = handle.events.recv().await {
            last = Some(event);
        }
        assert!(matches!(
            last,
            Some(ProcessEvent::Exited {
                code: None,
                signal: Some(_)
            })
        ));
        assert_eq!(runner.running_count(), 0);
        assert!(matches!(
            runner.terminate(handle.id, true).await,
            Err(ProcessError::NotRunning(_))
        ));
    }
}
