//! External command-based bank decompiler
//!
//! Bank structure decompilation is done out of process. Each call spawns the
//! configured command, streams the payload over stdin, and reads JSON from
//! stdout. A hung decompiler is killed after the configured timeout and the
//! call fails with [`DecodeError::Timeout`]; the caller treats that as a
//! failure of the one group being decoded.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::debug;

use crate::{BankDecoder, DecodeError, EventTable, PayloadKind, Result, SampleMap};

/// Exit code a decompiler uses to reject a payload of the wrong container type
pub const EXIT_WRONG_SHAPE: i32 = 2;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Captured result of one helper invocation
#[derive(Debug)]
pub struct ExecOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// An external helper command with an optional wall-clock limit
///
/// The command string is split on whitespace, so wrappers such as
/// `wine decompiler.exe --quiet` work without a shell.
#[derive(Debug, Clone)]
pub struct ExecCommand {
    command: String,
    timeout: Option<Duration>,
}

impl ExecCommand {
    pub fn new<S: Into<String>>(command: S) -> Self {
        Self {
            command: command.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Run the helper with `args`, writing `input` to its stdin
    ///
    /// The timeout covers the whole call, including draining output. A
    /// helper that exits but leaves a background process holding its pipes
    /// still fails with [`DecodeError::Timeout`] once the limit is up.
    pub fn run(&self, args: &[&str], input: &[u8]) -> Result<ExecOutput> {
        let deadline = self.timeout.map(|limit| Instant::now() + limit);
        let parts: Vec<&str> = self.command.split_whitespace().collect();
        let (program, prefix_args) = parts
            .split_first()
            .ok_or_else(|| DecodeError::Exec("Empty exec command".into()))?;

        let mut child = Command::new(program)
            .args(prefix_args)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                DecodeError::Exec(format!("Failed to spawn command '{}': {}", self.command, e))
            })?;

        // Writer and readers run on their own threads so a helper that fills
        // its stdout pipe before draining stdin cannot deadlock us. The writer
        // is detached: a helper may exit without reading all of stdin, and a
        // lingering grandchild may hold stdin open without ever reading it.
        if let Some(mut stdin) = child.stdin.take() {
            let data = input.to_vec();
            thread::spawn(move || {
                let _ = stdin.write_all(&data);
            });
        }
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = self.wait(&mut child, deadline)?;

        let stdout = self.collect(&stdout, deadline)?;
        let stderr = String::from_utf8_lossy(&self.collect(&stderr, deadline)?)
            .trim()
            .to_string();

        Ok(ExecOutput {
            status,
            stdout,
            stderr,
        })
    }

    fn wait(&self, child: &mut Child, deadline: Option<Instant>) -> Result<ExitStatus> {
        let (Some(limit), Some(deadline)) = (self.timeout, deadline) else {
            return Ok(child.wait()?);
        };

        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(DecodeError::Timeout(limit));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Wait for a reader thread, bounded by what is left of the deadline
    fn collect(&self, output: &Receiver<ReadResult>, deadline: Option<Instant>) -> Result<Vec<u8>> {
        let result = match (self.timeout, deadline) {
            (Some(limit), Some(deadline)) => {
                let left = deadline.saturating_duration_since(Instant::now());
                match output.recv_timeout(left) {
                    Ok(result) => result,
                    Err(RecvTimeoutError::Timeout) => {
                        debug!(command = %self.command, "output still open after exit");
                        return Err(DecodeError::Timeout(limit));
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(DecodeError::Exec("Reader thread panicked".into()))
                    }
                }
            }
            _ => output
                .recv()
                .map_err(|_| DecodeError::Exec("Reader thread panicked".into()))?,
        };
        result.map_err(DecodeError::Io)
    }
}

type ReadResult = std::io::Result<Vec<u8>>;

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> Receiver<ReadResult> {
    let (tx, rx) = mpsc::channel();
    match source {
        Some(mut r) => {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let result = r.read_to_end(&mut buf).map(|_| buf);
                let _ = tx.send(result);
            });
        }
        None => {
            let _ = tx.send(Ok(Vec::new()));
        }
    }
    rx
}

#[derive(Deserialize)]
struct SampleRow {
    hash: u32,
    sample: u32,
}

/// Bank decoder backed by an external decompiler command
///
/// # Protocol
///
/// ```text
/// <command> events <path>
/// <command> samples <path> <table_file>
/// ```
///
/// - The payload is written to the command's stdin
/// - `events` prints `[{"name": "...", "hash": N}, ...]`
/// - `samples` reads the filtered event table (same JSON shape) from
///   `<table_file>` and prints `[{"hash": N, "sample": M}, ...]`
/// - Exit code 0 indicates success, exit code 2 rejects the payload as the
///   wrong container type
#[derive(Debug, Clone)]
pub struct ExecDecompiler {
    exec: ExecCommand,
}

impl ExecDecompiler {
    pub fn new<S: Into<String>>(command: S) -> Self {
        Self {
            exec: ExecCommand::new(command),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.exec = self.exec.with_timeout(timeout);
        self
    }

    fn invoke(&self, args: &[&str], payload: &[u8]) -> Result<Vec<u8>> {
        let output = self.exec.run(args, payload)?;

        if output.status.code() == Some(EXIT_WRONG_SHAPE) {
            return Err(DecodeError::WrongShape {
                expected: if args.first() == Some(&"events") {
                    PayloadKind::SoundBank.describe()
                } else {
                    PayloadKind::WwisePack.describe()
                },
                found: "payload rejected by decompiler",
            });
        }

        if !output.status.success() {
            return Err(DecodeError::Exec(format!(
                "Command '{}' failed with exit code {:?}: {}",
                self.exec.command(),
                output.status.code(),
                output.stderr
            )));
        }

        Ok(output.stdout)
    }
}

impl BankDecoder for ExecDecompiler {
    fn decode_events(&self, path: &str, bytes: &[u8]) -> Result<EventTable> {
        // A sample pack can never hold an event hierarchy
        let kind = PayloadKind::sniff(bytes);
        if kind == PayloadKind::WwisePack {
            return Err(DecodeError::WrongShape {
                expected: PayloadKind::SoundBank.describe(),
                found: kind.describe(),
            });
        }

        let stdout = self.invoke(&["events", path], bytes)?;
        let table: EventTable = serde_json::from_slice(&stdout)
            .map_err(|e| DecodeError::Malformed(format!("{}: bad events output: {}", path, e)))?;
        debug!(path, events = table.len(), "decoded event table");
        Ok(table)
    }

    fn decode_samples(&self, path: &str, table: &EventTable, bytes: &[u8]) -> Result<SampleMap> {
        let mut table_file = tempfile::NamedTempFile::new()?;
        serde_json::to_writer(&mut table_file, table)
            .map_err(|e| DecodeError::Exec(format!("Failed to write event table: {}", e)))?;
        table_file.flush()?;

        let table_path = table_file.path().to_string_lossy().to_string();
        let stdout = self.invoke(&["samples", path, &table_path], bytes)?;
        let rows: Vec<SampleRow> = serde_json::from_slice(&stdout)
            .map_err(|e| DecodeError::Malformed(format!("{}: bad samples output: {}", path, e)))?;

        Ok(rows.into_iter().map(|r| (r.hash, r.sample)).collect())
    }

    fn name(&self) -> &'static str {
        "exec"
    }
}
