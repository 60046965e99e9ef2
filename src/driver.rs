//! Process driver
//!
//! The engine talks to the program under test through [`ProcessDriver`].
//! [`ChildProcess`] is the real implementation: it spawns the program with
//! all three standard streams piped and moves each output stream onto its own
//! reader thread, so the engine can block on one stream with an optional
//! timeout while the other keeps draining.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace};

use crate::script::Stream;

const READ_BUF_SIZE: usize = 8192;

/// Errors raised while talking to the spawned process
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write to stdin: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to read {stream}: {source}")]
    Read {
        stream: Stream,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("no output after {0:?}")]
    Timeout(Duration),
}

/// Line/chunk level access to a running process.
pub trait ProcessDriver {
    /// Write text to the process's stdin. Does not wait for any response.
    fn write_input(&mut self, text: &str) -> Result<(), DriverError>;

    /// Block until the next chunk arrives on `stream`.
    ///
    /// Returns `Ok(None)` once the stream is closed. With a timeout, gives up
    /// with [`DriverError::Timeout`] when nothing arrives in time.
    fn next_chunk(&mut self, stream: Stream, timeout: Option<Duration>) -> Result<Option<Vec<u8>>, DriverError>;

    /// Close stdin and wait for the process to terminate.
    ///
    /// Returns the exit code, or `None` if the process was killed by a signal.
    fn wait(&mut self) -> Result<Option<i32>, DriverError>;
}

type Chunk = Result<Vec<u8>, std::io::Error>;

/// Receiving end of one output stream
struct StreamReader {
    rx: Receiver<Chunk>,
    closed: bool,
}

impl StreamReader {
    fn spawn<R: Read + Send + 'static>(stream: Stream, mut source: R) -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = [0u8; READ_BUF_SIZE];
            loop {
                match source.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        trace!(%stream, bytes = n, "chunk received");
                        if tx.send(Ok(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });
        Self { rx, closed: false }
    }

    fn next(&mut self, stream: Stream, timeout: Option<Duration>) -> Result<Option<Vec<u8>>, DriverError> {
        if self.closed {
            return Ok(None);
        }
        let received = match timeout {
            Some(limit) => match self.rx.recv_timeout(limit) {
                Ok(chunk) => Some(chunk),
                Err(RecvTimeoutError::Timeout) => return Err(DriverError::Timeout(limit)),
                Err(RecvTimeoutError::Disconnected) => None,
            },
            None => self.rx.recv().ok(),
        };
        match received {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(source)) => {
                self.closed = true;
                Err(DriverError::Read { stream, source })
            }
            None => {
                self.closed = true;
                Ok(None)
            }
        }
    }
}

/// A spawned program with piped standard streams.
pub struct ChildProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    /// Set once the child stopped reading its input
    input_closed: bool,
    stdout: StreamReader,
    stderr: StreamReader,
    exit_code: Option<Option<i32>>,
}

impl ChildProcess {
    /// Spawn `program args...` in `working_dir`.
    pub fn spawn(program: &str, args: &[String], working_dir: &Path) -> Result<Self, DriverError> {
        debug!(program, ?args, dir = %working_dir.display(), "spawning process");

        let mut child = Command::new(program)
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DriverError::Spawn { program: program.to_string(), source })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().map(|s| StreamReader::spawn(Stream::Stdout, s));
        let stderr = child.stderr.take().map(|s| StreamReader::spawn(Stream::Stderr, s));

        // Both handles exist because both streams were requested as piped.
        let (stdout, stderr) = match (stdout, stderr) {
            (Some(out), Some(err)) => (out, err),
            _ => {
                let _ = child.kill();
                return Err(DriverError::Spawn {
                    program: program.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "output streams not captured"),
                });
            }
        };

        Ok(Self { child, stdin, input_closed: false, stdout, stderr, exit_code: None })
    }
}

impl ProcessDriver for ChildProcess {
    fn write_input(&mut self, text: &str) -> Result<(), DriverError> {
        if self.input_closed {
            debug!(input = text.trim_end(), "input dropped, process no longer reads stdin");
            return Ok(());
        }
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            DriverError::Write(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin already closed"))
        })?;
        let written = stdin.write_all(text.as_bytes()).and_then(|()| stdin.flush());
        match written {
            Ok(()) => Ok(()),
            // The child exited or closed stdin; its output decides the verdict.
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!(input = text.trim_end(), "stdin closed by process, treating as end of input");
                self.stdin.take();
                self.input_closed = true;
                Ok(())
            }
            Err(e) => Err(DriverError::Write(e)),
        }
    }

    fn next_chunk(&mut self, stream: Stream, timeout: Option<Duration>) -> Result<Option<Vec<u8>>, DriverError> {
        match stream {
            Stream::Stdout => self.stdout.next(stream, timeout),
            Stream::Stderr => self.stderr.next(stream, timeout),
        }
    }

    fn wait(&mut self) -> Result<Option<i32>, DriverError> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        // Dropping stdin delivers EOF to programs that read until end of input.
        self.stdin.take();
        // Reader threads are not joined: a background process may keep the
        // output pipes open long after the child itself has exited.
        let status = self.child.wait().map_err(DriverError::Wait)?;
        let code = status.code();
        debug!(?code, "process exited");
        self.exit_code = Some(code);
        Ok(code)
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if self.exit_code.is_none() {
            if let Ok(None) = self.child.try_wait() {
                debug!(pid = self.child.id(), "killing process still running");
                let _ = self.child.kill();
            }
            let _ = self.child.wait();
        }
    }
}
