//! Run state
//!
//! Holds mutable per-run state: output received but not yet matched against
//! an expectation, the recorded exit code, and the execution log.

use crate::script::Stream;

/// Mutable state for a single script run
#[derive(Debug, Default)]
pub struct State {
    /// Stdout bytes received but not yet consumed by an expectation
    pub stdout: Vec<u8>,
    /// Stderr bytes received but not yet consumed by an expectation
    pub stderr: Vec<u8>,
    /// Exit code of the process, once it has terminated
    pub exit_code: Option<i32>,
    /// Execution log
    pub log: String,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending bytes for a stream
    pub fn pending(&self, stream: Stream) -> &[u8] {
        match stream {
            Stream::Stdout => &self.stdout,
            Stream::Stderr => &self.stderr,
        }
    }

    pub fn pending_mut(&mut self, stream: Stream) -> &mut Vec<u8> {
        match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        }
    }

    /// Remove and return the first `n` pending bytes of a stream.
    pub fn consume(&mut self, stream: Stream, n: usize) -> Vec<u8> {
        let pending = self.pending_mut(stream);
        let n = n.min(pending.len());
        pending.drain(..n).collect()
    }

    /// Remove and return everything pending on a stream.
    pub fn take(&mut self, stream: Stream) -> Vec<u8> {
        std::mem::take(self.pending_mut(stream))
    }

    /// Write a log entry
    pub fn logf(&mut self, msg: &str) {
        self.log.push_str(msg);
        if !msg.ends_with('\n') {
            self.log.push('\n');
        }
    }

    /// Log received stream content under a `[stream]` header.
    pub fn log_stream(&mut self, stream: Stream, content: &[u8]) {
        if content.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(content).into_owned();
        self.logf(&format!("[{}]\n{}", stream, text));
    }
}
