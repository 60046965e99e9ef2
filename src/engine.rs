//! Interaction engine
//!
//! The Engine walks a [`TestCase`] step by step against a running process:
//! input is written first, then the step's expectation (if any) is read back
//! and compared byte for byte. The first mismatch ends the run.
//!
//! Output arrives in chunks whose boundaries have nothing to do with the
//! script's lines, so received bytes are buffered per stream in [`State`].
//! An expectation is judged as soon as the buffer either contains the whole
//! expected text or stops being a prefix of it. Surplus bytes stay buffered
//! for the next expectation on the same stream.

use std::fmt;
use std::time::Duration;

use similar::TextDiff;
use tracing::{debug, warn};

use crate::driver::{DriverError, ProcessDriver};
use crate::script::{Interaction, Stream, TestCase};
use crate::state::State;

/// Longest wait for trailing output once the process has exited. A background
/// job may still hold the pipes open, so the drain never blocks on them.
const DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Outcome of running one test case
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Every expectation matched
    Passed {
        /// Exit code of the process, if the script ran to its exit step
        exit_code: Option<i32>,
    },
    /// Received output differs from the expected text
    Failed {
        /// 1-based step number
        step: usize,
        stream: Stream,
        expected: String,
        actual: String,
    },
    /// A bare `<e` step saw its stream close without any output
    NoOutput { step: usize, stream: Stream },
    /// A read did not complete within the configured timeout
    Timeout {
        step: usize,
        stream: Stream,
        expected: String,
        received: String,
    },
    /// The process could not be written to, read from, or waited on
    ProcessError { step: usize, cause: String },
}

impl Verdict {
    pub fn is_passed(&self) -> bool {
        matches!(self, Verdict::Passed { .. })
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Passed { exit_code: Some(code) } => write!(f, "passed (exit code {})", code),
            Verdict::Passed { exit_code: None } => write!(f, "passed"),
            Verdict::Failed { step, stream, expected, actual } => write!(
                f,
                "step {}: {} mismatch\nexpected: {:?}\nactual:   {:?}",
                step, stream, expected, actual
            ),
            Verdict::NoOutput { step, stream } => {
                write!(f, "step {}: expected output on {}, stream closed", step, stream)
            }
            Verdict::Timeout { step, stream, expected, received } => write!(
                f,
                "step {}: timed out waiting for {}\nexpected: {:?}\nreceived: {:?}",
                step, stream, expected, received
            ),
            Verdict::ProcessError { step, cause } => write!(f, "step {}: process error: {}", step, cause),
        }
    }
}

/// The interaction engine
#[derive(Debug, Clone, Default)]
pub struct Engine {
    /// Upper bound for a single read; `None` waits forever
    pub timeout: Option<Duration>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run a test case with fresh state, discarding the log.
    pub fn run(&self, case: &TestCase, driver: &mut dyn ProcessDriver) -> Verdict {
        let mut state = State::new();
        self.execute(&mut state, case, driver)
    }

    /// Run a test case, recording pending output, exit code and log in `state`.
    pub fn execute(&self, state: &mut State, case: &TestCase, driver: &mut dyn ProcessDriver) -> Verdict {
        for (i, interaction) in case.interactions.iter().enumerate() {
            let step = i + 1;
            if let Err(verdict) = self.step(state, driver, step, interaction) {
                warn!(case = %case.name, step, "run stopped");
                return verdict;
            }
        }

        let exits = case.interactions.last().map_or(false, |last| last.exit);
        if exits {
            match driver.wait() {
                Ok(code) => {
                    state.exit_code = code;
                    state.logf(&format!("[exit {}]", code.map_or_else(|| "signal".to_string(), |c| c.to_string())));
                }
                Err(e) => {
                    return Verdict::ProcessError { step: case.interactions.len(), cause: e.to_string() };
                }
            }
            self.drain(state, driver);
        }

        for stream in [Stream::Stdout, Stream::Stderr] {
            let rest = state.pending(stream);
            if !rest.is_empty() {
                debug!(%stream, unmatched = %String::from_utf8_lossy(rest), "output left unmatched");
            }
        }

        Verdict::Passed { exit_code: state.exit_code }
    }

    fn step(
        &self,
        state: &mut State,
        driver: &mut dyn ProcessDriver,
        step: usize,
        interaction: &Interaction,
    ) -> Result<(), Verdict> {
        if let Some(ref comment) = interaction.comment {
            state.logf(&format!("# {}", comment));
        }

        if let Some(ref input) = interaction.input {
            debug!(step, input = input.trim_end(), "writing input");
            state.logf(&format!("> {}", input.trim_end_matches('\n')));
            driver
                .write_input(input)
                .map_err(|e| Verdict::ProcessError { step, cause: e.to_string() })?;
        }

        let Some(expectation) = interaction.expectation() else {
            return Ok(());
        };

        match expectation.text {
            Some(expected) => self.expect_text(state, driver, step, expectation.stream, expected),
            None => self.expect_any(state, driver, step, expectation.stream),
        }
    }

    /// Wait until `expected` can be judged against the buffered output.
    fn expect_text(
        &self,
        state: &mut State,
        driver: &mut dyn ProcessDriver,
        step: usize,
        stream: Stream,
        expected: &str,
    ) -> Result<(), Verdict> {
        debug!(step, %stream, expected, "awaiting output");
        let want = expected.as_bytes();

        loop {
            let pending = state.pending(stream);
            if pending.starts_with(want) {
                let matched = state.consume(stream, want.len());
                state.log_stream(stream, &matched);
                return Ok(());
            }
            if !want.starts_with(pending) {
                let actual = state.take(stream);
                return Err(self.mismatch(state, step, stream, expected, &actual));
            }

            match driver.next_chunk(stream, self.timeout) {
                Ok(Some(chunk)) => state.pending_mut(stream).extend_from_slice(&chunk),
                Ok(None) => {
                    let actual = state.take(stream);
                    return Err(self.mismatch(state, step, stream, expected, &actual));
                }
                Err(DriverError::Timeout(limit)) => {
                    let received = String::from_utf8_lossy(state.pending(stream)).into_owned();
                    state.logf(&format!("[timeout after {:?} on {}]", limit, stream));
                    return Err(Verdict::Timeout { step, stream, expected: expected.to_string(), received });
                }
                Err(e) => return Err(Verdict::ProcessError { step, cause: e.to_string() }),
            }
        }
    }

    /// Accept whatever arrives next on `stream`.
    fn expect_any(
        &self,
        state: &mut State,
        driver: &mut dyn ProcessDriver,
        step: usize,
        stream: Stream,
    ) -> Result<(), Verdict> {
        debug!(step, %stream, "awaiting any output");
        if state.pending(stream).is_empty() {
            match driver.next_chunk(stream, self.timeout) {
                Ok(Some(chunk)) => state.pending_mut(stream).extend_from_slice(&chunk),
                Ok(None) => return Err(Verdict::NoOutput { step, stream }),
                Err(DriverError::Timeout(_)) => {
                    return Err(Verdict::Timeout {
                        step,
                        stream,
                        expected: String::new(),
                        received: String::new(),
                    })
                }
                Err(e) => return Err(Verdict::ProcessError { step, cause: e.to_string() }),
            }
        }
        let received = state.take(stream);
        state.log_stream(stream, &received);
        Ok(())
    }

    fn mismatch(&self, state: &mut State, step: usize, stream: Stream, expected: &str, actual: &[u8]) -> Verdict {
        let actual = String::from_utf8_lossy(actual).into_owned();
        let diff = TextDiff::from_lines(expected, actual.as_str());
        let udiff = diff.unified_diff().header("expected", "actual").to_string();
        state.logf(&format!("[{} mismatch at step {}]", stream, step));
        state.logf(&udiff);
        Verdict::Failed { step, stream, expected: expected.to_string(), actual }
    }

    /// Collect output written after the last expectation, for the log.
    fn drain(&self, state: &mut State, driver: &mut dyn ProcessDriver) {
        let grace = self.timeout.map_or(DRAIN_GRACE, |limit| limit.min(DRAIN_GRACE));
        for stream in [Stream::Stdout, Stream::Stderr] {
            loop {
                match driver.next_chunk(stream, Some(grace)) {
                    Ok(Some(chunk)) => state.pending_mut(stream).extend_from_slice(&chunk),
                    Ok(None) => break,
                    Err(e) => {
                        debug!(%stream, error = %e, "stopped draining output");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use std::collections::VecDeque;

    /// A driver that replays canned chunks and records what was written.
    #[derive(Default)]
    struct ScriptedDriver {
        pub stdout: VecDeque<Vec<u8>>,
        pub stderr: VecDeque<Vec<u8>>,
        pub written: Vec<String>,
        pub exit_code: Option<i32>,
        pub waited: bool,
        /// When true, an exhausted stream times out instead of closing
        pub hang: bool,
        /// Streams keep timing out after the process exited
        pub held_open: bool,
        /// Timeout passed to every read
        pub reads: Vec<Option<Duration>>,
    }

    impl ScriptedDriver {
        pub fn stdout(mut self, chunk: &str) -> Self {
            self.stdout.push_back(chunk.as_bytes().to_vec());
            self
        }

        pub fn stderr(mut self, chunk: &str) -> Self {
            self.stderr.push_back(chunk.as_bytes().to_vec());
            self
        }
    }

    impl ProcessDriver for ScriptedDriver {
        fn write_input(&mut self, text: &str) -> Result<(), DriverError> {
            self.written.push(text.to_string());
            Ok(())
        }

        fn next_chunk(&mut self, stream: Stream, timeout: Option<Duration>) -> Result<Option<Vec<u8>>, DriverError> {
            let queue = match stream {
                Stream::Stdout => &mut self.stdout,
                Stream::Stderr => &mut self.stderr,
            };
            self.reads.push(timeout);
            match queue.pop_front() {
                Some(chunk) => Ok(Some(chunk)),
                None if (self.hang && !self.waited) || self.held_open => {
                    Err(DriverError::Timeout(timeout.unwrap_or(Duration::from_secs(1))))
                }
                None => Ok(None),
            }
        }

        fn wait(&mut self) -> Result<Option<i32>, DriverError> {
            self.waited = true;
            Ok(self.exit_code)
        }
    }

    fn case(script: &str) -> TestCase {
        parse(script, "case.lunit").unwrap()
    }

    #[test]
    fn test_echo_round_trip_passes() {
        let mut driver = ScriptedDriver { exit_code: Some(0), ..Default::default() }
            .stdout("ping\n")
            .stdout("pong\n");
        let verdict = Engine::new().run(&case("> ping\nping\n> pong\npong\n"), &mut driver);
        assert_eq!(verdict, Verdict::Passed { exit_code: Some(0) });
        assert_eq!(driver.written, vec!["ping\n", "pong\n"]);
        assert!(driver.waited);
    }

    #[test]
    fn test_mismatch_stops_run() {
        let mut driver = ScriptedDriver::default().stdout("FAIL\n").stdout("later\n");
        let verdict = Engine::new().run(&case("> go\nOK\n> next\nlater\n"), &mut driver);
        assert_eq!(
            verdict,
            Verdict::Failed {
                step: 1,
                stream: Stream::Stdout,
                expected: "OK\n".into(),
                actual: "FAIL\n".into(),
            }
        );
        // The second step's input was never written.
        assert_eq!(driver.written, vec!["go\n"]);
        assert!(!driver.waited);
    }

    #[test]
    fn test_output_split_across_chunks() {
        let mut driver = ScriptedDriver::default().stdout("fo").stdout("o\nba").stdout("r\n");
        let verdict = Engine::new().run(&case("> x\nfoo\nbar\n"), &mut driver);
        assert!(verdict.is_passed(), "{}", verdict);
    }

    #[test]
    fn test_surplus_output_carries_to_next_step() {
        let mut driver = ScriptedDriver::default().stdout("one\ntwo\n");
        let verdict = Engine::new().run(&case("> a\none\n> b\ntwo\n"), &mut driver);
        assert!(verdict.is_passed(), "{}", verdict);
    }

    #[test]
    fn test_stream_closed_before_expected_output() {
        let mut driver = ScriptedDriver::default().stdout("par");
        let verdict = Engine::new().run(&case("> x\npartial\n"), &mut driver);
        assert_eq!(
            verdict,
            Verdict::Failed {
                step: 1,
                stream: Stream::Stdout,
                expected: "partial\n".into(),
                actual: "par".into(),
            }
        );
    }

    #[test]
    fn test_stderr_expectation() {
        let mut driver = ScriptedDriver::default().stderr("bad input\n");
        let verdict = Engine::new().run(&case("> ???\n<e\nbad input\n"), &mut driver);
        assert!(verdict.is_passed(), "{}", verdict);
    }

    #[test]
    fn test_stderr_mismatch_reports_stream() {
        let mut driver = ScriptedDriver::default().stdout("bad input\n").stderr("other\n");
        let verdict = Engine::new().run(&case("> ???\n<e\nbad input\n"), &mut driver);
        assert!(matches!(verdict, Verdict::Failed { stream: Stream::Stderr, .. }));
    }

    #[test]
    fn test_bare_error_accepts_any_stderr() {
        let mut driver = ScriptedDriver::default().stderr("Exception in thread main\n");
        let verdict = Engine::new().run(&case("> boom\n<e\n"), &mut driver);
        assert!(verdict.is_passed(), "{}", verdict);

        let mut silent = ScriptedDriver::default();
        let verdict = Engine::new().run(&case("> boom\n<e\n"), &mut silent);
        assert_eq!(verdict, Verdict::NoOutput { step: 1, stream: Stream::Stderr });
    }

    #[test]
    fn test_input_only_steps_do_not_read() {
        let mut driver = ScriptedDriver { hang: true, ..Default::default() };
        let verdict = Engine::new().run(&case("> a\n> b\n"), &mut driver);
        assert_eq!(verdict, Verdict::Passed { exit_code: None });
        assert_eq!(driver.written, vec!["a\n", "b\n"]);
    }

    #[test]
    fn test_drain_after_exit_is_bounded() {
        // A background job holding the output pipes open must not stall the run.
        let mut driver = ScriptedDriver { exit_code: Some(0), held_open: true, ..Default::default() }
            .stdout("started\n")
            .stdout("late\n");
        let verdict = Engine::new().run(&case("> go\nstarted\n"), &mut driver);
        assert_eq!(verdict, Verdict::Passed { exit_code: Some(0) });
        assert!(driver.waited);
        let drained = &driver.reads[1..];
        assert_eq!(drained.len(), 3);
        assert!(drained.iter().all(|t| *t == Some(DRAIN_GRACE)));

        let mut driver = ScriptedDriver { held_open: true, ..Default::default() };
        let engine = Engine::new().with_timeout(Some(Duration::from_millis(20)));
        assert!(engine.run(&case("> go\n"), &mut driver).is_passed());
        assert!(driver.reads.iter().all(|t| *t == Some(Duration::from_millis(20))));
    }

    #[test]
    fn test_timeout_verdict() {
        let mut driver = ScriptedDriver { hang: true, ..Default::default() }.stdout("hal");
        let engine = Engine::new().with_timeout(Some(Duration::from_millis(10)));
        let verdict = engine.run(&case("> x\nhalted\n"), &mut driver);
        assert_eq!(
            verdict,
            Verdict::Timeout {
                step: 1,
                stream: Stream::Stdout,
                expected: "halted\n".into(),
                received: "hal".into(),
            }
        );
    }

    #[test]
    fn test_log_records_transcript_and_diff() {
        let mut driver = ScriptedDriver::default().stdout("hi\n").stdout("nope\n");
        let mut state = State::new();
        let verdict = Engine::new().execute(&mut state, &case("# greet\n> hi\nhi\n> again\nyes\n"), &mut driver);
        assert!(!verdict.is_passed());
        assert!(state.log.contains("# greet\n> hi\n[stdout]\nhi\n"));
        assert!(state.log.contains("-yes"));
        assert!(state.log.contains("+nope"));
    }

    #[test]
    fn test_verdict_display() {
        let failed = Verdict::Failed {
            step: 2,
            stream: Stream::Stdout,
            expected: "OK\n".into(),
            actual: "FAIL\n".into(),
        };
        assert_eq!(failed.to_string(), "step 2: stdout mismatch\nexpected: \"OK\\n\"\nactual:   \"FAIL\\n\"");
        assert_eq!(Verdict::Passed { exit_code: Some(0) }.to_string(), "passed (exit code 0)");
    }
}
