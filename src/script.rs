//! Script model
//!
//! A parsed script is a [`TestCase`]: the invocation arguments plus an ordered
//! list of [`Interaction`]s. Each interaction may send a line of input, expect
//! output on one of the process streams, or both.

use std::fmt;

/// One of the two process output streams an expectation can be read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub fn name(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a step expects to read back from the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation<'a> {
    /// Stream the expectation is read from
    pub stream: Stream,
    /// Exact expected text. `None` means "any output on this stream".
    pub text: Option<&'a str>,
}

/// A single scripted step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interaction {
    /// Annotation from a `#` line, used as the step label
    pub comment: Option<String>,
    /// Line sent to stdin, newline-terminated
    pub input: Option<String>,
    /// Expected output, one or more newline-terminated lines
    pub output: Option<String>,
    /// Read the expectation from stderr instead of stdout
    pub error: bool,
    /// The process is expected to terminate after this step
    pub exit: bool,
}

impl Interaction {
    pub fn comment(text: impl Into<String>) -> Self {
        Self { comment: Some(text.into()), ..Default::default() }
    }

    pub fn input(text: impl Into<String>) -> Self {
        Self { input: Some(text.into()), ..Default::default() }
    }

    pub fn output(text: impl Into<String>) -> Self {
        Self { output: Some(text.into()), ..Default::default() }
    }

    /// True when the only attribute set is `comment`.
    pub fn is_comment_only(&self) -> bool {
        self.comment.is_some()
            && self.input.is_none()
            && self.output.is_none()
            && !self.error
            && !self.exit
    }

    pub fn expectation(&self) -> Option<Expectation<'_>> {
        if self.error {
            Some(Expectation { stream: Stream::Stderr, text: self.output.as_deref() })
        } else {
            self.output.as_deref().map(|text| Expectation { stream: Stream::Stdout, text: Some(text) })
        }
    }
}

/// A parsed script, ready to be run once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestCase {
    /// Script file name, for reporting
    pub name: String,
    /// Invocation arguments, in declaration order
    pub args: Vec<String>,
    /// Steps, in execution order
    pub interactions: Vec<Interaction>,
}

impl TestCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }
}
