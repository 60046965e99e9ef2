//! Run errors
//!
//! Everything that stops a run before a verdict can be reached. Expectation
//! mismatches and timeouts are not errors; they are [`crate::Verdict`]s.

use std::fmt;
use std::path::Path;

use crate::driver::DriverError;
use crate::locator::LocateError;
use crate::parser::ParseError;

/// The kind of run error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The build-output root does not exist
    TargetNotFound,
    /// No artifact matches the entry name
    EntryNotFound,
    /// The test script does not exist
    ScriptNotFound,
    /// The script uses a reserved directive
    UnsupportedDirective,
    /// The process could not be started
    Process,
    /// Unexpected I/O failure while searching for the artifact
    Io,
    /// Unexpected I/O failure while reading the script
    ScriptIo,
}

impl ErrorKind {
    /// Process exit status reported by the CLI for this kind of error.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::TargetNotFound => 1,
            ErrorKind::EntryNotFound => 2,
            ErrorKind::ScriptNotFound => 3,
            ErrorKind::UnsupportedDirective => 5,
            ErrorKind::Process | ErrorKind::Io => -1,
            ErrorKind::ScriptIo => -2,
        }
    }
}

/// A run error with optional file/line context
#[derive(Debug)]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<usize>,
}

impl ScriptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file: None,
            line: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_location(mut self, file: impl Into<String>, line: usize) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    /// Error for a script path that could not be read.
    pub fn script_read(path: &Path, err: std::io::Error) -> Self {
        let file = path.display().to_string();
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::new(ErrorKind::ScriptNotFound, "no test file found").with_file(file)
        } else {
            Self::new(ErrorKind::ScriptIo, err.to_string()).with_file(file)
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref file) = self.file {
            write!(f, "{}:", file)?;
        }
        if let Some(line) = self.line {
            write!(f, "{}:", line)?;
        }
        if self.file.is_some() || self.line.is_some() {
            write!(f, " ")?;
        }
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ScriptError {}

impl From<LocateError> for ScriptError {
    fn from(e: LocateError) -> Self {
        let kind = match e {
            LocateError::RootMissing(_) => ErrorKind::TargetNotFound,
            LocateError::NotFound { .. } => ErrorKind::EntryNotFound,
            LocateError::Io { .. } => ErrorKind::Io,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<ParseError> for ScriptError {
    fn from(e: ParseError) -> Self {
        let line = e.line();
        let message = match e {
            ParseError::UnsupportedDirective { directive, .. } => {
                format!("unsupported directive '{}'", directive)
            }
        };
        let mut err = Self::new(ErrorKind::UnsupportedDirective, message);
        err.line = Some(line);
        err
    }
}

impl From<DriverError> for ScriptError {
    fn from(e: DriverError) -> Self {
        Self::new(ErrorKind::Process, e.to_string())
    }
}
