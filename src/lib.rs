//! lunit: an interactive test-script interpreter
//!
//! A test script describes a conversation with a program: lines to type into
//! its stdin and the text it must answer with on stdout or stderr. lunit
//! spawns the program, plays the script step by step and stops at the first
//! answer that differs.
//!
//! # Script Syntax
//!
//! ```text
//! $$ --lang=en
//! # greets the user by name
//! > Ada
//! Hello, Ada!
//! > 
//! <e
//! error: empty name
//! ```
//!
//! | Line | Meaning |
//! |------|---------|
//! | `$$ arg` | Argument passed to the program |
//! | `# text` | Comment; labels the step whose input follows |
//! | `> text` | Send `text` and a newline to stdin |
//! | `<e` | The current step's expected output comes on stderr |
//! | anything else | Expected output line; consecutive lines form one block |
//!
//! `<r` and `<l` are reserved and rejected by the parser.

mod driver;
mod engine;
mod error;
mod locator;
pub mod logging;
mod parser;
mod runner;
mod script;
mod state;

pub use driver::{ChildProcess, DriverError, ProcessDriver};
pub use engine::{Engine, Verdict};
pub use error::{ErrorKind, ScriptError};
pub use locator::{artifact_file_name, executable_ref, locate, LocateError};
pub use parser::{parse, ParseError};
pub use runner::{RunConfig, TestCaseResult, TestRunner, TestRunnerBuilder};
pub use runner::{DEFAULT_EXTENSION, DEFAULT_LAUNCHER, DEFAULT_TARGET_DIR};
pub use script::{Expectation, Interaction, Stream, TestCase};
pub use state::State;
