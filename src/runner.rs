//! Test runner
//!
//! Orchestrates one test run: locates the entry artifact under the
//! build-output root, reads and parses the script, spawns the program and
//! drives it with the engine.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::driver::ChildProcess;
use crate::engine::{Engine, Verdict};
use crate::error::ScriptError;
use crate::locator;
use crate::parser;
use crate::state::State;

/// Default build-output root, relative to the base directory
pub const DEFAULT_TARGET_DIR: &str = "target/classes";
/// Default artifact extension
pub const DEFAULT_EXTENSION: &str = "class";
/// Default launcher program
pub const DEFAULT_LAUNCHER: &str = "java";

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory the script path and target dir are resolved against
    pub base_dir: PathBuf,
    /// Build-output root searched for the entry artifact
    pub target_dir: PathBuf,
    /// Artifact extension (without the dot)
    pub extension: String,
    /// Program used to run the artifact; `None` runs the artifact directly
    pub launcher: Option<String>,
    /// Extra launcher arguments placed before the artifact reference
    pub launcher_args: Vec<String>,
    /// Per-read timeout; `None` waits forever
    pub timeout: Option<Duration>,
    /// Keep and print the log for passing runs too
    pub verbose: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            target_dir: PathBuf::from(DEFAULT_TARGET_DIR),
            extension: DEFAULT_EXTENSION.into(),
            launcher: Some(DEFAULT_LAUNCHER.into()),
            launcher_args: Vec::new(),
            timeout: None,
            verbose: false,
        }
    }
}

impl RunConfig {
    /// Apply `LUNIT_VERBOSE` and `LUNIT_TIMEOUT` (seconds) from the environment.
    ///
    /// A timeout already set is kept.
    pub fn with_env(mut self) -> Self {
        if std::env::var_os("LUNIT_VERBOSE").is_some() {
            self.verbose = true;
        }
        if self.timeout.is_none() {
            self.timeout = std::env::var("LUNIT_TIMEOUT")
                .ok()
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|secs| *secs > 0.0)
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
        }
        self
    }

    /// Build-output root resolved against the base directory
    pub fn target_root(&self) -> PathBuf {
        self.base_dir.join(&self.target_dir)
    }
}

/// Result of a single test run
#[derive(Debug)]
pub struct TestCaseResult {
    /// Test name (the script's file name)
    pub name: String,
    /// Script path as given
    pub file: PathBuf,
    /// Final verdict
    pub verdict: Verdict,
    /// Execution log
    pub log: String,
    /// Duration
    pub duration: Duration,
}

impl TestCaseResult {
    pub fn passed(&self) -> bool {
        self.verdict.is_passed()
    }

    /// Process exit status the CLI reports for this result.
    pub fn exit_code(&self) -> i32 {
        match self.verdict {
            Verdict::Passed { .. } => 0,
            Verdict::Failed { .. } | Verdict::NoOutput { .. } => 4,
            Verdict::Timeout { .. } => 6,
            Verdict::ProcessError { .. } => -1,
        }
    }
}

/// The test runner
pub struct TestRunner {
    engine: Engine,
    config: RunConfig,
}

impl TestRunner {
    /// Create a new runner with the given config
    pub fn new(config: RunConfig) -> Self {
        let engine = Engine::new().with_timeout(config.timeout);
        Self { engine, config }
    }

    /// Create a new runner with a custom engine
    pub fn with_engine(engine: Engine, config: RunConfig) -> Self {
        Self { engine, config }
    }

    /// Run the script at `script` against the artifact named `entry`.
    pub fn run(&self, entry: &str, script: &Path) -> Result<TestCaseResult, ScriptError> {
        let start = Instant::now();

        // Phase 1: resolve the artifact
        let root = self.config.target_root();
        let artifact = locator::locate(&root, entry, &self.config.extension)?;
        debug!(artifact = %artifact.display(), "entry resolved");

        // Phase 2: read + parse the script
        let script_path = self.config.base_dir.join(script);
        let name = script_path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();
        let text = std::fs::read_to_string(&script_path)
            .map_err(|e| ScriptError::script_read(script, e))?;
        let case = parser::parse(&text, &name).map_err(|e| {
            let line = e.line();
            ScriptError::from(e).with_location(script.display().to_string(), line)
        })?;
        debug!(name = %case.name, steps = case.interactions.len(), args = ?case.args, "script parsed");

        // Phase 3: spawn + drive
        let (program, args) = self.command_line(&root, &artifact, &case.args);
        info!(name = %case.name, program = %program, "running test");
        let mut process = ChildProcess::spawn(&program, &args, &root)?;

        let mut state = State::new();
        let verdict = self.engine.execute(&mut state, &case, &mut process);
        info!(name = %case.name, passed = verdict.is_passed(), "test finished");

        Ok(TestCaseResult {
            name,
            file: script.to_path_buf(),
            verdict,
            log: state.log,
            duration: start.elapsed(),
        })
    }

    /// Program and arguments used to start the artifact.
    fn command_line(&self, root: &Path, artifact: &Path, script_args: &[String]) -> (String, Vec<String>) {
        match self.config.launcher {
            Some(ref launcher) => {
                let mut args = self.config.launcher_args.clone();
                args.push(locator::executable_ref(root, artifact));
                args.extend(script_args.iter().cloned());
                (launcher.clone(), args)
            }
            None => {
                // Absolute, since the child runs with the target root as cwd.
                let program = artifact.canonicalize().unwrap_or_else(|_| artifact.to_path_buf());
                (program.to_string_lossy().into_owned(), script_args.to_vec())
            }
        }
    }
}

/// Builder API for convenient test runner construction
pub struct TestRunnerBuilder {
    config: RunConfig,
    engine: Option<Engine>,
}

impl TestRunnerBuilder {
    pub fn new() -> Self {
        Self { config: RunConfig::default(), engine: None }
    }

    /// Set the base directory
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.base_dir = dir.into();
        self
    }

    /// Set the build-output root
    pub fn target_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.target_dir = dir.into();
        self
    }

    /// Set the artifact extension
    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.config.extension = ext.into();
        self
    }

    /// Run artifacts through `launcher`
    pub fn launcher(mut self, launcher: impl Into<String>) -> Self {
        self.config.launcher = Some(launcher.into());
        self
    }

    /// Run artifacts directly, without a launcher
    pub fn native(mut self) -> Self {
        self.config.launcher = None;
        self
    }

    pub fn launcher_args(mut self, args: Vec<String>) -> Self {
        self.config.launcher_args = args;
        self
    }

    /// Set the per-read timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Enable verbose output
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    /// Use a custom engine. A timeout set on the builder still applies to it.
    pub fn engine(mut self, engine: Engine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Build and return the runner
    pub fn build(self) -> TestRunner {
        match self.engine {
            Some(engine) => {
                let engine = match self.config.timeout {
                    Some(limit) => engine.with_timeout(Some(limit)),
                    None => engine,
                };
                TestRunner::with_engine(engine, self.config)
            }
            None => TestRunner::new(self.config),
        }
    }
}

impl Default for TestRunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
