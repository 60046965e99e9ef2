//! lunit CLI
//!
//! Run an interactive test script against a compiled entry point.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use lunit::{RunConfig, ScriptError, TestCaseResult, TestRunner};
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "lunit")]
#[command(version)]
#[command(about = "Drive a program through an interactive test script")]
struct Cli {
    /// Verbose output: show the execution log for passing runs too
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run tests
    Test(TestArgs),
}

#[derive(clap::Args, Debug)]
struct TestArgs {
    /// Entry artifact name (e.g. Main)
    entry: String,

    /// Test script path
    test: PathBuf,

    /// Use kit format
    #[arg(short, long)]
    kit: bool,

    /// Build-output root searched for the entry
    #[arg(long = "target", default_value = lunit::DEFAULT_TARGET_DIR)]
    target_dir: PathBuf,

    /// Artifact extension
    #[arg(long = "ext", default_value = lunit::DEFAULT_EXTENSION)]
    extension: String,

    /// Program that runs the artifact
    #[arg(long, default_value = lunit::DEFAULT_LAUNCHER, conflicts_with = "native")]
    launcher: String,

    /// Extra launcher argument (repeatable)
    #[arg(long = "launcher-arg", allow_hyphen_values = true)]
    launcher_args: Vec<String>,

    /// Run the artifact directly instead of through a launcher
    #[arg(long)]
    native: bool,

    /// Give up on a read after this many seconds [env: LUNIT_TIMEOUT]
    #[arg(long)]
    timeout: Option<f64>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    lunit::logging::init(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => match err.downcast_ref::<ScriptError>() {
            Some(script_err) => {
                println!("{}", script_err);
                exit_code(script_err.exit_code())
            }
            None => {
                eprintln!("error: {:#}", err);
                exit_code(-1)
            }
        },
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let Command::Test(args) = cli.command;

    if args.kit {
        warn!("kit format is not supported yet, reading {} as a plain script", args.test.display());
    }

    let timeout = match args.timeout {
        Some(secs) if secs > 0.0 => Some(
            Duration::try_from_secs_f64(secs).with_context(|| format!("invalid --timeout: {}", secs))?,
        ),
        Some(secs) => anyhow::bail!("invalid --timeout: {}", secs),
        None => None,
    };

    let base_dir = std::env::current_dir().context("failed to read the current directory")?;
    let config = RunConfig {
        base_dir,
        target_dir: args.target_dir,
        extension: args.extension,
        launcher: if args.native { None } else { Some(args.launcher) },
        launcher_args: args.launcher_args,
        timeout,
        verbose: cli.verbose,
    }
    .with_env();

    let verbose = config.verbose;
    let runner = TestRunner::new(config);
    let result = runner.run(&args.entry, &args.test)?;
    report(&result, verbose);

    Ok(exit_code(result.exit_code()))
}

fn report(result: &TestCaseResult, verbose: bool) {
    if result.passed() {
        println!("PASS  {} ({}ms)", result.name, result.duration.as_millis());
        if verbose {
            print_log(&result.log);
        }
        return;
    }

    println!("FAIL  {}", result.name);
    for line in result.verdict.to_string().lines() {
        println!("      {}", line);
    }
    print_log(&result.log);
}

fn print_log(log: &str) {
    if log.is_empty() {
        return;
    }
    println!("      --- log ---");
    for line in log.lines() {
        println!("      {}", line);
    }
}

/// Statuses outside 0..=255 wrap the way a shell reports them (-1 is 255).
fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(code as u8)
}
