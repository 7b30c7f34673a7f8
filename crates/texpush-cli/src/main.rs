//! texpush - compile a document, triage the build log, commit and push the
//! working tree, and append a line to the run history.
//!
//! ## Commands
//!
//! - `run` (default): invoke the build command and publish the result
//! - `history`: show recent runs and the average build duration

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, warn, Level};

use texpush_build::{render_history, render_report, CompileAndPublish, ShellRunner};
use texpush_core::domain::config::{
    DEFAULT_COMMAND, DEFAULT_EXCERPT_LINES, DEFAULT_FALLBACK_BRANCH, DEFAULT_HISTORY_LINES,
    DEFAULT_LOG_FILE, DEFAULT_REMOTE,
};
use texpush_core::{
    init_tracing, is_git_repo, GitCli, Palette, PdfInfoInspector, RunConfig, RunLog, RunLogEntry,
};

#[derive(Parser, Debug)]
#[command(name = "texpush")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build a LaTeX document, commit and push the result, log the run", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Build command, executed with `sh -c`
    #[arg(long, global = true, env = "TEXPUSH_COMMAND", default_value = DEFAULT_COMMAND)]
    command: String,

    /// Run log file, relative to the working directory
    #[arg(long, global = true, env = "TEXPUSH_LOG_FILE", default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Number of output lines shown in the excerpt
    #[arg(
        long,
        global = true,
        env = "TEXPUSH_EXCERPT_LINES",
        default_value_t = DEFAULT_EXCERPT_LINES
    )]
    excerpt_lines: usize,

    /// Print the full filtered output after a successful build
    #[arg(
        long,
        global = true,
        env = "TEXPUSH_SHOW_FULL_OUTPUT",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    show_full_output: bool,

    /// Number of history lines shown after the run
    #[arg(
        long,
        global = true,
        env = "TEXPUSH_HISTORY_LINES",
        default_value_t = DEFAULT_HISTORY_LINES
    )]
    history_lines: usize,

    /// Kill the build after this many seconds
    #[arg(long, global = true, env = "TEXPUSH_TIMEOUT")]
    timeout: Option<u64>,

    /// Remote used when the branch has no upstream yet
    #[arg(long, global = true, env = "TEXPUSH_REMOTE", default_value = DEFAULT_REMOTE)]
    remote: String,

    /// Branch pushed when the current one cannot be determined
    #[arg(
        long,
        global = true,
        env = "TEXPUSH_FALLBACK_BRANCH",
        default_value = DEFAULT_FALLBACK_BRANCH
    )]
    fallback_branch: String,

    /// Do not keep the captured output of a failed build
    #[arg(
        long,
        global = true,
        env = "TEXPUSH_DISCARD_CAPTURE",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    discard_capture: bool,

    /// Build and record, but do not commit or push
    #[arg(
        long,
        global = true,
        env = "TEXPUSH_NO_PUBLISH",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    no_publish: bool,

    /// Extension of the produced document
    #[arg(long = "artifact-ext", global = true, default_value = "pdf")]
    artifact_extension: String,

    /// Extension of the compiler's log file
    #[arg(long = "log-ext", global = true, default_value = "log")]
    log_extension: String,

    /// Extra environment variable for the build command (repeatable)
    #[arg(long = "env", global = true, value_name = "KEY=VALUE", value_parser = parse_key_val)]
    env: Vec<(String, String)>,
}

impl RunArgs {
    fn into_config(self, work_dir: PathBuf) -> RunConfig {
        RunConfig {
            command: self.command,
            work_dir,
            log_file: self.log_file,
            excerpt_lines: self.excerpt_lines,
            show_full_output: self.show_full_output,
            history_lines: self.history_lines,
            timeout_secs: self.timeout,
            remote: self.remote,
            fallback_branch: self.fallback_branch,
            keep_capture_on_failure: !self.discard_capture,
            publish: !self.no_publish,
            artifact_extension: self.artifact_extension,
            log_extension: self.log_extension,
            env_overrides: self.env.into_iter().collect::<BTreeMap<_, _>>(),
            ..RunConfig::default()
        }
    }
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;
    if key.is_empty() {
        return Err(format!("empty variable name in `{s}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Commands {
    /// Build, analyze, publish and record (the default)
    Run,

    /// Show recent runs and the average build duration
    History {
        /// Number of lines to show
        #[arg(short, long, default_value_t = DEFAULT_HISTORY_LINES)]
        lines: usize,

        /// Output format
        #[arg(long, value_enum, default_value_t = HistoryFormat::Text)]
        format: HistoryFormat,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum HistoryFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct HistoryJson {
    log_file: PathBuf,
    runs_counted: usize,
    average_duration_seconds: Option<f64>,
    entries: Vec<RunLogEntry>,
}

/// Map a command's exit code onto a process exit status.
fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    init_tracing(cli.json, level);

    let work_dir = std::env::current_dir().context("Failed to determine working directory")?;
    let config = cli.run.into_config(work_dir);
    debug!(?config, "configuration resolved");
    let palette = Palette::detect();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd_run(&config, &palette).await,
        Commands::History { lines, format } => {
            cmd_history(&config, lines, format, &palette)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn cmd_run(config: &RunConfig, palette: &Palette) -> Result<ExitCode> {
    let runner = ShellRunner;
    let git = GitCli::new(&config.work_dir);
    let inspector = PdfInfoInspector::new();

    if config.publish && !is_git_repo(&config.work_dir) {
        warn!(dir = %config.work_dir.display(), "not inside a git work tree, publishing will fail");
    }

    let outcome = CompileAndPublish::new(config, &runner, &git, &inspector)
        .run()
        .await?;

    println!();
    print!("{}", render_report(&outcome, config, palette));

    Ok(ExitCode::from(exit_status(outcome.exit_code())))
}

fn cmd_history(
    config: &RunConfig,
    lines: usize,
    format: HistoryFormat,
    palette: &Palette,
) -> Result<()> {
    let log = RunLog::new(config.log_path());
    let summary = log
        .summarize(lines)
        .with_context(|| format!("Failed to read run log {}", log.path().display()))?;

    match format {
        HistoryFormat::Text => print!("{}", render_history(&summary, log.path(), palette)),
        HistoryFormat::Json => {
            let report = HistoryJson {
                log_file: log.path().to_path_buf(),
                runs_counted: summary.runs_counted,
                average_duration_seconds: summary.average_duration_seconds,
                entries: log.entries()?,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
