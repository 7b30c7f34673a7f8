//! Build command execution with live output and durable capture.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use texpush_core::{Result, RunConfig, TexpushError};

use crate::capture::CapturedOutput;

/// Exit code `sh` uses when the command cannot be found.
pub const COMMAND_NOT_FOUND: i32 = 127;

/// Exit code recorded for a command killed by the timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// How long to wait for output pipes to close after a timeout kill.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// What to run and how.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeRequest {
    /// Shell command string, run through `sh -c`.
    pub command: String,
    pub work_dir: PathBuf,
    /// Added to the inherited environment.
    pub env: BTreeMap<String, String>,
    pub timeout_secs: Option<u64>,
    /// Copy output to this process's stdout/stderr while capturing.
    pub echo: bool,
}

impl InvokeRequest {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            command: config.command.clone(),
            work_dir: config.work_dir.clone(),
            env: config.env_overrides.clone(),
            timeout_secs: config.timeout_secs,
            echo: true,
        }
    }

    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }
}

/// Result of one command execution.
#[derive(Debug)]
pub struct Invocation {
    /// Local wall-clock time at which the command was started.
    pub start_time: DateTime<FixedOffset>,
    /// Whole seconds between start and exit.
    pub duration_seconds: u64,
    pub exit_code: i32,
    pub timed_out: bool,
    pub captured: CapturedOutput,
}

impl Invocation {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}

/// Runs the build command. A non-zero exit is a normal outcome, not an error.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, request: &InvokeRequest) -> Result<Invocation>;
}

/// [`CommandRunner`] that executes through `sh -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

fn code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

async fn write_chunk<W: AsyncWrite + Unpin>(out: &mut W, chunk: &[u8]) -> io::Result<()> {
    out.write_all(chunk).await?;
    out.flush().await
}

/// Write `chunk` to `sink`, dropping the sink on its first failure.
async fn feed<W: AsyncWrite + Unpin>(sink: &mut Option<W>, chunk: &[u8], name: &str) {
    let failed = match sink.as_mut() {
        Some(out) => write_chunk(out, chunk).await.err(),
        None => None,
    };
    if let Some(e) = failed {
        warn!(sink = name, error = %e, "output sink failed, no longer written");
        *sink = None;
    }
}

/// Copy `reader` chunk by chunk into the console, the per-stream file and
/// the shared merged file. A failing sink is dropped; the pipe is always
/// read to EOF so the child never blocks on it.
async fn pump<R, W>(
    mut reader: R,
    mut console: Option<W>,
    own: File,
    merged: Arc<tokio::sync::Mutex<File>>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut own = Some(own);
    let mut merged = Some(merged);
    let mut buf = vec![0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        let chunk = &buf[..n];

        feed(&mut console, chunk, "console").await;
        feed(&mut own, chunk, "stream capture").await;

        let merged_failed = match merged.as_ref() {
            Some(shared) => write_chunk(&mut *shared.lock().await, chunk).await.err(),
            None => None,
        };
        if let Some(e) = merged_failed {
            warn!(sink = "merged capture", error = %e, "output sink failed, no longer written");
            merged = None;
        }
    }
}

async fn join_pump(mut task: JoinHandle<io::Result<()>>, grace: Option<Duration>) -> Result<()> {
    let joined = match grace {
        Some(grace) => match tokio::time::timeout(grace, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!("output stream still open after kill; capture truncated");
                task.abort();
                return Ok(());
            }
        },
        None => task.await,
    };
    joined.map_err(|e| TexpushError::Io(io::Error::other(e)))??;
    Ok(())
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, request: &InvokeRequest) -> Result<Invocation> {
        if request.command.trim().is_empty() {
            return Err(TexpushError::CommandNotFound("<empty command>".to_string()));
        }

        let captured = CapturedOutput::new()?;
        let (out_file, err_file, merged_file) = captured.writers()?;
        let merged = Arc::new(tokio::sync::Mutex::new(File::from_std(merged_file)));

        let start_time = Local::now().fixed_offset();
        let started = Instant::now();
        info!(command = %request.command, dir = %request.work_dir.display(), "starting build");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&request.command)
            .current_dir(&request.work_dir)
            .envs(&request.env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(TexpushError::Spawn)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TexpushError::Io(io::Error::other("stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TexpushError::Io(io::Error::other("stderr not captured")))?;

        let out_task = tokio::spawn(pump(
            stdout,
            request.echo.then(tokio::io::stdout),
            File::from_std(out_file),
            merged.clone(),
        ));
        let err_task = tokio::spawn(pump(
            stderr,
            request.echo.then(tokio::io::stderr),
            File::from_std(err_file),
            merged,
        ));

        let (status, timed_out) = match request.timeout_secs {
            Some(secs) => {
                match tokio::time::timeout(Duration::from_secs(secs), child.wait()).await {
                    Ok(status) => (Some(status?), false),
                    Err(_) => {
                        warn!(timeout_secs = secs, "build timed out, killing");
                        child.kill().await?;
                        (None, true)
                    }
                }
            }
            None => (Some(child.wait().await?), false),
        };

        let grace = timed_out.then_some(DRAIN_GRACE);
        let joined = [
            ("stdout", join_pump(out_task, grace).await),
            ("stderr", join_pump(err_task, grace).await),
        ];
        for (stream, result) in joined {
            if let Err(e) = result {
                warn!(stream, error = %e, "output capture incomplete");
            }
        }

        let duration_seconds = started.elapsed().as_secs();
        let exit_code = status.map(code_of).unwrap_or(TIMEOUT_EXIT_CODE);

        if exit_code == COMMAND_NOT_FOUND && !timed_out {
            let program = request
                .command
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string();
            return Err(TexpushError::CommandNotFound(program));
        }

        info!(exit_code, duration_seconds, timed_out, "build finished");
        Ok(Invocation {
            start_time,
            duration_seconds,
            exit_code,
            timed_out,
            captured,
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedRunner
// ---------------------------------------------------------------------------

/// One canned result for [`ScriptedRunner`].
#[derive(Debug, Clone)]
struct Script {
    stdout: String,
    stderr: String,
    exit_code: i32,
    duration_seconds: u64,
}

/// In-memory [`CommandRunner`] returning canned output (testing only).
///
/// Each call pops the next script; the last one repeats. Requests are
/// recorded for inspection.
#[derive(Debug)]
pub struct ScriptedRunner {
    scripts: Mutex<Vec<Script>>,
    start_time: DateTime<FixedOffset>,
    requests: Mutex<Vec<InvokeRequest>>,
}

impl ScriptedRunner {
    pub fn new(stdout: &str, exit_code: i32) -> Self {
        Self {
            scripts: Mutex::new(vec![Script {
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code,
                duration_seconds: 0,
            }]),
            start_time: Local::now().fixed_offset(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_stderr(self, stderr: &str) -> Self {
        if let Some(last) = self.scripts.lock().unwrap().last_mut() {
            last.stderr = stderr.to_string();
        }
        self
    }

    pub fn taking(self, duration_seconds: u64) -> Self {
        if let Some(last) = self.scripts.lock().unwrap().last_mut() {
            last.duration_seconds = duration_seconds;
        }
        self
    }

    /// Queue another result after the existing ones.
    pub fn then(self, stdout: &str, exit_code: i32) -> Self {
        self.scripts.lock().unwrap().push(Script {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code,
            duration_seconds: 0,
        });
        self
    }

    pub fn started_at(mut self, start_time: DateTime<FixedOffset>) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn requests(&self) -> Vec<InvokeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, request: &InvokeRequest) -> Result<Invocation> {
        self.requests.lock().unwrap().push(request.clone());
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.len() > 1 {
                scripts.remove(0)
            } else {
                scripts[0].clone()
            }
        };
        Ok(Invocation {
            start_time: self.start_time,
            duration_seconds: script.duration_seconds,
            exit_code: script.exit_code,
            timed_out: false,
            captured: CapturedOutput::from_text(&script.stdout, &script.stderr)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(command: &str) -> InvokeRequest {
        InvokeRequest {
            command: command.to_string(),
            work_dir: PathBuf::from("."),
            env: BTreeMap::new(),
            timeout_secs: None,
            echo: false,
        }
    }

    #[test]
    fn test_request_from_config() {
        let mut config = RunConfig::in_dir("/work/paper");
        config.timeout_secs = Some(600);
        config
            .env_overrides
            .insert("TEXINPUTS".to_string(), ".:./styles//:".to_string());

        let req = InvokeRequest::from_config(&config);
        assert_eq!(req.command, config.command);
        assert_eq!(req.work_dir, PathBuf::from("/work/paper"));
        assert_eq!(req.timeout_secs, Some(600));
        assert_eq!(req.env.get("TEXINPUTS").map(String::as_str), Some(".:./styles//:"));
        assert!(req.echo);
        assert!(!req.quiet().echo);
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let result = ShellRunner.run(&request("echo hello")).await.expect("run failed");
        assert!(result.succeeded());
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.captured.stdout_text().unwrap(), "hello\n");
    }

    #[tokio::test]
    async fn test_execute_failing_command_is_not_an_error() {
        let result = ShellRunner.run(&request("exit 3")).await.expect("run failed");
        assert!(!result.succeeded());
        assert_eq!(result.exit_code, 3);
    }

    #[tokio::test]
    async fn test_streams_captured_separately_and_merged() {
        let result = ShellRunner
            .run(&request("echo one; echo two >&2; echo three"))
            .await
            .unwrap();
        assert_eq!(result.captured.stdout_text().unwrap(), "one\nthree\n");
        assert_eq!(result.captured.stderr_text().unwrap(), "two\n");

        let merged = result.captured.merged_text().unwrap();
        let mut lines: Vec<&str> = merged.lines().collect();
        // Cross-stream interleaving is not guaranteed; per-stream order is.
        let out_order: Vec<&str> = lines.iter().copied().filter(|l| *l != "two").collect();
        assert_eq!(out_order, vec!["one", "three"]);
        lines.sort_unstable();
        assert_eq!(lines, vec!["one", "three", "two"]);
    }

    #[tokio::test]
    async fn test_env_overrides_and_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request("echo \"$TEXPUSH_TEST_VALUE\"; pwd");
        req.work_dir = dir.path().to_path_buf();
        req.env
            .insert("TEXPUSH_TEST_VALUE".to_string(), "from-override".to_string());

        let result = ShellRunner.run(&req).await.unwrap();
        let stdout = result.captured.stdout_text().unwrap();
        let mut lines = stdout.lines();
        assert_eq!(lines.next(), Some("from-override"));
        let pwd = PathBuf::from(lines.next().unwrap());
        assert_eq!(
            pwd.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn test_missing_command_is_command_not_found() {
        let err = ShellRunner
            .run(&request("texpush-no-such-compiler --pdf"))
            .await
            .unwrap_err();
        match err {
            TexpushError::CommandNotFound(program) => {
                assert_eq!(program, "texpush-no-such-compiler")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_and_records_124() {
        let mut req = request("echo started; exec sleep 30");
        req.timeout_secs = Some(1);

        let result = ShellRunner.run(&req).await.unwrap();
        assert!(result.timed_out);
        assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
        assert!(result.duration_seconds < 30);
        assert!(result.captured.stdout_text().unwrap().contains("started"));
    }

    #[tokio::test]
    async fn test_pump_keeps_draining_when_capture_write_fails() {
        let dir = tempfile::tempdir().unwrap();
        let read_only = dir.path().join("read-only.txt");
        std::fs::write(&read_only, "").unwrap();
        let own = File::open(&read_only).await.unwrap();
        let merged_path = dir.path().join("merged.txt");
        let merged = Arc::new(tokio::sync::Mutex::new(
            File::create(&merged_path).await.unwrap(),
        ));

        let input: &[u8] = b"first chunk\nsecond chunk\n";
        pump(input, None::<tokio::io::Stdout>, own, merged)
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&merged_path).unwrap(),
            "first chunk\nsecond chunk\n"
        );
        assert_eq!(std::fs::read_to_string(&read_only).unwrap(), "");
    }

    #[tokio::test]
    async fn test_scripted_runner_sequence() {
        let runner = ScriptedRunner::new("first", 0).then("second", 1);
        let req = request("latexmk");
        let a = runner.run(&req).await.unwrap();
        let b = runner.run(&req).await.unwrap();
        let c = runner.run(&req).await.unwrap();
        assert_eq!(a.captured.stdout_text().unwrap(), "first");
        assert_eq!(b.exit_code, 1);
        assert_eq!(c.exit_code, 1);
        assert_eq!(runner.requests().len(), 3);
    }
}
