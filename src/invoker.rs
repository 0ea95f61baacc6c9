/// Bounded-time tool invocation: spawn the tool, feed it a script on stdin,
/// capture its transcript, and kill its whole process group on deadline.
use crate::config::ToolConfig;
use crate::script::Script;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

/// Outcome of one tool invocation.
///
/// A timeout is an ordinary outcome, not an error: callers record it and move on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// The tool exited on its own. Non-zero exit codes land here too; the
    /// transcript parser decides whether the output is usable.
    Completed {
        transcript: String,
        exit_code: Option<i32>,
    },
    /// The time budget elapsed and the process group was killed.
    TimedOut,
}

/// Failures that prevent the tool from running at all.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("failed to spawn tool {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("tool {0} was spawned without a piped {1}")]
    MissingPipe(String, &'static str),
    #[error("I/O error while talking to the tool: {source}")]
    Io {
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ToolInvoker {
    command: String,
    args: Vec<String>,
    working_dir: PathBuf,
    timeout: Duration,
}

impl ToolInvoker {
    pub fn new(tool: &ToolConfig, timeout: Duration) -> Self {
        Self {
            command: tool.command.clone(),
            args: tool.args.clone(),
            working_dir: tool.working_dir.clone(),
            timeout,
        }
    }

    /// Run the tool once with `script` on stdin.
    ///
    /// The tool is spawned in its own process group (via `process_group(0)`)
    /// so a timeout can kill everything it started.
    pub async fn run(&self, script: &Script) -> Result<Invocation, InvokeError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0) // New process group for clean kill
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| InvokeError::Spawn {
                command: self.command.clone(),
                source: e,
            })?;

        let pid = child.id();
        tracing::debug!(pid = ?pid, command = %self.command, "tool started");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| InvokeError::MissingPipe(self.command.clone(), "stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| InvokeError::MissingPipe(self.command.clone(), "stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| InvokeError::MissingPipe(self.command.clone(), "stderr"))?;

        let start = Instant::now();
        let exchange = exchange(&mut child, stdin, stdout, stderr, script.render());

        let outcome = tokio::time::timeout(self.timeout, exchange).await;

        match outcome {
            Ok(result) => {
                let (status, out, err) = result.map_err(|e| InvokeError::Io { source: e })?;
                let exit_code = status.code();
                if !err.is_empty() {
                    tracing::debug!(
                        stderr = %String::from_utf8_lossy(&err).trim_end(),
                        "tool wrote to stderr"
                    );
                }
                tracing::debug!(
                    exit_code = ?exit_code,
                    transcript_bytes = out.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "tool exited"
                );
                Ok(Invocation::Completed {
                    transcript: String::from_utf8_lossy(&out).into_owned(),
                    exit_code,
                })
            }
            Err(_) => {
                tracing::debug!(
                    pid = ?pid,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "time budget elapsed, killing tool process group"
                );
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                if let Err(e) = child.kill().await {
                    tracing::debug!(error = %e, "tool already gone after group kill");
                }
                Ok(Invocation::TimedOut)
            }
        }
    }
}

/// Write the whole script, close stdin, drain both output pipes, and reap the child.
async fn exchange(
    child: &mut Child,
    mut stdin: ChildStdin,
    mut stdout: ChildStdout,
    mut stderr: ChildStderr,
    input: String,
) -> std::io::Result<(ExitStatus, Vec<u8>, Vec<u8>)> {
    let write = async move {
        let written = match stdin.write_all(input.as_bytes()).await {
            // The tool may exit before reading everything; its transcript says why.
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
            other => other,
        };
        drop(stdin);
        written
    };

    let mut out = Vec::new();
    let mut err = Vec::new();
    let (written, read_out, read_err) = tokio::join!(
        write,
        stdout.read_to_end(&mut out),
        stderr.read_to_end(&mut err)
    );
    written?;
    read_out?;
    read_err?;

    let status = child.wait().await?;
    Ok((status, out, err))
}

fn kill_process_group(pid: u32) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        tracing::warn!(pid, error = %e, "failed to kill tool process group");
    }
}
