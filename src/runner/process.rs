//! Process-backed runner
//!
//! Spawns the runner command and exchanges newline-delimited JSON envelopes
//! over its stdin/stdout. Every request carries an id; responses to requests
//! that already timed out are discarded.

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::{status_from_response, Envelope, ExecutionResult, Message, Runner, RunnerFactory};
use crate::errors::ProtocolError;

const KILL_GRACE: Duration = Duration::from_millis(1000);

/// Command line used to launch a runner
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunnerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl RunnerCommand {
    /// Split a whitespace-separated command line
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            working_dir: None,
        })
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[derive(Serialize)]
struct Outgoing<'a> {
    id: u64,
    #[serde(flatten)]
    message: &'a Message,
}

struct RunnerIo {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

pub struct ProcessRunner {
    child: Mutex<Child>,
    io: tokio::sync::Mutex<RunnerIo>,
    next_id: AtomicU64,
    pid: i32,
    timeout: Duration,
    multithreaded: bool,
}

impl ProcessRunner {
    pub async fn start(
        command: &RunnerCommand,
        stream: usize,
        timeout: Duration,
        multithreaded: bool,
    ) -> Result<Self, ProtocolError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .env("STEPRUN_STREAM_ID", stream.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ProtocolError::Startup(format!("{}: {e}", command.program)))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProtocolError::Startup("runner stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProtocolError::Startup("runner stdout unavailable".to_string()))?;
        let pid = child.id().map(|p| p as i32).unwrap_or(-1);

        info!("Started runner '{}' (pid {}) for stream {}", command.program, pid, stream);

        Ok(Self {
            child: Mutex::new(child),
            io: tokio::sync::Mutex::new(RunnerIo {
                stdin,
                stdout: BufReader::new(stdout).lines(),
            }),
            next_id: AtomicU64::new(1),
            pid,
            timeout,
            multithreaded,
        })
    }

    async fn send(&self, io: &mut RunnerIo, id: u64, message: &Message) -> Result<(), ProtocolError> {
        let mut line = serde_json::to_string(&Outgoing { id, message })
            .map_err(|e| ProtocolError::Io(e.to_string()))?;
        line.push('\n');
        io.stdin.write_all(line.as_bytes()).await?;
        io.stdin.flush().await?;
        Ok(())
    }

    async fn round_trip(&self, message: &Message) -> Result<Message, ProtocolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut io = self.io.lock().await;
        self.send(&mut io, id, message).await?;

        loop {
            let Some(line) = io.stdout.next_line().await? else {
                return Err(ProtocolError::Unreachable);
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let envelope: Envelope = serde_json::from_str(line)
                .map_err(|e| ProtocolError::MalformedResponse(e.to_string()))?;
            if envelope.id < id {
                debug!("Discarding stale runner response {}", envelope.id);
                continue;
            }
            if envelope.id != id {
                return Err(ProtocolError::MalformedResponse(format!(
                    "response id {} does not match request {}",
                    envelope.id, id
                )));
            }
            return Ok(envelope.message);
        }
    }

    fn lock_child(&self) -> std::sync::MutexGuard<'_, Child> {
        self.child.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    fn alive(&self) -> bool {
        matches!(self.lock_child().try_wait(), Ok(None))
    }

    async fn kill(&self) -> Result<(), ProtocolError> {
        if !self.alive() {
            return Ok(());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let polite = async {
            let mut io = self.io.lock().await;
            self.send(&mut io, id, &Message::KillProcessRequest).await
        };
        if timeout(KILL_GRACE, polite).await.is_ok() {
            let deadline = tokio::time::Instant::now() + KILL_GRACE;
            while self.alive() && tokio::time::Instant::now() < deadline {
                sleep(Duration::from_millis(50)).await;
            }
        }

        let mut child = self.lock_child();
        if let Ok(None) = child.try_wait() {
            warn!("Runner {} did not exit after kill request, terminating", self.pid);
            child.start_kill()?;
        }
        Ok(())
    }

    fn is_multithreaded(&self) -> bool {
        self.multithreaded
    }

    fn pid(&self) -> i32 {
        self.pid
    }

    async fn execute_and_get_status(&self, message: Message) -> ExecutionResult {
        status_from_response(self.execute_message_with_timeout(message).await)
    }

    async fn execute_message_with_timeout(&self, message: Message) -> Result<Message, ProtocolError> {
        if !self.alive() {
            return Err(ProtocolError::Unreachable);
        }
        match timeout(self.timeout, self.round_trip(&message)).await {
            Ok(response) => response,
            Err(_) => {
                warn!("Runner {} timed out on {}", self.pid, message.kind());
                Err(ProtocolError::Timeout(self.timeout.as_millis() as u64))
            }
        }
    }
}

/// Starts a [`ProcessRunner`] per stream from one command line
#[derive(Clone, Debug)]
pub struct ProcessRunnerFactory {
    command: RunnerCommand,
    timeout: Duration,
    multithreaded: bool,
}

impl ProcessRunnerFactory {
    pub fn new(command: RunnerCommand, timeout: Duration) -> Self {
        Self {
            command,
            timeout,
            multithreaded: false,
        }
    }

    pub fn multithreaded(mut self, multithreaded: bool) -> Self {
        self.multithreaded = multithreaded;
        self
    }
}

#[async_trait]
impl RunnerFactory for ProcessRunnerFactory {
    async fn start(&self, stream: usize) -> Result<Box<dyn Runner>, ProtocolError> {
        let runner =
            ProcessRunner::start(&self.command, stream, self.timeout, self.multithreaded).await?;
        Ok(Box::new(runner))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn factory(command: &str, timeout_ms: u64) -> ProcessRunnerFactory {
        ProcessRunnerFactory::new(
            RunnerCommand::parse(command).unwrap(),
            Duration::from_millis(timeout_ms),
        )
    }

    #[test]
    fn test_parse_command() {
        let command = RunnerCommand::parse("python3 -m runner --verbose").unwrap();
        assert_eq!(command.program, "python3");
        assert_eq!(command.args, vec!["-m", "runner", "--verbose"]);
        assert!(RunnerCommand::parse("   ").is_none());
    }

    #[tokio::test]
    async fn test_round_trip_through_echoing_process() {
        // `cat` echoes each envelope back, so the reply carries the request id.
        let runner = factory("cat", 2000).start(0).await.unwrap();
        assert!(runner.alive());
        assert!(runner.pid() > 0);

        let request = Message::StepValidateRequest {
            step_text: "Open the browser".to_string(),
        };
        let reply = runner.execute_message_with_timeout(request.clone()).await.unwrap();
        assert_eq!(reply, request);

        let status = runner
            .execute_and_get_status(Message::StepExecutionStarting {
                step_text: "x".to_string(),
            })
            .await;
        assert!(status.failed);

        runner.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_runner_times_out() {
        let runner = factory("sleep 5", 200).start(1).await.unwrap();
        let result = runner
            .execute_message_with_timeout(Message::KillProcessRequest)
            .await;
        assert_eq!(result, Err(ProtocolError::Timeout(200)));
        runner.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_exited_runner_is_unreachable() {
        let runner = factory("true", 500).start(0).await.unwrap();
        sleep(Duration::from_millis(200)).await;
        assert!(!runner.alive());
        assert!(runner
            .execute_message_with_timeout(Message::KillProcessRequest)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_start() {
        let result = factory("definitely-not-a-runner-binary", 500).start(0).await;
        assert!(matches!(result, Err(ProtocolError::Startup(_))));
    }
}
