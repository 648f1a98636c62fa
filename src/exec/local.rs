// src/exec/local.rs

//! Local shell executor: runs commands on the host through the platform
//! shell, streaming output chunks and a terminal result per command.

use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::process::Command as ProcessCommand;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{Error, Result};
use crate::exec::{Adapter, Bridge, Command, ExecOutput, Executor, StepResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    New,
    Prepared,
    Destroyed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::New => "new",
            State::Prepared => "prepared",
            State::Destroyed => "destroyed",
        }
    }
}

/// Adapter for the local backend. Supported config keys:
/// `workdir` (string), `env` (string map), `shell` (string),
/// `timeout` (duration string like `"30s"`, or seconds as a number).
#[derive(Debug, Default)]
pub struct LocalAdapter {
    config: HashMap<String, Value>,
}

impl LocalAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn workdir(&self) -> Option<PathBuf> {
        self.config
            .get("workdir")
            .and_then(Value::as_str)
            .map(PathBuf::from)
    }

    fn shell(&self) -> Option<String> {
        self.config
            .get("shell")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        if let Some(Value::Object(map)) = self.config.get("env") {
            for (k, v) in map {
                if let Some(s) = v.as_str() {
                    env.insert(k.clone(), s.to_string());
                }
            }
        }
        env
    }

    fn timeout(&self) -> Option<Duration> {
        match self.config.get("timeout") {
            Some(Value::String(s)) => parse_duration(s),
            Some(Value::Number(n)) => n.as_u64().map(Duration::from_secs),
            _ => None,
        }
    }
}

#[async_trait]
impl Adapter for LocalAdapter {
    async fn configure(&mut self, config: HashMap<String, Value>) -> Result<()> {
        self.config = config;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Bridge for the local backend: applies adapter config and hands out a
/// [`LocalExecutor`].
#[derive(Debug, Default)]
pub struct LocalBridge;

impl LocalBridge {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Bridge for LocalBridge {
    async fn connect(&self, adapter: &dyn Adapter) -> Result<Box<dyn Executor>> {
        let Some(local) = adapter.as_any().downcast_ref::<LocalAdapter>() else {
            return Err(Error::ConfigError(
                "adapter is not a LocalAdapter".to_string(),
            ));
        };

        let mut executor = LocalExecutor::new();
        executor.workdir = local.workdir();
        executor.env = local.env();
        if let Some(shell) = local.shell() {
            executor.shell = shell;
        }
        executor.timeout = local.timeout();

        Ok(Box::new(executor))
    }
}

/// Executes commands through the platform shell (`sh -c`, `cmd /C`).
#[derive(Debug)]
pub struct LocalExecutor {
    workdir: Option<PathBuf>,
    env: HashMap<String, String>,
    shell: String,
    timeout: Option<Duration>,
    state: State,
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self {
            workdir: None,
            env: HashMap::new(),
            shell: default_shell().to_string(),
            timeout: None,
            state: State::New,
        }
    }

    fn ensure(&self, expected: State, operation: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(Error::ExecutorState {
                state: self.state.name(),
                operation,
            });
        }
        Ok(())
    }

    async fn run_command(
        &self,
        cancel: &CancellationToken,
        step_name: &str,
        command_line: &str,
        results: &mpsc::Sender<ExecOutput>,
    ) {
        let start_time = Utc::now();
        debug!(step = %step_name, cmd = %command_line, "starting command");

        let mut cmd = build_shell_command(&self.shell, command_line);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        cmd.envs(&self.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                let _ = results
                    .send(ExecOutput::Result(StepResult {
                        step_name: step_name.to_string(),
                        command: command_line.to_string(),
                        output: String::new(),
                        error: Some(format!("failed to spawn process: {err}")),
                        start_time,
                        finish_time: Utc::now(),
                    }))
                    .await;
                return;
            }
        };

        // Stream both pipes as raw chunks while accumulating the full
        // output for the terminal result.
        let output = Arc::new(Mutex::new(String::new()));
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, results.clone(), output.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, results.clone(), output.clone()));
        }

        let limit = self.timeout;
        let error = tokio::select! {
            status = child.wait() => match status {
                Ok(status) if status.success() => None,
                Ok(status) => Some(format!(
                    "command exited with code {}",
                    status.code().unwrap_or(-1)
                )),
                Err(err) => Some(format!("failed to wait for process: {err}")),
            },
            _ = cancel.cancelled() => {
                info!(step = %step_name, "cancellation requested; killing process");
                if let Err(err) = child.kill().await {
                    warn!(step = %step_name, error = %err, "failed to kill child process");
                }
                Some("command cancelled".to_string())
            }
            _ = sleep_until_limit(limit), if limit.is_some() => {
                warn!(step = %step_name, "command timed out; killing process");
                if let Err(err) = child.kill().await {
                    warn!(step = %step_name, error = %err, "failed to kill child process");
                }
                Some("command timed out".to_string())
            }
        };

        for reader in readers {
            let _ = reader.await;
        }

        let collected = output.lock().await.clone();
        let _ = results
            .send(ExecOutput::Result(StepResult {
                step_name: step_name.to_string(),
                command: command_line.to_string(),
                output: collected,
                error,
                start_time,
                finish_time: Utc::now(),
            }))
            .await;
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    async fn prepare(&mut self, _cancel: &CancellationToken) -> Result<()> {
        self.ensure(State::New, "prepare")?;

        if let Some(dir) = &self.workdir {
            let meta = tokio::fs::metadata(dir).await.map_err(|err| {
                Error::ConfigError(format!("workdir {}: {err}", dir.display()))
            })?;
            if !meta.is_dir() {
                return Err(Error::ConfigError(format!(
                    "workdir {} is not a directory",
                    dir.display()
                )));
            }
        }

        self.state = State::Prepared;
        Ok(())
    }

    async fn destroy(&mut self, _cancel: &CancellationToken) -> Result<()> {
        // Any in-flight child is killed through transfer's cancellation
        // path or kill_on_drop; destroy only seals the state machine.
        self.state = State::Destroyed;
        Ok(())
    }

    async fn transfer(
        &mut self,
        cancel: CancellationToken,
        results: mpsc::Sender<ExecOutput>,
        mut commands: mpsc::Receiver<Command>,
    ) -> Result<()> {
        self.ensure(State::Prepared, "transfer")?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("transfer cancelled");
                    return Ok(());
                }
                command = commands.recv() => {
                    let Some(command) = command else {
                        return Ok(());
                    };
                    let (step_name, command_line) = command.parts();
                    self.run_command(&cancel, step_name, command_line, &results)
                        .await;
                }
            }
        }
    }
}

fn spawn_reader<R>(
    mut reader: R,
    results: mpsc::Sender<ExecOutput>,
    output: Arc<Mutex<String>>,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncReadExt + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let chunk = buf[..n].to_vec();
                    output
                        .lock()
                        .await
                        .push_str(&String::from_utf8_lossy(&chunk));
                    let _ = results.send(ExecOutput::Chunk(chunk)).await;
                }
            }
        }
    })
}

async fn sleep_until_limit(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

fn build_shell_command(shell: &str, command_line: &str) -> ProcessCommand {
    if cfg!(windows) {
        let mut cmd = ProcessCommand::new("cmd");
        cmd.arg("/C").arg(command_line);
        cmd
    } else {
        let mut cmd = ProcessCommand::new(shell);
        cmd.arg("-c").arg(command_line);
        cmd
    }
}

fn default_shell() -> &'static str {
    if cfg!(windows) {
        "cmd"
    } else {
        "/bin/sh"
    }
}

/// Parse duration strings of the form `500ms`, `30s`, `5m`, `2h`.
fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    let split = text.find(|c: char| !c.is_ascii_digit())?;
    let value: u64 = text[..split].parse().ok()?;
    match &text[split..] {
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value * 60)),
        "h" => Some(Duration::from_secs(value * 3600)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parsing() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("nope"), None);
        assert_eq!(parse_duration("10"), None);
    }

    #[tokio::test]
    async fn adapter_config_reaches_the_executor() {
        let mut adapter = LocalAdapter::new();
        adapter
            .configure(HashMap::from([
                ("shell".to_string(), serde_json::json!("/bin/bash")),
                ("timeout".to_string(), serde_json::json!("30s")),
            ]))
            .await
            .unwrap();

        assert_eq!(adapter.shell().as_deref(), Some("/bin/bash"));
        assert_eq!(adapter.timeout(), Some(Duration::from_secs(30)));

        let executor = LocalBridge::new().connect(&adapter).await;
        assert!(executor.is_ok());
    }

    #[tokio::test]
    async fn transfer_requires_prepare() {
        let mut executor = LocalExecutor::new();
        let (tx, _rx) = mpsc::channel(4);
        let (_cmd_tx, cmd_rx) = mpsc::channel(4);

        let err = executor
            .transfer(CancellationToken::new(), tx, cmd_rx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExecutorState { .. }));
    }

    #[tokio::test]
    async fn destroyed_executor_rejects_prepare() {
        let cancel = CancellationToken::new();
        let mut executor = LocalExecutor::new();
        executor.destroy(&cancel).await.unwrap();

        let err = executor.prepare(&cancel).await.unwrap_err();
        assert!(matches!(err, Error::ExecutorState { .. }));
    }
}
