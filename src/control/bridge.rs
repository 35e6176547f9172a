//! Control library hosted in a child process.
//!
//! The child is started once with the control-root identifiers and then speaks
//! newline-delimited JSON:
//!
//! - request:  `{"op": "<name>", "args": {..}, "id": N}`
//! - response: `{"id": N, "ok": true, "output": <value>}` or
//!   `{"id": N, "ok": false, "error": "<message>"}`
//!
//! Stdout lines that are not JSON objects are library chatter and are skipped.
//! Stderr is forwarded to the log and its tail is kept for exit diagnostics.

use super::{ControlOp, SmurfControl};
use crate::model::RunConfig;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to start control bridge `{cmd}`: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    #[error("control bridge I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("unparsable reply from control bridge: {source}\n  line: {line}")]
    Parse {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("control bridge protocol error: {0}")]
    Protocol(String),

    #[error("control operation `{op}` failed: {message}")]
    Remote { op: &'static str, message: String },

    #[error("control bridge exited ({status}) while `{op}` was pending{}", stderr_suffix(.stderr))]
    Exited {
        op: &'static str,
        status: String,
        stderr: String,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!("\nstderr: {stderr}")
    }
}

#[derive(Debug, Deserialize)]
struct Reply {
    id: u64,
    ok: bool,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Option<String>,
}

struct BridgeProcess {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    stderr_task: Option<JoinHandle<()>>,
}

/// [`SmurfControl`] backed by a long-lived bridge process.
pub struct BridgeControl {
    inner: tokio::sync::Mutex<BridgeProcess>,
}

impl BridgeControl {
    /// Start the bridge for the control roots named in `cfg`. Setup is never run at
    /// construction; it is a separate step of the run.
    pub fn spawn(cfg: &RunConfig) -> Result<Self, BridgeError> {
        let mut cmd = Command::new(&cfg.control_cmd);
        cmd.args(&cfg.control_args)
            .arg("--epics-root")
            .arg(&cfg.epics_root)
            .arg("--config-file")
            .arg(&cfg.config_file)
            .arg("--shelf-manager")
            .arg(&cfg.shelf_manager);
        let name = cfg.control_cmd.display().to_string();
        tracing::info!(cmd = %name, epics_root = %cfg.epics_root, "starting control bridge");
        Self::from_command(cmd, name)
    }

    pub(crate) fn from_command(mut cmd: Command, name: String) -> Result<Self, BridgeError> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| BridgeError::Spawn {
            cmd: name.clone(),
            source,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Protocol("stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Protocol("stdout not captured".into()))?;

        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let stderr_task = child.stderr.take().map(|stderr| {
            let tail = Arc::clone(&stderr_tail);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    tracing::debug!(target: "smurf_control", "{line}");
                    if let Ok(mut t) = tail.lock() {
                        if t.len() == STDERR_TAIL_LINES {
                            t.pop_front();
                        }
                        t.push_back(line);
                    }
                }
            })
        });

        Ok(Self {
            inner: tokio::sync::Mutex::new(BridgeProcess {
                child,
                stdin,
                lines: BufReader::new(stdout).lines(),
                next_id: 0,
                stderr_tail,
                stderr_task,
            }),
        })
    }
}

impl BridgeProcess {
    async fn request(&mut self, op: &ControlOp) -> Result<Value, BridgeError> {
        self.next_id += 1;
        let id = self.next_id;

        let mut msg = serde_json::to_value(op)?;
        if let Value::Object(map) = &mut msg {
            map.insert("id".into(), id.into());
        }
        let mut buf = serde_json::to_vec(&msg)?;
        buf.push(b'\n');
        if let Err(e) = self.write(&buf).await {
            // A dead child shows up as a broken pipe; report the exit instead.
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                return Err(self.exited(op).await);
            }
            return Err(e.into());
        }

        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Err(self.exited(op).await);
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !trimmed.starts_with('{') {
                tracing::debug!(target: "smurf_control", "{trimmed}");
                continue;
            }
            let reply: Reply =
                serde_json::from_str(trimmed).map_err(|source| BridgeError::Parse {
                    line: trimmed.to_owned(),
                    source,
                })?;
            if reply.id != id {
                return Err(BridgeError::Protocol(format!(
                    "expected reply {id} for `{}`, got {}",
                    op.name(),
                    reply.id
                )));
            }
            if reply.ok {
                return Ok(reply.output);
            }
            return Err(BridgeError::Remote {
                op: op.name(),
                message: reply
                    .error
                    .unwrap_or_else(|| "no error message given".into()),
            });
        }
    }

    async fn write(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.stdin.write_all(buf).await?;
        self.stdin.flush().await
    }

    async fn exited(&mut self, op: &ControlOp) -> BridgeError {
        let status = match self.child.wait().await {
            Ok(s) => s.to_string(),
            Err(e) => return BridgeError::Io(e),
        };
        // The stderr reader ends once the child's pipe closes.
        if let Some(task) = self.stderr_task.take() {
            let _ = task.await;
        }
        let stderr = self
            .stderr_tail
            .lock()
            .map(|t| t.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default();
        BridgeError::Exited {
            op: op.name(),
            status,
            stderr,
        }
    }
}

impl SmurfControl for BridgeControl {
    async fn call(&self, op: &ControlOp) -> anyhow::Result<Value> {
        let mut process = self.inner.lock().await;
        Ok(process.request(op).await?)
    }
}
