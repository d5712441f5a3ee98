// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Process Sandbox Runtime
//!
//! Runs each dapp as `<interpreter> <entry_point> <params..>` inside its install
//! directory and talks to it with newline-delimited JSON frames on stdio:
//!
//! ```text
//! host  -> child  {"kind":"request","id":1,"method":"get","path":"/","query":{}}
//! child -> host   {"kind":"response","id":1,"result":{...}}
//! child -> host   {"kind":"call","id":7,"call":"dapps#setReady","args":{}}
//! host  -> child  {"kind":"response","id":7,"error":"Method not found: ..."}
//! ```
//!
//! Request ids are allocated per direction, so the two sides never collide.
//! Child stderr is forwarded to `tracing` at debug level.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::sandbox::{
    LaunchSpec, SandboxCall, SandboxError, SandboxEvent, SandboxHandle, SandboxRequest,
    SandboxRuntime, StartedSandbox,
};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Frame {
    Request {
        id: u64,
        method: String,
        path: String,
        #[serde(default)]
        query: Value,
    },
    Response {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Call {
        id: u64,
        call: String,
        #[serde(default)]
        args: Value,
    },
}

type Pending = Arc<DashMap<u64, oneshot::Sender<Result<Value, SandboxError>>>>;

/// Starts dapps as local child processes.
#[derive(Debug, Default, Clone)]
pub struct ProcessSandboxRuntime;

impl ProcessSandboxRuntime {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SandboxRuntime for ProcessSandboxRuntime {
    async fn start(&self, spec: LaunchSpec) -> Result<StartedSandbox, SandboxError> {
        let mut child = Command::new(&spec.interpreter)
            .arg(&spec.entry_point)
            .args(&spec.params)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SandboxError::SpawnFailed(format!(
                    "Failed to spawn {} for {}: {}",
                    spec.interpreter, spec.application_id, e
                ))
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                return Err(SandboxError::SpawnFailed(format!(
                    "Sandbox stdio unavailable for {}",
                    spec.application_id
                )))
            }
        };
        if let Some(stderr) = child.stderr.take() {
            let dapp_id = spec.application_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(dapp_id = %dapp_id, line = %line, "Sandbox stderr");
                }
            });
        }

        let pending: Pending = Arc::new(DashMap::new());
        let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = watch::channel(false);

        tokio::spawn(write_frames(stdin, outbound_rx));
        tokio::spawn(read_frames(
            stdout,
            spec.application_id.clone(),
            pending.clone(),
            events_tx.clone(),
            outbound_tx.clone(),
        ));
        tokio::spawn(supervise(
            child,
            spec.application_id.clone(),
            kill_rx,
            pending.clone(),
            events_tx,
            exited_tx,
        ));

        info!(
            dapp_id = %spec.application_id,
            instance_id = %spec.instance_id,
            "Sandbox process started"
        );

        Ok(StartedSandbox {
            handle: Arc::new(ProcessSandboxHandle {
                instance_id: spec.instance_id,
                outbound: outbound_tx,
                pending,
                next_id: AtomicU64::new(1),
                kill: Mutex::new(Some(kill_tx)),
                exited: exited_rx,
            }),
            events: events_rx,
        })
    }
}

async fn write_frames(mut stdin: ChildStdin, mut outbound: mpsc::Receiver<Frame>) {
    while let Some(frame) = outbound.recv().await {
        let mut line = match serde_json::to_vec(&frame) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to encode sandbox frame");
                continue;
            }
        };
        line.push(b'\n');
        if stdin.write_all(&line).await.is_err() || stdin.flush().await.is_err() {
            break;
        }
    }
}

async fn read_frames(
    stdout: ChildStdout,
    dapp_id: String,
    pending: Pending,
    events: mpsc::Sender<SandboxEvent>,
    outbound: mpsc::Sender<Frame>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                let _ = events.send(SandboxEvent::Error(e.to_string())).await;
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Frame>(&line) {
            Ok(Frame::Response { id, result, error }) => {
                let Some((_, reply)) = pending.remove(&id) else {
                    warn!(dapp_id = %dapp_id, id, "Response for unknown sandbox request");
                    continue;
                };
                let outcome = match error {
                    Some(message) => Err(SandboxError::Remote(message)),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                let _ = reply.send(outcome);
            }
            Ok(Frame::Call { id, call, args }) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                let call = SandboxCall {
                    call,
                    args,
                    application_id: dapp_id.clone(),
                };
                if events.send(SandboxEvent::Call { call, reply: reply_tx }).await.is_err() {
                    break;
                }
                let outbound = outbound.clone();
                tokio::spawn(async move {
                    let frame = match reply_rx.await {
                        Ok(Ok(result)) => Frame::Response {
                            id,
                            result: Some(result),
                            error: None,
                        },
                        Ok(Err(error)) => Frame::Response {
                            id,
                            result: None,
                            error: Some(error),
                        },
                        Err(_) => Frame::Response {
                            id,
                            result: None,
                            error: Some(SandboxError::Terminated.to_string()),
                        },
                    };
                    let _ = outbound.send(frame).await;
                });
            }
            Ok(Frame::Request { .. }) => {
                warn!(dapp_id = %dapp_id, "Sandbox sent a request frame; ignoring");
            }
            Err(e) => {
                warn!(dapp_id = %dapp_id, error = %e, "Malformed sandbox frame");
            }
        }
    }
}

async fn supervise(
    mut child: Child,
    dapp_id: String,
    kill: oneshot::Receiver<()>,
    pending: Pending,
    events: mpsc::Sender<SandboxEvent>,
    exited: watch::Sender<bool>,
) {
    let natural_exit = tokio::select! {
        status = child.wait() => Some(status),
        _ = kill => None,
    };

    match natural_exit {
        None => {
            if let Err(e) = child.kill().await {
                warn!(dapp_id = %dapp_id, error = %e, "Failed to kill sandbox process");
            }
            // Outstanding requests resolve as Terminated once their senders drop.
            let _ = exited.send(true);
            pending.clear();
        }
        Some(status) => {
            let _ = exited.send(true);
            pending.clear();
            let event = match status {
                Ok(status) => {
                    info!(dapp_id = %dapp_id, code = ?status.code(), "Sandbox process exited");
                    SandboxEvent::Exit { code: status.code() }
                }
                Err(e) => SandboxEvent::Error(e.to_string()),
            };
            let _ = events.send(event).await;
        }
    }
}

pub struct ProcessSandboxHandle {
    instance_id: Uuid,
    outbound: mpsc::Sender<Frame>,
    pending: Pending,
    next_id: AtomicU64,
    kill: Mutex<Option<oneshot::Sender<()>>>,
    exited: watch::Receiver<bool>,
}

#[async_trait]
impl SandboxHandle for ProcessSandboxHandle {
    fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    async fn request(&self, request: SandboxRequest) -> Result<Value, SandboxError> {
        if *self.exited.borrow() {
            return Err(SandboxError::Terminated);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.insert(id, reply_tx);
        // `exited` is raised before `pending` is cleared, so an insert that
        // missed the clear sees the flag here.
        if *self.exited.borrow() {
            self.pending.remove(&id);
            return Err(SandboxError::Terminated);
        }

        let frame = Frame::Request {
            id,
            method: request.method,
            path: request.path,
            query: request.query,
        };
        if self.outbound.send(frame).await.is_err() {
            self.pending.remove(&id);
            return Err(SandboxError::Terminated);
        }
        reply_rx.await.unwrap_or(Err(SandboxError::Terminated))
    }

    async fn stop(&self) -> Result<(), SandboxError> {
        let kill = self.kill.lock().take();
        if let Some(kill) = kill {
            let _ = kill.send(());
        }
        let mut exited = self.exited.clone();
        // A closed channel means the supervisor is gone, which is also stopped.
        let _ = exited.wait_for(|done| *done).await;
        Ok(())
    }
}
