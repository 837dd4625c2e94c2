//! Host-process launcher: spawns the phase's command as a child process in
//! its own process group, captures stdout/stderr onto a dedicated log-drain
//! task, and escalates SIGTERM to SIGKILL on a bounded graceful timeout.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use flume::Receiver;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::error::OrchestratorError;
use crate::launcher::traits::{InstanceRef, Launcher};
use crate::topology::{Phase, PhaseKind};

const LOG_CHANNEL_CAPACITY: usize = 1024;

struct RunningInstance {
    child: Child,
    log_rx: Receiver<String>,
}

pub struct HostProcessLauncher {
    instances: Mutex<HashMap<InstanceRef, RunningInstance>>,
}

impl HostProcessLauncher {
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for HostProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Launcher for HostProcessLauncher {
    async fn spawn(
        &self,
        phase: &Phase,
        replica_id: u32,
        env: HashMap<String, String>,
    ) -> Result<InstanceRef, OrchestratorError> {
        let PhaseKind::HostProcess { command } = &phase.kind else {
            return Err(OrchestratorError::SpawnFailed {
                phase: phase.name.clone(),
                replica_id,
                source: anyhow::anyhow!("phase '{}' is not a host_process phase", phase.name),
            });
        };
        let Some((program, args)) = command.split_first() else {
            return Err(OrchestratorError::SpawnFailed {
                phase: phase.name.clone(),
                replica_id,
                source: anyhow::anyhow!("phase '{}' has an empty command", phase.name),
            });
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(env)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let instance = InstanceRef::new(phase.name.clone(), replica_id);
        let mut child = cmd.spawn().map_err(|e| OrchestratorError::SpawnFailed {
            phase: phase.name.clone(),
            replica_id,
            source: anyhow::Error::new(e),
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (log_tx, log_rx) = flume::bounded(LOG_CHANNEL_CAPACITY);
        let label = instance.label();
        tokio::spawn(drain_logs(label, stdout, stderr, log_tx));

        self.instances
            .lock()
            .await
            .insert(instance.clone(), RunningInstance { child, log_rx });

        Ok(instance)
    }

    async fn is_alive(&self, instance: &InstanceRef) -> bool {
        let mut instances = self.instances.lock().await;
        let Some(running) = instances.get_mut(instance) else {
            return false;
        };
        matches!(running.child.try_wait(), Ok(None))
    }

    async fn terminate(
        &self,
        instance: &InstanceRef,
        graceful_timeout: Duration,
    ) -> Result<(), OrchestratorError> {
        let pid = {
            let instances = self.instances.lock().await;
            instances.get(instance).and_then(|r| r.child.id())
        };
        let Some(pid) = pid else {
            return Ok(());
        };

        send_signal(pid, "-TERM").await;

        let deadline = tokio::time::Instant::now() + graceful_timeout;
        loop {
            if !self.is_alive(instance).await {
                self.instances.lock().await.remove(instance);
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        tracing::warn!(instance = %instance.label(), "graceful stop timed out, sending SIGKILL");
        send_signal(pid, "-KILL").await;
        let mut instances = self.instances.lock().await;
        if let Some(mut running) = instances.remove(instance) {
            let _ = running.child.wait().await;
        }
        Ok(())
    }

    async fn log_receiver(&self, instance: &InstanceRef) -> Option<Receiver<String>> {
        self.instances
            .lock()
            .await
            .get(instance)
            .map(|r| r.log_rx.clone())
    }
}

/// Signals the whole process group (`-pid`) rather than just the child, so
/// anything it forked dies with it. Shelled through `kill` rather than a
/// signal crate dependency, mirroring the launcher's other variant shelling
/// out to a container CLI.
async fn send_signal(pid: u32, signal: &str) {
    let target = format!("-{pid}");
    if let Err(e) = Command::new("kill").arg(signal).arg(&target).status().await {
        tracing::warn!(pid, signal, error = %e, "failed to invoke kill");
    }
}

async fn drain_logs(
    label: String,
    stdout: Option<tokio::process::ChildStdout>,
    stderr: Option<tokio::process::ChildStderr>,
    tx: flume::Sender<String>,
) {
    let stdout_task = stdout.map(|out| {
        let tx = tx.clone();
        let label = label.clone();
        tokio::spawn(drain_one(label, "stdout", BufReader::new(out), tx))
    });
    let stderr_task = stderr.map(|err| tokio::spawn(drain_one(label, "stderr", BufReader::new(err), tx)));

    if let Some(task) = stdout_task {
        let _ = task.await;
    }
    if let Some(task) = stderr_task {
        let _ = task.await;
    }
}

async fn drain_one<R: tokio::io::AsyncRead + Unpin>(
    label: String,
    source: &'static str,
    reader: BufReader<R>,
    tx: flume::Sender<String>,
) {
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send_async(format!("[{label}/{source}] {line}")).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(instance = %label, error = %e, "log drain read failed");
                break;
            }
        }
    }
}
