//! Container launcher: shells out to an external container CLI
//! (podman/docker-compatible), grounded on the `run`/`stop`/`rm`/`inspect`
//! surface spec §6 documents and on `replidev::podman`'s command-building
//! style.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use flume::Receiver;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::error::OrchestratorError;
use crate::launcher::traits::{InstanceRef, Launcher};
use crate::topology::{Phase, PhaseKind};

pub struct ContainerLauncher {
    /// Name of the container CLI binary (`podman`, `docker`, ...).
    cli: String,
    /// instance -> container id returned by `run`.
    instances: Mutex<HashMap<InstanceRef, String>>,
}

impl ContainerLauncher {
    pub fn new(cli: impl Into<String>) -> Self {
        Self {
            cli: cli.into(),
            instances: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for ContainerLauncher {
    fn default() -> Self {
        Self::new("podman")
    }
}

#[async_trait]
impl Launcher for ContainerLauncher {
    async fn spawn(
        &self,
        phase: &Phase,
        replica_id: u32,
        env: HashMap<String, String>,
    ) -> Result<InstanceRef, OrchestratorError> {
        let PhaseKind::Container {
            image,
            volumes,
            resources,
        } = &phase.kind
        else {
            return Err(OrchestratorError::SpawnFailed {
                phase: phase.name.clone(),
                replica_id,
                source: anyhow::anyhow!("phase '{}' is not a container phase", phase.name),
            });
        };

        let instance = InstanceRef::new(phase.name.clone(), replica_id);
        let name = format!("bci-{}-{}", phase.name, replica_id);

        let mut cmd = Command::new(&self.cli);
        cmd.arg("run").arg("-d").arg("--name").arg(&name);

        for port in ports_from_env(&env) {
            cmd.arg("-p").arg(format!("{port}:{port}"));
        }
        for volume in volumes {
            cmd.arg("-v")
                .arg(format!("{}:{}", volume.host_path, volume.container_path));
        }
        if let Some(cpus) = resources.cpus {
            cmd.arg("--cpus").arg(cpus.to_string());
        }
        if let Some(memory) = &resources.memory {
            cmd.arg("--memory").arg(memory);
        }
        for (key, value) in &env {
            cmd.arg("-e").arg(format!("{key}={value}"));
        }
        cmd.arg(image);

        let output = cmd
            .output()
            .await
            .with_context(|| format!("failed to run container for '{}'", phase.name))
            .map_err(|source| OrchestratorError::SpawnFailed {
                phase: phase.name.clone(),
                replica_id,
                source,
            })?;
        if !output.status.success() {
            return Err(OrchestratorError::SpawnFailed {
                phase: phase.name.clone(),
                replica_id,
                source: anyhow::anyhow!(
                    "container run exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        self.instances.lock().await.insert(instance.clone(), container_id);
        Ok(instance)
    }

    async fn is_alive(&self, instance: &InstanceRef) -> bool {
        let container_id = match self.instances.lock().await.get(instance).cloned() {
            Some(id) => id,
            None => return false,
        };

        let output = Command::new(&self.cli)
            .arg("inspect")
            .arg("--format={{.State.Running}}")
            .arg(&container_id)
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {
                String::from_utf8_lossy(&out.stdout).trim() == "true"
            }
            _ => false,
        }
    }

    async fn terminate(
        &self,
        instance: &InstanceRef,
        graceful_timeout: Duration,
    ) -> Result<(), OrchestratorError> {
        let container_id = {
            let instances = self.instances.lock().await;
            instances.get(instance).cloned()
        };
        let Some(container_id) = container_id else {
            return Ok(());
        };

        let timeout_secs = graceful_timeout.as_secs().to_string();
        let _ = Command::new(&self.cli)
            .arg("stop")
            .arg("-t")
            .arg(&timeout_secs)
            .arg(&container_id)
            .status()
            .await;
        let _ = Command::new(&self.cli).arg("rm").arg(&container_id).status().await;

        self.instances.lock().await.remove(instance);
        Ok(())
    }

    /// Container runtimes own their own log sink; the core does not drain
    /// it separately.
    async fn log_receiver(&self, _instance: &InstanceRef) -> Option<Receiver<String>> {
        None
    }
}

fn ports_from_env(env: &HashMap<String, String>) -> Vec<String> {
    let mut ports: Vec<String> = env
        .iter()
        .filter(|(k, _)| k.starts_with("STREAM_") && k.ends_with("_PORT"))
        .map(|(_, v)| v.clone())
        .collect();
    ports.sort();
    ports.dedup();
    ports
}
