//! Docker Swarm backend driven through the `docker` CLI

use super::{async_trait, OrchestrationClient, OrchestrationError};
use tokio::process::Command;
use tracing::debug;

/// Orchestrator that shells out to `docker service ...`
#[derive(Debug, Clone)]
pub struct SwarmOrchestrator {
    program: String,
}

impl Default for SwarmOrchestrator {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl SwarmOrchestrator {
    /// Use the Docker CLI at `program` (a path or a name on `$PATH`)
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, OrchestrationError> {
        debug!(program = %self.program, args = ?args, "Running orchestrator command");

        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| OrchestrationError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(OrchestrationError::CommandFailed {
                command: format!("{} {}", self.program, args.join(" ")),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Count tasks whose `{{.CurrentState}}` reads `Running ...`
pub fn count_running_tasks(output: &str) -> u32 {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("Running"))
        .count() as u32
}

#[async_trait]
impl OrchestrationClient for SwarmOrchestrator {
    async fn scale(&self, service: &str, replicas: u32) -> Result<(), OrchestrationError> {
        let spec = format!("{}={}", service, replicas);
        self.run(&["service", "scale", "--detach", &spec]).await?;
        Ok(())
    }

    async fn healthy_replica_count(&self, service: &str) -> Result<u32, OrchestrationError> {
        let output = self
            .run(&[
                "service",
                "ps",
                service,
                "--filter",
                "desired-state=running",
                "--format",
                "{{.CurrentState}}",
            ])
            .await?;
        Ok(count_running_tasks(&output))
    }

    async fn check(&self) -> Result<(), OrchestrationError> {
        let output = self
            .run(&["info", "--format", "{{.Swarm.LocalNodeState}}"])
            .await?;
        match output.trim() {
            "active" => Ok(()),
            other => Err(OrchestrationError::UnexpectedOutput(format!(
                "swarm node state is {:?}, expected \"active\"",
                other
            ))),
        }
    }
}
