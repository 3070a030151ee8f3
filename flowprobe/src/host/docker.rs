//! Real host runtime backend driving the `docker` CLI.

use std::net::IpAddr;

use async_trait::async_trait;

use super::traits::HostRuntime;
use crate::command::run_command;
use crate::error::{HarnessError, HarnessResult};

/// Image booted for simulated gateway hosts; needs `ip` tooling.
pub const HOST_IMAGE: &str = "centos";

/// Host runtime backend driving the `docker` CLI.
#[derive(Clone, Debug)]
pub struct DockerRuntime {
    program: String,
    image: String,
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerRuntime {
    /// Backend invoking `docker` from the path with the default image.
    pub fn new() -> Self {
        Self {
            program: "docker".to_string(),
            image: HOST_IMAGE.to_string(),
        }
    }

    /// Backend booting hosts from an explicit image.
    pub fn with_image(image: &str) -> Self {
        Self {
            image: image.to_string(),
            ..Self::new()
        }
    }
}

#[async_trait]
impl HostRuntime for DockerRuntime {
    async fn create_host(&self, name: &str) -> HarnessResult<()> {
        run_command(
            &self.program,
            &["run", "-itd", "--privileged", "--name", name, &self.image],
        )
        .await?;
        Ok(())
    }

    async fn host_address(&self, name: &str) -> HarnessResult<IpAddr> {
        let output = run_command(
            &self.program,
            &[
                "inspect",
                "-f",
                "{{ .NetworkSettings.IPAddress }}",
                name,
            ],
        )
        .await?;
        // inspect appends a trailing newline
        let trimmed = output.trim();
        trimmed
            .parse()
            .map_err(|_| HarnessError::ExternalCommand {
                command: format!("{} inspect {name}", self.program),
                reason: format!("output {trimmed:?} is not a valid address"),
            })
    }

    async fn run_in_host(&self, name: &str, command: &[String]) -> HarnessResult<String> {
        let mut args = vec!["exec", name];
        args.extend(command.iter().map(String::as_str));
        run_command(&self.program, &args).await
    }

    async fn remove_host(&self, name: &str) -> HarnessResult<()> {
        run_command(&self.program, &["rm", "-f", name]).await?;
        Ok(())
    }
}
