//! Container engine seam.
//!
//! Containers and groups never talk to bollard directly; they go through
//! [`DockerEngine`]. Production code uses [`BollardEngine`], tests use
//! [`crate::testing::FakeEngine`].

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::EndpointSettings;
use bollard::network::{ConnectNetworkOptions, CreateNetworkOptions};
use futures::{Stream, StreamExt};

use crate::error::ContainerError;

/// Stream of raw log frames (stdout and stderr interleaved).
pub type LogStream = Pin<Box<dyn Stream<Item = Result<LogOutput, DockerError>> + Send>>;

/// Operations the lifecycle engine needs from a container runtime.
#[async_trait]
pub trait DockerEngine: Send + Sync {
    async fn ping(&self) -> Result<(), DockerError>;

    /// Repo tags of every local image.
    async fn list_image_tags(&self) -> Result<Vec<String>, DockerError>;

    /// Pull an image, consuming the progress stream to completion.
    async fn pull_image(&self, image: &str) -> Result<(), DockerError>;

    /// Create a container, returning its ID.
    async fn create_container(&self, config: Config<String>) -> Result<String, DockerError>;

    async fn connect_network(
        &self,
        network_id: &str,
        container_id: &str,
        aliases: Vec<String>,
    ) -> Result<(), DockerError>;

    async fn start_container(&self, container_id: &str) -> Result<(), DockerError>;

    async fn stop_container(&self, container_id: &str, timeout: Duration)
    -> Result<(), DockerError>;

    /// Force-remove a container together with its volumes.
    async fn remove_container(&self, container_id: &str) -> Result<(), DockerError>;

    /// Log frames of a container; `follow` keeps the stream open.
    fn logs(&self, container_id: &str, follow: bool) -> LogStream;

    /// Create a network, returning its ID.
    async fn create_network(
        &self,
        name: &str,
        internal: bool,
        attachable: bool,
    ) -> Result<String, DockerError>;

    async fn remove_network(&self, network_id: &str) -> Result<(), DockerError>;
}

/// [`DockerEngine`] backed by a bollard client.
#[derive(Clone)]
pub struct BollardEngine {
    docker: Docker,
}

impl BollardEngine {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect to the local engine (see [`connect_docker`]).
    pub async fn connect() -> Result<Arc<dyn DockerEngine>, ContainerError> {
        Ok(Arc::new(Self::new(connect_docker().await?)))
    }

    pub fn docker(&self) -> &Docker {
        &self.docker
    }
}

#[async_trait]
impl DockerEngine for BollardEngine {
    async fn ping(&self) -> Result<(), DockerError> {
        self.docker.ping().await.map(|_| ())
    }

    async fn list_image_tags(&self) -> Result<Vec<String>, DockerError> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await?;

        Ok(images.into_iter().flat_map(|i| i.repo_tags).collect())
    }

    async fn pull_image(&self, image: &str) -> Result<(), DockerError> {
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            let info = result?;
            if let Some(status) = info.status {
                tracing::trace!("Pull status: {}", status);
            }
        }
        Ok(())
    }

    async fn create_container(&self, config: Config<String>) -> Result<String, DockerError> {
        let response = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await?;

        for warning in &response.warnings {
            tracing::warn!("Container create warning: {}", warning);
        }
        Ok(response.id)
    }

    async fn connect_network(
        &self,
        network_id: &str,
        container_id: &str,
        aliases: Vec<String>,
    ) -> Result<(), DockerError> {
        let options = ConnectNetworkOptions {
            container: container_id.to_string(),
            endpoint_config: EndpointSettings {
                aliases: Some(aliases),
                ..Default::default()
            },
        };
        self.docker.connect_network(network_id, options).await
    }

    async fn start_container(&self, container_id: &str) -> Result<(), DockerError> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
    }

    async fn stop_container(
        &self,
        container_id: &str,
        timeout: Duration,
    ) -> Result<(), DockerError> {
        let options = StopContainerOptions {
            t: timeout.as_secs() as i64,
        };
        self.docker.stop_container(container_id, Some(options)).await
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), DockerError> {
        let options = RemoveContainerOptions {
            v: true,
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(container_id, Some(options))
            .await
    }

    fn logs(&self, container_id: &str, follow: bool) -> LogStream {
        let options = LogsOptions::<String> {
            follow,
            stdout: true,
            stderr: true,
            ..Default::default()
        };
        Box::pin(self.docker.logs(container_id, Some(options)))
    }

    async fn create_network(
        &self,
        name: &str,
        internal: bool,
        attachable: bool,
    ) -> Result<String, DockerError> {
        let options = CreateNetworkOptions {
            name: name.to_string(),
            internal,
            attachable,
            ..Default::default()
        };
        let response = self.docker.create_network(options).await?;

        if !response.warning.is_empty() {
            tracing::warn!("Network create warning: {}", response.warning);
        }
        Ok(response.id)
    }

    async fn remove_network(&self, network_id: &str) -> Result<(), DockerError> {
        self.docker.remove_network(network_id).await
    }
}

/// Connect to the docker engine.
///
/// Tries bollard's defaults first (which honour `DOCKER_HOST`), then the
/// per-user socket locations used by rootless docker and Docker Desktop.
pub async fn connect_docker() -> Result<Docker, ContainerError> {
    let mut last_error = match Docker::connect_with_defaults() {
        Ok(docker) => match docker.ping().await {
            Ok(_) => return Ok(docker),
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };

    #[cfg(unix)]
    for socket in fallback_sockets() {
        if !socket.exists() {
            continue;
        }

        let path = socket.to_string_lossy();
        match Docker::connect_with_socket(&path, 120, bollard::API_DEFAULT_VERSION) {
            Ok(docker) => match docker.ping().await {
                Ok(_) => {
                    tracing::debug!("Connected to docker via {}", path);
                    return Ok(docker);
                }
                Err(e) => last_error = format!("{path}: {e}"),
            },
            Err(e) => last_error = format!("{path}: {e}"),
        }
    }

    Err(ContainerError::DockerNotAvailable { reason: last_error })
}

fn fallback_sockets() -> Vec<PathBuf> {
    let mut sockets = Vec::new();
    if let Some(runtime_dir) = dirs::runtime_dir() {
        sockets.push(runtime_dir.join("docker.sock"));
    }
    if let Some(home) = dirs::home_dir() {
        sockets.push(home.join(".docker/run/docker.sock"));
        sockets.push(home.join(".colima/default/docker.sock"));
    }
    sockets
}

/// Flatten a log frame into its payload bytes.
pub(crate) fn frame_bytes(frame: LogOutput) -> bytes::Bytes {
    match frame {
        LogOutput::StdOut { message }
        | LogOutput::StdErr { message }
        | LogOutput::StdIn { message }
        | LogOutput::Console { message } => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_bytes_keeps_payload() {
        let frame = LogOutput::StdErr {
            message: bytes::Bytes::from_static(b"boom\n"),
        };
        assert_eq!(&frame_bytes(frame)[..], b"boom\n");
    }

    #[test]
    fn test_fallback_sockets_are_absolute() {
        for socket in fallback_sockets() {
            assert!(socket.is_absolute(), "{}", socket.display());
        }
    }
}
