//! Single-container lifecycle.
//!
//! A [`Container`] moves through `Unstarted -> Created -> Running -> Closed`:
//!
//! ```text
//!   run(): pull image (if missing or :latest)
//!            -> resolve environment against the allocated ports
//!            -> create (env, cmd, exposed ports, host port bindings)
//!            -> connect to the group network, if one was attached
//!            -> start
//!   await_output(): follow the logs until a line matches
//!   close(): stop (context deadline or default timeout) -> remove with volumes
//! ```
//!
//! Nothing is rolled back on failure. A container that was created before
//! a later step failed still has to be closed by the caller.

mod info;
mod logs;
mod spec;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bollard::container::Config;
use bollard::errors::Error as DockerError;

pub use info::ContainerInfo;
pub use spec::ContainerSpec;

use crate::config::{DockerHost, FixtureConfig};
use crate::container::info::BindingsInfo;
use crate::container::logs::LogLines;
use crate::context::Context;
use crate::engine::{BollardEngine, DockerEngine};
use crate::environment::Environment;
use crate::error::ContainerError;
use crate::matcher::Matcher;
use crate::ports::{HostPort, PortBindings, PortSpec, Protocol};

/// Lifecycle state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// Not created yet.
    Unstarted,
    /// Created by the engine but not started.
    Created,
    /// Started.
    Running,
    /// Stopped and removed.
    Closed,
}

/// A container owned by a test.
///
/// Not synchronised: drive one container from one task at a time.
pub struct Container {
    engine: Arc<dyn DockerEngine>,
    docker_host: DockerHost,
    stop_timeout: Duration,

    name: String,
    image: String,
    cmd: Vec<String>,
    env: Environment,
    ports: PortBindings,

    container_id: Option<String>,
    network_id: Option<String>,
    state: ContainerState,
}

impl Container {
    /// Create a container handle connected to the local docker engine.
    pub async fn new(spec: ContainerSpec) -> Result<Self, ContainerError> {
        let config = FixtureConfig::resolve()?;
        let engine = BollardEngine::connect().await?;
        Ok(Self::with_engine(engine, config, spec))
    }

    /// Create a container handle on an existing engine client.
    ///
    /// The engine may be shared between containers; image listing and
    /// pulling are synchronised by the engine itself.
    pub fn with_engine(
        engine: Arc<dyn DockerEngine>,
        config: FixtureConfig,
        spec: ContainerSpec,
    ) -> Self {
        tracing::debug!(name = %spec.name, image = %spec.image, "initializing container");

        let FixtureConfig {
            docker_host,
            stop_timeout,
            ..
        } = config;

        Self {
            engine,
            docker_host,
            stop_timeout,
            name: spec.name,
            image: spec.image,
            cmd: spec.cmd,
            env: spec.env,
            ports: spec.ports,
            container_id: None,
            network_id: None,
            state: ContainerState::Unstarted,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    /// Engine ID, once the container has been created.
    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    pub fn network_id(&self) -> Option<&str> {
        self.network_id.as_deref()
    }

    pub fn ports(&self) -> &PortBindings {
        &self.ports
    }

    /// Record a network to join on `run()`. Nothing is validated here.
    pub fn network_attach(&mut self, network_id: impl Into<String>) {
        self.network_id = Some(network_id.into());
    }

    /// Ping the docker engine.
    pub async fn ping(&self, ctx: &Context) -> Result<(), ContainerError> {
        self.with_context(ctx, self.engine.ping())
            .await?
            .map_err(|e| ContainerError::DockerNotAvailable {
                reason: e.to_string(),
            })
    }

    /// Pull, create, attach and start the container.
    pub async fn run(&mut self, ctx: &Context) -> Result<(), ContainerError> {
        self.pull_image(ctx).await?;

        let env = {
            let info = BindingsInfo::new(&self.ports, self.docker_host.ip());
            self.env
                .eval(&info)
                .map_err(|(var, source)| ContainerError::Environment {
                    name: self.name.clone(),
                    var,
                    source,
                })?
        };

        let config = Config {
            image: Some(self.image.clone()),
            env: Some(env),
            cmd: if self.cmd.is_empty() {
                None
            } else {
                Some(self.cmd.clone())
            },
            exposed_ports: Some(self.ports.exposed_ports()),
            host_config: Some(self.ports.host_config()),
            ..Default::default()
        };

        let container_id = self
            .with_context(ctx, self.engine.create_container(config))
            .await?
            .map_err(|e| ContainerError::Create {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!(name = %self.name, id = %container_id, "container created");
        self.container_id = Some(container_id.clone());
        self.state = ContainerState::Created;

        if let Some(network_id) = self.network_id.clone() {
            self.with_context(
                ctx,
                self.engine
                    .connect_network(&network_id, &container_id, vec![self.name.clone()]),
            )
            .await?
            .map_err(|e| ContainerError::NetworkConnect {
                name: self.name.clone(),
                network: network_id.clone(),
                reason: e.to_string(),
            })?;

            tracing::debug!(name = %self.name, network = %network_id, "container attached to network");
        }

        self.with_context(ctx, self.engine.start_container(&container_id))
            .await?
            .map_err(|e| ContainerError::Start {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;

        self.state = ContainerState::Running;
        tracing::info!("Started container: {} ({})", self.name, self.image);
        Ok(())
    }

    /// Block until a log line satisfies `matcher`.
    ///
    /// Follows stdout and stderr. Returns as soon as a line matches without
    /// reading further. A log stream that closes cleanly (the container
    /// exited) also ends the wait successfully. The wait has no timeout of
    /// its own; it ends when the context does.
    pub async fn await_output(&self, ctx: &Context, matcher: &Matcher) -> Result<(), ContainerError> {
        let container_id = self.require_created()?;
        let mut lines = LogLines::new(self.engine.logs(container_id, true));

        loop {
            let next = tokio::select! {
                biased;
                err = ctx.done() => {
                    return Err(ContainerError::Cancelled {
                        name: self.name.clone(),
                        source: err,
                    });
                }
                next = lines.next_line() => next,
            };

            match next {
                Some(Ok(line)) => {
                    tracing::trace!(name = %self.name, line = %line, "processing log line");
                    if matcher.matches(&line) {
                        return Ok(());
                    }
                }
                Some(Err(e)) => return Err(self.logs_error(e)),
                None => {
                    tracing::debug!(name = %self.name, "log stream closed without a match");
                    return Ok(());
                }
            }
        }
    }

    /// Every line of the log so far that satisfies `matcher`, in order.
    ///
    /// Reads a snapshot of the log (no follow), so it returns once the
    /// engine has sent everything written up to now.
    pub async fn get_output(
        &self,
        ctx: &Context,
        matcher: &Matcher,
    ) -> Result<Vec<String>, ContainerError> {
        let container_id = self.require_created()?;
        let mut lines = LogLines::new(self.engine.logs(container_id, false));
        let mut matched = Vec::new();

        loop {
            let next = tokio::select! {
                biased;
                err = ctx.done() => {
                    return Err(ContainerError::Cancelled {
                        name: self.name.clone(),
                        source: err,
                    });
                }
                next = lines.next_line() => next,
            };

            match next {
                Some(Ok(line)) => {
                    if matcher.matches(&line) {
                        matched.push(line);
                    }
                }
                Some(Err(e)) => return Err(self.logs_error(e)),
                None => return Ok(matched),
            }
        }
    }

    /// Host and port a container port is reachable on.
    pub fn url(&self, protocol: Protocol, port: u16) -> Result<HostPort, ContainerError> {
        self.require_created()?;

        let spec = PortSpec::new(protocol, port);
        let host_port = self.ports.external_port(spec)?;

        Ok(HostPort {
            host: self.docker_host.ip().to_string(),
            port: host_port,
        })
    }

    /// Stop and remove the container (with its volumes).
    ///
    /// The stop timeout is the time left on the context, or the configured
    /// default when the context has no deadline. Closing twice is not
    /// guarded against; the second call fails in the engine.
    pub async fn close(&mut self, ctx: &Context) -> Result<(), ContainerError> {
        let container_id = self.require_created()?.to_string();
        let timeout = ctx.remaining().unwrap_or(self.stop_timeout);

        tracing::info!("Stopping container: {}", self.name);

        self.engine
            .stop_container(&container_id, timeout)
            .await
            .map_err(|e| ContainerError::Stop {
                name: self.name.clone(),
                timeout,
                reason: e.to_string(),
            })?;

        self.engine
            .remove_container(&container_id)
            .await
            .map_err(|e| ContainerError::Remove {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;

        self.state = ContainerState::Closed;
        tracing::info!("Removed container: {}", self.name);
        Ok(())
    }

    async fn pull_image(&self, ctx: &Context) -> Result<(), ContainerError> {
        let is_latest = self.image.ends_with(":latest");

        let tags = self
            .with_context(ctx, self.engine.list_image_tags())
            .await?
            .map_err(|e| ContainerError::ImageList {
                reason: e.to_string(),
            })?;
        let present = tags.iter().any(|tag| tag == &self.image);

        if present && !is_latest {
            tracing::debug!("Image '{}' exists locally", self.image);
            return Ok(());
        }

        tracing::info!("Pulling image: {}", self.image);
        self.with_context(ctx, self.engine.pull_image(&self.image))
            .await?
            .map_err(|e| ContainerError::ImagePull {
                image: self.image.clone(),
                reason: e.to_string(),
            })?;
        tracing::info!("Pulled image: {}", self.image);
        Ok(())
    }

    fn require_created(&self) -> Result<&str, ContainerError> {
        self.container_id
            .as_deref()
            .ok_or_else(|| ContainerError::NotCreated {
                name: self.name.clone(),
            })
    }

    fn logs_error(&self, e: DockerError) -> ContainerError {
        ContainerError::Logs {
            name: self.name.clone(),
            reason: e.to_string(),
        }
    }

    /// Run an engine call unless the context ends first.
    async fn with_context<T>(
        &self,
        ctx: &Context,
        fut: impl Future<Output = T>,
    ) -> Result<T, ContainerError> {
        tokio::select! {
            biased;
            err = ctx.done() => Err(ContainerError::Cancelled {
                name: self.name.clone(),
                source: err,
            }),
            out = fut => Ok(out),
        }
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name)
            .field("image", &self.image)
            .field("container_id", &self.container_id)
            .field("network_id", &self.network_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
