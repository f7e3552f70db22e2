//! Test doubles for driving containers and groups without a docker daemon.
//!
//! Provides:
//! - [`FakeEngine`]: a recording [`DockerEngine`] with scripted log output
//! - [`StaticContainerInfo`]: a fixed [`ContainerInfo`] for environment tests
//! - [`init_test_tracing`]: idempotent trace-level subscriber for tests
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docker_testsuite::testing::FakeEngine;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let engine = Arc::new(FakeEngine::new().with_logs(["ready"]));
//!     // Container::with_engine(engine.clone(), ...)
//!     // assert on engine.calls()
//! }
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{Config, LogOutput};
use bollard::errors::Error as DockerError;
use bytes::Bytes;
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use crate::container::ContainerInfo;
use crate::engine::{DockerEngine, LogStream};
use crate::error::PortError;
use crate::ports::{PortSpec, Protocol};

/// One call made against a [`FakeEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Ping,
    ListImages,
    PullImage {
        image: String,
    },
    CreateContainer {
        id: String,
        image: String,
        env: Vec<String>,
        cmd: Option<Vec<String>>,
        /// `(container port, host port)` pairs, sorted.
        port_bindings: Vec<(String, String)>,
    },
    ConnectNetwork {
        network_id: String,
        container_id: String,
        aliases: Vec<String>,
    },
    StartContainer {
        id: String,
    },
    StopContainer {
        id: String,
        timeout: Duration,
    },
    RemoveContainer {
        id: String,
    },
    Logs {
        id: String,
        follow: bool,
    },
    CreateNetwork {
        id: String,
        name: String,
        internal: bool,
        attachable: bool,
    },
    RemoveNetwork {
        id: String,
    },
}

impl EngineCall {
    /// Name of the engine operation, as accepted by [`FakeEngine::fail_on`].
    pub fn op(&self) -> &'static str {
        match self {
            EngineCall::Ping => "ping",
            EngineCall::ListImages => "list_image_tags",
            EngineCall::PullImage { .. } => "pull_image",
            EngineCall::CreateContainer { .. } => "create_container",
            EngineCall::ConnectNetwork { .. } => "connect_network",
            EngineCall::StartContainer { .. } => "start_container",
            EngineCall::StopContainer { .. } => "stop_container",
            EngineCall::RemoveContainer { .. } => "remove_container",
            EngineCall::Logs { .. } => "logs",
            EngineCall::CreateNetwork { .. } => "create_network",
            EngineCall::RemoveNetwork { .. } => "remove_network",
        }
    }
}

/// In-process [`DockerEngine`] for tests.
///
/// Supports:
/// - Call recording via [`calls()`](Self::calls) and [`ops()`](Self::ops)
/// - Scripted log frames, shared or per container ID
/// - Counting frames handed out via [`frames_consumed()`](Self::frames_consumed)
/// - Failing or stalling a named operation
///
/// Container IDs are `container-1`, `container-2`, ... in creation order;
/// network IDs are `network-1`, ...
#[derive(Default)]
pub struct FakeEngine {
    calls: Mutex<Vec<EngineCall>>,
    local_images: Mutex<Vec<String>>,
    default_logs: Vec<Bytes>,
    container_logs: Mutex<HashMap<String, Vec<Bytes>>>,
    hold_logs_open: bool,
    failing: Mutex<HashSet<String>>,
    stalling: Mutex<HashSet<String>>,
    frames_consumed: Arc<AtomicUsize>,
    next_container: AtomicUsize,
    next_network: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags reported as already present locally.
    pub fn with_local_images<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.local_images).extend(tags.into_iter().map(Into::into));
        self
    }

    /// Log output for every container, one frame per item.
    ///
    /// Items are sent verbatim; add a trailing `\n` per line, or rely on
    /// [`with_log_lines`](Self::with_log_lines).
    pub fn with_log_frames<I, B>(mut self, frames: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        self.default_logs = frames.into_iter().map(Into::into).collect();
        self
    }

    /// Log output for every container, one newline-terminated line per frame.
    pub fn with_log_lines<I, S>(self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let frames: Vec<Bytes> = lines
            .into_iter()
            .map(|line| Bytes::from(format!("{}\n", line.as_ref())))
            .collect();
        self.with_log_frames(frames)
    }

    /// Alias of [`with_log_lines`](Self::with_log_lines).
    pub fn with_logs<I, S>(self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.with_log_lines(lines)
    }

    /// Log lines for one container ID, overriding the shared script.
    pub fn set_container_logs<I, S>(&self, container_id: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let frames = lines
            .into_iter()
            .map(|line| Bytes::from(format!("{}\n", line.as_ref())))
            .collect();
        lock(&self.container_logs).insert(container_id.to_string(), frames);
    }

    /// Keep followed log streams open after the scripted frames.
    pub fn hold_logs_open(mut self) -> Self {
        self.hold_logs_open = true;
        self
    }

    /// Make every call of `op` fail with a server error.
    pub fn fail_on(&self, op: &str) {
        lock(&self.failing).insert(op.to_string());
    }

    /// Make every call of `op` hang forever.
    pub fn stall_on(&self, op: &str) {
        lock(&self.stalling).insert(op.to_string());
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<EngineCall> {
        lock(&self.calls).clone()
    }

    /// Operation names of every recorded call, in order.
    pub fn ops(&self) -> Vec<&'static str> {
        lock(&self.calls).iter().map(EngineCall::op).collect()
    }

    /// Log frames handed out so far across all streams.
    pub fn frames_consumed(&self) -> usize {
        self.frames_consumed.load(Ordering::SeqCst)
    }

    async fn record(&self, call: EngineCall) -> Result<(), DockerError> {
        let op = call.op();
        lock(&self.calls).push(call);

        let stall = lock(&self.stalling).contains(op);
        if stall {
            futures::future::pending::<()>().await;
        }
        let fail = lock(&self.failing).contains(op);
        if fail {
            return Err(server_error(op));
        }
        Ok(())
    }
}

#[async_trait]
impl DockerEngine for FakeEngine {
    async fn ping(&self) -> Result<(), DockerError> {
        self.record(EngineCall::Ping).await
    }

    async fn list_image_tags(&self) -> Result<Vec<String>, DockerError> {
        self.record(EngineCall::ListImages).await?;
        Ok(lock(&self.local_images).clone())
    }

    async fn pull_image(&self, image: &str) -> Result<(), DockerError> {
        self.record(EngineCall::PullImage {
            image: image.to_string(),
        })
        .await?;

        let mut images = lock(&self.local_images);
        if !images.iter().any(|tag| tag == image) {
            images.push(image.to_string());
        }
        Ok(())
    }

    async fn create_container(&self, config: Config<String>) -> Result<String, DockerError> {
        let id = format!(
            "container-{}",
            self.next_container.fetch_add(1, Ordering::SeqCst) + 1
        );

        let mut port_bindings: Vec<(String, String)> = config
            .host_config
            .as_ref()
            .and_then(|hc| hc.port_bindings.as_ref())
            .map(|bindings| {
                bindings
                    .iter()
                    .flat_map(|(port, list)| {
                        list.iter().flatten().map(move |b| {
                            (port.clone(), b.host_port.clone().unwrap_or_default())
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        port_bindings.sort();

        self.record(EngineCall::CreateContainer {
            id: id.clone(),
            image: config.image.unwrap_or_default(),
            env: config.env.unwrap_or_default(),
            cmd: config.cmd,
            port_bindings,
        })
        .await?;
        Ok(id)
    }

    async fn connect_network(
        &self,
        network_id: &str,
        container_id: &str,
        aliases: Vec<String>,
    ) -> Result<(), DockerError> {
        self.record(EngineCall::ConnectNetwork {
            network_id: network_id.to_string(),
            container_id: container_id.to_string(),
            aliases,
        })
        .await
    }

    async fn start_container(&self, container_id: &str) -> Result<(), DockerError> {
        self.record(EngineCall::StartContainer {
            id: container_id.to_string(),
        })
        .await
    }

    async fn stop_container(
        &self,
        container_id: &str,
        timeout: Duration,
    ) -> Result<(), DockerError> {
        self.record(EngineCall::StopContainer {
            id: container_id.to_string(),
            timeout,
        })
        .await
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), DockerError> {
        self.record(EngineCall::RemoveContainer {
            id: container_id.to_string(),
        })
        .await
    }

    fn logs(&self, container_id: &str, follow: bool) -> LogStream {
        lock(&self.calls).push(EngineCall::Logs {
            id: container_id.to_string(),
            follow,
        });

        if lock(&self.failing).contains("logs") {
            return Box::pin(futures::stream::iter(vec![Err::<LogOutput, _>(
                server_error("logs"),
            )]));
        }

        let frames = lock(&self.container_logs)
            .get(container_id)
            .cloned()
            .unwrap_or_else(|| self.default_logs.clone());
        let counter = Arc::clone(&self.frames_consumed);

        let scripted = futures::stream::iter(frames)
            .map(|message| Ok::<_, DockerError>(LogOutput::StdOut { message }))
            .inspect(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        if follow && self.hold_logs_open {
            Box::pin(scripted.chain(futures::stream::pending()))
        } else {
            Box::pin(scripted)
        }
    }

    async fn create_network(
        &self,
        name: &str,
        internal: bool,
        attachable: bool,
    ) -> Result<String, DockerError> {
        let id = format!(
            "network-{}",
            self.next_network.fetch_add(1, Ordering::SeqCst) + 1
        );
        self.record(EngineCall::CreateNetwork {
            id: id.clone(),
            name: name.to_string(),
            internal,
            attachable,
        })
        .await?;
        Ok(id)
    }

    async fn remove_network(&self, network_id: &str) -> Result<(), DockerError> {
        self.record(EngineCall::RemoveNetwork {
            id: network_id.to_string(),
        })
        .await
    }
}

/// [`ContainerInfo`] with a fixed host IP and port table.
#[derive(Debug, Clone, Default)]
pub struct StaticContainerInfo {
    docker_host_ip: String,
    ports: BTreeMap<PortSpec, u16>,
}

impl StaticContainerInfo {
    pub fn new(docker_host_ip: impl Into<String>) -> Self {
        Self {
            docker_host_ip: docker_host_ip.into(),
            ports: BTreeMap::new(),
        }
    }

    pub fn with_port(mut self, spec: PortSpec, external: u16) -> Self {
        self.ports.insert(spec, external);
        self
    }
}

impl ContainerInfo for StaticContainerInfo {
    fn external_port(&self, protocol: Protocol, port: u16) -> Result<u16, PortError> {
        let spec = PortSpec::new(protocol, port);
        self.ports
            .get(&spec)
            .copied()
            .ok_or(PortError::NotRegistered { spec })
    }

    fn docker_host_ip(&self) -> Result<&str, PortError> {
        if self.docker_host_ip.is_empty() {
            return Err(PortError::DockerHostIpUnresolved);
        }
        Ok(&self.docker_host_ip)
    }
}

/// Install a trace-level fmt subscriber for tests.
///
/// Honours `RUST_LOG` when set. Safe to call from every test; only the
/// first call installs anything.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("docker_testsuite=trace"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn server_error(op: &str) -> DockerError {
    DockerError::DockerResponseServerError {
        status_code: 500,
        message: format!("{op} failed"),
    }
}
