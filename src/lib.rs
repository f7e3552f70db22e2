//! Short-lived Docker containers as typed fixtures for integration tests.
//!
//! The crate provides the lifecycle engine service fixtures are built on:
//!
//! - [`ports`]: logical container ports and the host ports they are
//!   published on, with random and one-to-one allocation strategies.
//! - [`environment`]: container environment resolved at start time, so a
//!   variable can embed the container's own published port.
//! - [`matcher`]: line predicates for log-based readiness.
//! - [`container`]: pull, create, start, await output, stop and remove one
//!   container.
//! - [`group`]: several containers on a private network, started in order
//!   and torn down in reverse, with hooks around each transition.
//!
//! ```rust,no_run
//! use docker_testsuite::{Container, ContainerSpec, Context, Matcher, PortBindings, Protocol};
//!
//! # async fn example() -> docker_testsuite::Result<()> {
//! let ports = PortBindings::new()?.port_dnat(Protocol::Tcp, 5555)?;
//! let spec = ContainerSpec::new("echo", docker_testsuite::images::ECHO_SERVER, ports)
//!     .with_env(docker_testsuite::Environment::new().string_var("ADDR", ":5555"));
//!
//! let mut echo = Container::new(spec).await?;
//! let ctx = Context::with_timeout(std::time::Duration::from_secs(60));
//!
//! echo.run(&ctx).await?;
//! echo.await_output(&ctx, &Matcher::substring("running GRPC echo server")).await?;
//! let addr = echo.url(Protocol::Tcp, 5555)?;
//! println!("echo server at {addr}");
//! echo.close(&ctx).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod container;
pub mod context;
pub mod engine;
pub mod environment;
pub mod error;
pub mod group;
pub mod images;
pub mod matcher;
pub mod ports;
pub mod testing;

pub use config::{DockerHost, FixtureConfig};
pub use container::{Container, ContainerInfo, ContainerSpec, ContainerState};
pub use context::Context;
pub use engine::{BollardEngine, DockerEngine, connect_docker};
pub use environment::Environment;
pub use error::{ConfigError, ContainerError, ContextError, Error, GroupError, PortError, Result};
pub use group::{Application, AwaitOutputHook, Group, Hook, HookType, hook_fn};
pub use matcher::Matcher;
pub use ports::{
    DirectPortAllocator, HostPort, PortAllocator, PortBindings, PortSpec, Protocol,
    RandomPortAllocator,
};
