//! Error types for container fixtures.
//!
//! Each lifecycle layer has its own error enum; [`Error`] ties them
//! together for callers that drive several layers at once. Nothing in the
//! crate retries: every error is terminal to the operation that raised it,
//! and whatever was created before the failure is left for the caller to
//! release with `close()`.

use std::time::Duration;

use thiserror::Error;

use crate::ports::{PortSpec, Protocol};

/// Result type for fixture operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for the crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Group(#[from] GroupError),

    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Configuration errors (environment variables, docker host discovery).
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// `DOCKER_HOST` is set but carries no usable host component.
    #[error("malformed DOCKER_HOST value: {reason}")]
    MalformedDockerHost {
        /// The raw value found in the environment.
        value: String,
        /// What was wrong with it.
        reason: String,
    },

    /// An environment variable holds a value that cannot be parsed.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// An environment variable is set but is not valid unicode.
    #[error("Environment variable {key} is not valid unicode")]
    NotUnicode { key: String },
}

/// Port allocation and lookup errors.
#[derive(Debug, Clone, Error)]
pub enum PortError {
    /// The allocator could not obtain a free host port.
    #[error("error allocating free {protocol} port: {reason}")]
    Allocation { protocol: Protocol, reason: String },

    /// Lookup for a port that was never registered with the bindings.
    #[error("port `{spec}` is not registered")]
    NotRegistered { spec: PortSpec },

    /// A registered port without a usable external mapping.
    #[error("external port is not defined for `{spec}`")]
    Unresolved { spec: PortSpec },

    /// More than one binding where exactly one was expected.
    #[error("unexpected amount of bindings ({count}) for `{spec}`")]
    AmbiguousBinding { spec: PortSpec, count: usize },

    /// Alias points at another alias or at a key with no bindings.
    #[error("alias `{alias}` does not resolve to a registered binding (points at `{target}`)")]
    DanglingAlias { alias: PortSpec, target: PortSpec },

    /// No host IP is known for the docker engine.
    #[error("docker host IP address cannot be resolved")]
    DockerHostIpUnresolved,

    /// `port/proto` text could not be parsed.
    #[error("invalid port spec `{value}`: {reason}")]
    InvalidSpec { value: String, reason: String },
}

/// Cancellation reported by a [`crate::Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context canceled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Errors raised while driving a single container through its lifecycle.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Listing local images failed.
    #[error("error listing images: {reason}")]
    ImageList { reason: String },

    /// Pulling the image failed.
    #[error("Failed to pull image '{image}': {reason}")]
    ImagePull { image: String, reason: String },

    /// An environment resolver failed.
    #[error("error resolving environment variable `{var}` for '{name}': {source}")]
    Environment {
        name: String,
        var: String,
        #[source]
        source: PortError,
    },

    /// Creating the container failed.
    #[error("Failed to create container '{name}': {reason}")]
    Create { name: String, reason: String },

    /// Attaching the container to its group network failed.
    #[error("Failed to connect container '{name}' to network '{network}': {reason}")]
    NetworkConnect {
        name: String,
        network: String,
        reason: String,
    },

    /// Starting the container failed.
    #[error("Failed to start container '{name}': {reason}")]
    Start { name: String, reason: String },

    /// Stopping the container failed.
    #[error("Failed to stop container '{name}' (timeout {timeout:?}): {reason}")]
    Stop {
        name: String,
        timeout: Duration,
        reason: String,
    },

    /// Removing the container failed.
    #[error("Failed to remove container '{name}': {reason}")]
    Remove { name: String, reason: String },

    /// Opening or reading the log stream failed.
    #[error("error reading logs of container '{name}': {reason}")]
    Logs { name: String, reason: String },

    /// The context ended while waiting on the container.
    #[error("waiting on container '{name}' aborted: {source}")]
    Cancelled {
        name: String,
        #[source]
        source: ContextError,
    },

    /// Operation needs a created container but `run()` never created one.
    #[error("container '{name}' has not been created")]
    NotCreated { name: String },

    /// Engine ping failed.
    #[error("Docker not available: {reason}")]
    DockerNotAvailable { reason: String },

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised while running or closing a group of applications.
#[derive(Debug, Error)]
pub enum GroupError {
    /// Creating the group network failed.
    #[error("error creating network `{name}`: {reason}")]
    NetworkCreate { name: String, reason: String },

    /// Removing the group network failed.
    #[error("error removing network `{id}`: {reason}")]
    NetworkRemove { id: String, reason: String },

    /// The context ended during a network call.
    #[error("network call for group `{group}` aborted: {source}")]
    Cancelled {
        group: String,
        #[source]
        source: ContextError,
    },

    /// Network removal was requested but the group never created one.
    #[error("network for group `{name}` was never created")]
    NetworkNotCreated { name: String },

    /// A lifecycle hook failed.
    #[error("error calling `{hook}` hook for `{container}`: {source}")]
    Hook {
        hook: crate::group::HookType,
        container: String,
        #[source]
        source: Box<Error>,
    },

    /// Running a member container failed.
    #[error("error running app `{container}`: {source}")]
    Run {
        container: String,
        #[source]
        source: ContainerError,
    },

    /// Closing a member container failed.
    #[error("error closing container `{container}`: {source}")]
    Close {
        container: String,
        #[source]
        source: ContainerError,
    },
}

impl Error {
    /// Whether this error (or the container error it wraps) came from a
    /// cancelled or expired context.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Context(_) => true,
            Error::Container(ContainerError::Cancelled { .. }) => true,
            Error::Group(GroupError::Cancelled { .. }) => true,
            Error::Group(GroupError::Run { source, .. } | GroupError::Close { source, .. }) => {
                matches!(source, ContainerError::Cancelled { .. })
            }
            Error::Group(GroupError::Hook { source, .. }) => source.is_cancelled(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_docker_host_message() {
        let err = ConfigError::MalformedDockerHost {
            value: "1.1.1.1".to_string(),
            reason: "empty host or port value".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "malformed DOCKER_HOST value: empty host or port value"
        );
    }

    #[test]
    fn test_hook_error_is_cancelled_through_box() {
        let inner = Error::Container(ContainerError::Cancelled {
            name: "kafka".to_string(),
            source: ContextError::DeadlineExceeded,
        });
        let err = Error::Group(GroupError::Hook {
            hook: crate::group::HookType::AfterRun,
            container: "kafka".to_string(),
            source: Box::new(inner),
        });

        assert!(err.is_cancelled());
        assert!(err.to_string().contains("after_run"));
    }

    #[test]
    fn test_port_error_names_port() {
        let err = PortError::NotRegistered {
            spec: PortSpec::new(Protocol::Tcp, 5555),
        };
        assert_eq!(err.to_string(), "port `5555/tcp` is not registered");
    }
}
