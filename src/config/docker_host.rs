//! Docker host discovery from `DOCKER_HOST`.
//!
//! The host component of `DOCKER_HOST` is the address every published
//! port is reachable on. When the variable is unset (or points at a local
//! socket) the engine runs on this machine and ports are published on
//! loopback.

use std::fmt;

use url::Url;

use crate::config::helpers::optional_env;
use crate::error::ConfigError;

pub const DOCKER_HOST_ENV: &str = "DOCKER_HOST";

const LOOPBACK: &str = "127.0.0.1";

/// Externally reachable address of the docker engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerHost {
    ip: String,
}

impl DockerHost {
    /// Read `DOCKER_HOST` from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::parse(optional_env(DOCKER_HOST_ENV)?.as_deref())
    }

    /// Interpret a `DOCKER_HOST` value (`None` when unset).
    ///
    /// `tcp://1.1.1.1:2376` yields `1.1.1.1`; socket schemes (`unix://`,
    /// `npipe://`) are local. A value without a host, e.g. a bare
    /// `1.1.1.1`, is rejected rather than silently defaulted.
    pub fn parse(value: Option<&str>) -> Result<Self, ConfigError> {
        let Some(raw) = value else {
            return Ok(Self::local());
        };

        tracing::trace!(docker_host = %raw, "DOCKER_HOST value discovered");

        let url = Url::parse(raw).map_err(|e| ConfigError::MalformedDockerHost {
            value: raw.to_string(),
            reason: match e {
                url::ParseError::RelativeUrlWithoutBase | url::ParseError::EmptyHost => {
                    "empty host or port value".to_string()
                }
                other => other.to_string(),
            },
        })?;

        if matches!(url.scheme(), "unix" | "npipe") {
            return Ok(Self::local());
        }

        match url.host_str() {
            Some(host) if !host.is_empty() => Ok(Self {
                ip: host.to_string(),
            }),
            _ => Err(ConfigError::MalformedDockerHost {
                value: raw.to_string(),
                reason: "empty host or port value".to_string(),
            }),
        }
    }

    /// The engine on this machine.
    pub fn local() -> Self {
        Self {
            ip: LOOPBACK.to_string(),
        }
    }

    /// Explicit address, for callers that know where the engine lives.
    pub fn with_ip(ip: impl Into<String>) -> Self {
        Self { ip: ip.into() }
    }

    /// Host IP (or name) published ports are reachable on.
    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Whether the engine publishes ports on this machine's loopback.
    pub fn is_local(&self) -> bool {
        matches!(self.ip.as_str(), LOOPBACK | "localhost" | "[::1]")
    }
}

impl Default for DockerHost {
    fn default() -> Self {
        Self::local()
    }
}

impl fmt::Display for DockerHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ip)
    }
}
