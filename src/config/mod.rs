//! Process-level configuration for container fixtures.
//!
//! Everything here comes from environment variables so that CI can point
//! the fixtures at a remote engine or a private registry mirror without
//! code changes:
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `DOCKER_HOST` | engine address; its host is where ports are published | local engine |
//! | `IMAGE_PREFIX` | prefix prepended to image references | none |
//! | `DOCKER_TESTSUITE_STOP_TIMEOUT_SECS` | stop timeout when the context has no deadline | 60 |

mod docker_host;
pub(crate) mod helpers;

use std::time::Duration;

pub use docker_host::{DOCKER_HOST_ENV, DockerHost};

use crate::config::helpers::{optional_env, parse_optional_env};
use crate::error::ConfigError;

pub const IMAGE_PREFIX_ENV: &str = "IMAGE_PREFIX";
pub const STOP_TIMEOUT_ENV: &str = "DOCKER_TESTSUITE_STOP_TIMEOUT_SECS";

/// Configuration shared by containers and groups.
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    /// Where published ports are reachable.
    pub docker_host: DockerHost,
    /// Registry mirror prefix for image references.
    pub image_prefix: Option<String>,
    /// Stop timeout used when the closing context carries no deadline.
    pub stop_timeout: Duration,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            docker_host: DockerHost::local(),
            image_prefix: None,
            stop_timeout: Duration::from_secs(60),
        }
    }
}

impl FixtureConfig {
    /// Resolve configuration from the process environment.
    pub fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            docker_host: DockerHost::from_env()?,
            image_prefix: image_prefix_from_env()?,
            stop_timeout: Duration::from_secs(parse_optional_env(
                STOP_TIMEOUT_ENV,
                defaults.stop_timeout.as_secs(),
            )?),
        })
    }

    /// Apply the mirror prefix, if any, to an image reference.
    ///
    /// The prefix is joined with a single `/`.
    pub fn image_reference(&self, image: &str) -> String {
        prefixed_image(self.image_prefix.as_deref(), image)
    }
}

/// Resolve only `IMAGE_PREFIX` from the environment.
pub(crate) fn image_prefix_from_env() -> Result<Option<String>, ConfigError> {
    optional_env(IMAGE_PREFIX_ENV)
}

pub(crate) fn prefixed_image(prefix: Option<&str>, image: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), image),
        None => image.to_string(),
    }
}
