//! Pinned image references used by the fixtures and their tests.

use crate::config::{image_prefix_from_env, prefixed_image};
use crate::error::ConfigError;

/// gRPC/HTTP echo server, handy as a generic readiness target.
pub const ECHO_SERVER: &str = "ghcr.io/teran/echo-grpc-server:latest";

pub const MEMCACHE: &str = "index.docker.io/memcached:1.6.29-alpine3.20";

pub const MINIO: &str = "index.docker.io/minio/minio:RELEASE.2024-05-10T01-41-38Z";

pub const POSTGRES: &str = "index.docker.io/library/postgres:16.3";

pub const SCYLLADB: &str = "index.docker.io/scylladb/scylla:5.4.6";

/// Image reference with the `IMAGE_PREFIX` mirror applied, if set.
pub fn reference(image: &str) -> Result<String, ConfigError> {
    let prefix = image_prefix_from_env()?;
    Ok(prefixed_image(prefix.as_deref(), image))
}
