//! Host port allocation strategies.
//!
//! An allocator turns a logical container port into the host port it will
//! be published on. Two strategies ship with the crate:
//!
//! - [`RandomPortAllocator`]: asks the kernel for a free ephemeral port and
//!   publishes the container port on it (`9092/tcp -> 127.0.0.1:49731`).
//! - [`DirectPortAllocator`]: picks a free port `E` and makes the container
//!   listen on `E` itself (`E/tcp -> 127.0.0.1:E`). The original container
//!   port becomes an alias of `E/tcp`, so lookups by `9092/tcp` still
//!   resolve. Used when a service advertises its own address and the
//!   advertised port must equal the published one.
//!
//! Free ports are found by binding a socket on port 0 and closing it right
//! away. Another process can grab the port before the engine binds it; the
//! window is small and is accepted as an occasional flake rather than
//! retried.

use std::net::{TcpListener, UdpSocket};

use crate::config::DockerHost;
use crate::error::PortError;
use crate::ports::{PortSpec, Protocol};

/// Outcome of allocating a host port for a container port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Key the binding is stored under (the port the container exposes).
    pub key: PortSpec,
    /// Host port the key is published on.
    pub external_port: u16,
    /// Logical ports that should resolve to `key`.
    pub aliases: Vec<PortSpec>,
}

/// Strategy producing host ports for container ports.
pub trait PortAllocator: Send + Sync {
    fn allocate(&self, protocol: Protocol, container_port: u16) -> Result<Allocation, PortError>;
}

impl<F> PortAllocator for F
where
    F: Fn(Protocol, u16) -> Result<Allocation, PortError> + Send + Sync,
{
    fn allocate(&self, protocol: Protocol, container_port: u16) -> Result<Allocation, PortError> {
        self(protocol, container_port)
    }
}

/// Publishes each container port on an independent free host port.
#[derive(Debug, Clone)]
pub struct RandomPortAllocator {
    bind_ip: String,
}

impl RandomPortAllocator {
    /// Probe free ports on `bind_ip`.
    pub fn new(bind_ip: impl Into<String>) -> Self {
        Self {
            bind_ip: bind_ip.into(),
        }
    }

    /// Probe on loopback for a local engine, on all interfaces otherwise.
    pub fn for_docker_host(host: &DockerHost) -> Self {
        if host.is_local() {
            Self::new("127.0.0.1")
        } else {
            Self::new("0.0.0.0")
        }
    }

    /// Ask the kernel for a free port of the given protocol.
    pub fn free_port(&self, protocol: Protocol) -> Result<u16, PortError> {
        let addr = format!("{}:0", self.bind_ip);
        let err = |e: std::io::Error| PortError::Allocation {
            protocol,
            reason: format!("{addr}: {e}"),
        };

        // The socket is dropped at the end of each arm, releasing the port.
        let port = match protocol {
            Protocol::Tcp => TcpListener::bind(&addr).and_then(|l| l.local_addr()),
            Protocol::Udp => UdpSocket::bind(&addr).and_then(|s| s.local_addr()),
        }
        .map_err(err)?
        .port();

        tracing::trace!(port, %protocol, "random port allocated");
        Ok(port)
    }
}

impl Default for RandomPortAllocator {
    fn default() -> Self {
        Self::new("127.0.0.1")
    }
}

impl PortAllocator for RandomPortAllocator {
    fn allocate(&self, protocol: Protocol, container_port: u16) -> Result<Allocation, PortError> {
        let external_port = self.free_port(protocol)?;
        Ok(Allocation {
            key: PortSpec::new(protocol, container_port),
            external_port,
            aliases: Vec::new(),
        })
    }
}

/// Publishes a container port on the same number it listens on.
#[derive(Debug, Clone, Default)]
pub struct DirectPortAllocator {
    random: RandomPortAllocator,
}

impl DirectPortAllocator {
    pub fn new(random: RandomPortAllocator) -> Self {
        Self { random }
    }

    pub fn for_docker_host(host: &DockerHost) -> Self {
        Self::new(RandomPortAllocator::for_docker_host(host))
    }
}

impl PortAllocator for DirectPortAllocator {
    fn allocate(&self, protocol: Protocol, container_port: u16) -> Result<Allocation, PortError> {
        let port = self.random.free_port(protocol)?;
        Ok(Allocation {
            key: PortSpec::new(protocol, port),
            external_port: port,
            aliases: vec![PortSpec::new(protocol, container_port)],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_allocation_keeps_container_port() {
        let allocator = RandomPortAllocator::default();
        let a = allocator.allocate(Protocol::Tcp, 5555).unwrap();

        assert_eq!(a.key, PortSpec::tcp(5555));
        assert_ne!(a.external_port, 0);
        assert!(a.aliases.is_empty());
    }

    #[test]
    fn test_random_udp_port() {
        let allocator = RandomPortAllocator::default();
        let a = allocator.allocate(Protocol::Udp, 53).unwrap();
        assert_eq!(a.key, PortSpec::udp(53));
        assert_ne!(a.external_port, 0);
    }

    #[test]
    fn test_direct_allocation_aliases_container_port() {
        let allocator = DirectPortAllocator::default();
        let a = allocator.allocate(Protocol::Tcp, 9092).unwrap();

        assert_eq!(a.key, PortSpec::tcp(a.external_port));
        assert_eq!(a.aliases, vec![PortSpec::tcp(9092)]);
    }

    #[test]
    fn test_bind_failure_is_allocation_error() {
        let allocator = RandomPortAllocator::new("203.0.113.1");
        let err = allocator.allocate(Protocol::Tcp, 80).unwrap_err();
        assert!(matches!(err, PortError::Allocation { .. }));
    }

    #[test]
    fn test_closure_allocator() {
        let allocator = |protocol: Protocol, port: u16| -> Result<Allocation, PortError> {
            Ok(Allocation {
                key: PortSpec::new(protocol, port),
                external_port: 12001,
                aliases: Vec::new(),
            })
        };
        let a = allocator.allocate(Protocol::Tcp, 1234).unwrap();
        assert_eq!(a.external_port, 12001);
    }
}
