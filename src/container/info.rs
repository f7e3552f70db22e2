use crate::error::PortError;
use crate::ports::{PortBindings, PortSpec, Protocol};

/// Read-only view of a container handed to environment resolvers.
///
/// Resolvers run before the container exists, so this exposes only what
/// is already fixed at that point: published ports and the host IP.
pub trait ContainerInfo {
    /// Host port a container port is published on (aliases resolved).
    fn external_port(&self, protocol: Protocol, port: u16) -> Result<u16, PortError>;

    /// Address published ports are reachable on.
    fn docker_host_ip(&self) -> Result<&str, PortError>;
}

/// [`ContainerInfo`] over a container's port bindings.
pub(crate) struct BindingsInfo<'a> {
    ports: &'a PortBindings,
    docker_host_ip: &'a str,
}

impl<'a> BindingsInfo<'a> {
    pub(crate) fn new(ports: &'a PortBindings, docker_host_ip: &'a str) -> Self {
        Self {
            ports,
            docker_host_ip,
        }
    }
}

impl ContainerInfo for BindingsInfo<'_> {
    fn external_port(&self, protocol: Protocol, port: u16) -> Result<u16, PortError> {
        tracing::trace!(%protocol, port, mapping = ?self.ports.bindings(), "looking up port");
        self.ports.external_port(PortSpec::new(protocol, port))
    }

    fn docker_host_ip(&self) -> Result<&str, PortError> {
        if self.docker_host_ip.is_empty() {
            return Err(PortError::DockerHostIpUnresolved);
        }
        Ok(self.docker_host_ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::DirectPortAllocator;

    #[test]
    fn test_lookup_through_alias() {
        let ports = PortBindings::with_allocator(DirectPortAllocator::default(), "127.0.0.1")
            .port_dnat(Protocol::Tcp, 9093)
            .unwrap();
        let info = BindingsInfo::new(&ports, "127.0.0.1");

        let external = info.external_port(Protocol::Tcp, 9093).unwrap();
        assert_eq!(ports.resolve(PortSpec::tcp(9093)).unwrap(), PortSpec::tcp(external));
    }

    #[test]
    fn test_empty_host_ip() {
        let ports = PortBindings::with_allocator(DirectPortAllocator::default(), "");
        let info = BindingsInfo::new(&ports, "");
        assert!(matches!(
            info.docker_host_ip(),
            Err(PortError::DockerHostIpUnresolved)
        ));
    }
}
