//! Port bindings of a single container.
//!
//! Bindings are allocated eagerly while the builder chain runs, so by the
//! time a container is created every published port already has a host
//! port and environment resolvers can read them.

use std::collections::{BTreeMap, HashMap};

use bollard::models::{HostConfig, PortBinding};

use crate::config::DockerHost;
use crate::error::{ConfigError, PortError};
use crate::ports::allocator::{DirectPortAllocator, PortAllocator, RandomPortAllocator};
use crate::ports::{PortSpec, Protocol};

/// One published mapping of a container port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub host_ip: String,
    pub host_port: u16,
}

/// Published ports of a container, keyed by the port the container exposes.
pub struct PortBindings {
    bindings: BTreeMap<PortSpec, Vec<Binding>>,
    aliases: BTreeMap<PortSpec, PortSpec>,
    allocator: Box<dyn PortAllocator>,
    host_ip: String,
}

impl PortBindings {
    /// Random host ports, published on the address from `DOCKER_HOST`.
    pub fn new() -> Result<Self, ConfigError> {
        let host = DockerHost::from_env()?;
        Ok(Self::with_allocator(
            RandomPortAllocator::for_docker_host(&host),
            host.ip(),
        ))
    }

    /// One-to-one host ports (container listens on the published number).
    pub fn direct() -> Result<Self, ConfigError> {
        let host = DockerHost::from_env()?;
        Ok(Self::with_allocator(
            DirectPortAllocator::for_docker_host(&host),
            host.ip(),
        ))
    }

    /// Custom allocation strategy; bindings are published on `host_ip`.
    pub fn with_allocator(allocator: impl PortAllocator + 'static, host_ip: &str) -> Self {
        Self {
            bindings: BTreeMap::new(),
            aliases: BTreeMap::new(),
            allocator: Box::new(allocator),
            host_ip: host_ip.to_string(),
        }
    }

    /// Publish a container port, allocating its host port now.
    pub fn port_dnat(mut self, protocol: Protocol, port: u16) -> Result<Self, PortError> {
        tracing::trace!(%protocol, port, "add port to port bindings");

        let allocation = self.allocator.allocate(protocol, port)?;

        tracing::trace!(
            %protocol,
            source = port,
            key = %allocation.key,
            exposed = allocation.external_port,
            "port mapping established"
        );

        self.bindings
            .entry(allocation.key)
            .or_default()
            .push(Binding {
                host_ip: self.host_ip.clone(),
                host_port: allocation.external_port,
            });

        for alias in allocation.aliases {
            if alias != allocation.key {
                self.aliases.insert(alias, allocation.key);
            }
        }

        Ok(self)
    }

    /// Map a logical port to the key its bindings are stored under.
    ///
    /// Aliases are one level deep: an alias always names a key that holds
    /// bindings, never another alias.
    pub fn resolve(&self, spec: PortSpec) -> Result<PortSpec, PortError> {
        let Some(&target) = self.aliases.get(&spec) else {
            return Ok(spec);
        };

        if self.aliases.contains_key(&target) || !self.bindings.contains_key(&target) {
            return Err(PortError::DanglingAlias {
                alias: spec,
                target,
            });
        }
        Ok(target)
    }

    /// The single binding for a logical port.
    pub fn binding(&self, spec: PortSpec) -> Result<&Binding, PortError> {
        let key = self.resolve(spec)?;
        let bindings = self
            .bindings
            .get(&key)
            .ok_or(PortError::NotRegistered { spec })?;

        match bindings.as_slice() {
            [binding] => Ok(binding),
            [] => Err(PortError::Unresolved { spec }),
            many => Err(PortError::AmbiguousBinding {
                spec,
                count: many.len(),
            }),
        }
    }

    /// Host port a logical port is published on.
    pub fn external_port(&self, spec: PortSpec) -> Result<u16, PortError> {
        let binding = self.binding(spec)?;
        if binding.host_port == 0 {
            return Err(PortError::Unresolved { spec });
        }
        Ok(binding.host_port)
    }

    /// Every binding, keyed by exposed port.
    pub fn bindings(&self) -> &BTreeMap<PortSpec, Vec<Binding>> {
        &self.bindings
    }

    /// Alias map (logical port -> binding key).
    pub fn aliases(&self) -> &BTreeMap<PortSpec, PortSpec> {
        &self.aliases
    }

    /// Address bindings are published on.
    pub fn host_ip(&self) -> &str {
        &self.host_ip
    }

    /// Exposed port set in the shape the engine expects (`port/proto`).
    pub fn exposed_ports(&self) -> HashMap<String, HashMap<(), ()>> {
        let ports: HashMap<String, HashMap<(), ()>> = self
            .bindings
            .keys()
            .map(|spec| (spec.to_string(), HashMap::new()))
            .collect();

        tracing::debug!(ports = ?ports.keys().collect::<Vec<_>>(), "port set");
        ports
    }

    /// Host configuration publishing every binding.
    pub fn host_config(&self) -> HostConfig {
        let port_bindings = self
            .bindings
            .iter()
            .map(|(spec, bindings)| {
                let published = bindings
                    .iter()
                    .map(|b| PortBinding {
                        host_ip: Some(b.host_ip.clone()),
                        host_port: Some(b.host_port.to_string()),
                    })
                    .collect();
                (spec.to_string(), Some(published))
            })
            .collect();

        HostConfig {
            network_mode: Some("default".to_string()),
            port_bindings: Some(port_bindings),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for PortBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortBindings")
            .field("bindings", &self.bindings)
            .field("aliases", &self.aliases)
            .field("host_ip", &self.host_ip)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU16, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ports::Allocation;

    fn counting_allocator(start: u16) -> impl PortAllocator {
        let count = AtomicU16::new(start);
        move |protocol: Protocol, port: u16| -> Result<Allocation, PortError> {
            Ok(Allocation {
                key: PortSpec::new(protocol, port),
                external_port: count.fetch_add(1, Ordering::SeqCst) + 1,
                aliases: Vec::new(),
            })
        }
    }

    fn binding(ip: &str, port: u16) -> Binding {
        Binding {
            host_ip: ip.to_string(),
            host_port: port,
        }
    }

    #[test]
    fn test_port_bindings() {
        let pb = PortBindings::with_allocator(counting_allocator(12000), "1.1.1.1")
            .port_dnat(Protocol::Tcp, 1234)
            .unwrap()
            .port_dnat(Protocol::Udp, 4567)
            .unwrap();

        let expected: BTreeMap<PortSpec, Vec<Binding>> = [
            (PortSpec::tcp(1234), vec![binding("1.1.1.1", 12001)]),
            (PortSpec::udp(4567), vec![binding("1.1.1.1", 12002)]),
        ]
        .into_iter()
        .collect();
        assert_eq!(pb.bindings(), &expected);
    }

    #[test]
    fn test_host_config() {
        let pb = PortBindings::with_allocator(counting_allocator(12000), "1.1.1.1")
            .port_dnat(Protocol::Tcp, 1234)
            .unwrap()
            .port_dnat(Protocol::Udp, 4567)
            .unwrap();

        let hc = pb.host_config();
        assert_eq!(hc.network_mode.as_deref(), Some("default"));

        let published = hc.port_bindings.unwrap();
        assert_eq!(
            published.get("1234/tcp"),
            Some(&Some(vec![PortBinding {
                host_ip: Some("1.1.1.1".to_string()),
                host_port: Some("12001".to_string()),
            }]))
        );
        assert_eq!(
            published.get("4567/udp"),
            Some(&Some(vec![PortBinding {
                host_ip: Some("1.1.1.1".to_string()),
                host_port: Some("12002".to_string()),
            }]))
        );

        let mut exposed: Vec<_> = pb.exposed_ports().into_keys().collect();
        exposed.sort();
        assert_eq!(exposed, vec!["1234/tcp".to_string(), "4567/udp".to_string()]);
    }

    #[test]
    fn test_unregistered_port_lookup() {
        let pb = PortBindings::with_allocator(counting_allocator(12000), "127.0.0.1");
        let err = pb.external_port(PortSpec::tcp(80)).unwrap_err();
        assert!(matches!(err, PortError::NotRegistered { .. }));
    }

    #[test]
    fn test_duplicate_registration_is_ambiguous() {
        let pb = PortBindings::with_allocator(counting_allocator(12000), "127.0.0.1")
            .port_dnat(Protocol::Tcp, 80)
            .unwrap()
            .port_dnat(Protocol::Tcp, 80)
            .unwrap();

        let err = pb.binding(PortSpec::tcp(80)).unwrap_err();
        assert!(matches!(err, PortError::AmbiguousBinding { count: 2, .. }));
    }

    #[test]
    fn test_direct_aliases_resolve_to_their_key() {
        let pb = PortBindings::with_allocator(DirectPortAllocator::default(), "127.0.0.1")
            .port_dnat(Protocol::Tcp, 9092)
            .unwrap()
            .port_dnat(Protocol::Tcp, 9093)
            .unwrap();

        for (alias, key) in pb.aliases() {
            assert_eq!(pb.resolve(*alias).unwrap(), *key);
            // The container listens on the published number.
            assert_eq!(pb.external_port(*alias).unwrap(), key.port);
            assert_eq!(pb.external_port(*key).unwrap(), key.port);
        }
        assert_eq!(pb.aliases().len(), 2);
        assert_ne!(
            pb.external_port(PortSpec::tcp(9092)).unwrap(),
            pb.external_port(PortSpec::tcp(9093)).unwrap()
        );
    }

    #[test]
    fn test_shared_external_port_aliases() {
        // Several logical ports sharing one published port.
        let shared = move |protocol: Protocol, port: u16| -> Result<Allocation, PortError> {
            Ok(Allocation {
                key: PortSpec::new(protocol, 29092),
                external_port: 29092,
                aliases: vec![PortSpec::new(protocol, port)],
            })
        };
        let pb = PortBindings::with_allocator(shared, "127.0.0.1")
            .port_dnat(Protocol::Tcp, 9092)
            .unwrap();

        assert_eq!(pb.resolve(PortSpec::tcp(9092)).unwrap(), PortSpec::tcp(29092));
        assert_eq!(pb.external_port(PortSpec::tcp(9092)).unwrap(), 29092);
    }

    #[test]
    fn test_random_ports_do_not_repeat() {
        // Kernel-assigned ports may collide across runs; within one set of
        // bindings they are expected to be distinct.
        let pb = PortBindings::with_allocator(RandomPortAllocator::default(), "127.0.0.1")
            .port_dnat(Protocol::Tcp, 5432)
            .unwrap()
            .port_dnat(Protocol::Tcp, 6379)
            .unwrap()
            .port_dnat(Protocol::Tcp, 11211)
            .unwrap();

        let ports: HashSet<u16> = pb
            .bindings()
            .keys()
            .map(|spec| pb.external_port(*spec).unwrap())
            .collect();
        assert_eq!(ports.len(), 3);
    }
}
