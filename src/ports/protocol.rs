use std::fmt;
use std::str::FromStr;

use crate::error::PortError;

/// Transport protocol of a published port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            _ => Err(format!("invalid protocol '{s}', expected 'tcp' or 'udp'")),
        }
    }
}

/// Logical identity of a port inside a container: `port/proto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortSpec {
    pub protocol: Protocol,
    pub port: u16,
}

impl PortSpec {
    pub fn new(protocol: Protocol, port: u16) -> Self {
        Self { protocol, port }
    }

    pub fn tcp(port: u16) -> Self {
        Self::new(Protocol::Tcp, port)
    }

    pub fn udp(port: u16) -> Self {
        Self::new(Protocol::Udp, port)
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

impl FromStr for PortSpec {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| PortError::InvalidSpec {
            value: s.to_string(),
            reason,
        };

        let (port, proto) = s
            .split_once('/')
            .ok_or_else(|| invalid("expected `port/proto`".to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| invalid(format!("bad port number: {e}")))?;
        let protocol = proto.parse::<Protocol>().map_err(invalid)?;

        Ok(Self { protocol, port })
    }
}

/// Host and port pair callers connect to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
