//! Deferred container environment.
//!
//! Values are registered as resolvers and only evaluated when the
//! container is created, after its ports have been allocated. That lets a
//! variable embed the container's own published port, e.g. an advertised
//! listener built from the host port chosen for `9092/tcp`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::container::ContainerInfo;
use crate::error::PortError;

/// Produces the value of one environment variable.
pub type Resolver = Arc<dyn Fn(&dyn ContainerInfo) -> Result<String, PortError> + Send + Sync>;

/// Environment variables of a container, evaluated at `run()` time.
#[derive(Clone, Default)]
pub struct Environment {
    vars: BTreeMap<String, Resolver>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolver computing the value from container info.
    pub fn var<F>(mut self, name: impl Into<String>, resolver: F) -> Self
    where
        F: Fn(&dyn ContainerInfo) -> Result<String, PortError> + Send + Sync + 'static,
    {
        self.vars.insert(name.into(), Arc::new(resolver));
        self
    }

    pub fn string_var(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        self.var(name, move |_| Ok(value.clone()))
    }

    /// Any signed integer up to 64 bits.
    pub fn int_var(self, name: impl Into<String>, value: impl Into<i64>) -> Self {
        let value: i64 = value.into();
        self.var(name, move |_| Ok(value.to_string()))
    }

    /// Any unsigned integer up to 64 bits.
    pub fn uint_var(self, name: impl Into<String>, value: impl Into<u64>) -> Self {
        let value: u64 = value.into();
        self.var(name, move |_| Ok(value.to_string()))
    }

    pub fn bool_var(self, name: impl Into<String>, value: bool) -> Self {
        self.var(name, move |_| Ok(value.to_string()))
    }

    /// Value rendered with its `Display` impl.
    pub fn display_var(self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        let value = value.to_string();
        self.var(name, move |_| Ok(value.clone()))
    }

    /// Log level rendered lowercase (`trace`, `debug`, ...).
    pub fn log_level_var(self, name: impl Into<String>, level: tracing::Level) -> Self {
        self.string_var(name, level.as_str().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    /// Evaluate every resolver once, producing `(name, value)` pairs.
    ///
    /// On failure the name of the offending variable is returned alongside
    /// the error.
    pub fn resolve(
        &self,
        info: &dyn ContainerInfo,
    ) -> Result<Vec<(String, String)>, (String, PortError)> {
        self.vars
            .iter()
            .map(|(name, resolver)| {
                resolver(info)
                    .map(|value| (name.clone(), value))
                    .map_err(|e| (name.clone(), e))
            })
            .collect()
    }

    /// Evaluate into the `NAME=value` list handed to the engine.
    pub fn eval(&self, info: &dyn ContainerInfo) -> Result<Vec<String>, (String, PortError)> {
        Ok(self
            .resolve(info)?
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect())
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("vars", &self.vars.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ports::{PortSpec, Protocol};
    use crate::testing::StaticContainerInfo;

    #[test]
    fn test_environment_builder() {
        let e = Environment::new()
            .string_var("string_var", "string_value")
            .int_var("int_var", 1234i32)
            .int_var("int64_var", 5678i64)
            .int_var("int16_var", 3456i16)
            .int_var("int8_var", 126i8)
            .uint_var("uint_var", 987u32)
            .uint_var("uint64_var", 654u64)
            .uint_var("uint16_var", 9087u16)
            .uint_var("uint8_var", 255u8)
            .bool_var("bool_var", true)
            .log_level_var("log_level", tracing::Level::TRACE);

        let info = StaticContainerInfo::new("127.0.0.1");
        let mut vars = e.eval(&info).unwrap();
        vars.sort();

        assert_eq!(
            vars,
            vec![
                "bool_var=true",
                "int16_var=3456",
                "int64_var=5678",
                "int8_var=126",
                "int_var=1234",
                "log_level=trace",
                "string_var=string_value",
                "uint16_var=9087",
                "uint64_var=654",
                "uint8_var=255",
                "uint_var=987",
            ]
        );
    }

    #[test]
    fn test_later_registration_wins() {
        let e = Environment::new()
            .string_var("ADDR", ":5555")
            .string_var("ADDR", ":6666");
        let info = StaticContainerInfo::new("127.0.0.1");

        assert_eq!(e.len(), 1);
        assert_eq!(e.eval(&info).unwrap(), vec!["ADDR=:6666".to_string()]);
    }

    #[test]
    fn test_resolver_reads_port_mapping() {
        let e = Environment::new().var("ADVERTISED_LISTENER", |c| {
            let port = c.external_port(Protocol::Tcp, 9092)?;
            Ok(format!("PLAINTEXT://{}:{}", c.docker_host_ip()?, port))
        });
        let info = StaticContainerInfo::new("10.0.0.5").with_port(PortSpec::tcp(9092), 31092);

        assert_eq!(
            e.eval(&info).unwrap(),
            vec!["ADVERTISED_LISTENER=PLAINTEXT://10.0.0.5:31092".to_string()]
        );
    }

    #[test]
    fn test_resolver_error_names_variable() {
        let e = Environment::new().var("BROKER", |c| {
            Ok(c.external_port(Protocol::Tcp, 1)?.to_string())
        });
        let info = StaticContainerInfo::new("127.0.0.1");

        let (name, err) = e.eval(&info).unwrap_err();
        assert_eq!(name, "BROKER");
        assert!(matches!(err, PortError::NotRegistered { .. }));
    }
}
