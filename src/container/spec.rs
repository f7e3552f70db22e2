use crate::environment::Environment;
use crate::ports::PortBindings;

/// Everything needed to create a container.
#[derive(Debug)]
pub struct ContainerSpec {
    /// Logical name; also the DNS alias inside a group network.
    pub name: String,
    /// Image reference, pulled if missing (always for `:latest`).
    pub image: String,
    /// Command arguments; empty keeps the image default.
    pub cmd: Vec<String>,
    pub env: Environment,
    pub ports: PortBindings,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>, ports: PortBindings) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            cmd: Vec::new(),
            env: Environment::new(),
            ports,
        }
    }

    pub fn with_cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = cmd.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }
}
