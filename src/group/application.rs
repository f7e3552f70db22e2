use crate::container::Container;
use crate::group::hooks::Hook;

/// A container plus the hooks fired around it inside a group.
pub struct Application {
    pub(crate) container: Container,
    pub(crate) hooks: Vec<Box<dyn Hook>>,
}

impl Application {
    pub fn new(container: Container) -> Self {
        Self {
            container,
            hooks: Vec::new(),
        }
    }

    /// Append a hook; hooks fire in registration order.
    pub fn with_hook(mut self, hook: impl Hook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("container", &self.container)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
