//! Multi-container groups on a private network.
//!
//! A [`Group`] owns an internal, attachable network and an ordered list of
//! [`Application`]s. Members reach each other by their logical names.
//!
//! ```text
//!   run():   create network `{name}-{suffix}`
//!            for each app, in order:
//!              attach -> before_run hooks -> container.run() -> after_run hooks
//!   close(): for each app, in reverse order:
//!              before_close hooks -> container.close() -> after_close hooks
//!            remove network
//! ```
//!
//! The first failure aborts the operation. Nothing already started is
//! rolled back; callers close the group to release what exists.

mod application;
mod hooks;

use std::future::Future;
use std::sync::Arc;

use rand::Rng;
use rand::distributions::Alphanumeric;

pub use application::Application;
pub use hooks::{AwaitOutputHook, FnHook, Hook, HookType, hook_fn};

use crate::container::Container;
use crate::context::Context;
use crate::engine::{BollardEngine, DockerEngine};
use crate::error::{Error, GroupError};

/// Length of the random suffix appended to group network names.
const NAME_SUFFIX_LEN: usize = 14;

/// Containers sharing an isolated network, run and closed in order.
pub struct Group {
    engine: Arc<dyn DockerEngine>,
    name: String,
    network_id: Option<String>,
    apps: Vec<Application>,
}

impl Group {
    /// Create a group connected to the local docker engine.
    pub async fn new(name: &str, apps: Vec<Application>) -> Result<Self, Error> {
        let engine = BollardEngine::connect().await?;
        Ok(Self::with_engine(engine, name, apps))
    }

    /// Create a group on an existing engine client.
    pub fn with_engine(engine: Arc<dyn DockerEngine>, name: &str, apps: Vec<Application>) -> Self {
        let name = format!("{name}-{}", random_suffix());
        tracing::debug!(group = %name, apps = apps.len(), "initializing group");

        Self {
            engine,
            name,
            network_id: None,
            apps,
        }
    }

    /// Network name, including the random suffix.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn network_id(&self) -> Option<&str> {
        self.network_id.as_deref()
    }

    pub fn applications(&self) -> &[Application] {
        &self.apps
    }

    /// Member container by logical name.
    pub fn container(&self, name: &str) -> Option<&Container> {
        self.apps
            .iter()
            .map(|app| &app.container)
            .find(|c| c.name() == name)
    }

    /// Create the network and start every application in order.
    pub async fn run(&mut self, ctx: &Context) -> Result<(), GroupError> {
        let network_id = self
            .with_context(ctx, self.engine.create_network(&self.name, true, true))
            .await?
            .map_err(|e| GroupError::NetworkCreate {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!("Created network: {} ({})", self.name, network_id);
        self.network_id = Some(network_id.clone());

        for app in &mut self.apps {
            app.container.network_attach(network_id.clone());

            run_hooks(app, ctx, HookType::BeforeRun).await?;

            app.container
                .run(ctx)
                .await
                .map_err(|source| GroupError::Run {
                    container: app.container.name().to_string(),
                    source,
                })?;

            run_hooks(app, ctx, HookType::AfterRun).await?;
        }

        Ok(())
    }

    /// Close every application in reverse order, then remove the network.
    pub async fn close(&mut self, ctx: &Context) -> Result<(), GroupError> {
        for app in self.apps.iter_mut().rev() {
            run_hooks(app, ctx, HookType::BeforeClose).await?;

            app.container
                .close(ctx)
                .await
                .map_err(|source| GroupError::Close {
                    container: app.container.name().to_string(),
                    source,
                })?;

            run_hooks(app, ctx, HookType::AfterClose).await?;
        }

        let network_id = self
            .network_id
            .as_deref()
            .ok_or_else(|| GroupError::NetworkNotCreated {
                name: self.name.clone(),
            })?;

        self.with_context(ctx, self.engine.remove_network(network_id))
            .await?
            .map_err(|e| GroupError::NetworkRemove {
                id: network_id.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!("Removed network: {}", self.name);
        Ok(())
    }

    /// Run a network call unless the context ends first.
    async fn with_context<T>(
        &self,
        ctx: &Context,
        fut: impl Future<Output = T>,
    ) -> Result<T, GroupError> {
        tokio::select! {
            biased;
            err = ctx.done() => Err(GroupError::Cancelled {
                group: self.name.clone(),
                source: err,
            }),
            out = fut => Ok(out),
        }
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("network_id", &self.network_id)
            .field("apps", &self.apps)
            .finish_non_exhaustive()
    }
}

async fn run_hooks(app: &Application, ctx: &Context, hook: HookType) -> Result<(), GroupError> {
    for h in &app.hooks {
        tracing::trace!(container = %app.container.name(), %hook, "calling hook");
        h.call(ctx, hook, &app.container)
            .await
            .map_err(|source| GroupError::Hook {
                hook,
                container: app.container.name().to_string(),
                source: Box::new(source),
            })?;
    }
    Ok(())
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NAME_SUFFIX_LEN)
        .map(char::from)
        .collect()
}
