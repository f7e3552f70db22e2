//! Lifecycle hooks fired around each container of a group.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::container::Container;
use crate::context::Context;
use crate::error::Result;
use crate::matcher::Matcher;

/// Point in a container's group lifecycle at which hooks fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookType {
    BeforeRun,
    AfterRun,
    BeforeClose,
    AfterClose,
}

impl HookType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookType::BeforeRun => "before_run",
            HookType::AfterRun => "after_run",
            HookType::BeforeClose => "before_close",
            HookType::AfterClose => "after_close",
        }
    }
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback invoked at every lifecycle point of its application.
///
/// A hook receives the phase and decides itself whether to act on it. An
/// error aborts the whole group operation.
#[async_trait]
pub trait Hook: Send + Sync {
    async fn call(&self, ctx: &Context, hook: HookType, container: &Container) -> Result<()>;
}

type HookFn =
    dyn for<'a> Fn(&'a Context, HookType, &'a Container) -> BoxFuture<'a, Result<()>> + Send + Sync;

/// [`Hook`] backed by a closure. Build one with [`hook_fn`].
pub struct FnHook {
    f: Box<HookFn>,
}

#[async_trait]
impl Hook for FnHook {
    async fn call(&self, ctx: &Context, hook: HookType, container: &Container) -> Result<()> {
        (self.f)(ctx, hook, container).await
    }
}

impl fmt::Debug for FnHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnHook(<fn>)")
    }
}

/// Wrap a closure returning a boxed future as a [`Hook`].
///
/// ```rust,no_run
/// use docker_testsuite::group::{HookType, hook_fn};
///
/// let hook = hook_fn(|_ctx, hook, container| {
///     Box::pin(async move {
///         if hook == HookType::AfterRun {
///             println!("{} is up", container.name());
///         }
///         Ok::<(), docker_testsuite::Error>(())
///     })
/// });
/// ```
pub fn hook_fn<F>(f: F) -> FnHook
where
    F: for<'a> Fn(&'a Context, HookType, &'a Container) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync
        + 'static,
{
    FnHook { f: Box::new(f) }
}

/// Blocks `after_run` until the container logs a matching line.
///
/// The usual readiness barrier: the next application of the group is not
/// started before this one reports ready.
#[derive(Debug, Clone)]
pub struct AwaitOutputHook {
    matcher: Matcher,
    timeout: Option<Duration>,
}

impl AwaitOutputHook {
    pub fn new(matcher: Matcher) -> Self {
        Self {
            matcher,
            timeout: None,
        }
    }

    /// Bound the wait; the group context's deadline still applies.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Hook for AwaitOutputHook {
    async fn call(&self, ctx: &Context, hook: HookType, container: &Container) -> Result<()> {
        if hook != HookType::AfterRun {
            return Ok(());
        }

        tracing::debug!(name = %container.name(), matcher = %self.matcher, "waiting for readiness");
        match self.timeout {
            Some(timeout) => {
                let ctx = ctx.child_with_timeout(timeout);
                container.await_output(&ctx, &self.matcher).await?;
            }
            None => container.await_output(ctx, &self.matcher).await?,
        }
        Ok(())
    }
}
