//! Hooks - callbacks around state transitions.
//!
//! Three kinds, all async and all composable: fallible pre-transition
//! hooks that can veto a transition, silent hooks (post-transition and
//! completion) whose failures are logged but never surfaced, and
//! hydration hooks that enrich restored flow data.
//!
//! Plain closures over the data type implement the traits directly, so
//! `flow.register_pre_transition("Shipped", |data: &Order| { ... })`
//! works without ceremony.

use async_trait::async_trait;

use crate::context::Context;
use crate::error::FlowError;

/// Runs before a transition commits. An error aborts the transition:
/// neither state nor data changes.
#[async_trait]
pub trait PreTransitionHook<D>: Send + Sync {
    async fn run(&self, ctx: &Context, data: &D) -> anyhow::Result<()>;
}

#[async_trait]
impl<D, F> PreTransitionHook<D> for F
where
    D: Send + Sync,
    F: Fn(&D) -> anyhow::Result<()> + Send + Sync,
{
    async fn run(&self, _ctx: &Context, data: &D) -> anyhow::Result<()> {
        (self)(data)
    }
}

/// Runs after a transition commits (post-transition) or when a flow
/// completes. Errors are observed in the log, never by the caller.
#[async_trait]
pub trait SilentHook<D>: Send + Sync {
    async fn run(&self, ctx: &Context, data: &D) -> anyhow::Result<()>;
}

#[async_trait]
impl<D, F> SilentHook<D> for F
where
    D: Send + Sync,
    F: Fn(&D) -> anyhow::Result<()> + Send + Sync,
{
    async fn run(&self, _ctx: &Context, data: &D) -> anyhow::Result<()> {
        (self)(data)
    }
}

/// Rewires restored flow data, e.g. reloading related records after a
/// snapshot decode. Hooks chain: each receives the previous one's output.
#[async_trait]
pub trait HydrationHook<D>: Send + Sync {
    async fn run(&self, ctx: &Context, data: D) -> anyhow::Result<D>;
}

#[async_trait]
impl<D, F> HydrationHook<D> for F
where
    D: Send + Sync + 'static,
    F: Fn(D) -> anyhow::Result<D> + Send + Sync,
{
    async fn run(&self, _ctx: &Context, data: D) -> anyhow::Result<D> {
        (self)(data)
    }
}

/// Run fallible hooks in registration order; the first error wins.
pub(crate) async fn run_pre_hooks<D: Sync>(
    hooks: &[std::sync::Arc<dyn PreTransitionHook<D>>],
    ctx: &Context,
    data: &D,
) -> Result<(), FlowError> {
    for hook in hooks {
        hook.run(ctx, data).await?;
    }
    Ok(())
}

/// Run silent hooks in registration order, logging failures.
pub(crate) async fn run_silent_hooks<D: Sync>(
    hooks: &[std::sync::Arc<dyn SilentHook<D>>],
    ctx: &Context,
    data: &D,
    kind: &str,
) {
    for hook in hooks {
        if let Err(err) = hook.run(ctx, data).await {
            tracing::warn!(error = %err, kind, "hook failed");
        }
    }
}

/// Chain hydration hooks, threading the data through each.
pub(crate) async fn run_hydration_hooks<D: Send + Sync>(
    hooks: &[std::sync::Arc<dyn HydrationHook<D>>],
    ctx: &Context,
    mut data: D,
) -> Result<D, FlowError> {
    for hook in hooks {
        data = hook.run(ctx, data).await?;
    }
    Ok(data)
}
