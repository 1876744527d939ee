//! Call context handed to handlers and hooks.

use tokio_util::sync::CancellationToken;

/// Cancellation-capable context threaded through every handler and hook
/// invocation.
///
/// The engine itself never inspects the token; a handler or hook that
/// observes cancellation is expected to return an error, which the flow
/// treats like any other handler or hook failure.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancellation: CancellationToken,
}

impl Context {
    /// A context that is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context driven by the given token.
    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        Self { cancellation }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
