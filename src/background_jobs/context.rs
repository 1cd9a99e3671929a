use tokio_util::sync::CancellationToken;

/// Cancellable context handed to tasks and job actions.
///
/// Cancelling a context cancels every context derived from it with
/// [`JobContext::child`], but never its parent.
#[derive(Clone, Debug, Default)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,
}

impl JobContext {
    /// Create a fresh, uncancelled root context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token.
    pub fn from_token(cancellation_token: CancellationToken) -> Self {
        Self { cancellation_token }
    }

    /// Derive a context that is cancelled together with this one.
    pub fn child(&self) -> Self {
        Self {
            cancellation_token: self.cancellation_token.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    /// Check if cancellation has been requested.
    ///
    /// Long-running actions should check this periodically and return early
    /// when it is true.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Resolves once the context is cancelled.
    pub async fn cancelled(&self) {
        self.cancellation_token.cancelled().await
    }
}
