use std::sync::Arc;

/// Cancellation handle shared between the sequencer and the request it was
/// issued to.
///
/// Clones observe the same token. Cancellation is permanent.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<tokio_util::sync::CancellationToken>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(tokio_util::sync::CancellationToken::new()),
        }
    }

    /// Mark the token cancelled. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }

    /// True when both handles were cloned from the same token.
    pub fn same_as(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
