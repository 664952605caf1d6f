//! Completion handlers.
//!
//! Every transfer a caller starts carries at most one [`Completion`]. The unit
//! holds it in an `Option` and takes it when the transfer ends, so the handler
//! runs exactly once whether the transfer completes, aborts or times out.

use crate::error::XferStatus;
use crate::ids::TransferId;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Terminal result of a transfer, delivered to its completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XferOutcome {
    /// Transfer id
    pub id: TransferId,
    /// Final status
    pub status: XferStatus,
    /// Received bytes, for memory downloads that completed
    pub data: Option<Vec<u8>>,
}

impl XferOutcome {
    /// Whether the transfer succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

/// Shared completion handler.
///
/// Cloning shares the handler; two clones of the same handler compare equal
/// under [`Completion::same_as`], which is how duplicate requests are spotted.
#[derive(Clone)]
pub struct Completion(Arc<dyn Fn(XferOutcome) + Send + Sync>);

impl Completion {
    /// Wrap a closure.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(XferOutcome) + Send + Sync + 'static,
    {
        Self(Arc::new(handler))
    }

    /// A completion that forwards outcomes into a channel.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<XferOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let completion = Self::new(move |outcome| {
            if tx.send(outcome).is_err() {
                tracing::debug!("Completion receiver dropped");
            }
        });
        (completion, rx)
    }

    /// Whether both handles share the same handler.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn invoke(&self, outcome: XferOutcome) {
        (self.0)(outcome);
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Completion")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Whether two optional completions are the same handler (or both absent).
pub(crate) fn same_completion(a: Option<&Completion>, b: Option<&Completion>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_as(b),
        _ => false,
    }
}
