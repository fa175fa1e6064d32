//! Context invokers for marshaling elapsed notifications.
//!
//! A timer can be given a notification target: something that knows whether
//! the dispatching thread is the "right" one for a subscriber and, if not, how
//! to get a callback executed there. This is the [`ContextInvoker`] trait. It
//! deliberately has two methods and no ties to any UI toolkit, so hosts can
//! implement it on top of whatever event loop or actor mailbox they own.
//!
//! [`InvocationQueue`] is a ready-made invoker for hosts that drive their own
//! loop: it is bound to the thread that created it, and callbacks invoked from
//! any other thread are queued until that thread calls
//! [`InvocationQueue::process_pending`].
//!
//! # Example
//!
//! ```
//! use horizon_interval::invocation::{ContextInvoker, InvocationQueue, QueuedInvocation};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//!
//! let queue = Arc::new(InvocationQueue::new());
//! let ran = Arc::new(AtomicBool::new(false));
//!
//! let remote = queue.clone();
//! let flag = ran.clone();
//! std::thread::spawn(move || {
//!     assert!(remote.requires_marshaling());
//!     remote.invoke_async(QueuedInvocation::new(move || flag.store(true, Ordering::SeqCst)));
//! })
//! .join()
//! .unwrap();
//!
//! // Nothing runs until the owning thread drains the queue.
//! assert!(!ran.load(Ordering::SeqCst));
//! assert_eq!(queue.process_pending(), 1);
//! assert!(ran.load(Ordering::SeqCst));
//! ```

use std::thread::ThreadId;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::logging::targets;

/// A type-erased callback, with its arguments already captured, waiting to be
/// executed on another context.
pub struct QueuedInvocation {
    invoke: Box<dyn FnOnce() + Send>,
}

impl QueuedInvocation {
    /// Create a new queued invocation.
    pub fn new<F>(invoke: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            invoke: Box::new(invoke),
        }
    }

    /// Execute the invocation on the current thread.
    pub fn execute(self) {
        (self.invoke)();
    }
}

impl std::fmt::Debug for QueuedInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedInvocation").finish_non_exhaustive()
    }
}

/// Capability to redirect callback execution onto a specific context.
pub trait ContextInvoker: Send + Sync {
    /// Whether a call made from the current thread must be marshaled.
    fn requires_marshaling(&self) -> bool;

    /// Arrange for `invocation` to run on the target context.
    ///
    /// Must not block waiting for the invocation to run.
    fn invoke_async(&self, invocation: QueuedInvocation);
}

/// A thread-affine invocation queue.
///
/// The queue belongs to the thread that created it. Calls from that thread
/// need no marshaling; calls from any other thread are queued and run when the
/// owner calls [`process_pending`](Self::process_pending).
pub struct InvocationQueue {
    owner: ThreadId,
    sender: Sender<QueuedInvocation>,
    receiver: Receiver<QueuedInvocation>,
}

impl InvocationQueue {
    /// Create a queue owned by the current thread.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            owner: std::thread::current().id(),
            sender,
            receiver,
        }
    }

    /// The thread this queue delivers to.
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Check whether the current thread owns this queue.
    #[inline]
    pub fn is_owner_thread(&self) -> bool {
        std::thread::current().id() == self.owner
    }

    /// Get the number of invocations waiting to run.
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Run every queued invocation on the current thread.
    ///
    /// Returns the number of invocations executed. Calling this from a thread
    /// other than the owner runs nothing and logs a warning.
    pub fn process_pending(&self) -> usize {
        if !self.is_owner_thread() {
            tracing::warn!(
                target: targets::INVOCATION,
                "process_pending called off the owning thread, ignoring"
            );
            return 0;
        }

        let mut executed = 0;
        while let Ok(invocation) = self.receiver.try_recv() {
            invocation.execute();
            executed += 1;
        }
        executed
    }

    /// Wait up to `timeout` for at least one invocation, then run everything
    /// queued.
    ///
    /// Returns the number of invocations executed.
    pub fn process_pending_timeout(&self, timeout: Duration) -> usize {
        if !self.is_owner_thread() {
            tracing::warn!(
                target: targets::INVOCATION,
                "process_pending_timeout called off the owning thread, ignoring"
            );
            return 0;
        }

        match self.receiver.recv_timeout(timeout) {
            Ok(first) => {
                first.execute();
                1 + self.process_pending()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }
}

impl Default for InvocationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextInvoker for InvocationQueue {
    fn requires_marshaling(&self) -> bool {
        !self.is_owner_thread()
    }

    fn invoke_async(&self, invocation: QueuedInvocation) {
        // The queue holds its own receiver, so the channel never disconnects.
        if self.sender.send(invocation).is_err() {
            tracing::warn!(target: targets::INVOCATION, "invocation queue closed, dropping call");
        }
    }
}

impl std::fmt::Debug for InvocationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationQueue")
            .field("owner", &self.owner)
            .field("pending", &self.pending_count())
            .finish()
    }
}

static_assertions::assert_impl_all!(InvocationQueue: Send, Sync);
