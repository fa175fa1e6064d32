//! Subscriber storage for elapsed notifications.
//!
//! A [`Signal<Args>`] is an insertion-ordered set of callbacks. Connecting a
//! callback returns a [`SubscriptionId`] that can later disconnect it.
//!
//! Emission works on a snapshot of [`Slot`]s taken under the lock and invoked
//! after it is released, so callbacks may freely connect or disconnect other
//! callbacks (or themselves). Each slot carries an activity flag that
//! [`Signal::disconnect`] clears before returning: a snapshot taken before the
//! disconnect skips the slot unless its invocation had already begun.
//!
//! # Example
//!
//! ```
//! use horizon_interval::signal::Signal;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicI32, Ordering};
//!
//! let signal = Signal::<i32>::new();
//! let total = Arc::new(AtomicI32::new(0));
//!
//! let total_clone = total.clone();
//! let id = signal.connect(move |&n| {
//!     total_clone.fetch_add(n, Ordering::SeqCst);
//! });
//!
//! signal.emit(&5);
//! assert!(signal.disconnect(id));
//! signal.emit(&5);
//! assert_eq!(total.load(Ordering::SeqCst), 5);
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

use crate::logging::targets;

new_key_type! {
    /// A unique identifier for a subscription.
    ///
    /// Returned by [`Signal::connect`] and consumed by [`Signal::disconnect`].
    pub struct SubscriptionId;
}

/// A connected callback, detached from the signal that owns it.
pub struct Slot<Args> {
    callback: Arc<dyn Fn(&Args) + Send + Sync>,
    active: Arc<AtomicBool>,
}

impl<Args> Slot<Args> {
    /// Invoke the callback if the subscription is still connected.
    ///
    /// Returns `true` if the callback ran.
    pub fn invoke(&self, args: &Args) -> bool {
        if !self.is_active() {
            return false;
        }
        (self.callback)(args);
        true
    }

    /// Whether the subscription is still connected.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl<Args> Clone for Slot<Args> {
    fn clone(&self) -> Self {
        Self {
            callback: self.callback.clone(),
            active: self.active.clone(),
        }
    }
}

/// Internal storage for a single connection.
struct Connection<Args> {
    slot: Slot<Args>,
    /// Connection order, used to keep snapshots insertion-ordered.
    seq: u64,
}

/// An ordered set of callbacks receiving `&Args`.
pub struct Signal<Args> {
    connections: Mutex<SlotMap<SubscriptionId, Connection<Args>>>,
    next_seq: AtomicU64,
}

impl<Args: 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: 'static> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(SlotMap::with_key()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Connect a callback to this signal.
    pub fn connect<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let connection = Connection {
            slot: Slot {
                callback: Arc::new(callback),
                active: Arc::new(AtomicBool::new(true)),
            },
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        let id = self.connections.lock().insert(connection);
        tracing::trace!(target: targets::SIGNAL, ?id, "connected");
        id
    }

    /// Disconnect a callback by its subscription ID.
    ///
    /// Returns `true` if the connection was found and removed, `false` otherwise.
    pub fn disconnect(&self, id: SubscriptionId) -> bool {
        let removed = self.connections.lock().remove(id);
        match removed {
            Some(connection) => {
                connection.slot.active.store(false, Ordering::Release);
                tracing::trace!(target: targets::SIGNAL, ?id, "disconnected");
                true
            }
            None => false,
        }
    }

    /// Disconnect all callbacks from this signal.
    pub fn disconnect_all(&self) {
        let mut connections = self.connections.lock();
        for (_, connection) in connections.drain() {
            connection.slot.active.store(false, Ordering::Release);
        }
    }

    /// Get the number of connected callbacks.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Whether no callbacks are connected.
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    /// Take an insertion-ordered snapshot of the connected slots.
    pub fn slots(&self) -> Vec<Slot<Args>> {
        let connections = self.connections.lock();
        let mut ordered: Vec<_> = connections.values().collect();
        ordered.sort_by_key(|connection| connection.seq);
        ordered
            .into_iter()
            .map(|connection| connection.slot.clone())
            .collect()
    }

    /// Invoke every connected callback on the current thread, in connection
    /// order.
    ///
    /// Returns the number of callbacks that ran.
    pub fn emit(&self, args: &Args) -> usize {
        let slots = self.slots();
        tracing::trace!(target: targets::SIGNAL, connection_count = slots.len(), "emitting");
        slots.iter().filter(|slot| slot.invoke(args)).count()
    }
}

impl<Args> std::fmt::Debug for Signal<Args> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("connection_count", &self.connections.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn test_connect_and_emit() {
        let signal = Signal::<i32>::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        signal.connect(move |&n| received_clone.lock().push(n));

        assert_eq!(signal.emit(&1), 1);
        assert_eq!(signal.emit(&2), 1);
        assert_eq!(*received.lock(), vec![1, 2]);
    }

    #[test]
    fn test_disconnect() {
        let signal = Signal::<()>::new();
        let counter = Arc::new(AtomicI32::new(0));

        let counter_clone = counter.clone();
        let id = signal.connect(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.emit(&());
        assert!(signal.disconnect(id));
        assert!(!signal.disconnect(id));
        signal.emit(&());

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(signal.is_empty());
    }

    #[test]
    fn test_emission_follows_connection_order() {
        let signal = Signal::<()>::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let ids: Vec<_> = (0..5)
            .map(|i| {
                let order = order.clone();
                signal.connect(move |_| order.lock().push(i))
            })
            .collect();

        // Freeing a slot must not let a later connection jump the queue.
        signal.disconnect(ids[1]);
        let order_clone = order.clone();
        signal.connect(move |_| order_clone.lock().push(5));

        signal.emit(&());
        assert_eq!(*order.lock(), vec![0, 2, 3, 4, 5]);
    }

    #[test]
    fn test_stale_snapshot_skips_disconnected_slot() {
        let signal = Signal::<()>::new();
        let counter = Arc::new(AtomicI32::new(0));

        let counter_clone = counter.clone();
        let id = signal.connect(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        let snapshot = signal.slots();
        signal.disconnect(id);

        assert!(!snapshot[0].is_active());
        assert!(!snapshot[0].invoke(&()));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callback_may_disconnect_itself() {
        let signal = Arc::new(Signal::<()>::new());
        let own_id = Arc::new(Mutex::new(None));
        let counter = Arc::new(AtomicI32::new(0));

        let signal_clone = signal.clone();
        let own_id_clone = own_id.clone();
        let counter_clone = counter.clone();
        let id = signal.connect(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = own_id_clone.lock().take() {
                signal_clone.disconnect(id);
            }
        });
        *own_id.lock() = Some(id);

        signal.emit(&());
        signal.emit(&());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disconnect_all() {
        let signal = Signal::<i32>::new();
        signal.connect(|_| {});
        signal.connect(|_| {});
        let snapshot = signal.slots();

        assert_eq!(signal.connection_count(), 2);
        signal.disconnect_all();

        assert_eq!(signal.connection_count(), 0);
        assert!(snapshot.iter().all(|slot| !slot.is_active()));
        assert_eq!(signal.emit(&1), 0);
    }
}
