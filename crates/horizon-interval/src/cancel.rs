//! Cancelable wait signal.
//!
//! A [`CancelSignal`] is a manual-reset event: one thread blocks on it with a
//! timeout while another thread may set it to wake the waiter early. Once set
//! it stays set; a timer creates a fresh signal for every armed period instead
//! of resetting an old one.
//!
//! # Example
//!
//! ```
//! use horizon_interval::cancel::{CancelSignal, WaitOutcome};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let signal = Arc::new(CancelSignal::new());
//! assert_eq!(signal.wait_timeout(Duration::from_millis(5)), WaitOutcome::TimedOut);
//!
//! let setter = signal.clone();
//! std::thread::spawn(move || setter.set());
//! assert_eq!(signal.wait_timeout(Duration::from_secs(5)), WaitOutcome::Signaled);
//! ```

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Why a [`CancelSignal::wait_timeout`] call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The signal was set before the timeout elapsed.
    Signaled,
    /// The timeout elapsed with the signal still unset.
    TimedOut,
}

/// A settable, waitable flag.
#[derive(Debug, Default)]
pub struct CancelSignal {
    set: Mutex<bool>,
    condvar: Condvar,
}

impl CancelSignal {
    /// Create a new signal in the unset state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signal, waking every waiter.
    ///
    /// Setting an already set signal does nothing.
    pub fn set(&self) {
        // Hold the lock while setting to avoid a lost wakeup.
        let mut set = self.set.lock();
        if !*set {
            *set = true;
            self.condvar.notify_all();
        }
    }

    /// Check whether the signal has been set.
    #[inline]
    pub fn is_set(&self) -> bool {
        *self.set.lock()
    }

    /// Block until the signal is set.
    pub fn wait(&self) {
        let mut set = self.set.lock();
        while !*set {
            self.condvar.wait(&mut set);
        }
    }

    /// Block until the signal is set or `timeout` elapses.
    ///
    /// Spurious condvar wakeups are absorbed: the call only returns
    /// [`WaitOutcome::TimedOut`] once the full timeout has passed.
    pub fn wait_timeout(&self, timeout: Duration) -> WaitOutcome {
        let mut set = self.set.lock();
        if *set {
            return WaitOutcome::Signaled;
        }

        // A timeout too large to represent as an instant waits forever.
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            while !*set {
                self.condvar.wait(&mut set);
            }
            return WaitOutcome::Signaled;
        };

        while !*set {
            if self.condvar.wait_until(&mut set, deadline).timed_out() {
                return if *set {
                    WaitOutcome::Signaled
                } else {
                    WaitOutcome::TimedOut
                };
            }
        }
        WaitOutcome::Signaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_signal_is_unset() {
        let signal = CancelSignal::new();
        assert!(!signal.is_set());
    }

    #[test]
    fn test_wait_times_out() {
        let signal = CancelSignal::new();
        let start = Instant::now();
        assert_eq!(
            signal.wait_timeout(Duration::from_millis(30)),
            WaitOutcome::TimedOut
        );
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_set_before_wait() {
        let signal = CancelSignal::new();
        signal.set();
        assert!(signal.is_set());
        assert_eq!(
            signal.wait_timeout(Duration::from_secs(10)),
            WaitOutcome::Signaled
        );
        signal.wait();
    }

    #[test]
    fn test_set_wakes_waiter_early() {
        let signal = Arc::new(CancelSignal::new());
        let setter = signal.clone();

        let start = Instant::now();
        let thread = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            setter.set();
        });

        assert_eq!(
            signal.wait_timeout(Duration::from_secs(10)),
            WaitOutcome::Signaled
        );
        assert!(start.elapsed() < Duration::from_secs(5));
        thread.join().unwrap();
    }

    #[test]
    fn test_set_is_idempotent() {
        let signal = CancelSignal::new();
        signal.set();
        signal.set();
        assert!(signal.is_set());
    }

    #[test]
    fn test_wakes_all_waiters() {
        let signal = Arc::new(CancelSignal::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let signal = signal.clone();
                thread::spawn(move || signal.wait_timeout(Duration::from_secs(10)))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        signal.set();

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), WaitOutcome::Signaled);
        }
    }
}
