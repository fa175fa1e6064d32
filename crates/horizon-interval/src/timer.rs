//! The interval timer.
//!
//! An [`IntervalTimer`] raises an elapsed notification every `interval`
//! milliseconds once armed. With auto-reset disabled it fires once and disarms
//! itself.
//!
//! # Threading
//!
//! Each armed period owns one dedicated thread that waits on a fresh
//! [`CancelSignal`] with the current interval as timeout. A timeout is a
//! firing: the notification is submitted to the timer's [`WorkDispatcher`] and
//! never runs on the wait thread itself. Disarming sets the signal and joins
//! the thread, so once [`IntervalTimer::disarm`] returns no further firing can
//! be scheduled. Notifications that were already submitted may still be
//! delivered afterwards.
//!
//! # Example
//!
//! ```
//! use horizon_interval::IntervalTimer;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::time::Duration;
//!
//! let timer = IntervalTimer::with_interval(20.0).unwrap();
//! let fired = Arc::new(AtomicUsize::new(0));
//!
//! let fired_clone = fired.clone();
//! timer.subscribe(move |event| {
//!     let _ = event.signal_time;
//!     fired_clone.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! timer.arm();
//! std::thread::sleep(Duration::from_millis(110));
//! timer.disarm();
//!
//! assert!(fired.load(Ordering::SeqCst) >= 1);
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Local};
use parking_lot::{Mutex, RwLock};

use crate::cancel::{CancelSignal, WaitOutcome};
use crate::dispatch::{ThreadPool, WorkDispatcher};
use crate::error::{Result, TimerError};
use crate::invocation::{ContextInvoker, QueuedInvocation};
use crate::logging::targets;
use crate::signal::{Signal, SubscriptionId};

/// Interval used by [`IntervalTimer::new`], in milliseconds.
pub const DEFAULT_INTERVAL_MS: f64 = 100.0;

/// Payload delivered to subscribers when the interval elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElapsedEvent {
    /// Local wall-clock time at which the interval elapsed.
    pub signal_time: DateTime<Local>,
}

impl ElapsedEvent {
    fn now() -> Self {
        Self {
            signal_time: Local::now(),
        }
    }
}

/// Configuration for creating an [`IntervalTimer`].
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// Milliseconds between firings. Must be positive and finite.
    pub interval_ms: f64,
    /// Whether the timer keeps firing after the first notification.
    pub auto_reset: bool,
    /// Name for the wait-loop thread.
    pub thread_name: String,
    /// Stack size for the wait-loop thread in bytes. `None` uses the default.
    pub stack_size: Option<usize>,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            auto_reset: true,
            thread_name: "horizon-interval".to_string(),
            stack_size: None,
        }
    }
}

impl TimerConfig {
    /// Create a new configuration with the given interval.
    pub fn with_interval(interval_ms: f64) -> Self {
        Self {
            interval_ms,
            ..Default::default()
        }
    }
}

/// Builder for creating timers with custom configuration.
#[derive(Default)]
pub struct TimerBuilder {
    config: TimerConfig,
    dispatcher: Option<Arc<dyn WorkDispatcher>>,
    notification_target: Option<Arc<dyn ContextInvoker>>,
}

impl TimerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interval in milliseconds.
    pub fn interval(mut self, interval_ms: f64) -> Self {
        self.config.interval_ms = interval_ms;
        self
    }

    /// Set whether the timer re-arms itself after each firing.
    pub fn auto_reset(mut self, auto_reset: bool) -> Self {
        self.config.auto_reset = auto_reset;
        self
    }

    /// Set the wait-loop thread name.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Set the stack size for the wait-loop thread.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    /// Use a custom work dispatcher instead of the global thread pool.
    pub fn dispatcher(mut self, dispatcher: Arc<dyn WorkDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Set the initial notification target.
    pub fn notification_target(mut self, target: Arc<dyn ContextInvoker>) -> Self {
        self.notification_target = Some(target);
        self
    }

    /// Build a disarmed timer.
    ///
    /// Fails with [`TimerError::InvalidConfiguration`] if the interval is not
    /// a positive, finite number of milliseconds.
    pub fn build(self) -> Result<IntervalTimer> {
        let dispatcher: Arc<dyn WorkDispatcher> = match self.dispatcher {
            Some(dispatcher) => dispatcher,
            None => ThreadPool::global(),
        };
        IntervalTimer::from_parts(self.config, dispatcher, self.notification_target)
    }
}

impl std::fmt::Debug for TimerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerBuilder")
            .field("config", &self.config)
            .field("has_dispatcher", &self.dispatcher.is_some())
            .field("has_notification_target", &self.notification_target.is_some())
            .finish()
    }
}

/// State shared between the timer handle, its wait loop and dispatched
/// notifications.
struct TimerShared {
    /// Interval in milliseconds, stored as `f64` bits.
    interval_bits: AtomicU64,
    auto_reset: AtomicBool,
    armed: AtomicBool,
    /// Cancel signal of the current armed period. Guarded so the loop's
    /// release never races the disarm path's `set`.
    wait: Mutex<Option<Arc<CancelSignal>>>,
    elapsed: Signal<ElapsedEvent>,
    notification_target: RwLock<Option<Arc<dyn ContextInvoker>>>,
    dispatcher: Arc<dyn WorkDispatcher>,
}

impl TimerShared {
    fn interval_ms(&self) -> f64 {
        f64::from_bits(self.interval_bits.load(Ordering::Acquire))
    }

    /// Deliver one elapsed notification to every subscriber.
    fn notify(&self, event: ElapsedEvent) {
        if self.elapsed.is_empty() {
            return;
        }

        let _span =
            tracing::trace_span!(target: targets::TIMER, "notify", time = %event.signal_time)
                .entered();
        let target = self.notification_target.read().clone();

        for slot in self.elapsed.slots() {
            match &target {
                Some(target) if target.requires_marshaling() => {
                    target.invoke_async(QueuedInvocation::new(move || {
                        slot.invoke(&event);
                    }));
                }
                _ => {
                    slot.invoke(&event);
                }
            }
        }
    }
}

/// Handle state for the current armed period.
struct Lifecycle {
    worker: Option<JoinHandle<()>>,
    thread_name: String,
    stack_size: Option<usize>,
}

/// A recurring-interval notification source.
///
/// The timer starts disarmed with an interval of 100 ms and auto-reset
/// enabled. All methods take `&self`; share it through an `Arc` to arm and
/// disarm from several threads.
pub struct IntervalTimer {
    shared: Arc<TimerShared>,
    /// Serializes arm/disarm transitions, including the disarm join.
    lifecycle: Mutex<Lifecycle>,
}

impl IntervalTimer {
    /// Create a disarmed timer with a 100 ms interval that dispatches on the
    /// global thread pool.
    pub fn new() -> Self {
        Self::from_validated(TimerConfig::default(), ThreadPool::global(), None)
    }

    /// Create a disarmed timer with the given interval in milliseconds.
    pub fn with_interval(interval_ms: f64) -> Result<Self> {
        TimerBuilder::new().interval(interval_ms).build()
    }

    /// Create a disarmed timer from a configuration.
    pub fn with_config(config: TimerConfig) -> Result<Self> {
        Self::from_parts(config, ThreadPool::global(), None)
    }

    /// Get a builder for a custom timer.
    pub fn builder() -> TimerBuilder {
        TimerBuilder::new()
    }

    fn from_parts(
        config: TimerConfig,
        dispatcher: Arc<dyn WorkDispatcher>,
        notification_target: Option<Arc<dyn ContextInvoker>>,
    ) -> Result<Self> {
        validate_interval(config.interval_ms)?;
        Ok(Self::from_validated(config, dispatcher, notification_target))
    }

    fn from_validated(
        config: TimerConfig,
        dispatcher: Arc<dyn WorkDispatcher>,
        notification_target: Option<Arc<dyn ContextInvoker>>,
    ) -> Self {
        Self {
            shared: Arc::new(TimerShared {
                interval_bits: AtomicU64::new(config.interval_ms.to_bits()),
                auto_reset: AtomicBool::new(config.auto_reset),
                armed: AtomicBool::new(false),
                wait: Mutex::new(None),
                elapsed: Signal::new(),
                notification_target: RwLock::new(notification_target),
                dispatcher,
            }),
            lifecycle: Mutex::new(Lifecycle {
                worker: None,
                thread_name: config.thread_name,
                stack_size: config.stack_size,
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    /// Get the interval in milliseconds.
    pub fn interval(&self) -> f64 {
        self.shared.interval_ms()
    }

    /// Set the interval in milliseconds.
    ///
    /// The new value is picked up when the next wait cycle starts; an
    /// in-flight wait keeps its original timeout. Fails with
    /// [`TimerError::InvalidConfiguration`] when `interval_ms` is not
    /// positive, leaving the previous interval in place.
    pub fn set_interval(&self, interval_ms: f64) -> Result<()> {
        validate_interval(interval_ms)?;
        self.shared
            .interval_bits
            .store(interval_ms.to_bits(), Ordering::Release);
        Ok(())
    }

    /// Whether the timer re-arms itself after each firing.
    pub fn auto_reset(&self) -> bool {
        self.shared.auto_reset.load(Ordering::Acquire)
    }

    /// Set whether the timer re-arms itself after each firing.
    ///
    /// Takes effect at the end of the current wait cycle.
    pub fn set_auto_reset(&self, auto_reset: bool) {
        self.shared.auto_reset.store(auto_reset, Ordering::Release);
    }

    /// Get the object used to marshal notifications, if any.
    pub fn notification_target(&self) -> Option<Arc<dyn ContextInvoker>> {
        self.shared.notification_target.read().clone()
    }

    /// Set the object used to marshal notifications.
    ///
    /// When set and it reports that marshaling is required, each subscriber
    /// is invoked through [`ContextInvoker::invoke_async`] instead of directly
    /// on the dispatch thread.
    pub fn set_notification_target(&self, target: Option<Arc<dyn ContextInvoker>>) {
        *self.shared.notification_target.write() = target;
    }

    /// Subscribe to elapsed notifications.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ElapsedEvent) + Send + Sync + 'static,
    {
        self.shared.elapsed.connect(callback)
    }

    /// Remove a subscription.
    ///
    /// Returns `true` if the subscription existed. A notification already
    /// executing the callback is not interrupted.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.elapsed.disconnect(id)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.shared.elapsed.connection_count()
    }

    /// Mark the start of a batch of configuration changes.
    ///
    /// Purely a marker for hosts that initialize components in batches; it
    /// defers nothing.
    pub fn begin_init(&self) {
        tracing::trace!(target: targets::TIMER, "begin_init");
    }

    /// Mark the end of a batch of configuration changes.
    pub fn end_init(&self) {
        tracing::trace!(target: targets::TIMER, "end_init");
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Whether the timer is armed.
    pub fn is_armed(&self) -> bool {
        self.shared.armed.load(Ordering::Acquire)
    }

    /// Arm the timer.
    ///
    /// Starts one wait-loop thread for this armed period and returns without
    /// waiting for it. Does nothing if the timer is already armed. A one-shot
    /// loop that disarmed itself is joined before the new one starts.
    pub fn arm(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if self.is_armed() {
            return;
        }

        // Reap the loop of a previous one-shot period.
        if let Some(stale) = lifecycle.worker.take() {
            join_worker(stale);
        }

        let signal = Arc::new(CancelSignal::new());
        *self.shared.wait.lock() = Some(signal.clone());
        self.shared.armed.store(true, Ordering::Release);

        let mut builder = thread::Builder::new().name(lifecycle.thread_name.clone());
        if let Some(stack_size) = lifecycle.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let shared = self.shared.clone();
        match builder.spawn(move || wait_loop(shared, signal)) {
            Ok(handle) => {
                lifecycle.worker = Some(handle);
                tracing::debug!(
                    target: targets::TIMER,
                    interval_ms = self.interval(),
                    auto_reset = self.auto_reset(),
                    "timer armed"
                );
            }
            Err(err) => {
                self.shared.armed.store(false, Ordering::Release);
                *self.shared.wait.lock() = None;
                tracing::error!(
                    target: targets::TIMER,
                    error = %err,
                    "failed to spawn timer thread, timer stays disarmed"
                );
            }
        }
    }

    /// Disarm the timer.
    ///
    /// Wakes the wait loop and blocks until its thread has exited. Does
    /// nothing if the timer is already disarmed. Notifications submitted
    /// before the call may still be delivered after it returns.
    pub fn disarm(&self) {
        let mut lifecycle = self.lifecycle.lock();
        let was_armed = self.shared.armed.swap(false, Ordering::AcqRel);

        if was_armed {
            // Signal under the lock, join outside it: the loop takes the same
            // lock to release the signal on its way out.
            if let Some(signal) = self.shared.wait.lock().as_ref() {
                signal.set();
            }
        }

        if let Some(worker) = lifecycle.worker.take() {
            join_worker(worker);
            if was_armed {
                tracing::debug!(target: targets::TIMER, "timer disarmed");
            }
        }
    }

    /// Arm or disarm the timer.
    pub fn set_armed(&self, armed: bool) {
        if armed {
            self.arm();
        } else {
            self.disarm();
        }
    }

    /// Alias for [`arm`](Self::arm).
    pub fn start(&self) {
        self.arm();
    }

    /// Alias for [`disarm`](Self::disarm).
    pub fn stop(&self) {
        self.disarm();
    }

    /// Alias for [`disarm`](Self::disarm).
    pub fn close(&self) {
        self.disarm();
    }

    /// Disarm the timer and release every subscription.
    ///
    /// Safe to call any number of times. Also run when the timer is dropped.
    pub fn dispose(&self) {
        self.disarm();
        self.shared.elapsed.disconnect_all();
    }
}

impl Default for IntervalTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IntervalTimer {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for IntervalTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalTimer")
            .field("interval_ms", &self.interval())
            .field("auto_reset", &self.auto_reset())
            .field("armed", &self.is_armed())
            .field("subscribers", &self.subscriber_count())
            .field("has_notification_target", &self.notification_target().is_some())
            .finish()
    }
}

static_assertions::assert_impl_all!(IntervalTimer: Send, Sync);

/// Reject intervals that are not positive or cannot be waited on.
fn validate_interval(interval_ms: f64) -> Result<Duration> {
    if interval_ms.is_nan() || interval_ms <= 0.0 {
        return Err(TimerError::invalid_interval(interval_ms));
    }
    Duration::try_from_secs_f64(interval_ms / 1000.0)
        .map_err(|_| TimerError::invalid_interval(interval_ms))
}

fn join_worker(worker: JoinHandle<()>) {
    if worker.join().is_err() {
        tracing::error!(target: targets::TIMER, "timer thread panicked");
    }
}

/// Body of the wait-loop thread for one armed period.
fn wait_loop(shared: Arc<TimerShared>, signal: Arc<CancelSignal>) {
    let _span = tracing::debug_span!(target: targets::TIMER, "wait_loop").entered();

    while shared.armed.load(Ordering::Acquire) {
        let interval_ms = shared.interval_ms();
        // Stored intervals are validated, so this only guards the conversion.
        let timeout = Duration::try_from_secs_f64(interval_ms / 1000.0).unwrap_or(Duration::MAX);

        if signal.wait_timeout(timeout) == WaitOutcome::Signaled {
            break;
        }
        // A disarm racing the timeout wins.
        if signal.is_set() {
            break;
        }

        let auto_reset = shared.auto_reset.load(Ordering::Acquire);
        if !auto_reset {
            shared.armed.store(false, Ordering::Release);
        }

        let event = ElapsedEvent::now();
        tracing::trace!(target: targets::TIMER, interval_ms, "interval elapsed");
        let notify_shared = shared.clone();
        shared
            .dispatcher
            .submit(Box::new(move || notify_shared.notify(event)));

        if !auto_reset {
            break;
        }
    }

    let mut wait = shared.wait.lock();
    if wait.as_ref().is_some_and(|current| Arc::ptr_eq(current, &signal)) {
        *wait = None;
    }
}
