//! Recurring-interval timers for Horizon applications.
//!
//! This crate provides [`IntervalTimer`], a component that raises an elapsed
//! notification to its subscribers every `interval` milliseconds once armed,
//! either repeatedly (auto-reset) or once.
//!
//! - **Timer**: armed/disarmed lifecycle driven by one dedicated wait thread
//!   per armed period; disarming is synchronous
//! - **Cancel Signal**: the settable, waitable flag the wait thread blocks on
//! - **Dispatch**: notifications run on a [`WorkDispatcher`], never on the
//!   wait thread ([`ThreadPool`] by default)
//! - **Invocation**: optional [`ContextInvoker`] to marshal subscriber calls
//!   onto a specific thread
//! - **Signal**: ordered subscriber storage
//!
//! # Example
//!
//! ```
//! use horizon_interval::IntervalTimer;
//! use std::time::Duration;
//!
//! let timer = IntervalTimer::with_interval(50.0)?;
//! timer.subscribe(|event| {
//!     println!("tick at {}", event.signal_time);
//! });
//!
//! timer.arm();
//! std::thread::sleep(Duration::from_millis(120));
//! timer.disarm();
//! # Ok::<(), horizon_interval::TimerError>(())
//! ```
//!
//! # One-shot Example
//!
//! ```
//! use horizon_interval::TimerBuilder;
//! use std::time::Duration;
//!
//! let timer = TimerBuilder::new().interval(10.0).auto_reset(false).build()?;
//! timer.arm();
//! std::thread::sleep(Duration::from_millis(60));
//!
//! // The timer disarmed itself after firing once.
//! assert!(!timer.is_armed());
//! # Ok::<(), horizon_interval::TimerError>(())
//! ```

pub mod cancel;
pub mod dispatch;
mod error;
pub mod invocation;
pub mod logging;
pub mod signal;
mod timer;

pub use cancel::{CancelSignal, WaitOutcome};
pub use dispatch::{ThreadPool, ThreadPoolConfig, WorkDispatcher};
pub use error::{Result, ThreadPoolError, TimerError};
pub use invocation::{ContextInvoker, InvocationQueue, QueuedInvocation};
pub use signal::{Signal, Slot, SubscriptionId};
pub use timer::{DEFAULT_INTERVAL_MS, ElapsedEvent, IntervalTimer, TimerBuilder, TimerConfig};
