//! Logging facilities for Horizon Interval.
//!
//! Horizon Interval uses the `tracing` crate for instrumentation. The library
//! never installs a subscriber; to see its output, install one in your
//! application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_max_level(tracing::Level::DEBUG)
//!         .init();
//!
//!     // Your application code...
//! }
//! ```
//!
//! Arm and disarm transitions are logged at `debug`, every firing at `trace`,
//! and failures that cannot be returned to a caller (worker spawn failures,
//! panicking subscribers) at `error`.

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem, for
/// example `RUST_LOG=horizon_interval::timer=trace`.
pub mod targets {
    /// Crate-wide target.
    pub const CORE: &str = "horizon_interval";
    /// Timer lifecycle and wait loop.
    pub const TIMER: &str = "horizon_interval::timer";
    /// Work dispatch (thread pool) target.
    pub const DISPATCH: &str = "horizon_interval::dispatch";
    /// Subscriber storage and emission.
    pub const SIGNAL: &str = "horizon_interval::signal";
    /// Context invoker target.
    pub const INVOCATION: &str = "horizon_interval::invocation";
}
