//! Heartbeat demo.
//!
//! Arms a repeating timer whose notifications are marshaled onto the main
//! thread through an `InvocationQueue`, then a one-shot timer that fires on
//! the dispatch pool.
//!
//! Run with: `cargo run -p horizon-interval --example heartbeat`
//! Set `RUST_LOG=horizon_interval=trace` to see every firing.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use horizon_interval::{IntervalTimer, InvocationQueue, TimerBuilder, TimerError};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), TimerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    let main_loop = Arc::new(InvocationQueue::new());
    let heartbeat = IntervalTimer::builder()
        .interval(250.0)
        .thread_name("heartbeat")
        .notification_target(main_loop.clone())
        .build()?;

    let beats = Arc::new(AtomicUsize::new(0));
    let beats_clone = beats.clone();
    heartbeat.subscribe(move |event| {
        let n = beats_clone.fetch_add(1, Ordering::SeqCst) + 1;
        println!(
            "beat #{n} at {} on {:?}",
            event.signal_time.format("%H:%M:%S%.3f"),
            std::thread::current().name().unwrap_or("<unnamed>")
        );
    });

    heartbeat.arm();
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        main_loop.process_pending_timeout(Duration::from_millis(50));
    }
    heartbeat.disarm();
    println!("heartbeat stopped after {} beats", beats.load(Ordering::SeqCst));

    let reminder = TimerBuilder::new().interval(300.0).auto_reset(false).build()?;
    reminder.subscribe(|event| println!("reminder fired once at {}", event.signal_time));
    reminder.arm();
    std::thread::sleep(Duration::from_millis(500));
    println!("reminder armed: {}", reminder.is_armed());

    Ok(())
}
