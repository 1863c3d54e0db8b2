//! A channel that emits a single value after a delay, for composing
//! timeouts into a [`crate::select::Select`].

use std::thread;
use std::time::{Duration, Instant};

use crate::Receiver;

/// Returns a [`Receiver`] that emits `Instant::now()` once `duration` has
/// elapsed, then closes.
///
/// The delay is driven by a detached `std::thread::spawn` rather than any
/// particular async runtime's timer, so the channel core stays usable on
/// any executor. Include the returned receiver as one case of a `Select`
/// to implement a timeout: if it wins, the timeout has elapsed.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use futures_executor::block_on;
///
/// let mut timer = parkline::timer::after(Duration::from_millis(1));
/// block_on(async {
///     assert!(timer.recv().await.is_ok());
///     assert!(timer.recv().await.is_err());
/// });
/// ```
pub fn after(duration: Duration) -> Receiver<Instant> {
    // Capacity 1 is always valid; the only failure mode of `channel` is an
    // invalid capacity.
    let (tx, rx) = crate::channel(1).unwrap();

    thread::spawn(move || {
        thread::sleep(duration);
        // The receiver may already be gone; a failed send is simply
        // discarded, there is nobody left to observe the timeout.
        let _ = tx.try_send(Instant::now());
        tx.close();
    });

    rx
}
