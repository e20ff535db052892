//! Trailing-edge debouncing over an async channel.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

/// Coalesces bursts of events.
///
/// A batch opens with the first event and closes once `window` has passed
/// without another event arriving. Every event received in between is part of
/// the batch, in arrival order.
#[derive(Debug)]
pub struct Debouncer<T> {
    rx: mpsc::UnboundedReceiver<T>,
    window: Duration,
}

impl<T> Debouncer<T> {
    pub fn new(rx: mpsc::UnboundedReceiver<T>, window: Duration) -> Self {
        Self { rx, window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait for the next quiet period.
    ///
    /// Returns `None` once the channel is closed and drained. A batch that is
    /// still open when the last sender goes away is returned immediately.
    pub async fn next_batch(&mut self) -> Option<Vec<T>> {
        let first = self.rx.recv().await?;
        let mut batch = vec![first];
        if self.window.is_zero() {
            while let Ok(item) = self.rx.try_recv() {
                batch.push(item);
            }
            return Some(batch);
        }

        let mut deadline = Instant::now() + self.window;
        loop {
            tokio::select! {
                item = self.rx.recv() => match item {
                    Some(item) => {
                        batch.push(item);
                        deadline = Instant::now() + self.window;
                    }
                    None => break,
                },
                _ = sleep_until(deadline) => break,
            }
        }
        Some(batch)
    }
}
