use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout, Duration};

use crate::limits::RENDER_DEBOUNCE_MS;

const CHANNEL_CAPACITY: usize = 256;

/// Debounced render-refresh fan-out.
///
/// Mutations and reconciles mark the schedule dirty; subscribers receive one
/// tick per quiet window (trailing edge, `RENDER_DEBOUNCE_MS`). Purely a
/// render-performance concern; state is already consistent when a tick fires.
pub struct RenderHub {
    dirty_tx: mpsc::UnboundedSender<()>,
    tick_tx: broadcast::Sender<()>,
}

impl RenderHub {
    pub fn new() -> Self {
        let (dirty_tx, dirty_rx) = mpsc::unbounded_channel();
        let (tick_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        tokio::spawn(debounce_loop(dirty_rx, tick_tx.clone()));
        Self { dirty_tx, tick_tx }
    }

    /// Mark the schedule dirty. Non-blocking; callable from any operation.
    pub fn mark_dirty(&self) {
        let _ = self.dirty_tx.send(());
    }

    /// Subscribe to debounced ticks. Drop the receiver to detach.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tick_tx.subscribe()
    }
}

/// Trailing-edge debounce: after a dirty mark, keep extending the window while
/// further marks arrive; emit one tick once the window stays quiet.
async fn debounce_loop(mut dirty_rx: mpsc::UnboundedReceiver<()>, tick_tx: broadcast::Sender<()>) {
    while dirty_rx.recv().await.is_some() {
        loop {
            match timeout(Duration::from_millis(RENDER_DEBOUNCE_MS), dirty_rx.recv()).await {
                Ok(Some(())) => continue, // another mark, restart the window
                Ok(None) => break,        // hub dropped, flush the final tick
                Err(_) => break,          // window stayed quiet
            }
        }
        metrics::counter!(crate::observability::RENDER_TICKS_TOTAL).increment(1);
        // Send is a no-op if nobody is listening.
        let _ = tick_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn burst_coalesces_into_one_tick() {
        let hub = RenderHub::new();
        let mut rx = hub.subscribe();

        for _ in 0..10 {
            hub.mark_dirty();
        }
        tokio::task::yield_now().await;
        advance(Duration::from_millis(150)).await;

        rx.recv().await.unwrap();
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn window_extends_while_marks_arrive() {
        let hub = RenderHub::new();
        let mut rx = hub.subscribe();

        hub.mark_dirty();
        tokio::task::yield_now().await;
        advance(Duration::from_millis(60)).await;

        hub.mark_dirty(); // restarts the window
        tokio::task::yield_now().await;
        advance(Duration::from_millis(60)).await;

        // 120ms after the first mark but only 60ms after the last, so no tick yet.
        assert!(rx.try_recv().is_err());

        advance(Duration::from_millis(50)).await;
        rx.recv().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn separate_windows_tick_separately() {
        let hub = RenderHub::new();
        let mut rx = hub.subscribe();

        hub.mark_dirty();
        rx.recv().await.unwrap();

        hub.mark_dirty();
        rx.recv().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn tick_without_subscribers_is_noop() {
        let hub = RenderHub::new();
        // No subscriber; must not panic.
        hub.mark_dirty();
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
}
