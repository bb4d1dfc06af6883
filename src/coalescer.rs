use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use ewelink::SocketMessage;

type Settle = Box<dyn FnOnce(SocketMessage) + Send>;

/// A message waiting for its window to close. Whoever takes the slot first
/// (the timer or [`UpdateCoalescer::flush`]) delivers it.
type Slot = Arc<Mutex<Option<(SocketMessage, Settle)>>>;

struct Pending {
    slot: Slot,
    task: JoinHandle<()>,
}

/// Debounces push updates per device.
///
/// Devices regularly send keep-alive bursts (on, then off, then on again)
/// within a second or two. Only the last update for a device inside the
/// tolerance window is delivered.
#[derive(Default)]
pub struct UpdateCoalescer {
    timers: Mutex<HashMap<String, Pending>>,
    blocks: Mutex<HashMap<String, Instant>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn settle(slot: &Slot) {
    let taken = lock(slot).take();
    if let Some((message, on_settled)) = taken {
        on_settled(message);
    }
}

impl UpdateCoalescer {
    /// How long updates for a device are ignored after [`Self::block_updates`].
    pub const BLOCK_WINDOW: Duration = Duration::from_secs(5);

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `on_settled` for this message, replacing any update still
    /// pending for the same device.
    pub fn handle_incoming<F>(&self, tolerance: Duration, message: SocketMessage, on_settled: F)
    where
        F: FnOnce(SocketMessage) + Send + 'static,
    {
        if let Some(code) = message.error_code() {
            log::error!("Error code in websocket: {code}");
            return;
        }

        if !message.is_update() {
            log::trace!("Ignoring websocket message: {message:?}");
            return;
        }

        let Some(device_id) = message.deviceid.clone() else {
            log::trace!("Ignoring websocket update without device id: {message:?}");
            return;
        };

        if self.is_blocked(&device_id) {
            log::debug!("[{device_id}] Update ignored, device recently changed locally");
            return;
        }

        log::info!(
            "[{device_id}] Websocket update received: {}",
            message.switch_state().unwrap_or("<none>")
        );

        let on_settled: Settle = Box::new(on_settled);
        let slot: Slot = Arc::new(Mutex::new(Some((message, on_settled))));
        let task = tokio::spawn({
            let slot = slot.clone();
            async move {
                tokio::time::sleep(tolerance).await;
                settle(&slot);
            }
        });

        if let Some(previous) = lock(&self.timers).insert(device_id, Pending { slot, task }) {
            previous.task.abort();
        }
    }

    /// Suppress updates for a device for [`Self::BLOCK_WINDOW`].
    pub fn block_updates(&self, device_id: &str) {
        let until = Instant::now() + Self::BLOCK_WINDOW;
        lock(&self.blocks).insert(device_id.to_string(), until);
    }

    #[must_use]
    pub fn is_blocked(&self, device_id: &str) -> bool {
        let mut blocks = lock(&self.blocks);
        match blocks.get(device_id) {
            Some(until) if Instant::now() < *until => true,
            Some(_) => {
                blocks.remove(device_id);
                false
            }
            None => false,
        }
    }

    /// Number of updates still waiting for their window to close.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.timers)
            .values()
            .filter(|pending| lock(&pending.slot).is_some())
            .count()
    }

    /// Deliver every pending update now, without waiting for its window.
    pub fn flush(&self) -> usize {
        let pending: Vec<Pending> = lock(&self.timers).drain().map(|(_, p)| p).collect();
        let mut count = 0;
        for Pending { slot, task } in pending {
            task.abort();
            if lock(&slot).is_some() {
                count += 1;
            }
            settle(&slot);
        }
        count
    }

    /// Drop every pending update.
    pub fn cancel_all(&self) {
        for (_, pending) in lock(&self.timers).drain() {
            pending.task.abort();
        }
    }
}

impl fmt::Debug for UpdateCoalescer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateCoalescer")
            .field("pending", &self.pending())
            .field("blocks", &lock(&self.blocks).len())
            .finish()
    }
}

impl Drop for UpdateCoalescer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use ewelink::SocketMessage;

    use crate::coalescer::UpdateCoalescer;

    type Delivered = Arc<Mutex<Vec<(String, tokio::time::Instant)>>>;

    fn collector(sink: &Delivered) -> impl FnOnce(SocketMessage) + Send + 'static {
        let sink = sink.clone();
        move |msg| {
            let state = msg.switch_state().unwrap_or_default().to_string();
            sink.lock().unwrap().push((state, tokio::time::Instant::now()));
        }
    }

    const WINDOW: Duration = Duration::from_secs(5);

    #[tokio::test(start_paused = true)]
    async fn last_event_in_window_wins() {
        let coalescer = UpdateCoalescer::new();
        let delivered = Delivered::default();
        let start = tokio::time::Instant::now();

        coalescer.handle_incoming(WINDOW, SocketMessage::update("B", "off"), collector(&delivered));
        tokio::time::sleep(Duration::from_secs(2)).await;
        coalescer.handle_incoming(WINDOW, SocketMessage::update("B", "on"), collector(&delivered));

        tokio::time::sleep(Duration::from_secs(10)).await;

        let delivered = delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, "on");
        assert!(delivered[0].1 - start >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn devices_are_independent() {
        let coalescer = UpdateCoalescer::new();
        let delivered = Delivered::default();

        coalescer.handle_incoming(WINDOW, SocketMessage::update("A", "on"), collector(&delivered));
        coalescer.handle_incoming(WINDOW, SocketMessage::update("B", "off"), collector(&delivered));
        assert_eq!(coalescer.pending(), 2);

        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(delivered.lock().unwrap().len(), 2);
        assert_eq!(coalescer.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_device_is_ignored() {
        let coalescer = UpdateCoalescer::new();
        let delivered = Delivered::default();

        coalescer.block_updates("B");
        tokio::time::sleep(Duration::from_secs(4)).await;
        coalescer.handle_incoming(WINDOW, SocketMessage::update("B", "on"), collector(&delivered));
        assert_eq!(coalescer.pending(), 0);

        // the block expires after 5 seconds
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!coalescer.is_blocked("B"));
        coalescer.handle_incoming(WINDOW, SocketMessage::update("B", "off"), collector(&delivered));

        tokio::time::sleep(Duration::from_secs(6)).await;
        let delivered = delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, "off");
    }

    #[tokio::test(start_paused = true)]
    async fn errors_and_malformed_events_are_dropped() {
        let coalescer = UpdateCoalescer::new();
        let delivered = Delivered::default();

        let error = SocketMessage {
            error: Some(406),
            ..SocketMessage::default()
        };
        coalescer.handle_incoming(WINDOW, error, collector(&delivered));
        coalescer.handle_incoming(WINDOW, SocketMessage::default(), collector(&delivered));

        let no_id = SocketMessage {
            deviceid: None,
            ..SocketMessage::update("A", "on")
        };
        coalescer.handle_incoming(WINDOW, no_id, collector(&delivered));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(delivered.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_drops_pending() {
        let coalescer = UpdateCoalescer::new();
        let delivered = Delivered::default();

        coalescer.handle_incoming(WINDOW, SocketMessage::update("A", "on"), collector(&delivered));
        coalescer.cancel_all();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(delivered.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn flush_delivers_pending_now() {
        let coalescer = UpdateCoalescer::new();
        let delivered = Delivered::default();
        let start = tokio::time::Instant::now();

        coalescer.handle_incoming(WINDOW, SocketMessage::update("A", "off"), collector(&delivered));
        coalescer.handle_incoming(WINDOW, SocketMessage::update("A", "on"), collector(&delivered));
        coalescer.handle_incoming(WINDOW, SocketMessage::update("B", "off"), collector(&delivered));

        assert_eq!(coalescer.flush(), 2);
        assert_eq!(coalescer.pending(), 0);
        {
            let mut delivered = delivered.lock().unwrap().clone();
            delivered.sort();
            assert_eq!(delivered.len(), 2);
            assert_eq!(delivered[0], ("off".to_string(), start));
            assert_eq!(delivered[1], ("on".to_string(), start));
        }

        // the aborted timers never deliver a second time
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(delivered.lock().unwrap().len(), 2);
        assert_eq!(coalescer.flush(), 0);
    }
}
