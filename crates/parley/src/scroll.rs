use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub const DEFAULT_SCROLL_COALESCE: Duration = Duration::from_millis(30);
const CHANNEL_CAPACITY: usize = 256;

/// Asks the view to keep the newest content in sight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollSignal;

/// Fans scroll requests out to any number of listeners.
///
/// The immediate channel fires once per request. The normal channel is
/// debounced on the trailing edge: a burst of requests produces one signal,
/// sent once no new request has arrived for the coalescing window.
#[derive(Debug)]
pub struct ScrollBus {
    immediate: broadcast::Sender<ScrollSignal>,
    normal: broadcast::Sender<ScrollSignal>,
    coalesce: Duration,
    pending_normal: Option<JoinHandle<()>>,
}

impl Default for ScrollBus {
    fn default() -> Self {
        Self::new(DEFAULT_SCROLL_COALESCE)
    }
}

impl ScrollBus {
    pub fn new(coalesce: Duration) -> Self {
        let (immediate, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (normal, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            immediate,
            normal,
            coalesce,
            pending_normal: None,
        }
    }

    pub fn subscribe_immediate(&self) -> broadcast::Receiver<ScrollSignal> {
        self.immediate.subscribe()
    }

    pub fn subscribe_normal(&self) -> broadcast::Receiver<ScrollSignal> {
        self.normal.subscribe()
    }

    pub fn signal_immediate(&self) {
        // No listeners is fine
        let _ = self.immediate.send(ScrollSignal);
    }

    /// Schedule a normal signal, replacing any that has not fired yet
    pub fn request_normal(&mut self) {
        if let Some(pending) = self.pending_normal.take() {
            pending.abort();
        }
        let normal = self.normal.clone();
        let coalesce = self.coalesce;
        match Handle::try_current() {
            Ok(runtime) => {
                self.pending_normal = Some(runtime.spawn(async move {
                    tokio::time::sleep(coalesce).await;
                    let _ = normal.send(ScrollSignal);
                }));
            }
            // Outside a runtime there is nothing to debounce against
            Err(_) => {
                let _ = normal.send(ScrollSignal);
            }
        }
    }
}

impl Drop for ScrollBus {
    fn drop(&mut self) {
        if let Some(pending) = self.pending_normal.take() {
            pending.abort();
        }
    }
}
