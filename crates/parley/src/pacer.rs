//! Typewriter pacing for streamed text.
//!
//! Text arrives from the network in bursts of arbitrary size. The pacer holds
//! it back and releases one character per period so the visible answer grows
//! at a steady rate regardless of how the bytes were delivered.
use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

pub const DEFAULT_PACING_PERIOD: Duration = Duration::from_millis(20);

#[derive(Debug)]
pub struct RenderPacer {
    pending: VecDeque<char>,
    period: Duration,
    // Present exactly while a drain cycle is running
    cycle: Option<Interval>,
}

impl Default for RenderPacer {
    fn default() -> Self {
        Self::new(DEFAULT_PACING_PERIOD)
    }
}

impl RenderPacer {
    pub fn new(period: Duration) -> Self {
        Self {
            pending: VecDeque::new(),
            period,
            cycle: None,
        }
    }

    /// Whether a drain cycle is running
    pub fn is_active(&self) -> bool {
        self.cycle.is_some()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Queue text for release, starting the cycle if it is not running
    pub fn enqueue(&mut self, text: &str) {
        self.pending.extend(text.chars());
        if self.cycle.is_none() && !self.pending.is_empty() {
            let mut cycle = interval_at(Instant::now() + self.period, self.period);
            cycle.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.cycle = Some(cycle);
        }
    }

    /// Wait one period and release the next character.
    ///
    /// Returns `None` straight away when the cycle is not running. The cycle
    /// stops once the queue is drained. Dropping the future before it
    /// completes releases nothing.
    pub async fn tick(&mut self) -> Option<char> {
        let cycle = self.cycle.as_mut()?;
        cycle.tick().await;

        let next = self.pending.pop_front();
        if self.pending.is_empty() {
            self.cycle = None;
        }
        next
    }

    /// Release everything still queued at once and stop the cycle.
    ///
    /// Calling it again returns an empty string.
    pub fn flush(&mut self) -> String {
        self.cycle = None;
        self.pending.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_release_one_char_in_order() {
        let mut pacer = RenderPacer::new(Duration::from_millis(20));
        assert!(!pacer.is_active());

        pacer.enqueue("héy");
        assert!(pacer.is_active());

        let start = Instant::now();
        let mut released = String::new();
        while let Some(c) = pacer.tick().await {
            released.push(c);
        }
        assert_eq!(released, "héy");
        assert!(!pacer.is_active());
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_visible_plus_flush_equals_delivered() {
        let mut pacer = RenderPacer::default();
        let mut visible = String::new();

        pacer.enqueue("Hel");
        visible.extend(pacer.tick().await);
        pacer.enqueue("lo, world");
        visible.extend(pacer.tick().await);
        visible.extend(pacer.tick().await);
        assert_eq!(visible, "Hel");

        visible.push_str(&pacer.flush());
        assert_eq!(visible, "Hello, world");
        assert_eq!(pacer.pending_len(), 0);
        assert!(!pacer.is_active());
    }

    #[tokio::test]
    async fn test_flush_is_idempotent() {
        let mut pacer = RenderPacer::default();
        pacer.enqueue("abc");
        assert_eq!(pacer.flush(), "abc");
        assert_eq!(pacer.flush(), "");
        assert_eq!(pacer.tick().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_after_drain_restarts_cycle() {
        let mut pacer = RenderPacer::default();
        pacer.enqueue("a");
        assert_eq!(pacer.tick().await, Some('a'));
        assert!(!pacer.is_active());

        pacer.enqueue("");
        assert!(!pacer.is_active());

        pacer.enqueue("b");
        assert!(pacer.is_active());
        assert_eq!(pacer.tick().await, Some('b'));
    }
}
