use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A single debounced timer. Scheduling aborts whatever was pending.
#[derive(Debug, Default)]
pub struct TimerSlot {
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F>(&mut self, delay: Duration, body: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            body.await;
        }));
    }

    /// Schedules only when nothing is pending.
    pub fn schedule_if_idle<F>(&mut self, delay: Duration, body: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_pending() {
            return false;
        }
        self.schedule(delay, body);
        true
    }

    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Every timer owned by one table.
#[derive(Debug, Default)]
pub struct TableTimers {
    pub scroll_render: TimerSlot,
    pub jump_check: TimerSlot,
    pub follow_up: TimerSlot,
    pub deferred_render: TimerSlot,
    pub placeholder_heal: TimerSlot,
    pub scroll_throttle: TimerSlot,
    pub datetime_throttle: TimerSlot,
}

impl TableTimers {
    pub fn cancel_all(&mut self) {
        for slot in [
            &mut self.scroll_render,
            &mut self.jump_check,
            &mut self.follow_up,
            &mut self.deferred_render,
            &mut self.placeholder_heal,
            &mut self.scroll_throttle,
            &mut self.datetime_throttle,
        ] {
            slot.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_the_pending_body() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut slot = TimerSlot::new();

        for _ in 0..3 {
            let fired = fired.clone();
            slot.schedule(Duration::from_millis(100), async move {
                fired.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(slot.is_pending());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!slot.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_if_idle_keeps_the_first_timer() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut slot = TimerSlot::new();

        let first = fired.clone();
        assert!(slot.schedule_if_idle(Duration::from_millis(10), async move {
            first.fetch_add(1, Ordering::SeqCst);
        }));
        let second = fired.clone();
        assert!(!slot.schedule_if_idle(Duration::from_millis(10), async move {
            second.fetch_add(10, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        slot.schedule(Duration::from_millis(10), async {});
        slot.cancel();
        assert!(!slot.is_pending());
    }
}
