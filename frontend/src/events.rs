use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracker_shared::{Session, SessionModule};

const DEFAULT_CAPACITY: usize = 256;

/// Events exchanged between the dashboard widgets.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    SessionSelected(Session),
    SessionLoadData(Vec<SessionModule>),
    TableClear,
    /// The time slider moved; payload is `datetime_unix`.
    TimeSliderChanged(i64),
    /// Ask the time slider to jump; payload is `datetime_unix`.
    TimeSliderSet(i64),
}

impl BusEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BusEvent::SessionSelected(_) => "session_selected",
            BusEvent::SessionLoadData(_) => "session_load_data",
            BusEvent::TableClear => "clearTable",
            BusEvent::TimeSliderChanged(_) => "time_slider_changed",
            BusEvent::TimeSliderSet(_) => "time_slider_set",
        }
    }
}

/// In-process publish/subscribe bus.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: BusEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            tracing::debug!(event = name, "no listeners for event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    /// Runs `handler` for every event until the returned guard is dropped.
    /// The receiver is registered before this returns, so events emitted
    /// afterwards are never missed.
    pub fn listen<F>(&self, mut handler: F) -> Subscription
    where
        F: FnMut(BusEvent) + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => handler(event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Subscription { handle }
    }
}

/// Listener guard; dropping it unsubscribes.
#[must_use = "dropping the subscription stops the listener"]
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn listener_receives_until_dropped() {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let sub = bus.listen(move |event| sink.lock().unwrap().push(event.name()));
        assert!(sub.is_active());

        bus.emit(BusEvent::TableClear);
        bus.emit(BusEvent::TimeSliderChanged(1_756_281_949));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["clearTable", "time_slider_changed"]
        );

        drop(sub);
        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.emit(BusEvent::TableClear);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn emit_without_listeners_is_harmless() {
        let bus = EventBus::new(4);
        bus.emit(BusEvent::TimeSliderSet(5));
        let mut rx = bus.subscribe();
        bus.emit(BusEvent::TimeSliderSet(6));
        assert_eq!(rx.recv().await.unwrap(), BusEvent::TimeSliderSet(6));
    }
}
