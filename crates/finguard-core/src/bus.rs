//! Typed publish/subscribe per component

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Event fan-out for one component.
///
/// Observers run synchronously inside [`EventBus::publish`], in registration
/// order; async consumers use [`EventBus::subscribe`]. No lock is held while
/// an observer runs, so an observer may call back into the publisher.
pub struct EventBus<T> {
    observers: Mutex<Vec<Observer<T>>>,
    sender: broadcast::Sender<T>,
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            observers: Mutex::new(Vec::new()),
            sender,
        }
    }

    pub fn observe(&self, observer: impl Fn(&T) + Send + Sync + 'static) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: T) {
        let observers: Vec<Observer<T>> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for observer in observers {
            observer(&event);
        }

        // No subscribers is fine
        let _ = self.sender.send(event);
    }
}

impl<T: Clone + Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn observers_see_every_event() {
        let bus = EventBus::new(8);
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        bus.observe(move |n: &usize| {
            counter.fetch_add(*n, Ordering::SeqCst);
        });

        bus.publish(2);
        bus.publish(3);
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish("renewed".to_string());
        assert_eq!(rx.recv().await.unwrap(), "renewed");
    }

    #[test]
    fn observer_may_reenter() {
        let bus = Arc::new(EventBus::new(8));
        let count = Arc::new(AtomicUsize::new(0));

        let inner_bus = Arc::downgrade(&bus);
        let inner_count = count.clone();
        bus.observe(move |n: &u32| {
            inner_count.fetch_add(1, Ordering::SeqCst);
            if *n > 0
                && let Some(bus) = inner_bus.upgrade()
            {
                bus.publish(n - 1);
            }
        });

        bus.publish(2);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
