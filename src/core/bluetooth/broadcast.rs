//! Observable session state
//!
//! Two flavours of fan-out:
//! - [`StateCell`]: latest value wins, late subscribers see it immediately.
//! - [`EventBus`]: every event reaches every subscriber; a full subscriber
//!   queue suspends the publisher until there is room.

use std::sync::Mutex;

use log::debug;
use tokio::sync::{mpsc, watch};

/// A value observers can read or watch for changes
#[derive(Debug)]
pub struct StateCell<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> StateCell<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Stores `value`, whether or not anyone is watching.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Applies `update` under the cell's lock. `Ok` stores and publishes the
    /// new value, `Err` leaves the current one untouched.
    pub fn update<R>(&self, update: impl FnOnce(&T) -> Result<T, R>) -> Result<T, R> {
        let mut outcome = None;
        self.tx.send_if_modified(|current| match update(current) {
            Ok(next) => {
                *current = next.clone();
                outcome = Some(Ok(next));
                true
            }
            Err(rejected) => {
                outcome = Some(Err(rejected));
                false
            }
        });
        // send_if_modified always runs the closure exactly once
        outcome.unwrap_or_else(|| unreachable!())
    }

    /// A receiver that starts out holding the current value.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

/// Lossless fan-out of events to any number of subscribers
#[derive(Debug)]
pub struct EventBus<T> {
    capacity: usize,
    subscribers: Mutex<Vec<mpsc::Sender<T>>>,
}

impl<T: Clone + Send> EventBus<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a subscriber. Only events published afterwards are delivered.
    pub fn subscribe(&self) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.lock().push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().iter().filter(|tx| !tx.is_closed()).count()
    }

    /// Delivers `event` to every live subscriber, waiting on full queues.
    pub async fn publish(&self, event: T) {
        let subscribers: Vec<_> = self.lock().clone();
        let mut closed = false;
        for tx in subscribers {
            if tx.send(event.clone()).await.is_err() {
                closed = true;
            }
        }
        if closed {
            self.lock().retain(|tx| !tx.is_closed());
            debug!("Dropped closed event subscribers");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::Sender<T>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
