//! In-memory multicast source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::bus::{EventSink, Notification, Subscription};
use crate::error::{BusError, StreamError};

/// When listeners see a published notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Queued on every listener before `publish` returns.
    Immediate,
    /// Handed to a forwarding task; listeners see it on a later scheduling turn.
    #[default]
    Deferred,
}

type Listener<M> = mpsc::UnboundedSender<Notification<M>>;

/// Work queued for the deferred forwarder, in publish order.
enum Dispatch<M> {
    /// Deliver to the listeners registered when the notification was published.
    Deliver {
        notification: Notification<M>,
        listeners: Vec<Listener<M>>,
    },
    /// Everything queued earlier has been delivered; the forwarder exits.
    Close,
}

/// In-memory pub/sub hub.
///
/// - Unbounded per-listener queues, so a slow listener never drops items
/// - No replay for late subscribers: the audience of a notification is fixed
///   when it is published, in both delivery modes
/// - Closing ends every listener's stream after the notifications already
///   published; later publishes fail with [`BusError::Closed`]
#[derive(Debug)]
pub struct Broadcaster<M> {
    subscribers: Mutex<Vec<Listener<M>>>,
    forwarder: Option<mpsc::UnboundedSender<Dispatch<M>>>,
    closed: AtomicBool,
}

impl<M> Broadcaster<M>
where
    M: Clone + Send + 'static,
{
    pub fn new(mode: DeliveryMode) -> Self {
        let forwarder = match mode {
            DeliveryMode::Immediate => None,
            DeliveryMode::Deferred => match Handle::try_current() {
                Ok(handle) => {
                    let (tx, mut rx) = mpsc::unbounded_channel::<Dispatch<M>>();
                    handle.spawn(async move {
                        while let Some(dispatch) = rx.recv().await {
                            match dispatch {
                                Dispatch::Deliver {
                                    notification,
                                    listeners,
                                } => deliver(&listeners, notification),
                                Dispatch::Close => break,
                            }
                        }
                    });
                    Some(tx)
                }
                Err(_) => {
                    warn!("no async runtime available; deferred delivery falls back to immediate");
                    None
                }
            },
        };

        Self {
            subscribers: Mutex::new(Vec::new()),
            forwarder,
            closed: AtomicBool::new(false),
        }
    }

    pub fn immediate() -> Self {
        Self::new(DeliveryMode::Immediate)
    }

    pub fn deferred() -> Self {
        Self::new(DeliveryMode::Deferred)
    }

    /// Effective delivery mode (deferred needs a runtime at construction).
    pub fn mode(&self) -> DeliveryMode {
        if self.forwarder.is_some() {
            DeliveryMode::Deferred
        } else {
            DeliveryMode::Immediate
        }
    }

    /// Register a new listener. Only notifications published from now on reach it.
    pub fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::unbounded_channel();

        // If the lock is poisoned, we still return a subscription;
        // it just won't receive messages.
        match self.subscribers.lock() {
            Ok(_) if self.is_closed() => return Subscription::closed(),
            Ok(mut subs) => subs.push(tx),
            Err(_) => warn!("broadcaster lock poisoned; subscription will stay empty"),
        }

        Subscription::new(rx)
    }

    /// Number of listeners still registered (dropped ones are pruned on publish).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|subs| subs.len()).unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Complete every listener's stream. Idempotent.
    ///
    /// In deferred mode, notifications published before the call are still
    /// delivered; listeners see the end of the stream after them.
    pub fn close(&self) {
        let mut subs = match self.subscribers.lock() {
            Ok(subs) => subs,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        subs.clear();
        if let Some(tx) = &self.forwarder {
            let _ = tx.send(Dispatch::Close);
        }
    }

    fn send(&self, notification: Notification<M>) -> Result<(), BusError> {
        // Holding the lock orders this publish against `subscribe` and `close`.
        let mut subs = self.subscribers.lock().map_err(|_| BusError::Poisoned)?;
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        match &self.forwarder {
            Some(tx) => {
                subs.retain(|listener| !listener.is_closed());
                let listeners = subs.clone();
                tx.send(Dispatch::Deliver {
                    notification,
                    listeners,
                })
                .map_err(|_| BusError::Closed)
            }
            None => {
                retain_live(&mut subs, notification);
                Ok(())
            }
        }
    }
}

fn deliver<M: Clone>(listeners: &[Listener<M>], notification: Notification<M>) {
    trace!(listeners = listeners.len(), is_error = notification.is_err(), "deferred fan-out");
    for listener in listeners {
        // A listener dropped since publish is simply skipped.
        let _ = listener.send(notification.clone());
    }
}

fn retain_live<M: Clone>(subs: &mut Vec<Listener<M>>, notification: Notification<M>) {
    trace!(listeners = subs.len(), is_error = notification.is_err(), "fan-out");
    // Drop any dead subscribers while publishing.
    subs.retain(|tx| tx.send(notification.clone()).is_ok());
}

impl<M> EventSink<M> for Broadcaster<M>
where
    M: Clone + Send + 'static,
{
    type Error = BusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        self.send(Ok(message))
    }

    fn error(&self, error: StreamError) -> Result<(), Self::Error> {
        self.send(Err(error))
    }
}
