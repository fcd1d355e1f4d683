//! In-process change feeds.
//!
//! Handlers publish the latest state of a document (a cart, an order) under
//! its key; clients subscribe to a key and receive every later version until
//! they drop or replace their subscription. Each client holds at most one
//! subscription per key: subscribing again ends the previous stream.

use futures::Stream;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};

use contracts::domain::a003_cart::Cart;
use contracts::domain::a004_order::Order;

const CHANNEL_CAPACITY: usize = 16;

struct ActiveSubscription {
    token: u64,
    // Dropping the sender cancels the subscription holding the receiver.
    _cancel: watch::Sender<()>,
}

struct FeedInner<T> {
    channels: HashMap<String, broadcast::Sender<T>>,
    active: HashMap<(String, String), ActiveSubscription>,
    next_token: u64,
}

pub struct ChangeFeed<T> {
    inner: Arc<Mutex<FeedInner<T>>>,
}

impl<T> Clone for ChangeFeed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Default for ChangeFeed<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(inner: &Mutex<FeedInner<T>>) -> MutexGuard<'_, FeedInner<T>> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: Clone + Send + 'static> ChangeFeed<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FeedInner {
                channels: HashMap::new(),
                active: HashMap::new(),
                next_token: 0,
            })),
        }
    }

    /// Subscribe `client_id` to updates of `key`, replacing any subscription
    /// the client already holds for that key.
    pub fn subscribe(&self, client_id: &str, key: &str) -> Subscription<T> {
        let mut inner = lock(&self.inner);
        let receiver = inner
            .channels
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        inner.next_token += 1;
        let token = inner.next_token;
        let (cancel_tx, cancel_rx) = watch::channel(());
        let previous = inner.active.insert(
            (client_id.to_string(), key.to_string()),
            ActiveSubscription {
                token,
                _cancel: cancel_tx,
            },
        );
        if previous.is_some() {
            tracing::debug!("Client {} re-subscribed to {}; previous stream ends", client_id, key);
        }

        Subscription {
            feed: Arc::clone(&self.inner),
            client_id: client_id.to_string(),
            key: key.to_string(),
            token,
            receiver,
            cancelled: cancel_rx,
        }
    }

    /// Deliver `value` to every current subscriber of `key`. Returns the
    /// number of receivers reached.
    pub fn publish(&self, key: &str, value: T) -> usize {
        let mut inner = lock(&self.inner);
        let Some(sender) = inner.channels.get(key) else {
            return 0;
        };
        match sender.send(value) {
            Ok(count) => count,
            Err(_) => {
                inner.channels.remove(key);
                0
            }
        }
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        lock(&self.inner)
            .channels
            .get(key)
            .map_or(0, |s| s.receiver_count())
    }
}

/// Handle for one client's subscription to one key. Dropping it
/// unsubscribes.
pub struct Subscription<T> {
    feed: Arc<Mutex<FeedInner<T>>>,
    client_id: String,
    key: String,
    token: u64,
    receiver: broadcast::Receiver<T>,
    cancelled: watch::Receiver<()>,
}

impl<T: Clone + Send + 'static> Subscription<T> {
    /// Next published value, or `None` once the subscription was replaced
    /// or the feed closed.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancelled.changed() => return None,
                message = self.receiver.recv() => match message {
                    Ok(value) => return Some(value),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("Subscriber on {} lagged, skipped {} updates", self.key, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = T> {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|value| (value, subscription))
        })
    }

    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        let mut inner = lock(&self.feed);
        let id = (self.client_id.clone(), self.key.clone());
        if inner.active.get(&id).is_some_and(|a| a.token == self.token) {
            inner.active.remove(&id);
        }
        // Our own receiver is still alive at this point.
        if inner
            .channels
            .get(&self.key)
            .is_some_and(|s| s.receiver_count() <= 1)
        {
            inner.channels.remove(&self.key);
        }
    }
}

/// Feeds exposed to clients
#[derive(Clone, Default)]
pub struct Feeds {
    pub carts: ChangeFeed<Cart>,
    pub orders: ChangeFeed<Order>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn subscribers_receive_published_values() {
        let feed: ChangeFeed<u32> = ChangeFeed::new();
        let mut a = feed.subscribe("phone", "cart:1");
        let mut b = feed.subscribe("tablet", "cart:1");

        assert_eq!(feed.publish("cart:1", 7), 2);
        assert_eq!(a.recv().await, Some(7));
        assert_eq!(b.recv().await, Some(7));
        assert_eq!(feed.publish("cart:2", 9), 0);
    }

    #[tokio::test]
    async fn resubscribing_ends_previous_stream() {
        let feed: ChangeFeed<u32> = ChangeFeed::new();
        let mut first = feed.subscribe("phone", "order:1");
        let mut second = feed.subscribe("phone", "order:1");

        feed.publish("order:1", 1);
        assert_eq!(first.recv().await, None);
        assert_eq!(second.recv().await, Some(1));
    }

    #[tokio::test]
    async fn dropping_last_subscription_releases_channel() {
        let feed: ChangeFeed<u32> = ChangeFeed::new();
        let sub = feed.subscribe("phone", "cart:1");
        assert_eq!(feed.subscriber_count("cart:1"), 1);
        sub.unsubscribe();
        assert_eq!(feed.subscriber_count("cart:1"), 0);
        assert_eq!(feed.publish("cart:1", 3), 0);
    }

    #[tokio::test]
    async fn stream_yields_updates_in_order() {
        let feed: ChangeFeed<u32> = ChangeFeed::new();
        let stream = feed.subscribe("phone", "cart:1").into_stream();
        feed.publish("cart:1", 1);
        feed.publish("cart:1", 2);
        let values: Vec<u32> = stream.take(2).collect().await;
        assert_eq!(values, vec![1, 2]);
    }
}
