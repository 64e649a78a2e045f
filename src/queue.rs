// SwitchBot Metrics - Telemetry synchronisation for SwitchBot devices
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Bounded single-producer/single-consumer queue
//!
//! The producer runs on a blocking thread and [`Producer::push`] blocks while
//! the queue is full. The consumer awaits [`Consumer::pop`], which
//! distinguishes three states:
//!
//! - `Ok(Some(item))`: an item was available
//! - `Ok(None)`: the producer closed the queue and everything was drained
//! - `Err(Error::QueueAborted)`: the producer went away without closing
//!
//! Closing is explicit so that a producer failing halfway through its input
//! cannot be mistaken for a clean end of input.

use crate::error::{Error, Result};
use tokio::sync::mpsc;

/// Default queue capacity in items
pub const DEFAULT_CAPACITY: usize = 1000;

enum Envelope<T> {
    Item(T),
    Close,
}

/// Create a bounded queue holding at most `capacity` pending items.
///
/// A zero capacity is rejected with [`Error::Config`].
pub fn bounded<T>(capacity: usize) -> Result<(Producer<T>, Consumer<T>)> {
    if capacity == 0 {
        return Err(Error::config("queue capacity must be positive"));
    }
    let (tx, rx) = mpsc::channel(capacity);
    Ok((
        Producer { tx },
        Consumer {
            rx,
            closed: false,
        },
    ))
}

/// Sending half; must not be used from inside an async context
pub struct Producer<T> {
    tx: mpsc::Sender<Envelope<T>>,
}

impl<T> Producer<T> {
    /// Push an item, blocking while the queue is full.
    ///
    /// Fails with [`Error::QueueDisconnected`] once the consumer is gone.
    pub fn push(&self, item: T) -> Result<()> {
        self.tx
            .blocking_send(Envelope::Item(item))
            .map_err(|_| Error::QueueDisconnected)
    }

    /// Signal end of input. The consumer drains what is pending, then stops.
    pub fn close(self) -> Result<()> {
        self.tx
            .blocking_send(Envelope::Close)
            .map_err(|_| Error::QueueDisconnected)
    }

    /// Maximum number of pending items
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Receiving half
pub struct Consumer<T> {
    rx: mpsc::Receiver<Envelope<T>>,
    closed: bool,
}

impl<T> Consumer<T> {
    /// Wait for the next item.
    pub async fn pop(&mut self) -> Result<Option<T>> {
        if self.closed {
            return Ok(None);
        }

        match self.rx.recv().await {
            Some(Envelope::Item(item)) => Ok(Some(item)),
            Some(Envelope::Close) => {
                self.closed = true;
                self.rx.close();
                Ok(None)
            }
            None => Err(Error::QueueAborted),
        }
    }

    /// Check if the producer has closed the queue and it has been drained
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_items_arrive_in_order_then_close() {
        let (producer, mut consumer) = bounded(4).unwrap();

        let handle = tokio::task::spawn_blocking(move || {
            for i in 0..10 {
                producer.push(i)?;
            }
            producer.close()
        });

        let mut received = Vec::new();
        while let Some(item) = consumer.pop().await.unwrap() {
            received.push(item);
        }

        handle.await.unwrap().unwrap();
        assert_eq!(received, (0..10).collect::<Vec<_>>());
        assert!(consumer.is_closed());
        assert!(consumer.pop().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_drop_without_close_aborts() {
        let (producer, mut consumer) = bounded(4).unwrap();

        tokio::task::spawn_blocking(move || {
            producer.push(1u32).unwrap();
        })
        .await
        .unwrap();

        assert_eq!(consumer.pop().await.unwrap(), Some(1));
        assert!(matches!(consumer.pop().await, Err(Error::QueueAborted)));
    }

    #[tokio::test]
    async fn test_push_fails_after_consumer_dropped() {
        let (producer, consumer) = bounded::<u32>(4).unwrap();
        drop(consumer);

        let result = tokio::task::spawn_blocking(move || producer.push(1))
            .await
            .unwrap();
        assert!(matches!(result, Err(Error::QueueDisconnected)));
    }

    #[tokio::test]
    async fn test_producer_blocks_when_full() {
        const CAPACITY: usize = 3;
        let (producer, mut consumer) = bounded(CAPACITY).unwrap();
        assert_eq!(producer.capacity(), CAPACITY);

        let pushed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pushed);
        let handle = tokio::task::spawn_blocking(move || {
            for i in 0..CAPACITY + 1 {
                producer.push(i)?;
                counter.fetch_add(1, Ordering::SeqCst);
            }
            producer.close()
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(pushed.load(Ordering::SeqCst), CAPACITY);

        assert_eq!(consumer.pop().await.unwrap(), Some(0));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(pushed.load(Ordering::SeqCst), CAPACITY + 1);

        let mut rest = Vec::new();
        while let Some(item) = consumer.pop().await.unwrap() {
            rest.push(item);
        }
        handle.await.unwrap().unwrap();
        assert_eq!(rest, vec![1, 2, 3]);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(bounded::<u32>(0), Err(Error::Config(_))));
    }
}
