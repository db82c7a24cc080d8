use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};

use super::summary::DetectionSummary;

pub type SummarySender = LatestSender<DetectionSummary>;
pub type SummaryReceiver = LatestReceiver<DetectionSummary>;

/// Bounded single-producer single-consumer summary hand-off.
pub fn summary_channel(depth: usize) -> (SummarySender, SummaryReceiver) {
    latest_channel(depth)
}

/// Bounded hand-off that never blocks the producer: when the queue is full
/// the oldest pending item is discarded to make room.
pub fn latest_channel<T>(depth: usize) -> (LatestSender<T>, LatestReceiver<T>) {
    let (tx, rx) = crossbeam_channel::bounded(depth.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        LatestSender {
            tx,
            evict: rx.clone(),
            dropped: dropped.clone(),
        },
        LatestReceiver { rx, dropped },
    )
}

pub struct LatestSender<T> {
    tx: Sender<T>,
    // Lets the producer evict the oldest entry.
    evict: Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> LatestSender<T> {
    /// Publish without blocking.
    pub fn publish(&self, item: T) {
        let mut pending = item;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    if self.evict.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    pending = back;
                }
                // Unreachable while `evict` holds the channel open.
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub struct LatestReceiver<T> {
    rx: Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> LatestReceiver<T> {
    /// Next pending item, oldest first. `None` means nothing new.
    pub fn poll(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Drain everything pending and keep the newest.
    pub fn latest(&self) -> Option<T> {
        let mut newest = None;
        while let Some(item) = self.poll() {
            newest = Some(item);
        }
        newest
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Items evicted before the consumer saw them.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
