//! Host notification emitter (spec.md component H).
//!
//! Allocates a typed notification node and hands it to the host-bound path. Grounded on the same
//! `heapless::spsc::Queue` pattern the teacher uses for its packet queue
//! (`rubble::link::queue::SimpleQueue`) — here playing the role of the bounded RX-node pool: when
//! full, `push` reports `Error::QueueFull` and the dispatcher stalls the emitting procedure for
//! one event and retries, per spec.md §4.H ("no notification is ever dropped").

use crate::features::FeatureSet;
use crate::hci::HciError;
use heapless::{
    consts::U8,
    spsc::{self, MultiCore},
};

/// A host-bound notification, tagged by the procedure that produced it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Notification {
    PhyUpdate { status: HciError, tx: u8, rx: u8 },
    FeatureExchange { features: FeatureSet },
    Version { version: u8, company: u16, subversion: u16 },
    EncChange { status: HciError },
    EncRefresh,
    Terminate { reason: u8 },
    LengthChange,
    ConnUpdate { status: HciError, interval: u16, latency: u16, timeout: u16 },
    ChannelMapChange,
}

/// Bounded FIFO of notifications awaiting delivery to the host.
pub struct NotificationQueue {
    inner: spsc::Queue<Notification, U8, u8, MultiCore>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self {
            inner: spsc::Queue(heapless::i::Queue::u8()),
        }
    }

    /// Allocates a node for `ntf` and hands it to the host path.
    ///
    /// Returns `Error::QueueFull` if the pool is exhausted; callers must not drop the
    /// notification on this error, but retry on a later event (see spec.md §4.H).
    pub fn push(&mut self, ntf: Notification) -> Result<(), crate::Error> {
        self.inner.enqueue(ntf).map_err(|_| crate::Error::QueueFull)
    }

    /// Pops the next notification bound for the host, in emission order.
    pub fn pop(&mut self) -> Option<Notification> {
        self.inner.dequeue()
    }

    pub fn is_empty(&self) -> bool {
        !self.inner.ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_preserved() {
        let mut q = NotificationQueue::new();
        q.push(Notification::EncRefresh).unwrap();
        q.push(Notification::LengthChange).unwrap();
        assert_eq!(q.pop(), Some(Notification::EncRefresh));
        assert_eq!(q.pop(), Some(Notification::LengthChange));
        assert_eq!(q.pop(), None);
    }
}
