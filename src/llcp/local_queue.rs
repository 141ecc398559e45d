//! Local (HCI-initiated) request queue (spec.md component D).
//!
//! FIFO of descriptors enqueued by HCI entry points, plus a priority slot the dispatcher uses to
//! push a `TERMINATE` request to the front when a disconnect has been requested — pre-empting
//! whatever is already queued, per spec.md §4.G step 2. Sized (via `heapless::spsc::Queue`, same
//! pattern as `rubble::link::queue::SimpleQueue`) generously enough relative to the default
//! `PROC_CTX_BUF_NUM` that `enqueue` does not fail in ordinary operation, per spec.md §4.D.

use crate::llcp::procedures::channel_map::ChmapRequest;
use crate::llcp::procedures::conn_update::ConnUpdateRequest;
use crate::llcp::procedures::encryption::EncryptionRequest;
use crate::llcp::procedures::length::LengthRequest;
use crate::llcp::procedures::phy::PhyRequest;
use crate::Error;
use heapless::{
    consts::U16,
    spsc::{self, MultiCore},
};

/// A pending locally-initiated procedure, as enqueued by an HCI entry point.
#[derive(Debug, Copy, Clone)]
pub enum LocalRequest {
    Version,
    FeatureExchange,
    PhyUpdate(PhyRequest),
    Encryption(EncryptionRequest),
    Terminate(u8),
    Length(LengthRequest),
    ConnUpdate(ConnUpdateRequest),
    ChannelMap(ChmapRequest),
}

pub struct LocalQueue {
    /// Reserved for a pre-empting `TERMINATE` request; always dequeued before `fifo`.
    priority: Option<LocalRequest>,
    fifo: spsc::Queue<LocalRequest, U16, u8, MultiCore>,
}

impl LocalQueue {
    pub fn new() -> Self {
        Self {
            priority: None,
            fifo: spsc::Queue(heapless::i::Queue::u8()),
        }
    }

    pub fn enqueue(&mut self, req: LocalRequest) -> Result<(), Error> {
        self.fifo.enqueue(req).map_err(|_| Error::QueueFull)
    }

    /// Pushes `req` to the front of the queue, ahead of anything already pending.
    pub fn push_front(&mut self, req: LocalRequest) {
        self.priority = Some(req);
    }

    pub fn pop(&mut self) -> Option<LocalRequest> {
        if let Some(req) = self.priority.take() {
            return Some(req);
        }
        self.fifo.dequeue()
    }

    pub fn is_empty(&self) -> bool {
        self.priority.is_none() && !self.fifo.ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_slot_overtakes_fifo_order() {
        let mut q = LocalQueue::new();
        q.enqueue(LocalRequest::Version).unwrap();
        q.push_front(LocalRequest::Terminate(0x13));
        match q.pop() {
            Some(LocalRequest::Terminate(0x13)) => {}
            other => panic!("expected priority Terminate first, got {:?}", other.is_some()),
        }
        assert!(matches!(q.pop(), Some(LocalRequest::Version)));
        assert!(q.is_empty());
    }
}
