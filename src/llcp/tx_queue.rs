//! Per-connection TX queue (spec.md component B).
//!
//! FIFO for outgoing data-channel PDUs (opaque pass-through from this engine's point of view — the
//! payload itself belongs to the L2CAP/ATT layers above, out of scope per the crate's purpose),
//! plus a single priority slot for the LL control PDU the dispatcher or an active procedure FSM is
//! currently sending. The dispatcher drains the control slot with strict priority over data each
//! connection event.
//!
//! Grounded on the teacher's `rubble::link::queue::SimpleQueue`, which wraps a
//! `heapless::spsc::Queue` the same way: a `MultiCore`-safe SPSC ring sized for a handful of
//! in-flight buffers, no allocator.

use crate::Error;
use heapless::{
    consts::U8,
    spsc::{self, MultiCore},
};

/// Largest LL control PDU on the wire: opcode (1) + the widest payload
/// (`LL_CONNECTION_PARAM_REQ`, 23 bytes).
pub const CTRL_PDU_BUF_LEN: usize = 24;

/// An opaque, fixed-capacity TX buffer: a serialized PDU plus its length.
#[derive(Copy, Clone)]
pub struct TxNode {
    buf: [u8; CTRL_PDU_BUF_LEN],
    len: u8,
}

impl TxNode {
    /// Wraps an already-encoded PDU (as produced by `Pdu::encode`).
    pub fn new(encoded: &[u8]) -> Result<Self, Error> {
        if encoded.len() > CTRL_PDU_BUF_LEN {
            return Err(Error::Eof);
        }
        let mut buf = [0; CTRL_PDU_BUF_LEN];
        buf[..encoded.len()].copy_from_slice(encoded);
        Ok(Self {
            buf,
            len: encoded.len() as u8,
        })
    }

    /// Returns the encoded PDU bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..usize::from(self.len)]
    }
}

/// Per-connection TX queue: data FIFO plus a priority control-PDU slot.
pub struct TxQueue {
    data: spsc::Queue<TxNode, U8, u8, MultiCore>,
    ctrl: Option<TxNode>,
}

impl TxQueue {
    /// Creates a new, empty TX queue.
    pub fn new() -> Self {
        Self {
            data: spsc::Queue(heapless::i::Queue::u8()),
            ctrl: None,
        }
    }

    /// Enqueues a data-channel PDU. FIFO order; fails with `Error::QueueFull` once the bounded
    /// data queue is full.
    pub fn enqueue_data(&mut self, node: TxNode) -> Result<(), Error> {
        self.data.enqueue(node).map_err(|_| Error::QueueFull)
    }

    /// Enqueues a control PDU into the priority slot.
    ///
    /// FSMs must check `ctrl_free()` before calling this — a procedure never emits more than one
    /// control PDU awaiting transmission at a time, so this should not fail in practice, but a
    /// slow drain (e.g. radio backpressure) can still leave the slot occupied.
    pub fn enqueue_ctrl(&mut self, node: TxNode) -> Result<(), Error> {
        if self.ctrl.is_some() {
            return Err(Error::QueueFull);
        }
        self.ctrl = Some(node);
        Ok(())
    }

    /// Returns whether the control slot is free to accept a new PDU.
    pub fn ctrl_free(&self) -> bool {
        self.ctrl.is_none()
    }

    /// Returns the next node to transmit, with the control slot taking strict priority over data.
    ///
    /// The returned node remains logically "in flight" until `release` is called; callers that
    /// pop a node but fail to transmit it this event must not call `release` and should re-fetch
    /// on the next event (the control slot and the data queue's front are left untouched by
    /// `next` itself — see `release`).
    pub fn next(&mut self) -> Option<TxNode> {
        if let Some(node) = self.ctrl {
            return Some(node);
        }
        self.data.peek().copied()
    }

    /// Releases the node most recently returned by `next`, removing it from the queue.
    ///
    /// Called once the radio/PHY scheduler has signalled successful on-air transmission.
    pub fn release(&mut self) {
        if self.ctrl.take().is_some() {
            return;
        }
        let _ = self.data.dequeue();
    }
}
