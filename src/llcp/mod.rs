//! The LLCP engine proper: wire codec, per-link state, procedure FSMs, and the dispatcher that
//! drives them (spec.md §§3-4, components A through I).

pub mod connection;
pub mod context_pool;
pub mod dispatcher;
pub mod local_queue;
pub mod notify;
pub mod pdu;
pub mod procedures;
pub mod remote_queue;
pub mod tx_queue;
