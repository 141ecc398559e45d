//! Per-procedure-kind state machines (spec.md §4.F) and the shared shell they run inside
//! (component F/the `ProcedureContext` shape spec.md §9's design note calls for).
//!
//! Every procedure module exposes a `State` type plus a free `run` function with the same
//! signature: `(state, collision, instant, conn, event) -> StepResult`. `ProcedureContext` wraps
//! one such state behind a tagged union and dispatches to the right `run`, so the rest of the
//! engine (the context pool, the dispatcher) only ever has to hold one concrete type.

pub mod channel_map;
pub mod conn_update;
pub mod encryption;
pub mod feature;
pub mod length;
pub mod phy;
pub mod terminate;
pub mod version;

use crate::llcp::connection::ConnectionState;
use crate::llcp::notify::Notification;
use crate::llcp::pdu::Pdu;
use crate::time::EventCounter;

/// Which of the 19 LL control procedures a context is running, used to classify collisions
/// (spec.md §4.E/§4.G: only same-kind remote requests are admitted alongside an active one).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProcedureKind {
    Version,
    FeatureExchange,
    PhyUpdate,
    Encryption,
    Terminate,
    Length,
    ConnUpdate,
    ChannelMap,
}

/// An input driving a procedure's state machine one step forward.
#[derive(Debug, Copy, Clone)]
pub enum Event<'a> {
    /// A connection-event tick with no associated inbound PDU.
    Tick,
    /// An inbound LL control PDU routed to this context.
    Rx(&'a Pdu),
    /// The connection event counter has reached a previously-recorded instant.
    InstantReached,
    /// The procedure's response-timeout budget (`procedure_reload`) has expired.
    Timeout,
}

/// The outcome of one `run` step.
#[derive(Debug, Copy, Clone)]
pub enum StepResult {
    /// No externally visible effect; the context remains active.
    Continue,
    /// Transmit `Pdu` as the next LL control PDU (subject to the TX queue's priority slot).
    EmitTx(Pdu),
    /// Deliver `Notification` to the host and keep the context active (used when a PDU must be
    /// emitted and a notification raised by the same step, e.g. PHY Update's instant fence).
    EmitNtf(Notification),
    /// The procedure has finished; the context should be released back to the pool.
    Complete,
    /// The procedure failed and should be torn down, optionally reporting `AbortReason` upward.
    Abort(AbortReason),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// `procedure_reload` expired while waiting for a peer response (spec.md §4.G).
    ProcedureTimeout,
    /// The peer rejected the procedure (`LL_REJECT_IND`/`LL_REJECT_EXT_IND`) for a reason other
    /// than a same-opcode collision.
    Rejected(u8),
}

/// Per-kind procedure state, boxed by value so `ProcedureContext` stays a plain `Copy` struct
/// (no allocator available to hold a trait object).
#[derive(Debug, Copy, Clone)]
pub enum ProcedureState {
    Version(version::VersionState),
    FeatureExchange(feature::FeatureState),
    PhyUpdate(phy::PhyState),
    Encryption(encryption::EncryptionState),
    Terminate(terminate::TerminateState),
    Length(length::LengthState),
    ConnUpdate(conn_update::ConnUpdateState),
    ChannelMap(channel_map::ChannelMapState),
}

/// A live procedure context, as held by the context pool (spec.md component C).
#[derive(Debug, Copy, Clone)]
pub struct ProcedureContext {
    /// Set when a same-opcode collision was observed and resolved in this context's favour,
    /// per spec.md §4.G; surfaced so the dispatcher can decide whether to also yield the other
    /// slot.
    pub collision: bool,
    /// The event-counter instant this context is waiting for, if any (PHY Update, Connection
    /// Update, Channel Map Update all use this).
    pub instant: Option<EventCounter>,
    pub state: ProcedureState,
}

impl ProcedureContext {
    pub fn kind(&self) -> ProcedureKind {
        match self.state {
            ProcedureState::Version(_) => ProcedureKind::Version,
            ProcedureState::FeatureExchange(_) => ProcedureKind::FeatureExchange,
            ProcedureState::PhyUpdate(_) => ProcedureKind::PhyUpdate,
            ProcedureState::Encryption(_) => ProcedureKind::Encryption,
            ProcedureState::Terminate(_) => ProcedureKind::Terminate,
            ProcedureState::Length(_) => ProcedureKind::Length,
            ProcedureState::ConnUpdate(_) => ProcedureKind::ConnUpdate,
            ProcedureState::ChannelMap(_) => ProcedureKind::ChannelMap,
        }
    }

    /// Runs this context one step forward, dispatching to the matching procedure module.
    pub fn run(&mut self, conn: &mut ConnectionState, event: Event<'_>) -> StepResult {
        match &mut self.state {
            ProcedureState::Version(s) => {
                version::run(s, &mut self.collision, &mut self.instant, conn, event)
            }
            ProcedureState::FeatureExchange(s) => {
                feature::run(s, &mut self.collision, &mut self.instant, conn, event)
            }
            ProcedureState::PhyUpdate(s) => {
                phy::run(s, &mut self.collision, &mut self.instant, conn, event)
            }
            ProcedureState::Encryption(s) => {
                encryption::run(s, &mut self.collision, &mut self.instant, conn, event)
            }
            ProcedureState::Terminate(s) => {
                terminate::run(s, &mut self.collision, &mut self.instant, conn, event)
            }
            ProcedureState::Length(s) => {
                length::run(s, &mut self.collision, &mut self.instant, conn, event)
            }
            ProcedureState::ConnUpdate(s) => {
                conn_update::run(s, &mut self.collision, &mut self.instant, conn, event)
            }
            ProcedureState::ChannelMap(s) => {
                channel_map::run(s, &mut self.collision, &mut self.instant, conn, event)
            }
        }
    }
}
