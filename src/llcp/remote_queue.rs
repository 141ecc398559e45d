//! Remote (peer-initiated) request tracking (spec.md component E).
//!
//! Unlike the local queue, this is not really a queue: spec.md §4.E is explicit that it "holds
//! the single in-progress remote context". Modelled directly as an `Option<ContextId>` plus the
//! kind it was started for, since no teacher queue type fits a single-slot shape.

use crate::hci::HciError;
use crate::llcp::context_pool::ContextId;
use crate::llcp::procedures::ProcedureKind;

/// Tracks the connection's single in-flight remote procedure context, if any.
pub struct RemoteSlot {
    active: Option<(ContextId, ProcedureKind)>,
}

impl RemoteSlot {
    pub fn new() -> Self {
        Self { active: None }
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_none()
    }

    pub fn kind(&self) -> Option<ProcedureKind> {
        self.active.map(|(_, kind)| kind)
    }

    pub fn id(&self) -> Option<ContextId> {
        self.active.map(|(id, _)| id)
    }

    /// Checks whether a freshly-arrived initiating PDU for `kind` may start a new remote
    /// procedure. A different procedure class already in flight is rejected per spec.md §4.E;
    /// the same class is handled by the existing context instead of starting a new one.
    pub fn admit(&self, kind: ProcedureKind) -> Result<(), HciError> {
        match self.active {
            None => Ok(()),
            Some((_, active_kind)) if active_kind == kind => Ok(()),
            Some(_) => Err(HciError::DIFFERENT_TRANSACTION_COLLISION),
        }
    }

    pub fn start(&mut self, id: ContextId, kind: ProcedureKind) {
        self.active = Some((id, kind));
    }

    pub fn clear(&mut self) {
        self.active = None;
    }
}
