//! Procedure context pool (spec.md component C).
//!
//! Fixed-capacity pool of procedure-context records, referenced by arena-index handles
//! (`ContextId`) per the design notes ("replace cyclic references... with arena-index handles
//! into fixed pools; no raw ownership cycles, no weak references"). No direct teacher analogue —
//! `rubble` has no procedure pool — built in the teacher's general no-allocator, fixed-array style.

use crate::llcp::procedures::ProcedureContext;
use crate::Error;

/// Upper bound on `PROC_CTX_BUF_NUM`; a pool's actual capacity (from `ControllerConfig`) must not
/// exceed this. `no_std` without an allocator means the backing array's size is this compile-time
/// constant regardless of the configured capacity.
pub const MAX_PROC_CTX: usize = 12;

/// An arena-index handle into a `ContextPool`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ContextId(u8);

/// Fixed-capacity pool of procedure contexts.
pub struct ContextPool {
    slots: [Option<ProcedureContext>; MAX_PROC_CTX],
    capacity: usize,
}

impl ContextPool {
    /// Creates a pool with room for `capacity` contexts (`capacity <= MAX_PROC_CTX`).
    pub fn new(capacity: usize) -> Self {
        assert!(capacity <= MAX_PROC_CTX, "PROC_CTX_BUF_NUM exceeds MAX_PROC_CTX");
        Self {
            slots: [None; MAX_PROC_CTX],
            capacity,
        }
    }

    /// Acquires a free slot and initializes it with `ctx`.
    pub fn acquire(&mut self, ctx: ProcedureContext) -> Result<ContextId, Error> {
        for i in 0..self.capacity {
            if self.slots[i].is_none() {
                self.slots[i] = Some(ctx);
                return Ok(ContextId(i as u8));
            }
        }
        Err(Error::Exhausted)
    }

    /// Releases `id`, resetting its slot to empty.
    pub fn release(&mut self, id: ContextId) {
        self.slots[usize::from(id.0)] = None;
    }

    pub fn get(&self, id: ContextId) -> &ProcedureContext {
        self.slots[usize::from(id.0)]
            .as_ref()
            .expect("ContextId referenced an empty slot")
    }

    pub fn get_mut(&mut self, id: ContextId) -> &mut ProcedureContext {
        self.slots[usize::from(id.0)]
            .as_mut()
            .expect("ContextId referenced an empty slot")
    }

    /// Number of free slots, bounded by the pool's configured capacity (not `MAX_PROC_CTX`).
    pub fn free_count(&self) -> usize {
        self.capacity - self.slots[..self.capacity].iter().filter(|s| s.is_some()).count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llcp::procedures::version::VersionState;
    use crate::llcp::procedures::ProcedureState;

    fn dummy_ctx() -> ProcedureContext {
        ProcedureContext {
            collision: false,
            instant: None,
            state: ProcedureState::Version(VersionState::local()),
        }
    }

    #[test]
    fn exhaustion_is_reported_and_recovers_on_release() {
        let mut pool = ContextPool::new(2);
        let a = pool.acquire(dummy_ctx()).unwrap();
        let _b = pool.acquire(dummy_ctx()).unwrap();
        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.acquire(dummy_ctx()).unwrap_err(), Error::Exhausted);

        pool.release(a);
        assert_eq!(pool.free_count(), 1);
        pool.acquire(dummy_ctx()).unwrap();
        assert_eq!(pool.free_count(), 0);
    }
}
