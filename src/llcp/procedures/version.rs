//! Version Exchange procedure FSM (spec.md §4.F).
//!
//! `IDLE → TX_VERSION_IND → WAIT_VERSION_IND → DONE`. Each side sends exactly one
//! `LL_VERSION_IND` per connection; later local requests complete immediately from the cached
//! remote version, and an inbound `LL_VERSION_IND` received while already cached is ignored
//! (spec.md §8 invariant 4: idempotence, no duplicate notification).

use super::{AbortReason, Event, StepResult};
use crate::llcp::connection::ConnectionState;
use crate::llcp::notify::Notification;
use crate::llcp::pdu::{Pdu, VersionInd};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Step {
    Idle,
    WaitInd,
    Done,
}

#[derive(Debug, Copy, Clone)]
pub struct VersionState {
    step: Step,
    pub local: bool,
}

impl VersionState {
    pub fn local() -> Self {
        Self {
            step: Step::Idle,
            local: true,
        }
    }

    pub fn remote() -> Self {
        Self {
            step: Step::Idle,
            local: false,
        }
    }
}

/// Bluetooth Core Specification version this engine reports in `LL_VERSION_IND`.
const LOCAL_VERSION: u8 = 10; // Core 5.1, see rubble::link::llcp::VersionNumber::V5_1
const LOCAL_COMPANY_ID: u16 = 0xFFFF; // "unknown"/test company identifier
const LOCAL_SUBVERSION: u16 = 0x0000;

pub fn run(
    state: &mut VersionState,
    _collision: &mut bool,
    _instant: &mut Option<crate::time::EventCounter>,
    conn: &mut ConnectionState,
    event: Event<'_>,
) -> StepResult {
    match (state.step, event) {
        (Step::Done, _) => StepResult::Complete,

        (Step::Idle, Event::Tick) if state.local => {
            if let Some((version, company, subversion)) = conn.version_peer {
                state.step = Step::Done;
                return StepResult::EmitNtf(Notification::Version {
                    version,
                    company,
                    subversion,
                });
            }
            state.step = Step::WaitInd;
            emit_local_version(conn)
        }

        (Step::WaitInd, Event::Rx(Pdu::VersionInd(ind))) => {
            conn.version_peer = Some((ind.version, ind.company, ind.subversion));
            state.step = Step::Done;
            StepResult::EmitNtf(Notification::Version {
                version: ind.version,
                company: ind.company,
                subversion: ind.subversion,
            })
        }

        // Remote-initiated: peer sent its `LL_VERSION_IND` first. Reply with ours (unless we
        // already have, in which case this is a duplicate and is ignored per idempotence).
        (Step::Idle, Event::Rx(Pdu::VersionInd(ind))) if !state.local => {
            let first_time = conn.version_peer.is_none();
            conn.version_peer = Some((ind.version, ind.company, ind.subversion));
            state.step = Step::Done;
            if conn.version_sent {
                if first_time {
                    StepResult::EmitNtf(Notification::Version {
                        version: ind.version,
                        company: ind.company,
                        subversion: ind.subversion,
                    })
                } else {
                    StepResult::Complete
                }
            } else {
                emit_local_version(conn)
            }
        }

        (_, Event::Timeout) => StepResult::Abort(AbortReason::ProcedureTimeout),

        _ => StepResult::Continue,
    }
}

fn emit_local_version(conn: &mut ConnectionState) -> StepResult {
    conn.version_sent = true;
    StepResult::EmitTx(Pdu::VersionInd(VersionInd::new(
        LOCAL_VERSION,
        LOCAL_COMPANY_ID,
        LOCAL_SUBVERSION,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llcp::connection::Role;

    #[test]
    fn second_local_request_uses_cache_without_retransmit() {
        let mut conn = ConnectionState::new(0, Role::Central);
        conn.version_peer = Some((9, 0x000F, 1));
        let mut state = VersionState::local();
        let mut collision = false;
        let mut instant = None;
        let r = run(&mut state, &mut collision, &mut instant, &mut conn, Event::Tick);
        assert!(matches!(
            r,
            StepResult::EmitNtf(Notification::Version {
                version: 9,
                company: 0x000F,
                subversion: 1,
            })
        ));
    }

    #[test]
    fn happy_path_emits_ind_then_notifies() {
        let mut conn = ConnectionState::new(0, Role::Central);
        let mut state = VersionState::local();
        let mut collision = false;
        let mut instant = None;
        let r = run(&mut state, &mut collision, &mut instant, &mut conn, Event::Tick);
        assert!(matches!(r, StepResult::EmitTx(Pdu::VersionInd(_))));

        let ind = Pdu::VersionInd(VersionInd::new(9, 0x000F, 2));
        let r = run(&mut state, &mut collision, &mut instant, &mut conn, Event::Rx(&ind));
        assert!(matches!(r, StepResult::EmitNtf(_)));
        assert_eq!(conn.version_peer, Some((9, 0x000F, 2)));
    }
}
