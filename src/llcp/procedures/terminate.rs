//! Terminate procedure FSM (spec.md §4.F).
//!
//! Highest priority of all procedures; pre-empts any in-flight procedure (spec.md §4.G step 2).
//! `IDLE → TX_TERMINATE_IND{reason} → WAIT_ACK → DONE`. This engine has no visibility into the
//! link-layer ack of the control PDU itself (that lives with the radio/PHY collaborator, per
//! spec.md §4.B's "signalled externally"), so `WAIT_ACK` clears on the very next `Tick` — the
//! connection event after the one that transmitted `LL_TERMINATE_IND` — rather than waiting out
//! the full `procedure_reload`. `procedure_reload` expiry still completes it too, as a fallback
//! that can no longer actually fire first but costs nothing to keep.

use super::{Event, StepResult};
use crate::llcp::connection::ConnectionState;
use crate::llcp::notify::Notification;
use crate::llcp::pdu::{Pdu, TerminateInd};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Step {
    Idle,
    WaitAck,
    Done,
}

#[derive(Debug, Copy, Clone)]
pub struct TerminateState {
    step: Step,
    reason: u8,
}

impl TerminateState {
    pub fn local(reason: u8) -> Self {
        Self {
            step: Step::Idle,
            reason,
        }
    }
}

pub fn run(
    state: &mut TerminateState,
    _collision: &mut bool,
    _instant: &mut Option<crate::time::EventCounter>,
    conn: &mut ConnectionState,
    event: Event<'_>,
) -> StepResult {
    match (state.step, event) {
        (Step::Done, _) => StepResult::Complete,

        (Step::Idle, Event::Tick) => {
            state.step = Step::WaitAck;
            StepResult::EmitTx(Pdu::TerminateInd(TerminateInd {
                error_code: state.reason,
            }))
        }

        (Step::WaitAck, Event::Tick)
        | (Step::WaitAck, Event::InstantReached)
        | (Step::WaitAck, Event::Timeout) => {
            state.step = Step::Done;
            conn.terminated = true;
            StepResult::EmitNtf(Notification::Terminate {
                reason: state.reason,
            })
        }

        _ => StepResult::Continue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llcp::connection::Role;

    #[test]
    fn ack_or_timeout_both_complete_and_mark_terminated() {
        let mut conn = ConnectionState::new(0, Role::Central);
        let mut state = TerminateState::local(0x13);
        let mut collision = false;
        let mut instant = None;

        let r = run(&mut state, &mut collision, &mut instant, &mut conn, Event::Tick);
        assert!(matches!(r, StepResult::EmitTx(Pdu::TerminateInd(_))));

        let r = run(
            &mut state,
            &mut collision,
            &mut instant,
            &mut conn,
            Event::Timeout,
        );
        assert!(matches!(r, StepResult::EmitNtf(Notification::Terminate { reason: 0x13 })));
        assert!(conn.terminated);
    }

    #[test]
    fn completes_on_the_connection_event_after_the_ind_is_sent() {
        let mut conn = ConnectionState::new(0, Role::Peripheral);
        let mut state = TerminateState::local(0x16);
        let mut collision = false;
        let mut instant = None;

        let r = run(&mut state, &mut collision, &mut instant, &mut conn, Event::Tick);
        assert!(matches!(r, StepResult::EmitTx(Pdu::TerminateInd(_))));
        assert!(!conn.terminated);

        let r = run(&mut state, &mut collision, &mut instant, &mut conn, Event::Tick);
        assert!(matches!(r, StepResult::EmitNtf(Notification::Terminate { reason: 0x16 })));
        assert!(conn.terminated);

        let r = run(&mut state, &mut collision, &mut instant, &mut conn, Event::Tick);
        assert!(matches!(r, StepResult::Complete));
    }
}
