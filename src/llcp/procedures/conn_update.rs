//! Connection Update procedure FSM (spec.md §4.F).
//!
//! Same instant-based pattern as PHY Update: `LL_CONNECTION_UPDATE_IND` carries the new
//! parameters and an instant; both sides apply them atomically once the connection event counter
//! reaches it. This engine only drives the `IND`-only path — `LL_CONNECTION_PARAM_REQ`/`RSP`
//! negotiation is not implemented (see DESIGN.md's Open Question notes).

use super::{AbortReason, Event, StepResult};
use crate::hci::HciError;
use crate::llcp::connection::ConnectionState;
use crate::llcp::notify::Notification;
use crate::llcp::pdu::{ConnectionUpdateInd, Pdu};
use crate::time::EventCounter;

/// A locally-requested connection parameter update, as supplied via `conn_update`.
#[derive(Debug, Copy, Clone)]
pub struct ConnUpdateRequest {
    pub interval: u16,
    pub latency: u16,
    pub timeout: u16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Step {
    Idle,
    WaitInstant,
    Done,
}

#[derive(Debug, Copy, Clone)]
pub struct ConnUpdateState {
    step: Step,
    req: ConnUpdateRequest,
}

impl ConnUpdateState {
    pub fn local(req: ConnUpdateRequest) -> Self {
        Self {
            step: Step::Idle,
            req,
        }
    }

    /// Creates a remote context that has already parsed an inbound `LL_CONNECTION_UPDATE_IND`.
    pub fn remote(ind: &ConnectionUpdateInd) -> Self {
        Self {
            step: Step::WaitInstant,
            req: ConnUpdateRequest {
                interval: ind.interval,
                latency: ind.latency,
                timeout: ind.timeout,
            },
        }
    }
}

pub fn run(
    state: &mut ConnUpdateState,
    _collision: &mut bool,
    instant: &mut Option<EventCounter>,
    conn: &mut ConnectionState,
    event: Event<'_>,
) -> StepResult {
    match (state.step, event) {
        (Step::Done, _) => StepResult::Complete,

        (Step::Idle, Event::Tick) => {
            let ec = conn.event_counter.plus(6);
            *instant = Some(ec);
            state.step = Step::WaitInstant;
            StepResult::EmitTx(Pdu::ConnectionUpdateInd(ConnectionUpdateInd {
                win_size: 2,
                win_offset: 0,
                interval: state.req.interval,
                latency: state.req.latency,
                timeout: state.req.timeout,
                instant: ec.raw(),
            }))
        }

        (Step::WaitInstant, Event::Tick) | (Step::WaitInstant, Event::InstantReached) => {
            match *instant {
                Some(target) if conn.event_counter.has_reached(target) => {
                    conn.interval = state.req.interval;
                    conn.latency = state.req.latency;
                    conn.supervision_timeout = state.req.timeout;
                    state.step = Step::Done;
                    StepResult::EmitNtf(Notification::ConnUpdate {
                        status: HciError::SUCCESS,
                        interval: state.req.interval,
                        latency: state.req.latency,
                        timeout: state.req.timeout,
                    })
                }
                _ => StepResult::Continue,
            }
        }

        (_, Event::Timeout) => StepResult::Abort(AbortReason::ProcedureTimeout),

        _ => StepResult::Continue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llcp::connection::Role;

    #[test]
    fn remote_ind_applies_params_at_instant() {
        let mut conn = ConnectionState::new(0, Role::Peripheral);
        conn.event_counter = EventCounter::new(0);
        let ind = ConnectionUpdateInd {
            win_size: 2,
            win_offset: 0,
            interval: 40,
            latency: 0,
            timeout: 500,
            instant: 3,
        };
        let mut state = ConnUpdateState::remote(&ind);
        let mut collision = false;
        let mut instant = Some(EventCounter::new(3));

        conn.event_counter = EventCounter::new(2);
        let r = run(&mut state, &mut collision, &mut instant, &mut conn, Event::Tick);
        assert!(matches!(r, StepResult::Continue));

        conn.event_counter = EventCounter::new(3);
        let r = run(&mut state, &mut collision, &mut instant, &mut conn, Event::Tick);
        assert!(matches!(r, StepResult::EmitNtf(Notification::ConnUpdate { .. })));
        assert_eq!(conn.interval, 40);
        assert_eq!(conn.supervision_timeout, 500);
    }
}
