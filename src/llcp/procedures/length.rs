//! Data Length Update procedure FSM (spec.md §4.F).
//!
//! `LL_LENGTH_REQ`/`RSP` carry the new values directly with no separate IND/instant step — the
//! change applies as soon as both sides have exchanged them, unlike PHY/ConnUpdate/ChannelMap.

use super::{AbortReason, Event, StepResult};
use crate::llcp::connection::ConnectionState;
use crate::llcp::notify::Notification;
use crate::llcp::pdu::{LengthReq, Pdu};

/// A locally-requested data length update, as supplied via `length_req_send`.
#[derive(Debug, Copy, Clone)]
pub struct LengthRequest {
    pub max_tx_octets: u16,
    pub max_tx_time: u16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Step {
    Idle,
    WaitRsp,
    Done,
}

#[derive(Debug, Copy, Clone)]
pub struct LengthState {
    step: Step,
    pub local: bool,
    req_tx_octets: u16,
    req_tx_time: u16,
}

impl LengthState {
    pub fn local(req: LengthRequest) -> Self {
        Self {
            step: Step::Idle,
            local: true,
            req_tx_octets: req.max_tx_octets,
            req_tx_time: req.max_tx_time,
        }
    }

    pub fn remote() -> Self {
        Self {
            step: Step::Idle,
            local: false,
            req_tx_octets: 0,
            req_tx_time: 0,
        }
    }
}

pub fn run(
    state: &mut LengthState,
    _collision: &mut bool,
    _instant: &mut Option<crate::time::EventCounter>,
    conn: &mut ConnectionState,
    event: Event<'_>,
) -> StepResult {
    match (state.step, event) {
        (Step::Done, _) => StepResult::Complete,

        (Step::Idle, Event::Tick) if state.local => {
            state.step = Step::WaitRsp;
            StepResult::EmitTx(Pdu::LengthReq(request_pdu(conn, state)))
        }

        (Step::WaitRsp, Event::Rx(Pdu::LengthRsp(rsp))) => {
            apply(conn, rsp.max_tx_octets, rsp.max_tx_time);
            state.step = Step::Done;
            StepResult::EmitNtf(Notification::LengthChange)
        }

        (Step::Idle, Event::Rx(Pdu::LengthReq(req))) if !state.local => {
            apply(conn, req.max_tx_octets, req.max_tx_time);
            state.step = Step::Done;
            StepResult::EmitTx(Pdu::LengthRsp(request_pdu(conn, state)))
        }

        (_, Event::Timeout) => StepResult::Abort(AbortReason::ProcedureTimeout),

        _ => StepResult::Continue,
    }
}

fn request_pdu(conn: &ConnectionState, state: &LengthState) -> LengthReq {
    let tx_octets = if state.local {
        state.req_tx_octets
    } else {
        conn.max_tx_octets
    };
    let tx_time = if state.local { state.req_tx_time } else { conn.max_tx_time };
    LengthReq {
        max_rx_octets: conn.max_rx_octets,
        max_rx_time: conn.max_rx_time,
        max_tx_octets: tx_octets,
        max_tx_time: tx_time,
    }
}

fn apply(conn: &mut ConnectionState, peer_max_rx_octets: u16, peer_max_rx_time: u16) {
    conn.max_tx_octets = conn.max_tx_octets.min(peer_max_rx_octets);
    conn.max_tx_time = conn.max_tx_time.min(peer_max_rx_time);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llcp::connection::Role;

    #[test]
    fn local_request_applies_peer_minimum_on_response() {
        let mut conn = ConnectionState::new(0, Role::Central);
        let mut state = LengthState::local(LengthRequest {
            max_tx_octets: 200,
            max_tx_time: 2000,
        });
        let mut collision = false;
        let mut instant = None;

        let r = run(&mut state, &mut collision, &mut instant, &mut conn, Event::Tick);
        assert!(matches!(r, StepResult::EmitTx(Pdu::LengthReq(_))));

        let rsp = Pdu::LengthRsp(LengthReq {
            max_rx_octets: 100,
            max_rx_time: 900,
            max_tx_octets: 0,
            max_tx_time: 0,
        });
        let r = run(&mut state, &mut collision, &mut instant, &mut conn, Event::Rx(&rsp));
        assert!(matches!(r, StepResult::EmitNtf(Notification::LengthChange)));
        assert_eq!(conn.max_tx_octets, 100);
        assert_eq!(conn.max_tx_time, 900);
    }
}
