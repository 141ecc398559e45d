//! Encryption Start procedure FSM (spec.md §4.F).
//!
//! Central: `IDLE → TX_ENC_REQ → WAIT_ENC_RSP → WAIT_START_ENC_REQ → TX_START_ENC_RSP →
//! WAIT_START_ENC_RSP → DONE(enc_tx=enc_rx=true)`.
//! Peripheral: `RX_ENC_REQ → TX_ENC_RSP → WAIT_LTK_REPLY(host) → {TX_START_ENC_REQ|TX_REJECT_IND}`.
//! The peripheral's "ask the host for the LTK" step has no LL PDU of its own; it is represented by
//! a `WaitLtkReply` step that only advances once `Connection::supply_ltk_reply` has stashed a
//! reply on `ConnectionState`.

use super::{AbortReason, Event, StepResult};
use crate::hci::HciError;
use crate::llcp::connection::ConnectionState;
use crate::llcp::notify::Notification;
use crate::llcp::pdu::{EncReq, EncRsp, Pdu, RejectInd, StartEncReq, StartEncRsp};

/// A locally-initiated `LL_ENC_REQ`, as supplied via `enc_req_send`.
#[derive(Debug, Copy, Clone)]
pub struct EncryptionRequest {
    pub rand: [u8; 8],
    pub ediv: u16,
    pub ltk: [u8; 16],
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Step {
    Idle,
    WaitRsp,
    WaitStartReq,
    WaitStartRsp,
    TxEncRsp,
    WaitLtkReply,
    TxReject,
    Done,
}

#[derive(Debug, Copy, Clone)]
pub struct EncryptionState {
    step: Step,
    pub local: bool,
    ltk: [u8; 16],
    peer_rand: [u8; 8],
    peer_ediv: u16,
}

impl EncryptionState {
    pub fn local(req: EncryptionRequest) -> Self {
        Self {
            step: Step::Idle,
            local: true,
            ltk: req.ltk,
            peer_rand: req.rand,
            peer_ediv: req.ediv,
        }
    }

    /// Creates a peripheral-side context reacting to an inbound `LL_ENC_REQ`.
    pub fn remote(req: &EncReq) -> Self {
        Self {
            step: Step::TxEncRsp,
            local: false,
            ltk: [0; 16],
            peer_rand: req.rand,
            peer_ediv: req.ediv,
        }
    }
}

pub fn run(
    state: &mut EncryptionState,
    _collision: &mut bool,
    _instant: &mut Option<crate::time::EventCounter>,
    conn: &mut ConnectionState,
    event: Event<'_>,
) -> StepResult {
    match (state.step, event) {
        (Step::Done, _) => StepResult::Complete,

        (Step::Idle, Event::Tick) if state.local => {
            state.step = Step::WaitRsp;
            StepResult::EmitTx(Pdu::EncReq(EncReq {
                rand: state.peer_rand,
                ediv: state.peer_ediv,
                skd_m: [0; 8],
                iv_m: [0; 4],
            }))
        }

        (Step::WaitRsp, Event::Rx(Pdu::EncRsp(_))) => {
            state.step = Step::WaitStartReq;
            StepResult::Continue
        }

        (Step::WaitStartReq, Event::Rx(Pdu::StartEncReq(_))) => {
            state.step = Step::WaitStartRsp;
            conn.enc_tx = true;
            conn.enc_rx = true;
            StepResult::EmitTx(Pdu::StartEncRsp(StartEncRsp {}))
        }

        (Step::WaitStartRsp, Event::Rx(Pdu::StartEncRsp(_))) => {
            state.step = Step::Done;
            StepResult::EmitNtf(Notification::EncChange {
                status: HciError::SUCCESS,
            })
        }

        // Peripheral side: our `TxEncRsp` entry step is driven by the first `Tick` after
        // construction so the emitted PDU flows through the normal `EmitTx` path.
        (Step::TxEncRsp, Event::Tick) => {
            state.step = Step::WaitLtkReply;
            StepResult::EmitTx(Pdu::EncRsp(EncRsp {
                skd_s: [0; 8],
                iv_s: [0; 4],
            }))
        }

        (Step::WaitLtkReply, Event::Tick) => match conn.ltk_reply.take() {
            None => StepResult::Continue,
            Some((error_code, ltk)) if error_code == HciError::SUCCESS.0 => {
                state.ltk = ltk;
                state.step = Step::Done;
                conn.enc_tx = true;
                conn.enc_rx = true;
                StepResult::EmitTx(Pdu::StartEncReq(StartEncReq {}))
            }
            Some(_) => {
                state.step = Step::TxReject;
                StepResult::EmitTx(Pdu::RejectInd(RejectInd {
                    error_code: HciError::PIN_OR_KEY_MISSING.0,
                }))
            }
        },

        (Step::TxReject, Event::Tick) => {
            state.step = Step::Done;
            StepResult::EmitNtf(Notification::EncChange {
                status: HciError::PIN_OR_KEY_MISSING,
            })
        }

        (_, Event::Rx(Pdu::RejectInd(RejectInd { error_code }))) => {
            state.step = Step::Done;
            StepResult::EmitNtf(Notification::EncChange {
                status: HciError(*error_code),
            })
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
    fn central_happy_path_sets_enc_flags() {
        let mut conn = ConnectionState::new(0, Role::Central);
        let mut state = EncryptionState::local(EncryptionRequest {
            rand: [1; 8],
            ediv: 2,
            ltk: [3; 16],
        });
        let mut collision = false;
        let mut instant = None;

        let r = run(&mut state, &mut collision, &mut instant, &mut conn, Event::Tick);
        assert!(matches!(r, StepResult::EmitTx(Pdu::EncReq(_))));

        let rsp = Pdu::EncRsp(EncRsp {
            skd_s: [0; 8],
            iv_s: [0; 4],
        });
        run(&mut state, &mut collision, &mut instant, &mut conn, Event::Rx(&rsp));

        let start_req = Pdu::StartEncReq(StartEncReq {});
        let r = run(
            &mut state,
            &mut collision,
            &mut instant,
            &mut conn,
            Event::Rx(&start_req),
        );
        assert!(matches!(r, StepResult::EmitTx(Pdu::StartEncRsp(_))));
        assert!(conn.enc_tx && conn.enc_rx);

        let start_rsp = Pdu::StartEncRsp(StartEncRsp {});
        let r = run(
            &mut state,
            &mut collision,
            &mut instant,
            &mut conn,
            Event::Rx(&start_rsp),
        );
        assert!(matches!(
            r,
            StepResult::EmitNtf(Notification::EncChange {
                status: HciError::SUCCESS
            })
        ));
    }

    #[test]
    fn peripheral_ltk_rejection_notifies_failure() {
        let mut conn = ConnectionState::new(1, Role::Peripheral);
        let req = EncReq {
            rand: [1; 8],
            ediv: 2,
            skd_m: [0; 8],
            iv_m: [0; 4],
        };
        let mut state = EncryptionState::remote(&req);
        let mut collision = false;
        let mut instant = None;

        let r = run(&mut state, &mut collision, &mut instant, &mut conn, Event::Tick);
        assert!(matches!(r, StepResult::EmitTx(Pdu::EncRsp(_))));

        conn.ltk_reply = Some((HciError::PIN_OR_KEY_MISSING.0, [0; 16]));
        let r = run(&mut state, &mut collision, &mut instant, &mut conn, Event::Tick);
        assert!(matches!(r, StepResult::EmitTx(Pdu::RejectInd(_))));

        let r = run(&mut state, &mut collision, &mut instant, &mut conn, Event::Tick);
        assert!(matches!(
            r,
            StepResult::EmitNtf(Notification::EncChange {
                status: HciError::PIN_OR_KEY_MISSING
            })
        ));
    }
}
