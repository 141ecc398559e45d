//! Feature Exchange procedure FSM (spec.md §4.F).
//!
//! Central sends `LL_FEATURE_REQ`; peripheral sends `LL_SLAVE_FEATURE_REQ`. Both directions share
//! this state machine — only the request opcode emitted differs, selected by `conn.role`.

use super::{AbortReason, Event, StepResult};
use crate::features::FeatureSet;
use crate::llcp::connection::{ConnectionState, Role};
use crate::llcp::notify::Notification;
use crate::llcp::pdu::{FeatureReq, FeatureRsp, Pdu, SlaveFeatureReq};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Step {
    Idle,
    WaitRsp,
    Done,
}

#[derive(Debug, Copy, Clone)]
pub struct FeatureState {
    step: Step,
    pub local: bool,
}

impl FeatureState {
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

pub fn run(
    state: &mut FeatureState,
    _collision: &mut bool,
    _instant: &mut Option<crate::time::EventCounter>,
    conn: &mut ConnectionState,
    event: Event<'_>,
) -> StepResult {
    match (state.step, event) {
        (Step::Done, _) => StepResult::Complete,

        (Step::Idle, Event::Tick) if state.local => {
            // A cached peer feature set from an earlier exchange satisfies any later request
            // immediately (spec.md §4.F describes the same idempotence for version exchange;
            // feature exchange reuses it since `features_valid` only ever flips false -> true).
            if conn.features_valid {
                state.step = Step::Done;
                return StepResult::EmitNtf(Notification::FeatureExchange {
                    features: conn.features_peer,
                });
            }
            state.step = Step::WaitRsp;
            match conn.role {
                Role::Central => {
                    StepResult::EmitTx(Pdu::FeatureReq(FeatureReq::new(conn.features_local)))
                }
                Role::Peripheral => StepResult::EmitTx(Pdu::SlaveFeatureReq(SlaveFeatureReq::new(
                    conn.features_local,
                ))),
            }
        }

        (Step::WaitRsp, Event::Rx(Pdu::FeatureRsp(rsp))) => {
            apply_peer_features(conn, rsp.feature_set());
            state.step = Step::Done;
            StepResult::EmitNtf(Notification::FeatureExchange {
                features: conn.features_peer,
            })
        }

        (Step::WaitRsp, Event::Rx(Pdu::UnknownRsp(_))) => {
            apply_peer_features(conn, FeatureSet::empty());
            state.step = Step::Done;
            StepResult::EmitNtf(Notification::FeatureExchange {
                features: conn.features_peer,
            })
        }

        // Remote-initiated: reply with our own feature set, as either responder opcode requires.
        (Step::Idle, Event::Rx(Pdu::FeatureReq(req))) if !state.local => {
            apply_peer_features(conn, req.feature_set());
            state.step = Step::Done;
            StepResult::EmitTx(Pdu::FeatureRsp(FeatureRsp::new(conn.features_local)))
        }
        (Step::Idle, Event::Rx(Pdu::SlaveFeatureReq(req))) if !state.local => {
            apply_peer_features(conn, req.feature_set());
            state.step = Step::Done;
            StepResult::EmitTx(Pdu::FeatureRsp(FeatureRsp::new(conn.features_local)))
        }

        (_, Event::Timeout) => StepResult::Abort(AbortReason::ProcedureTimeout),

        _ => StepResult::Continue,
    }
}

fn apply_peer_features(conn: &mut ConnectionState, peer_reported: FeatureSet) {
    if !conn.features_valid {
        conn.features_peer = peer_reported & conn.features_local;
        conn.features_valid = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llcp::connection::ConnectionState;

    #[test]
    fn rsp_masks_against_local_features_once() {
        let mut conn = ConnectionState::new(0, Role::Central);
        conn.features_local = FeatureSet::LE_ENCRYPTION | FeatureSet::LE_PACKET_LENGTH_EXTENSION;
        let mut state = FeatureState::local();
        let mut collision = false;
        let mut instant = None;
        run(&mut state, &mut collision, &mut instant, &mut conn, Event::Tick);

        let rsp = Pdu::FeatureRsp(FeatureRsp::new(FeatureSet::LE_ENCRYPTION | FeatureSet::LE_PING));
        let r = run(&mut state, &mut collision, &mut instant, &mut conn, Event::Rx(&rsp));
        assert!(matches!(r, StepResult::EmitNtf(_)));
        assert!(conn.features_valid);
        assert_eq!(conn.features_peer, FeatureSet::LE_ENCRYPTION);
    }

    #[test]
    fn second_exchange_reuses_cached_features() {
        let mut conn = ConnectionState::new(0, Role::Central);
        conn.features_valid = true;
        conn.features_peer = FeatureSet::LE_PING;
        let mut state = FeatureState::local();
        let mut collision = false;
        let mut instant = None;
        let r = run(&mut state, &mut collision, &mut instant, &mut conn, Event::Tick);
        assert!(matches!(
            r,
            StepResult::EmitNtf(Notification::FeatureExchange {
                features: FeatureSet::LE_PING
            })
        ));
    }
}
