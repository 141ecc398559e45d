//! PHY Update procedure FSM (spec.md §4.F, central/peripheral × local/remote).
//!
//! A single state machine is shared by all four role/direction combinations the spec names
//! (central-local, central-remote, peripheral-local, peripheral-remote); `local` and the
//! connection's `role` pick the branch, since the four combinations differ only in which PDUs are
//! sent/expected at each step, not in the overall shape.

use super::{AbortReason, Event, StepResult};
use crate::hci::HciError;
use crate::llcp::connection::{ConnectionState, Role};
use crate::llcp::notify::Notification;
use crate::llcp::pdu::{Pdu, PhyReq, PhyUpdateInd};
use crate::time::EventCounter;
use bitflags::bitflags;

bitflags! {
    /// A PHY preference bitmask, as carried by `LL_PHY_REQ`/`RSP` (`tx_phys`/`rx_phys`).
    pub struct PhyMask: u8 {
        const LE_1M = 1 << 0;
        const LE_2M = 1 << 1;
        const LE_CODED = 1 << 2;
    }
}

impl PhyMask {
    /// Picks the best single PHY out of an intersection, preferring higher throughput
    /// (`2M > CODED > 1M`), per spec.md §4.F.
    pub fn prefer_highest_throughput(self) -> PhyMask {
        if self.contains(PhyMask::LE_2M) {
            PhyMask::LE_2M
        } else if self.contains(PhyMask::LE_CODED) {
            PhyMask::LE_CODED
        } else {
            PhyMask::LE_1M
        }
    }
}

/// A requested PHY preference pair, as supplied via `phy_req_send`.
#[derive(Debug, Copy, Clone)]
pub struct PhyRequest {
    pub tx_phys: u8,
    pub rx_phys: u8,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Step {
    Idle,
    WaitRsp,
    WaitInd,
    WaitInstant,
    Done,
}

/// PHY Update procedure state (component F, `PHY_UPDATE` kind).
#[derive(Debug, Copy, Clone)]
pub struct PhyState {
    step: Step,
    /// Whether this context was created by a local HCI request (`phy_req_send`) rather than by an
    /// inbound `LL_PHY_REQ`.
    pub local: bool,
    req_tx_phys: u8,
    req_rx_phys: u8,
    sel_tx: u8,
    sel_rx: u8,
}

impl PhyState {
    pub fn local(req: PhyRequest) -> Self {
        Self {
            step: Step::Idle,
            local: true,
            req_tx_phys: req.tx_phys,
            req_rx_phys: req.rx_phys,
            sel_tx: 0,
            sel_rx: 0,
        }
    }

    /// Creates a remote context that has already decided to respond to an inbound `LL_PHY_REQ`
    /// (used both for a fresh remote procedure and for the peripheral's collision-yield path).
    pub fn remote_responder(peer_tx_phys: u8, peer_rx_phys: u8) -> Self {
        Self {
            step: Step::Idle,
            local: false,
            req_tx_phys: peer_tx_phys,
            req_rx_phys: peer_rx_phys,
            sel_tx: 0,
            sel_rx: 0,
        }
    }
}

pub fn run(
    state: &mut PhyState,
    collision: &mut bool,
    instant: &mut Option<EventCounter>,
    conn: &mut ConnectionState,
    event: Event<'_>,
) -> StepResult {
    match (state.step, event) {
        (Step::Done, _) => StepResult::Complete,

        (Step::Idle, Event::Tick) if state.local => {
            state.step = Step::WaitRsp;
            StepResult::EmitTx(Pdu::PhyReq(PhyReq {
                tx_phys: state.req_tx_phys,
                rx_phys: state.req_rx_phys,
            }))
        }

        // Remote-initiated: central drives the exchange and replies with the IND directly;
        // peripheral must respond with PHY_RSP and wait for the central's IND.
        (Step::Idle, Event::Tick) if !state.local => match conn.role {
            Role::Central => {
                let (sel_tx, sel_rx) = select_phys(state.req_tx_phys, state.req_rx_phys, conn);
                state.sel_tx = sel_tx;
                state.sel_rx = sel_rx;
                let ec = conn.event_counter.plus(6);
                *instant = Some(ec);
                state.step = Step::WaitInstant;
                StepResult::EmitTx(Pdu::PhyUpdateInd(PhyUpdateInd {
                    m_to_s_phy: sel_tx,
                    s_to_m_phy: sel_rx,
                    instant: ec.raw(),
                }))
            }
            Role::Peripheral => {
                state.step = Step::WaitInd;
                StepResult::EmitTx(Pdu::PhyRsp(PhyReq {
                    tx_phys: conn.phy_pref_tx.bits(),
                    rx_phys: conn.phy_pref_rx.bits(),
                }))
            }
        },

        (Step::WaitRsp, Event::Rx(Pdu::PhyRsp(rsp))) => {
            let (sel_tx, sel_rx) = select_phys(rsp.tx_phys, rsp.rx_phys, conn);
            if sel_tx == conn.phy_tx.bits() && sel_rx == conn.phy_rx.bits() {
                // No change needed: complete without a notification (spec.md §4.F).
                state.step = Step::Done;
                StepResult::EmitTx(Pdu::PhyUpdateInd(PhyUpdateInd {
                    m_to_s_phy: sel_tx,
                    s_to_m_phy: sel_rx,
                    instant: 0xFFFF,
                }))
            } else {
                let ec = conn.event_counter.plus(6);
                *instant = Some(ec);
                state.sel_tx = sel_tx;
                state.sel_rx = sel_rx;
                state.step = Step::WaitInstant;
                StepResult::EmitTx(Pdu::PhyUpdateInd(PhyUpdateInd {
                    m_to_s_phy: sel_tx,
                    s_to_m_phy: sel_rx,
                    instant: ec.raw(),
                }))
            }
        }

        (Step::WaitRsp, Event::Rx(Pdu::UnknownRsp(_))) => {
            state.step = Step::Done;
            StepResult::EmitNtf(Notification::PhyUpdate {
                status: HciError::UNSUPP_REMOTE_FEATURE,
                tx: conn.phy_tx.bits(),
                rx: conn.phy_rx.bits(),
            })
        }

        // Peripheral's own request collided with the peer's (central's) competing PHY_REQ: the
        // peer wins, tells us so, and we'll separately see its PHY_UPDATE_IND via the remote
        // context created to respond to that incoming request.
        (Step::WaitInd, Event::Rx(Pdu::RejectIndExt(rej)))
        | (Step::WaitRsp, Event::Rx(Pdu::RejectIndExt(rej)))
            if rej.reject_opcode == u8::from(super::super::pdu::ControlOpcode::PhyReq) =>
        {
            *collision = true;
            state.step = Step::Done;
            StepResult::EmitNtf(Notification::PhyUpdate {
                status: HciError::LL_PROC_COLLISION,
                tx: conn.phy_tx.bits(),
                rx: conn.phy_rx.bits(),
            })
        }

        (Step::WaitInd, Event::Rx(Pdu::PhyUpdateInd(ind))) => {
            state.sel_tx = ind.m_to_s_phy;
            state.sel_rx = ind.s_to_m_phy;
            if ind.instant == 0xFFFF {
                state.step = Step::Done;
                StepResult::Continue
            } else {
                *instant = Some(EventCounter::new(ind.instant));
                state.step = Step::WaitInstant;
                StepResult::Continue
            }
        }

        (Step::WaitInstant, Event::Tick) | (Step::WaitInstant, Event::InstantReached) => {
            match *instant {
                Some(target) if conn.event_counter.has_reached(target) => {
                    conn.phy_tx = into_phy(state.sel_tx);
                    conn.phy_rx = into_phy(state.sel_rx);
                    state.step = Step::Done;
                    StepResult::EmitNtf(Notification::PhyUpdate {
                        status: HciError::SUCCESS,
                        tx: state.sel_tx,
                        rx: state.sel_rx,
                    })
                }
                _ => StepResult::Continue,
            }
        }

        (_, Event::Timeout) => StepResult::Abort(AbortReason::ProcedureTimeout),

        _ => StepResult::Continue,
    }
}

fn select_phys(peer_tx: u8, peer_rx: u8, conn: &ConnectionState) -> (u8, u8) {
    let tx_common = PhyMask::from_bits_truncate(peer_rx) & conn.phy_pref_tx;
    let rx_common = PhyMask::from_bits_truncate(peer_tx) & conn.phy_pref_rx;
    let tx = if tx_common.is_empty() {
        conn.phy_tx.as_mask()
    } else {
        tx_common.prefer_highest_throughput()
    };
    let rx = if rx_common.is_empty() {
        conn.phy_rx.as_mask()
    } else {
        rx_common.prefer_highest_throughput()
    };
    (tx.bits(), rx.bits())
}

fn into_phy(mask: u8) -> crate::llcp::connection::Phy {
    use crate::llcp::connection::Phy;
    if mask & PhyMask::LE_2M.bits() != 0 {
        Phy::Le2M
    } else if mask & PhyMask::LE_CODED.bits() != 0 {
        Phy::LeCoded
    } else {
        Phy::Le1M
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llcp::connection::{ConnectionState, Phy, Role};

    fn conn(role: Role) -> ConnectionState {
        ConnectionState::new(0, role)
    }

    #[test]
    fn local_happy_path_emits_req_then_ind() {
        let mut c = conn(Role::Central);
        let mut state = PhyState::local(PhyRequest {
            tx_phys: PhyMask::LE_2M.bits(),
            rx_phys: PhyMask::LE_2M.bits(),
        });
        let mut collision = false;
        let mut instant = None;

        let r = run(&mut state, &mut collision, &mut instant, &mut c, Event::Tick);
        assert!(matches!(r, StepResult::EmitTx(Pdu::PhyReq(_))));

        let rsp = Pdu::PhyRsp(PhyReq {
            tx_phys: PhyMask::LE_2M.bits(),
            rx_phys: PhyMask::LE_2M.bits(),
        });
        let r = run(&mut state, &mut collision, &mut instant, &mut c, Event::Rx(&rsp));
        match r {
            StepResult::EmitTx(Pdu::PhyUpdateInd(ind)) => assert_eq!(ind.instant, 6),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(instant, Some(EventCounter::new(6)));
    }

    #[test]
    fn unsupported_feature_notifies_and_completes() {
        let mut c = conn(Role::Central);
        let mut state = PhyState::local(PhyRequest {
            tx_phys: PhyMask::LE_2M.bits(),
            rx_phys: PhyMask::LE_2M.bits(),
        });
        let mut collision = false;
        let mut instant = None;
        run(&mut state, &mut collision, &mut instant, &mut c, Event::Tick);

        let unknown = Pdu::UnknownRsp(crate::llcp::pdu::UnknownRsp::new(
            crate::llcp::pdu::ControlOpcode::PhyReq,
        ));
        let r = run(&mut state, &mut collision, &mut instant, &mut c, Event::Rx(&unknown));
        assert!(matches!(
            r,
            StepResult::EmitNtf(Notification::PhyUpdate {
                status: HciError::UNSUPP_REMOTE_FEATURE,
                ..
            })
        ));
        let r = run(&mut state, &mut collision, &mut instant, &mut c, Event::Tick);
        assert!(matches!(r, StepResult::Complete));
    }

    #[test]
    fn instant_reached_applies_and_notifies_once() {
        let mut c = conn(Role::Central);
        c.event_counter = EventCounter::new(0);
        let mut state = PhyState::local(PhyRequest {
            tx_phys: PhyMask::LE_2M.bits(),
            rx_phys: PhyMask::LE_2M.bits(),
        });
        let mut collision = false;
        let mut instant = Some(EventCounter::new(6));
        state.sel_tx = PhyMask::LE_2M.bits();
        state.sel_rx = PhyMask::LE_2M.bits();
        // Mark the state as if WaitRsp already happened.
        let state_ptr: &mut PhyState = &mut state;
        state_ptr.step = Step::WaitInstant;

        for ec in 0..6 {
            c.event_counter = EventCounter::new(ec);
            let r = run(&mut state, &mut collision, &mut instant, &mut c, Event::Tick);
            assert!(matches!(r, StepResult::Continue));
        }
        c.event_counter = EventCounter::new(6);
        let r = run(&mut state, &mut collision, &mut instant, &mut c, Event::Tick);
        assert!(matches!(
            r,
            StepResult::EmitNtf(Notification::PhyUpdate {
                status: HciError::SUCCESS,
                ..
            })
        ));
        assert_eq!(c.phy_tx, Phy::Le2M);
    }
}
