//! LLCP Dispatcher (spec.md component G) — the per-connection-event run loop.
//!
//! Ties together every other component: pumps the active local/remote procedure contexts,
//! routes inbound control PDUs to them (or starts a fresh remote context, or replies
//! `LL_UNKNOWN_RSP`), resolves the PHY/Connection-Update/Feature-Exchange collision rules spec.md
//! §4.G names, promotes the next queued local request, and expires a stalled procedure. No
//! teacher analogue drives a dispatcher this shaped; built from the design notes' own step list,
//! in the same "one plain function, match on state" style the teacher's `link::Responder::process`
//! loop uses for its receive path.

use crate::hci::HciError;
use crate::llcp::connection::{Connection, Role};
use crate::llcp::notify::Notification;
use crate::llcp::pdu::{ControlOpcode, Pdu, RejectIndExt, UnknownRsp};
use crate::llcp::procedures::channel_map::ChannelMapState;
use crate::llcp::procedures::conn_update::ConnUpdateState;
use crate::llcp::procedures::encryption::EncryptionState;
use crate::llcp::procedures::feature::FeatureState;
use crate::llcp::procedures::length::LengthState;
use crate::llcp::procedures::phy::PhyState;
use crate::llcp::procedures::terminate::TerminateState;
use crate::llcp::procedures::version::VersionState;
use crate::llcp::procedures::{Event, ProcedureContext, ProcedureKind, ProcedureState, StepResult};
use crate::llcp::tx_queue::TxNode;
use crate::time::EventCounter;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Slot {
    Local,
    Remote,
}

/// Runs one connection event: increments the event counter, steps the active contexts, drains
/// `inbound` (control PDUs received on air this event), promotes the next queued local request,
/// and checks for a stalled procedure. Mirrors spec.md §4.G's seven numbered steps in order.
pub fn event(conn: &mut Connection, inbound: &[Pdu]) {
    conn.state.event_counter.increment();
    trace!("event {}: {} inbound pdu(s)", conn.state.event_counter.raw(), inbound.len());

    preempt_check(conn);

    step_local(conn, Event::Tick);
    step_remote(conn, Event::Tick);

    for pdu in inbound {
        route_inbound(conn, pdu);
    }

    promote(conn);

    check_timeout(conn);
}

fn preempt_check(conn: &mut Connection) {
    if conn.state.terminate_reason == 0 || conn.terminate_queued {
        return;
    }
    let local_is_terminate = conn
        .local_ctx
        .map_or(false, |id| conn.pool.get(id).kind() == ProcedureKind::Terminate);
    if !local_is_terminate {
        conn.local_queue
            .push_front(crate::llcp::local_queue::LocalRequest::Terminate(
                conn.state.terminate_reason,
            ));
        conn.terminate_queued = true;
    }
}

fn step_local(conn: &mut Connection, event: Event<'_>) {
    if retry_stalled_ntf(conn, Slot::Local) {
        return;
    }
    if let Some(id) = conn.local_ctx {
        let ctx = conn.pool.get_mut(id);
        let result = ctx.run(&mut conn.state, event);
        apply_result(conn, Slot::Local, result);
    }
}

fn step_remote(conn: &mut Connection, event: Event<'_>) {
    if retry_stalled_ntf(conn, Slot::Remote) {
        return;
    }
    if let Some(id) = conn.remote_ctx {
        let ctx = conn.pool.get_mut(id);
        let result = ctx.run(&mut conn.state, event);
        apply_result(conn, Slot::Remote, result);
    }
}

/// Retries a notification an earlier event couldn't deliver because the host queue was full.
/// Returns `true` if `slot` is still (or was just) stalled, in which case its FSM is not
/// stepped this event — spec.md §4.H/§7: "stall the procedure one event and retry", so the
/// notification is never dropped and the context is never released before it's delivered.
fn retry_stalled_ntf(conn: &mut Connection, slot: Slot) -> bool {
    let pending = match slot {
        Slot::Local => conn.local_ntf_pending,
        Slot::Remote => conn.remote_ntf_pending,
    };
    let ntf = match pending {
        Some(ntf) => ntf,
        None => return false,
    };
    if conn.ntf.push(ntf).is_ok() {
        match slot {
            Slot::Local => conn.local_ntf_pending = None,
            Slot::Remote => conn.remote_ntf_pending = None,
        }
    }
    true
}

fn apply_result(conn: &mut Connection, slot: Slot, result: StepResult) {
    match result {
        StepResult::Continue => {}
        StepResult::EmitTx(pdu) => push_ctrl_tx(conn, &pdu),
        StepResult::EmitNtf(Notification::Terminate { reason }) => {
            conn.notify_terminate_reserved(Notification::Terminate { reason });
        }
        StepResult::EmitNtf(ntf) => emit_ntf(conn, slot, ntf),
        StepResult::Complete => release_slot(conn, slot),
        StepResult::Abort(reason) => {
            debug!("{:?} procedure aborted: {:?}", slot, reason);
            release_slot(conn, slot);
            conn.state.terminate_reason = HciError::LMP_RESPONSE_TIMEOUT.0;
        }
    }
}

/// Delivers `ntf`, or — if the host queue is full — holds it on `slot` to retry next event
/// instead of dropping it (spec.md §4.H, §7).
fn emit_ntf(conn: &mut Connection, slot: Slot, ntf: Notification) {
    if conn.ntf.push(ntf).is_err() {
        match slot {
            Slot::Local => conn.local_ntf_pending = Some(ntf),
            Slot::Remote => conn.remote_ntf_pending = Some(ntf),
        }
    }
}

fn release_slot(conn: &mut Connection, slot: Slot) {
    match slot {
        Slot::Local => {
            if let Some(id) = conn.local_ctx.take() {
                conn.pool.release(id);
            }
        }
        Slot::Remote => {
            if let Some(id) = conn.remote_ctx.take() {
                conn.pool.release(id);
            }
            conn.remote_slot.clear();
        }
    }
}

/// Encodes and enqueues `pdu` onto the control-PDU priority slot. Per spec.md §4.B the slot
/// should always be free when an FSM emits (a procedure never has two PDUs in flight); a full
/// slot here means the radio hasn't drained the previous one yet, so the PDU is dropped rather
/// than blocking the event — the peer's own retransmission timers cover the loss.
fn push_ctrl_tx(conn: &mut Connection, pdu: &Pdu) {
    let mut buf = [0u8; crate::llcp::tx_queue::CTRL_PDU_BUF_LEN];
    if let Ok(len) = pdu.encode(&mut buf) {
        if let Ok(node) = TxNode::new(&buf[..len]) {
            let _ = conn.tx.enqueue_ctrl(node);
        }
    }
}

fn promote(conn: &mut Connection) {
    if conn.local_ctx.is_some() || conn.local_queue.is_empty() {
        return;
    }
    if conn.pool.free_count() == 0 {
        return; // deferred: spec.md §4.C, acquisition retried on a later event.
    }
    if let Some(req) = conn.local_queue.pop() {
        match conn.pool.acquire(context_for_local_request(req)) {
            Ok(id) => {
                conn.local_ctx = Some(id);
                conn.state.procedure_reload = conn.state.procedure_reload_default;
                step_local(conn, Event::Tick);
            }
            Err(_) => conn.local_queue.push_front(req),
        }
    }
}

fn check_timeout(conn: &mut Connection) {
    if conn.local_ctx.is_none() && conn.remote_ctx.is_none() {
        return;
    }
    conn.state.procedure_reload = conn.state.procedure_reload.saturating_sub(1);
    if conn.state.procedure_reload == 0 {
        step_local(conn, Event::Timeout);
        step_remote(conn, Event::Timeout);
    }
}

fn context_for_local_request(req: crate::llcp::local_queue::LocalRequest) -> ProcedureContext {
    use crate::llcp::local_queue::LocalRequest;
    let state = match req {
        LocalRequest::Version => ProcedureState::Version(VersionState::local()),
        LocalRequest::FeatureExchange => ProcedureState::FeatureExchange(FeatureState::local()),
        LocalRequest::PhyUpdate(r) => ProcedureState::PhyUpdate(PhyState::local(r)),
        LocalRequest::Encryption(r) => ProcedureState::Encryption(EncryptionState::local(r)),
        LocalRequest::Terminate(reason) => ProcedureState::Terminate(TerminateState::local(reason)),
        LocalRequest::Length(r) => ProcedureState::Length(LengthState::local(r)),
        LocalRequest::ConnUpdate(r) => ProcedureState::ConnUpdate(ConnUpdateState::local(r)),
        LocalRequest::ChannelMap(r) => ProcedureState::ChannelMap(ChannelMapState::local(r)),
    };
    ProcedureContext {
        collision: false,
        instant: None,
        state,
    }
}

fn kind_for_opcode(opcode: ControlOpcode) -> Option<ProcedureKind> {
    match opcode {
        ControlOpcode::VersionInd => Some(ProcedureKind::Version),
        ControlOpcode::FeatureReq | ControlOpcode::SlaveFeatureReq | ControlOpcode::FeatureRsp => {
            Some(ProcedureKind::FeatureExchange)
        }
        ControlOpcode::PhyReq | ControlOpcode::PhyRsp | ControlOpcode::PhyUpdateInd => {
            Some(ProcedureKind::PhyUpdate)
        }
        ControlOpcode::EncReq
        | ControlOpcode::EncRsp
        | ControlOpcode::StartEncReq
        | ControlOpcode::StartEncRsp
        | ControlOpcode::PauseEncReq
        | ControlOpcode::PauseEncRsp => Some(ProcedureKind::Encryption),
        ControlOpcode::TerminateInd => Some(ProcedureKind::Terminate),
        ControlOpcode::LengthReq | ControlOpcode::LengthRsp => Some(ProcedureKind::Length),
        ControlOpcode::ConnectionUpdateInd
        | ControlOpcode::ConnectionParamReq
        | ControlOpcode::ConnectionParamRsp => Some(ProcedureKind::ConnUpdate),
        ControlOpcode::ChannelMapInd => Some(ProcedureKind::ChannelMap),
        ControlOpcode::RejectInd | ControlOpcode::RejectIndExt | ControlOpcode::UnknownRsp => None,
        ControlOpcode::Unknown(_) => None,
    }
}

/// Opcodes that may start a fresh remote procedure when no context is already handling their
/// kind (spec.md §4.E).
fn is_initiating_opcode(opcode: ControlOpcode) -> bool {
    matches!(
        opcode,
        ControlOpcode::FeatureReq
            | ControlOpcode::SlaveFeatureReq
            | ControlOpcode::VersionInd
            | ControlOpcode::EncReq
            | ControlOpcode::PhyReq
            | ControlOpcode::LengthReq
            | ControlOpcode::ConnectionUpdateInd
            | ControlOpcode::ChannelMapInd
    )
}

fn route_inbound(conn: &mut Connection, pdu: &Pdu) {
    let opcode = pdu.opcode();

    if let Pdu::TerminateInd(ind) = pdu {
        abort_all(conn, ind.error_code);
        return;
    }

    // Generic reply opcodes address whichever context is waiting on them, regardless of kind
    // (`LL_UNKNOWN_RSP`/`LL_REJECT_IND`/`LL_REJECT_EXT_IND` don't carry their own procedure kind —
    // the FSM in `WaitRsp`/`WaitInd` recognizes them by step, not by opcode-to-kind lookup).
    if matches!(
        opcode,
        ControlOpcode::RejectInd | ControlOpcode::RejectIndExt | ControlOpcode::UnknownRsp
    ) {
        if conn.local_ctx.is_some() {
            step_local(conn, Event::Rx(pdu));
        } else if conn.remote_ctx.is_some() {
            step_remote(conn, Event::Rx(pdu));
        }
        return;
    }

    let kind = match kind_for_opcode(opcode) {
        Some(k) => k,
        None => {
            reply_unknown(conn, opcode);
            return;
        }
    };

    // `LL_PHY_UPDATE_IND`/`LL_CONNECTION_UPDATE_IND`/`LL_CHANNEL_MAP_IND` are the instant-bearing
    // follow-up the *remote* context (the side that didn't send the original request) is waiting
    // for; preferring it here is what lets the peripheral-collision path (spec.md §8 S6) resolve
    // correctly once a remote responder context also exists alongside the local one.
    let prefer_remote = matches!(
        opcode,
        ControlOpcode::PhyUpdateInd | ControlOpcode::ConnectionUpdateInd | ControlOpcode::ChannelMapInd
    );

    let local_matches = conn.local_ctx.map_or(false, |id| conn.pool.get(id).kind() == kind);
    let remote_matches = conn.remote_ctx.map_or(false, |id| conn.pool.get(id).kind() == kind);

    if prefer_remote && remote_matches {
        step_remote(conn, Event::Rx(pdu));
        return;
    }

    if local_matches {
        // `LL_VERSION_IND` is the one initiating opcode that is also its own reply (there is no
        // separate "version response" opcode) — a local `Version` context in `WaitInd` genuinely
        // wants to receive this, so it's never treated as a collision. Every other initiating
        // opcode arriving while our own same-kind request is active means the peer raced us.
        let races_own_request = is_initiating_opcode(opcode) && opcode != ControlOpcode::VersionInd;
        if races_own_request {
            match kind {
                ProcedureKind::PhyUpdate | ProcedureKind::ConnUpdate => {
                    handle_local_remote_collision(conn, opcode, pdu);
                }
                ProcedureKind::FeatureExchange => {
                    // Simultaneous initiations merge: the later arrival is absorbed (spec.md §4.G).
                }
                _ => {} // no documented collision rule for this kind: drop silently.
            }
            return;
        }
        step_local(conn, Event::Rx(pdu));
        return;
    }

    if remote_matches {
        step_remote(conn, Event::Rx(pdu));
        return;
    }

    if is_initiating_opcode(opcode) {
        match conn.remote_slot.admit(kind) {
            Ok(()) => start_remote_context(conn, kind, pdu),
            Err(status) => reject_collision(conn, opcode, status),
        }
        return;
    }

    // An unexpected reply with no matching context: drop silently (spec.md §7).
}

/// Local PHY/ConnUpdate request collided with the peer's own competing request, per spec.md §4.G.
fn handle_local_remote_collision(conn: &mut Connection, opcode: ControlOpcode, pdu: &Pdu) {
    match conn.state.role {
        Role::Central => {
            // Central wins: reject the peer's request directly and keep running its own
            // procedure; no remote context is created.
            debug!("procedure collision on {:?}: central wins, rejecting peer", opcode);
            reject_collision(conn, opcode, HciError::LL_PROC_COLLISION);
        }
        Role::Peripheral => {
            // Peripheral yields: respond to the peer's request via a fresh remote context while
            // the local context keeps running and will observe the peer's own
            // `LL_REJECT_EXT_IND` on a later event.
            debug!("procedure collision on {:?}: peripheral yields", opcode);
            let kind = kind_for_opcode(opcode).expect("collision only checked for known kinds");
            start_remote_context(conn, kind, pdu);
        }
    }
}

fn reject_collision(conn: &mut Connection, opcode: ControlOpcode, status: HciError) {
    push_ctrl_tx(
        conn,
        &Pdu::RejectIndExt(RejectIndExt {
            reject_opcode: opcode.into(),
            error_code: status.0,
        }),
    );
}

fn reply_unknown(conn: &mut Connection, opcode: ControlOpcode) {
    push_ctrl_tx(conn, &Pdu::UnknownRsp(UnknownRsp::new(opcode)));
}

fn abort_all(conn: &mut Connection, reason: u8) {
    if let Some(id) = conn.local_ctx.take() {
        conn.pool.release(id);
    }
    if let Some(id) = conn.remote_ctx.take() {
        conn.pool.release(id);
    }
    conn.remote_slot.clear();
    conn.state.terminated = true;
    conn.notify_terminate_reserved(Notification::Terminate { reason });
}

fn start_remote_context(conn: &mut Connection, kind: ProcedureKind, pdu: &Pdu) {
    let ctx = match remote_context_for_pdu(pdu) {
        Some(ctx) => ctx,
        None => return,
    };
    let id = match conn.pool.acquire(ctx) {
        Ok(id) => id,
        Err(_) => return, // pool exhausted: peer's own retransmission covers the loss.
    };
    conn.remote_ctx = Some(id);
    conn.remote_slot.start(id, kind);
    let kick = match kind {
        ProcedureKind::FeatureExchange | ProcedureKind::Version | ProcedureKind::Length => {
            Event::Rx(pdu)
        }
        _ => Event::Tick,
    };
    step_remote(conn, kick);
}

fn remote_context_for_pdu(pdu: &Pdu) -> Option<ProcedureContext> {
    let state = match pdu {
        Pdu::FeatureReq(_) | Pdu::SlaveFeatureReq(_) => {
            ProcedureState::FeatureExchange(FeatureState::remote())
        }
        Pdu::VersionInd(_) => ProcedureState::Version(VersionState::remote()),
        Pdu::PhyReq(req) => {
            ProcedureState::PhyUpdate(PhyState::remote_responder(req.tx_phys, req.rx_phys))
        }
        Pdu::EncReq(req) => ProcedureState::Encryption(EncryptionState::remote(req)),
        Pdu::LengthReq(_) => ProcedureState::Length(LengthState::remote()),
        Pdu::ConnectionUpdateInd(ind) => ProcedureState::ConnUpdate(ConnUpdateState::remote(ind)),
        Pdu::ChannelMapInd(ind) => ProcedureState::ChannelMap(ChannelMapState::remote(ind)),
        _ => return None,
    };
    let instant = match pdu {
        Pdu::ConnectionUpdateInd(ind) => Some(EventCounter::new(ind.instant)),
        Pdu::ChannelMapInd(ind) => Some(EventCounter::new(ind.instant)),
        _ => None,
    };
    Some(ProcedureContext {
        collision: false,
        instant,
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::llcp::pdu::{PhyReq, PhyUpdateInd};
    use crate::llcp::procedures::phy::PhyMask;

    fn new_conn(role: Role) -> Connection {
        Connection::new(0, role, &ControllerConfig::default())
    }

    fn decode_tx(conn: &mut Connection) -> Pdu {
        let node = conn.tx.next().expect("expected a pending TX PDU");
        let pdu = Pdu::decode(node.as_bytes()).unwrap();
        conn.tx.release();
        pdu
    }

    /// S1 — Central-local PHY update, happy path.
    #[test]
    fn s1_central_local_phy_update_happy_path() {
        let mut conn = new_conn(Role::Central);
        conn.phy_req_send(PhyMask::LE_2M.bits(), PhyMask::LE_2M.bits());

        event(&mut conn, &[]);
        assert!(matches!(decode_tx(&mut conn), Pdu::PhyReq(_)));

        let rsp = Pdu::PhyRsp(PhyReq {
            tx_phys: PhyMask::LE_2M.bits(),
            rx_phys: PhyMask::LE_2M.bits(),
        });
        event(&mut conn, &[rsp]);
        let target = match decode_tx(&mut conn) {
            Pdu::PhyUpdateInd(ind) => ind.instant,
            other => panic!("unexpected {:?}", other),
        };

        while conn.state.event_counter.raw() < target {
            event(&mut conn, &[]);
        }
        assert_eq!(
            conn.ntf.pop(),
            Some(Notification::PhyUpdate {
                status: HciError::SUCCESS,
                tx: PhyMask::LE_2M.bits(),
                rx: PhyMask::LE_2M.bits(),
            })
        );
    }

    /// S2 — Central-local PHY update, peer lacks the feature.
    #[test]
    fn s2_central_local_phy_update_unsupported() {
        let mut conn = new_conn(Role::Central);
        conn.phy_req_send(PhyMask::LE_2M.bits(), PhyMask::LE_2M.bits());
        event(&mut conn, &[]);
        assert!(matches!(decode_tx(&mut conn), Pdu::PhyReq(_)));

        let unknown = Pdu::UnknownRsp(UnknownRsp::new(ControlOpcode::PhyReq));
        event(&mut conn, &[unknown]);
        assert_eq!(
            conn.ntf.pop(),
            Some(Notification::PhyUpdate {
                status: HciError::UNSUPP_REMOTE_FEATURE,
                tx: PhyMask::LE_1M.bits(),
                rx: PhyMask::LE_1M.bits(),
            })
        );
    }

    /// S3 — Central-remote PHY update.
    #[test]
    fn s3_central_remote_phy_update() {
        let mut conn = new_conn(Role::Central);
        let req = Pdu::PhyReq(PhyReq {
            tx_phys: PhyMask::LE_1M.bits(),
            rx_phys: PhyMask::LE_1M.bits(),
        });
        event(&mut conn, &[req]);
        let ind_instant = match decode_tx(&mut conn) {
            Pdu::PhyUpdateInd(ind) => ind.instant,
            other => panic!("unexpected {:?}", other),
        };
        while conn.state.event_counter.raw() < ind_instant {
            event(&mut conn, &[]);
        }
        assert_eq!(
            conn.ntf.pop(),
            Some(Notification::PhyUpdate {
                status: HciError::SUCCESS,
                tx: PhyMask::LE_1M.bits(),
                rx: PhyMask::LE_1M.bits(),
            })
        );
    }

    /// S4 — Peripheral-local PHY update.
    #[test]
    fn s4_peripheral_local_phy_update() {
        let mut conn = new_conn(Role::Peripheral);
        conn.phy_req_send(PhyMask::LE_1M.bits(), PhyMask::LE_1M.bits());
        event(&mut conn, &[]);
        assert!(matches!(decode_tx(&mut conn), Pdu::PhyReq(_)));

        let rsp = Pdu::PhyRsp(PhyReq {
            tx_phys: PhyMask::LE_1M.bits(),
            rx_phys: PhyMask::LE_1M.bits(),
        });
        event(&mut conn, &[rsp]);
        let target = match decode_tx(&mut conn) {
            Pdu::PhyUpdateInd(ind) => ind.instant,
            other => panic!("unexpected {:?}", other),
        };
        while conn.state.event_counter.raw() < target {
            event(&mut conn, &[]);
        }
        assert_eq!(
            conn.ntf.pop(),
            Some(Notification::PhyUpdate {
                status: HciError::SUCCESS,
                tx: PhyMask::LE_1M.bits(),
                rx: PhyMask::LE_1M.bits(),
            })
        );
    }

    /// S5 — Central-local PHY update collides with an inbound peer PHY_REQ: central wins.
    #[test]
    fn s5_central_local_collides_with_remote_request() {
        let mut conn = new_conn(Role::Central);
        conn.phy_req_send(PhyMask::LE_1M.bits(), PhyMask::LE_1M.bits());
        event(&mut conn, &[]);
        assert!(matches!(decode_tx(&mut conn), Pdu::PhyReq(_)));

        let peer_req = Pdu::PhyReq(PhyReq {
            tx_phys: PhyMask::LE_1M.bits(),
            rx_phys: PhyMask::LE_1M.bits(),
        });
        event(&mut conn, &[peer_req]);
        match decode_tx(&mut conn) {
            Pdu::RejectIndExt(rej) => {
                assert_eq!(rej.reject_opcode, u8::from(ControlOpcode::PhyReq));
                assert_eq!(rej.error_code, HciError::LL_PROC_COLLISION.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(conn.remote_ctx.is_none());

        let rsp = Pdu::PhyRsp(PhyReq {
            tx_phys: PhyMask::LE_1M.bits(),
            rx_phys: PhyMask::LE_1M.bits(),
        });
        event(&mut conn, &[rsp]);
        assert!(matches!(decode_tx(&mut conn), Pdu::PhyUpdateInd(_)));
    }

    /// S6 — Peripheral-local PHY update collides; peripheral yields then both sides complete.
    #[test]
    fn s6_peripheral_local_collides_and_yields() {
        let mut conn = new_conn(Role::Peripheral);
        conn.phy_req_send(PhyMask::LE_1M.bits(), PhyMask::LE_1M.bits());
        event(&mut conn, &[]);
        assert!(matches!(decode_tx(&mut conn), Pdu::PhyReq(_)));

        let peer_req = Pdu::PhyReq(PhyReq {
            tx_phys: PhyMask::LE_1M.bits(),
            rx_phys: PhyMask::LE_1M.bits(),
        });
        event(&mut conn, &[peer_req]);
        assert!(matches!(decode_tx(&mut conn), Pdu::PhyRsp(_)));
        assert!(conn.remote_ctx.is_some());

        let reject = Pdu::RejectIndExt(RejectIndExt {
            reject_opcode: u8::from(ControlOpcode::PhyReq),
            error_code: HciError::LL_PROC_COLLISION.0,
        });
        event(&mut conn, &[reject]);
        assert_eq!(
            conn.ntf.pop(),
            Some(Notification::PhyUpdate {
                status: HciError::LL_PROC_COLLISION,
                tx: PhyMask::LE_1M.bits(),
                rx: PhyMask::LE_1M.bits(),
            })
        );

        let target = conn.state.event_counter.raw() + 6;
        let ind = Pdu::PhyUpdateInd(PhyUpdateInd {
            m_to_s_phy: PhyMask::LE_1M.bits(),
            s_to_m_phy: PhyMask::LE_1M.bits(),
            instant: target,
        });
        event(&mut conn, &[ind]);
        while conn.state.event_counter.raw() < target {
            event(&mut conn, &[]);
        }
        assert_eq!(
            conn.ntf.pop(),
            Some(Notification::PhyUpdate {
                status: HciError::SUCCESS,
                tx: PhyMask::LE_1M.bits(),
                rx: PhyMask::LE_1M.bits(),
            })
        );
    }

    #[test]
    fn unsupported_reply_with_no_matching_context_dropped_silently() {
        let mut conn = new_conn(Role::Central);
        let rsp = Pdu::PhyRsp(PhyReq {
            tx_phys: PhyMask::LE_1M.bits(),
            rx_phys: PhyMask::LE_1M.bits(),
        });
        event(&mut conn, &[rsp]);
        assert!(conn.tx.next().is_none());
        assert!(conn.ntf.pop().is_none());
    }

    #[test]
    fn genuinely_unknown_opcode_gets_unknown_rsp() {
        let mut conn = new_conn(Role::Central);
        let unknown_opcode = ControlOpcode::from(0xFFu8);
        reply_unknown(&mut conn, unknown_opcode);
        match decode_tx(&mut conn) {
            Pdu::UnknownRsp(rsp) => assert_eq!(rsp.unknown_type, 0xFF),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn terminate_preempts_and_tears_down() {
        let mut conn = new_conn(Role::Central);
        conn.state.terminate_reason = 0x13;
        event(&mut conn, &[]);
        assert!(matches!(decode_tx(&mut conn), Pdu::TerminateInd(_)));
        event(&mut conn, &[]);
        assert!(conn.state.terminated);
    }

    #[test]
    fn inbound_terminate_ind_aborts_everything() {
        let mut conn = new_conn(Role::Peripheral);
        conn.phy_req_send(PhyMask::LE_1M.bits(), PhyMask::LE_1M.bits());
        event(&mut conn, &[]);
        assert!(matches!(decode_tx(&mut conn), Pdu::PhyReq(_)));

        let term = Pdu::TerminateInd(crate::llcp::pdu::TerminateInd {
            error_code: HciError::REMOTE_USER_TERMINATED_CONNECTION.0,
        });
        event(&mut conn, &[term]);
        assert!(conn.local_ctx.is_none());
        assert!(conn.state.terminated);
        assert_eq!(
            conn.ntf.pop(),
            Some(Notification::Terminate {
                reason: HciError::REMOTE_USER_TERMINATED_CONNECTION.0
            })
        );
    }

    #[test]
    fn full_notification_queue_stalls_and_retries_instead_of_dropping() {
        let mut conn = new_conn(Role::Central);
        conn.phy_req_send(PhyMask::LE_2M.bits(), PhyMask::LE_2M.bits());
        event(&mut conn, &[]);
        assert!(matches!(decode_tx(&mut conn), Pdu::PhyReq(_)));

        let rsp = Pdu::PhyRsp(PhyReq {
            tx_phys: PhyMask::LE_2M.bits(),
            rx_phys: PhyMask::LE_2M.bits(),
        });
        event(&mut conn, &[rsp]);
        let target = match decode_tx(&mut conn) {
            Pdu::PhyUpdateInd(ind) => ind.instant,
            other => panic!("unexpected {:?}", other),
        };

        // Fill the host notification queue so the PHY update's completion can't be delivered
        // the instant the instant is reached.
        let mut filled = 0;
        while conn.ntf.push(Notification::EncRefresh).is_ok() {
            filled += 1;
        }

        while conn.state.event_counter.raw() < target {
            event(&mut conn, &[]);
        }
        // Not dropped: held pending on the local slot, and the context stays alive rather than
        // being released with the notification unsent.
        assert_eq!(
            conn.local_ntf_pending,
            Some(Notification::PhyUpdate {
                status: HciError::SUCCESS,
                tx: PhyMask::LE_2M.bits(),
                rx: PhyMask::LE_2M.bits(),
            })
        );
        assert!(conn.local_ctx.is_some());

        // Free one slot; the next event retries the delivery instead of dropping it.
        assert_eq!(conn.ntf.pop(), Some(Notification::EncRefresh));
        event(&mut conn, &[]);
        assert!(conn.local_ntf_pending.is_none());

        for _ in 1..filled {
            assert_eq!(conn.ntf.pop(), Some(Notification::EncRefresh));
        }
        assert_eq!(
            conn.ntf.pop(),
            Some(Notification::PhyUpdate {
                status: HciError::SUCCESS,
                tx: PhyMask::LE_2M.bits(),
                rx: PhyMask::LE_2M.bits(),
            })
        );
        assert!(conn.ntf.pop().is_none());
    }
}
