//! Connection Object (spec.md component I) — the per-link aggregate every FSM mutates.
//!
//! `ConnectionState` holds the plain per-link fields (role, event counter, feature/PHY/encryption
//! state…) that every procedure FSM reads and writes; `Connection` wraps it together with the
//! local/remote request tracking, the context pool, and the TX/notification queues, mirroring how
//! the teacher's `rubble::link::Responder` aggregates its collaborators behind one struct rather
//! than passing them around individually.

use crate::channel_map::ChannelMap;
use crate::config::ControllerConfig;
use crate::features::FeatureSet;
use crate::llcp::context_pool::{ContextId, ContextPool};
use crate::llcp::local_queue::LocalQueue;
use crate::llcp::notify::{Notification, NotificationQueue};
use crate::llcp::remote_queue::RemoteSlot;
use crate::llcp::tx_queue::TxQueue;
use crate::time::EventCounter;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    Central,
    Peripheral,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Phy {
    Le1M,
    Le2M,
    LeCoded,
}

impl Phy {
    pub fn as_mask(self) -> crate::llcp::procedures::phy::PhyMask {
        use crate::llcp::procedures::phy::PhyMask;
        match self {
            Phy::Le1M => PhyMask::LE_1M,
            Phy::Le2M => PhyMask::LE_2M,
            Phy::LeCoded => PhyMask::LE_CODED,
        }
    }
}

impl From<Phy> for u8 {
    fn from(phy: Phy) -> u8 {
        phy.as_mask().bits()
    }
}

/// Per-link state shared by every procedure FSM (spec.md §3's "Connection" data model).
pub struct ConnectionState {
    pub handle: u16,
    pub role: Role,
    pub event_counter: EventCounter,

    pub features_local: FeatureSet,
    pub features_peer: FeatureSet,
    pub features_valid: bool,

    pub phy_tx: Phy,
    pub phy_rx: Phy,
    pub phy_pref_tx: crate::llcp::procedures::phy::PhyMask,
    pub phy_pref_rx: crate::llcp::procedures::phy::PhyMask,

    pub enc_tx: bool,
    pub enc_rx: bool,
    /// Stashed reply from `Connection::supply_ltk_reply`, polled by the Encryption Start FSM's
    /// `WaitLtkReply` step (`(error_code, ltk)`; `error_code == 0` means accepted).
    pub ltk_reply: Option<(u8, [u8; 16])>,

    pub max_tx_octets: u16,
    pub max_rx_octets: u16,
    pub max_tx_time: u16,
    pub max_rx_time: u16,

    pub interval: u16,
    pub latency: u16,
    pub supervision_timeout: u16,
    pub channel_map: ChannelMap,

    pub supervision_reload: u16,
    /// Live countdown of connection events remaining for the active procedure to make progress;
    /// reset from `procedure_reload_default` each time a context is promoted (spec.md §4.G step 7).
    pub procedure_reload: u16,
    pub procedure_reload_default: u16,
    pub apto_reload: u16,

    /// 0 means "no termination requested", matching spec.md §3.
    pub terminate_reason: u8,
    pub terminated: bool,

    pub version_peer: Option<(u8, u16, u16)>,
    pub version_sent: bool,
}

impl ConnectionState {
    /// Minimal constructor for FSM unit tests; production connections go through `Connection::new`
    /// which applies `ControllerConfig`'s defaults instead of these conservative placeholders.
    pub fn new(handle: u16, role: Role) -> Self {
        use crate::llcp::procedures::phy::PhyMask;
        Self {
            handle,
            role,
            event_counter: EventCounter::ZERO,
            features_local: FeatureSet::supported(),
            features_peer: FeatureSet::empty(),
            features_valid: false,
            phy_tx: Phy::Le1M,
            phy_rx: Phy::Le1M,
            phy_pref_tx: PhyMask::LE_1M,
            phy_pref_rx: PhyMask::LE_1M,
            enc_tx: false,
            enc_rx: false,
            ltk_reply: None,
            max_tx_octets: 27,
            max_rx_octets: 27,
            max_tx_time: 328,
            max_rx_time: 328,
            interval: 40,
            latency: 0,
            supervision_timeout: 500,
            channel_map: ChannelMap::with_all_channels(),
            supervision_reload: 500,
            procedure_reload: 40,
            procedure_reload_default: 40,
            apto_reload: 3000,
            terminate_reason: 0,
            terminated: false,
            version_peer: None,
            version_sent: false,
        }
    }

    fn from_config(handle: u16, role: Role, config: &ControllerConfig) -> Self {
        let mut state = Self::new(handle, role);
        state.phy_pref_tx = config.phy_pref_tx;
        state.phy_pref_rx = config.phy_pref_rx;
        state.max_tx_octets = config.default_tx_octets;
        state.max_rx_octets = config.default_tx_octets;
        state.max_tx_time = config.default_tx_time;
        state.max_rx_time = config.default_tx_time;
        state.procedure_reload = config.procedure_reload;
        state.procedure_reload_default = config.procedure_reload;
        state.apto_reload = config.apto_reload;
        state
    }
}

/// A full connection: link state plus the local/remote procedure tracking, context pool, and
/// TX/notification queues the dispatcher drives.
pub struct Connection {
    pub state: ConnectionState,
    pub local_queue: LocalQueue,
    pub remote_slot: RemoteSlot,
    pub pool: ContextPool,
    pub local_ctx: Option<ContextId>,
    pub remote_ctx: Option<ContextId>,
    pub tx: TxQueue,
    pub ntf: NotificationQueue,
    /// A notification the local-context FSM already computed but couldn't deliver because
    /// `ntf` was full; retried every event before the local context is stepped again
    /// (spec.md §4.H, §7 — "stall the procedure one event and retry", never dropped).
    pub local_ntf_pending: Option<Notification>,
    /// Same as `local_ntf_pending`, for the remote context.
    pub remote_ntf_pending: Option<Notification>,
    /// Reserved at connect time so `TERMINATE` can always notify the host even if the
    /// notification queue later fills up (spec.md §4.I).
    terminate_ntf_reserved: bool,
    /// Set once the dispatcher's pre-empt check has pushed a `TERMINATE` request to the front of
    /// `local_queue`, so a subsequent event doesn't push a second one while the first is still
    /// queued or running.
    pub terminate_queued: bool,
}

impl Connection {
    pub fn new(handle: u16, role: Role, config: &ControllerConfig) -> Self {
        Self {
            state: ConnectionState::from_config(handle, role, config),
            local_queue: LocalQueue::new(),
            remote_slot: RemoteSlot::new(),
            pool: ContextPool::new(config.proc_ctx_buf_num),
            local_ctx: None,
            remote_ctx: None,
            tx: TxQueue::new(),
            ntf: NotificationQueue::new(),
            local_ntf_pending: None,
            remote_ntf_pending: None,
            terminate_ntf_reserved: true,
            terminate_queued: false,
        }
    }

    /// `ll_start_enc_req_send`'s underlying effect: stashes the host's LTK reply for the
    /// in-progress Encryption Start context to pick up on its next `Tick`.
    pub fn supply_ltk_reply(&mut self, error_code: u8, ltk: [u8; 16]) -> crate::hci::HciError {
        if self.state.ltk_reply.is_some() {
            return crate::hci::HciError::CMD_DISALLOWED;
        }
        self.state.ltk_reply = Some((error_code, ltk));
        crate::hci::HciError::SUCCESS
    }

    /// Emits the reserved terminate notification, consuming the reservation. Used by the
    /// dispatcher's Terminate-completion path; the reservation guarantees this never competes with
    /// the general notification queue for space.
    pub fn notify_terminate_reserved(&mut self, ntf: Notification) {
        self.terminate_ntf_reserved = false;
        let _ = self.ntf.push(ntf);
    }

    pub fn has_terminate_reservation(&self) -> bool {
        self.terminate_ntf_reserved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_connection_applies_config_defaults() {
        let config = ControllerConfig::default();
        let conn = Connection::new(7, Role::Central, &config);
        assert_eq!(conn.state.handle, 7);
        assert_eq!(conn.state.max_tx_octets, config.default_tx_octets);
        assert_eq!(conn.pool.capacity(), config.proc_ctx_buf_num);
        assert!(conn.has_terminate_reservation());
    }

    #[test]
    fn ltk_reply_can_only_be_supplied_once_per_procedure() {
        let config = ControllerConfig::default();
        let mut conn = Connection::new(1, Role::Peripheral, &config);
        assert_eq!(
            conn.supply_ltk_reply(0, [1; 16]),
            crate::hci::HciError::SUCCESS
        );
        assert_eq!(
            conn.supply_ltk_reply(0, [2; 16]),
            crate::hci::HciError::CMD_DISALLOWED
        );
    }
}
