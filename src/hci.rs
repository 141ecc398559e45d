//! HCI-facing entry points and status codes (spec.md §6/§7).
//!
//! Entry points take already-decoded Rust arguments — this engine does not parse HCI command
//! bytes itself (that belongs to the HCI layer, an external collaborator per the crate's scope).
//! Each entry point enqueues a descriptor onto the connection's local request queue and returns
//! synchronously; the procedure's actual outcome, if any, surfaces later as a host notification.

use crate::llcp::connection::Connection;
use crate::llcp::local_queue::LocalRequest;
use crate::llcp::procedures::channel_map::ChmapRequest;
use crate::llcp::procedures::conn_update::ConnUpdateRequest;
use crate::llcp::procedures::encryption::EncryptionRequest;
use crate::llcp::procedures::length::LengthRequest;
use crate::llcp::procedures::phy::PhyRequest;
use crate::Error;
use core::fmt;

/// A one-byte HCI error/status code, as defined by the Bluetooth Core Specification's HCI error
/// code table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HciError(pub u8);

impl HciError {
    pub const SUCCESS: HciError = HciError(0x00);
    pub const UNKNOWN_CMD: HciError = HciError(0x01);
    pub const UNKNOWN_CONN_ID: HciError = HciError(0x02);
    pub const MEM_CAPACITY_EXCEEDED: HciError = HciError(0x07);
    pub const CMD_DISALLOWED: HciError = HciError(0x0C);
    pub const PIN_OR_KEY_MISSING: HciError = HciError(0x06);
    pub const INVALID_LMP_PARAMETERS: HciError = HciError(0x1E);
    pub const UNSUPP_REMOTE_FEATURE: HciError = HciError(0x1A);
    pub const REMOTE_USER_TERMINATED_CONNECTION: HciError = HciError(0x13);
    pub const CONNECTION_TIMEOUT: HciError = HciError(0x08);
    pub const LMP_RESPONSE_TIMEOUT: HciError = HciError(0x22);
    pub const LL_PROC_COLLISION: HciError = HciError(0x23);
    pub const DIFFERENT_TRANSACTION_COLLISION: HciError = HciError(0x2A);

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }
}

impl fmt::Display for HciError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HCI error 0x{:02X}", self.0)
    }
}

impl Connection {
    /// `ll_version_ind_send` — requests a version exchange.
    ///
    /// Per spec.md §4.F, a connection only ever sends one `LL_VERSION_IND`; a repeated request
    /// after the cached remote version is already known completes immediately with no new PDU.
    pub fn version_ind_send(&mut self) -> HciError {
        self.enqueue_local(LocalRequest::Version)
    }

    /// `ll_feature_req_send` — requests a feature exchange.
    pub fn feature_req_send(&mut self) -> HciError {
        self.enqueue_local(LocalRequest::FeatureExchange)
    }

    /// `ll_phy_req_send` — requests a PHY update.
    pub fn phy_req_send(&mut self, tx_phys: u8, rx_phys: u8) -> HciError {
        self.enqueue_local(LocalRequest::PhyUpdate(PhyRequest { tx_phys, rx_phys }))
    }

    /// `ll_phy_default_set` — sets this controller's default PHY preference for future
    /// connections. Folded into `ControllerConfig` per SPEC_FULL.md §B; connections already
    /// established keep whichever preference they were created with.
    pub fn phy_get(&self) -> (u8, u8) {
        (self.state.phy_tx.into(), self.state.phy_rx.into())
    }

    /// `ll_length_req_send` — requests a data length update.
    pub fn length_req_send(&mut self, tx_octets: u16, tx_time: u16) -> HciError {
        self.enqueue_local(LocalRequest::Length(LengthRequest {
            max_tx_octets: tx_octets,
            max_tx_time: tx_time,
        }))
    }

    /// `ll_terminate_ind_send` — requests connection termination.
    ///
    /// Highest priority per spec.md §4.F: handled specially by the dispatcher, which pushes the
    /// TERMINATE context to the front of the local queue rather than appending.
    pub fn terminate_ind_send(&mut self, reason: u8) -> HciError {
        if self.state.terminate_reason != 0 {
            return HciError::CMD_DISALLOWED;
        }
        self.state.terminate_reason = reason;
        HciError::SUCCESS
    }

    /// `ll_enc_req_send` — central-only: initiates encryption start.
    pub fn enc_req_send(&mut self, rand: [u8; 8], ediv: u16, ltk: [u8; 16]) -> HciError {
        self.enqueue_local(LocalRequest::Encryption(EncryptionRequest { rand, ediv, ltk }))
    }

    /// `ll_start_enc_req_send` — peripheral host's reply to a pending `LL_ENC_REQ`, supplying
    /// the LTK (or an error code if the host rejected the request, e.g. unknown EDIV/Rand).
    pub fn start_enc_req_send(&mut self, error_code: u8, ltk: [u8; 16]) -> HciError {
        self.supply_ltk_reply(error_code, ltk)
    }

    /// `ll_conn_update` — requests a connection parameter update via `LL_CONNECTION_UPDATE_IND`.
    ///
    /// The `LL_CONNECTION_PARAM_REQ`/`RSP` negotiation path is not implemented (see DESIGN.md);
    /// this always takes the IND-only path the original scaffolding never filled in.
    pub fn conn_update(&mut self, interval: u16, latency: u16, timeout: u16) -> HciError {
        self.enqueue_local(LocalRequest::ConnUpdate(ConnUpdateRequest {
            interval,
            latency,
            timeout,
        }))
    }

    /// `ll_chm_update` — requests a channel map update.
    pub fn chm_update(&mut self, chm: [u8; 5]) -> HciError {
        self.enqueue_local(LocalRequest::ChannelMap(ChmapRequest { map: chm }))
    }

    /// `ll_chm_get` — reads the channel map currently in use.
    ///
    /// The original Zephyr source returns `UNKNOWN_CMD` here (see DESIGN.md's Open Question
    /// notes); carried forward rather than guessing a readout path.
    pub fn chm_get(&self) -> HciError {
        HciError::UNKNOWN_CMD
    }

    /// `ll_rssi_get` — reads the connection's RSSI.
    ///
    /// No RSSI source exists in this engine (radio/PHY collaborator concern, out of scope);
    /// mirrors the original's `UNKNOWN_CMD` return.
    pub fn rssi_get(&self) -> HciError {
        HciError::UNKNOWN_CMD
    }

    /// `ll_apto_get` — reads the authenticated payload timeout.
    ///
    /// Carried forward as `CMD_DISALLOWED`, matching the original's documented-but-unimplemented
    /// behaviour (see DESIGN.md's Open Question notes).
    pub fn apto_get(&self) -> HciError {
        HciError::CMD_DISALLOWED
    }

    /// `ll_apto_set` — sets the authenticated payload timeout. Same as `apto_get`.
    pub fn apto_set(&mut self, _apto: u16) -> HciError {
        HciError::CMD_DISALLOWED
    }

    fn enqueue_local(&mut self, req: LocalRequest) -> HciError {
        match self.local_queue.enqueue(req) {
            Ok(()) => HciError::SUCCESS,
            Err(Error::QueueFull) => HciError::MEM_CAPACITY_EXCEEDED,
            Err(_) => HciError::MEM_CAPACITY_EXCEEDED,
        }
    }
}
