//! Controller-wide configuration, owned by the embedder and handed to connections.
//!
//! Generalizes the teacher's `Config` trait (`rubble::config::Config`), which plays the same role
//! of being the single point through which embedder-supplied policy enters the stack — except the
//! policy here is LLCP defaults (PHY preference, data length, timeout reloads) rather than packet
//! queue/radio types, so a plain struct fits better than a trait with associated types.

use crate::llcp::procedures::phy::PhyMask;

/// Policy and defaults applied to every connection created by the controller.
///
/// Replaces the module-level mutable globals (default PHY/length settings) the design notes call
/// out — one `ControllerConfig` is constructed by the embedder and passed by reference into
/// `Connection::new`; nothing here is a `static`.
#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    /// Default preferred TX PHYs for new connections (`ll_phy_default_set`'s target).
    pub phy_pref_tx: PhyMask,

    /// Default preferred RX PHYs for new connections.
    pub phy_pref_rx: PhyMask,

    /// Default `max_tx_octets` (27..=251) for new connections, before any `LL_LENGTH_REQ`.
    pub default_tx_octets: u16,

    /// Default `max_tx_time` in microseconds, before any `LL_LENGTH_REQ`.
    pub default_tx_time: u16,

    /// Number of connection events a procedure may wait for a peer response before the
    /// connection is torn down with `LMP_RESPONSE_TIMEOUT` (`connProcedureReloadTimeout`).
    pub procedure_reload: u16,

    /// Number of connection events of silence tolerated before the authenticated payload timeout
    /// fires (`connAuthPayloadTimeout`, in event counts rather than ms for simplicity).
    pub apto_reload: u16,

    /// Capacity of the procedure context pool (`PROC_CTX_BUF_NUM`).
    pub proc_ctx_buf_num: usize,
}

impl ControllerConfig {
    /// Conservative defaults: 1M PHY only, minimum data length, a procedure timeout of 40
    /// connection events (matches the Bluetooth Core Spec's `connSupervisionTimeout` minimum
    /// order of magnitude), and a context pool sized for one local and one remote procedure plus
    /// headroom for a pending TERMINATE.
    pub const fn default() -> Self {
        Self {
            phy_pref_tx: PhyMask::LE_1M,
            phy_pref_rx: PhyMask::LE_1M,
            default_tx_octets: 27,
            default_tx_time: 328,
            procedure_reload: 40,
            apto_reload: 3000,
            proc_ctx_buf_num: 8,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::default()
    }
}
