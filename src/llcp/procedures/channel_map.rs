//! Channel Map Update procedure FSM (spec.md §4.F).
//!
//! Same instant-based pattern as PHY/Connection Update: `LL_CHANNEL_MAP_IND` carries the new map
//! and an instant; applied atomically once the event counter reaches it. Central-only per the
//! Bluetooth Core Specification — only a central ever sends `LL_CHANNEL_MAP_IND`.

use super::{AbortReason, Event, StepResult};
use crate::channel_map::ChannelMap;
use crate::llcp::connection::ConnectionState;
use crate::llcp::notify::Notification;
use crate::llcp::pdu::{ChannelMapInd, Pdu};
use crate::time::EventCounter;

/// A locally-requested channel map update, as supplied via `chm_update`.
#[derive(Debug, Copy, Clone)]
pub struct ChmapRequest {
    pub map: [u8; 5],
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Step {
    Idle,
    WaitInstant,
    Done,
}

#[derive(Debug, Copy, Clone)]
pub struct ChannelMapState {
    step: Step,
    map: [u8; 5],
}

impl ChannelMapState {
    pub fn local(req: ChmapRequest) -> Self {
        Self {
            step: Step::Idle,
            map: req.map,
        }
    }

    /// Creates a remote (peripheral-side) context that has already parsed an inbound
    /// `LL_CHANNEL_MAP_IND`.
    pub fn remote(ind: &ChannelMapInd) -> Self {
        Self {
            step: Step::WaitInstant,
            map: ind.map,
        }
    }
}

pub fn run(
    state: &mut ChannelMapState,
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
            StepResult::EmitTx(Pdu::ChannelMapInd(ChannelMapInd {
                map: state.map,
                instant: ec.raw(),
            }))
        }

        (Step::WaitInstant, Event::Tick) | (Step::WaitInstant, Event::InstantReached) => {
            match *instant {
                Some(target) if conn.event_counter.has_reached(target) => {
                    conn.channel_map = ChannelMap::from_raw(state.map);
                    state.step = Step::Done;
                    StepResult::EmitNtf(Notification::ChannelMapChange)
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
    fn local_update_applies_map_at_instant() {
        let mut conn = ConnectionState::new(0, Role::Central);
        conn.event_counter = EventCounter::new(0);
        let mut state = ChannelMapState::local(ChmapRequest {
            map: [0xFF, 0xFF, 0xFF, 0xFF, 0x1F],
        });
        let mut collision = false;
        let mut instant = None;

        let r = run(&mut state, &mut collision, &mut instant, &mut conn, Event::Tick);
        assert!(matches!(r, StepResult::EmitTx(Pdu::ChannelMapInd(_))));
        assert_eq!(instant, Some(EventCounter::new(6)));

        conn.event_counter = EventCounter::new(6);
        let r = run(&mut state, &mut collision, &mut instant, &mut conn, Event::Tick);
        assert!(matches!(r, StepResult::EmitNtf(_)));
        assert_eq!(conn.channel_map.to_raw(), [0xFF, 0xFF, 0xFF, 0xFF, 0x1F]);
    }
}
