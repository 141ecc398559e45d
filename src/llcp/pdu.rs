//! LL control PDU wire codec (spec.md component A).
//!
//! Each LL control PDU is a 1-byte opcode followed by a fixed-layout, little-endian payload.
//! Mirrors the teacher's `rubble::link::llcp` shape (`RawPdu`/opcode enum/`#[repr(C, packed)]`
//! payload structs decoded via `zerocopy`), generalized to the opcode table this engine needs.

use crate::bytes::{ByteReader, ByteWriter, FromBytes, ToBytes};
use crate::channel_map::ChannelMap;
use crate::features::FeatureSet;
use crate::time::Duration;
use crate::Error;
use zerocopy::{AsBytes, FromBytes as ZFromBytes, Unaligned};

enum_with_unknown! {
    /// All LL control opcodes named in the wire table.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum ControlOpcode(u8) {
        ConnectionUpdateInd = 0x00,
        ChannelMapInd = 0x01,
        TerminateInd = 0x02,
        EncReq = 0x03,
        EncRsp = 0x04,
        StartEncReq = 0x05,
        StartEncRsp = 0x06,
        UnknownRsp = 0x07,
        FeatureReq = 0x08,
        FeatureRsp = 0x09,
        PauseEncReq = 0x0A,
        PauseEncRsp = 0x0B,
        VersionInd = 0x0C,
        RejectInd = 0x0D,
        SlaveFeatureReq = 0x0E,
        ConnectionParamReq = 0x0F,
        ConnectionParamRsp = 0x10,
        RejectIndExt = 0x11,
        LengthReq = 0x14,
        LengthRsp = 0x15,
        PhyReq = 0x16,
        PhyRsp = 0x17,
        PhyUpdateInd = 0x18,
    }
}

macro_rules! payload {
    ($(#[$attr:meta])* $name:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        $(#[$attr])*
        #[derive(Debug, Copy, Clone, ZFromBytes, AsBytes, Unaligned)]
        #[repr(C, packed)]
        pub struct $name {
            $(pub $field: $ty,)*
        }
    };
}

payload!(
    /// `LL_CONNECTION_UPDATE_IND`.
    ConnectionUpdateInd {
        win_size: u8,
        win_offset: u16,
        interval: u16,
        latency: u16,
        timeout: u16,
        instant: u16,
    }
);

impl ConnectionUpdateInd {
    pub fn interval(&self) -> Duration {
        Duration::from_micros(u32::from(self.interval) * 1_250)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_micros(u32::from(self.timeout) * 10_000)
    }
}

payload!(
    /// `LL_CHANNEL_MAP_IND`.
    ChannelMapInd {
        map: [u8; 5],
        instant: u16,
    }
);

impl ChannelMapInd {
    pub fn channel_map(&self) -> ChannelMap {
        ChannelMap::from_raw(self.map)
    }
}

payload!(
    /// `LL_TERMINATE_IND`.
    TerminateInd {
        error_code: u8,
    }
);

payload!(
    /// `LL_ENC_REQ`.
    EncReq {
        rand: [u8; 8],
        ediv: u16,
        skd_m: [u8; 8],
        iv_m: [u8; 4],
    }
);

payload!(
    /// `LL_ENC_RSP`.
    EncRsp {
        skd_s: [u8; 8],
        iv_s: [u8; 4],
    }
);

payload!(
    /// `LL_START_ENC_REQ`.
    StartEncReq {}
);

payload!(
    /// `LL_START_ENC_RSP`.
    StartEncRsp {}
);

payload!(
    /// `LL_UNKNOWN_RSP`.
    UnknownRsp {
        unknown_type: u8,
    }
);

impl UnknownRsp {
    pub fn new(opcode: ControlOpcode) -> Self {
        Self {
            unknown_type: opcode.into(),
        }
    }
}

payload!(
    /// `LL_FEATURE_REQ`.
    FeatureReq {
        features: u64,
    }
);

impl FeatureReq {
    pub fn new(features: FeatureSet) -> Self {
        Self {
            features: features.bits(),
        }
    }

    pub fn feature_set(&self) -> FeatureSet {
        FeatureSet::from_bits_truncate(self.features)
    }
}

payload!(
    /// `LL_FEATURE_RSP`.
    FeatureRsp {
        features: u64,
    }
);

impl FeatureRsp {
    pub fn new(features: FeatureSet) -> Self {
        Self {
            features: features.bits(),
        }
    }

    pub fn feature_set(&self) -> FeatureSet {
        FeatureSet::from_bits_truncate(self.features)
    }
}

payload!(
    /// `LL_PAUSE_ENC_REQ`.
    PauseEncReq {}
);

payload!(
    /// `LL_PAUSE_ENC_RSP`.
    PauseEncRsp {}
);

payload!(
    /// `LL_VERSION_IND`.
    VersionInd {
        version: u8,
        company: u16,
        subversion: u16,
    }
);

impl VersionInd {
    pub fn new(version: u8, company: u16, subversion: u16) -> Self {
        Self {
            version,
            company,
            subversion,
        }
    }
}

payload!(
    /// `LL_REJECT_IND`.
    RejectInd {
        error_code: u8,
    }
);

payload!(
    /// `LL_SLAVE_FEATURE_REQ`.
    SlaveFeatureReq {
        features: u64,
    }
);

impl SlaveFeatureReq {
    pub fn new(features: FeatureSet) -> Self {
        Self {
            features: features.bits(),
        }
    }

    pub fn feature_set(&self) -> FeatureSet {
        FeatureSet::from_bits_truncate(self.features)
    }
}

payload!(
    /// `LL_CONNECTION_PARAM_REQ`. Carried for wire completeness; no FSM in this engine drives the
    /// `LL_CONNECTION_PARAM_REQ`/`RSP` negotiation path (see DESIGN.md's Open Question notes).
    ConnectionParamReq {
        interval_min: u16,
        interval_max: u16,
        latency: u16,
        timeout: u16,
        preferred_periodicity: u8,
        reference_conn_event_count: u16,
        offsets: [u16; 6],
    }
);

/// `LL_CONNECTION_PARAM_RSP` shares `LL_CONNECTION_PARAM_REQ`'s layout.
pub type ConnectionParamRsp = ConnectionParamReq;

payload!(
    /// `LL_REJECT_EXT_IND`.
    RejectIndExt {
        reject_opcode: u8,
        error_code: u8,
    }
);

payload!(
    /// `LL_LENGTH_REQ`.
    LengthReq {
        max_rx_octets: u16,
        max_rx_time: u16,
        max_tx_octets: u16,
        max_tx_time: u16,
    }
);

/// `LL_LENGTH_RSP` shares `LL_LENGTH_REQ`'s layout.
pub type LengthRsp = LengthReq;

payload!(
    /// `LL_PHY_REQ`.
    PhyReq {
        tx_phys: u8,
        rx_phys: u8,
    }
);

/// `LL_PHY_RSP` shares `LL_PHY_REQ`'s layout.
pub type PhyRsp = PhyReq;

payload!(
    /// `LL_PHY_UPDATE_IND`.
    PhyUpdateInd {
        m_to_s_phy: u8,
        s_to_m_phy: u8,
        instant: u16,
    }
);

/// A structured LL control PDU, decoded from or ready to be encoded to the wire.
#[derive(Debug, Copy, Clone)]
pub enum Pdu {
    ConnectionUpdateInd(ConnectionUpdateInd),
    ChannelMapInd(ChannelMapInd),
    TerminateInd(TerminateInd),
    EncReq(EncReq),
    EncRsp(EncRsp),
    StartEncReq(StartEncReq),
    StartEncRsp(StartEncRsp),
    UnknownRsp(UnknownRsp),
    FeatureReq(FeatureReq),
    FeatureRsp(FeatureRsp),
    PauseEncReq(PauseEncReq),
    PauseEncRsp(PauseEncRsp),
    VersionInd(VersionInd),
    RejectInd(RejectInd),
    SlaveFeatureReq(SlaveFeatureReq),
    ConnectionParamReq(ConnectionParamReq),
    ConnectionParamRsp(ConnectionParamRsp),
    RejectIndExt(RejectIndExt),
    LengthReq(LengthReq),
    LengthRsp(LengthRsp),
    PhyReq(PhyReq),
    PhyRsp(PhyRsp),
    PhyUpdateInd(PhyUpdateInd),
}

impl Pdu {
    pub fn opcode(&self) -> ControlOpcode {
        match self {
            Pdu::ConnectionUpdateInd(_) => ControlOpcode::ConnectionUpdateInd,
            Pdu::ChannelMapInd(_) => ControlOpcode::ChannelMapInd,
            Pdu::TerminateInd(_) => ControlOpcode::TerminateInd,
            Pdu::EncReq(_) => ControlOpcode::EncReq,
            Pdu::EncRsp(_) => ControlOpcode::EncRsp,
            Pdu::StartEncReq(_) => ControlOpcode::StartEncReq,
            Pdu::StartEncRsp(_) => ControlOpcode::StartEncRsp,
            Pdu::UnknownRsp(_) => ControlOpcode::UnknownRsp,
            Pdu::FeatureReq(_) => ControlOpcode::FeatureReq,
            Pdu::FeatureRsp(_) => ControlOpcode::FeatureRsp,
            Pdu::PauseEncReq(_) => ControlOpcode::PauseEncReq,
            Pdu::PauseEncRsp(_) => ControlOpcode::PauseEncRsp,
            Pdu::VersionInd(_) => ControlOpcode::VersionInd,
            Pdu::RejectInd(_) => ControlOpcode::RejectInd,
            Pdu::SlaveFeatureReq(_) => ControlOpcode::SlaveFeatureReq,
            Pdu::ConnectionParamReq(_) => ControlOpcode::ConnectionParamReq,
            Pdu::ConnectionParamRsp(_) => ControlOpcode::ConnectionParamRsp,
            Pdu::RejectIndExt(_) => ControlOpcode::RejectIndExt,
            Pdu::LengthReq(_) => ControlOpcode::LengthReq,
            Pdu::LengthRsp(_) => ControlOpcode::LengthRsp,
            Pdu::PhyReq(_) => ControlOpcode::PhyReq,
            Pdu::PhyRsp(_) => ControlOpcode::PhyRsp,
            Pdu::PhyUpdateInd(_) => ControlOpcode::PhyUpdateInd,
        }
    }

    fn payload_bytes(&self) -> &[u8] {
        match self {
            Pdu::ConnectionUpdateInd(p) => p.as_bytes(),
            Pdu::ChannelMapInd(p) => p.as_bytes(),
            Pdu::TerminateInd(p) => p.as_bytes(),
            Pdu::EncReq(p) => p.as_bytes(),
            Pdu::EncRsp(p) => p.as_bytes(),
            Pdu::StartEncReq(p) => p.as_bytes(),
            Pdu::StartEncRsp(p) => p.as_bytes(),
            Pdu::UnknownRsp(p) => p.as_bytes(),
            Pdu::FeatureReq(p) => p.as_bytes(),
            Pdu::FeatureRsp(p) => p.as_bytes(),
            Pdu::PauseEncReq(p) => p.as_bytes(),
            Pdu::PauseEncRsp(p) => p.as_bytes(),
            Pdu::VersionInd(p) => p.as_bytes(),
            Pdu::RejectInd(p) => p.as_bytes(),
            Pdu::SlaveFeatureReq(p) => p.as_bytes(),
            Pdu::ConnectionParamReq(p) => p.as_bytes(),
            Pdu::ConnectionParamRsp(p) => p.as_bytes(),
            Pdu::RejectIndExt(p) => p.as_bytes(),
            Pdu::LengthReq(p) => p.as_bytes(),
            Pdu::LengthRsp(p) => p.as_bytes(),
            Pdu::PhyReq(p) => p.as_bytes(),
            Pdu::PhyRsp(p) => p.as_bytes(),
            Pdu::PhyUpdateInd(p) => p.as_bytes(),
        }
    }

    /// Encodes `self` as `opcode || payload` into `out_buf`, returning the number of bytes
    /// written.
    pub fn encode(&self, out_buf: &mut [u8]) -> Result<usize, Error> {
        let mut writer = ByteWriter::new(out_buf);
        writer.write_u8(self.opcode().into())?;
        writer.write_slice(self.payload_bytes())?;
        let written = out_buf.len() - writer.space_left();
        Ok(written)
    }

    /// Decodes a PDU from `buf`.
    ///
    /// An opcode this engine doesn't recognize returns `Error::InvalidValue` — callers that need
    /// to reply with `LL_UNKNOWN_RSP{opcode}` instead of treating it as a malformed PDU should
    /// call `Pdu::peek_opcode` first and check for `ControlOpcode::Unknown` before decoding.
    pub fn decode(buf: &[u8]) -> Result<Pdu, Error> {
        let (opcode_byte, payload) = buf.split_first().ok_or(Error::InvalidLength)?;
        let opcode = ControlOpcode::from(*opcode_byte);
        let mut reader = ByteReader::new(payload);
        let pdu = match opcode {
            ControlOpcode::ConnectionUpdateInd => {
                Pdu::ConnectionUpdateInd(*reader.read_obj()?)
            }
            ControlOpcode::ChannelMapInd => Pdu::ChannelMapInd(*reader.read_obj()?),
            ControlOpcode::TerminateInd => Pdu::TerminateInd(*reader.read_obj()?),
            ControlOpcode::EncReq => Pdu::EncReq(*reader.read_obj()?),
            ControlOpcode::EncRsp => Pdu::EncRsp(*reader.read_obj()?),
            ControlOpcode::StartEncReq => Pdu::StartEncReq(*reader.read_obj()?),
            ControlOpcode::StartEncRsp => Pdu::StartEncRsp(*reader.read_obj()?),
            ControlOpcode::UnknownRsp => Pdu::UnknownRsp(*reader.read_obj()?),
            ControlOpcode::FeatureReq => Pdu::FeatureReq(*reader.read_obj()?),
            ControlOpcode::FeatureRsp => Pdu::FeatureRsp(*reader.read_obj()?),
            ControlOpcode::PauseEncReq => Pdu::PauseEncReq(*reader.read_obj()?),
            ControlOpcode::PauseEncRsp => Pdu::PauseEncRsp(*reader.read_obj()?),
            ControlOpcode::VersionInd => Pdu::VersionInd(*reader.read_obj()?),
            ControlOpcode::RejectInd => Pdu::RejectInd(*reader.read_obj()?),
            ControlOpcode::SlaveFeatureReq => Pdu::SlaveFeatureReq(*reader.read_obj()?),
            ControlOpcode::ConnectionParamReq => Pdu::ConnectionParamReq(*reader.read_obj()?),
            ControlOpcode::ConnectionParamRsp => Pdu::ConnectionParamRsp(*reader.read_obj()?),
            ControlOpcode::RejectIndExt => Pdu::RejectIndExt(*reader.read_obj()?),
            ControlOpcode::LengthReq => Pdu::LengthReq(*reader.read_obj()?),
            ControlOpcode::LengthRsp => Pdu::LengthRsp(*reader.read_obj()?),
            ControlOpcode::PhyReq => Pdu::PhyReq(*reader.read_obj()?),
            ControlOpcode::PhyRsp => Pdu::PhyRsp(*reader.read_obj()?),
            ControlOpcode::PhyUpdateInd => Pdu::PhyUpdateInd(*reader.read_obj()?),
            ControlOpcode::Unknown(_) => return Err(Error::InvalidValue),
        };
        if !reader.is_empty() {
            return Err(Error::IncompleteParse);
        }
        Ok(pdu)
    }

    /// Peeks at the raw opcode byte of an encoded PDU without fully decoding it.
    ///
    /// Used by the dispatcher to route an unsupported opcode to `LL_UNKNOWN_RSP` without treating
    /// it as a malformed-PDU error.
    pub fn peek_opcode(buf: &[u8]) -> Result<ControlOpcode, Error> {
        buf.first()
            .map(|b| ControlOpcode::from(*b))
            .ok_or(Error::InvalidLength)
    }
}
