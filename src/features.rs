//! The Link-Layer optional feature bitfield exchanged by `LL_FEATURE_REQ`/`LL_FEATURE_RSP`.

use crate::bytes::*;
use crate::Error;
use bitflags::bitflags;

bitflags! {
    /// A set of optional Link Layer features.
    pub struct FeatureSet: u64 {
        /// LE data encryption (`LL_ENC_REQ`/`RSP`, `LL_START_ENC_REQ`/`RSP`, `LL_PAUSE_ENC_REQ`/`RSP`).
        const LE_ENCRYPTION = 1 << 0;

        /// Connection Parameters Request procedure (`LL_CONNECTION_PARAM_REQ`/`RSP`).
        ///
        /// A superset of `EXTENDED_REJECT_INDICATION`, which may also be set alongside this bit.
        const CONN_PARAM_REQ = 1 << 1;

        /// Support for `LL_REJECT_IND_EXT`.
        const EXTENDED_REJECT_INDICATION = 1 << 2;

        /// Peripheral-initiated feature exchange (`LL_SLAVE_FEATURE_REQ`, `LL_FEATURE_RSP`).
        const SLAVE_FEATURE_EXCHANGE = 1 << 3;

        /// LE Link-Layer ping (`LL_PING_REQ`/`RSP`, authenticated payload timeout).
        const LE_PING = 1 << 4;

        /// Data channel PDU length update (`LL_LENGTH_REQ`/`RSP`).
        const LE_PACKET_LENGTH_EXTENSION = 1 << 5;

        /// LL Privacy (untrackable randomized device addresses).
        const LL_PRIVACY = 1 << 6;

        /// Extended scanner filter policies.
        const EXT_SCANNER_FILTER_POLICIES = 1 << 7;
    }
}

impl FeatureSet {
    /// The feature set this engine supports locally.
    ///
    /// Encryption and length update are implemented by the procedure FSMs, so they're advertised;
    /// privacy and extended scanner filtering are radio/PHY or GAP concerns out of this engine's
    /// scope and are left unset.
    pub fn supported() -> Self {
        FeatureSet::LE_ENCRYPTION | FeatureSet::LE_PACKET_LENGTH_EXTENSION
    }
}

impl ToBytes for FeatureSet {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u64_le(self.bits())
    }
}

impl<'a> FromBytes<'a> for FeatureSet {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        let raw = bytes.read_u64_le()?;
        Ok(Self::from_bits_truncate(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let mut buf = [0u8; 8];
        let set = FeatureSet::LE_ENCRYPTION | FeatureSet::LE_PING;
        set.to_bytes(&mut ByteWriter::new(&mut buf)).unwrap();
        let parsed = FeatureSet::from_bytes(&mut ByteReader::new(&buf)).unwrap();
        assert_eq!(set, parsed);
    }

    #[test]
    fn unknown_bits_truncated() {
        let raw: u64 = 1 << 62;
        let parsed = FeatureSet::from_bytes(&mut ByteReader::new(&raw.to_le_bytes())).unwrap();
        assert!(parsed.is_empty());
    }
}
