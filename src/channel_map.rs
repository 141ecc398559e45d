//! The BLE data channel map (`ChM`), as carried by `LL_CHANNEL_MAP_IND` and `CONNECT_REQ`.
//!
//! Channel hopping and RF channel selection are the radio/PHY scheduler's job (out of scope per
//! the engine's external-collaborator boundary); this module only knows the wire representation
//! and which channels a map marks as used, which is all the channel-map-update procedure needs.

use core::fmt;

/// A map marking data channels (0..=36) as used or unused.
///
/// A channel map must mark at least 2 channels as used to be valid.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ChannelMap {
    raw: [u8; 5],
    num_used_channels: u8,
}

impl ChannelMap {
    /// Creates a channel map from the raw 5-byte format used on the wire.
    ///
    /// The first byte (LSB) contains flags for data channels 0 to 7, where the least significant
    /// bit is the flag for channel 0, and so on. The 3 most significant bits of the last byte are
    /// reserved for future use and are cleared by this function.
    pub fn from_raw(mut raw: [u8; 5]) -> Self {
        raw[4] &= 0b11111;
        Self {
            raw,
            num_used_channels: raw.iter().map(|b| b.count_ones() as u8).sum(),
        }
    }

    /// Returns the raw bytes encoding this channel map.
    pub fn to_raw(&self) -> [u8; 5] {
        self.raw
    }

    /// Creates a channel map that marks all 37 data channels as used.
    pub fn with_all_channels() -> Self {
        Self {
            raw: [0xff, 0xff, 0xff, 0xff, 0b11111],
            num_used_channels: 37,
        }
    }

    /// Returns the number of data channels marked as used by this map.
    pub fn num_used_channels(&self) -> u8 {
        self.num_used_channels
    }

    /// Returns whether the map marks at least 2 channels as used, per the Bluetooth spec's
    /// minimum.
    pub fn is_valid(&self) -> bool {
        self.num_used_channels >= 2
    }

    /// Returns whether the given data channel index (0..=36) is marked as used.
    pub fn is_used(&self, channel_index: u8) -> bool {
        let byte = self.raw[channel_index as usize / 8];
        let bitnum = channel_index % 8;
        byte & (1 << bitnum) != 0
    }
}

impl fmt::Debug for ChannelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelMap({:?})", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_channel() {
        let map = ChannelMap::from_raw([0x01, 0, 0, 0, 0]);
        assert_eq!(map.num_used_channels(), 1);
        assert!(!map.is_valid());
        assert!(map.is_used(0));
        assert!(!map.is_used(1));
        assert!(!map.is_used(8));
        assert!(!map.is_used(36));
    }

    #[test]
    fn from_raw_clears_rfu_bits() {
        let map = ChannelMap::from_raw([0xff; 5]);
        assert_eq!(map.num_used_channels(), 37);
        assert_eq!(map, ChannelMap::with_all_channels());
    }

    #[test]
    fn all_channels_valid_and_used() {
        let map = ChannelMap::with_all_channels();
        assert!(map.is_valid());
        for ch in 0..=36 {
            assert!(map.is_used(ch));
        }
    }
}
