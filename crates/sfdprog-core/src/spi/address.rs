//! Address phase width

/// Width of the address phase of a command
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AddressWidth {
    /// No address phase
    #[default]
    None,
    /// 24-bit address, reaches 16 MiB
    ThreeByte,
    /// 32-bit address
    FourByte,
}

impl AddressWidth {
    /// Number of address bytes on the wire
    pub const fn bytes(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::ThreeByte => 3,
            Self::FourByte => 4,
        }
    }

    /// Number of address bits (0, 24 or 32)
    pub const fn bits(&self) -> u8 {
        self.bytes() * 8
    }

    /// Returns true if `address + len` stays inside the reachable space
    pub const fn covers(&self, address: u32, len: usize) -> bool {
        let end = address as u64 + len as u64;
        match self {
            Self::None => false,
            Self::ThreeByte => end <= 1 << 24,
            Self::FourByte => end <= 1 << 32,
        }
    }

    /// Encode an address big-endian into the first `bytes()` of `buf`
    pub fn encode(&self, address: u32, buf: &mut [u8]) {
        let be = address.to_be_bytes();
        match self {
            Self::None => {}
            Self::ThreeByte => buf[..3].copy_from_slice(&be[1..]),
            Self::FourByte => buf[..4].copy_from_slice(&be),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_big_endian() {
        let mut buf = [0u8; 4];
        AddressWidth::ThreeByte.encode(0x0012_3456, &mut buf);
        assert_eq!(&buf[..3], &[0x12, 0x34, 0x56]);

        AddressWidth::FourByte.encode(0x8012_3456, &mut buf);
        assert_eq!(buf, [0x80, 0x12, 0x34, 0x56]);
    }

    #[test]
    fn test_covers() {
        assert!(AddressWidth::ThreeByte.covers(0x00FF_FF00, 0x100));
        assert!(!AddressWidth::ThreeByte.covers(0x00FF_FF00, 0x101));
        assert!(!AddressWidth::ThreeByte.covers(0x0100_0000, 0));
        assert!(AddressWidth::FourByte.covers(0xFFFF_FF00, 0x100));
        assert!(!AddressWidth::None.covers(0, 0));
    }
}
