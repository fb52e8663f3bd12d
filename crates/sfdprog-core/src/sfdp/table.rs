//! Basic Flash Parameter Table storage
//!
//! The table is kept exactly as the device sent it. Fields are pulled out
//! through accessors named after the JESD216 layout; nothing here
//! interprets or validates values, that is the decoder's job.

use super::types::{BASIC_TABLE_MAX_DWORDS, BASIC_TABLE_MIN_DWORDS};

/// Raw basic parameter table plus named bit-field accessors
#[derive(Clone, PartialEq, Eq)]
pub struct BasicParameterTable {
    bytes: [u8; BASIC_TABLE_MAX_DWORDS * 4],
    dwords: usize,
}

impl BasicParameterTable {
    /// Wrap raw table bytes
    ///
    /// At most [`BASIC_TABLE_MAX_DWORDS`] DWORDs are kept; a trailing
    /// partial DWORD is ignored. Returns `None` if fewer than
    /// [`BASIC_TABLE_MIN_DWORDS`] complete DWORDs are present.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let dwords = (data.len() / 4).min(BASIC_TABLE_MAX_DWORDS);
        if dwords < BASIC_TABLE_MIN_DWORDS {
            return None;
        }
        let mut bytes = [0u8; BASIC_TABLE_MAX_DWORDS * 4];
        bytes[..dwords * 4].copy_from_slice(&data[..dwords * 4]);
        Some(Self { bytes, dwords })
    }

    /// Number of DWORDs held
    pub fn len_dwords(&self) -> usize {
        self.dwords
    }

    /// Raw bytes held
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.dwords * 4]
    }

    /// DWORD `n` (1-based, as JESD216 numbers them), if present
    pub fn dword(&self, n: usize) -> Option<u32> {
        if n == 0 || n > self.dwords {
            return None;
        }
        let off = (n - 1) * 4;
        Some(u32::from_le_bytes([
            self.bytes[off],
            self.bytes[off + 1],
            self.bytes[off + 2],
            self.bytes[off + 3],
        ]))
    }

    // Mandatory DWORDs 1..=9 always exist once constructed.
    fn required(&self, n: usize) -> u32 {
        self.dword(n).unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // DWORD 1
    // ------------------------------------------------------------------

    /// Bits [1:0]: 4 KiB erase support (01 supported, 11 not supported)
    pub fn erase_4k_support(&self) -> u8 {
        (self.required(1) & 0x03) as u8
    }

    /// Bit 2: write granularity (1 = 64 bytes or more)
    pub fn write_granularity_bit(&self) -> bool {
        self.required(1) & (1 << 2) != 0
    }

    /// Bit 3: block protect bits in the status register are volatile
    pub fn volatile_status_register(&self) -> bool {
        self.required(1) & (1 << 3) != 0
    }

    /// Bit 4: volatile status write enable (0 = 0x50, 1 = 0x06)
    pub fn volatile_wren_select(&self) -> bool {
        self.required(1) & (1 << 4) != 0
    }

    /// Bits [15:8]: 4 KiB erase opcode
    pub fn erase_4k_opcode(&self) -> u8 {
        (self.required(1) >> 8) as u8
    }

    /// Bit 16: 1-1-2 fast read supported
    pub fn supports_112(&self) -> bool {
        self.required(1) & (1 << 16) != 0
    }

    /// Bits [18:17]: address bytes
    pub fn address_bytes(&self) -> u8 {
        ((self.required(1) >> 17) & 0x03) as u8
    }

    /// Bit 19: DTR clocking supported
    pub fn supports_dtr(&self) -> bool {
        self.required(1) & (1 << 19) != 0
    }

    /// Bit 20: 1-2-2 fast read supported
    pub fn supports_122(&self) -> bool {
        self.required(1) & (1 << 20) != 0
    }

    /// Bit 21: 1-4-4 fast read supported
    pub fn supports_144(&self) -> bool {
        self.required(1) & (1 << 21) != 0
    }

    /// Bit 22: 1-1-4 fast read supported
    pub fn supports_114(&self) -> bool {
        self.required(1) & (1 << 22) != 0
    }

    // ------------------------------------------------------------------
    // DWORD 2
    // ------------------------------------------------------------------

    /// Raw density field
    pub fn density(&self) -> u32 {
        self.required(2)
    }

    // ------------------------------------------------------------------
    // DWORDs 3..=7: fast read parameters
    // ------------------------------------------------------------------

    /// DWORD 3: 1-1-4 (high half) and 1-4-4 (low half) parameters
    pub fn quad_read_params(&self) -> u32 {
        self.required(3)
    }

    /// DWORD 4: 1-2-2 (high half) and 1-1-2 (low half) parameters
    pub fn dual_read_params(&self) -> u32 {
        self.required(4)
    }

    /// DWORD 5 bit 0: 2-2-2 fast read supported
    pub fn supports_222(&self) -> bool {
        self.required(5) & (1 << 0) != 0
    }

    /// DWORD 5 bit 4: 4-4-4 fast read supported
    pub fn supports_444(&self) -> bool {
        self.required(5) & (1 << 4) != 0
    }

    /// DWORD 6: 2-2-2 parameters in the high half
    pub fn read_222_params(&self) -> u32 {
        self.required(6)
    }

    /// DWORD 7: 4-4-4 parameters in the high half
    pub fn read_444_params(&self) -> u32 {
        self.required(7)
    }

    // ------------------------------------------------------------------
    // DWORDs 8/9: erase types
    // ------------------------------------------------------------------

    /// Erase type slot `i` (0..4): (size exponent, opcode)
    pub fn erase_type(&self, i: usize) -> (u8, u8) {
        let off = 28 + 2 * (i & 0x03);
        (self.bytes[off], self.bytes[off + 1])
    }

    // ------------------------------------------------------------------
    // DWORD 10: erase times (JESD216A)
    // ------------------------------------------------------------------

    /// Bits [3:0]: typical-to-maximum erase time multiplier
    pub fn erase_time_multiplier(&self) -> Option<u8> {
        self.dword(10).map(|d| (d & 0x0F) as u8)
    }

    /// 7-bit typical erase time field of erase type slot `i`
    pub fn erase_time(&self, i: usize) -> Option<u8> {
        self.dword(10)
            .map(|d| ((d >> (4 + 7 * (i & 0x03) as u32)) & 0x7F) as u8)
    }

    // ------------------------------------------------------------------
    // DWORD 11: page size and program/chip erase times (JESD216A)
    // ------------------------------------------------------------------

    /// Bits [3:0]: typical-to-maximum program time multiplier
    pub fn program_time_multiplier(&self) -> Option<u8> {
        self.dword(11).map(|d| (d & 0x0F) as u8)
    }

    /// Bits [7:4]: page size exponent
    pub fn page_size_exponent(&self) -> Option<u8> {
        self.dword(11).map(|d| ((d >> 4) & 0x0F) as u8)
    }

    /// Bits [13:8]: typical page program time field
    pub fn page_program_time(&self) -> Option<u8> {
        self.dword(11).map(|d| ((d >> 8) & 0x3F) as u8)
    }

    /// Bits [30:24]: typical chip erase time field
    pub fn chip_erase_time(&self) -> Option<u8> {
        self.dword(11).map(|d| ((d >> 24) & 0x7F) as u8)
    }
}

impl core::fmt::Debug for BasicParameterTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut list = f.debug_list();
        for n in 1..=self.dwords {
            list.entry(&format_args!("{:08X}", self.required(n)));
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(dwords: &[u32]) -> BasicParameterTable {
        let mut bytes = [0u8; BASIC_TABLE_MAX_DWORDS * 4];
        for (i, d) in dwords.iter().enumerate() {
            bytes[i * 4..i * 4 + 4].copy_from_slice(&d.to_le_bytes());
        }
        BasicParameterTable::from_bytes(&bytes[..dwords.len() * 4]).unwrap()
    }

    #[test]
    fn test_too_short() {
        assert!(BasicParameterTable::from_bytes(&[0u8; 35]).is_none());
        assert!(BasicParameterTable::from_bytes(&[0u8; 36]).is_some());
    }

    #[test]
    fn test_keeps_at_most_twenty_dwords() {
        let t = BasicParameterTable::from_bytes(&[0u8; 128]).unwrap();
        assert_eq!(t.len_dwords(), 20);
        assert_eq!(t.dword(21), None);
        assert_eq!(t.dword(0), None);
    }

    #[test]
    fn test_dword1_fields() {
        // MX25L6436E DWORD 1
        let t = table(&[0xFFC9_20E5, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(t.erase_4k_support(), 0b01);
        assert_eq!(t.erase_4k_opcode(), 0x20);
        assert!(t.write_granularity_bit());
        assert!(!t.volatile_status_register());
        assert!(!t.volatile_wren_select());
        assert_eq!(t.address_bytes(), 0);
        assert!(t.supports_112());
        assert!(!t.supports_dtr());
    }

    #[test]
    fn test_erase_slots() {
        let t = table(&[0, 0, 0, 0, 0, 0, 0, 0x520F_200C, 0xD812_D810]);
        assert_eq!(t.erase_type(0), (0x0C, 0x20));
        assert_eq!(t.erase_type(1), (0x0F, 0x52));
        assert_eq!(t.erase_type(2), (0x10, 0xD8));
        assert_eq!(t.erase_type(3), (0x12, 0xD8));
    }

    #[test]
    fn test_optional_dwords_absent() {
        let t = table(&[0; 9]);
        assert_eq!(t.page_size_exponent(), None);
        assert_eq!(t.erase_time(0), None);
        assert_eq!(t.chip_erase_time(), None);
    }

    #[test]
    fn test_dword10_11_fields() {
        let mut d = [0u32; 11];
        // multiplier 2; erase type 1: count 5, unit 1 ms; type 2: count 3, unit 16 ms
        d[9] = 0x2 | (0x05 << 4) | ((0x20 | 0x03) << 11);
        // multiplier 1; page 2^8; PP count 9 unit 64us; chip erase count 4 unit 4 s
        d[10] = 0x1 | (0x8 << 4) | ((0x20 | 0x09) << 8) | ((0x40 | 0x04) << 24);
        let t = table(&d);

        assert_eq!(t.erase_time_multiplier(), Some(2));
        assert_eq!(t.erase_time(0), Some(0x05));
        assert_eq!(t.erase_time(1), Some(0x23));
        assert_eq!(t.program_time_multiplier(), Some(1));
        assert_eq!(t.page_size_exponent(), Some(8));
        assert_eq!(t.page_program_time(), Some(0x29));
        assert_eq!(t.chip_erase_time(), Some(0x44));
    }
}
