//! Error types for sfdprog-core
//!
//! Every layer has its own small, `Copy` error enum so that callers can
//! tell a transport failure from a bad parameter table from a device that
//! never finished an operation. All of them are no_std compatible and
//! collapse to a two-value result at the host boundary (see [`crate::host`]).

use core::fmt;

/// Failure of the command bus itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The platform transfer primitive reported a failure
    TransferFailed,
    /// SFDP read outside the 24-bit SFDP address space
    AddressOutOfRange {
        /// Requested start address
        addr: u32,
        /// Requested length in bytes
        len: usize,
    },
    /// Command does not fit the transport's header buffer
    CommandTooLong,
    /// Board bring-up or release failed
    BoardInit,
}

/// Failure while discovering the flash parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// A bus transaction failed during discovery
    ReadFailed(BusError),
    /// JEDEC ID read back as all 0x00 or all 0xFF; nothing is attached
    NoResponse,
    /// The SFDP signature is missing; the chip predates JESD216
    NotSfdpCapable,
    /// SFDP major revision newer than this decoder understands
    UnsupportedRevision {
        /// Major revision reported by the device
        major: u8,
        /// Minor revision reported by the device
        minor: u8,
    },
    /// Basic parameter header is malformed (revision or length)
    InvalidHeader,
    /// Capacity does not fit the descriptor's integer width
    CapacityOverflow,
    /// A basic table field holds a reserved or invalid encoding
    InvalidParameter {
        /// 1-based DWORD index of the offending field
        dword: u8,
    },
}

/// Failure of a flash operation after initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpError {
    /// Bus failure in the middle of an operation
    Bus(BusError),
    /// The device stayed busy for the whole poll budget
    Timeout {
        /// Number of status reads performed
        polls: u32,
    },
    /// Address outside the addressable or decoded range
    AddressOutOfRange {
        /// Offending address
        addr: u32,
    },
    /// Page program crossing a page boundary or longer than a page
    Unaligned {
        /// Start address of the rejected program
        addr: u32,
        /// Length of the rejected program
        len: usize,
    },
    /// Operation missing an address or carrying the wrong data phase
    InvalidRequest,
    /// The descriptor has no erase type to satisfy the request
    NoEraser,
    /// Loader not initialized, or already signed off
    NotInitialized,
}

/// Failure of [`crate::flash::FlashLoader::init`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// Board bring-up or another bus failure outside discovery
    Bus(BusError),
    /// Parameter discovery failed
    Decode(DecodeError),
    /// Post-discovery setup (e.g. entering 4-byte mode) failed
    Setup(OpError),
    /// `init` called on a loader that is already initialized
    AlreadyInitialized,
}

impl From<BusError> for DecodeError {
    fn from(e: BusError) -> Self {
        Self::ReadFailed(e)
    }
}

impl From<BusError> for OpError {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

impl From<BusError> for InitError {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

impl From<DecodeError> for InitError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

impl From<OpError> for InitError {
    fn from(e: OpError) -> Self {
        Self::Setup(e)
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransferFailed => write!(f, "bus transfer failed"),
            Self::AddressOutOfRange { addr, len } => write!(
                f,
                "SFDP read of {} bytes at 0x{:08X} is outside the 24-bit SFDP space",
                len, addr
            ),
            Self::CommandTooLong => write!(f, "command header too long for transport"),
            Self::BoardInit => write!(f, "board bring-up failed"),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed(e) => write!(f, "read failed: {}", e),
            Self::NoResponse => write!(f, "no flash device responded to JEDEC ID"),
            Self::NotSfdpCapable => write!(f, "device is not SFDP capable"),
            Self::UnsupportedRevision { major, minor } => {
                write!(f, "unsupported SFDP revision {}.{}", major, minor)
            }
            Self::InvalidHeader => write!(f, "invalid basic parameter header"),
            Self::CapacityOverflow => write!(f, "flash capacity exceeds 32-bit range"),
            Self::InvalidParameter { dword } => {
                write!(f, "invalid value in basic parameter table DWORD{}", dword)
            }
        }
    }
}

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "{}", e),
            Self::Timeout { polls } => {
                write!(f, "device still busy after {} status polls", polls)
            }
            Self::AddressOutOfRange { addr } => {
                write!(f, "address 0x{:08X} out of range", addr)
            }
            Self::Unaligned { addr, len } => write!(
                f,
                "program of {} bytes at 0x{:08X} crosses a page boundary",
                len, addr
            ),
            Self::InvalidRequest => write!(f, "invalid request for this operation"),
            Self::NoEraser => write!(f, "no erase type available"),
            Self::NotInitialized => write!(f, "flash loader not initialized"),
        }
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "{}", e),
            Self::Decode(e) => write!(f, "SFDP decode failed: {}", e),
            Self::Setup(e) => write!(f, "device setup failed: {}", e),
            Self::AlreadyInitialized => write!(f, "flash loader already initialized"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BusError {}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

#[cfg(feature = "std")]
impl std::error::Error for OpError {}

#[cfg(feature = "std")]
impl std::error::Error for InitError {}
