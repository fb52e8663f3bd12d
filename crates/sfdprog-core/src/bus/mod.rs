//! Command bus abstractions
//!
//! [`CommandBus`] is what the platform implements (or [`Transfer`], wrapped
//! in [`TransferBus`], for a plain write-then-read primitive). The loader
//! itself always goes through [`RetryBus`], which adds the SFDP settle
//! delay and the bounded busy poll.

mod retry;
mod traits;
mod transfer;

pub use retry::RetryBus;
pub use traits::CommandBus;
pub use transfer::{Transfer, TransferBus, DEFAULT_TRANSFER_BUF, MAX_HEADER_LEN};
