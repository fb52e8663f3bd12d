//! Flash operation layer
//!
//! This module provides the public init/read/write/erase/signoff surface
//! on top of the command dispatcher.

mod chunks;
mod loader;
mod sfdp_loader;

pub use chunks::{page_chunks, PageChunks};
pub use loader::FlashLoader;
pub use sfdp_loader::SfdpFlashLoader;
