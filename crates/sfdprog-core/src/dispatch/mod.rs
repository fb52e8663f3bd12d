//! Command dispatch
//!
//! Maps abstract flash operations onto concrete bus commands. The
//! [`SequenceTable`] is built once from the decoded descriptor; a
//! [`Dispatcher`] borrows it together with the bus to run operations.

mod dispatcher;
mod sequence;

pub use dispatcher::{Data, Dispatcher};
pub use sequence::{CommandSequence, DataDirection, FlashOp, SequenceTable, SEQUENCE_SLOTS};
