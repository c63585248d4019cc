//! Indexed query access over recorded topic/timestamp message logs.
//!
//! The log is reached only through the [`LogReader`] trait; [`BagReader`] is
//! the bundled implementation for bag files written by [`BagWriter`].

pub mod bag;
pub mod error;
pub mod header;
pub mod index;
pub mod log;
mod mmap;
pub mod query;
pub mod summary;
pub mod time;

pub use bag::{BagMessage, BagReader, BagWriter, Connection, ReaderConfig};
pub use error::{Error, Result};
pub use index::{TopicIndex, TopicIndexer};
pub use log::{Entries, LogEntry, LogReader, Message};
pub use query::{BagManager, IntervalCounts};
pub use summary::{BagSummary, TopicSummary};
