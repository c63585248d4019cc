//! Convenient query access over recorded message logs ("bags").
//!
//! Builds an in-memory per-topic index of log times (and, on request, header
//! stamps) with one scan, then answers positional, nearest-time and interval
//! queries from the index.

pub mod core;

pub use crate::core::{BagManager, Error, Result, TopicIndex};
