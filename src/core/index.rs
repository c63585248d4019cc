//! Per-topic timestamp index.
//!
//! A [`TopicIndex`] is built by one linear scan of a topic's messages and is
//! immutable afterwards. It always holds the log-clock time of every message;
//! header stamps are only collected on request because they require decoding
//! each message.

use std::time::Instant;

use crate::core::log::{LogReader, Message};
use crate::core::time::{
    count_in_range, is_non_decreasing, nearest_position, nearest_position_unsorted, ns_to_secs,
};
use crate::core::{Error, Result};

/// Timestamps and derived statistics of one topic.
///
/// `rosbag_times[i]` and `header_times[i]` always describe the same message.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicIndex {
    topic: String,
    message_type: String,
    rosbag_times: Vec<u64>,
    header_times: Option<Vec<u64>>,
    header_times_sorted: bool,
}

impl TopicIndex {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Type name of the first message on the topic.
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// Log-clock times in log order.
    pub fn rosbag_times(&self) -> &[u64] {
        &self.rosbag_times
    }

    /// Header stamps in log order, if they were collected.
    pub fn header_times(&self) -> Option<&[u64]> {
        self.header_times.as_deref()
    }

    pub fn has_header_times(&self) -> bool {
        self.header_times.is_some()
    }

    pub fn message_count(&self) -> usize {
        self.rosbag_times.len()
    }

    pub fn start_time_ns(&self) -> Option<u64> {
        self.rosbag_times.first().copied()
    }

    pub fn end_time_ns(&self) -> Option<u64> {
        self.rosbag_times.last().copied()
    }

    /// Mean message rate in Hz over the log-clock span.
    ///
    /// `None` with fewer than two messages or a zero-length span.
    pub fn frequency(&self) -> Option<f64> {
        let (first, last) = (self.start_time_ns()?, self.end_time_ns()?);
        let count = self.message_count();
        if count < 2 || last <= first {
            return None;
        }
        Some((count - 1) as f64 / ns_to_secs(last - first))
    }

    /// Position of the message whose log time is closest to `time_ns`.
    pub fn nearest_by_rosbag_time(&self, time_ns: u64) -> Option<usize> {
        nearest_position(&self.rosbag_times, time_ns)
    }

    /// Position of the message whose header stamp is closest to `time_ns`.
    ///
    /// `None` when header stamps were not collected.
    pub fn nearest_by_header_time(&self, time_ns: u64) -> Option<usize> {
        let times = self.header_times.as_deref()?;
        if self.header_times_sorted {
            nearest_position(times, time_ns)
        } else {
            nearest_position_unsorted(times, time_ns)
        }
    }

    /// Messages with `start_ns <= log time <= end_ns`.
    pub fn count_in_interval(&self, start_ns: u64, end_ns: u64) -> usize {
        count_in_range(&self.rosbag_times, start_ns, end_ns)
    }
}

/// Builds [`TopicIndex`] values from a [`LogReader`].
pub struct TopicIndexer<'a, R: LogReader> {
    reader: &'a R,
}

impl<'a, R: LogReader> TopicIndexer<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }

    /// Scan `topic` once and index it.
    ///
    /// # Errors
    ///
    /// - `Error::UnknownTopic`: the topic is not in the log
    /// - `Error::EmptyTopic`: the topic holds no messages
    /// - `Error::HeaderTimesUnavailable`: header stamps requested but the first
    ///   message has no header
    /// - `Error::Decode`: a later message's header stamp cannot be decoded
    pub fn build(&self, topic: &str, include_header_times: bool) -> Result<TopicIndex> {
        if !self.reader.has_topic(topic) {
            return Err(Error::UnknownTopic(topic.to_string()));
        }

        let started = Instant::now();
        let mut message_type = None;
        let mut rosbag_times = Vec::new();
        let mut header_times = Vec::new();

        for (position, entry) in self
            .reader
            .iterate(Some(std::slice::from_ref(&topic)))?
            .enumerate()
        {
            let entry = entry?;
            if message_type.is_none() {
                message_type = Some(entry.message.type_name().to_string());
            }
            if include_header_times {
                header_times.push(header_stamp(topic, position, &entry.message)?);
            }
            rosbag_times.push(entry.log_time_ns);
        }

        let message_type = message_type.ok_or_else(|| Error::EmptyTopic(topic.to_string()))?;
        let header_times = include_header_times.then_some(header_times);
        let header_times_sorted = header_times.as_deref().map_or(true, is_non_decreasing);

        log::debug!(
            "indexed topic={} messages={} header_times={} elapsed_us={}",
            topic,
            rosbag_times.len(),
            include_header_times,
            started.elapsed().as_micros()
        );

        Ok(TopicIndex {
            topic: topic.to_string(),
            message_type,
            rosbag_times,
            header_times,
            header_times_sorted,
        })
    }
}

fn header_stamp<M: Message>(topic: &str, position: usize, message: &M) -> Result<u64> {
    match message.header_timestamp() {
        Ok(Some(stamp)) => Ok(stamp),
        Ok(None) if position == 0 => Err(Error::HeaderTimesUnavailable(topic.to_string())),
        Ok(None) => Err(Error::Decode {
            topic: topic.to_string(),
            position,
            reason: "message has no header".to_string(),
        }),
        Err(err) => Err(Error::Decode {
            topic: topic.to_string(),
            position,
            reason: err.to_string(),
        }),
    }
}
