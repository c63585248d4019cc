//! Query layer over lazily built topic indexes.
//!
//! [`BagManager`] owns the log reader and one cache slot per topic. The first
//! query touching a topic builds its [`TopicIndex`]; later queries reuse it.
//! A request for header stamps on a cached index without them rebuilds the
//! index and swaps the slot's contents in one assignment.
//!
//! Each slot has its own mutex held across check-and-build, so concurrent
//! callers never build the same topic twice and never see a partial index.
//! Callers get `Arc<TopicIndex>` snapshots that stay valid after a rebuild.
//!
//! # Example
//!
//! ```no_run
//! use bagmanager::core::BagManager;
//!
//! let bag = BagManager::open("./drive.bag")?;
//! let info = bag.get_topic_info("/imu", false)?;
//! println!("{} msgs of {}", info.message_count(), info.message_type());
//!
//! let msg = bag.get_closest_message_by_rosbag_time("/imu", 1_500_000_000)?;
//! let counts = bag.get_message_count_in_interval(None, Some(1_000_000_000), None)?;
//! println!("{} msgs after 1s", counts.total());
//! # let _ = msg;
//! # Ok::<(), bagmanager::core::Error>(())
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::core::bag::{BagReader, ReaderConfig};
use crate::core::index::{TopicIndex, TopicIndexer};
use crate::core::log::LogReader;
use crate::core::{Error, Result};

type Slot = Mutex<Option<Arc<TopicIndex>>>;

/// Slots only ever hold fully built indexes, so a poisoned lock is safe to reuse.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-topic message counts of an interval query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntervalCounts {
    counts: BTreeMap<String, usize>,
}

impl IntervalCounts {
    pub fn get(&self, topic: &str) -> Option<usize> {
        self.counts.get(topic).copied()
    }

    /// Sum over all queried topics.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(topic, count)| (topic.as_str(), *count))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Indexed query access to one opened log.
///
/// The log is released when the manager is closed or dropped.
pub struct BagManager<R: LogReader = BagReader> {
    reader: R,
    topics: BTreeSet<String>,
    cache: Mutex<HashMap<String, Arc<Slot>>>,
    closed: bool,
}

impl BagManager<BagReader> {
    /// Open a bag file with the default [`ReaderConfig`].
    ///
    /// # Errors
    ///
    /// - `Error::LogOpen`: the file is missing, unreadable, or not a bag
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, ReaderConfig::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, config: ReaderConfig) -> Result<Self> {
        Ok(Self::new(BagReader::open_with_config(path, config)?))
    }

    pub fn path(&self) -> &Path {
        self.reader.path()
    }
}

impl<R: LogReader> BagManager<R> {
    pub fn new(reader: R) -> Self {
        let topics = reader.list_topics();
        Self {
            reader,
            topics,
            cache: Mutex::new(HashMap::new()),
            closed: false,
        }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Topics present in the log.
    pub fn topics(&self) -> &BTreeSet<String> {
        &self.topics
    }

    /// The cached index of `topic`, without building one.
    pub fn cached_index(&self, topic: &str) -> Option<Arc<TopicIndex>> {
        let slot = lock(&self.cache).get(topic).cloned()?;
        let cached = lock(&slot).clone();
        cached
    }

    fn check_topic(&self, topic: &str) -> Result<()> {
        if self.topics.contains(topic) {
            Ok(())
        } else {
            Err(Error::UnknownTopic(topic.to_string()))
        }
    }

    fn slot(&self, topic: &str) -> Arc<Slot> {
        let mut cache = lock(&self.cache);
        if let Some(slot) = cache.get(topic) {
            return Arc::clone(slot);
        }
        Arc::clone(cache.entry(topic.to_string()).or_default())
    }

    /// Index of `topic`, built on first use.
    ///
    /// With `get_header_time` the returned index also carries header stamps;
    /// a cached index without them is rebuilt and replaced. Building header
    /// stamps decodes every message on the topic.
    ///
    /// # Errors
    ///
    /// - `Error::UnknownTopic`, `Error::EmptyTopic`
    /// - `Error::HeaderTimesUnavailable`, `Error::Decode` when header stamps
    ///   are requested but cannot be read
    pub fn get_topic_info(&self, topic: &str, get_header_time: bool) -> Result<Arc<TopicIndex>> {
        self.check_topic(topic)?;
        let slot = self.slot(topic);
        let mut cached = lock(&slot);
        if let Some(index) = cached.as_ref() {
            if !get_header_time || index.has_header_times() {
                return Ok(Arc::clone(index));
            }
        }
        let index = Arc::new(TopicIndexer::new(&self.reader).build(topic, get_header_time)?);
        *cached = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Message at `index` within `topic`, in log order.
    ///
    /// # Errors
    ///
    /// - `Error::IndexOutOfRange`: `index >= message_count`
    pub fn get_message_by_index(&self, topic: &str, index: usize) -> Result<R::Message> {
        let info = self.get_topic_info(topic, false)?;
        self.message_at(topic, index, info.message_count())
    }

    /// Message whose log time is closest to `time_rosbag_ns`.
    ///
    /// On an exact tie between two messages the earlier one is returned.
    pub fn get_closest_message_by_rosbag_time(
        &self,
        topic: &str,
        time_rosbag_ns: u64,
    ) -> Result<R::Message> {
        self.closest_by_rosbag_time(topic, time_rosbag_ns)
            .map(|(_, msg)| msg)
    }

    /// Like [`get_closest_message_by_rosbag_time`](Self::get_closest_message_by_rosbag_time),
    /// also returning the message's position within the topic.
    pub fn closest_by_rosbag_time(
        &self,
        topic: &str,
        time_rosbag_ns: u64,
    ) -> Result<(usize, R::Message)> {
        let info = self.get_topic_info(topic, false)?;
        let position = info
            .nearest_by_rosbag_time(time_rosbag_ns)
            .ok_or_else(|| Error::EmptyTopic(topic.to_string()))?;
        let msg = self.message_at(topic, position, info.message_count())?;
        Ok((position, msg))
    }

    /// Message whose header stamp is closest to `time_header_ns`.
    ///
    /// Builds the header stamp index on first use. Ties go to the earlier
    /// message.
    pub fn get_closest_message_by_header_time(
        &self,
        topic: &str,
        time_header_ns: u64,
    ) -> Result<R::Message> {
        self.closest_by_header_time(topic, time_header_ns)
            .map(|(_, msg)| msg)
    }

    /// Header-clock counterpart of [`closest_by_rosbag_time`](Self::closest_by_rosbag_time).
    pub fn closest_by_header_time(
        &self,
        topic: &str,
        time_header_ns: u64,
    ) -> Result<(usize, R::Message)> {
        let info = self.get_topic_info(topic, true)?;
        let position = info
            .nearest_by_header_time(time_header_ns)
            .ok_or_else(|| Error::HeaderTimesUnavailable(topic.to_string()))?;
        let msg = self.message_at(topic, position, info.message_count())?;
        Ok((position, msg))
    }

    /// Count messages with `start <= log time <= end` on each topic.
    ///
    /// `topics = None` counts every topic in the log; a missing bound is open.
    /// Every topic is checked before any index is built, and one unknown topic
    /// fails the whole call. Topics without messages count zero.
    pub fn get_message_count_in_interval(
        &self,
        topics: Option<&[&str]>,
        start_time_rosbag_ns: Option<u64>,
        end_time_rosbag_ns: Option<u64>,
    ) -> Result<IntervalCounts> {
        let topics: Vec<&str> = match topics {
            Some(topics) => topics.to_vec(),
            None => self.topics.iter().map(String::as_str).collect(),
        };
        for topic in &topics {
            self.check_topic(topic)?;
        }

        let start = start_time_rosbag_ns.unwrap_or(u64::MIN);
        let end = end_time_rosbag_ns.unwrap_or(u64::MAX);
        let mut counts = BTreeMap::new();
        for topic in topics {
            let count = match self.get_topic_info(topic, false) {
                Ok(info) => info.count_in_interval(start, end),
                Err(Error::EmptyTopic(_)) => 0,
                Err(err) => return Err(err),
            };
            counts.insert(topic.to_string(), count);
        }
        Ok(IntervalCounts { counts })
    }

    fn message_at(&self, topic: &str, index: usize, count: usize) -> Result<R::Message> {
        let out_of_range = || Error::IndexOutOfRange {
            topic: topic.to_string(),
            index,
            count,
        };
        if index >= count {
            return Err(out_of_range());
        }
        self.reader
            .read_at(topic, index)?
            .map(|entry| entry.message)
            .ok_or_else(out_of_range)
    }

    /// Release the log now instead of on drop.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.reader.close()
    }
}

impl<R: LogReader> Drop for BagManager<R> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.reader.close() {
            log::warn!("failed to close log: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_counts_total_and_lookup() {
        let counts = IntervalCounts {
            counts: BTreeMap::from([("/a".to_string(), 3), ("/b".to_string(), 1)]),
        };
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.get("/a"), Some(3));
        assert_eq!(counts.get("/c"), None);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts.iter().collect::<Vec<_>>(), vec![("/a", 3), ("/b", 1)]);
        assert!(IntervalCounts::default().is_empty());
    }
}
