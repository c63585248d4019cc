//! Log reader capability.
//!
//! The index and query layers only see a recorded log through these traits,
//! so any concrete format (the bundled [`BagReader`](crate::core::BagReader),
//! an in-memory fixture, a foreign bag library) can sit underneath.
//!
//! # Example
//!
//! ```no_run
//! use bagmanager::core::{BagReader, LogReader, Message};
//!
//! let reader = BagReader::open("./drive.bag")?;
//! for entry in reader.iterate(Some(&["/imu"][..]))? {
//!     let entry = entry?;
//!     println!("{} {} {}", entry.topic, entry.log_time_ns, entry.message.type_name());
//! }
//! # Ok::<(), bagmanager::core::Error>(())
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::core::Result;

/// Opaque decoded message.
pub trait Message {
    /// Type name of the message, constant per topic.
    fn type_name(&self) -> &str;

    /// Decode the producer's header stamp.
    ///
    /// Returns `Ok(None)` when the message type has no header field. This is
    /// the expensive path: implementations may need to decode the payload.
    fn header_timestamp(&self) -> Result<Option<u64>>;
}

/// One record yielded by [`LogReader::iterate`].
#[derive(Debug, Clone)]
pub struct LogEntry<M> {
    pub topic: Arc<str>,
    pub message: M,
    /// Time the recorder wrote the message.
    pub log_time_ns: u64,
}

pub type Entries<'a, M> = Box<dyn Iterator<Item = Result<LogEntry<M>>> + 'a>;

/// Read-only access to a recorded log.
pub trait LogReader {
    type Message: Message;

    /// Every topic present in the log.
    fn list_topics(&self) -> BTreeSet<String>;

    /// Whether `topic` is present. Readers with a topic table should override
    /// this to skip building the full set.
    fn has_topic(&self, topic: &str) -> bool {
        self.list_topics().contains(topic)
    }

    /// Lazily iterate entries in physical log order.
    ///
    /// `None` yields every topic; `Some(topics)` restricts to those topics.
    fn iterate(&self, topics: Option<&[&str]>) -> Result<Entries<'_, Self::Message>>;

    /// Entry at `position` within `topic`'s log-ordered stream.
    ///
    /// The default re-scans the topic stream. Readers with a record table
    /// should override it.
    fn read_at(&self, topic: &str, position: usize) -> Result<Option<LogEntry<Self::Message>>> {
        match self.iterate(Some(std::slice::from_ref(&topic)))?.nth(position) {
            Some(entry) => entry.map(Some),
            None => Ok(None),
        }
    }

    /// Release the underlying log. Further calls may fail.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stamp(u64);

    impl Message for Stamp {
        fn type_name(&self) -> &str {
            "test/Stamp"
        }

        fn header_timestamp(&self) -> Result<Option<u64>> {
            Ok(Some(self.0))
        }
    }

    struct VecLog(Vec<(&'static str, u64)>);

    impl LogReader for VecLog {
        type Message = Stamp;

        fn list_topics(&self) -> BTreeSet<String> {
            self.0.iter().map(|(topic, _)| topic.to_string()).collect()
        }

        fn iterate(&self, topics: Option<&[&str]>) -> Result<Entries<'_, Stamp>> {
            let wanted: Option<Vec<String>> =
                topics.map(|t| t.iter().map(|s| s.to_string()).collect());
            Ok(Box::new(
                self.0
                    .iter()
                    .filter(move |(topic, _)| {
                        wanted
                            .as_ref()
                            .map_or(true, |w| w.iter().any(|name| name.as_str() == *topic))
                    })
                    .map(|&(topic, ts)| {
                        Ok(LogEntry {
                            topic: Arc::from(topic),
                            message: Stamp(ts),
                            log_time_ns: ts,
                        })
                    }),
            ))
        }
    }

    #[test]
    fn default_read_at_rescans_topic_stream() {
        let log = VecLog(vec![("a", 1), ("b", 2), ("a", 3), ("b", 4), ("a", 5)]);
        let entry = log.read_at("a", 2).expect("read").expect("entry");
        assert_eq!(entry.log_time_ns, 5);
        assert_eq!(&*entry.topic, "a");
        assert!(log.read_at("b", 2).expect("read").is_none());
    }

    #[test]
    fn iterate_filters_topics() {
        let log = VecLog(vec![("a", 1), ("b", 2), ("c", 3)]);
        let picked: Vec<u64> = log
            .iterate(Some(&["a", "c"][..]))
            .expect("iterate")
            .map(|e| e.expect("entry").log_time_ns)
            .collect();
        assert_eq!(picked, vec![1, 3]);
        assert_eq!(log.iterate(None).expect("iterate").count(), 3);
    }

    #[test]
    fn default_has_topic_checks_topic_list() {
        let log = VecLog(vec![("a", 1), ("b", 2)]);
        assert!(log.has_topic("b"));
        assert!(!log.has_topic("c"));
    }
}
