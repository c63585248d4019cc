#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bagmanager::core::{BagWriter, Entries, LogEntry, LogReader, Message, Result};

pub const SEC: u64 = 1_000_000_000;

#[derive(Clone, Debug)]
pub struct MockMessage {
    pub type_name: &'static str,
    pub log_time_ns: u64,
    pub header: Option<u64>,
    decodes: Arc<AtomicUsize>,
}

impl Message for MockMessage {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn header_timestamp(&self) -> Result<Option<u64>> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        Ok(self.header)
    }
}

struct Record {
    topic: Arc<str>,
    type_name: &'static str,
    log_time_ns: u64,
    header: Option<u64>,
}

/// In-memory log that counts header decodes and topic scans.
#[derive(Default)]
pub struct MockLog {
    records: Vec<Record>,
    topics: BTreeSet<String>,
    decodes: Arc<AtomicUsize>,
    scans: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl MockLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a topic without adding messages.
    pub fn declare(mut self, topic: &str) -> Self {
        self.topics.insert(topic.to_string());
        self
    }

    pub fn push(mut self, topic: &str, type_name: &'static str, log_time_ns: u64, header: Option<u64>) -> Self {
        self.topics.insert(topic.to_string());
        self.records.push(Record {
            topic: Arc::from(topic),
            type_name,
            log_time_ns,
            header,
        });
        self
    }

    /// Append `times` to `topic`, with header stamps one nanosecond earlier.
    pub fn series(mut self, topic: &str, times: &[u64]) -> Self {
        for &t in times {
            self = self.push(topic, "test/Stamped", t, Some(t.saturating_sub(1)));
        }
        self
    }

    pub fn decode_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.decodes)
    }

    pub fn scan_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.scans)
    }

    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }
}

impl LogReader for MockLog {
    type Message = MockMessage;

    fn list_topics(&self) -> BTreeSet<String> {
        self.topics.clone()
    }

    fn iterate(&self, topics: Option<&[&str]>) -> Result<Entries<'_, MockMessage>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let wanted: Option<Vec<String>> = topics.map(|t| t.iter().map(|s| s.to_string()).collect());
        let decodes = Arc::clone(&self.decodes);
        Ok(Box::new(
            self.records
                .iter()
                .filter(move |r| {
                    wanted
                        .as_ref()
                        .map_or(true, |w| w.iter().any(|name| name.as_str() == &*r.topic))
                })
                .map(move |r| {
                    Ok(LogEntry {
                        topic: Arc::clone(&r.topic),
                        message: MockMessage {
                            type_name: r.type_name,
                            log_time_ns: r.log_time_ns,
                            header: r.header,
                            decodes: Arc::clone(&decodes),
                        },
                        log_time_ns: r.log_time_ns,
                    })
                }),
        ))
    }

    fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Topic `A` at 0..=4 s and topic `B` at 0.5, 2.5, 4.5 s, interleaved in time.
pub fn scenario_log() -> MockLog {
    MockLog::new()
        .series("A", &[0])
        .series("B", &[SEC / 2])
        .series("A", &[SEC, 2 * SEC])
        .series("B", &[5 * SEC / 2])
        .series("A", &[3 * SEC, 4 * SEC])
        .series("B", &[9 * SEC / 2])
}

/// Same layout as [`scenario_log`] written to a bag file. `A` carries header
/// stamps 10 ns after its log time, `B` has no header, `idle` has no messages.
pub fn write_scenario_bag(path: &Path) {
    let mut writer = BagWriter::create(path).expect("create bag");
    let a = writer.add_connection("A", "test/Stamped", true).expect("conn A");
    let b = writer.add_connection("B", "test/Plain", false).expect("conn B");
    writer
        .add_connection("idle", "test/Plain", false)
        .expect("conn idle");
    let a_at = |w: &mut BagWriter, t: u64| {
        w.write(a, t, Some(t + 10), format!("a@{t}").as_bytes())
            .expect("write A")
    };
    let b_at = |w: &mut BagWriter, t: u64| {
        w.write(b, t, None, format!("b@{t}").as_bytes())
            .expect("write B")
    };
    a_at(&mut writer, 0);
    b_at(&mut writer, SEC / 2);
    a_at(&mut writer, SEC);
    a_at(&mut writer, 2 * SEC);
    b_at(&mut writer, 5 * SEC / 2);
    a_at(&mut writer, 3 * SEC);
    a_at(&mut writer, 4 * SEC);
    b_at(&mut writer, 9 * SEC / 2);
    writer.finish().expect("finish bag");
}
