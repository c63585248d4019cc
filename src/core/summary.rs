//! Human-readable bag summary.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::core::log::LogReader;
use crate::core::query::BagManager;
use crate::core::time::ns_to_secs;
use crate::core::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicSummary {
    pub topic: String,
    /// `None` for a declared topic without messages.
    pub message_type: Option<String>,
    pub message_count: usize,
    pub frequency: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BagSummary {
    pub path: Option<String>,
    pub messages: usize,
    pub start_ns: Option<u64>,
    pub end_ns: Option<u64>,
    pub topics: Vec<TopicSummary>,
}

impl BagSummary {
    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.display().to_string());
        self
    }

    pub fn duration_ns(&self) -> u64 {
        match (self.start_ns, self.end_ns) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            _ => 0,
        }
    }
}

impl<R: LogReader> BagManager<R> {
    /// Summarise every topic, indexing those not yet cached.
    pub fn summary(&self) -> Result<BagSummary> {
        let mut summary = BagSummary {
            path: None,
            messages: 0,
            start_ns: None,
            end_ns: None,
            topics: Vec::with_capacity(self.topics().len()),
        };
        for topic in self.topics() {
            let entry = match self.get_topic_info(topic, false) {
                Ok(info) => {
                    summary.start_ns = min_opt(summary.start_ns, info.start_time_ns());
                    summary.end_ns = max_opt(summary.end_ns, info.end_time_ns());
                    TopicSummary {
                        topic: topic.clone(),
                        message_type: Some(info.message_type().to_string()),
                        message_count: info.message_count(),
                        frequency: info.frequency(),
                    }
                }
                Err(Error::EmptyTopic(_)) => TopicSummary {
                    topic: topic.clone(),
                    message_type: None,
                    message_count: 0,
                    frequency: None,
                },
                Err(err) => return Err(err),
            };
            summary.messages += entry.message_count;
            summary.topics.push(entry);
        }
        Ok(summary)
    }
}

fn min_opt(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_opt(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

impl fmt::Display for BagSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.path {
            writeln!(f, "path:     {path}")?;
        }
        writeln!(f, "duration: {:.1}s", ns_to_secs(self.duration_ns()))?;
        if let (Some(start), Some(end)) = (self.start_ns, self.end_ns) {
            writeln!(f, "start:    {:.9}", ns_to_secs(start))?;
            writeln!(f, "end:      {:.9}", ns_to_secs(end))?;
        }
        writeln!(f, "messages: {}", self.messages)?;
        let width = self.topics.iter().map(|t| t.topic.len()).max().unwrap_or(0);
        for (i, topic) in self.topics.iter().enumerate() {
            let label = if i == 0 { "topics:  " } else { "         " };
            write!(
                f,
                "{label} {:<width$} {:>8} msgs",
                topic.topic, topic.message_count
            )?;
            if let Some(hz) = topic.frequency {
                write!(f, " @ {hz:.1} Hz")?;
            }
            if let Some(message_type) = &topic.message_type {
                write!(f, " : {message_type}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
