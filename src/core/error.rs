use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Corrupt(&'static str),
    /// The log file could not be opened or is not a readable bag.
    LogOpen { path: PathBuf, reason: String },
    /// The topic is not present in the log's topic list.
    UnknownTopic(String),
    /// The topic is present but holds zero messages.
    EmptyTopic(String),
    IndexOutOfRange {
        topic: String,
        index: usize,
        count: usize,
    },
    /// A message (or its header) could not be decoded when required.
    Decode {
        topic: String,
        position: usize,
        reason: String,
    },
    /// The topic's message type carries no header field at all.
    HeaderTimesUnavailable(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Corrupt(msg) => write!(f, "corrupt data: {msg}"),
            Error::LogOpen { path, reason } => {
                write!(f, "cannot open log {}: {reason}", path.display())
            }
            Error::UnknownTopic(topic) => write!(f, "unknown topic: {topic}"),
            Error::EmptyTopic(topic) => write!(f, "topic has no messages: {topic}"),
            Error::IndexOutOfRange {
                topic,
                index,
                count,
            } => write!(
                f,
                "index {index} out of range for topic {topic} ({count} messages)"
            ),
            Error::Decode {
                topic,
                position,
                reason,
            } => write!(f, "cannot decode message {position} on {topic}: {reason}"),
            Error::HeaderTimesUnavailable(topic) => {
                write!(f, "messages on {topic} have no header timestamp")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
