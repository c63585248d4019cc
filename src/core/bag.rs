//! Bag file reader and writer.
//!
//! # Layout
//!
//! ```text
//! [file header 64B]
//! [record header 64B][payload][pad to 64B]   ← connection: topic, type, has_header
//! [record header 64B][payload][pad to 64B]   ← message: [header stamp u64]? body
//! ...
//! ```
//!
//! Record headers carry the log time, so a full pass over them is a cheap
//! metadata read. The producer's header stamp lives in the message payload
//! and is only decoded on request.
//!
//! # Example
//!
//! ```no_run
//! use bagmanager::core::{BagReader, BagWriter, LogReader};
//!
//! let mut writer = BagWriter::create("./drive.bag")?;
//! let imu = writer.add_connection("/imu", "sensor_msgs/Imu", true)?;
//! writer.write(imu, 1_000, Some(990), b"sample")?;
//! writer.finish()?;
//!
//! let reader = BagReader::open("./drive.bag")?;
//! assert!(reader.list_topics().contains("/imu"));
//! # Ok::<(), bagmanager::core::Error>(())
//! ```

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::header::{
    record_len, FileHeader, RecordHeader, FILE_HEADER_SIZE, HEADER_SIZE, KIND_CONNECTION,
    KIND_MESSAGE, RECORD_ALIGN,
};
use crate::core::log::{Entries, LogEntry, LogReader, Message};
use crate::core::mmap::MmapFile;
use crate::core::{Error, Result};

const STAMP_LEN: usize = 8;

#[derive(Clone, Copy, Debug)]
pub struct ReaderConfig {
    /// Check every record payload against its CRC on read.
    pub verify_crc: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self { verify_crc: true }
    }
}

/// A topic/type binding declared once in the bag before its messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    pub id: u16,
    pub topic: Arc<str>,
    pub type_name: Arc<str>,
    pub has_header: bool,
}

impl Connection {
    fn encode(&self) -> Result<Vec<u8>> {
        let topic = self.topic.as_bytes();
        let type_name = self.type_name.as_bytes();
        let topic_len =
            u16::try_from(topic.len()).map_err(|_| Error::Corrupt("topic name too long"))?;
        let type_len =
            u16::try_from(type_name.len()).map_err(|_| Error::Corrupt("type name too long"))?;
        let mut buf = Vec::with_capacity(5 + topic.len() + type_name.len());
        buf.extend_from_slice(&topic_len.to_le_bytes());
        buf.extend_from_slice(topic);
        buf.extend_from_slice(&type_len.to_le_bytes());
        buf.extend_from_slice(type_name);
        buf.push(u8::from(self.has_header));
        Ok(buf)
    }

    fn decode(id: u16, payload: &[u8]) -> Result<Self> {
        let mut cursor = payload;
        let topic = take_str(&mut cursor)?;
        let type_name = take_str(&mut cursor)?;
        let has_header = match cursor {
            [flag] => *flag != 0,
            _ => return Err(Error::Corrupt("malformed connection record")),
        };
        Ok(Self {
            id,
            topic: Arc::from(topic),
            type_name: Arc::from(type_name),
            has_header,
        })
    }
}

fn take_str<'a>(cursor: &mut &'a [u8]) -> Result<&'a str> {
    if cursor.len() < 2 {
        return Err(Error::Corrupt("malformed connection record"));
    }
    let len = u16::from_le_bytes([cursor[0], cursor[1]]) as usize;
    let rest = &cursor[2..];
    if rest.len() < len {
        return Err(Error::Corrupt("malformed connection record"));
    }
    let value = std::str::from_utf8(&rest[..len]).map_err(|_| Error::Corrupt("name is not utf-8"))?;
    *cursor = &rest[len..];
    Ok(value)
}

/// A message read from a bag. Owns its payload.
#[derive(Clone, Debug)]
pub struct BagMessage {
    type_name: Arc<str>,
    has_header: bool,
    data: Vec<u8>,
}

impl BagMessage {
    /// Raw payload as stored, header stamp included.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload without the leading header stamp.
    pub fn body(&self) -> &[u8] {
        if self.has_header && self.data.len() >= STAMP_LEN {
            &self.data[STAMP_LEN..]
        } else {
            &self.data
        }
    }
}

impl Message for BagMessage {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn header_timestamp(&self) -> Result<Option<u64>> {
        if !self.has_header {
            return Ok(None);
        }
        if self.data.len() < STAMP_LEN {
            return Err(Error::Corrupt("payload shorter than header stamp"));
        }
        let mut stamp = [0u8; STAMP_LEN];
        stamp.copy_from_slice(&self.data[..STAMP_LEN]);
        Ok(Some(u64::from_le_bytes(stamp)))
    }
}

/// Memory-mapped bag reader.
///
/// Opening walks every record header once and keeps the record offsets of
/// each topic, so positional reads are a table lookup.
pub struct BagReader {
    path: PathBuf,
    mmap: Option<MmapFile>,
    config: ReaderConfig,
    connections: HashMap<u16, Connection>,
    topics: BTreeMap<String, Vec<usize>>,
    messages: Vec<usize>,
}

impl BagReader {
    /// Open a bag with the default [`ReaderConfig`].
    ///
    /// # Errors
    ///
    /// - `Error::LogOpen`: the file is missing, unreadable, or not a valid bag
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, ReaderConfig::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, config: ReaderConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let log_open = |err: Error| Error::LogOpen {
            path: path.clone(),
            reason: err.to_string(),
        };

        let mmap = MmapFile::open(&path).map_err(log_open)?;
        FileHeader::from_bytes(mmap.as_slice()).map_err(log_open)?;

        let mut reader = Self {
            path: path.clone(),
            mmap: None,
            config,
            connections: HashMap::new(),
            topics: BTreeMap::new(),
            messages: Vec::new(),
        };
        reader.scan(&mmap).map_err(log_open)?;
        reader.mmap = Some(mmap);

        log::info!(
            "opened bag {} topics={} messages={}",
            path.display(),
            reader.topics.len(),
            reader.messages.len()
        );
        Ok(reader)
    }

    fn scan(&mut self, mmap: &MmapFile) -> Result<()> {
        let mut offset = FILE_HEADER_SIZE;
        while offset + HEADER_SIZE <= mmap.len() {
            let header = RecordHeader::from_bytes(mmap.range(offset, HEADER_SIZE)?)?;
            let payload = mmap
                .range(offset + HEADER_SIZE, header.payload_len as usize)
                .map_err(|_| Error::Corrupt("truncated record"))?;
            match header.kind {
                KIND_CONNECTION => {
                    header.validate_crc(payload)?;
                    let conn = Connection::decode(header.conn_id, payload)?;
                    if self.connections.contains_key(&conn.id) {
                        return Err(Error::Corrupt("duplicate connection id"));
                    }
                    self.topics.entry(conn.topic.to_string()).or_default();
                    self.connections.insert(conn.id, conn);
                }
                _ => {
                    let conn = self
                        .connections
                        .get(&header.conn_id)
                        .ok_or(Error::Corrupt("message before its connection"))?;
                    self.topics
                        .entry(conn.topic.to_string())
                        .or_default()
                        .push(offset);
                    self.messages.push(offset);
                }
            }
            offset += record_len(header.payload_len as usize);
        }
        if offset < mmap.len() {
            return Err(Error::Corrupt("truncated record header"));
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total messages across all topics.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Declared connections, ordered by id.
    pub fn connections(&self) -> Vec<&Connection> {
        let mut conns: Vec<&Connection> = self.connections.values().collect();
        conns.sort_by_key(|c| c.id);
        conns
    }

    fn entry_at(&self, offset: usize) -> Result<LogEntry<BagMessage>> {
        let mmap = self.mmap.as_ref().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "bag reader closed",
            ))
        })?;
        let header = RecordHeader::from_bytes(mmap.range(offset, HEADER_SIZE)?)?;
        if header.kind != KIND_MESSAGE {
            return Err(Error::Corrupt("expected message record"));
        }
        let payload = mmap.range(offset + HEADER_SIZE, header.payload_len as usize)?;
        if self.config.verify_crc {
            header.validate_crc(payload)?;
        }
        let conn = self
            .connections
            .get(&header.conn_id)
            .ok_or(Error::Corrupt("unknown connection id"))?;
        Ok(LogEntry {
            topic: Arc::clone(&conn.topic),
            message: BagMessage {
                type_name: Arc::clone(&conn.type_name),
                has_header: conn.has_header,
                data: payload.to_vec(),
            },
            log_time_ns: header.log_time_ns,
        })
    }

    fn offsets_for(&self, topics: Option<&[&str]>) -> Cow<'_, [usize]> {
        match topics {
            None => Cow::Borrowed(self.messages.as_slice()),
            Some([topic]) => match self.topics.get(*topic) {
                Some(offsets) => Cow::Borrowed(offsets.as_slice()),
                None => Cow::Owned(Vec::new()),
            },
            Some(topics) => {
                let mut merged: Vec<usize> = topics
                    .iter()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .filter_map(|topic| self.topics.get(*topic))
                    .flatten()
                    .copied()
                    .collect();
                merged.sort_unstable();
                Cow::Owned(merged)
            }
        }
    }
}

impl LogReader for BagReader {
    type Message = BagMessage;

    fn list_topics(&self) -> BTreeSet<String> {
        self.topics.keys().cloned().collect()
    }

    fn has_topic(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    fn iterate(&self, topics: Option<&[&str]>) -> Result<Entries<'_, BagMessage>> {
        let offsets = self.offsets_for(topics);
        let len = offsets.len();
        Ok(Box::new(
            (0..len).map(move |i| self.entry_at(offsets[i])),
        ))
    }

    fn read_at(&self, topic: &str, position: usize) -> Result<Option<LogEntry<BagMessage>>> {
        match self.topics.get(topic).and_then(|offsets| offsets.get(position)) {
            Some(&offset) => self.entry_at(offset).map(Some),
            None => Ok(None),
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.mmap.take().is_some() {
            log::debug!("closed bag {}", self.path.display());
        }
        Ok(())
    }
}

/// Sequential bag writer.
pub struct BagWriter {
    out: BufWriter<File>,
    seq: u64,
    connections: HashMap<u16, Connection>,
}

impl BagWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        let mut out = BufWriter::new(file);
        out.write_all(&FileHeader::current().to_bytes())?;
        Ok(Self {
            out,
            seq: 0,
            connections: HashMap::new(),
        })
    }

    /// Declare a topic and return its connection id.
    pub fn add_connection(&mut self, topic: &str, type_name: &str, has_header: bool) -> Result<u16> {
        let id = u16::try_from(self.connections.len())
            .map_err(|_| Error::Corrupt("too many connections"))?;
        let conn = Connection {
            id,
            topic: Arc::from(topic),
            type_name: Arc::from(type_name),
            has_header,
        };
        let payload = conn.encode()?;
        self.append(KIND_CONNECTION, id, 0, &payload)?;
        self.connections.insert(id, conn);
        Ok(id)
    }

    /// Write a message. Connections declared with a header need `header_stamp`.
    pub fn write(
        &mut self,
        conn: u16,
        log_time_ns: u64,
        header_stamp: Option<u64>,
        body: &[u8],
    ) -> Result<()> {
        let has_header = self
            .connections
            .get(&conn)
            .ok_or(Error::Corrupt("unknown connection id"))?
            .has_header;
        let payload = match (has_header, header_stamp) {
            (true, Some(stamp)) => {
                let mut payload = Vec::with_capacity(STAMP_LEN + body.len());
                payload.extend_from_slice(&stamp.to_le_bytes());
                payload.extend_from_slice(body);
                Cow::Owned(payload)
            }
            (true, None) => return Err(Error::Corrupt("connection requires a header stamp")),
            (false, _) => Cow::Borrowed(body),
        };
        self.write_raw(conn, log_time_ns, &payload)
    }

    /// Write a message payload verbatim, bypassing header stamp framing.
    pub fn write_raw(&mut self, conn: u16, log_time_ns: u64, payload: &[u8]) -> Result<()> {
        if !self.connections.contains_key(&conn) {
            return Err(Error::Corrupt("unknown connection id"));
        }
        self.append(KIND_MESSAGE, conn, log_time_ns, payload)
    }

    fn append(&mut self, kind: u8, conn: u16, log_time_ns: u64, payload: &[u8]) -> Result<()> {
        let header = RecordHeader::new(kind, conn, self.seq, log_time_ns, payload)?;
        self.out.write_all(&header.to_bytes())?;
        self.out.write_all(payload)?;
        let pad = record_len(payload.len()) - HEADER_SIZE - payload.len();
        self.out.write_all(&[0u8; RECORD_ALIGN][..pad])?;
        self.seq += 1;
        Ok(())
    }

    /// Flush buffered records and sync the file.
    pub fn finish(mut self) -> Result<()> {
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        Ok(())
    }
}
