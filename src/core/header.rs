use crate::core::{Error, Result};

pub const FILE_MAGIC: [u8; 8] = *b"BAGMGR1\0";
pub const FILE_VERSION: u32 = 1;
pub const FILE_HEADER_SIZE: usize = 64;

pub const HEADER_SIZE: usize = 64;
pub const RECORD_ALIGN: usize = 64;
pub const MAX_PAYLOAD_LEN: usize = u32::MAX as usize - 1;

pub const PAYLOAD_LEN_OFFSET: usize = 0;
pub const CRC_OFFSET: usize = 4;
pub const SEQ_OFFSET: usize = 8;
pub const LOG_TIME_OFFSET: usize = 16;
pub const CONN_ID_OFFSET: usize = 24;
pub const KIND_OFFSET: usize = 26;
pub const FLAGS_OFFSET: usize = 27;

pub const KIND_CONNECTION: u8 = 1;
pub const KIND_MESSAGE: u8 = 2;

/// Aligns a value up to the nearest multiple of `align`.
#[inline]
pub fn align_up(val: usize, align: usize) -> usize {
    (val + align - 1) & !(align - 1)
}

/// Bytes a record with `payload_len` occupies on disk, header included.
#[inline]
pub fn record_len(payload_len: usize) -> usize {
    align_up(HEADER_SIZE + payload_len, RECORD_ALIGN)
}

#[inline]
fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    let mut buf = [0u8; 2];
    buf.copy_from_slice(&bytes[offset..offset + 2]);
    u16::from_le_bytes(buf)
}

#[inline]
fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

#[inline]
fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

/// Leading block of every bag file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u32,
}

impl FileHeader {
    pub fn current() -> Self {
        Self {
            version: FILE_VERSION,
        }
    }

    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        buf[0..8].copy_from_slice(&FILE_MAGIC);
        buf[8..12].copy_from_slice(&self.version.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FILE_HEADER_SIZE {
            return Err(Error::Corrupt("file shorter than bag header"));
        }
        if bytes[0..8] != FILE_MAGIC {
            return Err(Error::Corrupt("bad bag magic"));
        }
        let version = read_u32(bytes, 8);
        if version != FILE_VERSION {
            return Err(Error::Corrupt("unsupported bag version"));
        }
        Ok(Self { version })
    }
}

/// Fixed-size header in front of every record payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    pub payload_len: u32,
    pub crc32: u32,
    pub seq: u64,
    pub log_time_ns: u64,
    pub conn_id: u16,
    pub kind: u8,
    pub flags: u8,
}

impl RecordHeader {
    pub fn new(kind: u8, conn_id: u16, seq: u64, log_time_ns: u64, payload: &[u8]) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::Corrupt("payload too large"));
        }
        Ok(Self {
            payload_len: payload.len() as u32,
            crc32: Self::crc32(payload),
            seq,
            log_time_ns,
            conn_id,
            kind,
            flags: 0,
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[PAYLOAD_LEN_OFFSET..PAYLOAD_LEN_OFFSET + 4]
            .copy_from_slice(&self.payload_len.to_le_bytes());
        buf[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&self.crc32.to_le_bytes());
        buf[SEQ_OFFSET..SEQ_OFFSET + 8].copy_from_slice(&self.seq.to_le_bytes());
        buf[LOG_TIME_OFFSET..LOG_TIME_OFFSET + 8].copy_from_slice(&self.log_time_ns.to_le_bytes());
        buf[CONN_ID_OFFSET..CONN_ID_OFFSET + 2].copy_from_slice(&self.conn_id.to_le_bytes());
        buf[KIND_OFFSET] = self.kind;
        buf[FLAGS_OFFSET] = self.flags;
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::Corrupt("truncated record header"));
        }
        let header = Self {
            payload_len: read_u32(bytes, PAYLOAD_LEN_OFFSET),
            crc32: read_u32(bytes, CRC_OFFSET),
            seq: read_u64(bytes, SEQ_OFFSET),
            log_time_ns: read_u64(bytes, LOG_TIME_OFFSET),
            conn_id: read_u16(bytes, CONN_ID_OFFSET),
            kind: bytes[KIND_OFFSET],
            flags: bytes[FLAGS_OFFSET],
        };
        match header.kind {
            KIND_CONNECTION | KIND_MESSAGE => Ok(header),
            _ => Err(Error::Corrupt("unknown record kind")),
        }
    }

    pub fn crc32(payload: &[u8]) -> u32 {
        use crc32fast::Hasher;
        let mut hasher = Hasher::new();
        hasher.update(payload);
        hasher.finalize()
    }

    pub fn validate_crc(&self, payload: &[u8]) -> Result<()> {
        if Self::crc32(payload) == self.crc32 {
            Ok(())
        } else {
            Err(Error::Corrupt("crc mismatch"))
        }
    }
}
