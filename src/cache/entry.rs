//! Binary layout of a cached response.
//!
//! ```text
//! magic u32 | version u16 | insert_ms i64
//! implicit_ttl_ms i64 | cache_html u8
//! status u16 | major u8 | minor u8 | reason (u32 len + bytes)
//! header count u32 | (u32 len + name, u32 len + value)*
//! body (u32 len + bytes)
//! crc32 u32 over everything above
//! ```
//! All integers are little endian.

use crate::http::ResponseHeaders;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use std::io::{Cursor, Read};

pub const MAGIC: u32 = 0x4146_4345; // "AFCE"
pub const VERSION: u16 = 1;

const LEN_WEIGHT: usize = 4;
const FIXED_PREFIX: usize = 4 + 2 + 8 + 8 + 1 + 2 + 1 + 1;
const CRC_WEIGHT: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntryError {
    #[error("entry too short ({0} bytes)")]
    Truncated(usize),
    #[error("bad magic {0:#x}")]
    BadMagic(u32),
    #[error("unsupported entry version {0}")]
    UnsupportedVersion(u16),
    #[error("checksum mismatch")]
    Checksum,
    #[error("corrupted {0} section")]
    Corrupted(&'static str),
}

/// A stored response: headers, body and the wall time it was written at.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub headers: ResponseHeaders,
    pub body: Bytes,
    pub insert_ms: i64,
}

impl CacheEntry {
    pub fn new(headers: ResponseHeaders, body: Bytes, insert_ms: i64) -> Self {
        Self {
            headers,
            body,
            insert_ms,
        }
    }

    pub fn encoded_len(&self) -> usize {
        let mut n = FIXED_PREFIX + LEN_WEIGHT + self.headers.reason().len() + LEN_WEIGHT;
        for (k, v) in self.headers.headers().iter() {
            n += LEN_WEIGHT + k.len() + LEN_WEIGHT + v.len();
        }
        n + LEN_WEIGHT + self.body.len() + CRC_WEIGHT
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = Vec::with_capacity(self.encoded_len());
        // Writes into a Vec cannot fail.
        let _ = self.write_into(&mut buf);
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Bytes::from(buf)
    }

    fn write_into(&self, buf: &mut Vec<u8>) -> std::io::Result<()> {
        let h = &self.headers;
        let (major, minor) = h.version();
        buf.write_u32::<LittleEndian>(MAGIC)?;
        buf.write_u16::<LittleEndian>(VERSION)?;
        buf.write_i64::<LittleEndian>(self.insert_ms)?;
        buf.write_i64::<LittleEndian>(h.implicit_cache_ttl_ms())?;
        buf.write_u8(h.cache_html_by_default() as u8)?;
        buf.write_u16::<LittleEndian>(h.status())?;
        buf.write_u8(major)?;
        buf.write_u8(minor)?;
        put_bytes(buf, h.reason().as_bytes());
        buf.write_u32::<LittleEndian>(h.headers().len() as u32)?;
        for (k, v) in h.headers().iter() {
            put_bytes(buf, k.as_bytes());
            put_bytes(buf, v.as_bytes());
        }
        put_bytes(buf, &self.body);
        Ok(())
    }

    pub fn decode(data: &[u8]) -> Result<Self, EntryError> {
        if data.len() < FIXED_PREFIX + CRC_WEIGHT {
            return Err(EntryError::Truncated(data.len()));
        }
        let (payload, crc) = data.split_at(data.len() - CRC_WEIGHT);
        let mut cur = Cursor::new(payload);

        let magic = read(&mut cur, "prefix", |c| c.read_u32::<LittleEndian>())?;
        if magic != MAGIC {
            return Err(EntryError::BadMagic(magic));
        }
        let version = read(&mut cur, "prefix", |c| c.read_u16::<LittleEndian>())?;
        if version != VERSION {
            return Err(EntryError::UnsupportedVersion(version));
        }
        let expected = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
        if crc32fast::hash(payload) != expected {
            return Err(EntryError::Checksum);
        }

        let insert_ms = read(&mut cur, "prefix", |c| c.read_i64::<LittleEndian>())?;
        let implicit_ttl_ms = read(&mut cur, "prefix", |c| c.read_i64::<LittleEndian>())?;
        let cache_html = read(&mut cur, "prefix", |c| c.read_u8())? != 0;
        let status = read(&mut cur, "status", |c| c.read_u16::<LittleEndian>())?;
        let major = read(&mut cur, "status", |c| c.read_u8())?;
        let minor = read(&mut cur, "status", |c| c.read_u8())?;
        let reason = take_string(&mut cur, "status")?;

        let mut headers = ResponseHeaders::new();
        headers.set_caching_policy(implicit_ttl_ms, cache_html);
        headers.set_version(major, minor);
        headers.set_status_and_reason(status, &reason);
        let count = read(&mut cur, "headers", |c| c.read_u32::<LittleEndian>())?;
        for _ in 0..count {
            let k = take_string(&mut cur, "headers")?;
            let v = take_string(&mut cur, "headers")?;
            headers.add(k, v);
        }
        let body = take_bytes(&mut cur, "body")?;
        if cur.position() as usize != payload.len() {
            return Err(EntryError::Corrupted("trailer"));
        }
        Ok(Self {
            headers,
            body: Bytes::from(body),
            insert_ms,
        })
    }
}

fn put_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
    buf.extend_from_slice(data);
}

fn read<T>(
    cur: &mut Cursor<&[u8]>,
    section: &'static str,
    f: impl FnOnce(&mut Cursor<&[u8]>) -> std::io::Result<T>,
) -> Result<T, EntryError> {
    f(cur).map_err(|_| EntryError::Corrupted(section))
}

fn take_bytes(cur: &mut Cursor<&[u8]>, section: &'static str) -> Result<Vec<u8>, EntryError> {
    let len = read(cur, section, |c| c.read_u32::<LittleEndian>())? as usize;
    let remaining = cur.get_ref().len() - cur.position() as usize;
    if len > remaining {
        return Err(EntryError::Corrupted(section));
    }
    let mut out = vec![0u8; len];
    cur.read_exact(&mut out)
        .map_err(|_| EntryError::Corrupted(section))?;
    Ok(out)
}

fn take_string(cur: &mut Cursor<&[u8]>, section: &'static str) -> Result<String, EntryError> {
    String::from_utf8(take_bytes(cur, section)?).map_err(|_| EntryError::Corrupted(section))
}
