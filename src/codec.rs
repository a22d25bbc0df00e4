//! Binary key/value encoding used by the file store.
//!
//! # Layout
//!
//! The stream is a plain concatenation of records, with no header, count or
//! checksum. Each record is:
//!
//! ```text
//! [u16 LE key length][key bytes][u16 LE value length][value bytes]
//! ```
//!
//! End of stream is end of map. Keys and values are opaque bytes and must each
//! fit in 65535 bytes; longer ones are rejected on encode instead of being
//! truncated.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use thiserror::Error;

/// Decoded store contents, keyed and valued by raw bytes.
pub type RawMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// Largest key or value the 16-bit length prefix can describe.
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("{field} is {len} bytes long, at most {MAX_FIELD_LEN} are allowed")]
    TooLong { field: &'static str, len: usize },

    #[error("record truncated while reading {0}")]
    Truncated(&'static str),

    #[error("i/o error")]
    Io(#[from] io::Error),
}

/// Encode `map` into a fresh buffer.
///
/// Lengths are all checked before anything is produced, so a failing encode
/// never leaves a half-written buffer behind.
pub fn encode_to_vec(map: &RawMap) -> Result<Vec<u8>, CodecError> {
    let mut size = 0;
    for (key, value) in map {
        check_len("key", key)?;
        check_len("value", value)?;
        size += 4 + key.len() + value.len();
    }

    let mut buf = Vec::with_capacity(size);
    encode(&mut buf, map)?;
    Ok(buf)
}

/// Encode `map` into `writer`, records sorted by key.
pub fn encode<W: Write>(mut writer: W, map: &RawMap) -> Result<(), CodecError> {
    for (key, value) in map {
        write_field(&mut writer, "key", key)?;
        write_field(&mut writer, "value", value)?;
    }
    Ok(())
}

/// Decode every record from `reader` until end of stream.
///
/// An empty stream is an empty map. A stream that ends in the middle of a
/// record is an error.
pub fn decode<R: Read>(mut reader: R) -> Result<RawMap, CodecError> {
    let mut map = RawMap::new();

    loop {
        let key_len = match read_len(&mut reader)? {
            Some(len) => len,
            None => break,
        };
        let key = read_bytes(&mut reader, key_len, "key")?;

        let value_len = read_len(&mut reader)?.ok_or(CodecError::Truncated("value length"))?;
        let value = read_bytes(&mut reader, value_len, "value")?;

        map.insert(key, value);
    }

    Ok(map)
}

fn check_len(field: &'static str, bytes: &[u8]) -> Result<u16, CodecError> {
    u16::try_from(bytes.len()).map_err(|_| CodecError::TooLong {
        field,
        len: bytes.len(),
    })
}

fn write_field<W: Write>(writer: &mut W, field: &'static str, bytes: &[u8]) -> Result<(), CodecError> {
    let len = check_len(field, bytes)?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(bytes)?;
    Ok(())
}

/// Read a length prefix; `None` on a clean end of stream.
fn read_len<R: Read>(reader: &mut R) -> Result<Option<usize>, CodecError> {
    let mut buf = [0u8; 2];
    match fill(reader, &mut buf)? {
        0 => Ok(None),
        2 => Ok(Some(u16::from_le_bytes(buf) as usize)),
        _ => Err(CodecError::Truncated("length prefix")),
    }
}

fn read_bytes<R: Read>(reader: &mut R, len: usize, field: &'static str) -> Result<Vec<u8>, CodecError> {
    let mut buf = vec![0u8; len];
    if fill(reader, &mut buf)? != len {
        return Err(CodecError::Truncated(field));
    }
    Ok(buf)
}

/// Like `read_exact`, but reports how many bytes were read before EOF.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match reader.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(read)
}
