//! Binary document codec.
//!
//! One type byte per value, little-endian scalars, length-prefixed UTF-8
//! strings, `u32` element counts for documents and arrays. The same value
//! encoding is reused verbatim for index keys inside index pages.

use crate::config::MAX_DOCUMENT_DEPTH;
use crate::error::{Error, Result};

use super::document::Document;
use super::objectid::ObjectId;
use super::value::Value;

const TAG_MIN_KEY: u8 = 0x00;
const TAG_NULL: u8 = 0x01;
const TAG_INT32: u8 = 0x02;
const TAG_INT64: u8 = 0x03;
const TAG_DOUBLE: u8 = 0x04;
const TAG_STRING: u8 = 0x05;
const TAG_DOCUMENT: u8 = 0x06;
const TAG_ARRAY: u8 = 0x07;
const TAG_BINARY: u8 = 0x08;
const TAG_OBJECT_ID: u8 = 0x09;
const TAG_GUID: u8 = 0x0A;
const TAG_BOOL: u8 = 0x0B;
const TAG_DATETIME: u8 = 0x0C;
const TAG_MAX_KEY: u8 = 0x0D;

/// Serializes a document to bytes.
pub fn encode_document(doc: &Document) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(64);
    write_document(&mut buf, doc, 0)?;
    Ok(buf)
}

/// Deserializes a document from bytes produced by [`encode_document`].
pub fn decode_document(bytes: &[u8]) -> Result<Document> {
    let mut reader = ByteReader::new(bytes);
    let doc = read_document(&mut reader, 0)?;
    if !reader.is_at_end() {
        return Err(Error::InvalidFormat(format!(
            "{} trailing bytes after document",
            reader.remaining()
        )));
    }
    Ok(doc)
}

/// Serializes a single value (type byte included). Index keys are stored
/// with this encoding.
pub(crate) fn write_value(buf: &mut Vec<u8>, value: &Value, depth: usize) -> Result<()> {
    if depth > MAX_DOCUMENT_DEPTH {
        return Err(Error::DocumentMaxDepth(MAX_DOCUMENT_DEPTH));
    }

    match value {
        Value::MinKey => buf.push(TAG_MIN_KEY),
        Value::Null => buf.push(TAG_NULL),
        Value::Int32(i) => {
            buf.push(TAG_INT32);
            buf.extend_from_slice(&i.to_le_bytes());
        }
        Value::Int64(i) => {
            buf.push(TAG_INT64);
            buf.extend_from_slice(&i.to_le_bytes());
        }
        Value::Double(d) => {
            buf.push(TAG_DOUBLE);
            buf.extend_from_slice(&d.to_le_bytes());
        }
        Value::String(s) => {
            buf.push(TAG_STRING);
            write_string(buf, s);
        }
        Value::Document(doc) => {
            buf.push(TAG_DOCUMENT);
            write_document_body(buf, doc, depth + 1)?;
        }
        Value::Array(items) => {
            buf.push(TAG_ARRAY);
            buf.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                write_value(buf, item, depth + 1)?;
            }
        }
        Value::Binary(bytes) => {
            buf.push(TAG_BINARY);
            buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            buf.extend_from_slice(bytes);
        }
        Value::ObjectId(oid) => {
            buf.push(TAG_OBJECT_ID);
            buf.extend_from_slice(oid.bytes());
        }
        Value::Guid(g) => {
            buf.push(TAG_GUID);
            buf.extend_from_slice(g);
        }
        Value::Bool(b) => {
            buf.push(TAG_BOOL);
            buf.push(*b as u8);
        }
        Value::DateTime(ms) => {
            buf.push(TAG_DATETIME);
            buf.extend_from_slice(&ms.to_le_bytes());
        }
        Value::MaxKey => buf.push(TAG_MAX_KEY),
    }
    Ok(())
}

/// Deserializes a single value (type byte first).
pub(crate) fn read_value(reader: &mut ByteReader<'_>, depth: usize) -> Result<Value> {
    if depth > MAX_DOCUMENT_DEPTH {
        return Err(Error::DocumentMaxDepth(MAX_DOCUMENT_DEPTH));
    }

    let tag = reader.read_u8()?;
    let value = match tag {
        TAG_MIN_KEY => Value::MinKey,
        TAG_NULL => Value::Null,
        TAG_INT32 => Value::Int32(reader.read_i32()?),
        TAG_INT64 => Value::Int64(reader.read_i64()?),
        TAG_DOUBLE => Value::Double(f64::from_le_bytes(reader.read_array::<8>()?)),
        TAG_STRING => Value::String(reader.read_string()?),
        TAG_DOCUMENT => Value::Document(read_document_body(reader, depth + 1)?),
        TAG_ARRAY => {
            let count = reader.read_u32()? as usize;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(read_value(reader, depth + 1)?);
            }
            Value::Array(items)
        }
        TAG_BINARY => {
            let len = reader.read_u32()? as usize;
            Value::Binary(reader.read_bytes(len)?.to_vec())
        }
        TAG_OBJECT_ID => Value::ObjectId(ObjectId::from_bytes(reader.read_array::<12>()?)),
        TAG_GUID => Value::Guid(reader.read_array::<16>()?),
        TAG_BOOL => Value::Bool(reader.read_u8()? != 0),
        TAG_DATETIME => Value::DateTime(reader.read_i64()?),
        TAG_MAX_KEY => Value::MaxKey,
        other => {
            return Err(Error::InvalidFormat(format!(
                "unknown value tag 0x{:02x}",
                other
            )))
        }
    };
    Ok(value)
}

fn write_document(buf: &mut Vec<u8>, doc: &Document, depth: usize) -> Result<()> {
    buf.push(TAG_DOCUMENT);
    write_document_body(buf, doc, depth + 1)
}

fn write_document_body(buf: &mut Vec<u8>, doc: &Document, depth: usize) -> Result<()> {
    buf.extend_from_slice(&(doc.len() as u32).to_le_bytes());
    for (name, value) in doc.iter() {
        write_string(buf, name);
        write_value(buf, value, depth)?;
    }
    Ok(())
}

fn read_document(reader: &mut ByteReader<'_>, depth: usize) -> Result<Document> {
    let tag = reader.read_u8()?;
    if tag != TAG_DOCUMENT {
        return Err(Error::InvalidFormat(format!(
            "expected document tag, found 0x{:02x}",
            tag
        )));
    }
    read_document_body(reader, depth + 1)
}

fn read_document_body(reader: &mut ByteReader<'_>, depth: usize) -> Result<Document> {
    if depth > MAX_DOCUMENT_DEPTH {
        return Err(Error::DocumentMaxDepth(MAX_DOCUMENT_DEPTH));
    }

    let count = reader.read_u32()? as usize;
    let mut doc = Document::new();
    for _ in 0..count {
        let name = reader.read_string()?;
        let value = read_value(reader, depth)?;
        doc.insert(name, value);
    }
    Ok(doc)
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

/// Position-tracking reader over a byte slice. Truncation surfaces as
/// `InvalidFormat` rather than a panic.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos == self.data.len()
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::InvalidFormat(format!(
                "truncated buffer: need {} bytes, have {}",
                len,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array::<2>()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array::<4>()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array::<4>()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array::<8>()?))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 in string: {}", e)))
    }
}
