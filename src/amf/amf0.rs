//! AMF0 encoder and decoder
//!
//! Type markers handled:
//! ```text
//! 0x00 Number      0x05 Null          0x0A Strict Array
//! 0x01 Boolean     0x06 Undefined     0x0B Date
//! 0x02 String      0x08 ECMA Array    0x0C Long String
//! 0x03 Object      0x09 Object End    0x0D Unsupported
//! ```
//!
//! References, typed objects, XML and AVM+ switches never show up in the
//! publish-side command flow and are rejected.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use super::value::AmfValue;
use crate::error::AmfError;

const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_UNDEFINED: u8 = 0x06;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_STRICT_ARRAY: u8 = 0x0A;
const MARKER_DATE: u8 = 0x0B;
const MARKER_LONG_STRING: u8 = 0x0C;
const MARKER_UNSUPPORTED: u8 = 0x0D;

/// Maximum nesting depth for objects/arrays
const MAX_NESTING_DEPTH: usize = 64;

/// AMF0 decoder
#[derive(Debug, Default)]
pub struct Amf0Decoder {
    depth: usize,
}

impl Amf0Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a single value from the front of `buf`
    pub fn decode(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if !buf.has_remaining() {
            return Err(AmfError::UnexpectedEof);
        }

        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            self.depth -= 1;
            return Err(AmfError::NestingTooDeep);
        }

        let marker = buf.get_u8();
        let result = self.decode_value(marker, buf);
        self.depth -= 1;
        result
    }

    /// Decode values until the buffer is exhausted
    pub fn decode_all(&mut self, buf: &mut Bytes) -> Result<Vec<AmfValue>, AmfError> {
        let mut values = Vec::new();
        while buf.has_remaining() {
            values.push(self.decode(buf)?);
        }
        Ok(values)
    }

    fn decode_value(&mut self, marker: u8, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        match marker {
            MARKER_NUMBER => {
                ensure(buf, 8)?;
                Ok(AmfValue::Number(buf.get_f64()))
            }
            MARKER_BOOLEAN => {
                ensure(buf, 1)?;
                Ok(AmfValue::Boolean(buf.get_u8() != 0))
            }
            MARKER_STRING => Ok(AmfValue::String(read_utf8(buf)?)),
            MARKER_LONG_STRING => {
                ensure(buf, 4)?;
                let len = buf.get_u32() as usize;
                Ok(AmfValue::String(read_utf8_bytes(buf, len)?))
            }
            MARKER_OBJECT => Ok(AmfValue::Object(self.decode_properties(buf)?)),
            MARKER_ECMA_ARRAY => {
                // Count is advisory only; encoders get it wrong often enough
                ensure(buf, 4)?;
                let _count = buf.get_u32();
                Ok(AmfValue::EcmaArray(self.decode_properties(buf)?))
            }
            MARKER_STRICT_ARRAY => {
                ensure(buf, 4)?;
                let count = buf.get_u32() as usize;
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    items.push(self.decode(buf)?);
                }
                Ok(AmfValue::Array(items))
            }
            MARKER_DATE => {
                ensure(buf, 10)?;
                let millis = buf.get_f64();
                let _timezone = buf.get_i16();
                Ok(AmfValue::Date(millis))
            }
            MARKER_NULL => Ok(AmfValue::Null),
            MARKER_UNDEFINED | MARKER_UNSUPPORTED => Ok(AmfValue::Undefined),
            other => Err(AmfError::UnknownMarker(other)),
        }
    }

    /// Key/value pairs up to the `00 00 09` terminator.
    ///
    /// A buffer that ends before the terminator is accepted; some encoders
    /// drop the end marker on the last object of a command.
    fn decode_properties(&mut self, buf: &mut Bytes) -> Result<HashMap<String, AmfValue>, AmfError> {
        let mut props = HashMap::new();
        loop {
            if buf.remaining() < 2 {
                return Ok(props);
            }
            if buf.remaining() >= 3 && buf[0] == 0 && buf[1] == 0 && buf[2] == MARKER_OBJECT_END {
                buf.advance(3);
                return Ok(props);
            }
            let key = read_utf8(buf)?;
            if key.is_empty() {
                // Empty key without the end marker; consume a stray marker if present
                if buf.has_remaining() && buf[0] == MARKER_OBJECT_END {
                    buf.advance(1);
                }
                return Ok(props);
            }
            let value = self.decode(buf)?;
            props.insert(key, value);
        }
    }
}

fn ensure(buf: &Bytes, n: usize) -> Result<(), AmfError> {
    if buf.remaining() < n {
        Err(AmfError::UnexpectedEof)
    } else {
        Ok(())
    }
}

fn read_utf8(buf: &mut Bytes) -> Result<String, AmfError> {
    ensure(buf, 2)?;
    let len = buf.get_u16() as usize;
    read_utf8_bytes(buf, len)
}

fn read_utf8_bytes(buf: &mut Bytes, len: usize) -> Result<String, AmfError> {
    ensure(buf, len)?;
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| AmfError::InvalidUtf8)
}

/// AMF0 encoder writing into a growable buffer
#[derive(Debug, Default)]
pub struct Amf0Encoder {
    buf: BytesMut,
}

impl Amf0Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the encoded bytes, leaving the encoder empty
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn encode(&mut self, value: &AmfValue) {
        match value {
            AmfValue::Number(n) => {
                self.buf.put_u8(MARKER_NUMBER);
                self.buf.put_f64(*n);
            }
            AmfValue::Boolean(b) => {
                self.buf.put_u8(MARKER_BOOLEAN);
                self.buf.put_u8(u8::from(*b));
            }
            AmfValue::String(s) => {
                if s.len() > u16::MAX as usize {
                    self.buf.put_u8(MARKER_LONG_STRING);
                    self.buf.put_u32(s.len() as u32);
                    self.buf.put_slice(s.as_bytes());
                } else {
                    self.buf.put_u8(MARKER_STRING);
                    self.put_key(s);
                }
            }
            AmfValue::Object(props) => {
                self.buf.put_u8(MARKER_OBJECT);
                self.encode_properties(props);
            }
            AmfValue::EcmaArray(props) => {
                self.buf.put_u8(MARKER_ECMA_ARRAY);
                self.buf.put_u32(props.len() as u32);
                self.encode_properties(props);
            }
            AmfValue::Array(items) => {
                self.buf.put_u8(MARKER_STRICT_ARRAY);
                self.buf.put_u32(items.len() as u32);
                for item in items {
                    self.encode(item);
                }
            }
            AmfValue::Date(millis) => {
                self.buf.put_u8(MARKER_DATE);
                self.buf.put_f64(*millis);
                self.buf.put_i16(0);
            }
            AmfValue::Null => self.buf.put_u8(MARKER_NULL),
            AmfValue::Undefined => self.buf.put_u8(MARKER_UNDEFINED),
        }
    }

    pub fn encode_all(&mut self, values: &[AmfValue]) {
        for value in values {
            self.encode(value);
        }
    }

    fn put_key(&mut self, key: &str) {
        self.buf.put_u16(key.len() as u16);
        self.buf.put_slice(key.as_bytes());
    }

    fn encode_properties(&mut self, props: &HashMap<String, AmfValue>) {
        for (key, value) in props {
            self.put_key(key);
            self.encode(value);
        }
        self.buf.put_slice(&[0x00, 0x00, MARKER_OBJECT_END]);
    }
}

/// Encode a sequence of values
pub fn encode_all(values: &[AmfValue]) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode_all(values);
    encoder.finish()
}

/// Decode every value in `data`
pub fn decode_all(data: Bytes) -> Result<Vec<AmfValue>, AmfError> {
    let mut buf = data;
    Amf0Decoder::new().decode_all(&mut buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amf::value::object;

    #[test]
    fn test_connect_command_roundtrip() {
        let values = vec![
            AmfValue::from("connect"),
            AmfValue::Number(1.0),
            object([
                ("app", AmfValue::from("live")),
                ("tcUrl", AmfValue::from("rtmp://localhost/live")),
                ("fpad", AmfValue::Boolean(false)),
            ]),
        ];

        let decoded = decode_all(encode_all(&values)).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_publish_command_decoding() {
        // publish("key", "live") as sent by ffmpeg, with a null command object
        let bytes = Bytes::from_static(&[
            0x02, 0x00, 0x07, b'p', b'u', b'b', b'l', b'i', b's', b'h', // "publish"
            0x00, 0x40, 0x14, 0, 0, 0, 0, 0, 0, // 5.0
            0x05, // null
            0x02, 0x00, 0x03, b'k', b'e', b'y', // "key"
            0x02, 0x00, 0x04, b'l', b'i', b'v', b'e', // "live"
        ]);

        let values = decode_all(bytes).unwrap();
        assert_eq!(values.len(), 5);
        assert_eq!(values[0].as_str(), Some("publish"));
        assert_eq!(values[1].as_number(), Some(5.0));
        assert!(values[2].is_null_or_undefined());
        assert_eq!(values[3].as_str(), Some("key"));
    }

    #[test]
    fn test_object_without_end_marker() {
        let bytes = Bytes::from_static(&[
            0x03, // object
            0x00, 0x03, b'a', b'p', b'p', 0x02, 0x00, 0x04, b'l', b'i', b'v', b'e',
        ]);
        let values = decode_all(bytes).unwrap();
        assert_eq!(values[0].get_string("app"), Some("live"));
    }

    #[test]
    fn test_ecma_array_and_strict_array() {
        let mut props = HashMap::new();
        props.insert("width".to_string(), AmfValue::Number(1920.0));
        let values = vec![
            AmfValue::EcmaArray(props),
            AmfValue::Array(vec![AmfValue::Boolean(true), AmfValue::Null]),
            AmfValue::Date(1_700_000_000_000.0),
        ];
        assert_eq!(decode_all(encode_all(&values)).unwrap(), values);
    }

    #[test]
    fn test_long_string() {
        let long = "x".repeat(70_000);
        let values = vec![AmfValue::String(long.clone())];
        let encoded = encode_all(&values);
        assert_eq!(encoded[0], MARKER_LONG_STRING);
        assert_eq!(decode_all(encoded).unwrap(), vec![AmfValue::String(long)]);
    }

    #[test]
    fn test_truncated_number() {
        let bytes = Bytes::from_static(&[0x00, 0x40, 0x14]);
        assert_eq!(decode_all(bytes), Err(AmfError::UnexpectedEof));
    }

    #[test]
    fn test_unknown_marker() {
        let bytes = Bytes::from_static(&[0x11]);
        assert_eq!(decode_all(bytes), Err(AmfError::UnknownMarker(0x11)));
    }

    #[test]
    fn test_nesting_limit() {
        let mut raw = Vec::new();
        for _ in 0..(MAX_NESTING_DEPTH + 1) {
            raw.extend_from_slice(&[0x0A, 0x00, 0x00, 0x00, 0x01]);
        }
        raw.push(0x05);
        assert_eq!(decode_all(Bytes::from(raw)), Err(AmfError::NestingTooDeep));
    }
}
