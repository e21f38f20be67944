//! Chunk stream layer
//!
//! Incoming bytes are split into chunks and reassembled into complete
//! messages per chunk stream id. Outgoing messages are cut into chunks of
//! the negotiated outbound size.
//!
//! ```text
//! +-------------+----------------+-------------------+----------------+
//! | Basic (1-3) | Message (0-11) | Extended TS (0/4) | Payload        |
//! +-------------+----------------+-------------------+----------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use crate::error::{ProtocolError, Result};
use crate::protocol::constants::{
    DEFAULT_CHUNK_SIZE, EXTENDED_TIMESTAMP, MAX_CHUNK_SIZE, MAX_MESSAGE_SIZE,
};

/// A fully reassembled message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub csid: u32,
    pub timestamp: u32,
    pub type_id: u8,
    pub stream_id: u32,
    pub payload: Bytes,
}

/// Last header seen on a chunk stream, used to fill in compressed headers
#[derive(Debug, Clone, Default)]
struct ChunkStreamState {
    timestamp: u32,
    delta: u32,
    length: u32,
    type_id: u8,
    stream_id: u32,
    extended: bool,
    partial: BytesMut,
}

/// Reassembles inbound chunks into messages
#[derive(Debug)]
pub struct ChunkDecoder {
    chunk_size: u32,
    streams: HashMap<u32, ChunkStreamState>,
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            streams: HashMap::new(),
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Apply a Set Chunk Size from the peer
    pub fn set_chunk_size(&mut self, size: u32) -> Result<()> {
        if size == 0 || size > MAX_CHUNK_SIZE {
            return Err(ProtocolError::InvalidChunkSize(size).into());
        }
        self.chunk_size = size;
        Ok(())
    }

    /// Drop a partially received message (Abort Message)
    pub fn abort(&mut self, csid: u32) {
        if let Some(state) = self.streams.get_mut(&csid) {
            state.partial.clear();
        }
    }

    /// Decode chunks from `buf` until a message completes or the buffer runs dry.
    ///
    /// Incomplete chunks are left in `buf`.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RawMessage>> {
        loop {
            match self.decode_chunk(buf)? {
                ChunkOutcome::NeedMore => return Ok(None),
                ChunkOutcome::Partial => continue,
                ChunkOutcome::Complete(msg) => return Ok(Some(msg)),
            }
        }
    }

    fn decode_chunk(&mut self, buf: &mut BytesMut) -> Result<ChunkOutcome> {
        let Some((fmt, csid, basic_len)) = parse_basic_header(buf) else {
            return Ok(ChunkOutcome::NeedMore);
        };

        let header_len = match fmt {
            0 => 11,
            1 => 7,
            2 => 3,
            _ => 0,
        };
        if buf.len() < basic_len + header_len {
            return Ok(ChunkOutcome::NeedMore);
        }

        let previous = self.streams.get(&csid);
        if fmt != 0 && previous.is_none() {
            return Err(ProtocolError::UnknownChunkStream(csid).into());
        }

        let h = &buf[basic_len..basic_len + header_len];
        let ts_field = if fmt < 3 { read_u24(&h[0..3]) } else { 0 };
        let extended = match fmt {
            3 => previous.map(|p| p.extended).unwrap_or(false),
            _ => ts_field == EXTENDED_TIMESTAMP,
        };
        let ext_len = if extended { 4 } else { 0 };
        let full_header = basic_len + header_len + ext_len;
        if buf.len() < full_header {
            return Ok(ChunkOutcome::NeedMore);
        }
        let ts_value = if extended {
            let e = &buf[basic_len + header_len..full_header];
            u32::from_be_bytes([e[0], e[1], e[2], e[3]])
        } else {
            ts_field
        };

        // Resolve the full header for this chunk without committing yet
        let received = previous.map(|p| p.partial.len()).unwrap_or(0);
        let (mut timestamp, mut delta, mut length, mut type_id, mut stream_id) = previous
            .map(|p| (p.timestamp, p.delta, p.length, p.type_id, p.stream_id))
            .unwrap_or_default();
        match fmt {
            0 => {
                timestamp = ts_value;
                delta = 0;
                length = read_u24(&h[3..6]);
                type_id = h[6];
                stream_id = u32::from_le_bytes([h[7], h[8], h[9], h[10]]);
            }
            1 => {
                delta = ts_value;
                timestamp = timestamp.wrapping_add(ts_value);
                length = read_u24(&h[3..6]);
                type_id = h[6];
            }
            2 => {
                delta = ts_value;
                timestamp = timestamp.wrapping_add(ts_value);
            }
            _ => {
                if received == 0 {
                    timestamp = timestamp.wrapping_add(delta);
                }
            }
        }

        if length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(length).into());
        }
        if received > length as usize {
            return Err(ProtocolError::LengthMismatch {
                csid,
                length,
                received,
            }
            .into());
        }

        let wanted = (length as usize).saturating_sub(received);
        let take = wanted.min(self.chunk_size as usize);
        if buf.len() < full_header + take {
            return Ok(ChunkOutcome::NeedMore);
        }

        buf.advance(full_header);
        let state = self.streams.entry(csid).or_default();
        state.timestamp = timestamp;
        state.delta = delta;
        state.length = length;
        state.type_id = type_id;
        state.stream_id = stream_id;
        state.extended = extended;
        state.partial.extend_from_slice(&buf.split_to(take));

        if state.partial.len() < length as usize {
            return Ok(ChunkOutcome::Partial);
        }

        Ok(ChunkOutcome::Complete(RawMessage {
            csid,
            timestamp,
            type_id,
            stream_id,
            payload: state.partial.split().freeze(),
        }))
    }
}

enum ChunkOutcome {
    NeedMore,
    Partial,
    Complete(RawMessage),
}

fn parse_basic_header(buf: &[u8]) -> Option<(u8, u32, usize)> {
    let first = *buf.first()?;
    let fmt = first >> 6;
    match first & 0x3F {
        0 => {
            let b1 = *buf.get(1)?;
            Some((fmt, 64 + u32::from(b1), 2))
        }
        1 => {
            let b1 = *buf.get(1)?;
            let b2 = *buf.get(2)?;
            Some((fmt, 64 + u32::from(b1) + u32::from(b2) * 256, 3))
        }
        id => Some((fmt, u32::from(id), 1)),
    }
}

fn read_u24(b: &[u8]) -> u32 {
    (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2])
}

/// Splits outbound messages into chunks
#[derive(Debug)]
pub struct ChunkEncoder {
    chunk_size: u32,
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkEncoder {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Change the outbound chunk size. Call after the Set Chunk Size message
    /// announcing it has been encoded.
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
    }

    /// Encode `msg` as a type 0 chunk followed by type 3 continuations
    pub fn encode(&self, msg: &RawMessage, out: &mut BytesMut) {
        let extended = msg.timestamp >= EXTENDED_TIMESTAMP;
        let ts_field = if extended { EXTENDED_TIMESTAMP } else { msg.timestamp };

        put_basic_header(out, 0, msg.csid);
        put_u24(out, ts_field);
        put_u24(out, msg.payload.len() as u32);
        out.put_u8(msg.type_id);
        out.put_u32_le(msg.stream_id);
        if extended {
            out.put_u32(msg.timestamp);
        }

        let mut chunks = msg.payload.chunks(self.chunk_size as usize);
        if let Some(first) = chunks.next() {
            out.put_slice(first);
        }
        for chunk in chunks {
            put_basic_header(out, 3, msg.csid);
            if extended {
                out.put_u32(msg.timestamp);
            }
            out.put_slice(chunk);
        }
    }
}

fn put_basic_header(out: &mut BytesMut, fmt: u8, csid: u32) {
    let fmt = fmt << 6;
    match csid {
        2..=63 => out.put_u8(fmt | csid as u8),
        64..=319 => {
            out.put_u8(fmt);
            out.put_u8((csid - 64) as u8);
        }
        _ => {
            let id = csid.saturating_sub(64);
            out.put_u8(fmt | 1);
            out.put_u8((id & 0xFF) as u8);
            out.put_u8(((id >> 8) & 0xFF) as u8);
        }
    }
}

fn put_u24(out: &mut BytesMut, v: u32) {
    out.put_u8((v >> 16) as u8);
    out.put_u8((v >> 8) as u8);
    out.put_u8(v as u8);
}
