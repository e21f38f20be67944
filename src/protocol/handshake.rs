//! Server side of the simple RTMP handshake
//!
//! ```text
//! publisher                        bridge
//!   |---- C0 (version) + C1 ------->|
//!   |<--- S0 + S1 + S2 (echo C1) ---|
//!   |---- C2 (echo S1) ------------>|
//! ```
//!
//! No HMAC digest is generated or checked. Publishers that attempt the
//! digest variant still complete because nothing in C1 or C2 is verified.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{HandshakeError, Result};
use crate::protocol::constants::{HANDSHAKE_SIZE, RTMP_VERSION};

/// Progress of the handshake as seen by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// Waiting for C0 + C1
    AwaitingC0C1,
    /// S0S1S2 sent, waiting for C2
    AwaitingC2,
    Done,
}

/// Server handshake state machine, fed from the connection read buffer
#[derive(Debug)]
pub struct ServerHandshake {
    phase: HandshakePhase,
    epoch_ms: u32,
}

impl Default for ServerHandshake {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerHandshake {
    pub fn new() -> Self {
        Self {
            phase: HandshakePhase::AwaitingC0C1,
            epoch_ms: now_ms(),
        }
    }

    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == HandshakePhase::Done
    }

    /// Bytes that must be buffered before [`process`](Self::process) can advance
    pub fn bytes_needed(&self) -> usize {
        match self.phase {
            HandshakePhase::AwaitingC0C1 => 1 + HANDSHAKE_SIZE,
            HandshakePhase::AwaitingC2 => HANDSHAKE_SIZE,
            HandshakePhase::Done => 0,
        }
    }

    /// Consume handshake bytes from `data`.
    ///
    /// Returns the bytes to write back, if any. Leaves `data` untouched while
    /// not enough has arrived; anything past C2 stays in `data` as the first
    /// chunk bytes.
    pub fn process(&mut self, data: &mut BytesMut) -> Result<Option<Bytes>> {
        if data.len() < self.bytes_needed() {
            return Ok(None);
        }

        match self.phase {
            HandshakePhase::AwaitingC0C1 => {
                let version = data.get_u8();
                // Versions above 3 appear from some encoders and are harmless
                if version < RTMP_VERSION {
                    return Err(HandshakeError::InvalidVersion(version).into());
                }

                let c1 = data.split_to(HANDSHAKE_SIZE);

                let mut reply = BytesMut::with_capacity(1 + HANDSHAKE_SIZE * 2);
                reply.put_u8(RTMP_VERSION);
                write_s1(&mut reply, self.epoch_ms);
                write_echo(&mut reply, &c1, now_ms().wrapping_sub(self.epoch_ms));

                self.phase = HandshakePhase::AwaitingC2;
                Ok(Some(reply.freeze()))
            }
            HandshakePhase::AwaitingC2 => {
                data.advance(HANDSHAKE_SIZE);
                self.phase = HandshakePhase::Done;
                Ok(None)
            }
            HandshakePhase::Done => Ok(None),
        }
    }
}

fn now_ms() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}

/// S1: time, four zero bytes, filler
fn write_s1(out: &mut BytesMut, time: u32) {
    out.put_u32(time);
    out.put_u32(0);

    // Filler only needs to be non-constant, not unpredictable
    let mut state = u64::from(time) | 1;
    let mut remaining = HANDSHAKE_SIZE - 8;
    while remaining > 0 {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let word = state.to_be_bytes();
        let n = remaining.min(word.len());
        out.put_slice(&word[..n]);
        remaining -= n;
    }
}

/// S2: the peer's C1 with bytes 4..8 replaced by our read time
fn write_echo(out: &mut BytesMut, peer: &[u8], read_time: u32) {
    out.put_slice(&peer[..4]);
    out.put_u32(read_time);
    out.put_slice(&peer[8..HANDSHAKE_SIZE]);
}
