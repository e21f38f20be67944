//! RTMP messages
//!
//! Interprets reassembled [`RawMessage`]s and builds the server's replies.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::amf::{amf0, value::object, AmfValue};
use crate::error::{ProtocolError, Result};
use crate::protocol::chunk::RawMessage;
use crate::protocol::constants::*;

/// Decoded message
#[derive(Debug, Clone, PartialEq)]
pub enum RtmpMessage {
    SetChunkSize(u32),
    Abort { csid: u32 },
    Acknowledgement { sequence: u32 },
    UserControl { event: u16, data: Bytes },
    WindowAckSize(u32),
    SetPeerBandwidth { size: u32, limit: u8 },
    Audio { timestamp: u32, payload: Bytes },
    Video { timestamp: u32, payload: Bytes },
    Command(Command),
    Data(Vec<AmfValue>),
    Unknown { type_id: u8, payload: Bytes },
}

/// AMF command message
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub transaction_id: f64,
    pub command_object: AmfValue,
    pub arguments: Vec<AmfValue>,
    pub stream_id: u32,
}

impl RtmpMessage {
    pub fn from_raw(raw: RawMessage) -> Result<Self> {
        let mut payload = raw.payload;
        let msg = match raw.type_id {
            MSG_SET_CHUNK_SIZE => {
                let size = read_u32(&mut payload, "set chunk size")?;
                // High bit is reserved
                RtmpMessage::SetChunkSize(size & 0x7FFF_FFFF)
            }
            MSG_ABORT => RtmpMessage::Abort {
                csid: read_u32(&mut payload, "abort")?,
            },
            MSG_ACKNOWLEDGEMENT => RtmpMessage::Acknowledgement {
                sequence: read_u32(&mut payload, "acknowledgement")?,
            },
            MSG_USER_CONTROL => {
                if payload.len() < 2 {
                    return Err(ProtocolError::MalformedMessage("user control").into());
                }
                let event = payload.get_u16();
                RtmpMessage::UserControl { event, data: payload }
            }
            MSG_WINDOW_ACK_SIZE => {
                RtmpMessage::WindowAckSize(read_u32(&mut payload, "window ack size")?)
            }
            MSG_SET_PEER_BANDWIDTH => {
                let size = read_u32(&mut payload, "set peer bandwidth")?;
                let limit = if payload.has_remaining() {
                    payload.get_u8()
                } else {
                    BANDWIDTH_LIMIT_DYNAMIC
                };
                RtmpMessage::SetPeerBandwidth { size, limit }
            }
            MSG_AUDIO => RtmpMessage::Audio {
                timestamp: raw.timestamp,
                payload,
            },
            MSG_VIDEO => RtmpMessage::Video {
                timestamp: raw.timestamp,
                payload,
            },
            MSG_COMMAND_AMF0 => RtmpMessage::Command(Command::decode(payload, raw.stream_id)?),
            MSG_COMMAND_AMF3 => {
                // AMF3 commands carry an AMF0 body behind a format selector byte
                if payload.has_remaining() {
                    payload.advance(1);
                }
                RtmpMessage::Command(Command::decode(payload, raw.stream_id)?)
            }
            MSG_DATA_AMF0 => RtmpMessage::Data(amf0::decode_all(payload)?),
            MSG_DATA_AMF3 => {
                if payload.has_remaining() {
                    payload.advance(1);
                }
                RtmpMessage::Data(amf0::decode_all(payload)?)
            }
            type_id => RtmpMessage::Unknown { type_id, payload },
        };
        Ok(msg)
    }
}

fn read_u32(payload: &mut Bytes, what: &'static str) -> Result<u32> {
    if payload.len() < 4 {
        return Err(ProtocolError::MalformedMessage(what).into());
    }
    Ok(payload.get_u32())
}

impl Command {
    fn decode(payload: Bytes, stream_id: u32) -> Result<Self> {
        let mut values = amf0::decode_all(payload)?.into_iter();

        let name = match values.next() {
            Some(AmfValue::String(name)) => name,
            other => {
                return Err(ProtocolError::InvalidCommand(format!(
                    "expected command name, got {:?}",
                    other
                ))
                .into())
            }
        };
        let transaction_id = values.next().and_then(|v| v.as_number()).unwrap_or(0.0);
        let command_object = values.next().unwrap_or(AmfValue::Null);

        Ok(Command {
            name,
            transaction_id,
            command_object,
            arguments: values.collect(),
            stream_id,
        })
    }

    /// Encode as a type 20 message
    pub fn into_raw(self, csid: u32) -> RawMessage {
        let mut values = Vec::with_capacity(3 + self.arguments.len());
        values.push(AmfValue::String(self.name));
        values.push(AmfValue::Number(self.transaction_id));
        values.push(self.command_object);
        values.extend(self.arguments);

        RawMessage {
            csid,
            timestamp: 0,
            type_id: MSG_COMMAND_AMF0,
            stream_id: self.stream_id,
            payload: amf0::encode_all(&values),
        }
    }
}

/// Parameters of a `connect` command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectParams {
    pub app: String,
    pub tc_url: Option<String>,
    pub flash_ver: Option<String>,
    pub object_encoding: f64,
}

impl ConnectParams {
    pub fn from_command(cmd: &Command) -> Self {
        let obj = &cmd.command_object;
        Self {
            app: obj.get_string("app").unwrap_or_default().to_string(),
            tc_url: obj.get_string("tcUrl").map(str::to_string),
            flash_ver: obj.get_string("flashVer").map(str::to_string),
            object_encoding: obj.get_number("objectEncoding").unwrap_or(0.0),
        }
    }
}

/// Parameters of a `publish` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishParams {
    pub stream_name: String,
    pub publish_type: String,
    pub stream_id: u32,
}

impl PublishParams {
    /// `publish(name, type)`; a missing name is reported as empty
    pub fn from_command(cmd: &Command) -> Self {
        let stream_name = cmd
            .arguments
            .first()
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let publish_type = cmd
            .arguments
            .get(1)
            .and_then(|v| v.as_str())
            .unwrap_or("live")
            .to_string();
        Self {
            stream_name,
            publish_type,
            stream_id: cmd.stream_id,
        }
    }
}

fn control(type_id: u8, payload: Bytes) -> RawMessage {
    RawMessage {
        csid: CSID_PROTOCOL_CONTROL,
        timestamp: 0,
        type_id,
        stream_id: 0,
        payload,
    }
}

pub fn set_chunk_size(size: u32) -> RawMessage {
    control(MSG_SET_CHUNK_SIZE, Bytes::copy_from_slice(&size.to_be_bytes()))
}

pub fn window_ack_size(size: u32) -> RawMessage {
    control(MSG_WINDOW_ACK_SIZE, Bytes::copy_from_slice(&size.to_be_bytes()))
}

pub fn set_peer_bandwidth(size: u32, limit: u8) -> RawMessage {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u32(size);
    buf.put_u8(limit);
    control(MSG_SET_PEER_BANDWIDTH, buf.freeze())
}

pub fn acknowledgement(sequence: u32) -> RawMessage {
    control(MSG_ACKNOWLEDGEMENT, Bytes::copy_from_slice(&sequence.to_be_bytes()))
}

pub fn stream_begin(stream_id: u32) -> RawMessage {
    let mut buf = BytesMut::with_capacity(6);
    buf.put_u16(UC_STREAM_BEGIN);
    buf.put_u32(stream_id);
    control(MSG_USER_CONTROL, buf.freeze())
}

/// `_result` for `connect`
pub fn connect_result(transaction_id: f64) -> RawMessage {
    Command {
        name: CMD_RESULT.to_string(),
        transaction_id,
        command_object: object([
            ("fmsVer", AmfValue::from("FMS/3,0,1,123")),
            ("capabilities", AmfValue::Number(31.0)),
        ]),
        arguments: vec![object([
            ("level", AmfValue::from("status")),
            ("code", AmfValue::from(NC_CONNECT_SUCCESS)),
            ("description", AmfValue::from("Connection succeeded.")),
            ("objectEncoding", AmfValue::Number(0.0)),
        ])],
        stream_id: 0,
    }
    .into_raw(CSID_COMMAND)
}

/// `_result` for `createStream`, carrying the new message stream id
pub fn create_stream_result(transaction_id: f64, stream_id: u32) -> RawMessage {
    Command {
        name: CMD_RESULT.to_string(),
        transaction_id,
        command_object: AmfValue::Null,
        arguments: vec![AmfValue::from(stream_id)],
        stream_id: 0,
    }
    .into_raw(CSID_COMMAND)
}

/// Bare `_result` acknowledging commands such as releaseStream / FCPublish
pub fn empty_result(transaction_id: f64) -> RawMessage {
    Command {
        name: CMD_RESULT.to_string(),
        transaction_id,
        command_object: AmfValue::Null,
        arguments: vec![AmfValue::Undefined],
        stream_id: 0,
    }
    .into_raw(CSID_COMMAND)
}

/// `onStatus` on a message stream
pub fn on_status(stream_id: u32, level: &str, code: &str, description: &str) -> RawMessage {
    Command {
        name: CMD_ON_STATUS.to_string(),
        transaction_id: 0.0,
        command_object: AmfValue::Null,
        arguments: vec![object([
            ("level", AmfValue::from(level)),
            ("code", AmfValue::from(code)),
            ("description", AmfValue::from(description)),
        ])],
        stream_id,
    }
    .into_raw(CSID_COMMAND)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command_raw(values: &[AmfValue], stream_id: u32) -> RawMessage {
        RawMessage {
            csid: 3,
            timestamp: 0,
            type_id: MSG_COMMAND_AMF0,
            stream_id,
            payload: amf0::encode_all(values),
        }
    }

    #[test]
    fn test_decode_connect() {
        let raw = command_raw(
            &[
                AmfValue::from(CMD_CONNECT),
                AmfValue::Number(1.0),
                object([
                    ("app", AmfValue::from("live")),
                    ("tcUrl", AmfValue::from("rtmp://127.0.0.1/live")),
                ]),
            ],
            0,
        );

        let RtmpMessage::Command(cmd) = RtmpMessage::from_raw(raw).unwrap() else {
            panic!("expected command");
        };
        assert_eq!(cmd.name, CMD_CONNECT);
        assert_eq!(cmd.transaction_id, 1.0);

        let params = ConnectParams::from_command(&cmd);
        assert_eq!(params.app, "live");
        assert_eq!(params.tc_url.as_deref(), Some("rtmp://127.0.0.1/live"));
    }

    #[test]
    fn test_publish_params() {
        let raw = command_raw(
            &[
                AmfValue::from(CMD_PUBLISH),
                AmfValue::Number(5.0),
                AmfValue::Null,
                AmfValue::from("stream-key"),
            ],
            1,
        );
        let RtmpMessage::Command(cmd) = RtmpMessage::from_raw(raw).unwrap() else {
            panic!("expected command");
        };
        let params = PublishParams::from_command(&cmd);
        assert_eq!(params.stream_name, "stream-key");
        assert_eq!(params.publish_type, "live");
        assert_eq!(params.stream_id, 1);
    }

    #[test]
    fn test_amf3_command_prefix() {
        let mut payload = BytesMut::new();
        payload.put_u8(0);
        payload.put_slice(&amf0::encode_all(&[
            AmfValue::from(CMD_CREATE_STREAM),
            AmfValue::Number(2.0),
            AmfValue::Null,
        ]));
        let raw = RawMessage {
            csid: 3,
            timestamp: 0,
            type_id: MSG_COMMAND_AMF3,
            stream_id: 0,
            payload: payload.freeze(),
        };
        let RtmpMessage::Command(cmd) = RtmpMessage::from_raw(raw).unwrap() else {
            panic!("expected command");
        };
        assert_eq!(cmd.name, CMD_CREATE_STREAM);
    }

    #[test]
    fn test_command_without_name() {
        let raw = command_raw(&[AmfValue::Number(1.0)], 0);
        assert!(RtmpMessage::from_raw(raw).is_err());
    }

    #[test]
    fn test_connect_result_contents() {
        let raw = connect_result(1.0);
        assert_eq!(raw.csid, CSID_COMMAND);
        let values = amf0::decode_all(raw.payload).unwrap();
        assert_eq!(values[0].as_str(), Some(CMD_RESULT));
        assert_eq!(values[1].as_number(), Some(1.0));
        assert_eq!(values[2].get_string("fmsVer"), Some("FMS/3,0,1,123"));
        assert_eq!(values[2].get_number("capabilities"), Some(31.0));
        assert_eq!(values[3].get_string("code"), Some(NC_CONNECT_SUCCESS));
        assert_eq!(values[3].get_number("objectEncoding"), Some(0.0));
    }

    #[test]
    fn test_create_stream_result() {
        let values = amf0::decode_all(create_stream_result(4.0, 1).payload).unwrap();
        assert_eq!(values[1].as_number(), Some(4.0));
        assert!(values[2].is_null_or_undefined());
        assert_eq!(values[3].as_number(), Some(1.0));
    }

    #[test]
    fn test_control_messages() {
        let msg = RtmpMessage::from_raw(set_peer_bandwidth(DEFAULT_PEER_BANDWIDTH, 2)).unwrap();
        assert_eq!(
            msg,
            RtmpMessage::SetPeerBandwidth {
                size: 786_432,
                limit: BANDWIDTH_LIMIT_DYNAMIC
            }
        );

        let msg = RtmpMessage::from_raw(stream_begin(1)).unwrap();
        let RtmpMessage::UserControl { event, data } = msg else {
            panic!("expected user control");
        };
        assert_eq!(event, UC_STREAM_BEGIN);
        assert_eq!(&data[..], &[0, 0, 0, 1]);

        let truncated = RawMessage {
            csid: 2,
            timestamp: 0,
            type_id: MSG_WINDOW_ACK_SIZE,
            stream_id: 0,
            payload: Bytes::from_static(&[0, 1]),
        };
        assert!(RtmpMessage::from_raw(truncated).is_err());
    }
}
