//! RTMP protocol constants

/// RTMP version sent in C0/S0
pub const RTMP_VERSION: u8 = 3;

/// Size of C1/S1/C2/S2 handshake packets
pub const HANDSHAKE_SIZE: usize = 1536;

/// Chunk size every connection starts with
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Chunk size we announce to publishers
pub const RECOMMENDED_CHUNK_SIZE: u32 = 4096;

/// Largest chunk size allowed by the protocol (31 bits)
pub const MAX_CHUNK_SIZE: u32 = 0x7FFF_FFFF;

/// Upper bound for a single reassembled message
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Receive window advertised to publishers: 6 Mbit expressed in bytes
pub const DEFAULT_WINDOW_ACK_SIZE: u32 = 6 * 1024 * 1024 / 8;

/// Peer bandwidth advertised to publishers
pub const DEFAULT_PEER_BANDWIDTH: u32 = 6 * 1024 * 1024 / 8;

/// Set Peer Bandwidth limit type "dynamic"
pub const BANDWIDTH_LIMIT_DYNAMIC: u8 = 2;

/// Timestamp value signalling an extended timestamp field
pub const EXTENDED_TIMESTAMP: u32 = 0x00FF_FFFF;

// Chunk stream ids used for outgoing messages
pub const CSID_PROTOCOL_CONTROL: u32 = 2;
pub const CSID_COMMAND: u32 = 3;

// Message type ids
pub const MSG_SET_CHUNK_SIZE: u8 = 1;
pub const MSG_ABORT: u8 = 2;
pub const MSG_ACKNOWLEDGEMENT: u8 = 3;
pub const MSG_USER_CONTROL: u8 = 4;
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;
pub const MSG_AUDIO: u8 = 8;
pub const MSG_VIDEO: u8 = 9;
pub const MSG_DATA_AMF3: u8 = 15;
pub const MSG_COMMAND_AMF3: u8 = 17;
pub const MSG_DATA_AMF0: u8 = 18;
pub const MSG_COMMAND_AMF0: u8 = 20;

// User control event types
pub const UC_STREAM_BEGIN: u16 = 0;

// Command names
pub const CMD_CONNECT: &str = "connect";
pub const CMD_CREATE_STREAM: &str = "createStream";
pub const CMD_PUBLISH: &str = "publish";
pub const CMD_DELETE_STREAM: &str = "deleteStream";
pub const CMD_CLOSE_STREAM: &str = "closeStream";
pub const CMD_RELEASE_STREAM: &str = "releaseStream";
pub const CMD_FC_PUBLISH: &str = "FCPublish";
pub const CMD_FC_UNPUBLISH: &str = "FCUnpublish";
pub const CMD_RESULT: &str = "_result";
pub const CMD_ERROR: &str = "_error";
pub const CMD_ON_STATUS: &str = "onStatus";

// NetStream / NetConnection status codes
pub const NC_CONNECT_SUCCESS: &str = "NetConnection.Connect.Success";
pub const NS_PUBLISH_START: &str = "NetStream.Publish.Start";
pub const NS_PUBLISH_BAD_NAME: &str = "NetStream.Publish.BadName";
