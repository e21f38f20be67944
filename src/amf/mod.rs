//! AMF0 (Action Message Format) serialization
//!
//! RTMP command and data messages carry AMF0-encoded values. AMF3 command
//! messages (type 17) are AMF0 payloads behind a one-byte prefix, so only
//! AMF0 is implemented.

pub mod amf0;
pub mod value;

pub use amf0::{Amf0Decoder, Amf0Encoder};
pub use value::AmfValue;
