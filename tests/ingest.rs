//! End-to-end publish over a real TCP connection

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use rtmp_webrtc_bridge::amf::AmfValue;
use rtmp_webrtc_bridge::media::AudioSpecificConfig;
use rtmp_webrtc_bridge::protocol::constants::*;
use rtmp_webrtc_bridge::protocol::{ChunkDecoder, ChunkEncoder, Command, RawMessage, RtmpMessage};
use rtmp_webrtc_bridge::sink::SinkError;
use rtmp_webrtc_bridge::transcode::{
    AudioDecoder, AudioEncoder, CodecError, CodecFactory, EncoderParams, BLOCK_BYTES,
};
use rtmp_webrtc_bridge::{
    BridgeHandlerFactory, MediaSink, RtmpServer, ServerConfig, SinkPair, SinkRegistry,
    TimedSample, Viewer,
};

/// Every access unit decodes to exactly one 20 ms block
struct BlockCodecs;

struct BlockDecoder;
struct TagEncoder;

impl AudioDecoder for BlockDecoder {
    fn decode(&mut self, _access_unit: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(vec![0; BLOCK_BYTES])
    }
}

impl AudioEncoder for TagEncoder {
    fn encode(&mut self, _pcm: &[i16]) -> Result<Bytes, CodecError> {
        Ok(Bytes::from_static(b"opus"))
    }
}

impl CodecFactory for BlockCodecs {
    fn new_decoder(&self, _: &AudioSpecificConfig) -> Result<Box<dyn AudioDecoder>, CodecError> {
        Ok(Box::new(BlockDecoder))
    }

    fn new_encoder(&self, _: &EncoderParams) -> Result<Box<dyn AudioEncoder>, CodecError> {
        Ok(Box::new(TagEncoder))
    }
}

#[derive(Default)]
struct CollectingSink(Mutex<Vec<TimedSample>>);

impl CollectingSink {
    fn samples(&self) -> Vec<TimedSample> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaSink for CollectingSink {
    async fn write_sample(&self, sample: TimedSample) -> Result<(), SinkError> {
        self.0.lock().unwrap().push(sample);
        Ok(())
    }
}

#[derive(Default)]
struct CollectingViewer {
    video: Arc<CollectingSink>,
    audio: Arc<CollectingSink>,
}

#[async_trait]
impl Viewer for CollectingViewer {
    fn sinks(&self) -> SinkPair {
        SinkPair {
            video: self.video.clone(),
            audio: self.audio.clone(),
        }
    }

    async fn close(&self) {}
}

async fn start_server(registry: Arc<SinkRegistry>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let factory = BridgeHandlerFactory::new(registry, Arc::new(BlockCodecs));
    let server = RtmpServer::new(
        ServerConfig::with_addr(addr).connection_timeout(Duration::from_secs(5)),
        factory,
    );
    tokio::spawn(async move {
        server
            .serve(listener, std::future::pending::<()>())
            .await
            .unwrap();
    });
    addr
}

/// Minimal publisher speaking just enough RTMP for the tests
struct Publisher {
    socket: TcpStream,
    encoder: ChunkEncoder,
    decoder: ChunkDecoder,
    buf: BytesMut,
}

impl Publisher {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let mut socket = TcpStream::connect(addr).await.unwrap();

        let mut c0c1 = vec![RTMP_VERSION];
        c0c1.extend(std::iter::repeat(0x5A).take(HANDSHAKE_SIZE));
        socket.write_all(&c0c1).await.unwrap();

        let mut s0s1s2 = vec![0u8; 1 + HANDSHAKE_SIZE * 2];
        socket.read_exact(&mut s0s1s2).await.unwrap();
        assert_eq!(s0s1s2[0], RTMP_VERSION);
        // S2 echoes C1 outside the time fields
        assert!(s0s1s2[1 + HANDSHAKE_SIZE + 8..].iter().all(|&b| b == 0x5A));

        let c2 = s0s1s2[1..1 + HANDSHAKE_SIZE].to_vec();
        socket.write_all(&c2).await.unwrap();

        Self {
            socket,
            encoder: ChunkEncoder::new(),
            decoder: ChunkDecoder::new(),
            buf: BytesMut::new(),
        }
    }

    async fn send(&mut self, msg: RawMessage) {
        let mut out = BytesMut::new();
        self.encoder.encode(&msg, &mut out);
        self.socket.write_all(&out).await.unwrap();
    }

    async fn command(&mut self, name: &str, tid: f64, stream_id: u32, args: Vec<AmfValue>) {
        let (object, arguments) = match name {
            CMD_CONNECT => (args[0].clone(), Vec::new()),
            _ => (AmfValue::Null, args),
        };
        let cmd = Command {
            name: name.to_string(),
            transaction_id: tid,
            command_object: object,
            arguments,
            stream_id,
        };
        self.send(cmd.into_raw(CSID_COMMAND)).await;
    }

    async fn media(&mut self, type_id: u8, timestamp: u32, payload: Vec<u8>) {
        self.send(RawMessage {
            csid: if type_id == MSG_VIDEO { 6 } else { 4 },
            timestamp,
            type_id,
            stream_id: 1,
            payload: Bytes::from(payload),
        })
        .await;
    }

    /// Next message, or `None` once the server closes the socket
    async fn next(&mut self) -> Option<RtmpMessage> {
        loop {
            if let Some(raw) = self.decoder.decode(&mut self.buf).unwrap() {
                let msg = RtmpMessage::from_raw(raw).unwrap();
                if let RtmpMessage::SetChunkSize(size) = msg {
                    self.decoder.set_chunk_size(size).unwrap();
                }
                return Some(msg);
            }
            let n = tokio::time::timeout(Duration::from_secs(5), self.socket.read_buf(&mut self.buf))
                .await
                .expect("server stalled")
                .unwrap_or(0);
            if n == 0 {
                return None;
            }
        }
    }

    /// Skip until the next command message
    async fn next_command(&mut self) -> Command {
        loop {
            match self.next().await {
                Some(RtmpMessage::Command(cmd)) => return cmd,
                Some(_) => continue,
                None => panic!("connection closed while waiting for a command"),
            }
        }
    }

    async fn publish(&mut self, name: &str) -> Command {
        self.command(
            CMD_CONNECT,
            1.0,
            0,
            vec![rtmp_webrtc_bridge::amf::value::object([
                ("app", AmfValue::from("live")),
                ("tcUrl", AmfValue::from("rtmp://localhost/live")),
            ])],
        )
        .await;
        let result = self.next_command().await;
        assert_eq!(result.name, CMD_RESULT);
        assert_eq!(result.transaction_id, 1.0);
        assert_eq!(
            result.arguments[0].get_string("code"),
            Some(NC_CONNECT_SUCCESS)
        );

        self.command(CMD_RELEASE_STREAM, 2.0, 0, vec![AmfValue::from(name)]).await;
        self.command(CMD_FC_PUBLISH, 3.0, 0, vec![AmfValue::from(name)]).await;
        self.command(CMD_CREATE_STREAM, 4.0, 0, vec![]).await;

        let mut stream_id = None;
        while stream_id.is_none() {
            let cmd = self.next_command().await;
            if cmd.transaction_id == 4.0 {
                stream_id = cmd.arguments.first().and_then(|v| v.as_number());
            }
        }
        assert_eq!(stream_id, Some(1.0));

        self.command(
            CMD_PUBLISH,
            5.0,
            1,
            vec![AmfValue::from(name), AmfValue::from("live")],
        )
        .await;
        self.next_command().await
    }
}

async fn wait_for<F: Fn() -> bool>(cond: F) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_publish_delivers_video_and_audio() {
    let registry = Arc::new(SinkRegistry::new());
    let viewer = Arc::new(CollectingViewer::default());
    registry.install_viewer(viewer.clone()).await;
    let addr = start_server(registry.clone()).await;

    let mut publisher = Publisher::connect(addr).await;
    let status = publisher.publish("cam").await;
    assert_eq!(status.name, CMD_ON_STATUS);
    assert_eq!(status.arguments[0].get_string("code"), Some(NS_PUBLISH_START));

    // AVC sequence header: SPS 67 64, PPS 68 EF
    publisher
        .media(
            MSG_VIDEO,
            0,
            vec![
                0x17, 0x00, 0, 0, 0, 0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x02, 0x67, 0x64,
                0x01, 0x00, 0x02, 0x68, 0xEF,
            ],
        )
        .await;
    publisher
        .media(MSG_VIDEO, 0, vec![0x17, 0x01, 0, 0, 0, 0, 0, 0, 1, 0x65, 0x00])
        .await;
    publisher
        .media(MSG_AUDIO, 0, vec![0xAF, 0x00, 0x11, 0x90])
        .await;
    publisher
        .media(MSG_AUDIO, 21, vec![0xAF, 0x01, 0x21, 0x10])
        .await;
    publisher
        .media(MSG_AUDIO, 42, vec![0xAF, 0x01, 0x21, 0x10])
        .await;

    wait_for(|| viewer.video.samples().len() == 1 && viewer.audio.samples().len() == 2).await;

    let video = viewer.video.samples();
    assert_eq!(
        &video[0].data[..],
        &[0, 0, 0, 1, 0x67, 0x64, 0, 0, 0, 1, 0x68, 0xEF, 0, 0, 0, 1, 0x65]
    );
    let audio = viewer.audio.samples();
    assert!(audio
        .iter()
        .all(|s| &s.data[..] == b"opus" && s.duration == Duration::from_millis(20)));
    assert_eq!(registry.holder().await, Some(1));

    publisher
        .command(CMD_DELETE_STREAM, 6.0, 0, vec![AmfValue::from(1u32)])
        .await;
    while publisher.next().await.is_some() {}

    // The lease is released before the socket is shut down
    assert_eq!(registry.holder().await, None);
}

#[tokio::test]
async fn test_empty_stream_name_is_rejected() {
    let registry = Arc::new(SinkRegistry::new());
    let viewer = Arc::new(CollectingViewer::default());
    registry.install_viewer(viewer.clone()).await;
    let addr = start_server(registry.clone()).await;

    let mut publisher = Publisher::connect(addr).await;
    let status = publisher.publish("").await;
    assert_eq!(status.name, CMD_ON_STATUS);
    assert_eq!(
        status.arguments[0].get_string("code"),
        Some(NS_PUBLISH_BAD_NAME)
    );

    // Server hangs up after rejecting
    while publisher.next().await.is_some() {}
    assert_eq!(registry.holder().await, None);
    assert!(viewer.video.samples().is_empty());
}

#[tokio::test]
async fn test_old_handshake_version_is_rejected() {
    let registry = Arc::new(SinkRegistry::new());
    let addr = start_server(registry).await;

    let mut socket = TcpStream::connect(addr).await.unwrap();
    let mut c0c1 = vec![2u8];
    c0c1.extend(std::iter::repeat(0).take(HANDSHAKE_SIZE));
    socket.write_all(&c0c1).await.unwrap();

    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(5), socket.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_takeover_closes_idle_publisher() {
    let registry = Arc::new(SinkRegistry::new());
    let addr = start_server(registry.clone()).await;

    let mut first = Publisher::connect(addr).await;
    let status = first.publish("a").await;
    assert_eq!(status.arguments[0].get_string("code"), Some(NS_PUBLISH_START));

    let mut second = Publisher::connect(addr).await;
    let status = second.publish("b").await;
    assert_eq!(status.arguments[0].get_string("code"), Some(NS_PUBLISH_START));

    // The first publisher sends nothing more and is still hung up on
    while first.next().await.is_some() {}
    assert!(registry.holder().await.is_some());
}
