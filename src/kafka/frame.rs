//! Kafka frame codec
//!
//! Handles the binary Kafka wire framing:
//! [4 bytes: Size (big-endian i32)] [Header] [Body]
//!
//! The kafka-protocol crate provides the generated header and message
//! structs; this module owns the framing (size prefix) and the recovery of
//! response framing from the correlation tracker. Responses carry only a
//! correlation id on the wire, so the api key and version needed to decode
//! them come from the request header stored when the request went out.
//!
//! A parsed [`Frame`] keeps the raw payload it was read from. Frames that
//! are never rewritten are re-emitted from those bytes, so pass-through is
//! byte-for-byte; only a replaced body causes any re-encoding, and even then
//! the header bytes are the original ones.

use std::collections::HashMap;

use bytes::Bytes;
use kafka_protocol::messages::{ApiKey, RequestHeader, ResponseHeader};
use kafka_protocol::protocol::Decodable;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProxyError, Result};
use crate::kafka::constants::MAX_FRAME_SIZE;

/// In-flight request headers keyed by correlation id.
///
/// One tracker exists per proxied connection. The client-to-broker pump
/// inserts an entry before flushing a request; the broker-to-client pump
/// looks the entry up to decode the response and then removes it. At most
/// one entry may be outstanding per correlation id.
#[derive(Debug, Default)]
pub struct CorrelationMap {
    inner: HashMap<i32, RequestHeader>,
}

impl CorrelationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an in-flight request. Returns the previous header if the
    /// correlation id was already outstanding, which is a protocol violation
    /// the caller must surface.
    pub fn insert(&mut self, header: RequestHeader) -> Option<RequestHeader> {
        self.inner.insert(header.correlation_id, header)
    }

    pub fn get(&self, correlation_id: i32) -> Option<&RequestHeader> {
        self.inner.get(&correlation_id)
    }

    pub fn remove(&mut self, correlation_id: i32) -> Option<RequestHeader> {
        self.inner.remove(&correlation_id)
    }

    pub fn contains(&self, correlation_id: i32) -> bool {
        self.inner.contains_key(&correlation_id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// One length-prefixed Kafka wire message with its parsed header context.
///
/// For requests the header is the one read off the wire; for responses it is
/// the stored header of the matching request, which supplies the api key and
/// version the response body must be decoded with.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Request header context (recovered via the correlation tracker for
    /// responses)
    pub header: RequestHeader,
    pub api_key: i16,
    pub api_version: i16,
    pub correlation_id: i32,
    /// Payload exactly as read off the wire (header bytes + body bytes)
    raw: Bytes,
    /// Offset of the body within `raw`
    body_offset: usize,
    /// Replacement body installed by the rewriter, if any
    rewritten: Option<Bytes>,
}

impl Frame {
    /// The frame body. Returns the rewritten body if one was installed.
    pub fn body(&self) -> Bytes {
        match &self.rewritten {
            Some(body) => body.clone(),
            None => self.raw.slice(self.body_offset..),
        }
    }

    /// Install a replacement body. The original header bytes are kept.
    pub fn replace_body(&mut self, body: Bytes) {
        self.rewritten = Some(body);
    }

    pub fn is_rewritten(&self) -> bool {
        self.rewritten.is_some()
    }

    pub fn client_id(&self) -> Option<&str> {
        self.header.client_id.as_deref()
    }

    /// Size of the frame payload as it will be written (excluding the size
    /// prefix itself).
    pub fn wire_size(&self) -> usize {
        self.body_offset + self.body().len()
    }
}

/// Read the size prefix and the complete payload of one frame.
///
/// Returns `Ok(None)` on a clean EOF at the frame boundary. An EOF in the
/// middle of a frame is an IO error.
async fn read_payload<S>(stream: &mut S) -> Result<Option<Bytes>>
where
    S: AsyncRead + Unpin,
{
    let mut size_buf = [0u8; 4];
    match stream.read_exact(&mut size_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            // Peer closed the connection between frames
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    }

    let size = i32::from_be_bytes(size_buf);
    if size <= 0 || size > MAX_FRAME_SIZE {
        return Err(ProxyError::InvalidFrameSize { size });
    }

    let mut payload = vec![0u8; size as usize];
    stream.read_exact(&mut payload).await?;
    Ok(Some(Bytes::from(payload)))
}

/// Read one request frame from a client connection.
///
/// The request header is parsed according to the api key's flexible or
/// classic framing rule. Api keys the codec has no schema for fall back to
/// the classic header layout, which is sufficient to recover the correlation
/// id for tracking; such frames are only ever forwarded verbatim.
pub async fn read_request<S>(stream: &mut S) -> Result<Option<Frame>>
where
    S: AsyncRead + Unpin,
{
    let raw = match read_payload(stream).await? {
        Some(raw) => raw,
        None => return Ok(None),
    };

    if raw.len() < 8 {
        return Err(ProxyError::malformed(format!(
            "request frame of {} bytes is shorter than a request header",
            raw.len()
        )));
    }

    let api_key = i16::from_be_bytes([raw[0], raw[1]]);
    let api_version = i16::from_be_bytes([raw[2], raw[3]]);
    let header_version = ApiKey::try_from(api_key)
        .map(|key| key.request_header_version(api_version))
        .unwrap_or(1);

    let mut buf = raw.clone();
    let header = RequestHeader::decode(&mut buf, header_version).map_err(ProxyError::codec)?;
    let body_offset = raw.len() - buf.len();

    Ok(Some(Frame {
        api_key: header.request_api_key,
        api_version: header.request_api_version,
        correlation_id: header.correlation_id,
        header,
        raw,
        body_offset,
        rewritten: None,
    }))
}

/// Read one response frame from a broker stream.
///
/// The correlation id in the first four payload bytes selects the stored
/// request header, which supplies the framing rules for the rest of the
/// frame. The tracker entry is looked up here but removed by the caller once
/// the response has passed through.
pub async fn read_response<S>(
    stream: &mut S,
    correlations: &Mutex<CorrelationMap>,
) -> Result<Option<Frame>>
where
    S: AsyncRead + Unpin,
{
    let raw = match read_payload(stream).await? {
        Some(raw) => raw,
        None => return Ok(None),
    };

    if raw.len() < 4 {
        return Err(ProxyError::malformed(format!(
            "response frame of {} bytes is shorter than a correlation id",
            raw.len()
        )));
    }

    let correlation_id = i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
    let header = correlations
        .lock()
        .get(correlation_id)
        .cloned()
        .ok_or(ProxyError::CorrelationViolation { correlation_id })?;

    let api_key = header.request_api_key;
    let api_version = header.request_api_version;

    // The body offset matters only for frames the rewriter will decode;
    // unregistered api keys pass through verbatim, so the correlation id is
    // all that needs parsing for them.
    let body_offset = match ApiKey::try_from(api_key) {
        Ok(key) => {
            let mut buf = raw.clone();
            ResponseHeader::decode(&mut buf, key.response_header_version(api_version))
                .map_err(ProxyError::codec)?;
            raw.len() - buf.len()
        }
        Err(_) => 4,
    };

    Ok(Some(Frame {
        api_key,
        api_version,
        correlation_id,
        header,
        raw,
        body_offset,
        rewritten: None,
    }))
}

/// Write one frame: size prefix, original header bytes, then the body.
///
/// The frame is flushed before returning, so no partial frame is ever left
/// sitting in a write buffer.
pub async fn write_frame<S>(stream: &mut S, frame: &Frame) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let header_bytes = &frame.raw[..frame.body_offset];
    let body = frame.body();
    let size = (header_bytes.len() + body.len()) as i32;

    stream.write_all(&size.to_be_bytes()).await?;
    stream.write_all(header_bytes).await?;
    stream.write_all(&body).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};
    use kafka_protocol::messages::MetadataRequest;
    use kafka_protocol::protocol::{Encodable, StrBytes};

    /// Build a complete request frame including the 4-byte size prefix
    fn build_request_frame<R: Encodable>(
        api_key: i16,
        api_version: i16,
        correlation_id: i32,
        request: &R,
    ) -> Vec<u8> {
        let header = RequestHeader::default()
            .with_request_api_key(api_key)
            .with_request_api_version(api_version)
            .with_correlation_id(correlation_id)
            .with_client_id(Some(StrBytes::from_static_str("test-client")));

        let header_version = ApiKey::try_from(api_key)
            .unwrap()
            .request_header_version(api_version);

        let mut payload = BytesMut::new();
        header.encode(&mut payload, header_version).unwrap();
        request.encode(&mut payload, api_version).unwrap();

        let mut framed = Vec::new();
        framed.extend_from_slice(&(payload.len() as i32).to_be_bytes());
        framed.extend_from_slice(&payload);
        framed
    }

    #[tokio::test]
    async fn test_read_request_parses_header() {
        let wire = build_request_frame(3, 9, 42, &MetadataRequest::default());

        let frame = read_request(&mut wire.as_slice()).await.unwrap().unwrap();
        assert_eq!(frame.api_key, 3);
        assert_eq!(frame.api_version, 9);
        assert_eq!(frame.correlation_id, 42);
        assert_eq!(frame.client_id(), Some("test-client"));
        assert!(!frame.is_rewritten());
    }

    #[tokio::test]
    async fn test_read_request_clean_eof_returns_none() {
        let wire: Vec<u8> = Vec::new();
        let frame = read_request(&mut wire.as_slice()).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn test_read_request_midframe_eof_is_error() {
        // Size says 100 bytes but only 3 follow
        let mut wire = Vec::new();
        wire.extend_from_slice(&100i32.to_be_bytes());
        wire.extend_from_slice(&[1, 2, 3]);

        let err = read_request(&mut wire.as_slice()).await.unwrap_err();
        assert!(matches!(err, ProxyError::Io(_)));
    }

    #[tokio::test]
    async fn test_read_request_rejects_nonpositive_size() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&(-7i32).to_be_bytes());

        let err = read_request(&mut wire.as_slice()).await.unwrap_err();
        assert!(matches!(err, ProxyError::InvalidFrameSize { size: -7 }));
    }

    #[tokio::test]
    async fn test_read_request_rejects_oversized_frame() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&(MAX_FRAME_SIZE + 1).to_be_bytes());

        let err = read_request(&mut wire.as_slice()).await.unwrap_err();
        assert!(matches!(err, ProxyError::InvalidFrameSize { .. }));
    }

    #[tokio::test]
    async fn test_read_request_truncated_header_is_malformed() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&4i32.to_be_bytes());
        wire.extend_from_slice(&[0, 3, 0, 9]);

        let err = read_request(&mut wire.as_slice()).await.unwrap_err();
        assert!(matches!(err, ProxyError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_write_frame_round_trips_request_bytes() {
        let wire = build_request_frame(3, 9, 7, &MetadataRequest::default());
        let frame = read_request(&mut wire.as_slice()).await.unwrap().unwrap();

        let mut out = Vec::new();
        write_frame(&mut out, &frame).await.unwrap();
        assert_eq!(out, wire, "pass-through frames must be byte-identical");
    }

    #[tokio::test]
    async fn test_read_response_recovers_request_header() {
        let correlations = Mutex::new(CorrelationMap::new());
        correlations.lock().insert(
            RequestHeader::default()
                .with_request_api_key(18)
                .with_request_api_version(0)
                .with_correlation_id(55),
        );

        // ApiVersions v0 response header is just the correlation id
        let mut payload = BytesMut::new();
        payload.put_i32(55);
        payload.put_slice(&[0, 0, 0, 0, 0, 0]); // opaque body bytes
        let mut wire = Vec::new();
        wire.extend_from_slice(&(payload.len() as i32).to_be_bytes());
        wire.extend_from_slice(&payload);

        let frame = read_response(&mut wire.as_slice(), &correlations)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.api_key, 18);
        assert_eq!(frame.api_version, 0);
        assert_eq!(frame.correlation_id, 55);
        assert_eq!(frame.body().len(), 6);
    }

    #[tokio::test]
    async fn test_read_response_unknown_correlation_is_violation() {
        let correlations = Mutex::new(CorrelationMap::new());

        let mut payload = BytesMut::new();
        payload.put_i32(99);
        let mut wire = Vec::new();
        wire.extend_from_slice(&(payload.len() as i32).to_be_bytes());
        wire.extend_from_slice(&payload);

        let err = read_response(&mut wire.as_slice(), &correlations)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProxyError::CorrelationViolation { correlation_id: 99 }
        ));
    }

    #[test]
    fn test_correlation_map_lifecycle() {
        let mut map = CorrelationMap::new();
        assert!(map.is_empty());

        let header = RequestHeader::default()
            .with_request_api_key(3)
            .with_request_api_version(9)
            .with_correlation_id(1);
        assert!(map.insert(header.clone()).is_none());
        assert!(map.contains(1));
        assert_eq!(map.len(), 1);

        // Reusing an outstanding id hands back the previous entry
        assert!(map.insert(header).is_some());

        let removed = map.remove(1).unwrap();
        assert_eq!(removed.request_api_key, 3);
        assert!(!map.contains(1));
        assert!(map.is_empty());
    }
}
