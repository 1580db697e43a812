// Shared helpers for integration tests
//
// Frame builders that put together complete wire frames (including the
// 4-byte size prefix) from kafka-protocol message structs.

#![allow(dead_code)]

use bytes::BytesMut;
use kafka_protocol::messages::{ApiKey, RequestHeader, ResponseHeader};
use kafka_protocol::protocol::{Encodable, StrBytes};

/// A request header as the proxy would see it on the wire.
pub fn request_header(api_key: i16, api_version: i16, correlation_id: i32) -> RequestHeader {
    RequestHeader::default()
        .with_request_api_key(api_key)
        .with_request_api_version(api_version)
        .with_correlation_id(correlation_id)
        .with_client_id(Some(StrBytes::from_static_str("test-client")))
}

/// Prefix a payload with its size.
pub fn raw_frame(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(payload.len() + 4);
    framed.extend_from_slice(&(payload.len() as i32).to_be_bytes());
    framed.extend_from_slice(payload);
    framed
}

/// Build a complete request frame: size prefix, header, body.
pub fn request_frame<R: Encodable>(
    api_key: i16,
    api_version: i16,
    correlation_id: i32,
    request: &R,
) -> Vec<u8> {
    let header_version = ApiKey::try_from(api_key)
        .unwrap()
        .request_header_version(api_version);

    let mut payload = BytesMut::new();
    request_header(api_key, api_version, correlation_id)
        .encode(&mut payload, header_version)
        .unwrap();
    request.encode(&mut payload, api_version).unwrap();
    raw_frame(&payload)
}

/// Build a complete response frame: size prefix, response header, body.
pub fn response_frame<R: Encodable>(
    api_key: i16,
    api_version: i16,
    correlation_id: i32,
    response: &R,
) -> Vec<u8> {
    let header_version = ApiKey::try_from(api_key)
        .unwrap()
        .response_header_version(api_version);

    let mut payload = BytesMut::new();
    ResponseHeader::default()
        .with_correlation_id(correlation_id)
        .encode(&mut payload, header_version)
        .unwrap();
    response.encode(&mut payload, api_version).unwrap();
    raw_frame(&payload)
}

/// Encode just a response body at the given version.
pub fn encoded_body<R: Encodable>(response: &R, api_version: i16) -> Vec<u8> {
    let mut body = BytesMut::new();
    response.encode(&mut body, api_version).unwrap();
    body.to_vec()
}
