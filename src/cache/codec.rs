//! Freezing live responses into storable snapshots and back.
//!
//! # Responsibilities
//! - Buffer an upstream response body (and trailers) exactly once
//! - Capture every response field into a serializable `CachedResponse`
//! - Encode/decode snapshots to bytes for the cache store
//! - Thaw a snapshot into a response with a fresh, replayable body
//!
//! # Design Decisions
//! - Header multimaps are stored as ordered (name, values) lists so the value
//!   order inside each name survives a round trip
//! - Upstream CORS allow-* headers are stripped before freezing; the proxy's
//!   own CORS layer owns them
//! - Thawing a corrupt snapshot is an error, never a silently broken response

use std::convert::Infallible;

use axum::body::Body;
use axum::http::{
    header::{
        ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
        ACCESS_CONTROL_MAX_AGE, CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING,
    },
    response::Parts,
    HeaderMap, HeaderName, HeaderValue, Response, StatusCode, Version,
};
use bytes::Bytes;
use http_body::Frame;
use http_body_util::{BodyExt, StreamBody};
use serde::{Deserialize, Serialize};

/// Response headers owned by the proxy's CORS layer.
pub static CORS_HEADERS: [HeaderName; 4] = [
    ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_MAX_AGE,
];

/// Remove upstream CORS allow-* headers.
pub fn strip_cors_headers(headers: &mut HeaderMap) {
    for name in &CORS_HEADERS {
        headers.remove(name);
    }
}

/// Response extension set by an upstream client that transparently
/// decompressed the body.
///
/// `HttpUpstream` never sets it: reqwest is built without its gzip, brotli
/// and deflate features, so bodies arrive exactly as encoded upstream and
/// `Content-Encoding` is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decompressed;

/// Errors turning snapshots into bytes or responses.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode cached response: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode cached response: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("invalid cached header {0:?}")]
    InvalidHeader(String),
    #[error("invalid cached status code {0}")]
    InvalidStatus(u16),
    #[error("unsupported cached protocol version {0}.{1}")]
    UnsupportedVersion(u8, u8),
}

/// A response whose body has been read fully into memory.
#[derive(Debug)]
pub struct BufferedResponse {
    pub parts: Parts,
    pub body: Bytes,
    pub trailers: Option<HeaderMap>,
}

impl BufferedResponse {
    /// Read `response`'s body and trailers to the end.
    pub async fn read(response: Response<Body>) -> Result<Self, axum::Error> {
        let (parts, body) = response.into_parts();
        let collected = body.collect().await?;
        let trailers = collected.trailers().cloned();
        Ok(Self {
            parts,
            body: collected.to_bytes(),
            trailers,
        })
    }

    /// Hand the buffered response on, with a body that replays the buffer.
    pub fn into_response(self) -> Response<Body> {
        Response::from_parts(self.parts, replay_body(self.body, self.trailers))
    }
}

/// Build a body yielding `data` and then `trailers`.
fn replay_body(data: Bytes, trailers: Option<HeaderMap>) -> Body {
    let Some(trailers) = trailers else {
        return Body::from(data);
    };

    let mut frames = Vec::with_capacity(2);
    if !data.is_empty() {
        frames.push(Frame::data(data));
    }
    frames.push(Frame::trailers(trailers));
    let stream = futures_util::stream::iter(frames.into_iter().map(Ok::<_, Infallible>));
    Body::new(StreamBody::new(stream))
}

/// One header name with all of its values, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderField {
    pub name: String,
    pub values: Vec<Bytes>,
}

/// Immutable snapshot of a response, as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// e.g. "200 OK"
    pub status: String,
    pub status_code: u16,
    /// e.g. "HTTP/1.1"
    pub proto: String,
    pub proto_major: u8,
    pub proto_minor: u8,
    pub headers: Vec<HeaderField>,
    pub body: Bytes,
    pub content_length: Option<u64>,
    pub transfer_encoding: Vec<String>,
    pub trailers: Option<Vec<HeaderField>>,
    pub close: bool,
    pub uncompressed: bool,
}

impl CachedResponse {
    /// Capture every field of a buffered response.
    pub fn freeze(response: &BufferedResponse) -> Self {
        let parts = &response.parts;
        let (proto_major, proto_minor) = version_numbers(parts.version);
        let status_code = parts.status.as_u16();
        let status = match parts.status.canonical_reason() {
            Some(reason) => format!("{} {}", status_code, reason),
            None => status_code.to_string(),
        };

        Self {
            status,
            status_code,
            proto: format!("HTTP/{}.{}", proto_major, proto_minor),
            proto_major,
            proto_minor,
            headers: capture_headers(&parts.headers),
            body: response.body.clone(),
            content_length: parts
                .headers
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok()),
            transfer_encoding: header_tokens(&parts.headers, &TRANSFER_ENCODING),
            trailers: response.trailers.as_ref().map(capture_headers),
            close: header_tokens(&parts.headers, &CONNECTION)
                .iter()
                .any(|token| token.eq_ignore_ascii_case("close")),
            uncompressed: parts.extensions.get::<Decompressed>().is_some(),
        }
    }

    /// Rebuild a response. Every call yields an independent body.
    pub fn thaw(&self) -> Result<Response<Body>, CodecError> {
        let status =
            StatusCode::from_u16(self.status_code).map_err(|_| CodecError::InvalidStatus(self.status_code))?;
        let version = version_from_numbers(self.proto_major, self.proto_minor)?;
        let headers = restore_headers(&self.headers)?;
        let trailers = self.trailers.as_deref().map(restore_headers).transpose()?;

        let mut response = Response::new(replay_body(self.body.clone(), trailers));
        *response.status_mut() = status;
        *response.version_mut() = version;
        *response.headers_mut() = headers;
        if self.uncompressed {
            response.extensions_mut().insert(Decompressed);
        }
        Ok(response)
    }

    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let bytes = bincode::serde::encode_to_vec(self, bincode::config::standard())?;
        Ok(Bytes::from(bytes))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (cached, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(cached)
    }
}

fn capture_headers(headers: &HeaderMap) -> Vec<HeaderField> {
    headers
        .keys()
        .map(|name| HeaderField {
            name: name.as_str().to_string(),
            values: headers
                .get_all(name)
                .iter()
                .map(|v| Bytes::copy_from_slice(v.as_bytes()))
                .collect(),
        })
        .collect()
}

fn restore_headers(fields: &[HeaderField]) -> Result<HeaderMap, CodecError> {
    let mut headers = HeaderMap::new();
    for field in fields {
        let name = HeaderName::from_bytes(field.name.as_bytes())
            .map_err(|_| CodecError::InvalidHeader(field.name.clone()))?;
        for value in &field.values {
            let value = HeaderValue::from_maybe_shared(value.clone())
                .map_err(|_| CodecError::InvalidHeader(field.name.clone()))?;
            headers.append(name.clone(), value);
        }
    }
    Ok(headers)
}

/// Comma separated tokens across every value of `name`.
fn header_tokens(headers: &HeaderMap, name: &HeaderName) -> Vec<String> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn version_numbers(version: Version) -> (u8, u8) {
    match version {
        Version::HTTP_09 => (0, 9),
        Version::HTTP_10 => (1, 0),
        Version::HTTP_2 => (2, 0),
        Version::HTTP_3 => (3, 0),
        _ => (1, 1),
    }
}

fn version_from_numbers(major: u8, minor: u8) -> Result<Version, CodecError> {
    match (major, minor) {
        (0, 9) => Ok(Version::HTTP_09),
        (1, 0) => Ok(Version::HTTP_10),
        (1, 1) => Ok(Version::HTTP_11),
        (2, 0) => Ok(Version::HTTP_2),
        (3, 0) => Ok(Version::HTTP_3),
        _ => Err(CodecError::UnsupportedVersion(major, minor)),
    }
}
