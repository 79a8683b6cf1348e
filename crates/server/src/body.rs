//! Capture body decoding (§4.I): clients may gzip the JSON payload and
//! signal it either via the standard `Content-Encoding: gzip` header or,
//! for SDKs that can't set that header, via `Content-Type:
//! application/octet-stream` plus `X-Original-Content-Type:
//! application/json`. Either way the body on the wire is gzipped JSON
//! bytes that must be inflated before `serde_json` sees them.

use std::io::Read;

use axum::http::HeaderMap;
use flate2::bufread::GzDecoder;

use crate::error::ApiError;

const CONTENT_ENCODING: &str = "content-encoding";
const ORIGINAL_CONTENT_TYPE: &str = "x-original-content-type";

fn header_eq(headers: &HeaderMap, name: &str, value: &str) -> bool {
    headers.get(name).and_then(|v| v.to_str().ok()).map(|v| v.eq_ignore_ascii_case(value)).unwrap_or(false)
}

/// True if the body on the wire is gzip-compressed JSON per §4.I, under
/// either signaling convention.
pub fn is_gzip_body(headers: &HeaderMap) -> bool {
    header_eq(headers, CONTENT_ENCODING, "gzip") || header_eq(headers, ORIGINAL_CONTENT_TYPE, "application/json")
}

/// Inflates a gzipped body. Malformed gzip data is an `Invalid` error
/// (§7: malformed payload), not `Transient` — it can never succeed on
/// retry.
pub fn inflate(bytes: &[u8]) -> Result<Vec<u8>, ApiError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| ApiError::Invalid(format!("malformed gzip body: {e}")))?;
    Ok(out)
}

/// Decodes a capture request body, inflating it first if `headers`
/// indicate a gzipped payload (§4.I).
pub fn decode_capture_body(headers: &HeaderMap, bytes: &[u8]) -> Result<Vec<u8>, ApiError> {
    if is_gzip_body(headers) {
        inflate(bytes)
    } else {
        Ok(bytes.to_vec())
    }
}
