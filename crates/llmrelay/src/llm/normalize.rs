//! Decoding of blocking upstream responses.

use bytes::Bytes;
use serde_json::Value;

use crate::http::compression::{self, Encoding};
use crate::http::{HeaderMap, get_header, header, is_json_content_type};
use crate::llm::AIError;
use crate::*;

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
	Json(Value),
	Text(String),
}

impl ResponseBody {
	pub fn into_json(self) -> Option<Value> {
		match self {
			ResponseBody::Json(v) => Some(v),
			ResponseBody::Text(_) => None,
		}
	}
}

/// Undoes the `content-encoding` of `body`, then parses it if it is declared JSON.
/// Unsupported encodings are rejected before any of the body is read.
pub async fn normalize(headers: &HeaderMap, body: Bytes) -> Result<ResponseBody, AIError> {
	let encoding = Encoding::from_header(get_header(headers, &header::CONTENT_ENCODING))
		.map_err(|e| map_compression_error(e, headers))?;
	let body = compression::decode(body, encoding)
		.await
		.map_err(|e| map_compression_error(e, headers))?;
	if is_json_content_type(headers) {
		let v = serde_json::from_slice(&body).map_err(AIError::InvalidUpstreamBody)?;
		return Ok(ResponseBody::Json(v));
	}
	Ok(ResponseBody::Text(String::from_utf8_lossy(&body).into_owned()))
}

fn map_compression_error(e: compression::Error, headers: &HeaderMap) -> AIError {
	match e {
		compression::Error::UnsupportedEncoding(_) => AIError::UnsupportedEncoding(strng::new(
			get_header(headers, &header::CONTENT_ENCODING).unwrap_or("unknown"),
		)),
		compression::Error::Io(e) => AIError::Decompression(e),
	}
}
