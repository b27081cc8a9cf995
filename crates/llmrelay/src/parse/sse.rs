use bytes::{Buf, BytesMut};
use serde_json::Value;
use tokio_util::codec::Decoder;

use super::{DEFAULT_FRAME_LIMIT, Error};
use crate::*;

const DONE: &str = "[DONE]";

/// Decodes `text/event-stream` frames into the JSON carried by their `data:` lines.
///
/// Comments, `event:`/`id:`/`retry:` fields, and frames without data are skipped. A `[DONE]`
/// payload ends the stream and anything after it is discarded.
#[derive(Debug)]
pub struct SseDecoder {
	limit: usize,
	done: bool,
}

impl Default for SseDecoder {
	fn default() -> Self {
		Self::new(DEFAULT_FRAME_LIMIT)
	}
}

impl SseDecoder {
	pub fn new(limit: usize) -> Self {
		Self { limit, done: false }
	}

	pub fn is_done(&self) -> bool {
		self.done
	}

	fn frame(&mut self, frame: &[u8]) -> Result<Option<Value>, Error> {
		let frame = std::str::from_utf8(frame).map_err(|e| Error::Payload(strng::new(e.to_string())))?;
		let mut data: Option<String> = None;
		for line in frame.lines() {
			let Some(rest) = line.strip_prefix("data:") else {
				continue;
			};
			let rest = rest.strip_prefix(' ').unwrap_or(rest);
			match &mut data {
				Some(d) => {
					d.push('\n');
					d.push_str(rest);
				},
				None => data = Some(rest.to_string()),
			}
		}
		let Some(data) = data else {
			return Ok(None);
		};
		if data.trim() == DONE {
			self.done = true;
			return Ok(None);
		}
		if data.trim().is_empty() {
			return Ok(None);
		}
		serde_json::from_str(&data)
			.map(Some)
			.map_err(|e| Error::Payload(strng::new(e.to_string())))
	}
}

/// Position and length of the first blank line delimiting a frame.
fn frame_end(buf: &[u8]) -> Option<(usize, usize)> {
	let mut i = 0;
	while i < buf.len() {
		if buf[i..].starts_with(b"\r\n\r\n") {
			return Some((i, 4));
		}
		if buf[i..].starts_with(b"\n\n") || buf[i..].starts_with(b"\r\r") {
			return Some((i, 2));
		}
		i += 1;
	}
	None
}

impl Decoder for SseDecoder {
	type Item = Value;
	type Error = Error;

	fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
		loop {
			if self.done {
				src.clear();
				return Ok(None);
			}
			let Some((end, delim)) = frame_end(src) else {
				if src.len() > self.limit {
					return Err(Error::LimitExceeded(self.limit));
				}
				return Ok(None);
			};
			let frame = src.split_to(end);
			src.advance(delim);
			if let Some(v) = self.frame(&frame)? {
				return Ok(Some(v));
			}
		}
	}

	fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
		if let Some(v) = self.decode(src)? {
			return Ok(Some(v));
		}
		if src.is_empty() {
			return Ok(None);
		}
		// A final frame without its trailing blank line.
		let frame = src.split();
		self.frame(&frame)
	}
}
