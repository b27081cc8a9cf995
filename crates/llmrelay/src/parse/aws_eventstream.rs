use aws_smithy_eventstream::frame::{DecodedFrame, MessageFrameDecoder};
use aws_smithy_types::event_stream::Message;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::BytesMut;
use serde_json::Value;
use tokio_util::codec::Decoder;

use super::{DEFAULT_FRAME_LIMIT, Error};
use crate::*;

/// Decodes `application/vnd.amazon.eventstream` bodies from Bedrock's
/// `invoke-with-response-stream`. Each `chunk` event wraps the provider native event as base64
/// JSON in its `bytes` field; exceptions are surfaced as errors.
pub struct EventStreamDecoder {
	inner: MessageFrameDecoder,
	limit: usize,
}

impl Default for EventStreamDecoder {
	fn default() -> Self {
		Self::new(DEFAULT_FRAME_LIMIT)
	}
}

impl std::fmt::Debug for EventStreamDecoder {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EventStreamDecoder").finish_non_exhaustive()
	}
}

impl EventStreamDecoder {
	pub fn new(limit: usize) -> Self {
		Self {
			inner: MessageFrameDecoder::new(),
			limit,
		}
	}
}

fn header<'a>(msg: &'a Message, name: &str) -> Option<&'a str> {
	msg
		.headers()
		.iter()
		.find(|h| h.name().as_str() == name)
		.and_then(|h| h.value().as_string().ok())
		.map(|s| s.as_str())
}

fn payload_json(msg: &Message) -> Result<Value, Error> {
	serde_json::from_slice(msg.payload()).map_err(|e| Error::Payload(strng::new(e.to_string())))
}

pub fn event_payload(msg: &Message) -> Result<Option<Value>, Error> {
	match header(msg, ":message-type").unwrap_or("event") {
		"event" => {},
		"exception" => {
			let kind = header(msg, ":exception-type").unwrap_or("exception");
			let message = payload_json(msg)
				.ok()
				.and_then(|v| v.get("message").and_then(Value::as_str).map(strng::new))
				.unwrap_or_default();
			return Err(Error::Exception {
				kind: strng::new(kind),
				message,
			});
		},
		other => {
			let kind = header(msg, ":error-code").unwrap_or(other);
			let message = header(msg, ":error-message").unwrap_or_default();
			return Err(Error::Exception {
				kind: strng::new(kind),
				message: strng::new(message),
			});
		},
	}
	if header(msg, ":event-type").is_some_and(|t| t != "chunk") {
		trace!(event_type = ?header(msg, ":event-type"), "skipping event");
		return Ok(None);
	}
	let wrapper = payload_json(msg)?;
	let Some(encoded) = wrapper.get("bytes").and_then(Value::as_str) else {
		return Err(Error::Payload(strng::literal!("chunk has no bytes field")));
	};
	let raw = STANDARD
		.decode(encoded)
		.map_err(|e| Error::Payload(strng::new(e.to_string())))?;
	serde_json::from_slice(&raw)
		.map(Some)
		.map_err(|e| Error::Payload(strng::new(e.to_string())))
}

impl Decoder for EventStreamDecoder {
	type Item = Value;
	type Error = Error;

	fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
		loop {
			if src.len() > self.limit {
				return Err(Error::LimitExceeded(self.limit));
			}
			let msg = match self
				.inner
				.decode_frame(&mut *src)
				.map_err(|e| Error::Frame(strng::new(e.to_string())))?
			{
				DecodedFrame::Complete(msg) => msg,
				DecodedFrame::Incomplete => return Ok(None),
			};
			if let Some(v) = event_payload(&msg)? {
				return Ok(Some(v));
			}
		}
	}

	fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
		match self.decode(src)? {
			Some(v) => Ok(Some(v)),
			None if src.is_empty() => Ok(None),
			None => Err(Error::Frame(strng::literal!("stream ended mid frame"))),
		}
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use assert_matches::assert_matches;
	use aws_smithy_eventstream::frame::write_message_to;
	use aws_smithy_types::event_stream::{Header, HeaderValue};
	use bytes::Bytes;
	use futures_util::TryStreamExt;
	use serde_json::json;
	use tokio_util::codec::FramedRead;

	use super::*;

	pub fn chunk(event: &Value) -> Vec<u8> {
		let payload = json!({"bytes": STANDARD.encode(serde_json::to_vec(event).unwrap())});
		let msg = Message::new(Bytes::from(serde_json::to_vec(&payload).unwrap()))
			.add_header(Header::new(":message-type", HeaderValue::String("event".into())))
			.add_header(Header::new(":event-type", HeaderValue::String("chunk".into())))
			.add_header(Header::new(
				":content-type",
				HeaderValue::String("application/json".into()),
			));
		let mut out = Vec::new();
		write_message_to(&msg, &mut out).unwrap();
		out
	}

	fn exception(kind: &'static str, message: &str) -> Vec<u8> {
		let msg = Message::new(Bytes::from(
			serde_json::to_vec(&json!({ "message": message })).unwrap(),
		))
		.add_header(Header::new(
			":message-type",
			HeaderValue::String("exception".into()),
		))
		.add_header(Header::new(":exception-type", HeaderValue::String(kind.into())));
		let mut out = Vec::new();
		write_message_to(&msg, &mut out).unwrap();
		out
	}

	#[tokio::test]
	async fn decodes_chunks() {
		let mut body = chunk(&json!({"completion": "Hel"}));
		body.extend(chunk(&json!({"completion": "lo", "stop_reason": "stop_sequence"})));
		let events: Vec<Value> = FramedRead::new(&body[..], EventStreamDecoder::default())
			.try_collect()
			.await
			.unwrap();
		assert_eq!(
			events,
			vec![
				json!({"completion": "Hel"}),
				json!({"completion": "lo", "stop_reason": "stop_sequence"})
			]
		);
	}

	#[test]
	fn partial_frames_wait_for_more() {
		let body = chunk(&json!({"a": 1}));
		let mut d = EventStreamDecoder::default();
		let (head, tail) = body.split_at(7);
		let mut buf = BytesMut::from(head);
		assert_matches!(d.decode(&mut buf), Ok(None));
		buf.extend_from_slice(tail);
		assert_eq!(d.decode(&mut buf).unwrap(), Some(json!({"a": 1})));
	}

	#[test]
	fn skipped_frames_do_not_end_the_decode() {
		let msg = Message::new(Bytes::from_static(b"{}"))
			.add_header(Header::new(":message-type", HeaderValue::String("event".into())))
			.add_header(Header::new(":event-type", HeaderValue::String("metadata".into())));
		let mut body = Vec::new();
		write_message_to(&msg, &mut body).unwrap();
		body.extend(chunk(&json!({"a": 1})));

		let mut d = EventStreamDecoder::default();
		let mut buf = BytesMut::from(&body[..]);
		assert_eq!(d.decode(&mut buf).unwrap(), Some(json!({"a": 1})));
		assert!(buf.is_empty());
		assert_matches!(d.decode(&mut buf), Ok(None));
	}

	#[tokio::test]
	async fn exceptions_are_errors() {
		let mut body = chunk(&json!({"a": 1}));
		body.extend(exception("throttlingException", "slow down"));
		let res: Result<Vec<Value>, Error> = FramedRead::new(&body[..], EventStreamDecoder::default())
			.try_collect()
			.await;
		assert_matches!(res, Err(Error::Exception { kind, message }) => {
			assert_eq!(kind, "throttlingException");
			assert_eq!(message, "slow down");
		});
	}
}
