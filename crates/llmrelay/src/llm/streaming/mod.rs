//! Drives a streamed upstream body into an [`EventAggregator`].

use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};
use serde_json::Value;
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use crate::http::{HeaderMap, get_header, header, is_sse_content_type};
use crate::llm::aggregator::EventAggregator;
use crate::llm::{AIError, bedrock};
use crate::parse;
use crate::parse::aws_eventstream::EventStreamDecoder;
use crate::parse::sse::SseDecoder;
use crate::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
	Sse,
	AwsEventStream,
}

impl Framing {
	pub fn from_headers(headers: &HeaderMap) -> Option<Framing> {
		if is_sse_content_type(headers) {
			return Some(Framing::Sse);
		}
		get_header(headers, &header::CONTENT_TYPE)
			.filter(|ct| ct.starts_with(bedrock::EVENT_STREAM))
			.map(|_| Framing::AwsEventStream)
	}
}

/// Feeds every event of `body` to `aggregator`, in order.
///
/// Stops as soon as `cancel` fires, returning [`AIError::ClientDisconnected`]; nothing after that
/// point is read.
pub async fn consume<S, E>(
	body: S,
	framing: Framing,
	aggregator: &mut EventAggregator,
	cancel: &CancellationToken,
) -> Result<usize, AIError>
where
	S: Stream<Item = Result<Bytes, E>> + Unpin,
	E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
	let reader = StreamReader::new(body.map_err(std::io::Error::other));
	match framing {
		Framing::Sse => drive(FramedRead::new(reader, SseDecoder::default()), aggregator, cancel).await,
		Framing::AwsEventStream => {
			drive(
				FramedRead::new(reader, EventStreamDecoder::default()),
				aggregator,
				cancel,
			)
			.await
		},
	}
}

async fn drive<R, D>(
	mut frames: FramedRead<R, D>,
	aggregator: &mut EventAggregator,
	cancel: &CancellationToken,
) -> Result<usize, AIError>
where
	R: tokio::io::AsyncRead + Unpin,
	D: Decoder<Item = Value, Error = parse::Error>,
{
	let mut count = 0;
	loop {
		let next = tokio::select! {
			biased;
			_ = cancel.cancelled() => {
				debug!(events = count, "client went away; abandoning stream");
				return Err(AIError::ClientDisconnected);
			},
			next = frames.next() => next,
		};
		let Some(event) = next else {
			trace!(events = count, "stream finished");
			return Ok(count);
		};
		aggregator.add_event(event?)?;
		count += 1;
	}
}

#[cfg(test)]
mod tests {
	use std::convert::Infallible;

	use assert_matches::assert_matches;
	use serde_json::json;

	use super::*;
	use crate::http::HeaderValue;
	use crate::llm::Format;

	fn sse(frames: &[&'static str]) -> impl Stream<Item = Result<Bytes, Infallible>> + Unpin {
		futures_util::stream::iter(
			frames
				.iter()
				.map(|f| Ok(Bytes::from_static(f.as_bytes())))
				.collect::<Vec<_>>(),
		)
	}

	#[test]
	fn framing_from_content_type() {
		let mut h = HeaderMap::new();
		h.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
		assert_eq!(Framing::from_headers(&h), Some(Framing::Sse));
		h.insert(
			header::CONTENT_TYPE,
			HeaderValue::from_static("application/vnd.amazon.eventstream"),
		);
		assert_eq!(Framing::from_headers(&h), Some(Framing::AwsEventStream));
		h.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
		assert_eq!(Framing::from_headers(&h), None);
	}

	#[tokio::test]
	async fn frames_split_across_chunks() {
		let body = sse(&[
			"data: {\"completion\": \"Hel\"}\n",
			"\ndata: {\"completion\": \"lo\", \"stop_",
			"reason\": \"stop_sequence\"}\n\ndata: [DONE]\n\n",
		]);
		let mut agg = EventAggregator::new(Format::AnthropicText, Format::AnthropicText, "claude-2");
		let n = consume(body, Framing::Sse, &mut agg, &CancellationToken::new())
			.await
			.unwrap();
		assert_eq!(n, 2);
		assert_eq!(agg.final_response().unwrap()["completion"], "Hello");
	}

	#[tokio::test]
	async fn aws_event_stream() {
		let mut body = crate::parse::aws_eventstream::tests::chunk(&json!({"outputs": [{"text": "Hi"}]}));
		body.extend(crate::parse::aws_eventstream::tests::chunk(
			&json!({"outputs": [{"text": "!", "stop_reason": "stop"}]}),
		));
		let stream = futures_util::stream::iter(vec![Ok::<_, Infallible>(Bytes::from(body))]);
		let mut agg = EventAggregator::new(Format::MistralAI, Format::MistralText, "mistral.mistral-7b-instruct-v0:2");
		consume(stream, Framing::AwsEventStream, &mut agg, &CancellationToken::new())
			.await
			.unwrap();
		assert_eq!(
			agg.final_response().unwrap(),
			json!({"outputs": [{"text": "Hi!", "stop_reason": "stop"}]})
		);
	}

	#[tokio::test(start_paused = true)]
	async fn stops_when_client_disconnects() {
		let first = futures_util::stream::iter(vec![Ok::<_, Infallible>(Bytes::from_static(
			b"data: {\"completion\": \"a\"}\n\n",
		))]);
		// The upstream never sends anything else.
		let body = first.chain(futures_util::stream::pending());
		let mut agg = EventAggregator::new(Format::AnthropicText, Format::AnthropicText, "claude-2");
		let cancel = CancellationToken::new();
		let trigger = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_secs(1)).await;
			trigger.cancel();
		});
		let res = consume(body, Framing::Sse, &mut agg, &cancel).await;
		assert_matches!(res, Err(AIError::ClientDisconnected));
		assert_eq!(agg.events().len(), 2);
	}

	#[tokio::test]
	async fn unexpected_event_aborts() {
		let body = sse(&["data: {\"unexpected\": true}\n\n"]);
		let mut agg = EventAggregator::new(Format::OpenAI, Format::OpenAI, "gpt-4o");
		let res = consume(body, Framing::Sse, &mut agg, &CancellationToken::new()).await;
		assert_matches!(res, Err(AIError::UnexpectedStreamEvent { .. }));
	}
}
