use assert_matches::assert_matches;
use serde_json::json;

use super::*;

fn chunk(content: Option<&str>, finish: Option<&str>) -> Value {
	json!({
		"id": "chatcmpl-1",
		"object": "chat.completion.chunk",
		"created": 1700000000,
		"model": "gpt-4o",
		"choices": [{"index": 0, "delta": {"content": content}, "finish_reason": finish}]
	})
}

#[test]
fn openai_chunks_merge() {
	let mut agg = EventAggregator::new(Format::OpenAI, Format::OpenAI, "gpt-4o");
	agg.add_event(json!({
		"id": "chatcmpl-1",
		"object": "chat.completion.chunk",
		"created": 1700000000,
		"model": "gpt-4o",
		"choices": [{"index": 0, "delta": {"role": "assistant", "content": ""}, "finish_reason": null}]
	}))
	.unwrap();
	agg.add_event(chunk(Some("Hel"), None)).unwrap();
	agg.add_event(chunk(Some("lo"), Some("stop"))).unwrap();
	assert_eq!(agg.events().len(), 3);

	let resp = agg.final_response().unwrap();
	assert_eq!(
		resp,
		json!({
			"id": "chatcmpl-1",
			"object": "chat.completion",
			"created": 1700000000,
			"model": "gpt-4o",
			"choices": [{
				"index": 0,
				"message": {"role": "assistant", "content": "Hello"},
				"finish_reason": "stop"
			}]
		})
	);
	assert_eq!(agg.final_response().unwrap(), resp);
}

#[test]
fn first_event_with_content_keeps_its_content() {
	let mut agg = EventAggregator::new(Format::OpenAI, Format::OpenAI, "gpt-4o");
	agg.add_event(chunk(Some("Hi"), None)).unwrap();
	agg.add_event(chunk(None, Some("length"))).unwrap();
	assert_eq!(agg.events().len(), 3);
	let resp = agg.final_response().unwrap();
	assert_eq!(resp["choices"][0]["message"]["content"], "Hi");
	assert_eq!(resp["choices"][0]["finish_reason"], "length");
}

#[test]
fn metadata_only_stream_is_empty() {
	let mut agg = EventAggregator::new(Format::AnthropicChat, Format::AnthropicChat, "claude-3-haiku");
	agg.add_event(json!({
		"type": "message_start",
		"message": {"id": "msg_1", "model": "claude-3-haiku", "role": "assistant", "content": []}
	}))
	.unwrap();
	let resp = agg.final_response().unwrap();
	assert_eq!(resp["id"], "msg_1");
	assert_eq!(resp["type"], "message");
	assert_eq!(resp["content"], json!([{"type": "text", "text": ""}]));
	assert_eq!(resp["stop_reason"], Value::Null);
	assert_eq!(agg.final_response().unwrap(), resp);
}

#[test]
fn no_events_at_all() {
	let agg = EventAggregator::new(Format::OpenAI, Format::OpenAIText, "gpt-3.5-turbo-instruct");
	let resp = agg.final_response().unwrap();
	assert_eq!(resp["object"], "text_completion");
	assert_eq!(resp["choices"][0]["text"], "");
	assert_eq!(resp["choices"][0]["finish_reason"], Value::Null);
}

#[test]
fn anthropic_messages_events() {
	let mut agg = EventAggregator::new(Format::OpenAI, Format::AnthropicChat, "claude-3-haiku");
	for e in [
		json!({"type": "message_start", "message": {"id": "msg_1", "model": "claude-3-haiku"}}),
		json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
		json!({"type": "ping"}),
		json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hel"}}),
		json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "lo"}}),
		json!({"type": "content_block_stop", "index": 0}),
		json!({"type": "message_delta", "delta": {"stop_reason": "max_tokens"}, "usage": {"output_tokens": 2}}),
		json!({"type": "message_stop"}),
	] {
		agg.add_event(e).unwrap();
	}
	let resp = agg.final_response().unwrap();
	assert_eq!(resp["content"][0]["text"], "Hello");
	assert_eq!(resp["stop_reason"], "max_tokens");
	assert_eq!(resp["model"], "claude-3-haiku");
}

#[test]
fn anthropic_error_event() {
	let mut agg = EventAggregator::new(Format::AnthropicChat, Format::AnthropicChat, "claude-3-haiku");
	let err = agg
		.add_event(json!({"type": "error", "error": {"type": "overloaded_error", "message": "busy"}}))
		.unwrap_err();
	assert_matches!(err, AIError::Upstream(_));
}

#[test]
fn anthropic_text_chunks_without_type() {
	let mut agg = EventAggregator::new(Format::AnthropicText, Format::AnthropicText, "anthropic.claude-v2");
	agg.add_event(json!({"completion": " Hel", "stop_reason": null})).unwrap();
	agg.add_event(json!({"type": "ping"})).unwrap();
	agg.add_event(json!({"completion": "lo", "stop_reason": "stop_sequence"})).unwrap();
	let resp = agg.final_response().unwrap();
	assert_eq!(resp["completion"], " Hello");
	assert_eq!(resp["stop_reason"], "stop_sequence");
	assert_eq!(resp["model"], "anthropic.claude-v2");
}

#[test]
fn google_chunks() {
	let mut agg = EventAggregator::new(Format::OpenAI, Format::GoogleAI, "gemini-1.5-flash");
	agg.add_event(json!({
		"candidates": [{"content": {"role": "model", "parts": [{"text": "Hel"}]}, "index": 0}]
	}))
	.unwrap();
	agg.add_event(json!({
		"candidates": [{"content": {"role": "model", "parts": [{"text": "lo"}]}, "finishReason": "STOP", "index": 0}],
		"usageMetadata": {"promptTokenCount": 1, "candidatesTokenCount": 2, "totalTokenCount": 3}
	}))
	.unwrap();
	let resp = agg.final_response().unwrap();
	assert_eq!(resp["candidates"][0]["content"]["parts"][0]["text"], "Hello");
	assert_eq!(resp["candidates"][0]["finishReason"], "STOP");
}

#[test]
fn bedrock_mistral_chat_chunks() {
	let mut agg = EventAggregator::new(Format::OpenAI, Format::MistralAI, "mistral.mistral-large-2402-v1:0");
	agg.add_event(json!({"choices": [{"index": 0, "message": {"role": "assistant", "content": ""}, "stop_reason": null}]}))
		.unwrap();
	agg.add_event(json!({"choices": [{"index": 0, "message": {"role": "assistant", "content": "Hel"}, "stop_reason": null}]}))
		.unwrap();
	agg.add_event(json!({"choices": [{"index": 0, "message": {"role": "assistant", "content": "lo"}, "stop_reason": "stop"}]}))
		.unwrap();
	let resp = agg.final_response().unwrap();
	assert_eq!(resp["object"], "chat.completion");
	assert_eq!(resp["choices"][0]["message"]["content"], "Hello");
	assert_eq!(resp["choices"][0]["finish_reason"], "stop");
}

#[test]
fn mistral_text_outputs() {
	let mut agg = EventAggregator::new(Format::MistralAI, Format::MistralText, "mistral.mistral-7b-instruct-v0:2");
	agg.add_event(json!({"outputs": [{"text": "Hel", "stop_reason": null}]})).unwrap();
	agg.add_event(json!({"outputs": [{"text": "lo", "stop_reason": "length"}]})).unwrap();
	let resp = agg.final_response().unwrap();
	assert_eq!(resp, json!({"outputs": [{"text": "Hello", "stop_reason": "length"}]}));
}

#[test]
fn openai_text_chunks() {
	let mut agg = EventAggregator::new(Format::OpenAI, Format::OpenAIText, "gpt-3.5-turbo-instruct");
	agg.add_event(json!({"id": "cmpl-1", "object": "text_completion", "created": 1, "model": "gpt-3.5-turbo-instruct", "choices": [{"text": "Hel", "index": 0, "finish_reason": null}]}))
		.unwrap();
	agg.add_event(json!({"id": "cmpl-1", "object": "text_completion", "created": 1, "model": "gpt-3.5-turbo-instruct", "choices": [{"text": "lo", "index": 0, "finish_reason": "stop"}]}))
		.unwrap();
	let resp = agg.final_response().unwrap();
	assert_eq!(resp["id"], "cmpl-1");
	assert_eq!(resp["choices"][0]["text"], "Hello");
	assert_eq!(resp["choices"][0]["finish_reason"], "stop");
}

#[test]
fn unknown_shapes_fail_loudly() {
	let mut agg = EventAggregator::new(Format::OpenAI, Format::OpenAI, "gpt-4o");
	assert_matches!(
		agg.add_event(json!({"completion": "hi"})),
		Err(AIError::UnexpectedStreamEvent { format: Format::OpenAI, .. })
	);

	let mut agg = EventAggregator::new(Format::OpenAI, Format::GoogleAI, "gemini-pro");
	assert_matches!(
		agg.add_event(json!({"outputs": []})),
		Err(AIError::UnexpectedStreamEvent { format: Format::GoogleAI, .. })
	);
	assert!(agg.events().is_empty());
}
