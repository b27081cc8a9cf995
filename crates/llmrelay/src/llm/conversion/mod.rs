//! Request transformers and their matching response translators, one file per target dialect.

use serde::Serialize;
use serde_json::Value;

use crate::llm::{AIError, Format, RequestContext};

pub mod anthropic_text;
pub mod gemini;
pub mod messages;
pub mod mistral;
pub mod mistral_text;
pub mod openai_text;

pub(crate) fn mismatch(ctx: &RequestContext, to: Format) -> AIError {
	AIError::UnsupportedTransformation {
		from: ctx.body.format(),
		to,
	}
}

pub(crate) fn to_value<T: Serialize>(resp: &T) -> Result<Value, AIError> {
	serde_json::to_value(resp).map_err(AIError::ResponseMarshal)
}

pub(crate) fn from_value<T: serde::de::DeserializeOwned>(resp: Value) -> Result<T, AIError> {
	serde_json::from_value(resp).map_err(AIError::ResponseParsing)
}

pub(crate) fn now() -> i64 {
	chrono::Utc::now().timestamp()
}

/// Stop reasons are carried internally in OpenAI vocabulary.
pub mod finish_reason {
	pub fn from_anthropic(r: &str) -> &'static str {
		match r {
			"max_tokens" | "model_context_window_exceeded" => "length",
			"tool_use" => "tool_calls",
			"refusal" => "content_filter",
			_ => "stop",
		}
	}

	pub fn to_anthropic(r: &str) -> &'static str {
		match r {
			"length" => "max_tokens",
			"tool_calls" => "tool_use",
			"content_filter" => "refusal",
			_ => "end_turn",
		}
	}

	pub fn to_anthropic_text(r: &str) -> &'static str {
		match r {
			"length" => "max_tokens",
			_ => "stop_sequence",
		}
	}

	pub fn from_google(r: &str) -> &'static str {
		match r {
			"MAX_TOKENS" => "length",
			"SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => "content_filter",
			_ => "stop",
		}
	}

	pub fn to_google(r: &str) -> &'static str {
		match r {
			"length" => "MAX_TOKENS",
			"content_filter" => "SAFETY",
			_ => "STOP",
		}
	}

	/// Mistral already speaks OpenAI vocabulary, except for `model_length`.
	pub fn from_mistral(r: &str) -> &'static str {
		match r {
			"length" | "model_length" => "length",
			"tool_calls" => "tool_calls",
			_ => "stop",
		}
	}
}

/// Splits a `data:<media type>;base64,<data>` URL.
pub(crate) fn parse_data_url(url: &str) -> Option<(&str, &str)> {
	let rest = url.strip_prefix("data:")?;
	let (meta, data) = rest.split_once(',')?;
	let media_type = meta.strip_suffix(";base64")?;
	Some((media_type, data))
}
