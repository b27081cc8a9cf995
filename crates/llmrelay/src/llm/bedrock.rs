//! Bedrock specifics: hosts, invoke paths, body allowlists and request signing.

use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Map, Value};

use crate::http::auth::aws::{AwsCredentials, sign_request};
use crate::http::{HeaderValue, Method, SignedRequest, header};
use crate::keys::Key;
use crate::llm::{AIError, Format, RequestContext};
use crate::*;

pub const SIGNING_NAME: &str = "bedrock";
pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
pub const EVENT_STREAM: &str = "application/vnd.amazon.eventstream";

/// Model ids may be ARNs or carry `:`, which must be escaped in the path.
const MODEL_ID: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.').remove(b'-').remove(b'_');

pub fn runtime_host(region: &str) -> Strng {
	strng::format!("bedrock-runtime.{region}.amazonaws.com")
}

pub fn control_host(region: &str) -> Strng {
	strng::format!("bedrock.{region}.amazonaws.com")
}

pub fn invoke_path(model: &str, streaming: bool) -> String {
	let model = utf8_percent_encode(model, MODEL_ID);
	if streaming {
		format!("/model/{model}/invoke-with-response-stream")
	} else {
		format!("/model/{model}/invoke")
	}
}

/// The first inference profile naming the model, or the model itself.
pub fn select_model_path<'a>(profiles: &'a [Strng], model: &'a str) -> &'a str {
	profiles
		.iter()
		.find(|p| p.contains(model))
		.map(|p| p.as_str())
		.unwrap_or(model)
}

const ANTHROPIC_CHAT_FIELDS: &[&str] = &[
	"anthropic_version",
	"messages",
	"system",
	"max_tokens",
	"stop_sequences",
	"temperature",
	"top_k",
	"top_p",
	"tools",
	"tool_choice",
];
const ANTHROPIC_TEXT_FIELDS: &[&str] = &[
	"anthropic_version",
	"prompt",
	"max_tokens_to_sample",
	"stop_sequences",
	"temperature",
	"top_k",
	"top_p",
];
const MISTRAL_CHAT_FIELDS: &[&str] = &[
	"messages",
	"max_tokens",
	"temperature",
	"top_p",
	"stop",
	"tools",
	"tool_choice",
];
const MISTRAL_TEXT_FIELDS: &[&str] = &["prompt", "max_tokens", "temperature", "top_p", "top_k", "stop"];

/// Bedrock rejects unknown fields, including `model` and `stream`.
pub fn strict_body(format: Format, body: Value) -> Result<Value, AIError> {
	let allowed = match format {
		Format::AnthropicChat => ANTHROPIC_CHAT_FIELDS,
		Format::AnthropicText => ANTHROPIC_TEXT_FIELDS,
		Format::MistralAI => MISTRAL_CHAT_FIELDS,
		Format::MistralText => MISTRAL_TEXT_FIELDS,
		Format::OpenAI | Format::OpenAIText | Format::GoogleAI => {
			return Err(AIError::UnsupportedFormat(format));
		},
	};
	let Value::Object(obj) = body else {
		return Err(AIError::UnsupportedFormat(format));
	};
	let mut out: Map<String, Value> = obj
		.into_iter()
		.filter(|(k, _)| allowed.contains(&k.as_str()))
		.collect();
	if matches!(format, Format::AnthropicChat | Format::AnthropicText) {
		out.insert(
			"anthropic_version".to_string(),
			Value::String(ANTHROPIC_VERSION.to_string()),
		);
	}
	Ok(Value::Object(out))
}

/// Builds the signed invoke request for the bound key.
pub fn sign_invoke(ctx: &RequestContext, key: &Key) -> Result<SignedRequest, AIError> {
	let creds = AwsCredentials::parse(key.secret())?;
	let model = select_model_path(&key.capabilities.inference_profiles, &ctx.model);
	let body = strict_body(ctx.outbound, ctx.body.to_value()?)?;
	let body = Bytes::from(serde_json::to_vec(&body).map_err(AIError::RequestMarshal)?);
	let accept = if ctx.streaming {
		EVENT_STREAM
	} else {
		"application/json"
	};
	sign(
		&creds,
		Method::POST,
		"https",
		&runtime_host(&creds.region),
		&invoke_path(model, ctx.streaming),
		&[
			(header::CONTENT_TYPE, "application/json"),
			(header::ACCEPT, accept),
		],
		body,
	)
}

/// Builds and signs an arbitrary Bedrock request.
pub fn sign(
	creds: &AwsCredentials,
	method: Method,
	protocol: &str,
	hostname: &str,
	path: &str,
	headers: &[(header::HeaderName, &str)],
	body: Bytes,
) -> Result<SignedRequest, AIError> {
	let signing_error = |e: anyhow::Error| AIError::Signing(strng::new(e.to_string()));
	let mut builder = ::http::Request::builder()
		.method(method.clone())
		.uri(format!("{protocol}://{hostname}{path}"));
	for (name, value) in headers {
		builder = builder.header(name, HeaderValue::from_str(value).map_err(|e| signing_error(e.into()))?);
	}
	let mut req = builder
		.body(body)
		.map_err(|e| signing_error(e.into()))?;
	sign_request(&mut req, creds, SIGNING_NAME).map_err(signing_error)?;
	let (parts, body) = req.into_parts();
	Ok(SignedRequest {
		method,
		protocol: strng::new(protocol),
		hostname: strng::new(hostname),
		path: path.to_string(),
		headers: parts.headers,
		body,
	})
}

#[cfg(test)]
#[path = "bedrock_tests.rs"]
mod tests;
