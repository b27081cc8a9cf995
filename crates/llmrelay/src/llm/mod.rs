use std::fmt;
use std::str::FromStr;

use crate::http::SignedRequest;
use crate::keys::Key;
use crate::*;

pub mod aggregator;
pub mod bedrock;
pub mod conversion;
pub mod gemini;
pub mod normalize;
pub mod outbound;
pub mod registry;
pub mod repair;
pub mod streaming;
pub mod types;
pub mod validation;

pub use registry::Registry;
pub use types::RequestBody;
pub use validation::{ValidationError, ValidationIssue};

/// A request/response dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Format {
	#[serde(rename = "openai")]
	OpenAI,
	#[serde(rename = "openai-text")]
	OpenAIText,
	#[serde(rename = "anthropic-chat")]
	AnthropicChat,
	#[serde(rename = "anthropic-text")]
	AnthropicText,
	#[serde(rename = "google-ai")]
	GoogleAI,
	#[serde(rename = "mistral-ai")]
	MistralAI,
	#[serde(rename = "mistral-text")]
	MistralText,
}

impl Format {
	pub const ALL: [Format; 7] = [
		Format::OpenAI,
		Format::OpenAIText,
		Format::AnthropicChat,
		Format::AnthropicText,
		Format::GoogleAI,
		Format::MistralAI,
		Format::MistralText,
	];

	pub const fn as_str(&self) -> &'static str {
		match self {
			Format::OpenAI => "openai",
			Format::OpenAIText => "openai-text",
			Format::AnthropicChat => "anthropic-chat",
			Format::AnthropicText => "anthropic-text",
			Format::GoogleAI => "google-ai",
			Format::MistralAI => "mistral-ai",
			Format::MistralText => "mistral-text",
		}
	}
}

impl fmt::Display for Format {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Format {
	type Err = AIError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Format::ALL
			.into_iter()
			.find(|f| f.as_str() == s)
			.ok_or_else(|| AIError::UnknownFormat(strng::new(s)))
	}
}

/// An upstream provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Service {
	#[serde(rename = "openai")]
	OpenAI,
	#[serde(rename = "anthropic")]
	Anthropic,
	#[serde(rename = "google-ai")]
	GoogleAI,
	#[serde(rename = "mistral-ai")]
	MistralAI,
	#[serde(rename = "aws")]
	Aws,
}

impl Service {
	pub const ALL: [Service; 5] = [
		Service::OpenAI,
		Service::Anthropic,
		Service::GoogleAI,
		Service::MistralAI,
		Service::Aws,
	];

	pub const fn as_str(&self) -> &'static str {
		match self {
			Service::OpenAI => "openai",
			Service::Anthropic => "anthropic",
			Service::GoogleAI => "google-ai",
			Service::MistralAI => "mistral-ai",
			Service::Aws => "aws",
		}
	}

	/// Requests to this service must carry a per-request signature.
	pub const fn requires_signing(&self) -> bool {
		matches!(self, Service::Aws)
	}

	/// Whether the service honors `prefix` on a trailing assistant message.
	pub const fn supports_prefix(&self) -> bool {
		!matches!(self, Service::Aws)
	}

	/// The dialect this service speaks for `model`, given what the client sent.
	pub fn outbound_format(&self, inbound: Format, model: &str) -> Format {
		let legacy_claude = ["claude-2", "claude-v2", "claude-instant"]
			.iter()
			.any(|m| model.contains(m));
		match self {
			Service::OpenAI if inbound == Format::OpenAIText || model.contains("-instruct") => {
				Format::OpenAIText
			},
			Service::OpenAI => Format::OpenAI,
			Service::Anthropic | Service::Aws if model.contains("claude") => {
				if legacy_claude && matches!(inbound, Format::AnthropicText | Format::OpenAI) {
					Format::AnthropicText
				} else {
					Format::AnthropicChat
				}
			},
			Service::Anthropic => Format::AnthropicChat,
			Service::GoogleAI => Format::GoogleAI,
			Service::MistralAI => Format::MistralAI,
			Service::Aws if inbound == Format::MistralText => Format::MistralText,
			Service::Aws => Format::MistralAI,
		}
	}
}

impl fmt::Display for Service {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Coarse model grouping used for key capabilities and access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelFamily {
	Turbo,
	Gpt4,
	Gpt4o,
	Claude,
	ClaudeOpus,
	GeminiFlash,
	GeminiPro,
	MistralTiny,
	MistralSmall,
	MistralMedium,
	MistralLarge,
	AwsClaude,
	AwsClaudeOpus,
	AwsMistralTiny,
	AwsMistralSmall,
	AwsMistralMedium,
	AwsMistralLarge,
}

impl ModelFamily {
	pub const fn as_str(&self) -> &'static str {
		match self {
			ModelFamily::Turbo => "turbo",
			ModelFamily::Gpt4 => "gpt4",
			ModelFamily::Gpt4o => "gpt4o",
			ModelFamily::Claude => "claude",
			ModelFamily::ClaudeOpus => "claude-opus",
			ModelFamily::GeminiFlash => "gemini-flash",
			ModelFamily::GeminiPro => "gemini-pro",
			ModelFamily::MistralTiny => "mistral-tiny",
			ModelFamily::MistralSmall => "mistral-small",
			ModelFamily::MistralMedium => "mistral-medium",
			ModelFamily::MistralLarge => "mistral-large",
			ModelFamily::AwsClaude => "aws-claude",
			ModelFamily::AwsClaudeOpus => "aws-claude-opus",
			ModelFamily::AwsMistralTiny => "aws-mistral-tiny",
			ModelFamily::AwsMistralSmall => "aws-mistral-small",
			ModelFamily::AwsMistralMedium => "aws-mistral-medium",
			ModelFamily::AwsMistralLarge => "aws-mistral-large",
		}
	}

	pub fn for_model(service: Service, model: &str) -> ModelFamily {
		let model = model.to_ascii_lowercase();
		match service {
			Service::OpenAI if model.starts_with("gpt-4o") => ModelFamily::Gpt4o,
			Service::OpenAI if model.starts_with("gpt-4") => ModelFamily::Gpt4,
			Service::OpenAI => ModelFamily::Turbo,
			Service::Anthropic if model.contains("opus") => ModelFamily::ClaudeOpus,
			Service::Anthropic => ModelFamily::Claude,
			Service::GoogleAI if model.contains("flash") => ModelFamily::GeminiFlash,
			Service::GoogleAI => ModelFamily::GeminiPro,
			Service::MistralAI => mistral_size(&model, false),
			Service::Aws if model.contains("mistral") => mistral_size(&model, true),
			Service::Aws if model.contains("opus") => ModelFamily::AwsClaudeOpus,
			Service::Aws => ModelFamily::AwsClaude,
		}
	}
}

fn mistral_size(model: &str, aws: bool) -> ModelFamily {
	use ModelFamily::*;
	let (tiny, small, medium, large) = if aws {
		(AwsMistralTiny, AwsMistralSmall, AwsMistralMedium, AwsMistralLarge)
	} else {
		(MistralTiny, MistralSmall, MistralMedium, MistralLarge)
	};
	if model.contains("large") {
		large
	} else if model.contains("medium") {
		medium
	} else if model.contains("small") || model.contains("mixtral") {
		small
	} else {
		tiny
	}
}

impl fmt::Display for ModelFamily {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Per-request state threaded through the pipeline stages.
#[derive(Debug, Clone)]
pub struct RequestContext {
	pub id: Strng,
	pub inbound: Format,
	pub outbound: Format,
	pub service: Service,
	pub model: Strng,
	pub streaming: bool,
	pub body: RequestBody,
	/// Snapshot of the key bound for this attempt.
	pub key: Option<Key>,
	pub retry_count: u32,
	pub signed_request: Option<SignedRequest>,
}

impl RequestContext {
	pub fn new(service: Service, body: RequestBody) -> Self {
		let inbound = body.format();
		let model = strng::new(body.model().unwrap_or_default());
		Self {
			id: strng::new(uuid::Uuid::new_v4().to_string()),
			inbound,
			outbound: service.outbound_format(inbound, &model),
			service,
			streaming: body.is_streaming(),
			model,
			body,
			key: None,
			retry_count: 0,
			signed_request: None,
		}
	}

	/// Overrides the model, for dialects that carry it outside the body.
	pub fn with_model(mut self, model: impl AsRef<str>) -> Self {
		self.model = strng::new(model);
		self.outbound = self.service.outbound_format(self.inbound, &self.model);
		self
	}

	pub fn with_streaming(mut self, streaming: bool) -> Self {
		self.streaming = streaming;
		self
	}

	pub fn model_family(&self) -> ModelFamily {
		ModelFamily::for_model(self.service, &self.model)
	}

	pub fn key_hash(&self) -> Option<&Strng> {
		self.key.as_ref().map(|k| &k.hash)
	}

	/// Clears per-attempt state. The transformed body is kept, so the next attempt does not
	/// transform it a second time.
	pub fn prepare_retry(&mut self) {
		self.retry_count += 1;
		self.key = None;
		self.signed_request = None;
	}
}

#[derive(thiserror::Error, Debug)]
pub enum AIError {
	#[error("unknown format: {0}")]
	UnknownFormat(Strng),
	#[error(transparent)]
	Validation(#[from] ValidationError),
	#[error("no transformation from {from} to {to}")]
	UnsupportedTransformation { from: Format, to: Format },
	#[error("{0} does not support this request")]
	UnsupportedFormat(Format),
	#[error("unsupported content: {0}")]
	UnsupportedContent(Strng),
	#[error("failed to marshal request: {0}")]
	RequestMarshal(serde_json::Error),
	#[error("failed to parse response: {0}")]
	ResponseParsing(serde_json::Error),
	#[error("failed to marshal response: {0}")]
	ResponseMarshal(serde_json::Error),
	#[error("no keys available for {model} on {service}")]
	NoKeysAvailable { service: Service, model: Strng },
	#[error("model family {0} is not allowed")]
	ModelFamilyNotAllowed(ModelFamily),
	#[error("image inputs are not allowed for {0}")]
	VisionNotAllowed(Service),
	#[error("key material is malformed")]
	InvalidKeyMaterial,
	#[error("failed to sign request: {0}")]
	Signing(Strng),
	#[error("unsupported content encoding: {0}")]
	UnsupportedEncoding(Strng),
	#[error("failed to decompress response: {0}")]
	Decompression(std::io::Error),
	#[error("upstream returned an invalid body: {0}")]
	InvalidUpstreamBody(serde_json::Error),
	#[error("unexpected {format} stream event: {event}")]
	UnexpectedStreamEvent { format: Format, event: Strng },
	#[error("failed to decode stream: {0}")]
	StreamDecoding(#[from] crate::parse::Error),
	#[error("upstream request failed: {0}")]
	Upstream(Strng),
	#[error("client disconnected")]
	ClientDisconnected,
}
