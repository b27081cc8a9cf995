pub mod anthropic;
pub mod google;
pub mod mistral;
pub mod openai;

use serde_json::Value;

use crate::llm::{AIError, Format};

/// A request body that has passed the validation rules of its format.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
	OpenAI(openai::Request),
	OpenAIText(openai::TextRequest),
	AnthropicChat(anthropic::MessagesRequest),
	AnthropicText(anthropic::CompletionRequest),
	GoogleAI(google::GenerateContentRequest),
	MistralAI(mistral::ChatRequest),
	MistralText(mistral::TextRequest),
}

impl RequestBody {
	pub fn format(&self) -> Format {
		match self {
			RequestBody::OpenAI(_) => Format::OpenAI,
			RequestBody::OpenAIText(_) => Format::OpenAIText,
			RequestBody::AnthropicChat(_) => Format::AnthropicChat,
			RequestBody::AnthropicText(_) => Format::AnthropicText,
			RequestBody::GoogleAI(_) => Format::GoogleAI,
			RequestBody::MistralAI(_) => Format::MistralAI,
			RequestBody::MistralText(_) => Format::MistralText,
		}
	}

	pub fn to_value(&self) -> Result<Value, AIError> {
		match self {
			RequestBody::OpenAI(b) => serde_json::to_value(b),
			RequestBody::OpenAIText(b) => serde_json::to_value(b),
			RequestBody::AnthropicChat(b) => serde_json::to_value(b),
			RequestBody::AnthropicText(b) => serde_json::to_value(b),
			RequestBody::GoogleAI(b) => serde_json::to_value(b),
			RequestBody::MistralAI(b) => serde_json::to_value(b),
			RequestBody::MistralText(b) => serde_json::to_value(b),
		}
		.map_err(AIError::RequestMarshal)
	}

	/// The model named in the body. Gemini bodies carry none.
	pub fn model(&self) -> Option<&str> {
		match self {
			RequestBody::OpenAI(b) => Some(&b.model),
			RequestBody::OpenAIText(b) => Some(&b.model),
			RequestBody::AnthropicChat(b) => Some(&b.model),
			RequestBody::AnthropicText(b) => Some(&b.model),
			RequestBody::GoogleAI(_) => None,
			RequestBody::MistralAI(b) => Some(&b.model),
			RequestBody::MistralText(b) => Some(&b.model),
		}
	}

	pub fn is_streaming(&self) -> bool {
		match self {
			RequestBody::OpenAI(b) => b.stream,
			RequestBody::OpenAIText(b) => b.stream,
			RequestBody::AnthropicChat(b) => b.stream,
			RequestBody::AnthropicText(b) => b.stream,
			// Gemini selects streaming by endpoint.
			RequestBody::GoogleAI(_) => false,
			RequestBody::MistralAI(b) => b.stream,
			RequestBody::MistralText(b) => b.stream,
		}
	}

	pub fn has_images(&self) -> bool {
		match self {
			RequestBody::OpenAI(b) => b.messages.iter().any(openai::Message::has_images),
			RequestBody::AnthropicChat(b) => b.has_images(),
			RequestBody::GoogleAI(b) => b.has_images(),
			RequestBody::OpenAIText(_)
			| RequestBody::AnthropicText(_)
			| RequestBody::MistralAI(_)
			| RequestBody::MistralText(_) => false,
		}
	}
}
