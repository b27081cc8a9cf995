//! Mistral chat and prompt (text) bodies, including the Bedrock response shapes.

use serde::{Deserialize, Serialize};

use crate::llm::types::openai::Stop;
use crate::llm::validation::{Issues, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	System,
	User,
	Assistant,
	Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
	pub role: Role,
	pub content: String,
	/// Asks the model to continue this (final, assistant) message rather than answer it.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub prefix: Option<bool>,
}

impl Message {
	pub fn new(role: Role, content: impl Into<String>) -> Self {
		Self {
			role,
			content: content.into(),
			prefix: None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
	pub model: String,
	pub messages: Vec<Message>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
	#[serde(default)]
	pub stream: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stop: Option<Stop>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub random_seed: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub safe_prompt: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<serde_json::Value>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<serde_json::Value>,
}

impl ChatRequest {
	pub fn ends_with_prefix(&self) -> bool {
		self
			.messages
			.last()
			.is_some_and(|m| m.role == Role::Assistant && m.prefix == Some(true))
	}
}

impl Validate for ChatRequest {
	const REQUIRED: &'static [&'static str] = &["model", "messages"];

	fn check(&mut self, issues: &mut Issues) {
		issues.non_empty("model", &self.model);
		if self.messages.is_empty() {
			issues.push("messages", "must contain at least one message");
		}
		issues.range("temperature", self.temperature, 0.0, 1.5);
		issues.range("top_p", self.top_p, 0.0, 1.0);
		let last = self.messages.len().saturating_sub(1);
		for (i, m) in self.messages.iter().enumerate() {
			if m.prefix == Some(true) && (i != last || m.role != Role::Assistant) {
				issues.push(
					format!("messages[{i}].prefix"),
					"only the final assistant message may be a prefix",
				);
			}
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRequest {
	pub model: String,
	pub prompt: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_k: Option<u32>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub stop: Vec<String>,
	#[serde(default)]
	pub stream: bool,
}

impl Validate for TextRequest {
	const REQUIRED: &'static [&'static str] = &["model", "prompt"];

	fn check(&mut self, issues: &mut Issues) {
		issues.non_empty("model", &self.model);
		issues.non_empty("prompt", &self.prompt);
		issues.range("temperature", self.temperature, 0.0, 1.0);
		issues.range("top_p", self.top_p, 0.0, 1.0);
		if self.top_k.is_some_and(|k| k > 200) {
			issues.push("top_k", "must be at most 200");
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
	#[serde(default)]
	pub text: String,
	#[serde(default)]
	pub stop_reason: Option<String>,
}

/// Bedrock text completion response and stream chunk: `{"outputs": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextResponse {
	pub outputs: Vec<Output>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BedrockMessage {
	#[serde(default)]
	pub role: Option<Role>,
	#[serde(default)]
	pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BedrockChoice {
	#[serde(default)]
	pub index: u32,
	pub message: BedrockMessage,
	#[serde(default)]
	pub stop_reason: Option<String>,
}

/// Bedrock chat response and stream chunk. Unlike the native API these carry
/// `message` (not `delta`) and `stop_reason` (not `finish_reason`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BedrockChatResponse {
	pub choices: Vec<BedrockChoice>,
}
