//! Anthropic Messages and legacy Text Completions bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::validation::{Issues, Validate};

pub const HUMAN_PROMPT: &str = "\n\nHuman:";
pub const AI_PROMPT: &str = "\n\nAssistant:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	User,
	Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
	Base64 { media_type: String, data: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
	Text { text: String },
	Image { source: ImageSource },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
	Text(String),
	Blocks(Vec<ContentBlock>),
}

impl Content {
	pub fn into_blocks(self) -> Vec<ContentBlock> {
		match self {
			Content::Text(text) => vec![ContentBlock::Text { text }],
			Content::Blocks(b) => b,
		}
	}

	pub fn text(&self) -> String {
		match self {
			Content::Text(t) => t.clone(),
			Content::Blocks(blocks) => blocks
				.iter()
				.filter_map(|b| match b {
					ContentBlock::Text { text } => Some(text.as_str()),
					ContentBlock::Image { .. } => None,
				})
				.collect::<Vec<_>>()
				.join("\n"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
	pub role: Role,
	pub content: Content,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
	Text(String),
	Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesRequest {
	pub model: String,
	pub messages: Vec<Message>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub system: Option<SystemPrompt>,
	pub max_tokens: u32,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub stop_sequences: Vec<String>,
	#[serde(default)]
	pub stream: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_k: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub metadata: Option<Metadata>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<Value>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub anthropic_version: Option<String>,
}

impl MessagesRequest {
	pub fn has_images(&self) -> bool {
		self.messages.iter().any(|m| {
			matches!(&m.content, Content::Blocks(b) if b.iter().any(|b| matches!(b, ContentBlock::Image { .. })))
		})
	}
}

impl Validate for MessagesRequest {
	const REQUIRED: &'static [&'static str] = &["model", "messages", "max_tokens"];

	fn check(&mut self, issues: &mut Issues) {
		issues.non_empty("model", &self.model);
		if self.messages.is_empty() {
			issues.push("messages", "must contain at least one message");
		}
		if let Some(first) = self.messages.first()
			&& first.role != Role::User
		{
			issues.push("messages[0].role", "first message must use the user role");
		}
		for (i, pair) in self.messages.windows(2).enumerate() {
			if pair[0].role == pair[1].role {
				issues.push(
					format!("messages[{}].role", i + 1),
					"roles must alternate between user and assistant",
				);
			}
		}
		if self.max_tokens == 0 {
			issues.push("max_tokens", "must be at least 1");
		}
		issues.range("temperature", self.temperature, 0.0, 1.0);
		issues.range("top_p", self.top_p, 0.0, 1.0);
	}
}

/// Legacy `/v1/complete` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
	pub model: String,
	pub prompt: String,
	pub max_tokens_to_sample: u32,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub stop_sequences: Vec<String>,
	#[serde(default)]
	pub stream: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_k: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub metadata: Option<Metadata>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub anthropic_version: Option<String>,
}

impl Validate for CompletionRequest {
	const REQUIRED: &'static [&'static str] = &["model", "prompt", "max_tokens_to_sample"];

	fn check(&mut self, issues: &mut Issues) {
		issues.non_empty("model", &self.model);
		issues.non_empty("prompt", &self.prompt);
		if self.max_tokens_to_sample == 0 {
			issues.push("max_tokens_to_sample", "must be at least 1");
		}
		issues.range("temperature", self.temperature, 0.0, 1.0);
		issues.range("top_p", self.top_p, 0.0, 1.0);
		if !self.stop_sequences.iter().any(|s| s == HUMAN_PROMPT) {
			self.stop_sequences.push(HUMAN_PROMPT.to_string());
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
	#[serde(default)]
	pub input_tokens: u64,
	#[serde(default)]
	pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseContent {
	Text { text: String },
	ToolUse { id: String, name: String, input: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesResponse {
	pub id: String,
	#[serde(rename = "type")]
	pub r#type: String,
	pub role: Role,
	pub model: String,
	pub content: Vec<ResponseContent>,
	#[serde(default)]
	pub stop_reason: Option<String>,
	#[serde(default)]
	pub stop_sequence: Option<String>,
	#[serde(default)]
	pub usage: Usage,
}

impl MessagesResponse {
	pub fn text(&self) -> String {
		self
			.content
			.iter()
			.filter_map(|c| match c {
				ResponseContent::Text { text } => Some(text.as_str()),
				ResponseContent::ToolUse { .. } => None,
			})
			.collect()
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
	#[serde(default)]
	pub id: String,
	#[serde(rename = "type", default)]
	pub r#type: String,
	pub completion: String,
	#[serde(default)]
	pub stop_reason: Option<String>,
	#[serde(default)]
	pub model: String,
}

/// Message header carried by `message_start`; other fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartMessage {
	pub id: String,
	#[serde(default)]
	pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
	TextDelta { text: String },
	InputJsonDelta { partial_json: String },
	ThinkingDelta { thinking: String },
	SignatureDelta { signature: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDelta {
	#[serde(default)]
	pub stop_reason: Option<String>,
	#[serde(default)]
	pub stop_sequence: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagesStreamEvent {
	MessageStart {
		message: StartMessage,
	},
	ContentBlockStart {
		index: u32,
		content_block: Value,
	},
	ContentBlockDelta {
		index: u32,
		delta: BlockDelta,
	},
	ContentBlockStop {
		index: u32,
	},
	MessageDelta {
		delta: MessageDelta,
		#[serde(default)]
		usage: Option<Value>,
	},
	MessageStop,
	Ping,
	Error {
		error: Value,
	},
}

/// A streamed text completion chunk. Bedrock omits the `type` tag, so this is matched by shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionChunk {
	pub completion: String,
	#[serde(default)]
	pub stop_reason: Option<String>,
	#[serde(default)]
	pub model: Option<String>,
	#[serde(default)]
	pub log_id: Option<String>,
}
