//! OpenAI chat and legacy text completion bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::validation::{Issues, Validate};

pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	System,
	Developer,
	User,
	Assistant,
	Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
	Text(String),
	Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
	Text { text: String },
	ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
	pub url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Stop {
	One(String),
	Many(Vec<String>),
}

impl Stop {
	pub fn into_vec(self) -> Vec<String> {
		match self {
			Stop::One(s) => vec![s],
			Stop::Many(v) => v,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
	pub role: Role,
	#[serde(default = "empty_content")]
	pub content: Content,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}

fn empty_content() -> Content {
	Content::Text(String::new())
}

impl Message {
	/// Text of the message with image parts dropped.
	pub fn text(&self) -> String {
		match &self.content {
			Content::Text(t) => t.clone(),
			Content::Parts(parts) => parts
				.iter()
				.filter_map(|p| match p {
					ContentPart::Text { text } => Some(text.as_str()),
					ContentPart::ImageUrl { .. } => None,
				})
				.collect::<Vec<_>>()
				.join("\n"),
		}
	}

	pub fn has_images(&self) -> bool {
		match &self.content {
			Content::Text(_) => false,
			Content::Parts(parts) => parts
				.iter()
				.any(|p| matches!(p, ContentPart::ImageUrl { .. })),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
	pub model: String,
	pub messages: Vec<Message>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_completion_tokens: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub n: Option<u32>,
	#[serde(default)]
	pub stream: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stop: Option<Stop>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub presence_penalty: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub frequency_penalty: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub seed: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub logit_bias: Option<serde_json::Map<String, Value>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<Value>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<Value>,
}

impl Request {
	pub fn max_tokens(&self) -> u32 {
		self
			.max_completion_tokens
			.or(self.max_tokens)
			.unwrap_or(DEFAULT_MAX_TOKENS)
	}

	pub fn stop_sequences(&self) -> Vec<String> {
		self.stop.clone().map(Stop::into_vec).unwrap_or_default()
	}
}

impl Validate for Request {
	const REQUIRED: &'static [&'static str] = &["model", "messages"];

	fn check(&mut self, issues: &mut Issues) {
		issues.non_empty("model", &self.model);
		if self.messages.is_empty() {
			issues.push("messages", "must contain at least one message");
		}
		issues.range("temperature", self.temperature, 0.0, 2.0);
		issues.range("top_p", self.top_p, 0.0, 1.0);
		issues.range("presence_penalty", self.presence_penalty, -2.0, 2.0);
		issues.range("frequency_penalty", self.frequency_penalty, -2.0, 2.0);
		if self.n.is_some_and(|n| n == 0) {
			issues.push("n", "must be at least 1");
		}
		if let Some(Stop::Many(stops)) = &self.stop
			&& stops.len() > 4
		{
			issues.push("stop", "at most 4 stop sequences are allowed");
		}
		for (i, m) in self.messages.iter().enumerate() {
			if let Content::Parts(parts) = &m.content
				&& parts.is_empty()
			{
				issues.push(format!("messages[{i}].content"), "must contain at least one part");
			}
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
	One(String),
	Many(Vec<String>),
}

/// Legacy `/v1/completions` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRequest {
	pub model: String,
	pub prompt: Prompt,
	#[serde(default = "default_text_max_tokens")]
	pub max_tokens: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub n: Option<u32>,
	#[serde(default)]
	pub stream: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stop: Option<Stop>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub presence_penalty: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub frequency_penalty: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub logprobs: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user: Option<String>,
}

fn default_text_max_tokens() -> u32 {
	16
}

impl Validate for TextRequest {
	const REQUIRED: &'static [&'static str] = &["model", "prompt"];

	fn check(&mut self, issues: &mut Issues) {
		issues.non_empty("model", &self.model);
		if let Prompt::Many(p) = &self.prompt
			&& p.is_empty()
		{
			issues.push("prompt", "must not be empty");
		}
		issues.range("temperature", self.temperature, 0.0, 2.0);
		issues.range("top_p", self.top_p, 0.0, 1.0);
		if self.max_tokens == 0 {
			issues.push("max_tokens", "must be at least 1");
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
	#[serde(default)]
	pub prompt_tokens: u64,
	#[serde(default)]
	pub completion_tokens: u64,
	#[serde(default)]
	pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
	pub role: Role,
	#[serde(default)]
	pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
	pub index: u32,
	pub message: ResponseMessage,
	#[serde(default)]
	pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
	pub id: String,
	pub object: String,
	pub created: i64,
	pub model: String,
	pub choices: Vec<Choice>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChoice {
	pub text: String,
	pub index: u32,
	#[serde(default)]
	pub logprobs: Option<Value>,
	#[serde(default)]
	pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextResponse {
	pub id: String,
	pub object: String,
	pub created: i64,
	pub model: String,
	pub choices: Vec<TextChoice>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub role: Option<Role>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
	pub index: u32,
	#[serde(default)]
	pub delta: Delta,
	#[serde(default)]
	pub finish_reason: Option<String>,
}

pub const CHUNK_OBJECT: &str = "chat.completion.chunk";

/// A `chat.completion.chunk`. Every streamed dialect is bridged into this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamResponse {
	pub id: String,
	pub object: String,
	pub created: i64,
	pub model: String,
	pub choices: Vec<ChunkChoice>,
}

impl StreamResponse {
	pub fn first_choice(&self) -> Option<&ChunkChoice> {
		self.choices.first()
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunkChoice {
	#[serde(default)]
	pub text: String,
	#[serde(default)]
	pub index: u32,
	#[serde(default)]
	pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStreamResponse {
	pub id: String,
	#[serde(default)]
	pub object: String,
	#[serde(default)]
	pub created: i64,
	#[serde(default)]
	pub model: String,
	pub choices: Vec<TextChunkChoice>,
}
