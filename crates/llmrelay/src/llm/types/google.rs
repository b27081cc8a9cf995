//! Gemini `generateContent` bodies. The model is carried in the request path, not the body.

use serde::{Deserialize, Serialize};

use crate::llm::validation::{Issues, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	User,
	Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
	pub mime_type: String,
	pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
	Text {
		text: String,
	},
	InlineData {
		#[serde(rename = "inlineData")]
		inline_data: InlineData,
	},
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub role: Option<Role>,
	pub parts: Vec<Part>,
}

impl Content {
	pub fn text(&self) -> String {
		self
			.parts
			.iter()
			.filter_map(|p| match p {
				Part::Text { text } => Some(text.as_str()),
				Part::InlineData { .. } => None,
			})
			.collect()
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_output_tokens: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_k: Option<u32>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub stop_sequences: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub candidate_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetySetting {
	pub category: String,
	pub threshold: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
	pub contents: Vec<Content>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub system_instruction: Option<Content>,
	#[serde(default)]
	pub generation_config: GenerationConfig,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub safety_settings: Vec<SafetySetting>,
}

impl GenerateContentRequest {
	pub fn has_images(&self) -> bool {
		self
			.contents
			.iter()
			.flat_map(|c| c.parts.iter())
			.any(|p| matches!(p, Part::InlineData { .. }))
	}
}

impl Validate for GenerateContentRequest {
	const REQUIRED: &'static [&'static str] = &["contents"];

	fn check(&mut self, issues: &mut Issues) {
		if self.contents.is_empty() {
			issues.push("contents", "must contain at least one entry");
		}
		for (i, c) in self.contents.iter().enumerate() {
			if c.parts.is_empty() {
				issues.push(format!("contents[{i}].parts"), "must contain at least one part");
			}
		}
		let cfg = &self.generation_config;
		issues.range("generationConfig.temperature", cfg.temperature, 0.0, 2.0);
		issues.range("generationConfig.topP", cfg.top_p, 0.0, 1.0);
		if cfg.stop_sequences.len() > 5 {
			issues.push(
				"generationConfig.stopSequences",
				"at most 5 stop sequences are allowed",
			);
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
	#[serde(default)]
	pub content: Option<Content>,
	#[serde(default)]
	pub finish_reason: Option<String>,
	#[serde(default)]
	pub index: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
	#[serde(default)]
	pub prompt_token_count: u64,
	#[serde(default)]
	pub candidates_token_count: u64,
	#[serde(default)]
	pub total_token_count: u64,
}

/// Used for both the blocking response and each streamed chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
	pub candidates: Vec<Candidate>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usage_metadata: Option<UsageMetadata>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model_version: Option<String>,
}

impl GenerateContentResponse {
	pub fn text(&self) -> String {
		self
			.candidates
			.first()
			.and_then(|c| c.content.as_ref())
			.map(Content::text)
			.unwrap_or_default()
	}
}
