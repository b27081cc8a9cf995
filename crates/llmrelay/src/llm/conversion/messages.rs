pub mod from_completions {
	use serde_json::{Value, json};

	use crate::llm::conversion::{finish_reason, from_value, mismatch, now, parse_data_url, to_value};
	use crate::llm::types::anthropic as messages;
	use crate::llm::types::openai as completions;
	use crate::llm::{AIError, Format, RequestBody, RequestContext};
	use crate::*;

	/// translate an OpenAI chat request to an anthropic messages request
	pub fn translate(ctx: &RequestContext) -> Result<RequestBody, AIError> {
		let RequestBody::OpenAI(req) = &ctx.body else {
			return Err(mismatch(ctx, Format::AnthropicChat));
		};
		translate_internal(req).map(RequestBody::AnthropicChat)
	}

	fn translate_internal(req: &completions::Request) -> Result<messages::MessagesRequest, AIError> {
		// Anthropic has all system prompts in a single field. Join them
		let system = req
			.messages
			.iter()
			.filter(|m| is_system(m.role))
			.map(completions::Message::text)
			.collect::<Vec<_>>()
			.join("\n");

		let mut out: Vec<messages::Message> = Vec::new();
		for msg in req.messages.iter().filter(|m| !is_system(m.role)) {
			let role = match msg.role {
				completions::Role::Assistant => messages::Role::Assistant,
				// Default to user for other roles
				_ => messages::Role::User,
			};
			let blocks = content_blocks(&msg.content)?;
			if blocks.is_empty() {
				continue;
			}
			// Roles must alternate, so adjacent turns from the same side are merged.
			match out.last_mut() {
				Some(last) if last.role == role => {
					let prev = std::mem::replace(&mut last.content, messages::Content::Blocks(vec![]));
					let mut merged = prev.into_blocks();
					merged.extend(blocks);
					last.content = messages::Content::Blocks(merged);
				},
				_ => out.push(messages::Message {
					role,
					content: messages::Content::Blocks(blocks),
				}),
			}
		}
		if out.first().is_some_and(|m| m.role != messages::Role::User) {
			out.insert(
				0,
				messages::Message {
					role: messages::Role::User,
					content: messages::Content::Text(".".to_string()),
				},
			);
		}

		Ok(messages::MessagesRequest {
			model: req.model.clone(),
			messages: out,
			system: (!system.is_empty()).then_some(messages::SystemPrompt::Text(system)),
			max_tokens: req.max_tokens(),
			stop_sequences: req.stop_sequences(),
			stream: req.stream,
			// OpenAI accepts up to 2.0
			temperature: req.temperature.map(|t| t.min(1.0)),
			top_p: req.top_p,
			top_k: None,
			metadata: req.user.clone().map(|u| messages::Metadata { user_id: Some(u) }),
			tools: req.tools.as_ref().map(|t| t.iter().filter_map(translate_tool).collect()),
			tool_choice: req.tool_choice.as_ref().and_then(translate_tool_choice),
			anthropic_version: None,
		})
	}

	fn is_system(role: completions::Role) -> bool {
		matches!(role, completions::Role::System | completions::Role::Developer)
	}

	fn content_blocks(content: &completions::Content) -> Result<Vec<messages::ContentBlock>, AIError> {
		let parts = match content {
			completions::Content::Text(t) if t.is_empty() => return Ok(vec![]),
			completions::Content::Text(t) => {
				return Ok(vec![messages::ContentBlock::Text { text: t.clone() }]);
			},
			completions::Content::Parts(parts) => parts,
		};
		parts
			.iter()
			.filter(|p| !matches!(p, completions::ContentPart::Text { text } if text.is_empty()))
			.map(|p| match p {
				completions::ContentPart::Text { text } => Ok(messages::ContentBlock::Text { text: text.clone() }),
				completions::ContentPart::ImageUrl { image_url } => {
					let (media_type, data) = parse_data_url(&image_url.url).ok_or_else(|| {
						AIError::UnsupportedContent(strng::literal!(
							"images must be provided as base64 data URLs"
						))
					})?;
					Ok(messages::ContentBlock::Image {
						source: messages::ImageSource::Base64 {
							media_type: media_type.to_string(),
							data: data.to_string(),
						},
					})
				},
			})
			.collect()
	}

	fn translate_tool(tool: &Value) -> Option<Value> {
		let f = tool.get("function")?;
		Some(json!({
			"name": f.get("name")?,
			"description": f.get("description").cloned().unwrap_or(Value::Null),
			"input_schema": f.get("parameters").cloned().unwrap_or_else(|| json!({"type": "object"})),
		}))
	}

	fn translate_tool_choice(choice: &Value) -> Option<Value> {
		match choice {
			Value::String(s) if s == "auto" => Some(json!({"type": "auto"})),
			Value::String(s) if s == "required" => Some(json!({"type": "any"})),
			Value::Object(o) => {
				let name = o.get("function")?.get("name")?;
				Some(json!({"type": "tool", "name": name}))
			},
			_ => None,
		}
	}

	/// translate an anthropic messages response back to an OpenAI chat response
	pub fn translate_response(resp: Value, _ctx: &RequestContext) -> Result<Value, AIError> {
		let resp: messages::MessagesResponse = from_value(resp)?;
		let usage = completions::Usage {
			prompt_tokens: resp.usage.input_tokens,
			completion_tokens: resp.usage.output_tokens,
			total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
		};
		to_value(&completions::Response {
			object: "chat.completion".to_string(),
			created: now(),
			model: resp.model.clone(),
			choices: vec![completions::Choice {
				index: 0,
				message: completions::ResponseMessage {
					role: completions::Role::Assistant,
					content: Some(resp.text()),
				},
				finish_reason: resp
					.stop_reason
					.as_deref()
					.map(|r| finish_reason::from_anthropic(r).to_string()),
			}],
			usage: Some(usage),
			id: resp.id,
		})
	}
}

pub mod from_anthropic_text {
	use serde_json::Value;

	use crate::llm::conversion::{finish_reason, from_value, mismatch, to_value};
	use crate::llm::types::anthropic::{
		self as messages, AI_PROMPT, CompletionRequest, CompletionResponse, HUMAN_PROMPT,
	};
	use crate::llm::{AIError, Format, RequestBody, RequestContext};

	/// translate a legacy `\n\nHuman: ... \n\nAssistant:` prompt into a messages request
	pub fn translate(ctx: &RequestContext) -> Result<RequestBody, AIError> {
		let RequestBody::AnthropicText(req) = &ctx.body else {
			return Err(mismatch(ctx, Format::AnthropicChat));
		};
		Ok(RequestBody::AnthropicChat(translate_internal(req)))
	}

	fn translate_internal(req: &CompletionRequest) -> messages::MessagesRequest {
		let (preamble, turns) = split_turns(&req.prompt);
		let mut out: Vec<messages::Message> = Vec::new();
		let last = turns.len().saturating_sub(1);
		for (i, (role, text)) in turns.into_iter().enumerate() {
			// The trailing empty `Assistant:` is the cue to respond, not a turn.
			if text.is_empty() && (i == last || role == messages::Role::User) {
				continue;
			}
			match out.last_mut() {
				Some(prev) if prev.role == role => {
					let merged = format!("{}\n\n{}", prev.content.text(), text);
					prev.content = messages::Content::Text(merged);
				},
				_ => out.push(messages::Message {
					role,
					content: messages::Content::Text(text),
				}),
			}
		}

		let mut system = (!preamble.is_empty()).then(|| preamble.clone());
		if out.first().is_none_or(|m| m.role != messages::Role::User) {
			// A prompt without a human turn is sent as one.
			let text = system.take().unwrap_or_else(|| ".".to_string());
			out.insert(
				0,
				messages::Message {
					role: messages::Role::User,
					content: messages::Content::Text(text),
				},
			);
		}

		messages::MessagesRequest {
			model: req.model.clone(),
			messages: out,
			system: system.map(messages::SystemPrompt::Text),
			max_tokens: req.max_tokens_to_sample,
			stop_sequences: req
				.stop_sequences
				.iter()
				.filter(|s| s.as_str() != HUMAN_PROMPT && s.as_str() != AI_PROMPT)
				.cloned()
				.collect(),
			stream: req.stream,
			temperature: req.temperature,
			top_p: req.top_p,
			top_k: req.top_k,
			metadata: req.metadata.clone(),
			tools: None,
			tool_choice: None,
			anthropic_version: None,
		}
	}

	/// Text before the first marker, then each turn in order with its text trimmed.
	pub(crate) fn split_turns(prompt: &str) -> (String, Vec<(messages::Role, String)>) {
		let mut preamble = String::new();
		let mut turns = Vec::new();
		let mut current: Option<messages::Role> = None;
		let mut rest = prompt;
		loop {
			let next = [
				(messages::Role::User, HUMAN_PROMPT),
				(messages::Role::Assistant, AI_PROMPT),
			]
			.into_iter()
			.filter_map(|(role, marker)| rest.find(marker).map(|at| (at, role, marker.len())))
			.min_by_key(|(at, _, _)| *at);
			let end = next.map(|(at, _, _)| at).unwrap_or(rest.len());
			let text = rest[..end].trim().to_string();
			match current {
				None => preamble = text,
				Some(role) => turns.push((role, text)),
			}
			let Some((at, role, len)) = next else {
				break;
			};
			current = Some(role);
			rest = &rest[at + len..];
		}
		(preamble, turns)
	}

	/// translate a messages response back to a legacy completion response
	pub fn translate_response(resp: Value, _ctx: &RequestContext) -> Result<Value, AIError> {
		let resp: messages::MessagesResponse = from_value(resp)?;
		let stop_reason = resp
			.stop_reason
			.as_deref()
			.map(|r| finish_reason::to_anthropic_text(finish_reason::from_anthropic(r)).to_string());
		to_value(&CompletionResponse {
			completion: resp.text(),
			id: resp.id,
			r#type: "completion".to_string(),
			stop_reason,
			model: resp.model,
		})
	}
}

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;
