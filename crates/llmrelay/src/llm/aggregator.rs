//! Rebuilds one blocking response from a streamed upstream reply.
//!
//! Every upstream event is bridged into an OpenAI chat completion chunk. The first chunk only
//! carries metadata; later chunks contribute content deltas and finish reasons. The final
//! response is shaped like the blocking response of the outbound format, so the same response
//! translators apply to streamed and blocking replies.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::llm::conversion::{finish_reason, now, to_value};
use crate::llm::types::{anthropic, google, mistral, openai};
use crate::llm::{AIError, Format};
use crate::*;

#[derive(Debug, Clone)]
pub struct EventAggregator {
	inbound: Format,
	outbound: Format,
	model: Strng,
	id: String,
	created: i64,
	events: Vec<openai::StreamResponse>,
}

/// What a bridged event contributes.
#[derive(Debug, Default)]
struct Partial {
	id: Option<String>,
	model: Option<String>,
	content: Option<String>,
	finish_reason: Option<String>,
}

impl EventAggregator {
	pub fn new(inbound: Format, outbound: Format, model: impl Into<Strng>) -> Self {
		Self {
			inbound,
			outbound,
			model: model.into(),
			id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
			created: now(),
			events: Vec::new(),
		}
	}

	pub fn inbound(&self) -> Format {
		self.inbound
	}

	pub fn outbound(&self) -> Format {
		self.outbound
	}

	pub fn events(&self) -> &[openai::StreamResponse] {
		&self.events
	}

	/// Appends `event`, bridging it from the outbound dialect if needed.
	pub fn add_event(&mut self, event: Value) -> Result<(), AIError> {
		let chunk = if is_canonical(&event) {
			decode(self.outbound, &event)?
		} else {
			match self.bridge(&event)? {
				Some(chunk) => chunk,
				None => return Ok(()),
			}
		};
		if self.events.is_empty() && carries_data(&chunk) {
			let meta = self.metadata(&chunk);
			self.events.push(meta);
		}
		self.events.push(chunk);
		Ok(())
	}

	/// Merges the events into a response in the outbound format. Calling this again without
	/// adding events gives the same result.
	pub fn final_response(&self) -> Result<Value, AIError> {
		let (id, model, created) = match self.events.first() {
			Some(first) => (
				non_empty(&first.id).unwrap_or(&self.id).to_string(),
				non_empty(&first.model).unwrap_or(&self.model).to_string(),
				first.created,
			),
			None => (self.id.clone(), self.model.to_string(), self.created),
		};
		let mut content = String::new();
		let mut finish: Option<String> = None;
		for choice in self.events.iter().skip(1).filter_map(|e| e.first_choice()) {
			if let Some(delta) = &choice.delta.content {
				content.push_str(delta);
			}
			if let Some(reason) = choice.finish_reason.as_deref().filter(|r| !r.is_empty()) {
				finish = Some(reason.to_string());
			}
		}
		let finish = finish.as_deref();

		match self.outbound {
			Format::OpenAI | Format::MistralAI => to_value(&openai::Response {
				id,
				object: "chat.completion".to_string(),
				created,
				model,
				choices: vec![openai::Choice {
					index: 0,
					message: openai::ResponseMessage {
						role: openai::Role::Assistant,
						content: Some(content),
					},
					finish_reason: finish.map(str::to_string),
				}],
				usage: None,
			}),
			Format::OpenAIText => to_value(&openai::TextResponse {
				id,
				object: "text_completion".to_string(),
				created,
				model,
				choices: vec![openai::TextChoice {
					text: content,
					index: 0,
					logprobs: None,
					finish_reason: finish.map(str::to_string),
				}],
				usage: None,
			}),
			Format::AnthropicChat => to_value(&anthropic::MessagesResponse {
				id,
				r#type: "message".to_string(),
				role: anthropic::Role::Assistant,
				model,
				content: vec![anthropic::ResponseContent::Text { text: content }],
				stop_reason: finish.map(|r| finish_reason::to_anthropic(r).to_string()),
				stop_sequence: None,
				usage: Default::default(),
			}),
			Format::AnthropicText => to_value(&anthropic::CompletionResponse {
				id,
				r#type: "completion".to_string(),
				completion: content,
				stop_reason: finish.map(|r| finish_reason::to_anthropic_text(r).to_string()),
				model,
			}),
			Format::GoogleAI => to_value(&google::GenerateContentResponse {
				candidates: vec![google::Candidate {
					content: Some(google::Content {
						role: Some(google::Role::Model),
						parts: vec![google::Part::Text { text: content }],
					}),
					finish_reason: finish.map(|r| finish_reason::to_google(r).to_string()),
					index: 0,
				}],
				usage_metadata: None,
				model_version: Some(model),
			}),
			Format::MistralText => to_value(&mistral::TextResponse {
				outputs: vec![mistral::Output {
					text: content,
					stop_reason: finish.map(str::to_string),
				}],
			}),
		}
	}

	fn bridge(&self, event: &Value) -> Result<Option<openai::StreamResponse>, AIError> {
		let partial = match self.outbound {
			// OpenAI only ever sends canonical chunks.
			Format::OpenAI => return Err(self.unexpected(event)),
			Format::OpenAIText => {
				let e: openai::TextStreamResponse = self.parse(event)?;
				let choice = e.choices.into_iter().next();
				Some(Partial {
					id: non_empty(&e.id).map(str::to_string),
					model: non_empty(&e.model).map(str::to_string),
					content: choice.as_ref().map(|c| c.text.clone()),
					finish_reason: choice.and_then(|c| c.finish_reason),
				})
			},
			Format::AnthropicChat => match self.parse::<anthropic::MessagesStreamEvent>(event)? {
				anthropic::MessagesStreamEvent::MessageStart { message } => Some(Partial {
					id: Some(message.id),
					model: non_empty(&message.model).map(str::to_string),
					..Default::default()
				}),
				anthropic::MessagesStreamEvent::ContentBlockDelta {
					delta: anthropic::BlockDelta::TextDelta { text },
					..
				} => Some(Partial {
					content: Some(text),
					..Default::default()
				}),
				anthropic::MessagesStreamEvent::MessageDelta { delta, .. } => Some(Partial {
					finish_reason: delta
						.stop_reason
						.as_deref()
						.map(|r| finish_reason::from_anthropic(r).to_string()),
					..Default::default()
				}),
				anthropic::MessagesStreamEvent::Error { error } => {
					return Err(AIError::Upstream(strng::new(error.to_string())));
				},
				anthropic::MessagesStreamEvent::ContentBlockDelta { .. }
				| anthropic::MessagesStreamEvent::ContentBlockStart { .. }
				| anthropic::MessagesStreamEvent::ContentBlockStop { .. }
				| anthropic::MessagesStreamEvent::MessageStop
				| anthropic::MessagesStreamEvent::Ping => None,
			},
			Format::AnthropicText => {
				if event.get("type").and_then(Value::as_str) == Some("ping") {
					return Ok(None);
				}
				let e: anthropic::CompletionChunk = self.parse(event)?;
				Some(Partial {
					model: e.model,
					content: Some(e.completion),
					finish_reason: e
						.stop_reason
						.as_deref()
						.map(|r| finish_reason::from_anthropic(r).to_string()),
					..Default::default()
				})
			},
			Format::GoogleAI => {
				let e: google::GenerateContentResponse = self.parse(event)?;
				let finish = e
					.candidates
					.first()
					.and_then(|c| c.finish_reason.as_deref())
					.map(|r| finish_reason::from_google(r).to_string());
				Some(Partial {
					model: e.model_version.clone(),
					content: Some(e.text()),
					finish_reason: finish,
					..Default::default()
				})
			},
			Format::MistralAI => {
				let e: mistral::BedrockChatResponse = self.parse(event)?;
				let choice = e.choices.into_iter().next();
				Some(Partial {
					content: choice.as_ref().and_then(|c| c.message.content.clone()),
					finish_reason: choice
						.and_then(|c| c.stop_reason)
						.map(|r| finish_reason::from_mistral(&r).to_string()),
					..Default::default()
				})
			},
			Format::MistralText => {
				let e: mistral::TextResponse = self.parse(event)?;
				let output = e.outputs.into_iter().next();
				Some(Partial {
					content: output.as_ref().map(|o| o.text.clone()),
					finish_reason: output
						.and_then(|o| o.stop_reason)
						.map(|r| finish_reason::from_mistral(&r).to_string()),
					..Default::default()
				})
			},
		};
		Ok(partial.map(|p| self.chunk(p)))
	}

	fn chunk(&self, p: Partial) -> openai::StreamResponse {
		let role = p.id.is_some().then_some(openai::Role::Assistant);
		openai::StreamResponse {
			id: p.id.unwrap_or_else(|| self.id.clone()),
			object: openai::CHUNK_OBJECT.to_string(),
			created: self.created,
			model: p.model.unwrap_or_else(|| self.model.to_string()),
			choices: vec![openai::ChunkChoice {
				index: 0,
				delta: openai::Delta {
					role,
					content: p.content,
				},
				finish_reason: p.finish_reason,
			}],
		}
	}

	/// A metadata only chunk to lead a stream whose first event already carries data.
	fn metadata(&self, first: &openai::StreamResponse) -> openai::StreamResponse {
		openai::StreamResponse {
			id: first.id.clone(),
			object: openai::CHUNK_OBJECT.to_string(),
			created: first.created,
			model: first.model.clone(),
			choices: vec![openai::ChunkChoice {
				index: 0,
				delta: openai::Delta {
					role: Some(openai::Role::Assistant),
					content: None,
				},
				finish_reason: None,
			}],
		}
	}

	fn parse<T: DeserializeOwned>(&self, event: &Value) -> Result<T, AIError> {
		serde_json::from_value(event.clone()).map_err(|_| self.unexpected(event))
	}

	fn unexpected(&self, event: &Value) -> AIError {
		error!(
			inbound = %self.inbound,
			outbound = %self.outbound,
			%event,
			"stream event matches no known dialect"
		);
		AIError::UnexpectedStreamEvent {
			format: self.outbound,
			event: strng::new(event.to_string()),
		}
	}
}

fn is_canonical(event: &Value) -> bool {
	event.get("object").and_then(Value::as_str) == Some(openai::CHUNK_OBJECT)
		&& event.get("choices").is_some_and(Value::is_array)
}

fn decode(outbound: Format, event: &Value) -> Result<openai::StreamResponse, AIError> {
	serde_json::from_value(event.clone()).map_err(|_| AIError::UnexpectedStreamEvent {
		format: outbound,
		event: strng::new(event.to_string()),
	})
}

fn carries_data(chunk: &openai::StreamResponse) -> bool {
	chunk.first_choice().is_some_and(|c| {
		c.delta.content.as_deref().is_some_and(|s| !s.is_empty()) || c.finish_reason.is_some()
	})
}

fn non_empty(s: &str) -> Option<&str> {
	(!s.is_empty()).then_some(s)
}

#[cfg(test)]
#[path = "aggregator_tests.rs"]
mod tests;
