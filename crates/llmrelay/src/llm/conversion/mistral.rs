pub mod from_completions {
	use serde_json::Value;

	use crate::llm::conversion::{finish_reason, from_value, mismatch, now, to_value};
	use crate::llm::types::mistral;
	use crate::llm::types::openai as completions;
	use crate::llm::{AIError, Format, RequestBody, RequestContext};
	use crate::*;

	/// translate an OpenAI chat request to a Mistral chat request
	pub fn translate(ctx: &RequestContext) -> Result<RequestBody, AIError> {
		let RequestBody::OpenAI(req) = &ctx.body else {
			return Err(mismatch(ctx, Format::MistralAI));
		};
		if req.messages.iter().any(completions::Message::has_images) {
			return Err(AIError::UnsupportedContent(strng::literal!(
				"mistral models do not accept images"
			)));
		}
		let messages = req
			.messages
			.iter()
			.map(|m| {
				let role = match m.role {
					completions::Role::System | completions::Role::Developer => mistral::Role::System,
					completions::Role::Assistant => mistral::Role::Assistant,
					completions::Role::User | completions::Role::Tool => mistral::Role::User,
				};
				mistral::Message::new(role, m.text())
			})
			.collect();
		Ok(RequestBody::MistralAI(mistral::ChatRequest {
			model: req.model.clone(),
			messages,
			max_tokens: req.max_completion_tokens.or(req.max_tokens),
			temperature: req.temperature.map(|t| t.min(1.5)),
			top_p: req.top_p,
			stream: req.stream,
			stop: req.stop.clone(),
			random_seed: req.seed,
			safe_prompt: None,
			tools: req.tools.clone(),
			tool_choice: req.tool_choice.clone(),
		}))
	}

	/// Mistral's own API already answers in OpenAI's shape; Bedrock does not.
	pub fn translate_response(resp: Value, ctx: &RequestContext) -> Result<Value, AIError> {
		if resp.get("id").is_some() {
			return Ok(resp);
		}
		from_bedrock(resp, ctx)
	}

	pub fn from_bedrock(resp: Value, ctx: &RequestContext) -> Result<Value, AIError> {
		let resp: mistral::BedrockChatResponse = from_value(resp)?;
		let choices = resp
			.choices
			.into_iter()
			.map(|c| completions::Choice {
				index: c.index,
				message: completions::ResponseMessage {
					role: completions::Role::Assistant,
					content: c.message.content,
				},
				finish_reason: c
					.stop_reason
					.as_deref()
					.map(|r| finish_reason::from_mistral(r).to_string()),
			})
			.collect();
		to_value(&completions::Response {
			id: format!("mistral-{}", ctx.id),
			object: "chat.completion".to_string(),
			created: now(),
			model: ctx.model.to_string(),
			choices,
			usage: None,
		})
	}
}
