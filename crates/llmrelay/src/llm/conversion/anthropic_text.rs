pub mod from_completions {
	use serde_json::Value;

	use crate::llm::conversion::{from_value, mismatch, now, to_value};
	use crate::llm::types::anthropic::{AI_PROMPT, CompletionRequest, CompletionResponse, HUMAN_PROMPT};
	use crate::llm::types::openai as completions;
	use crate::llm::{AIError, Format, RequestBody, RequestContext};

	/// translate an OpenAI chat request to a legacy anthropic text completion
	pub fn translate(ctx: &RequestContext) -> Result<RequestBody, AIError> {
		let RequestBody::OpenAI(req) = &ctx.body else {
			return Err(mismatch(ctx, Format::AnthropicText));
		};
		Ok(RequestBody::AnthropicText(CompletionRequest {
			model: req.model.clone(),
			prompt: flatten(&req.messages),
			max_tokens_to_sample: req.max_tokens(),
			stop_sequences: req.stop_sequences(),
			stream: req.stream,
			temperature: req.temperature.map(|t| t.min(1.0)),
			top_p: req.top_p,
			top_k: None,
			metadata: None,
			anthropic_version: None,
		}))
	}

	/// Leading system text stays a bare preamble; later system turns are spoken by the human.
	pub(crate) fn flatten(messages: &[completions::Message]) -> String {
		let mut prompt = String::new();
		let mut leading = true;
		for m in messages {
			let text = m.text();
			match m.role {
				completions::Role::System | completions::Role::Developer if leading => {
					if !prompt.is_empty() {
						prompt.push('\n');
					}
					prompt.push_str(&text);
					continue;
				},
				completions::Role::Assistant => {
					prompt.push_str(AI_PROMPT);
				},
				_ => {
					prompt.push_str(HUMAN_PROMPT);
				},
			}
			leading = false;
			prompt.push(' ');
			prompt.push_str(&text);
		}
		let ends_with_assistant = messages
			.last()
			.is_some_and(|m| m.role == completions::Role::Assistant);
		if !ends_with_assistant {
			prompt.push_str(AI_PROMPT);
		}
		prompt
	}

	pub fn translate_response(resp: Value, ctx: &RequestContext) -> Result<Value, AIError> {
		let resp: CompletionResponse = from_value(resp)?;
		let finish = resp.stop_reason.as_deref().map(|r| match r {
			"max_tokens" => "length".to_string(),
			_ => "stop".to_string(),
		});
		to_value(&completions::Response {
			id: resp.id,
			object: "chat.completion".to_string(),
			created: now(),
			model: if resp.model.is_empty() {
				ctx.model.to_string()
			} else {
				resp.model
			},
			choices: vec![completions::Choice {
				index: 0,
				message: completions::ResponseMessage {
					role: completions::Role::Assistant,
					content: Some(resp.completion.trim_start().to_string()),
				},
				finish_reason: finish,
			}],
			usage: None,
		})
	}
}
