pub mod from_mistral {
	use serde_json::Value;

	use crate::llm::conversion::{finish_reason, from_value, mismatch, now, to_value};
	use crate::llm::types::mistral;
	use crate::llm::types::openai as completions;
	use crate::llm::{AIError, Format, RequestBody, RequestContext};

	/// render Mistral chat messages with the instruct template
	pub fn translate(ctx: &RequestContext) -> Result<RequestBody, AIError> {
		let RequestBody::MistralAI(req) = &ctx.body else {
			return Err(mismatch(ctx, Format::MistralText));
		};
		Ok(RequestBody::MistralText(mistral::TextRequest {
			model: req.model.clone(),
			prompt: render(&req.messages),
			max_tokens: req.max_tokens,
			temperature: req.temperature.map(|t| t.min(1.0)),
			top_p: req.top_p,
			top_k: None,
			stop: req.stop.clone().map(completions::Stop::into_vec).unwrap_or_default(),
			stream: req.stream,
		}))
	}

	/// `<s>[INST] user [/INST] answer</s>[INST] ...`. System text is folded into the next user
	/// turn, and a trailing assistant message is left open so the model continues it.
	pub(crate) fn render(messages: &[mistral::Message]) -> String {
		let mut prompt = String::from("<s>");
		let mut pending_system: Vec<&str> = Vec::new();
		let last = messages.len().saturating_sub(1);
		for (i, m) in messages.iter().enumerate() {
			match m.role {
				mistral::Role::System => pending_system.push(&m.content),
				mistral::Role::User | mistral::Role::Tool => {
					pending_system.push(&m.content);
					prompt.push_str("[INST] ");
					prompt.push_str(&pending_system.join("\n\n"));
					prompt.push_str(" [/INST]");
					pending_system.clear();
				},
				mistral::Role::Assistant => {
					prompt.push(' ');
					prompt.push_str(&m.content);
					if i != last {
						prompt.push_str("</s>");
					}
				},
			}
		}
		if !pending_system.is_empty() {
			prompt.push_str("[INST] ");
			prompt.push_str(&pending_system.join("\n\n"));
			prompt.push_str(" [/INST]");
		}
		prompt
	}

	/// translate a Bedrock `{"outputs": [...]}` response to a Mistral chat response
	pub fn translate_response(resp: Value, ctx: &RequestContext) -> Result<Value, AIError> {
		let resp: mistral::TextResponse = from_value(resp)?;
		let choices = resp
			.outputs
			.into_iter()
			.enumerate()
			.map(|(i, o)| completions::Choice {
				index: i as u32,
				message: completions::ResponseMessage {
					role: completions::Role::Assistant,
					content: Some(o.text),
				},
				finish_reason: o
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
