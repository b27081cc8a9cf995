pub mod from_completions {
	use itertools::Itertools;
	use serde_json::Value;

	use crate::llm::conversion::{from_value, mismatch, now, to_value};
	use crate::llm::types::openai as completions;
	use crate::llm::{AIError, Format, RequestBody, RequestContext};

	const USER_TURN: &str = "\n\nUser:";

	/// translate an OpenAI chat request to a legacy text completion for instruct models
	pub fn translate(ctx: &RequestContext) -> Result<RequestBody, AIError> {
		let RequestBody::OpenAI(req) = &ctx.body else {
			return Err(mismatch(ctx, Format::OpenAIText));
		};
		// Stop before the model starts writing the user's next turn. The API accepts at most 4.
		let stop = std::iter::once(USER_TURN.to_string())
			.chain(req.stop_sequences())
			.unique()
			.take(4)
			.collect::<Vec<_>>();
		Ok(RequestBody::OpenAIText(completions::TextRequest {
			model: req.model.clone(),
			prompt: completions::Prompt::One(flatten(&req.messages)),
			max_tokens: req.max_tokens(),
			temperature: req.temperature,
			top_p: req.top_p,
			n: req.n,
			stream: req.stream,
			stop: Some(completions::Stop::Many(stop)),
			presence_penalty: req.presence_penalty,
			frequency_penalty: req.frequency_penalty,
			logprobs: None,
			user: req.user.clone(),
		}))
	}

	pub(crate) fn flatten(messages: &[completions::Message]) -> String {
		let mut prompt = messages
			.iter()
			.map(|m| {
				let role = match m.role {
					completions::Role::Assistant => "Assistant",
					completions::Role::System | completions::Role::Developer => "System",
					completions::Role::User | completions::Role::Tool => "User",
				};
				format!("\n\n{role}: {}", m.text())
			})
			.collect::<String>();
		prompt.push_str("\n\nAssistant:");
		prompt
	}

	pub fn translate_response(resp: Value, _ctx: &RequestContext) -> Result<Value, AIError> {
		let resp: completions::TextResponse = from_value(resp)?;
		let choices = resp
			.choices
			.into_iter()
			.map(|c| completions::Choice {
				index: c.index,
				message: completions::ResponseMessage {
					role: completions::Role::Assistant,
					content: Some(c.text.trim_start().to_string()),
				},
				finish_reason: c.finish_reason,
			})
			.collect();
		to_value(&completions::Response {
			id: resp.id,
			object: "chat.completion".to_string(),
			created: if resp.created == 0 { now() } else { resp.created },
			model: resp.model,
			choices,
			usage: resp.usage,
		})
	}
}
