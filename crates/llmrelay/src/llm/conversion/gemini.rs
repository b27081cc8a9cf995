pub mod from_completions {
	use serde_json::Value;

	use crate::llm::conversion::{finish_reason, from_value, mismatch, now, parse_data_url, to_value};
	use crate::llm::types::google as gemini;
	use crate::llm::types::openai as completions;
	use crate::llm::{AIError, Format, RequestBody, RequestContext};
	use crate::*;

	const HARM_CATEGORIES: [&str; 4] = [
		"HARM_CATEGORY_HARASSMENT",
		"HARM_CATEGORY_HATE_SPEECH",
		"HARM_CATEGORY_SEXUALLY_EXPLICIT",
		"HARM_CATEGORY_DANGEROUS_CONTENT",
	];

	/// translate an OpenAI chat request to a Gemini generateContent request
	pub fn translate(ctx: &RequestContext) -> Result<RequestBody, AIError> {
		let RequestBody::OpenAI(req) = &ctx.body else {
			return Err(mismatch(ctx, Format::GoogleAI));
		};
		translate_internal(req).map(RequestBody::GoogleAI)
	}

	fn translate_internal(req: &completions::Request) -> Result<gemini::GenerateContentRequest, AIError> {
		let system = req
			.messages
			.iter()
			.filter(|m| matches!(m.role, completions::Role::System | completions::Role::Developer))
			.map(completions::Message::text)
			.collect::<Vec<_>>();

		let mut contents: Vec<gemini::Content> = Vec::new();
		for msg in &req.messages {
			let role = match msg.role {
				completions::Role::System | completions::Role::Developer => continue,
				completions::Role::Assistant => gemini::Role::Model,
				completions::Role::User | completions::Role::Tool => gemini::Role::User,
			};
			let parts = parts(&msg.content)?;
			if parts.is_empty() {
				continue;
			}
			// Gemini rejects consecutive turns from the same role.
			match contents.last_mut() {
				Some(last) if last.role == Some(role) => last.parts.extend(parts),
				_ => contents.push(gemini::Content {
					role: Some(role),
					parts,
				}),
			}
		}

		let mut stop_sequences = req.stop_sequences();
		stop_sequences.truncate(5);
		Ok(gemini::GenerateContentRequest {
			contents,
			system_instruction: (!system.is_empty()).then(|| gemini::Content {
				role: None,
				parts: vec![gemini::Part::Text {
					text: system.join("\n\n"),
				}],
			}),
			generation_config: gemini::GenerationConfig {
				max_output_tokens: Some(req.max_tokens()),
				temperature: req.temperature,
				top_p: req.top_p,
				top_k: None,
				stop_sequences,
				candidate_count: Some(1),
			},
			safety_settings: HARM_CATEGORIES
				.iter()
				.map(|c| gemini::SafetySetting {
					category: c.to_string(),
					threshold: "BLOCK_NONE".to_string(),
				})
				.collect(),
		})
	}

	fn parts(content: &completions::Content) -> Result<Vec<gemini::Part>, AIError> {
		match content {
			completions::Content::Text(t) if t.is_empty() => Ok(vec![]),
			completions::Content::Text(t) => Ok(vec![gemini::Part::Text { text: t.clone() }]),
			completions::Content::Parts(parts) => parts
				.iter()
				.map(|p| match p {
					completions::ContentPart::Text { text } => Ok(gemini::Part::Text { text: text.clone() }),
					completions::ContentPart::ImageUrl { image_url } => {
						let (mime_type, data) = parse_data_url(&image_url.url).ok_or_else(|| {
							AIError::UnsupportedContent(strng::literal!(
								"images must be provided as base64 data URLs"
							))
						})?;
						Ok(gemini::Part::InlineData {
							inline_data: gemini::InlineData {
								mime_type: mime_type.to_string(),
								data: data.to_string(),
							},
						})
					},
				})
				.collect(),
		}
	}

	/// translate a Gemini response back to an OpenAI chat response
	pub fn translate_response(resp: Value, ctx: &RequestContext) -> Result<Value, AIError> {
		let resp: gemini::GenerateContentResponse = from_value(resp)?;
		let choices = resp
			.candidates
			.iter()
			.map(|c| completions::Choice {
				index: c.index,
				message: completions::ResponseMessage {
					role: completions::Role::Assistant,
					content: Some(c.content.as_ref().map(gemini::Content::text).unwrap_or_default()),
				},
				finish_reason: c
					.finish_reason
					.as_deref()
					.map(|r| finish_reason::from_google(r).to_string()),
			})
			.collect();
		to_value(&completions::Response {
			id: format!("gemini-{}", ctx.id),
			object: "chat.completion".to_string(),
			created: now(),
			model: resp.model_version.clone().unwrap_or_else(|| ctx.model.to_string()),
			choices,
			usage: resp.usage_metadata.map(|u| completions::Usage {
				prompt_tokens: u.prompt_token_count,
				completion_tokens: u.candidates_token_count,
				total_tokens: u.total_token_count,
			}),
		})
	}
}
