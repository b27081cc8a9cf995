use std::collections::HashMap;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::llm::conversion::{anthropic_text, gemini, messages, mistral, mistral_text, openai_text};
use crate::llm::types::{anthropic, google, mistral as mistral_types, openai};
use crate::llm::validation::validate;
use crate::llm::{AIError, Format, RequestBody, RequestContext, ValidationError};

pub type Transformer =
	for<'a> fn(&'a RequestContext) -> BoxFuture<'a, Result<RequestBody, AIError>>;

pub type ResponseTranslator = fn(Value, &RequestContext) -> Result<Value, AIError>;

macro_rules! transformer {
	($translate:path) => {{
		fn run(ctx: &RequestContext) -> BoxFuture<'_, Result<RequestBody, AIError>> {
			Box::pin(async move { $translate(ctx) })
		}
		run as Transformer
	}};
}

/// Immutable tables of validation rules and (inbound, outbound) transformers.
/// Built once at startup and shared.
pub struct Registry {
	transformers: HashMap<(Format, Format), Transformer>,
	/// Keyed by (what the upstream answered in, what the client asked in).
	responses: HashMap<(Format, Format), ResponseTranslator>,
}

impl Default for Registry {
	fn default() -> Self {
		Self::new()
	}
}

impl Registry {
	pub fn new() -> Self {
		use Format::*;
		let transformers = HashMap::from([
			(
				(OpenAI, AnthropicChat),
				transformer!(messages::from_completions::translate),
			),
			(
				(OpenAI, AnthropicText),
				transformer!(anthropic_text::from_completions::translate),
			),
			(
				(OpenAI, OpenAIText),
				transformer!(openai_text::from_completions::translate),
			),
			(
				(OpenAI, GoogleAI),
				transformer!(gemini::from_completions::translate),
			),
			(
				(OpenAI, MistralAI),
				transformer!(mistral::from_completions::translate),
			),
			(
				(AnthropicText, AnthropicChat),
				transformer!(messages::from_anthropic_text::translate),
			),
			(
				(MistralAI, MistralText),
				transformer!(mistral_text::from_mistral::translate),
			),
		]);
		let responses = HashMap::from([
			(
				(AnthropicChat, OpenAI),
				messages::from_completions::translate_response as ResponseTranslator,
			),
			(
				(AnthropicText, OpenAI),
				anthropic_text::from_completions::translate_response,
			),
			(
				(OpenAIText, OpenAI),
				openai_text::from_completions::translate_response,
			),
			(
				(GoogleAI, OpenAI),
				gemini::from_completions::translate_response,
			),
			(
				(MistralAI, OpenAI),
				mistral::from_completions::translate_response,
			),
			(
				(AnthropicChat, AnthropicText),
				messages::from_anthropic_text::translate_response,
			),
			(
				(MistralText, MistralAI),
				mistral_text::from_mistral::translate_response,
			),
			// Chat requests continued as a raw prompt. The Mistral chat response is already
			// OpenAI shaped.
			(
				(MistralText, OpenAI),
				mistral_text::from_mistral::translate_response,
			),
			// Same dialect, but Bedrock answers in its own shape.
			(
				(MistralAI, MistralAI),
				mistral::from_completions::translate_response,
			),
		]);
		Self {
			transformers,
			responses,
		}
	}

	/// Check `body` against the rules of `format`, filling defaults.
	pub fn validate(&self, format: Format, body: &Value) -> Result<RequestBody, ValidationError> {
		match format {
			Format::OpenAI => validate::<openai::Request>(format, body).map(RequestBody::OpenAI),
			Format::OpenAIText => {
				validate::<openai::TextRequest>(format, body).map(RequestBody::OpenAIText)
			},
			Format::AnthropicChat => {
				validate::<anthropic::MessagesRequest>(format, body).map(RequestBody::AnthropicChat)
			},
			Format::AnthropicText => {
				validate::<anthropic::CompletionRequest>(format, body).map(RequestBody::AnthropicText)
			},
			Format::GoogleAI => {
				validate::<google::GenerateContentRequest>(format, body).map(RequestBody::GoogleAI)
			},
			Format::MistralAI => {
				validate::<mistral_types::ChatRequest>(format, body).map(RequestBody::MistralAI)
			},
			Format::MistralText => {
				validate::<mistral_types::TextRequest>(format, body).map(RequestBody::MistralText)
			},
		}
	}

	/// Re-check an already typed body, as after a transformation.
	pub fn revalidate(&self, body: &RequestBody) -> Result<RequestBody, AIError> {
		let value = body.to_value()?;
		Ok(self.validate(body.format(), &value)?)
	}

	pub fn supports(&self, from: Format, to: Format) -> bool {
		self.transformers.contains_key(&(from, to))
	}

	pub fn pairs(&self) -> impl Iterator<Item = (Format, Format)> + '_ {
		self.transformers.keys().copied()
	}

	/// Transform the body of `ctx` into `to`. The result is not yet validated.
	pub async fn transform(&self, ctx: &RequestContext, to: Format) -> Result<RequestBody, AIError> {
		let from = ctx.body.format();
		let Some(t) = self.transformers.get(&(from, to)) else {
			return Err(AIError::UnsupportedTransformation { from, to });
		};
		t(ctx).await
	}

	/// Reshape a response from the dialect the upstream spoke into the one the client sent.
	pub fn translate_response(&self, ctx: &RequestContext, body: Value) -> Result<Value, AIError> {
		match self.responses.get(&(ctx.outbound, ctx.inbound)) {
			Some(translate) => translate(body, ctx),
			None if ctx.outbound == ctx.inbound => Ok(body),
			None => Err(AIError::UnsupportedTransformation {
				from: ctx.outbound,
				to: ctx.inbound,
			}),
		}
	}
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
