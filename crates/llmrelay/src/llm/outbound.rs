//! Brings a request body into the dialect of the chosen upstream.

use crate::llm::repair::fix_mistral_prompt;
use crate::llm::{AIError, Format, Registry, RequestBody, RequestContext};
use crate::*;

/// Rewrites `ctx.body` into `ctx.outbound`, validating the result.
///
/// Retries carry an already transformed body and are left untouched.
pub async fn transform_outbound(registry: &Registry, ctx: &mut RequestContext) -> Result<(), AIError> {
	if ctx.retry_count > 0 {
		trace!(request = %ctx.id, retry = ctx.retry_count, "body already transformed");
		return Ok(());
	}

	if repair_mistral(ctx) && !ctx.service.supports_prefix() {
		// Without prefix support the only way to continue a message is a raw prompt.
		debug!(request = %ctx.id, service = %ctx.service, "continuing assistant message as text");
		ctx.outbound = Format::MistralText;
	}

	if ctx.body.format() == ctx.outbound {
		ctx.body = registry.revalidate(&ctx.body)?;
		return Ok(());
	}

	let mut body = registry.transform(ctx, ctx.outbound).await?;
	if let RequestBody::MistralAI(req) = &mut body {
		req.messages = fix_mistral_prompt(std::mem::take(&mut req.messages));
		if req.ends_with_prefix() && !ctx.service.supports_prefix() {
			ctx.body = registry.revalidate(&body)?;
			ctx.outbound = Format::MistralText;
			body = registry.transform(ctx, Format::MistralText).await?;
		}
	}
	debug!(
		request = %ctx.id,
		from = %ctx.inbound,
		to = %ctx.outbound,
		"transformed request body"
	);
	ctx.body = registry.revalidate(&body)?;
	Ok(())
}

/// Returns whether the repaired prompt ends in a prefix message.
fn repair_mistral(ctx: &mut RequestContext) -> bool {
	let RequestBody::MistralAI(req) = &mut ctx.body else {
		return false;
	};
	let before = req.messages.len();
	req.messages = fix_mistral_prompt(std::mem::take(&mut req.messages));
	if before != req.messages.len() {
		info!(
			request = %ctx.id,
			old = before,
			new = req.messages.len(),
			"fixed mistral prompt"
		);
	}
	req.ends_with_prefix()
}

#[cfg(test)]
#[path = "outbound_tests.rs"]
mod tests;
