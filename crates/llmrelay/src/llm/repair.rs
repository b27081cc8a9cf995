//! Repairs for Mistral's stricter message ordering rules.

use crate::llm::types::mistral::{Message, Role};

/// Only the first message may be a system message, roles may not repeat back to back, and a
/// trailing assistant message must be marked as a prefix to be continued.
pub fn fix_mistral_prompt(messages: Vec<Message>) -> Vec<Message> {
	let mut out: Vec<Message> = Vec::with_capacity(messages.len());
	for mut msg in messages {
		if msg.role == Role::System && !out.is_empty() {
			msg.role = Role::User;
		}
		msg.prefix = None;
		match out.last_mut() {
			Some(last) if last.role == msg.role => {
				last.content.push_str("\n\n");
				last.content.push_str(&msg.content);
			},
			_ => out.push(msg),
		}
	}
	if let Some(last) = out.last_mut()
		&& last.role == Role::Assistant
	{
		last.prefix = Some(true);
	}
	out
}
