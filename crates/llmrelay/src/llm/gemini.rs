use crate::*;

/// `/v1beta/models/{model}:generateContent?key=...`, or the SSE streaming variant.
pub fn path(model: &str, streaming: bool, api_key: &str) -> String {
	let op = if streaming {
		"streamGenerateContent"
	} else {
		"generateContent"
	};
	let mut path = format!("/v1beta/models/{model}:{op}");
	let mut query = url::form_urlencoded::Serializer::new(String::new());
	if streaming {
		query.append_pair("alt", "sse");
	}
	query.append_pair("key", api_key);
	path.push('?');
	path.push_str(&query.finish());
	path
}

/// Gemini model names may arrive with a `models/` prefix.
pub fn model_name(model: &str) -> Strng {
	strng::new(model.strip_prefix("models/").unwrap_or(model))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generate_content_paths() {
		assert_eq!(
			path("gemini-1.5-pro", false, "abc"),
			"/v1beta/models/gemini-1.5-pro:generateContent?key=abc"
		);
		assert_eq!(
			path("gemini-1.5-flash", true, "a b"),
			"/v1beta/models/gemini-1.5-flash:streamGenerateContent?alt=sse&key=a+b"
		);
		assert_eq!(model_name("models/gemini-pro"), "gemini-pro");
	}
}
