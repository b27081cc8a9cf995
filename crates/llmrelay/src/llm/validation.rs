use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::llm::Format;
use crate::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
	pub path: Strng,
	pub message: Strng,
}

impl fmt::Display for ValidationIssue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.path, self.message)
	}
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {format} request: {}", .issues.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct ValidationError {
	pub format: Format,
	pub issues: Vec<ValidationIssue>,
}

#[derive(Debug, Default)]
pub struct Issues(Vec<ValidationIssue>);

impl Issues {
	pub fn push(&mut self, path: impl AsRef<str>, message: impl AsRef<str>) {
		self.0.push(ValidationIssue {
			path: strng::new(path),
			message: strng::new(message),
		});
	}

	pub fn non_empty(&mut self, path: &str, value: &str) {
		if value.trim().is_empty() {
			self.push(path, "must not be empty");
		}
	}

	pub fn range(&mut self, path: &str, value: Option<f32>, min: f32, max: f32) {
		if let Some(v) = value
			&& !(min..=max).contains(&v)
		{
			self.push(path, format!("must be between {min} and {max}"));
		}
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

/// Semantic rules for a format's request body. `check` may also fill defaults.
pub trait Validate: DeserializeOwned {
	/// Top level fields that must be present, reported together before type checking.
	const REQUIRED: &'static [&'static str];

	fn check(&mut self, issues: &mut Issues);
}

pub fn validate<T: Validate>(format: Format, value: &Value) -> Result<T, ValidationError> {
	let fail = |issues: Issues| ValidationError {
		format,
		issues: issues.0,
	};
	let mut issues = Issues::default();
	let Some(obj) = value.as_object() else {
		issues.push("$", "request body must be a JSON object");
		return Err(fail(issues));
	};
	for field in T::REQUIRED {
		if obj.get(*field).is_none_or(Value::is_null) {
			issues.push(*field, "is required");
		}
	}
	if !issues.is_empty() {
		return Err(fail(issues));
	}
	let mut body = match T::deserialize(value) {
		Ok(b) => b,
		Err(e) => {
			issues.push("$", e.to_string());
			return Err(fail(issues));
		},
	};
	body.check(&mut issues);
	if issues.is_empty() {
		Ok(body)
	} else {
		Err(fail(issues))
	}
}
