//! The request pipeline and the mapping of its failures onto client responses.

use bytes::Bytes;
use serde_json::{Value, json};

use crate::http::{HeaderValue, StatusCode, header};
use crate::llm::{AIError, Format};
use crate::*;

mod pipeline;

pub use pipeline::{Pipeline, ProxyRequest, Upstream};

#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
	#[error("request body is not valid JSON: {0}")]
	InvalidBody(serde_json::Error),
	#[error("upstream rate limited every attempt")]
	RateLimited,
	#[error("upstream returned {status}: {message}")]
	UpstreamStatus { status: StatusCode, message: Strng },
	#[error(transparent)]
	AI(#[from] AIError),
}

/// The client facing classification of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
	InvalidRequest,
	Permission,
	RateLimit,
	Unavailable,
	Internal,
}

impl Kind {
	fn openai(self) -> &'static str {
		match self {
			Kind::InvalidRequest => "invalid_request_error",
			Kind::Permission => "permission_error",
			Kind::RateLimit => "rate_limit_error",
			Kind::Unavailable => "service_unavailable",
			Kind::Internal => "server_error",
		}
	}

	fn anthropic(self) -> &'static str {
		match self {
			Kind::InvalidRequest => "invalid_request_error",
			Kind::Permission => "permission_error",
			Kind::RateLimit => "rate_limit_error",
			Kind::Unavailable => "overloaded_error",
			Kind::Internal => "api_error",
		}
	}

	fn google(self) -> &'static str {
		match self {
			Kind::InvalidRequest => "INVALID_ARGUMENT",
			Kind::Permission => "PERMISSION_DENIED",
			Kind::RateLimit => "RESOURCE_EXHAUSTED",
			Kind::Unavailable => "UNAVAILABLE",
			Kind::Internal => "INTERNAL",
		}
	}
}

impl ProxyError {
	fn classify(&self) -> (StatusCode, Kind) {
		match self {
			ProxyError::InvalidBody(_) => (StatusCode::BAD_REQUEST, Kind::InvalidRequest),
			ProxyError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, Kind::RateLimit),
			ProxyError::UpstreamStatus { status, .. } => {
				let kind = match *status {
					StatusCode::TOO_MANY_REQUESTS => Kind::RateLimit,
					StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Kind::Permission,
					s if s.is_client_error() => Kind::InvalidRequest,
					_ => Kind::Unavailable,
				};
				(*status, kind)
			},
			ProxyError::AI(e) => match e {
				AIError::UnknownFormat(_)
				| AIError::Validation(_)
				| AIError::UnsupportedTransformation { .. }
				| AIError::UnsupportedFormat(_)
				| AIError::UnsupportedContent(_) => (StatusCode::BAD_REQUEST, Kind::InvalidRequest),
				AIError::ModelFamilyNotAllowed(_) | AIError::VisionNotAllowed(_) => {
					(StatusCode::FORBIDDEN, Kind::Permission)
				},
				AIError::NoKeysAvailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, Kind::Unavailable),
				AIError::Upstream(_) => (StatusCode::BAD_GATEWAY, Kind::Unavailable),
				AIError::ClientDisconnected => (client_closed(), Kind::InvalidRequest),
				AIError::RequestMarshal(_)
				| AIError::ResponseParsing(_)
				| AIError::ResponseMarshal(_)
				| AIError::InvalidKeyMaterial
				| AIError::Signing(_)
				| AIError::UnsupportedEncoding(_)
				| AIError::Decompression(_)
				| AIError::InvalidUpstreamBody(_)
				| AIError::UnexpectedStreamEvent { .. }
				| AIError::StreamDecoding(_) => (StatusCode::INTERNAL_SERVER_ERROR, Kind::Internal),
			},
		}
	}

	/// What the client may see. Internal causes are replaced by a generic message.
	fn client_message(&self, kind: Kind) -> String {
		match (self, kind) {
			(_, Kind::Internal) => "internal error while proxying the request".to_string(),
			(ProxyError::UpstreamStatus { message, .. }, _) => message.to_string(),
			_ => self.to_string(),
		}
	}

	pub fn status(&self) -> StatusCode {
		self.classify().0
	}

	/// The error body, shaped like the errors of the dialect the client speaks.
	pub fn body(&self, inbound: Format) -> Value {
		let (status, kind) = self.classify();
		let message = self.client_message(kind);
		match inbound {
			Format::OpenAI | Format::OpenAIText => json!({
				"error": {
					"message": message,
					"type": kind.openai(),
					"param": null,
					"code": null,
				}
			}),
			Format::AnthropicChat | Format::AnthropicText => json!({
				"type": "error",
				"error": {
					"type": kind.anthropic(),
					"message": message,
				}
			}),
			Format::GoogleAI => json!({
				"error": {
					"code": status.as_u16(),
					"message": message,
					"status": kind.google(),
				}
			}),
			Format::MistralAI | Format::MistralText => json!({
				"object": "error",
				"message": message,
				"type": kind.openai(),
				"param": null,
				"code": null,
			}),
		}
	}

	pub fn into_response(self, inbound: Format) -> ::http::Response<Bytes> {
		let (status, kind) = self.classify();
		if kind == Kind::Internal {
			error!(error = %self, %inbound, "request failed");
		} else {
			debug!(error = %self, %inbound, %status, "request rejected");
		}
		json_response(status, &self.body(inbound))
	}
}

/// Not a registered status, but the de facto code for a client that hung up.
fn client_closed() -> StatusCode {
	StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST)
}

pub(crate) fn json_response(status: StatusCode, body: &Value) -> ::http::Response<Bytes> {
	let mut resp = ::http::Response::new(Bytes::from(body.to_string()));
	*resp.status_mut() = status;
	resp.headers_mut().insert(
		header::CONTENT_TYPE,
		HeaderValue::from_static("application/json"),
	);
	resp
}
