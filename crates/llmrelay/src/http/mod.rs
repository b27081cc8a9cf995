pub mod auth;
pub mod compression;
pub mod ratelimit;

pub use ::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use bytes::Bytes;

use crate::*;

pub mod x_headers {
	use http::HeaderName;

	pub const X_AMZN_ERRORTYPE: HeaderName = HeaderName::from_static("x-amzn-errortype");
	pub const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");
	pub const ANTHROPIC_VERSION: HeaderName = HeaderName::from_static("anthropic-version");

	pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
	pub const X_RATELIMIT_RESET_REQUESTS: HeaderName =
		HeaderName::from_static("x-ratelimit-reset-requests");
	pub const X_RATELIMIT_RESET_TOKENS: HeaderName =
		HeaderName::from_static("x-ratelimit-reset-tokens");
}

pub fn get_header<'a>(h: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
	h.get(name).and_then(|v| v.to_str().ok())
}

/// `(scheme, host[:port])` of `base`, for sending upstream traffic to a local stand in.
pub fn endpoint(base: &url::Url) -> (Strng, Strng) {
	let host = base.host_str().unwrap_or("localhost");
	let host = match base.port() {
		Some(port) => strng::format!("{host}:{port}"),
		None => strng::new(host),
	};
	(strng::new(base.scheme()), host)
}

pub fn is_json_content_type(h: &HeaderMap) -> bool {
	get_header(h, &header::CONTENT_TYPE)
		.map(|v| {
			let ct = v.to_ascii_lowercase();
			ct.contains("application/json") || ct.contains("+json")
		})
		.unwrap_or(false)
}

pub fn is_sse_content_type(h: &HeaderMap) -> bool {
	get_header(h, &header::CONTENT_TYPE)
		.map(|v| v.to_ascii_lowercase().contains("text/event-stream"))
		.unwrap_or(false)
}

/// A fully prepared upstream request. For signing services the headers carry the signature, so
/// nothing here may change before it is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedRequest {
	pub method: Method,
	pub protocol: Strng,
	pub hostname: Strng,
	pub path: String,
	pub headers: HeaderMap,
	pub body: Bytes,
}

impl SignedRequest {
	pub fn url(&self) -> String {
		format!("{}://{}{}", self.protocol, self.hostname, self.path)
	}

	pub fn to_reqwest(&self, client: &reqwest::Client) -> reqwest::RequestBuilder {
		client
			.request(self.method.clone(), self.url())
			.headers(self.headers.clone())
			.body(self.body.clone())
	}
}
