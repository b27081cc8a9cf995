use bytes::Bytes;
use futures_util::TryStreamExt;
use headers::{Authorization, HeaderMapExt};
use secrecy::ExposeSecret;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{ProxyError, json_response};
use crate::config::UpstreamHosts;
use crate::http::ratelimit::retry_after;
use crate::http::{HeaderMap, HeaderValue, Method, SignedRequest, StatusCode, endpoint, header, x_headers};
use crate::keys::{Key, KeyPool};
use crate::llm::aggregator::EventAggregator;
use crate::llm::normalize::{ResponseBody, normalize};
use crate::llm::outbound::transform_outbound;
use crate::llm::streaming::{Framing, consume};
use crate::llm::{AIError, Format, Registry, RequestContext, Service, bedrock, gemini};
use crate::*;

/// Attempts per request, including the first, when upstreams answer 429.
pub const MAX_ATTEMPTS: u32 = 3;

const ANTHROPIC_API_VERSION: &str = "2023-06-01";

/// Where requests for each service are sent.
#[derive(Debug, Clone)]
pub struct Upstream {
	hosts: UpstreamHosts,
	// (protocol, host) replacing every upstream, Bedrock included.
	endpoint: Option<(Strng, Strng)>,
}

impl Upstream {
	pub fn new(hosts: UpstreamHosts) -> Self {
		Self {
			hosts,
			endpoint: None,
		}
	}

	pub fn with_endpoint(mut self, base: &url::Url) -> Self {
		self.endpoint = Some(endpoint(base));
		self
	}

	/// `None` for Bedrock, whose host depends on the region of the key.
	fn target(&self, service: Service) -> Option<(Strng, Strng)> {
		if let Some(e) = &self.endpoint {
			return Some(e.clone());
		}
		let host = match service {
			Service::OpenAI => &self.hosts.openai,
			Service::Anthropic => &self.hosts.anthropic,
			Service::GoogleAI => &self.hosts.google_ai,
			Service::MistralAI => &self.hosts.mistral_ai,
			Service::Aws => return None,
		};
		Some((strng::literal!("https"), host.clone()))
	}
}

/// A client request as handed over by the HTTP layer.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
	pub service: Service,
	pub inbound: Format,
	pub body: Bytes,
	/// For dialects that name the model in the path.
	pub model: Option<Strng>,
	/// For dialects that select streaming by endpoint.
	pub streaming: Option<bool>,
}

impl ProxyRequest {
	pub fn new(service: Service, inbound: Format, body: impl Into<Bytes>) -> Self {
		Self {
			service,
			inbound,
			body: body.into(),
			model: None,
			streaming: None,
		}
	}

	pub fn with_model(mut self, model: impl AsRef<str>) -> Self {
		self.model = Some(strng::new(model));
		self
	}

	pub fn with_streaming(mut self, streaming: bool) -> Self {
		self.streaming = Some(streaming);
		self
	}
}

enum Attempt {
	Retry,
	Fatal(ProxyError),
}

impl From<AIError> for Attempt {
	fn from(e: AIError) -> Self {
		Attempt::Fatal(e.into())
	}
}

impl From<ProxyError> for Attempt {
	fn from(e: ProxyError) -> Self {
		Attempt::Fatal(e)
	}
}

// The URL may carry a key in its query, so it never reaches the message.
fn upstream_error(e: reqwest::Error) -> AIError {
	AIError::Upstream(strng::new(e.without_url().to_string()))
}

/// Runs a request from the client body to the reshaped upstream answer.
pub struct Pipeline {
	registry: Arc<Registry>,
	pool: Arc<KeyPool>,
	config: Arc<Config>,
	client: reqwest::Client,
	upstream: Upstream,
}

impl Pipeline {
	pub fn new(
		registry: Arc<Registry>,
		pool: Arc<KeyPool>,
		config: Arc<Config>,
		client: reqwest::Client,
	) -> Self {
		let upstream = Upstream::new(config.upstreams.clone());
		Self {
			registry,
			pool,
			config,
			client,
			upstream,
		}
	}

	pub fn with_upstream(mut self, upstream: Upstream) -> Self {
		self.upstream = upstream;
		self
	}

	pub async fn handle(&self, req: ProxyRequest, cancel: &CancellationToken) -> ::http::Response<Bytes> {
		let inbound = req.inbound;
		match self.proxy(req, cancel).await {
			Ok(body) => json_response(StatusCode::OK, &body),
			Err(e) => e.into_response(inbound),
		}
	}

	pub async fn proxy(&self, req: ProxyRequest, cancel: &CancellationToken) -> Result<Value, ProxyError> {
		let mut ctx = self.prepare(req).await?;
		loop {
			match self.attempt(&mut ctx, cancel).await {
				Ok(body) => return Ok(body),
				Err(Attempt::Retry) if ctx.retry_count + 1 < MAX_ATTEMPTS => {
					debug!(request = %ctx.id, retry = ctx.retry_count + 1, "retrying with another key");
					ctx.prepare_retry();
				},
				Err(Attempt::Retry) => return Err(ProxyError::RateLimited),
				Err(Attempt::Fatal(e)) => return Err(e),
			}
		}
	}

	/// Everything that happens before a key is chosen. Failures here never reach an upstream.
	pub async fn prepare(&self, req: ProxyRequest) -> Result<RequestContext, ProxyError> {
		let body: Value = serde_json::from_slice(&req.body).map_err(ProxyError::InvalidBody)?;
		let body = self
			.registry
			.validate(req.inbound, &body)
			.map_err(AIError::from)?;
		let mut ctx = RequestContext::new(req.service, body);
		if let Some(model) = req.model {
			ctx = ctx.with_model(model);
		}
		if let Some(streaming) = req.streaming {
			ctx = ctx.with_streaming(streaming);
		}
		if ctx.body.has_images() && !self.config.vision_allowed(ctx.service) {
			return Err(AIError::VisionNotAllowed(ctx.service).into());
		}
		let family = ctx.model_family();
		if !self.config.family_allowed(family) {
			return Err(AIError::ModelFamilyNotAllowed(family).into());
		}
		transform_outbound(&self.registry, &mut ctx).await?;
		Ok(ctx)
	}

	async fn attempt(&self, ctx: &mut RequestContext, cancel: &CancellationToken) -> Result<Value, Attempt> {
		let key = self.pool.select(ctx.service, &ctx.model)?;
		let hash = key.hash.clone();
		let request = match self.build(ctx, &key) {
			Ok(r) => r,
			Err(AIError::InvalidKeyMaterial) => {
				error!(key = %hash, "key material is malformed; disabling");
				self.pool.disable(&hash);
				return Err(AIError::InvalidKeyMaterial.into());
			},
			Err(e) => return Err(e.into()),
		};
		ctx.key = Some(key);
		ctx.signed_request = Some(request.clone());
		debug!(
			request = %ctx.id,
			key = %hash,
			service = %ctx.service,
			model = %ctx.model,
			outbound = %ctx.outbound,
			streaming = ctx.streaming,
			"sending upstream request"
		);

		let resp = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(AIError::ClientDisconnected.into()),
			resp = request.to_reqwest(&self.client).send() => resp.map_err(upstream_error)?,
		};
		let status = resp.status();
		let headers = resp.headers().clone();
		if status == StatusCode::TOO_MANY_REQUESTS {
			self.pool.mark_rate_limited(&hash, retry_after(status, &headers));
			return Err(Attempt::Retry);
		}
		if !status.is_success() {
			let body = resp.bytes().await.unwrap_or_default();
			let message = upstream_message(&headers, body).await;
			warn!(request = %ctx.id, key = %hash, %status, %message, "upstream error");
			return Err(ProxyError::UpstreamStatus { status, message }.into());
		}

		let body = if ctx.streaming {
			let Some(framing) = Framing::from_headers(&headers) else {
				return Err(
					AIError::Upstream(strng::literal!("streamed response has an unknown content type")).into(),
				);
			};
			let mut aggregator = EventAggregator::new(ctx.inbound, ctx.outbound, ctx.model.clone());
			let body = Box::pin(resp.bytes_stream().map_err(reqwest::Error::without_url));
			let events = consume(body, framing, &mut aggregator, cancel).await?;
			trace!(request = %ctx.id, events, "aggregated stream");
			aggregator.final_response()?
		} else {
			let bytes = resp.bytes().await.map_err(upstream_error)?;
			match normalize(&headers, bytes).await? {
				ResponseBody::Json(v) => v,
				ResponseBody::Text(_) => {
					return Err(AIError::Upstream(strng::literal!("upstream returned a non-JSON body")).into());
				},
			}
		};
		Ok(self.registry.translate_response(ctx, body)?)
	}

	/// The upstream request for the bound key, signed where the service requires it.
	fn build(&self, ctx: &RequestContext, key: &Key) -> Result<SignedRequest, AIError> {
		if ctx.service.requires_signing() {
			let mut req = bedrock::sign_invoke(ctx, key)?;
			if let Some((protocol, host)) = &self.upstream.endpoint {
				req.protocol = protocol.clone();
				req.hostname = host.clone();
			}
			return Ok(req);
		}

		let secret = key.secret().expose_secret();
		let path = match (ctx.service, ctx.outbound) {
			(Service::OpenAI, Format::OpenAI) | (Service::MistralAI, Format::MistralAI) => {
				"/v1/chat/completions".to_string()
			},
			(Service::OpenAI, Format::OpenAIText) => "/v1/completions".to_string(),
			(Service::Anthropic, Format::AnthropicChat) => "/v1/messages".to_string(),
			(Service::Anthropic, Format::AnthropicText) => "/v1/complete".to_string(),
			(Service::GoogleAI, Format::GoogleAI) => {
				gemini::path(&gemini::model_name(&ctx.model), ctx.streaming, secret)
			},
			(_, format) => return Err(AIError::UnsupportedFormat(format)),
		};

		let mut headers = HeaderMap::new();
		headers.insert(
			header::CONTENT_TYPE,
			HeaderValue::from_static("application/json"),
		);
		match ctx.service {
			Service::OpenAI | Service::MistralAI => {
				let auth = Authorization::bearer(secret).map_err(|_| AIError::InvalidKeyMaterial)?;
				headers.typed_insert(auth);
			},
			Service::Anthropic => {
				let mut v = HeaderValue::from_str(secret).map_err(|_| AIError::InvalidKeyMaterial)?;
				v.set_sensitive(true);
				headers.insert(x_headers::X_API_KEY, v);
				headers.insert(
					x_headers::ANTHROPIC_VERSION,
					HeaderValue::from_static(ANTHROPIC_API_VERSION),
				);
			},
			// The key travels in the query string.
			Service::GoogleAI | Service::Aws => {},
		}
		if let Some(v) = headers.get_mut(header::AUTHORIZATION) {
			v.set_sensitive(true);
		}

		let body = serde_json::to_vec(&ctx.body.to_value()?).map_err(AIError::RequestMarshal)?;
		let Some((protocol, hostname)) = self.upstream.target(ctx.service) else {
			return Err(AIError::UnsupportedFormat(ctx.outbound));
		};
		Ok(SignedRequest {
			method: Method::POST,
			protocol,
			hostname,
			path,
			headers,
			body: Bytes::from(body),
		})
	}
}

/// The most useful message in an upstream error body.
async fn upstream_message(headers: &HeaderMap, body: Bytes) -> Strng {
	let json = normalize(headers, body)
		.await
		.ok()
		.and_then(ResponseBody::into_json)
		.unwrap_or(Value::Null);
	let message = json
		.pointer("/error/message")
		.or_else(|| json.get("message"))
		.or_else(|| json.get("Message"))
		.and_then(Value::as_str);
	match message {
		Some(m) => strng::new(m),
		None => strng::literal!("upstream request failed"),
	}
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
