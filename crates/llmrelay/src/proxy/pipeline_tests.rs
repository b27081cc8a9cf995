use std::collections::BTreeMap;

use assert_matches::assert_matches;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{header as has_header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::keys::Key;
use crate::llm::ModelFamily;
use crate::parse::aws_eventstream::tests::chunk;

const MISTRAL_LARGE: &str = "mistral.mistral-large-2402-v1:0";

fn key(service: Service, secret: &str) -> Key {
	Key::new(service, SecretString::from(secret.to_string()))
}

fn pipeline(server: &MockServer, keys: Vec<Key>, config: Config) -> (Pipeline, Arc<KeyPool>) {
	let pool = Arc::new(KeyPool::new(keys, Duration::from_secs(60)));
	let base = url::Url::parse(&server.uri()).unwrap();
	let config = Arc::new(config);
	let p = Pipeline::new(
		Arc::new(Registry::new()),
		pool.clone(),
		config.clone(),
		reqwest::Client::new(),
	)
	.with_upstream(Upstream::new(config.upstreams.clone()).with_endpoint(&base));
	(p, pool)
}

fn body(v: Value) -> Bytes {
	Bytes::from(v.to_string())
}

fn read(resp: ::http::Response<Bytes>) -> (StatusCode, Value) {
	let status = resp.status();
	(status, serde_json::from_slice(resp.body()).unwrap())
}

#[tokio::test]
async fn openai_chat_streamed_from_bedrock_mistral() {
	let server = MockServer::start().await;
	let mut stream = Vec::new();
	for (content, stop) in [("", None), ("Hel", None), ("lo", Some("stop"))] {
		stream.extend(chunk(&json!({
			"choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "stop_reason": stop}]
		})));
	}
	Mock::given(method("POST"))
		.and(path_regex(r"^/model/mistral\.mistral-large-2402-v1(:|%3A)0/invoke-with-response-stream$"))
		.respond_with(ResponseTemplate::new(200).set_body_raw(stream, bedrock::EVENT_STREAM))
		.expect(1)
		.mount(&server)
		.await;

	let used = key(Service::Aws, "AKIDUSED:secret:us-east-1");
	let fresh = key(Service::Aws, "AKIDFRESH:secret:us-west-2");
	let (p, pool) = pipeline(&server, vec![used.clone(), fresh.clone()], Config::default());
	pool.mark_used(&used.hash);

	let req = ProxyRequest::new(
		Service::Aws,
		Format::OpenAI,
		body(json!({
			"model": MISTRAL_LARGE,
			"stream": true,
			"messages": [{"role": "user", "content": "hi"}]
		})),
	);
	let (status, resp) = read(p.handle(req, &CancellationToken::new()).await);
	assert_eq!(status, StatusCode::OK, "{resp}");
	assert_eq!(resp["object"], "chat.completion");
	assert_eq!(resp["choices"][0]["message"]["content"], "Hello");
	assert_eq!(resp["choices"][0]["finish_reason"], "stop");

	// The least recently used key was bound and stamped.
	assert!(pool.get(&fresh.hash).unwrap().last_used.is_some());
	let sent = &server.received_requests().await.unwrap()[0];
	let auth = sent.headers.get("authorization").unwrap().to_str().unwrap();
	assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDFRESH/"), "{auth}");
	assert!(auth.contains("/us-west-2/bedrock/aws4_request"), "{auth}");
	assert_eq!(sent.headers.get("accept").unwrap(), bedrock::EVENT_STREAM);
	let sent: Value = serde_json::from_slice(&sent.body).unwrap();
	assert_eq!(sent["messages"], json!([{"role": "user", "content": "hi"}]));
	assert!(sent.get("model").is_none());
	assert!(sent.get("stream").is_none());
}

#[tokio::test]
async fn openai_chat_to_anthropic_messages() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/v1/messages"))
		.and(has_header("x-api-key", "sk-ant-1"))
		.and(has_header("anthropic-version", "2023-06-01"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"id": "msg_1",
			"type": "message",
			"role": "assistant",
			"model": "claude-3-haiku-20240307",
			"content": [{"type": "text", "text": "Hello"}],
			"stop_reason": "end_turn",
			"usage": {"input_tokens": 3, "output_tokens": 1}
		})))
		.expect(1)
		.mount(&server)
		.await;
	let (p, _) = pipeline(&server, vec![key(Service::Anthropic, "sk-ant-1")], Config::default());

	let req = ProxyRequest::new(
		Service::Anthropic,
		Format::OpenAI,
		body(json!({
			"model": "claude-3-haiku-20240307",
			"messages": [{"role": "system", "content": "be brief"}, {"role": "user", "content": "hi"}]
		})),
	);
	let resp = p.proxy(req, &CancellationToken::new()).await.unwrap();
	assert_eq!(resp["id"], "msg_1");
	assert_eq!(resp["choices"][0]["message"]["content"], "Hello");
	assert_eq!(resp["choices"][0]["finish_reason"], "stop");
	assert_eq!(resp["usage"]["total_tokens"], 4);

	let sent: Value = serde_json::from_slice(&server.received_requests().await.unwrap()[0].body).unwrap();
	assert_eq!(sent["system"], "be brief");
	assert_eq!(sent["messages"][0]["role"], "user");
}

#[tokio::test]
async fn rate_limited_key_is_skipped_on_retry() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(has_header("authorization", "Bearer sk-a"))
		.respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path("/v1/chat/completions"))
		.and(has_header("authorization", "Bearer sk-b"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"id": "chatcmpl-1",
			"object": "chat.completion",
			"created": 1,
			"model": "gpt-4o",
			"choices": [{"index": 0, "message": {"role": "assistant", "content": "ok"}, "finish_reason": "stop"}]
		})))
		.expect(1)
		.mount(&server)
		.await;
	let a = key(Service::OpenAI, "sk-a");
	let (p, pool) = pipeline(
		&server,
		vec![a.clone(), key(Service::OpenAI, "sk-b")],
		Config::default(),
	);

	let req = ProxyRequest::new(
		Service::OpenAI,
		Format::OpenAI,
		body(json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]})),
	);
	let resp = p.proxy(req, &CancellationToken::new()).await.unwrap();
	assert_eq!(resp["choices"][0]["message"]["content"], "ok");

	let a = pool.get(&a.hash).unwrap();
	assert!(a.is_rate_limited(tokio::time::Instant::now()));
	assert_eq!(a.rate_limit_window, Duration::from_secs(30));
}

#[tokio::test]
async fn every_key_rate_limited() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(429))
		.expect(MAX_ATTEMPTS as u64)
		.mount(&server)
		.await;
	let (p, _) = pipeline(&server, vec![key(Service::OpenAI, "sk-a")], Config::default());
	let req = ProxyRequest::new(
		Service::OpenAI,
		Format::OpenAI,
		body(json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]})),
	);
	let (status, resp) = read(p.handle(req, &CancellationToken::new()).await);
	assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
	assert_eq!(resp["error"]["type"], "rate_limit_error");
}

#[tokio::test]
async fn rejected_requests_never_reach_upstream() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(200))
		.expect(0)
		.mount(&server)
		.await;
	let config = Config {
		allowed_model_families: vec![ModelFamily::AwsClaude],
		..Default::default()
	};
	let (p, _) = pipeline(
		&server,
		vec![key(Service::Aws, "AKID:secret:us-east-1")],
		config,
	);
	let cancel = CancellationToken::new();

	// Not JSON.
	let res = p
		.proxy(ProxyRequest::new(Service::Aws, Format::OpenAI, "{"), &cancel)
		.await;
	assert_matches!(res, Err(ProxyError::InvalidBody(_)));

	// Missing messages.
	let res = p
		.proxy(
			ProxyRequest::new(Service::Aws, Format::OpenAI, body(json!({"model": "anthropic.claude-v2"}))),
			&cancel,
		)
		.await;
	assert_matches!(res, Err(ProxyError::AI(AIError::Validation(_))));

	// Family not allowed.
	let res = p
		.proxy(
			ProxyRequest::new(
				Service::Aws,
				Format::OpenAI,
				body(json!({"model": "anthropic.claude-3-opus-20240229-v1:0", "messages": [{"role": "user", "content": "hi"}]})),
			),
			&cancel,
		)
		.await;
	assert_matches!(
		res,
		Err(ProxyError::AI(AIError::ModelFamilyNotAllowed(ModelFamily::AwsClaudeOpus)))
	);

	// Images are not allowed for any service by default.
	let res = p
		.proxy(
			ProxyRequest::new(
				Service::Aws,
				Format::OpenAI,
				body(json!({"model": "anthropic.claude-v2", "messages": [{"role": "user", "content": [
					{"type": "text", "text": "what is this"},
					{"type": "image_url", "image_url": {"url": "data:image/png;base64,aGVsbG8="}}
				]}]})),
			),
			&cancel,
		)
		.await;
	assert_matches!(res, Err(ProxyError::AI(AIError::VisionNotAllowed(Service::Aws))));
}

#[tokio::test]
async fn malformed_aws_key_is_never_selected() {
	let server = MockServer::start().await;
	let (p, pool) = pipeline(
		&server,
		vec![key(Service::Aws, "AKID::us-east-1")],
		Config::default(),
	);
	assert_eq!(pool.available(Service::Aws), 0);
	let req = ProxyRequest::new(
		Service::Aws,
		Format::AnthropicChat,
		body(json!({"model": "anthropic.claude-v2", "max_tokens": 10, "messages": [{"role": "user", "content": "hi"}]})),
	);
	let (status, resp) = read(p.handle(req, &CancellationToken::new()).await);
	assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(resp["type"], "error");
	assert_eq!(resp["error"]["type"], "overloaded_error");
}

#[tokio::test]
async fn upstream_errors_are_shaped_for_the_client() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/v1/messages"))
		.respond_with(ResponseTemplate::new(400).set_body_json(json!({
			"type": "error",
			"error": {"type": "invalid_request_error", "message": "max_tokens: too large"}
		})))
		.mount(&server)
		.await;
	let (p, _) = pipeline(&server, vec![key(Service::Anthropic, "sk-ant-1")], Config::default());
	let req = ProxyRequest::new(
		Service::Anthropic,
		Format::AnthropicChat,
		body(json!({"model": "claude-3-haiku-20240307", "max_tokens": 999999, "messages": [{"role": "user", "content": "hi"}]})),
	);
	let (status, resp) = read(p.handle(req, &CancellationToken::new()).await);
	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(resp["error"]["message"], "max_tokens: too large");
	assert_eq!(resp["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn gemini_native_with_model_from_path() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/v1beta/models/gemini-1.5-pro:generateContent"))
		.and(query_param("key", "g-key"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"candidates": [{"content": {"role": "model", "parts": [{"text": "Hi"}]}, "finishReason": "STOP", "index": 0}]
		})))
		.expect(1)
		.mount(&server)
		.await;
	let (p, _) = pipeline(&server, vec![key(Service::GoogleAI, "g-key")], Config::default());
	let req = ProxyRequest::new(
		Service::GoogleAI,
		Format::GoogleAI,
		body(json!({"contents": [{"role": "user", "parts": [{"text": "hi"}]}]})),
	)
	.with_model("models/gemini-1.5-pro")
	.with_streaming(false);
	let resp = p.proxy(req, &CancellationToken::new()).await.unwrap();
	assert_eq!(resp["candidates"][0]["content"]["parts"][0]["text"], "Hi");
}

#[tokio::test]
async fn google_key_stays_out_of_connection_errors() {
	// Nothing listens on the port once the listener is dropped.
	let port = std::net::TcpListener::bind("127.0.0.1:0")
		.unwrap()
		.local_addr()
		.unwrap()
		.port();
	let base = url::Url::parse(&format!("http://127.0.0.1:{port}")).unwrap();
	let pool = Arc::new(KeyPool::new(
		vec![key(Service::GoogleAI, "g-secret-key-123")],
		Duration::from_secs(60),
	));
	let config = Arc::new(Config::default());
	let p = Pipeline::new(
		Arc::new(Registry::new()),
		pool,
		config.clone(),
		reqwest::Client::new(),
	)
	.with_upstream(Upstream::new(config.upstreams.clone()).with_endpoint(&base));
	let req = ProxyRequest::new(
		Service::GoogleAI,
		Format::GoogleAI,
		body(json!({"contents": [{"role": "user", "parts": [{"text": "hi"}]}]})),
	)
	.with_model("gemini-1.5-pro")
	.with_streaming(false);

	let resp = p.handle(req, &CancellationToken::new()).await;
	assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
	let text = String::from_utf8_lossy(resp.body()).to_string();
	assert!(!text.contains("g-secret-key-123"), "{text}");
	assert!(!text.contains("key="), "{text}");
}

#[tokio::test]
async fn cancelled_before_upstream_answers() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
		.mount(&server)
		.await;
	let (p, _) = pipeline(&server, vec![key(Service::OpenAI, "sk-a")], Config::default());
	let cancel = CancellationToken::new();
	cancel.cancel();
	let req = ProxyRequest::new(
		Service::OpenAI,
		Format::OpenAI,
		body(json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]})),
	);
	let res = p.proxy(req, &cancel).await;
	assert_matches!(res, Err(ProxyError::AI(AIError::ClientDisconnected)));
}

#[test]
fn keys_from_config() {
	let mut keys = BTreeMap::new();
	keys.insert(
		Service::OpenAI,
		vec![SecretString::from("sk-a".to_string()), SecretString::from("sk-a".to_string())],
	);
	let cfg = Config {
		keys,
		..Default::default()
	};
	assert_eq!(KeyPool::from_config(&cfg).list().len(), 1);
}
