//! Verifies Bedrock keys without spending tokens.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Value, json};

use crate::config::AwsConfig;
use crate::http::auth::aws::AwsCredentials;
use crate::http::{HeaderMap, Method, StatusCode, endpoint, get_header, header, x_headers};
use crate::keys::checker::{CheckError, CheckReport, KeyProbe};
use crate::keys::{Capabilities, Key, LoggingStatus};
use crate::llm::{ModelFamily, Service, bedrock};
use crate::*;

pub struct AwsKeyProbe {
	client: reqwest::Client,
	model_ids: Vec<Strng>,
	allow_logging: bool,
	// (protocol, host) replacing every Bedrock endpoint.
	endpoint: Option<(Strng, Strng)>,
}

/// An error from any Bedrock API: the type comes from `x-amzn-errortype`, or the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsError {
	pub status: StatusCode,
	pub error_type: Strng,
	pub message: Strng,
}

impl AwsError {
	pub fn parse(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Self {
		let body: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
		let error_type = get_header(headers, &x_headers::X_AMZN_ERRORTYPE)
			.or_else(|| body.get("__type").and_then(Value::as_str))
			.map(|t| t.split(':').next().unwrap_or(t))
			.map(|t| t.rsplit('#').next().unwrap_or(t))
			.unwrap_or("UnknownError");
		let message = body
			.get("message")
			.or_else(|| body.get("Message"))
			.and_then(Value::as_str)
			.unwrap_or_default();
		Self {
			status,
			error_type: strng::new(error_type),
			message: strng::new(message),
		}
	}

	fn into_check_error(self) -> CheckError {
		match self.error_type.as_str() {
			"AccessDeniedException" => CheckError::AccessDenied(self.message),
			"UnrecognizedClientException" | "InvalidSignatureException" | "ExpiredTokenException" => {
				CheckError::Revoked(self.message)
			},
			"ThrottlingException" | "ServiceQuotaExceededException" => CheckError::Throttled,
			_ if self.status == StatusCode::TOO_MANY_REQUESTS => CheckError::Throttled,
			"ValidationException" => CheckError::Validation(self.message),
			_ => CheckError::Unrecognized {
				status: self.status.as_u16(),
				error_type: self.error_type,
				message: self.message,
			},
		}
	}
}

impl AwsKeyProbe {
	pub fn new(client: reqwest::Client, cfg: &AwsConfig, allow_logging: bool) -> Self {
		Self {
			client,
			model_ids: cfg.model_ids.clone(),
			allow_logging,
			endpoint: None,
		}
	}

	/// Sends every request to `base` instead of the regional endpoints.
	pub fn with_endpoint(mut self, base: &url::Url) -> Self {
		self.endpoint = Some(endpoint(base));
		self
	}

	async fn send(
		&self,
		creds: &AwsCredentials,
		method: Method,
		host: Strng,
		path: &str,
		body: Option<Value>,
	) -> Result<(StatusCode, HeaderMap, Bytes), CheckError> {
		let (protocol, host) = match &self.endpoint {
			Some((protocol, host)) => (protocol.clone(), host.clone()),
			None => (strng::literal!("https"), host),
		};
		let body = match body {
			Some(b) => Bytes::from(b.to_string()),
			None => Bytes::new(),
		};
		let mut headers = vec![(header::ACCEPT, "application/json")];
		if !body.is_empty() {
			headers.push((header::CONTENT_TYPE, "application/json"));
		}
		let req = bedrock::sign(creds, method, &protocol, &host, path, &headers, body)
			.map_err(|e| CheckError::Validation(strng::new(e.to_string())))?;
		let resp = req
			.to_reqwest(&self.client)
			.send()
			.await
			.map_err(|e| CheckError::Network(strng::new(e.to_string())))?;
		let status = resp.status();
		let headers = resp.headers().clone();
		let body = resp
			.bytes()
			.await
			.map_err(|e| CheckError::Network(strng::new(e.to_string())))?;
		Ok((status, headers, body))
	}

	/// Whether the key may invoke `model`. The payload is invalid on purpose: an accessible model
	/// answers with a validation error about `max_tokens` before generating anything.
	async fn invoke_model(&self, creds: &AwsCredentials, model: &str) -> Result<bool, CheckError> {
		let payload = if model.contains("mistral") {
			json!({"prompt": "<s>[INST] hi [/INST]", "max_tokens": -1})
		} else {
			json!({
				"anthropic_version": bedrock::ANTHROPIC_VERSION,
				"messages": [{"role": "user", "content": "hi"}],
				"max_tokens": -1,
			})
		};
		let (status, headers, body) = self
			.send(
				creds,
				Method::POST,
				bedrock::runtime_host(&creds.region),
				&bedrock::invoke_path(model, false),
				Some(payload),
			)
			.await?;
		if status.is_success() {
			return Ok(true);
		}
		let err = AwsError::parse(status, &headers, &body);
		match err.error_type.as_str() {
			"ValidationException" if err.message.to_ascii_lowercase().contains("max_tokens") => {
				trace!(%model, "model is invocable");
				Ok(true)
			},
			"AccessDeniedException" | "ResourceNotFoundException" => {
				trace!(%model, error = %err.error_type, "model is not invocable");
				Ok(false)
			},
			_ => Err(err.into_check_error()),
		}
	}

	async fn inference_profiles(&self, creds: &AwsCredentials, key: &Key) -> Result<Vec<Strng>, CheckError> {
		let (status, headers, body) = self
			.send(
				creds,
				Method::GET,
				bedrock::control_host(&creds.region),
				"/inference-profiles?maxResults=1000",
				None,
			)
			.await?;
		if !status.is_success() {
			let err = AwsError::parse(status, &headers, &body);
			if err.error_type == "AccessDeniedException" {
				// Profiles are optional; the plain model ids still work.
				debug!(key = %key.hash, "key cannot list inference profiles");
				return Ok(vec![]);
			}
			return Err(err.into_check_error());
		}
		let body: Value =
			serde_json::from_slice(&body).map_err(|e| CheckError::Validation(strng::new(e.to_string())))?;
		Ok(
			body
				.get("inferenceProfileSummaries")
				.and_then(Value::as_array)
				.into_iter()
				.flatten()
				.filter(|p| p.get("status").and_then(Value::as_str).is_none_or(|s| s == "ACTIVE"))
				.filter_map(|p| p.get("inferenceProfileId").and_then(Value::as_str))
				.map(strng::new)
				.collect(),
		)
	}

	async fn logging_status(&self, creds: &AwsCredentials) -> Result<LoggingStatus, CheckError> {
		let (status, headers, body) = self
			.send(
				creds,
				Method::GET,
				bedrock::control_host(&creds.region),
				"/logging/modelinvocations",
				None,
			)
			.await?;
		if !status.is_success() {
			return Err(AwsError::parse(status, &headers, &body).into_check_error());
		}
		let body: Value =
			serde_json::from_slice(&body).map_err(|e| CheckError::Validation(strng::new(e.to_string())))?;
		let enabled = body
			.get("loggingConfig")
			.and_then(|c| c.get("textDataDeliveryEnabled"))
			.and_then(Value::as_bool)
			.unwrap_or(false);
		Ok(if enabled {
			LoggingStatus::Enabled
		} else {
			LoggingStatus::Disabled
		})
	}
}

#[async_trait]
impl KeyProbe for AwsKeyProbe {
	fn service(&self) -> Service {
		Service::Aws
	}

	async fn check(&self, key: &Key, initial: bool) -> Result<CheckReport, CheckError> {
		let creds = AwsCredentials::parse(key.secret())
			.map_err(|_| CheckError::Revoked(strng::literal!("malformed key material")))?;
		let candidates = if initial || key.capabilities.model_ids.is_empty() {
			&self.model_ids
		} else {
			&key.capabilities.model_ids
		};
		let mut model_ids = Vec::new();
		for model in candidates {
			if self.invoke_model(&creds, model).await? {
				model_ids.push(model.clone());
			}
		}
		if model_ids.is_empty() {
			return Err(CheckError::NoAccessibleModels);
		}

		let logging = if self.allow_logging {
			LoggingStatus::Unknown
		} else {
			self.logging_status(&creds).await?
		};
		let inference_profiles = if initial {
			self.inference_profiles(&creds, key).await?
		} else {
			key.capabilities.inference_profiles.clone()
		};
		Ok(CheckReport {
			capabilities: Some(Capabilities {
				model_families: model_ids
					.iter()
					.map(|m| ModelFamily::for_model(Service::Aws, m))
					.collect(),
				model_ids,
				inference_profiles,
				logging: LoggingStatus::Unknown,
			}),
			logging: Some(logging),
		})
	}
}

#[cfg(test)]
#[path = "aws_tests.rs"]
mod tests;
