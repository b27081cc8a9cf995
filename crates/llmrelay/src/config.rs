use std::collections::BTreeMap;
use std::path::Path;

use secrecy::SecretString;

use crate::llm::{ModelFamily, Service};
use crate::*;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
	/// Upstream credentials per service. AWS keys are `accessKeyId:secretAccessKey:region`.
	#[serde(default)]
	pub keys: BTreeMap<Service, Vec<SecretString>>,
	/// Families clients may request. Empty allows all.
	#[serde(default)]
	pub allowed_model_families: Vec<ModelFamily>,
	/// Services that may receive image inputs.
	#[serde(default)]
	pub allowed_vision_services: Vec<Service>,
	/// Allow keys whose account logs prompts. When set, logging is not checked.
	#[serde(default)]
	pub allow_aws_logging: bool,
	#[serde(default = "defaults::rate_limit_backoff", with = "serde_dur")]
	pub default_rate_limit_backoff: Duration,
	#[serde(default)]
	pub key_checker: KeyCheckerConfig,
	#[serde(default)]
	pub aws: AwsConfig,
	#[serde(default)]
	pub upstreams: UpstreamHosts,
	#[serde(default)]
	pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KeyCheckerConfig {
	#[serde(default = "defaults::min_check_interval", with = "serde_dur")]
	pub min_check_interval: Duration,
	#[serde(default = "defaults::key_check_period", with = "serde_dur")]
	pub key_check_period: Duration,
	#[serde(default = "defaults::throttled_retry", with = "serde_dur")]
	pub throttled_retry: Duration,
	#[serde(default = "defaults::network_retry", with = "serde_dur")]
	pub network_retry: Duration,
}

impl Default for KeyCheckerConfig {
	fn default() -> Self {
		Self {
			min_check_interval: defaults::min_check_interval(),
			key_check_period: defaults::key_check_period(),
			throttled_retry: defaults::throttled_retry(),
			network_retry: defaults::network_retry(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AwsConfig {
	/// Models probed when a key is first checked.
	#[serde(default = "defaults::aws_model_ids")]
	pub model_ids: Vec<Strng>,
}

impl Default for AwsConfig {
	fn default() -> Self {
		Self {
			model_ids: defaults::aws_model_ids(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpstreamHosts {
	#[serde(default = "defaults::openai_host")]
	pub openai: Strng,
	#[serde(default = "defaults::anthropic_host")]
	pub anthropic: Strng,
	#[serde(default = "defaults::google_host")]
	pub google_ai: Strng,
	#[serde(default = "defaults::mistral_host")]
	pub mistral_ai: Strng,
}

impl Default for UpstreamHosts {
	fn default() -> Self {
		Self {
			openai: defaults::openai_host(),
			anthropic: defaults::anthropic_host(),
			google_ai: defaults::google_host(),
			mistral_ai: defaults::mistral_host(),
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoggingConfig {
	#[serde(default)]
	pub format: LogFormat,
	#[serde(default)]
	pub level: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	#[default]
	Plain,
	Json,
}

impl From<LogFormat> for relay_core::telemetry::LogFormat {
	fn from(f: LogFormat) -> Self {
		match f {
			LogFormat::Plain => relay_core::telemetry::LogFormat::Plain,
			LogFormat::Json => relay_core::telemetry::LogFormat::Json,
		}
	}
}

mod defaults {
	use super::*;

	pub fn rate_limit_backoff() -> Duration {
		Duration::from_secs(60)
	}
	pub fn min_check_interval() -> Duration {
		Duration::from_secs(3)
	}
	pub fn key_check_period() -> Duration {
		Duration::from_secs(90 * 60)
	}
	pub fn throttled_retry() -> Duration {
		Duration::from_secs(10)
	}
	pub fn network_retry() -> Duration {
		Duration::from_secs(60)
	}
	pub fn aws_model_ids() -> Vec<Strng> {
		[
			"anthropic.claude-v2",
			"anthropic.claude-3-haiku-20240307-v1:0",
			"anthropic.claude-3-5-sonnet-20240620-v1:0",
			"anthropic.claude-3-opus-20240229-v1:0",
			"mistral.mistral-7b-instruct-v0:2",
			"mistral.mixtral-8x7b-instruct-v0:1",
			"mistral.mistral-large-2402-v1:0",
		]
		.into_iter()
		.map(strng::new)
		.collect()
	}
	pub fn openai_host() -> Strng {
		strng::literal!("api.openai.com")
	}
	pub fn anthropic_host() -> Strng {
		strng::literal!("api.anthropic.com")
	}
	pub fn google_host() -> Strng {
		strng::literal!("generativelanguage.googleapis.com")
	}
	pub fn mistral_host() -> Strng {
		strng::literal!("api.mistral.ai")
	}
}

pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
	let cfg: Config = serde_yaml::from_str(contents)?;
	if cfg.key_checker.min_check_interval > cfg.key_checker.key_check_period {
		anyhow::bail!("keyChecker.minCheckInterval must not exceed keyChecker.keyCheckPeriod");
	}
	Ok(cfg)
}

impl Config {
	pub async fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Config> {
		let contents = fs_err::tokio::read_to_string(path.as_ref()).await?;
		parse_config(&contents)
	}

	pub fn family_allowed(&self, family: ModelFamily) -> bool {
		self.allowed_model_families.is_empty() || self.allowed_model_families.contains(&family)
	}

	pub fn vision_allowed(&self, service: Service) -> bool {
		self.allowed_vision_services.contains(&service)
	}
}

impl Default for Config {
	fn default() -> Self {
		// An empty document only uses defaults.
		Config {
			keys: BTreeMap::new(),
			allowed_model_families: vec![],
			allowed_vision_services: vec![],
			allow_aws_logging: false,
			default_rate_limit_backoff: defaults::rate_limit_backoff(),
			key_checker: KeyCheckerConfig::default(),
			aws: AwsConfig::default(),
			upstreams: UpstreamHosts::default(),
			logging: LoggingConfig::default(),
		}
	}
}

#[cfg(test)]
mod tests {
	use secrecy::ExposeSecret;

	use super::*;

	#[test]
	fn parses_full_config() {
		let cfg = parse_config(
			r#"
keys:
  aws:
  - "AKID:secret:us-east-1"
  openai:
  - sk-test
allowedModelFamilies: [aws-claude, turbo]
allowedVisionServices: [openai]
allowAwsLogging: true
defaultRateLimitBackoff: 30s
keyChecker:
  minCheckInterval: 1s
  keyCheckPeriod: 1h
aws:
  modelIds: [anthropic.claude-3-haiku-20240307-v1:0]
upstreams:
  openai: localhost:8080
logging:
  format: json
"#,
		)
		.unwrap();
		assert_eq!(cfg.keys[&Service::Aws][0].expose_secret(), "AKID:secret:us-east-1");
		assert_eq!(
			cfg.allowed_model_families,
			vec![ModelFamily::AwsClaude, ModelFamily::Turbo]
		);
		assert!(cfg.vision_allowed(Service::OpenAI));
		assert!(!cfg.vision_allowed(Service::Aws));
		assert_eq!(cfg.default_rate_limit_backoff, Duration::from_secs(30));
		assert_eq!(cfg.key_checker.key_check_period, Duration::from_secs(3600));
		assert_eq!(cfg.key_checker.throttled_retry, Duration::from_secs(10));
		assert_eq!(cfg.aws.model_ids.len(), 1);
		assert_eq!(cfg.upstreams.openai, "localhost:8080");
		assert_eq!(cfg.upstreams.mistral_ai, "api.mistral.ai");
		assert_eq!(cfg.logging.format, LogFormat::Json);
	}

	#[test]
	fn empty_config_uses_defaults() {
		let cfg = parse_config("{}").unwrap();
		assert!(cfg.keys.is_empty());
		assert!(cfg.family_allowed(ModelFamily::ClaudeOpus));
		assert_eq!(cfg.key_checker, KeyCheckerConfig::default());
		assert_eq!(cfg.default_rate_limit_backoff, Duration::from_secs(60));
	}

	#[test]
	fn rejects_unknown_fields_and_bad_durations() {
		assert!(parse_config("keyz: {}").is_err());
		assert!(parse_config("defaultRateLimitBackoff: soon").is_err());
		assert!(parse_config("keyChecker: {minCheckInterval: 2h, keyCheckPeriod: 1h}").is_err());
	}
}
