//! The credential pool: selection, rate limit feedback and the state the health checker revises.

use std::collections::BTreeSet;
use std::fmt;

use aws_lc_rs::digest;
use itertools::Itertools;
use parking_lot::Mutex;
use relay_core::arc;
use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;

use crate::http::auth::aws::AwsCredentials;
use crate::llm::{AIError, ModelFamily, Service};
use crate::*;

pub mod aws;
pub mod checker;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingStatus {
	Enabled,
	Disabled,
	#[default]
	Unknown,
}

/// What a key is known to be able to do. Empty sets mean "not yet known", which does not
/// restrict selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
	pub model_families: BTreeSet<ModelFamily>,
	pub model_ids: Vec<Strng>,
	pub inference_profiles: Vec<Strng>,
	pub logging: LoggingStatus,
}

impl Capabilities {
	pub fn allows(&self, service: Service, model: &str) -> bool {
		let family = ModelFamily::for_model(service, model);
		(self.model_families.is_empty() || self.model_families.contains(&family))
			&& (self.model_ids.is_empty() || self.model_ids.iter().any(|m| m == model))
	}
}

#[derive(Clone)]
pub struct Key {
	pub hash: Strng,
	pub service: Service,
	secret: SecretString,
	pub is_disabled: bool,
	pub is_revoked: bool,
	pub last_used: Option<Instant>,
	pub last_checked: Option<Instant>,
	pub rate_limited_at: Option<Instant>,
	pub rate_limit_window: Duration,
	pub capabilities: Capabilities,
}

impl fmt::Debug for Key {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Key")
			.field("hash", &self.hash)
			.field("service", &self.service)
			.field("is_disabled", &self.is_disabled)
			.field("is_revoked", &self.is_revoked)
			.field("last_used", &self.last_used)
			.field("rate_limited_at", &self.rate_limited_at)
			.finish_non_exhaustive()
	}
}

impl Key {
	pub fn new(service: Service, secret: SecretString) -> Self {
		Self {
			hash: hash_key(service, &secret),
			service,
			secret,
			is_disabled: false,
			is_revoked: false,
			last_used: None,
			last_checked: None,
			rate_limited_at: None,
			rate_limit_window: Duration::ZERO,
			capabilities: Capabilities::default(),
		}
	}

	pub fn secret(&self) -> &SecretString {
		&self.secret
	}

	pub fn is_rate_limited(&self, now: Instant) -> bool {
		self
			.rate_limited_at
			.is_some_and(|at| now.saturating_duration_since(at) < self.rate_limit_window)
	}

	pub fn is_eligible(&self, service: Service, model: &str) -> bool {
		self.service == service && !self.is_disabled && self.capabilities.allows(service, model)
	}
}

/// `<service>-<first 8 hex chars of sha256(secret)>`. Safe to log.
pub fn hash_key(service: Service, secret: &SecretString) -> Strng {
	let d = digest::digest(&digest::SHA256, secret.expose_secret().as_bytes());
	let hex = hex::encode(d.as_ref());
	strng::format!("{}-{}", service, &hex[..8])
}

/// Sorts `keys` best first: keys that are not rate limited, least recently used first, then
/// rate limited keys, longest limited first.
pub fn prioritize(keys: &mut [&Key], now: Instant) {
	keys.sort_by_key(|k| {
		if k.is_rate_limited(now) {
			(true, k.rate_limited_at)
		} else {
			// None sorts first: a key that has never been used is the least recently used.
			(false, k.last_used)
		}
	});
}

#[derive(Debug)]
pub struct KeyPool {
	keys: Atomic<Vec<Key>>,
	// Readers load `keys` lock free. Writers hold this so that select-and-stamp and field updates
	// from the checker never interleave.
	action_mutex: Mutex<()>,
	default_backoff: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSummary {
	pub service: Service,
	pub total: usize,
	pub active: usize,
	pub revoked: usize,
	pub rate_limited: usize,
}

impl KeyPool {
	pub fn new(keys: Vec<Key>, default_backoff: Duration) -> Self {
		let keys = keys
			.into_iter()
			.unique_by(|k| k.hash.clone())
			.map(|mut k| {
				if k.service.requires_signing() && AwsCredentials::parse(&k.secret).is_err() {
					error!(key = %k.hash, "key material is malformed; disabling");
					k.is_disabled = true;
				}
				k
			})
			.collect::<Vec<_>>();
		info!(count = keys.len(), "loaded keys");
		Self {
			keys: arc::new(keys),
			action_mutex: Mutex::new(()),
			default_backoff,
		}
	}

	pub fn from_config(cfg: &Config) -> Self {
		let keys = cfg
			.keys
			.iter()
			.flat_map(|(service, secrets)| secrets.iter().map(|s| Key::new(*service, s.clone())))
			.collect();
		Self::new(keys, cfg.default_rate_limit_backoff)
	}

	pub fn list(&self) -> Arc<Vec<Key>> {
		self.keys.load_full()
	}

	pub fn get(&self, hash: &str) -> Option<Key> {
		self.keys.load().iter().find(|k| k.hash == hash).cloned()
	}

	/// Picks the best eligible key and stamps it as used, as one step.
	pub fn select(&self, service: Service, model: &str) -> Result<Key, AIError> {
		let _mu = self.action_mutex.lock();
		let now = Instant::now();
		let snapshot = self.keys.load_full();
		let mut eligible = snapshot
			.iter()
			.filter(|k| k.is_eligible(service, model))
			.collect::<Vec<_>>();
		prioritize(&mut eligible, now);
		let Some(best) = eligible.first() else {
			return Err(AIError::NoKeysAvailable {
				service,
				model: strng::new(model),
			});
		};
		let hash = best.hash.clone();
		let selected = arc::modify(&self.keys, |keys| {
			keys.iter_mut().find(|k| k.hash == hash).map(|k| {
				k.last_used = Some(now);
				k.clone()
			})
		});
		let selected = selected.ok_or_else(|| AIError::NoKeysAvailable {
			service,
			model: strng::new(model),
		})?;
		debug!(key = %selected.hash, %model, "selected key");
		Ok(selected)
	}

	/// Applies `f` to one key. Returns false if no key has `hash`.
	fn update(&self, hash: &str, f: impl FnOnce(&mut Key)) -> bool {
		let _mu = self.action_mutex.lock();
		arc::modify(&self.keys, |keys| match keys.iter_mut().find(|k| k.hash == hash) {
			Some(k) => {
				f(k);
				true
			},
			None => false,
		})
	}

	pub fn mark_used(&self, hash: &str) {
		let now = Instant::now();
		self.update(hash, |k| k.last_used = Some(now));
	}

	/// Records a rate limit response. Without an upstream hint the default backoff applies.
	pub fn mark_rate_limited(&self, hash: &str, window: Option<Duration>) {
		let window = window.unwrap_or(self.default_backoff);
		let now = Instant::now();
		if self.update(hash, |k| {
			k.rate_limited_at = Some(now);
			k.rate_limit_window = window;
		}) {
			warn!(key = %hash, ?window, "key rate limited");
		}
	}

	pub fn mark_checked(&self, hash: &str, at: Instant) {
		self.update(hash, |k| k.last_checked = Some(at));
	}

	/// Replaces what is known about the models a key can use. The logging status is kept.
	pub fn update_capabilities(&self, hash: &str, caps: Capabilities) {
		self.update(hash, |k| {
			let logging = k.capabilities.logging;
			k.capabilities = Capabilities { logging, ..caps };
		});
	}

	pub fn set_logging_status(&self, hash: &str, status: LoggingStatus) {
		self.update(hash, |k| k.capabilities.logging = status);
	}

	pub fn disable(&self, hash: &str) {
		if self.update(hash, |k| k.is_disabled = true) {
			warn!(key = %hash, "key disabled");
		}
	}

	pub fn revoke(&self, hash: &str) {
		if self.update(hash, |k| {
			k.is_disabled = true;
			k.is_revoked = true;
		}) {
			warn!(key = %hash, "key revoked");
		}
	}

	pub fn available(&self, service: Service) -> usize {
		self
			.keys
			.load()
			.iter()
			.filter(|k| k.service == service && !k.is_disabled)
			.count()
	}

	pub fn summary(&self) -> Vec<ServiceSummary> {
		let now = Instant::now();
		let keys = self.keys.load();
		Service::ALL
			.into_iter()
			.filter_map(|service| {
				let keys = keys.iter().filter(|k| k.service == service).collect::<Vec<_>>();
				if keys.is_empty() {
					return None;
				}
				Some(ServiceSummary {
					service,
					total: keys.len(),
					active: keys.iter().filter(|k| !k.is_disabled).count(),
					revoked: keys.iter().filter(|k| k.is_revoked).count(),
					rate_limited: keys.iter().filter(|k| k.is_rate_limited(now)).count(),
				})
			})
			.collect()
	}
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
