//! Background verification of keys against the live provider.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::KeyCheckerConfig;
use crate::keys::{Capabilities, Key, KeyPool, LoggingStatus};
use crate::llm::Service;
use crate::*;

/// What a successful check learned. `None` leaves the current value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckReport {
	pub capabilities: Option<Capabilities>,
	pub logging: Option<LoggingStatus>,
}

#[derive(thiserror::Error, Debug)]
pub enum CheckError {
	#[error("access denied for a required action: {0}")]
	AccessDenied(Strng),
	#[error("credentials revoked or unrecognized: {0}")]
	Revoked(Strng),
	#[error("throttled")]
	Throttled,
	#[error("no probed model is accessible")]
	NoAccessibleModels,
	#[error("validation error: {0}")]
	Validation(Strng),
	#[error("unrecognized error (status {status}, type {error_type}): {message}")]
	Unrecognized {
		status: u16,
		error_type: Strng,
		message: Strng,
	},
	#[error("network error: {0}")]
	Network(Strng),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckAction {
	Disable,
	Revoke,
	Reschedule(Duration),
}

impl CheckError {
	pub fn action(&self, cfg: &KeyCheckerConfig) -> CheckAction {
		match self {
			CheckError::AccessDenied(_) | CheckError::NoAccessibleModels => CheckAction::Disable,
			CheckError::Revoked(_) => CheckAction::Revoke,
			CheckError::Throttled => CheckAction::Reschedule(cfg.throttled_retry),
			CheckError::Network(_) => CheckAction::Reschedule(cfg.network_retry),
			// Fail open on anything we do not understand.
			CheckError::Validation(_) | CheckError::Unrecognized { .. } => {
				CheckAction::Reschedule(cfg.key_check_period)
			},
		}
	}
}

/// Provider specific verification of one key.
#[async_trait]
pub trait KeyProbe: Send + Sync + 'static {
	fn service(&self) -> Service;

	/// `initial` is set the first time a key is seen, when capabilities must be discovered.
	async fn check(&self, key: &Key, initial: bool) -> Result<CheckReport, CheckError>;
}

pub struct KeyChecker<P> {
	pool: Arc<KeyPool>,
	probe: Arc<P>,
	config: KeyCheckerConfig,
	next_check: HashMap<Strng, Instant>,
	last_check: Option<Instant>,
}

impl<P: KeyProbe> KeyChecker<P> {
	pub fn new(pool: Arc<KeyPool>, probe: Arc<P>, config: KeyCheckerConfig) -> Self {
		Self {
			pool,
			probe,
			config,
			next_check: HashMap::new(),
			last_check: None,
		}
	}

	/// The key due soonest and when to check it. Unchecked keys are due immediately.
	pub fn next(&self, now: Instant) -> Option<(Key, Instant)> {
		let service = self.probe.service();
		let keys = self.pool.list();
		let (key, due) = keys
			.iter()
			.filter(|k| k.service == service && !k.is_disabled)
			.map(|k| (k, self.due(k, now)))
			.min_by_key(|(_, due)| *due)?;
		let at = match self.last_check {
			Some(last) => due.max(last + self.config.min_check_interval),
			None => due,
		};
		Some((key.clone(), at))
	}

	fn due(&self, key: &Key, now: Instant) -> Instant {
		if let Some(at) = self.next_check.get(&key.hash) {
			return *at;
		}
		match key.last_checked {
			Some(last) => last + self.config.key_check_period,
			None => now,
		}
	}

	pub async fn check(&mut self, key: &Key) {
		self.last_check = Some(Instant::now());
		let initial = key.last_checked.is_none();
		let result = self.probe.check(key, initial).await;
		let now = Instant::now();
		let hash = key.hash.clone();
		let err = match result {
			Ok(report) => {
				self.pool.mark_checked(&hash, now);
				if let Some(caps) = report.capabilities {
					self.pool.update_capabilities(&hash, caps);
				}
				if let Some(logging) = report.logging {
					self.pool.set_logging_status(&hash, logging);
				}
				if let Some(k) = self.pool.get(&hash) {
					info!(
						key = %hash,
						initial,
						families = ?k.capabilities.model_families,
						logging = ?k.capabilities.logging,
						"checked key"
					);
				}
				self
					.next_check
					.insert(hash, now + self.config.key_check_period);
				return;
			},
			Err(err) => err,
		};
		match err.action(&self.config) {
			CheckAction::Disable => {
				warn!(key = %hash, error = %err, "key can't be used; disabling");
				self.pool.mark_checked(&hash, now);
				self.pool.disable(&hash);
			},
			CheckAction::Revoke => {
				warn!(key = %hash, error = %err, "key is revoked; disabling");
				self.pool.mark_checked(&hash, now);
				self.pool.revoke(&hash);
			},
			CheckAction::Reschedule(after) => {
				match &err {
					CheckError::Validation(_) | CheckError::Unrecognized { .. } => {
						error!(key = %hash, error = %err, "unexpected error checking key")
					},
					_ => warn!(key = %hash, error = %err, ?after, "key check failed; retrying"),
				}
				self.next_check.insert(hash, now + after);
			},
		}
	}

	pub fn start(self, cancel: CancellationToken) -> CheckerHandle {
		let token = cancel.child_token();
		let handle = tokio::spawn(self.run(token.clone()));
		CheckerHandle {
			handle,
			cancel: token,
		}
	}

	async fn run(mut self, cancel: CancellationToken) {
		let service = self.probe.service();
		info!(%service, "starting key checker");
		loop {
			let Some((key, at)) = self.next(Instant::now()) else {
				info!(%service, "no keys left to check; stopping");
				return;
			};
			tokio::select! {
				_ = cancel.cancelled() => break,
				_ = tokio::time::sleep_until(at) => {},
			}
			// The key may have changed while we slept.
			let Some(key) = self.pool.get(&key.hash).filter(|k| !k.is_disabled) else {
				continue;
			};
			tokio::select! {
				_ = cancel.cancelled() => break,
				_ = self.check(&key) => {},
			}
		}
		debug!(%service, "key checker cancelled");
	}
}

/// Owns a running checker task.
#[derive(Debug)]
pub struct CheckerHandle {
	handle: JoinHandle<()>,
	cancel: CancellationToken,
}

impl CheckerHandle {
	pub fn is_finished(&self) -> bool {
		self.handle.is_finished()
	}

	pub async fn shutdown(self) {
		self.cancel.cancel();
		let _ = self.handle.await;
	}
}

#[cfg(test)]
#[path = "checker_tests.rs"]
mod tests;
