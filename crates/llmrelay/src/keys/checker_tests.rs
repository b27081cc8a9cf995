use std::collections::{BTreeSet, VecDeque};

use parking_lot::Mutex;
use secrecy::SecretString;

use super::*;
use crate::llm::ModelFamily;

/// Answers checks from a script, then succeeds.
#[derive(Default)]
struct FakeProbe {
	script: Mutex<VecDeque<Result<CheckReport, CheckError>>>,
	calls: Mutex<Vec<(Strng, bool, Instant)>>,
}

impl FakeProbe {
	fn then(self, result: Result<CheckReport, CheckError>) -> Self {
		self.script.lock().push_back(result);
		self
	}

	fn calls(&self) -> Vec<(Strng, bool, Instant)> {
		self.calls.lock().clone()
	}
}

#[async_trait]
impl KeyProbe for FakeProbe {
	fn service(&self) -> Service {
		Service::OpenAI
	}

	async fn check(&self, key: &Key, initial: bool) -> Result<CheckReport, CheckError> {
		self
			.calls
			.lock()
			.push((key.hash.clone(), initial, Instant::now()));
		self
			.script
			.lock()
			.pop_front()
			.unwrap_or_else(|| Ok(CheckReport::default()))
	}
}

fn setup(n: usize, probe: FakeProbe) -> (Arc<KeyPool>, Vec<Strng>, KeyChecker<FakeProbe>) {
	let keys = (0..n)
		.map(|i| Key::new(Service::OpenAI, SecretString::from(format!("sk-{i}"))))
		.collect::<Vec<_>>();
	let hashes = keys.iter().map(|k| k.hash.clone()).collect();
	let pool = Arc::new(KeyPool::new(keys, Duration::from_secs(60)));
	let checker = KeyChecker::new(pool.clone(), Arc::new(probe), KeyCheckerConfig::default());
	(pool, hashes, checker)
}

fn gpt4_report() -> CheckReport {
	CheckReport {
		capabilities: Some(Capabilities {
			model_families: BTreeSet::from([ModelFamily::Gpt4, ModelFamily::Turbo]),
			..Default::default()
		}),
		logging: Some(LoggingStatus::Disabled),
	}
}

#[tokio::test(start_paused = true)]
async fn test_initial_check_records_capabilities() {
	let (pool, hashes, mut checker) = setup(1, FakeProbe::default().then(Ok(gpt4_report())));
	let now = Instant::now();
	let (key, at) = checker.next(now).unwrap();
	assert_eq!(at, now);

	checker.check(&key).await;
	let k = pool.get(&hashes[0]).unwrap();
	assert_eq!(k.last_checked, Some(now));
	assert!(k.capabilities.model_families.contains(&ModelFamily::Gpt4));
	assert_eq!(k.capabilities.logging, LoggingStatus::Disabled);
	assert!(!k.is_disabled);
	assert!(checker.probe.calls()[0].1);

	// the next check is a periodic one
	let (_, at) = checker.next(Instant::now()).unwrap();
	assert_eq!(at, now + Duration::from_secs(90 * 60));
	checker.check(&k).await;
	assert!(!checker.probe.calls()[1].1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_reschedule() {
	let probe = FakeProbe::default()
		.then(Err(CheckError::Throttled))
		.then(Err(CheckError::Network(strng::literal!("connection reset"))))
		.then(Err(CheckError::Unrecognized {
			status: 500,
			error_type: strng::literal!("InternalServerException"),
			message: strng::literal!("boom"),
		}));
	let (pool, hashes, mut checker) = setup(1, probe);

	for expected in [10, 60, 90 * 60] {
		let key = pool.get(&hashes[0]).unwrap();
		let now = Instant::now();
		checker.check(&key).await;
		let (_, at) = checker.next(Instant::now()).unwrap();
		assert_eq!(at, now + Duration::from_secs(expected));
		let k = pool.get(&hashes[0]).unwrap();
		assert!(!k.is_disabled);
		assert_eq!(k.last_checked, None);
		tokio::time::advance(Duration::from_secs(1)).await;
	}
}

#[tokio::test(start_paused = true)]
async fn test_revoked_and_denied_keys_are_disabled() {
	let probe = FakeProbe::default()
		.then(Err(CheckError::Revoked(strng::literal!("bad token"))))
		.then(Err(CheckError::AccessDenied(strng::literal!("no access"))));
	let (pool, hashes, mut checker) = setup(2, probe);

	let key = pool.get(&hashes[0]).unwrap();
	checker.check(&key).await;
	let key = pool.get(&hashes[1]).unwrap();
	checker.check(&key).await;

	let revoked = pool.get(&hashes[0]).unwrap();
	assert!(revoked.is_disabled && revoked.is_revoked);
	assert!(revoked.last_checked.is_some());
	let denied = pool.get(&hashes[1]).unwrap();
	assert!(denied.is_disabled && !denied.is_revoked);
	assert!(checker.next(Instant::now()).is_none());
}

#[test]
fn test_error_actions() {
	let cfg = KeyCheckerConfig::default();
	assert_eq!(CheckError::NoAccessibleModels.action(&cfg), CheckAction::Disable);
	assert_eq!(
		CheckError::Validation(strng::literal!("x")).action(&cfg),
		CheckAction::Reschedule(cfg.key_check_period)
	);
	assert_eq!(
		CheckError::Throttled.action(&cfg),
		CheckAction::Reschedule(cfg.throttled_retry)
	);
}

#[tokio::test(start_paused = true)]
async fn test_checks_are_spaced_out() {
	let (pool, hashes, mut checker) = setup(2, FakeProbe::default());
	let start = Instant::now();
	let (key, _) = checker.next(start).unwrap();
	checker.check(&key).await;

	let (next, at) = checker.next(Instant::now()).unwrap();
	assert_ne!(next.hash, key.hash);
	assert!(hashes.contains(&next.hash));
	assert_eq!(at, start + Duration::from_secs(3));
	assert!(pool.get(&next.hash).unwrap().last_checked.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_background_loop() {
	let (pool, hashes, checker) = setup(2, FakeProbe::default());
	let probe = checker.probe.clone();
	let start = Instant::now();
	let handle = checker.start(CancellationToken::new());

	tokio::time::sleep(Duration::from_secs(5)).await;
	let calls = probe.calls();
	assert_eq!(calls.len(), 2);
	assert_eq!(calls[0].2, start);
	assert_eq!(calls[1].2, start + Duration::from_secs(3));
	assert!(calls.iter().all(|(_, initial, _)| *initial));
	assert!(hashes.iter().all(|h| pool.get(h).unwrap().last_checked.is_some()));

	assert!(!handle.is_finished());
	handle.shutdown().await;
	assert_eq!(probe.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_loop_stops_without_keys() {
	let (pool, hashes, checker) = setup(1, FakeProbe::default());
	pool.disable(&hashes[0]);
	let handle = checker.start(CancellationToken::new());
	tokio::time::sleep(Duration::from_millis(10)).await;
	assert!(handle.is_finished());
	handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_parent_cancellation_stops_the_loop() {
	let (_pool, _hashes, checker) = setup(1, FakeProbe::default());
	let parent = CancellationToken::new();
	let handle = checker.start(parent.clone());
	tokio::time::sleep(Duration::from_secs(1)).await;
	parent.cancel();
	tokio::time::sleep(Duration::from_millis(10)).await;
	assert!(handle.is_finished());
}
