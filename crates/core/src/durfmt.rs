//! Go-style duration strings ("1m30s", "250ms"), as used in configuration and rate limit headers.

use std::time::Duration;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
	#[error("invalid duration {0:?}")]
	Invalid(String),
	#[error("negative duration {0:?}")]
	Negative(String),
}

pub fn parse(s: &str) -> Result<Duration, Error> {
	let nanos =
		go_parse_duration::parse_duration(s.trim()).map_err(|_| Error::Invalid(s.to_string()))?;
	let nanos = u64::try_from(nanos).map_err(|_| Error::Negative(s.to_string()))?;
	Ok(Duration::from_nanos(nanos))
}

/// Formats a duration so that `parse(&format(d)) == d` for whole milliseconds.
pub fn format(d: Duration) -> String {
	if d.is_zero() {
		return "0s".to_string();
	}
	let ms = d.as_millis();
	if ms % 1000 != 0 {
		return format!("{ms}ms");
	}
	let mut secs = d.as_secs();
	let mut out = String::new();
	let hours = secs / 3600;
	if hours > 0 {
		out.push_str(&format!("{hours}h"));
		secs %= 3600;
	}
	let mins = secs / 60;
	if mins > 0 {
		out.push_str(&format!("{mins}m"));
		secs %= 60;
	}
	if secs > 0 {
		out.push_str(&format!("{secs}s"));
	}
	out
}
