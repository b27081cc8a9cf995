use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use relay_core::durfmt;

use crate::http::{HeaderMap, HeaderName, StatusCode, get_header, header, x_headers};

fn get_header_as<T: FromStr>(h: &HeaderMap, name: &HeaderName) -> Option<T> {
	get_header(h, name).and_then(|v| v.parse().ok())
}

/// How long a key should rest after a 429, if the upstream said.
pub fn retry_after(status: StatusCode, h: &HeaderMap) -> Option<Duration> {
	if status == StatusCode::TOO_MANY_REQUESTS {
		process_rate_limit_headers(h, SystemTime::now())
	} else {
		None
	}
}

/// There is no single standard for rate limit headers, so we check a few common ones.
fn process_rate_limit_headers(h: &HeaderMap, now: SystemTime) -> Option<Duration> {
	// Seconds or an HTTP date. Used by Anthropic.
	if let Some(retry_after) = get_header(h, &header::RETRY_AFTER) {
		if let Ok(seconds) = retry_after.parse::<u64>() {
			return Some(Duration::from_secs(seconds));
		}
		if let Ok(http_date) = httpdate::parse_http_date(retry_after)
			&& let Ok(duration) = http_date.duration_since(now)
		{
			return Some(duration);
		}
	}

	// Seconds, or a unix timestamp.
	if let Some(reset) = get_header_as::<u64>(h, &x_headers::X_RATELIMIT_RESET) {
		const DAY: Duration = Duration::from_secs(60 * 60 * 24);
		if reset < 30 * DAY.as_secs() {
			return Some(Duration::from_secs(reset));
		}
		let at = UNIX_EPOCH + Duration::from_secs(reset);
		if let Ok(dur) = at.duration_since(now) {
			return Some(dur);
		}
	}

	// Go style durations. Used by OpenAI.
	[
		x_headers::X_RATELIMIT_RESET_REQUESTS,
		x_headers::X_RATELIMIT_RESET_TOKENS,
	]
	.iter()
	.filter_map(|hn| {
		get_header(h, hn).and_then(|v| {
			durfmt::parse(v).ok().or_else(|| {
				// Treat a bare number as seconds
				v.chars()
					.last()
					.is_some_and(|c| c.is_ascii_digit())
					.then(|| durfmt::parse(&format!("{v}s")).ok())
					.flatten()
			})
		})
	})
	.min()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_process_rate_limit_headers() {
		let now = SystemTime::now();
		let get = |headers: &[(&str, &str)]| {
			let mut h = HeaderMap::new();
			for (k, v) in headers.iter() {
				h.insert(HeaderName::from_str(k).unwrap(), v.parse().unwrap());
			}
			process_rate_limit_headers(&h, now)
		};
		let assert = |headers: &[(&str, &str)], want: Option<Duration>| {
			let got = get(headers);
			assert_eq!(got, want, "headers: {:?} wanted {:?}", headers, want);
		};
		assert(&[("retry-after", "120")], Some(Duration::from_secs(120)));
		assert(&[("retry-after", "0")], Some(Duration::from_secs(0)));
		assert(&[("retry-after", "soon")], None);

		let future_time = now + Duration::from_secs(300);
		let ds = httpdate::fmt_http_date(future_time);
		assert_eq!(get(&[("retry-after", &ds)]).unwrap().as_secs(), 299);

		assert(&[("x-ratelimit-reset", "45")], Some(Duration::from_secs(45)));
		let future_timestamp = (now + Duration::from_secs(240))
			.duration_since(UNIX_EPOCH)
			.unwrap()
			.as_secs()
			.to_string();
		assert_eq!(
			get(&[("x-ratelimit-reset", &future_timestamp)])
				.unwrap()
				.as_secs(),
			239
		);

		assert(
			&[
				("x-ratelimit-reset-requests", "1m30s"),
				("x-ratelimit-reset-tokens", "6s"),
			],
			Some(Duration::from_secs(6)),
		);
		assert(
			&[("x-ratelimit-reset-tokens", "20")],
			Some(Duration::from_secs(20)),
		);
		assert(&[], None);
	}

	#[test]
	fn only_for_429() {
		let mut h = HeaderMap::new();
		h.insert(header::RETRY_AFTER, "5".parse().unwrap());
		assert_eq!(retry_after(StatusCode::BAD_GATEWAY, &h), None);
		assert_eq!(
			retry_after(StatusCode::TOO_MANY_REQUESTS, &h),
			Some(Duration::from_secs(5))
		);
	}
}
