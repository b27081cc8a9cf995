use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
	#[default]
	Plain,
	Json,
}

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over `default_level`.
pub fn setup_logging(format: LogFormat, default_level: &str) -> anyhow::Result<()> {
	let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
	let registry = tracing_subscriber::registry().with(filter);
	match format {
		LogFormat::Plain => registry
			.with(tracing_subscriber::fmt::layer().with_target(true))
			.try_init()?,
		LogFormat::Json => registry
			.with(
				tracing_subscriber::fmt::layer()
					.json()
					.flatten_event(true)
					.with_current_span(false),
			)
			.try_init()?,
	}
	Ok(())
}
