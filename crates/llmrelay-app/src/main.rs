use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use llmrelay::Config;
use llmrelay::keys::KeyPool;
use llmrelay::keys::aws::AwsKeyProbe;
use llmrelay::keys::checker::{CheckerHandle, KeyChecker};
use llmrelay::llm::{Format, Registry, Service};
use llmrelay::proxy::{Pipeline, ProxyRequest};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Multi-provider LLM relay")]
struct Args {
	/// Configuration file
	#[arg(short, long, value_name = "FILE")]
	file: Option<PathBuf>,

	/// Parse and check the configuration, then exit
	#[arg(long)]
	validate_only: bool,

	/// Send one request body through the relay and print the response
	#[arg(long, value_name = "FILE")]
	request: Option<PathBuf>,

	/// Dialect of the body given with --request
	#[arg(long, default_value = "openai", value_parser = parse_format)]
	format: Format,

	/// Upstream service for --request
	#[arg(long, default_value = "openai", value_parser = parse_service)]
	service: Service,

	/// Model, for dialects that do not carry it in the body
	#[arg(long)]
	model: Option<String>,
}

fn parse_format(s: &str) -> Result<Format, String> {
	s.parse().map_err(|e: llmrelay::llm::AIError| e.to_string())
}

fn parse_service(s: &str) -> Result<Service, String> {
	Service::ALL
		.into_iter()
		.find(|svc| svc.as_str() == s)
		.ok_or_else(|| format!("unknown service: {s}"))
}

fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()?
		.block_on(run(args))
}

async fn run(args: Args) -> anyhow::Result<()> {
	let config = match &args.file {
		Some(path) => Config::from_file(path).await?,
		None => Config::default(),
	};
	let level = config.logging.level.as_deref().unwrap_or("info");
	relay_core::telemetry::setup_logging(config.logging.format.into(), level)?;

	if args.validate_only {
		println!("configuration is valid");
		return Ok(());
	}

	let config = Arc::new(config);
	let registry = Arc::new(Registry::new());
	let pool = Arc::new(KeyPool::from_config(&config));
	for s in pool.summary() {
		info!(
			service = %s.service,
			total = s.total,
			active = s.active,
			"keys configured"
		);
	}
	let client = reqwest::Client::builder().build()?;
	let cancel = CancellationToken::new();

	if let Some(path) = &args.request {
		let body = fs_err::tokio::read(path).await?;
		let pipeline = Pipeline::new(registry, pool, config, client);
		let mut req = ProxyRequest::new(args.service, args.format, bytes::Bytes::from(body));
		if let Some(model) = &args.model {
			req = req.with_model(model);
		}
		let resp = pipeline.handle(req, &cancel).await;
		info!(status = %resp.status(), "request finished");
		let mut out = tokio::io::stdout();
		out.write_all(resp.body()).await?;
		out.write_all(b"\n").await?;
		out.flush().await?;
		return Ok(());
	}

	let checker = start_checker(&config, &pool, &client, &cancel);
	shutdown_signal().await;
	info!("shutting down");
	cancel.cancel();
	if let Some(checker) = checker {
		checker.shutdown().await;
	}
	Ok(())
}

fn start_checker(
	config: &Arc<Config>,
	pool: &Arc<KeyPool>,
	client: &reqwest::Client,
	cancel: &CancellationToken,
) -> Option<CheckerHandle> {
	if pool.available(Service::Aws) == 0 {
		return None;
	}
	let probe = AwsKeyProbe::new(client.clone(), &config.aws, config.allow_aws_logging);
	let checker = KeyChecker::new(pool.clone(), Arc::new(probe), config.key_checker);
	Some(checker.start(cancel.clone()))
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(error) = tokio::signal::ctrl_c().await {
			warn!(%error, "failed to install ctrl-c handler");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				signal.recv().await;
			},
			Err(error) => {
				warn!(%error, "failed to install SIGTERM handler");
				std::future::pending::<()>().await;
			},
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
