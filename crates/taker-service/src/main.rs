//! Main entry point for the order-taker daemon.
//!
//! This binary loads the taker configuration, wires the pluggable
//! implementations (chain access, price source, order feed, hook sinks)
//! and runs the engine until interrupted. Production transports plug in at
//! the same seams the in-memory implementations use here.

use async_trait::async_trait;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use taker_chain::{ChainAdapterInterface, ChainRegistry, MockChain};
use taker_config::Config;
use taker_core::Engine;
use taker_feed::ChannelOrderFeed;
use taker_price::{CachedPriceService, MockPriceService, PriceServiceInterface, TokenPrice};
use taker_types::{HookEvent, HookSink, Hooks};

/// Command-line arguments for the taker service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Hook sink that forwards order lifecycle events to the log.
struct LogHookSink;

#[async_trait]
impl HookSink for LogHookSink {
	async fn deliver(&self, event: HookEvent) {
		tracing::info!(hook = ?event, "Hook event");
	}
}

/// Main entry point for the taker service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the engine with all implementations
/// 5. Runs the taker until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started taker");

	// Load configuration
	let config = Config::from_file(args.config.to_str().unwrap())?;
	tracing::info!(
		chains = config.chains.len(),
		buckets = config.buckets.len(),
		"Loaded configuration"
	);

	let engine = build_engine(config).await?;
	tracing::info!("Loaded taker engine");

	engine.run().await?;
	Ok(())
}

/// Wires the engine with the implementations shipped in this workspace.
async fn build_engine(config: Config) -> Result<Engine, Box<dyn std::error::Error>> {
	// Chain handles. The in-memory implementation stands in for RPC-backed
	// adapters; one handle per configured chain.
	let mut chains = ChainRegistry::new();
	for entry in &config.chains {
		let chain = MockChain::new(entry.chain);
		let operator = chain.address();
		chains.insert(
			entry.chain,
			chain.handle(entry.beneficiary.clone(), operator),
		);
		tracing::info!(
			component = "chain",
			chain_id = %entry.chain,
			environment = entry.environment.as_deref().unwrap_or("production"),
			"Loaded"
		);
	}

	// Price source, cache-wrapped when a TTL is configured.
	let source: Arc<dyn PriceServiceInterface> =
		Arc::new(MockPriceService::with_fallback(TokenPrice {
			usd: 1.0,
			decimals: 18,
		}));
	let price: Arc<dyn PriceServiceInterface> = if config.price.cache_ttl_secs > 0 {
		Arc::new(CachedPriceService::new(
			source,
			Duration::from_secs(config.price.cache_ttl_secs),
		))
	} else {
		source
	};
	tracing::info!(
		component = "price",
		implementation = %config.price.source,
		cache_ttl_secs = config.price.cache_ttl_secs,
		"Loaded"
	);

	// Order feed. The channel implementation holds the ingress seam; the
	// publisher stays alive so the feed does not close on startup.
	let (feed, publisher) = ChannelOrderFeed::new();
	tokio::spawn(async move {
		let _publisher = publisher;
		std::future::pending::<()>().await;
	});
	tracing::info!(component = "feed", url = %config.feed.url, "Loaded");

	let hooks = Hooks::new(vec![Arc::new(LogHookSink)]);

	let engine = Engine::new(config, Arc::new(feed), price, chains, hooks).await?;
	Ok(engine)
}
