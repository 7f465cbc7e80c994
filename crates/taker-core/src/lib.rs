//! Core engine for the order-taker daemon.
//!
//! This module wires the configured chains into per-destination order
//! processors, builds the filter chains, performs the startup work that must
//! precede order flow (address lookup tables on Solana, idempotent reserve
//! approvals) and runs the main loop that pumps feed events through the
//! executor until shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use taker_chain::ChainRegistry;
use taker_config::{Config, PolicyKind};
use taker_feed::{FeedContext, FeedError, OrderFeedInterface};
use taker_price::PriceServiceInterface;
use taker_processor::{
	build_filter, BatchUnlocker, DisableFulfill, OrderFilter, OrderProcessor, Policy,
	ProcessorDeps,
};
use taker_types::Hooks;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod approvals;
pub mod executor;

pub use executor::{ChainFilters, Executor};

/// Errors that can occur during engine construction and operation.
#[derive(Debug, Error)]
pub enum EngineError {
	/// Error related to configuration issues.
	#[error("Configuration error: {0}")]
	Config(String),
	/// Error from a chain during startup work.
	#[error("Chain error: {0}")]
	Chain(String),
	/// Error from the order feed.
	#[error("Feed error: {0}")]
	Feed(#[from] FeedError),
}

/// The assembled taker: processors, executor and the order feed.
pub struct Engine {
	config: Config,
	chains: Arc<ChainRegistry>,
	executor: Arc<Executor>,
	feed: Arc<dyn OrderFeedInterface>,
	hooks: Hooks,
}

impl Engine {
	/// Builds the engine from validated configuration and live collaborators.
	///
	/// Startup order matters: lookup tables and reserve approvals complete
	/// before any processor exists, so no order can be fulfilled against an
	/// unprepared chain.
	pub async fn new(
		config: Config,
		feed: Arc<dyn OrderFeedInterface>,
		price: Arc<dyn PriceServiceInterface>,
		chains: ChainRegistry,
		hooks: Hooks,
	) -> Result<Self, EngineError> {
		for entry in &config.chains {
			if !chains.contains_key(&entry.chain) {
				return Err(EngineError::Config(format!(
					"Chain {} is configured but has no chain handle",
					entry.chain
				)));
			}
		}

		// Address lookup tables must exist before the first Solana fulfill.
		for entry in &config.chains {
			if !entry.chain.is_solana() {
				continue;
			}
			let handle = chains.get(&entry.chain).expect("checked above");
			handle
				.client
				.init_address_lookup_tables()
				.await
				.map_err(|e| EngineError::Chain(e.to_string()))?;
			tracing::info!(chain_id = %entry.chain, "Address lookup tables initialized");
		}

		approvals::approve_reserves(&chains, &config.chains, &config.buckets).await?;

		let chains = Arc::new(chains);
		let buckets = Arc::new(config.buckets.clone());
		let mut processors = HashMap::new();
		let mut filters = HashMap::new();

		for entry in &config.chains {
			let policy_kind = entry.policy(config.taker.order_processor);
			let universal = config.taker.universal;
			// The strict policy unlocks per order; its unlocker never batches.
			let batch_size = match policy_kind {
				PolicyKind::Universal => universal.batch_unlock_size,
				PolicyKind::Strict => 1,
			};
			let unlocker = Arc::new(BatchUnlocker::new(
				entry.chain,
				batch_size,
				Arc::clone(&chains),
				hooks.clone(),
			));
			let policy = match policy_kind {
				PolicyKind::Universal => Policy::Universal(universal),
				PolicyKind::Strict => Policy::Strict {
					approved_take_tokens: entry.approved_take_tokens.clone(),
				},
			};
			let deps = ProcessorDeps {
				chain_id: entry.chain,
				chains: Arc::clone(&chains),
				price: Arc::clone(&price),
				buckets: Arc::clone(&buckets),
				hooks: hooks.clone(),
				policy,
			};
			let handle = OrderProcessor::spawn(deps, unlocker);
			processors.insert(entry.chain, handle);

			let mut dst_filters: Vec<Arc<dyn OrderFilter>> =
				entry.dst_filters.iter().map(build_filter).collect();
			if entry.disabled {
				dst_filters.push(Arc::new(DisableFulfill));
			}
			let src_filters: Vec<Arc<dyn OrderFilter>> =
				entry.src_filters.iter().map(build_filter).collect();
			filters.insert(
				entry.chain,
				ChainFilters {
					dst_filters,
					src_filters,
				},
			);
			tracing::info!(
				component = "processor",
				chain_id = %entry.chain,
				policy = ?policy_kind,
				disabled = entry.disabled,
				"Loaded"
			);
		}

		let executor = Arc::new(Executor::new(
			processors,
			filters,
			Vec::new(),
			hooks.clone(),
		));

		Ok(Self {
			config,
			chains,
			executor,
			feed,
			hooks,
		})
	}

	/// Returns the dispatcher, mainly for the service layer and tests.
	pub fn executor(&self) -> &Arc<Executor> {
		&self.executor
	}

	/// Starts the feed and pumps events into the executor until ctrl-c.
	pub async fn run(&self) -> Result<(), EngineError> {
		let ctx = FeedContext {
			unlock_authorities: self
				.chains
				.values()
				.map(|handle| (handle.chain_id, handle.unlock_authority.clone()))
				.collect(),
			confirmation_thresholds: self
				.config
				.chains
				.iter()
				.map(|entry| {
					(
						entry.chain,
						entry.constraints.required_confirmations_thresholds.clone(),
					)
				})
				.collect(),
			hooks: self.hooks.clone(),
		};

		let (event_tx, mut event_rx) = mpsc::unbounded_channel();
		self.feed.start(ctx, event_tx).await?;
		tracing::info!("Order feed started");

		loop {
			tokio::select! {
				maybe_event = event_rx.recv() => match maybe_event {
					Some(event) => self.executor.dispatch(event),
					None => {
						tracing::warn!("Order feed closed");
						break;
					}
				},
				_ = tokio::signal::ctrl_c() => {
					tracing::info!("Shutting down");
					break;
				}
			}
		}

		self.feed.stop().await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::U256;
	use std::time::Duration;
	use taker_chain::MockChain;
	use taker_feed::{ChannelOrderFeed, FeedPublisher};
	use taker_price::{MockPriceService, TokenPrice};
	use taker_types::{Address, ChainId, Order, OrderEvent, OrderEventKind, OrderId, OrderOffer};

	const ARBITRUM: ChainId = ChainId(42161);
	const POLYGON: ChainId = ChainId(137);

	fn usdc_src() -> Address {
		Address(vec![0xA1; 20])
	}

	fn usdc_dst() -> Address {
		Address(vec![0xB1; 20])
	}

	fn base_config(extra_dst: &str) -> String {
		format!(
			r#"
[taker]
order_processor = "universal"

[feed]
url = "wss://feed.example.org/ws"

[[buckets]]
42161 = ["{src_token}"]
137 = ["{dst_token}"]

[[chains]]
chain = 42161
chain_rpc = "https://arb.example.org"
beneficiary = "0x1111111111111111111111111111111111111111"
taker_private_key = "0xaa"
unlock_authority_private_key = "0xbb"

[[chains]]
chain = 137
chain_rpc = "https://polygon.example.org"
beneficiary = "0x2222222222222222222222222222222222222222"
taker_private_key = "0xcc"
unlock_authority_private_key = "0xdd"
{extra_dst}
"#,
			src_token = usdc_src(),
			dst_token = usdc_dst(),
		)
	}

	fn order(nonce: u64) -> Order {
		Order {
			maker_order_nonce: nonce,
			maker_src: Address(vec![1; 20]),
			give: OrderOffer {
				chain_id: ARBITRUM,
				token_address: usdc_src(),
				amount: U256::from(100_000_000u64),
			},
			take: OrderOffer {
				chain_id: POLYGON,
				token_address: usdc_dst(),
				amount: U256::from(99_500_000u64),
			},
			receiver_dst: Address(vec![4; 20]),
			give_patch_authority_src: Address(vec![5; 20]),
			order_authority_address_dst: Address(vec![6; 20]),
			allowed_taker_dst: None,
			allowed_cancel_beneficiary_src: None,
		}
	}

	struct Rig {
		src: Arc<MockChain>,
		dst: Arc<MockChain>,
		publisher: FeedPublisher,
		_engine: tokio::task::JoinHandle<()>,
	}

	async fn start(config_str: String) -> Rig {
		let config: Config = config_str.parse().unwrap();
		let src = MockChain::new(ARBITRUM);
		let dst = MockChain::new(POLYGON);
		dst.set_balance(usdc_dst(), U256::from(1_000_000_000u64));

		let mut chains = ChainRegistry::new();
		chains.insert(
			ARBITRUM,
			src.handle(Address(vec![0x11; 20]), Address(vec![0xE1; 20])),
		);
		chains.insert(
			POLYGON,
			dst.handle(Address(vec![0x22; 20]), Address(vec![0xE2; 20])),
		);

		let price: Arc<dyn PriceServiceInterface> =
			Arc::new(MockPriceService::with_fallback(TokenPrice {
				usd: 1.0,
				decimals: 6,
			}));
		let (feed, publisher) = ChannelOrderFeed::new();
		let engine = Engine::new(config, Arc::new(feed), price, chains, Hooks::none())
			.await
			.unwrap();
		let engine_task = tokio::spawn(async move {
			let _ = engine.run().await;
		});

		Rig {
			src,
			dst,
			publisher,
			_engine: engine_task,
		}
	}

	async fn eventually(mut condition: impl FnMut() -> bool) {
		for _ in 0..1000 {
			if condition() {
				return;
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
		panic!("condition not met in time");
	}

	async fn settle() {
		for _ in 0..20 {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	}

	#[tokio::test]
	async fn test_happy_path_fulfills_on_destination() {
		let rig = start(base_config("")).await;
		let order = order(1);
		let id = order.compute_id();

		rig.publisher
			.publish(OrderEvent::new(OrderEventKind::Created, order));
		eventually(|| rig.dst.sent_fulfills().len() == 1).await;

		assert_eq!(rig.dst.sent_fulfills(), vec![id]);
		// Batch size 10, one fulfilled order: no unlock yet.
		assert!(rig.dst.sent_unlocks().is_empty());
		assert!(rig.src.sent_fulfills().is_empty());
	}

	#[tokio::test]
	async fn test_ten_orders_flush_one_unlock_batch() {
		let rig = start(base_config("")).await;
		let orders: Vec<Order> = (1..=10).map(order).collect();
		let ids: Vec<OrderId> = orders.iter().map(|o| o.compute_id()).collect();

		for order in orders {
			rig.publisher
				.publish(OrderEvent::new(OrderEventKind::Created, order));
		}
		eventually(|| rig.dst.sent_fulfills().len() == 10).await;
		eventually(|| rig.dst.sent_unlocks().len() == 1).await;
		assert_eq!(rig.dst.sent_unlocks()[0].order_ids, ids);
	}

	#[tokio::test]
	async fn test_disabled_destination_drops_at_filter_stage() {
		let rig = start(base_config("disabled = true")).await;

		rig.publisher
			.publish(OrderEvent::new(OrderEventKind::Created, order(1)));
		settle().await;

		assert!(rig.dst.sent_fulfills().is_empty());
		assert!(rig.dst.sent_unlocks().is_empty());
	}

	#[tokio::test]
	async fn test_one_false_filter_rejects_despite_others_passing() {
		// The whitelist admits the order, but the src-side approved-token
		// filter does not; unanimity is required.
		let admitted = order(1);
		let extra = format!(
			r#"
[[chains.dst_filters]]
type = "whitelist_order_ids"
order_ids = ["{id}"]
"#,
			id = admitted.compute_id()
		);
		let config = base_config(&extra).replace(
			"unlock_authority_private_key = \"0xbb\"",
			"unlock_authority_private_key = \"0xbb\"\n[[chains.src_filters]]\ntype = \"approved_take_tokens\"\ntokens = [\"0x9999999999999999999999999999999999999999\"]",
		);
		let rig = start(config).await;

		rig.publisher
			.publish(OrderEvent::new(OrderEventKind::Created, admitted));
		settle().await;
		assert!(rig.dst.sent_fulfills().is_empty());
	}

	#[tokio::test]
	async fn test_order_id_whitelist_admits_listed_order_only() {
		let listed = order(1);
		let unlisted = order(2);
		let extra = format!(
			r#"
[[chains.dst_filters]]
type = "whitelist_order_ids"
order_ids = ["{id}"]
"#,
			id = listed.compute_id()
		);
		let rig = start(base_config(&extra)).await;
		let listed_id = listed.compute_id();

		rig.publisher
			.publish(OrderEvent::new(OrderEventKind::Created, unlisted));
		rig.publisher
			.publish(OrderEvent::new(OrderEventKind::Created, listed));
		eventually(|| rig.dst.sent_fulfills().len() == 1).await;
		settle().await;
		assert_eq!(rig.dst.sent_fulfills(), vec![listed_id]);
	}

	#[tokio::test]
	async fn test_unconfigured_destination_is_dropped() {
		let rig = start(base_config("")).await;
		let mut stray = order(1);
		stray.take.chain_id = ChainId(8453);

		rig.publisher
			.publish(OrderEvent::new(OrderEventKind::Created, stray));
		settle().await;
		assert!(rig.dst.sent_fulfills().is_empty());
	}

	#[tokio::test]
	async fn test_startup_approves_bucket_tokens() {
		let rig = start(base_config("")).await;
		// One bucket token per chain, two spenders each.
		assert_eq!(rig.src.approvals().len(), 2);
		assert_eq!(rig.dst.approvals().len(), 2);

		let src_tokens: Vec<Address> =
			rig.src.approvals().iter().map(|(t, _)| t.clone()).collect();
		assert_eq!(src_tokens, vec![usdc_src(), usdc_src()]);
	}

	#[tokio::test]
	async fn test_engine_rejects_missing_chain_handle() {
		let config: Config = base_config("").parse().unwrap();
		let (feed, _publisher) = ChannelOrderFeed::new();
		let price: Arc<dyn PriceServiceInterface> =
			Arc::new(MockPriceService::with_fallback(TokenPrice {
				usd: 1.0,
				decimals: 6,
			}));
		let result = Engine::new(
			config,
			Arc::new(feed),
			price,
			ChainRegistry::new(),
			Hooks::none(),
		)
		.await;
		assert!(matches!(result, Err(EngineError::Config(_))));
	}
}
