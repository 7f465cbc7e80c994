//! Order feed ingress for the order-taker daemon.
//!
//! The feed is a push interface delivering `OrderEvent`s into the engine.
//! It is initialized with the operator's unlock authorities and the
//! per-chain confirmation threshold points; the feed is responsible for
//! gating events by confirmation count before delivery. Transport and
//! authentication live behind this trait; the core only sees the events.

use async_trait::async_trait;
use std::collections::HashMap;
use taker_types::{thresholds, Address, ChainId, Hooks, OrderEvent, ThresholdPoint};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod channel;
}

pub use implementations::channel::{ChannelOrderFeed, FeedPublisher};

/// Errors that can occur during feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
	/// Error that occurs while connecting to the feed transport.
	#[error("Connection error: {0}")]
	Connection(String),
	/// Error that occurs when the feed was started twice or never started.
	#[error("Feed state error: {0}")]
	State(String),
}

/// Initialization data handed to the feed before it starts delivering.
#[derive(Debug, Clone, Default)]
pub struct FeedContext {
	/// `(chain, unlock authority)` pairs identifying this operator; the feed
	/// scopes `Fulfilled`/`ArchivalFulfilled` events to these authorities.
	pub unlock_authorities: Vec<(ChainId, Address)>,
	/// Per-chain confirmation threshold points used to gate delivery of
	/// `Created` events by order USD worth.
	pub confirmation_thresholds: HashMap<ChainId, Vec<ThresholdPoint>>,
	/// Hook sink handle for transport-level notifications.
	pub hooks: Hooks,
}

impl FeedContext {
	/// Confirmations a transport must observe on `chain` before delivering
	/// an order of the given give-side USD worth. `None` when the worth
	/// falls below every configured threshold; the transport's own floor
	/// applies then.
	pub fn required_confirmations(&self, chain: ChainId, usd_worth: f64) -> Option<u64> {
		let points = self.confirmation_thresholds.get(&chain)?;
		thresholds::to_ranges(points)
			.iter()
			.find(|range| usd_worth >= range.usd_worth_from && usd_worth < range.usd_worth_to)
			.map(|range| range.min_block_confirmations)
	}
}

/// Trait defining the interface for order feeds.
#[async_trait]
pub trait OrderFeedInterface: Send + Sync {
	/// Starts delivery into `sender`. Returns once delivery is running;
	/// events flow on background tasks owned by the feed.
	async fn start(
		&self,
		ctx: FeedContext,
		sender: tokio::sync::mpsc::UnboundedSender<OrderEvent>,
	) -> Result<(), FeedError>;

	/// Stops delivery and releases the transport.
	async fn stop(&self) -> Result<(), FeedError>;
}
