//! Token price module for the order-taker daemon.
//!
//! This module provides the interface for fetching USD token prices across
//! chains, a caching decorator, and a scriptable mock source. Prices feed the
//! profitability estimator only; on-chain amounts never derive from them
//! without an explicit conversion step.

use async_trait::async_trait;
use taker_types::{Address, ChainId};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod cached;
	pub mod mock;
}

pub use implementations::cached::CachedPriceService;
pub use implementations::mock::MockPriceService;

/// Errors that can occur during price lookups.
#[derive(Debug, Error)]
pub enum PriceError {
	/// Error that occurs during network communication with a price source.
	#[error("Network error: {0}")]
	Network(String),
	/// Error that occurs when a token has no known price.
	#[error("Token not supported: {0} on chain {1}")]
	TokenNotSupported(Address, ChainId),
}

/// USD price of one whole token, with the token's decimals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenPrice {
	/// USD per whole token.
	pub usd: f64,
	/// Base-unit decimals of the token.
	pub decimals: u8,
}

impl TokenPrice {
	/// Converts a base-unit amount to its USD worth.
	pub fn amount_to_usd(&self, amount_base_units: f64) -> f64 {
		amount_base_units / 10f64.powi(self.decimals as i32) * self.usd
	}

	/// Converts a USD worth to a base-unit amount of this token.
	pub fn usd_to_amount(&self, usd: f64) -> f64 {
		usd / self.usd * 10f64.powi(self.decimals as i32)
	}
}

/// Trait defining the interface for token price sources.
///
/// Implementations must be safe for concurrent calls; every processor shares
/// one price service.
#[async_trait]
pub trait PriceServiceInterface: Send + Sync {
	/// Returns the USD price for a token on a chain.
	async fn get_price(&self, chain_id: ChainId, token: &Address) -> Result<TokenPrice, PriceError>;
}
