//! Scriptable price source for testing and development.
//!
//! Prices are held in memory and can be changed at runtime, which is how the
//! mempool re-drive scenarios simulate market movement. An optional fallback
//! price stands in for tokens that were never scripted.

use crate::{PriceError, PriceServiceInterface, TokenPrice};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use taker_types::{Address, ChainId};

/// In-memory price source with runtime-settable prices.
pub struct MockPriceService {
	prices: RwLock<HashMap<(ChainId, Address), TokenPrice>>,
	/// Price used for unscripted tokens; `None` makes lookups fail instead.
	fallback: Option<TokenPrice>,
}

impl MockPriceService {
	/// Creates an empty source that errors on unscripted tokens.
	pub fn new() -> Self {
		Self {
			prices: RwLock::new(HashMap::new()),
			fallback: None,
		}
	}

	/// Creates a source that answers `fallback` for unscripted tokens.
	pub fn with_fallback(fallback: TokenPrice) -> Self {
		Self {
			prices: RwLock::new(HashMap::new()),
			fallback: Some(fallback),
		}
	}

	/// Scripts the price for a token.
	pub fn set_price(&self, chain_id: ChainId, token: Address, price: TokenPrice) {
		self.prices
			.write()
			.expect("price map lock poisoned")
			.insert((chain_id, token), price);
	}
}

impl Default for MockPriceService {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl PriceServiceInterface for MockPriceService {
	async fn get_price(&self, chain_id: ChainId, token: &Address) -> Result<TokenPrice, PriceError> {
		let prices = self.prices.read().expect("price map lock poisoned");
		prices
			.get(&(chain_id, token.clone()))
			.copied()
			.or(self.fallback)
			.ok_or_else(|| PriceError::TokenNotSupported(token.clone(), chain_id))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_scripted_price_overrides_fallback() {
		let service = MockPriceService::with_fallback(TokenPrice {
			usd: 1.0,
			decimals: 6,
		});
		let token = Address(vec![1; 20]);

		let fallback = service.get_price(ChainId(137), &token).await.unwrap();
		assert_eq!(fallback.usd, 1.0);

		service.set_price(
			ChainId(137),
			token.clone(),
			TokenPrice {
				usd: 0.98,
				decimals: 6,
			},
		);
		let scripted = service.get_price(ChainId(137), &token).await.unwrap();
		assert_eq!(scripted.usd, 0.98);
	}

	#[tokio::test]
	async fn test_unscripted_token_errors_without_fallback() {
		let service = MockPriceService::new();
		let result = service.get_price(ChainId(1), &Address(vec![2; 20])).await;
		assert!(matches!(result, Err(PriceError::TokenNotSupported(_, _))));
	}
}
