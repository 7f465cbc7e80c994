//! TTL cache decorator for price sources.
//!
//! Wraps any price source and serves repeated lookups from memory until the
//! entry ages out. Profitability runs several lookups per order; without the
//! cache a busy destination chain would hammer the upstream source.

use crate::{PriceError, PriceServiceInterface, TokenPrice};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use taker_types::{Address, ChainId};
use tokio::sync::RwLock;
use tokio::time::Instant;

struct CacheEntry {
	price: TokenPrice,
	fetched_at: Instant,
}

/// Caching decorator around another price source.
pub struct CachedPriceService {
	inner: Arc<dyn PriceServiceInterface>,
	ttl: Duration,
	cache: RwLock<HashMap<(ChainId, Address), CacheEntry>>,
}

impl CachedPriceService {
	/// Wraps `inner` with a cache whose entries live for `ttl`.
	pub fn new(inner: Arc<dyn PriceServiceInterface>, ttl: Duration) -> Self {
		Self {
			inner,
			ttl,
			cache: RwLock::new(HashMap::new()),
		}
	}
}

#[async_trait]
impl PriceServiceInterface for CachedPriceService {
	async fn get_price(&self, chain_id: ChainId, token: &Address) -> Result<TokenPrice, PriceError> {
		let key = (chain_id, token.clone());
		{
			let cache = self.cache.read().await;
			if let Some(entry) = cache.get(&key) {
				if entry.fetched_at.elapsed() < self.ttl {
					return Ok(entry.price);
				}
			}
		}

		let price = self.inner.get_price(chain_id, token).await?;
		self.cache.write().await.insert(
			key,
			CacheEntry {
				price,
				fetched_at: Instant::now(),
			},
		);
		Ok(price)
	}
}
