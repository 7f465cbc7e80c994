//! Reserve token buckets.
//!
//! A bucket groups equivalent reserve tokens across chains (for example the
//! canonical USDC instances). The processor uses buckets to find a reserve
//! token that exists on both the source and destination chain of an order.

use crate::{Address, ChainId};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

/// A grouping of equivalent reserve tokens across chains.
///
/// The token list per chain is ordered: the first entry is the canonical
/// reserve token for that chain.
#[derive(Debug, Clone, Default)]
pub struct TokensBucket(pub HashMap<ChainId, Vec<Address>>);

// Chain ids appear as string keys in TOML and JSON maps, so the bucket
// (de)serializes through a string-keyed map.
impl Serialize for TokensBucket {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let string_map: HashMap<String, &Vec<Address>> = self
			.0
			.iter()
			.map(|(chain, tokens)| (chain.0.to_string(), tokens))
			.collect();
		string_map.serialize(serializer)
	}
}

impl<'de> Deserialize<'de> for TokensBucket {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let string_map: HashMap<String, Vec<Address>> = HashMap::deserialize(deserializer)?;
		let mut result = HashMap::new();
		for (key, tokens) in string_map {
			let chain_id = key.parse::<u64>().map_err(|e| {
				serde::de::Error::custom(format!("Invalid chain id '{}': {}", key, e))
			})?;
			result.insert(ChainId(chain_id), tokens);
		}
		Ok(TokensBucket(result))
	}
}

impl TokensBucket {
	/// Creates a bucket from `(chain, tokens)` pairs.
	pub fn new(entries: impl IntoIterator<Item = (ChainId, Vec<Address>)>) -> Self {
		Self(entries.into_iter().collect())
	}

	/// Returns the canonical reserve token for a chain, if the bucket holds
	/// any token there.
	pub fn find_first_token(&self, chain_id: ChainId) -> Option<&Address> {
		self.0.get(&chain_id).and_then(|tokens| tokens.first())
	}

	/// Returns true if the bucket holds the given token on the given chain.
	pub fn contains(&self, chain_id: ChainId, token: &Address) -> bool {
		self.0
			.get(&chain_id)
			.is_some_and(|tokens| tokens.iter().any(|t| t == token))
	}

	/// Returns true if the bucket holds a token on both chains.
	pub fn covers(&self, give_chain: ChainId, take_chain: ChainId) -> bool {
		self.find_first_token(give_chain).is_some() && self.find_first_token(take_chain).is_some()
	}

	/// Returns true if the bucket holds no tokens on any chain.
	pub fn is_empty(&self) -> bool {
		self.0.values().all(|tokens| tokens.is_empty())
	}

	/// Iterates over all `(chain, token)` pairs in the bucket.
	pub fn iter_tokens(&self) -> impl Iterator<Item = (ChainId, &Address)> {
		self.0
			.iter()
			.flat_map(|(chain, tokens)| tokens.iter().map(|token| (*chain, token)))
	}
}
