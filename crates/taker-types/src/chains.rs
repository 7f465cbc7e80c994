//! Supported chain registry for the taker.
//!
//! Chains are identified by an opaque numeric id. The registry maps each
//! supported id to its execution model and to the hard cap on block
//! confirmations the feed may be asked to wait for. Configuration referring
//! to a chain outside this registry is rejected at startup.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Opaque identifier of a supported chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

/// Execution model of a chain.
///
/// Solana is the single non-account-model chain: transactions are large,
/// address lookup tables must be initialized before order flow starts, and
/// unlocks are not batched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainKind {
	/// Account-model EVM-style chain.
	Evm,
	/// Solana.
	Solana,
}

/// Static metadata for a supported chain.
#[derive(Debug, Clone)]
pub struct ChainInfo {
	/// Human-readable chain name, used in logs only.
	pub name: &'static str,
	/// Execution model.
	pub kind: ChainKind,
	/// Hard cap on block confirmations for this chain. Configured
	/// confirmation thresholds must stay strictly below this value.
	pub max_confirmations: u64,
}

/// Hard confirmation cap for EVM-style chains.
const EVM_MAX_CONFIRMATIONS: u64 = 256;
/// Hard confirmation cap for Solana.
const SOLANA_MAX_CONFIRMATIONS: u64 = 32;

static REGISTRY: Lazy<HashMap<ChainId, ChainInfo>> = Lazy::new(|| {
	let evm = |name| ChainInfo {
		name,
		kind: ChainKind::Evm,
		max_confirmations: EVM_MAX_CONFIRMATIONS,
	};
	HashMap::from([
		(ChainId(1), evm("ethereum")),
		(ChainId(10), evm("optimism")),
		(ChainId(56), evm("bnb")),
		(ChainId(137), evm("polygon")),
		(ChainId(8453), evm("base")),
		(ChainId(42161), evm("arbitrum")),
		(ChainId(43114), evm("avalanche")),
		(
			ChainId(7565164),
			ChainInfo {
				name: "solana",
				kind: ChainKind::Solana,
				max_confirmations: SOLANA_MAX_CONFIRMATIONS,
			},
		),
	])
});

impl ChainId {
	/// Looks up the static metadata for this chain, if it is supported.
	pub fn info(&self) -> Option<&'static ChainInfo> {
		REGISTRY.get(self)
	}

	/// Returns true if this chain id is in the supported set.
	pub fn is_supported(&self) -> bool {
		REGISTRY.contains_key(self)
	}

	/// Returns true if this chain is the non-account-model (Solana) chain.
	pub fn is_solana(&self) -> bool {
		matches!(self.info(), Some(info) if info.kind == ChainKind::Solana)
	}

	/// Hard cap on block confirmations for this chain.
	///
	/// Unknown chains fall back to the EVM cap; config validation rejects
	/// unknown chains before this is ever consulted at runtime.
	pub fn max_confirmations(&self) -> u64 {
		self.info()
			.map(|info| info.max_confirmations)
			.unwrap_or(EVM_MAX_CONFIRMATIONS)
	}
}

impl fmt::Display for ChainId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.info() {
			Some(info) => write!(f, "{}({})", info.name, self.0),
			None => write!(f, "chain({})", self.0),
		}
	}
}

impl From<u64> for ChainId {
	fn from(id: u64) -> Self {
		ChainId(id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_registry_lookup() {
		assert!(ChainId(137).is_supported());
		assert_eq!(ChainId(137).info().unwrap().name, "polygon");
		assert_eq!(ChainId(137).max_confirmations(), 256);
		assert!(!ChainId(137).is_solana());
	}

	#[test]
	fn test_solana_registry_entry() {
		let solana = ChainId(7565164);
		assert!(solana.is_solana());
		assert_eq!(solana.max_confirmations(), 32);
	}

	#[test]
	fn test_unknown_chain() {
		assert!(!ChainId(999_999).is_supported());
		assert!(ChainId(999_999).info().is_none());
	}
}
