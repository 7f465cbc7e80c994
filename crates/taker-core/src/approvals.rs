//! Startup allowance approvals.
//!
//! Before any fulfillment, every reserve token in every configured bucket
//! must allow the two spending contracts on its chain: the crosschain
//! forwarder and the destination PMM. Approval is idempotent; tokens with a
//! nonzero allowance are skipped. Solana has no allowance concept and is
//! excluded.

use crate::EngineError;
use taker_chain::{contracts, ChainContracts, ChainRegistry};
use taker_config::ChainConfig;
use taker_types::TokensBucket;

/// Resolves the approval targets for a chain, preferring config overrides
/// over the static deployment registry.
pub fn resolve_contracts(entry: &ChainConfig) -> Result<Option<ChainContracts>, EngineError> {
	if entry.chain.is_solana() {
		return Ok(None);
	}
	let defaults = contracts::default_contracts(entry.chain);
	let forwarder = entry
		.crosschain_forwarder
		.clone()
		.or_else(|| defaults.as_ref().map(|c| c.crosschain_forwarder.clone()));
	let pmm = entry
		.dst_pmm
		.clone()
		.or_else(|| defaults.as_ref().map(|c| c.dst_pmm.clone()));
	match (forwarder, pmm) {
		(Some(crosschain_forwarder), Some(dst_pmm)) => Ok(Some(ChainContracts {
			crosschain_forwarder,
			dst_pmm,
		})),
		_ => Err(EngineError::Config(format!(
			"Chain {} has no approval contracts configured",
			entry.chain
		))),
	}
}

/// Grants the two spenders an allowance for every bucket token on every
/// non-Solana chain. Already-granted allowances are left untouched.
pub async fn approve_reserves(
	chains: &ChainRegistry,
	entries: &[ChainConfig],
	buckets: &[TokensBucket],
) -> Result<(), EngineError> {
	for entry in entries {
		let Some(contracts) = resolve_contracts(entry)? else {
			continue;
		};
		let handle = chains
			.get(&entry.chain)
			.ok_or_else(|| EngineError::Config(format!("Chain {} has no handle", entry.chain)))?;

		for bucket in buckets {
			let Some(tokens) = bucket.0.get(&entry.chain) else {
				continue;
			};
			for token in tokens {
				for spender in [&contracts.crosschain_forwarder, &contracts.dst_pmm] {
					let allowance = handle
						.adapter
						.get_allowance(token, spender)
						.await
						.map_err(|e| EngineError::Chain(e.to_string()))?;
					if !allowance.is_zero() {
						tracing::debug!(
							chain_id = %entry.chain,
							token = %token,
							spender = %spender,
							"Allowance already granted"
						);
						continue;
					}
					let tx_hash = handle
						.adapter
						.approve(token, spender)
						.await
						.map_err(|e| EngineError::Chain(e.to_string()))?;
					tracing::info!(
						chain_id = %entry.chain,
						token = %token,
						spender = %spender,
						tx_hash = %tx_hash,
						"Reserve token approved"
					);
				}
			}
		}
	}
	Ok(())
}
