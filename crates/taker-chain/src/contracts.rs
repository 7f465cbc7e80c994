//! Per-chain contract registry for approval targets.
//!
//! Before any fulfillment, the operator pre-approves two spending contracts
//! per reserve token: the crosschain forwarder (performs the pre-swap) and
//! the destination PMM (pulls the take amount during fulfill). The EVM
//! deployments share one address across chains; Solana has no allowance
//! concept and is excluded from approvals.

use once_cell::sync::Lazy;
use taker_types::{Address, ChainId};

/// The two spender contracts a reserve token must approve on a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainContracts {
	/// Crosschain forwarder executing the pre-fulfill swap.
	pub crosschain_forwarder: Address,
	/// Destination PMM contract pulling the take amount.
	pub dst_pmm: Address,
}

static EVM_CONTRACTS: Lazy<ChainContracts> = Lazy::new(|| ChainContracts {
	crosschain_forwarder: Address::from_hex("0x663dc15d3c1ac63ff12e45ab68fea3f0a883c251")
		.expect("static forwarder address"),
	dst_pmm: Address::from_hex("0xe7351fd770a37282b91d153ee690b63579d6dd7f")
		.expect("static pmm address"),
});

/// Default approval targets for a chain, if it has any.
pub fn default_contracts(chain_id: ChainId) -> Option<ChainContracts> {
	if !chain_id.is_supported() || chain_id.is_solana() {
		return None;
	}
	Some(EVM_CONTRACTS.clone())
}
