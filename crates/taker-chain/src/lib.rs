//! Chain access module for the order-taker daemon.
//!
//! This module defines the two seams between the taker core and concrete
//! blockchains: the adapter (transaction submission, balances, allowances,
//! the operator's address) and the client (order status queries, cost
//! estimation, fulfill and unlock transaction builders). Concrete RPC-backed
//! implementations live outside the core; a scriptable in-memory
//! implementation ships here for tests and local development.

use alloy_primitives::U256;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use taker_types::{Address, ChainId, Order, OrderId};
use thiserror::Error;

/// Per-chain contract registry for approval targets.
pub mod contracts;

/// Re-export implementations
pub mod implementations {
	pub mod mock;
}

pub use contracts::ChainContracts;
pub use implementations::mock::MockChain;

/// Errors that can occur while talking to a chain.
#[derive(Debug, Error)]
pub enum ChainError {
	/// Error that occurs during network communication with an RPC node.
	#[error("Network error: {0}")]
	Network(String),
	/// Error that occurs when a transaction is rejected on submission.
	#[error("Transaction rejected: {0}")]
	TransactionRejected(String),
	/// Error that occurs when no handle is configured for a chain.
	#[error("Chain not configured: {0}")]
	ChainNotConfigured(ChainId),
}

/// Hash of a submitted transaction, raw bytes to fit every chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxHash(pub Vec<u8>);

impl fmt::Display for TxHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(&self.0))
	}
}

/// Take-side order state on the destination chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeOrderStatus {
	/// No take-side record exists yet.
	NotSet,
	/// The order was fulfilled.
	Fulfilled,
	/// The unlock for the order was already sent.
	SentUnlock,
	/// The order was cancelled on the take side.
	Cancelled,
	/// The chain could not classify the order account.
	Unknown,
}

/// Give-side order state on the source chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveOrderStatus {
	/// No give-side record exists.
	NotSet,
	/// The order is live and fulfillable.
	Created,
	/// The give funds were already claimed.
	Fulfilled,
	/// The unlock was processed.
	SentUnlock,
	/// The order was cancelled.
	Cancelled,
	/// The chain could not classify the order account.
	Unknown,
}

/// A transaction ready for submission, shaped per chain family.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
	/// Chain the transaction targets.
	pub chain_id: ChainId,
	/// Chain-family-specific payload.
	pub payload: TransactionPayload,
}

/// Chain-family-specific transaction body.
#[derive(Debug, Clone)]
pub enum TransactionPayload {
	/// EVM contract call.
	Evm {
		to: Address,
		data: Vec<u8>,
		value: U256,
	},
	/// Solana transaction: serialized instructions plus the address lookup
	/// tables the versioned transaction references.
	Solana {
		data: Vec<u8>,
		lookup_tables: Vec<Address>,
	},
}

/// Chain-variant payload for fulfill transaction builders.
#[derive(Debug, Clone)]
pub enum FulfillPayload {
	/// EVM destination: the unlock authority recorded into the fulfillment.
	Evm { unlock_authority: Address },
	/// Solana destination: the taker wallet funding the fulfillment.
	Solana { taker_wallet: Address },
}

/// Chain-variant payload for unlock transaction builders.
#[derive(Debug, Clone)]
pub enum UnlockPayload {
	/// EVM destination submitting the unlock.
	Evm { unlock_authority: Address },
	/// Solana destination: the wallet signing the unlock.
	Solana { wallet: Address },
}

/// Cost breakdown for taking one order end to end.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowCost {
	/// USD cost of the destination-side fulfill (gas plus pre-swap overhead).
	pub fulfill_cost_usd: f64,
	/// USD cost of one cross-chain unlock, before batch amortization.
	pub unlock_cost_usd: f64,
	/// Reward amounts paid for executing the unlock relay when the source
	/// chain is Solana; zero elsewhere.
	pub rewards: (U256, U256),
}

/// Trait defining the interface for chain adapters.
///
/// One adapter per chain owns the operator's key material for that chain and
/// is internally responsible for serializing its own submissions.
#[async_trait]
pub trait ChainAdapterInterface: Send + Sync {
	/// The operator's address on this chain.
	fn address(&self) -> Address;

	/// Operator balance of a token in base units.
	async fn get_balance(&self, token: &Address) -> Result<U256, ChainError>;

	/// Current allowance granted by the operator to a spender.
	async fn get_allowance(&self, token: &Address, spender: &Address) -> Result<U256, ChainError>;

	/// Grants a spender an unlimited allowance for a token.
	async fn approve(&self, token: &Address, spender: &Address) -> Result<TxHash, ChainError>;

	/// Signs and submits a transaction.
	async fn send_transaction(&self, tx: &TransactionRequest) -> Result<TxHash, ChainError>;
}

/// Trait defining the interface for protocol-aware chain clients.
///
/// A client knows the cross-chain order protocol's on-chain layout for one
/// chain: how to read order state and how to build fulfill and unlock
/// transactions.
#[async_trait]
pub trait ChainClientInterface: Send + Sync {
	/// Reads the take-side state of an order on this chain.
	async fn get_take_order_status(&self, order_id: &OrderId)
		-> Result<TakeOrderStatus, ChainError>;

	/// Reads the give-side state of an order on this chain.
	async fn get_give_order_status(&self, order_id: &OrderId)
		-> Result<GiveOrderStatus, ChainError>;

	/// Estimates the full taker flow cost for an order whose destination is
	/// this chain.
	async fn get_taker_flow_cost(
		&self,
		order: &Order,
		give_native_price_usd: f64,
		take_native_price_usd: f64,
	) -> Result<FlowCost, ChainError>;

	/// Amount of native currency that must accompany an unlock sent from
	/// this chain so the relay can execute on the give chain.
	async fn get_amount_to_send(
		&self,
		take_chain: ChainId,
		give_chain: ChainId,
	) -> Result<U256, ChainError>;

	/// Builds a combined pre-swap + fulfill transaction. The pre-swap
	/// converts `reserve_dst_token` into the take token within
	/// `slippage_bps`; `internal_buffer_bps` overrides the builder's own
	/// slippage buffer and is zero when the caller already priced slippage
	/// into the reserve amount.
	async fn preswap_and_fulfill_order(
		&self,
		order: &Order,
		order_id: &OrderId,
		reserve_dst_token: &Address,
		slippage_bps: u32,
		internal_buffer_bps: u32,
		payload: &FulfillPayload,
	) -> Result<TransactionRequest, ChainError>;

	/// Builds a direct fulfill transaction spending the take token itself.
	async fn fulfill_order(
		&self,
		order: &Order,
		order_id: &OrderId,
		payload: &FulfillPayload,
	) -> Result<TransactionRequest, ChainError>;

	/// Builds one cross-chain unlock transaction releasing the give funds of
	/// every listed order to `beneficiary` on the source chain. `rewards`
	/// carries the two relay reward amounts when the source chain is Solana
	/// and is zero for every other source chain.
	async fn send_unlock_order(
		&self,
		orders: &[(OrderId, Order)],
		beneficiary: &Address,
		execution_fee: U256,
		rewards: (U256, U256),
		payload: &UnlockPayload,
	) -> Result<TransactionRequest, ChainError>;

	/// Initializes the address lookup tables the fulfill and unlock
	/// transactions reference. No-op on account-model chains.
	async fn init_address_lookup_tables(&self) -> Result<(), ChainError>;
}

/// Everything the taker holds for one configured chain.
#[derive(Clone)]
pub struct ChainHandle {
	/// The chain this handle serves.
	pub chain_id: ChainId,
	/// Transaction submission and balances.
	pub adapter: Arc<dyn ChainAdapterInterface>,
	/// Protocol reads and transaction builders.
	pub client: Arc<dyn ChainClientInterface>,
	/// Beneficiary receiving unlocked give funds on this chain.
	pub beneficiary: Address,
	/// Unlock authority address on this chain.
	pub unlock_authority: Address,
}

/// Map of configured chains to their handles.
pub type ChainRegistry = HashMap<ChainId, ChainHandle>;
