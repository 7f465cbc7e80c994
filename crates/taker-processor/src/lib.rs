//! Order processing module for the order-taker daemon.
//!
//! This is the per-destination-chain pipeline: the admission filter chain,
//! the profitability estimator, the serialized order processor state machine,
//! the mempool retry service and the batch unlocker. Each destination chain
//! owns one processor task and all of its state; nothing here is shared
//! across chains.

use taker_chain::{ChainError, GiveOrderStatus, TakeOrderStatus};
use taker_price::PriceError;
use taker_types::ChainId;
use thiserror::Error;

pub mod estimator;
pub mod filters;
pub mod mempool;
pub mod processor;
pub mod unlocker;

pub use estimator::{estimate_fulfill, EstimatorContext, FulfillEstimation};
pub use filters::{
	build_filter, passes_all, ApprovedTakeToken, DisableFulfill, FilterContext, OrderFilter,
	WhitelistOrderId,
};
pub use mempool::Mempool;
pub use processor::{OrderProcessor, Policy, ProcessorDeps, ProcessorHandle};
pub use unlocker::BatchUnlocker;

use alloy_primitives::U256;

/// Errors that can occur while processing one order.
///
/// Retryable errors defer the order to the mempool under the universal
/// policy; every other error drops the order. No variant ever aborts the
/// processor itself.
#[derive(Debug, Error)]
pub enum ProcessOrderError {
	/// No token bucket holds a reserve token on both chains of the order.
	#[error("no reserve bucket covers {give_chain} -> {take_chain}")]
	NoReserveCoverage {
		give_chain: ChainId,
		take_chain: ChainId,
	},
	/// The destination chain already shows a take-side record.
	#[error("order already has take-side status {0:?}")]
	AlreadyFulfilled(TakeOrderStatus),
	/// The source chain does not show the order as live.
	#[error("order is not live on the source chain: {0:?}")]
	NotCreatedOnSource(GiveOrderStatus),
	/// The strict policy rejected the take token.
	#[error("take token is not in the approved set")]
	TakeTokenNotApproved,
	/// The feed event carried no order payload.
	#[error("event carries no order payload")]
	MissingOrderData,
	/// The order clears less than the configured margin.
	#[error("unprofitable: {profit_bps:.2} bps, required {required_bps} bps")]
	Unprofitable { profit_bps: f64, required_bps: u32 },
	/// The operator reserve on the destination chain is too small.
	#[error("insufficient reserve: required {required}, available {available}")]
	InsufficientReserve { required: U256, available: U256 },
	/// The fulfill transaction was rejected on submission.
	#[error("fulfill submission failed: {0}")]
	FulfillSendFailed(#[source] ChainError),
	/// The fulfillment did not become visible within the polling bound.
	#[error("fulfillment not observed after {0} status polls")]
	FulfillmentNotObserved(u32),
	/// A chain query failed.
	#[error(transparent)]
	Chain(#[from] ChainError),
	/// A price lookup failed.
	#[error(transparent)]
	Price(#[from] PriceError),
}

impl ProcessOrderError {
	/// True for soft failures worth reconsidering when prices move or
	/// reserves replenish.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			ProcessOrderError::Unprofitable { .. }
				| ProcessOrderError::InsufficientReserve { .. }
				| ProcessOrderError::FulfillSendFailed(_)
				| ProcessOrderError::Chain(_)
				| ProcessOrderError::Price(_)
		)
	}
}
