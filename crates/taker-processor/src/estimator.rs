//! Profitability and reserve-amount estimation.
//!
//! For one order the estimator answers four questions: which reserve token
//! to spend on the destination chain, how much of it is needed, whether the
//! order clears the operator's margin, and how much pre-swap slippage the
//! surplus margin can absorb. Revenue is the give-side USD worth; costs are
//! the take-side USD worth plus the taker flow cost, with the unlock cost
//! amortized over the configured batch size. USD math runs in f64; the
//! resulting reserve amount is the only value converted back to base units.

use crate::ProcessOrderError;
use alloy_primitives::U256;
use std::sync::Arc;
use taker_chain::ChainClientInterface;
use taker_price::PriceServiceInterface;
use taker_types::{Address, Order};

/// Upper bound on the pre-swap slippage allowance.
const MAX_SLIPPAGE_BPS: u32 = 100;

/// Shared services the estimator draws on.
pub struct EstimatorContext<'a> {
	/// Price source for give, take, reserve and native tokens.
	pub price: &'a Arc<dyn PriceServiceInterface>,
	/// Destination chain client answering the flow cost.
	pub client: &'a Arc<dyn ChainClientInterface>,
	/// Unlock batch size to amortize over; `None` when either chain does not
	/// participate in batching.
	pub batch_size: Option<usize>,
}

/// Result of estimating one fulfill.
#[derive(Debug, Clone)]
pub struct FulfillEstimation {
	/// Reserve token to spend on the destination chain.
	pub reserve_dst_token: Address,
	/// Required reserve amount in base units, slippage headroom included.
	pub required_reserve_dst_amount: U256,
	/// True when the order clears the configured margin.
	pub is_profitable: bool,
	/// Cleared margin in basis points of the give-side worth.
	pub profit_bps: f64,
	/// Slippage allowance for the pre-swap; zero when no swap is needed.
	pub reserve_to_take_slippage_bps: u32,
	/// Relay reward amounts to pass through to the unlocker.
	pub unlock_rewards: (U256, U256),
}

/// Estimates profitability and the required reserve amount for an order.
pub async fn estimate_fulfill(
	order: &Order,
	reserve_dst_token: &Address,
	min_profitability_bps: u32,
	ctx: EstimatorContext<'_>,
) -> Result<FulfillEstimation, ProcessOrderError> {
	let give_chain = order.give.chain_id;
	let take_chain = order.take.chain_id;

	let give_price = ctx
		.price
		.get_price(give_chain, &order.give.token_address)
		.await?;
	let take_price = ctx
		.price
		.get_price(take_chain, &order.take.token_address)
		.await?;
	let give_native = ctx.price.get_price(give_chain, &Address::native()).await?;
	let take_native = ctx.price.get_price(take_chain, &Address::native()).await?;

	let flow_cost = ctx
		.client
		.get_taker_flow_cost(order, give_native.usd, take_native.usd)
		.await?;

	let give_usd = give_price.amount_to_usd(u256_to_f64(order.give.amount));
	let take_usd = take_price.amount_to_usd(u256_to_f64(order.take.amount));
	let unlock_usd = flow_cost.unlock_cost_usd / ctx.batch_size.unwrap_or(1) as f64;
	let cost_usd = flow_cost.fulfill_cost_usd + unlock_usd;

	let profit_usd = give_usd - take_usd - cost_usd;
	let profit_bps = if give_usd > 0.0 {
		profit_usd / give_usd * 10_000.0
	} else {
		f64::NEG_INFINITY
	};
	let is_profitable = profit_bps >= min_profitability_bps as f64;

	// No swap needed when the reserve already is the take token.
	if *reserve_dst_token == order.take.token_address {
		return Ok(FulfillEstimation {
			reserve_dst_token: reserve_dst_token.clone(),
			required_reserve_dst_amount: order.take.amount,
			is_profitable,
			profit_bps,
			reserve_to_take_slippage_bps: 0,
			unlock_rewards: flow_cost.rewards,
		});
	}

	// The surplus above the required margin is the slippage budget the
	// pre-swap may consume without pushing the order below margin.
	let surplus_bps = (profit_bps - min_profitability_bps as f64).max(0.0);
	let slippage_bps = (surplus_bps as u32).min(MAX_SLIPPAGE_BPS);

	let reserve_price = ctx.price.get_price(take_chain, reserve_dst_token).await?;
	let required = reserve_price.usd_to_amount(take_usd) * (1.0 + slippage_bps as f64 / 10_000.0);

	Ok(FulfillEstimation {
		reserve_dst_token: reserve_dst_token.clone(),
		required_reserve_dst_amount: f64_to_u256_ceil(required),
		is_profitable,
		profit_bps,
		reserve_to_take_slippage_bps: slippage_bps,
		unlock_rewards: flow_cost.rewards,
	})
}

/// Lossy widening of a base-unit amount for USD estimation.
fn u256_to_f64(amount: U256) -> f64 {
	amount.to_string().parse::<f64>().unwrap_or(f64::INFINITY)
}

/// Rounds a base-unit amount up and saturates at `U256::MAX`.
fn f64_to_u256_ceil(amount: f64) -> U256 {
	let rounded = amount.ceil();
	if !rounded.is_finite() || rounded >= u128::MAX as f64 {
		U256::MAX
	} else if rounded <= 0.0 {
		U256::ZERO
	} else {
		U256::from(rounded as u128)
	}
}
