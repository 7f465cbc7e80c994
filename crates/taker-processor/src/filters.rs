//! Order admission filters.
//!
//! A filter is a pure predicate over an order and its routing context. The
//! executor combines the global filters with the destination chain's
//! dst-filters and the source chain's src-filters; every filter must return
//! true or the order is dropped silently.

use std::collections::HashSet;
use std::sync::Arc;
use taker_config::FilterSpec;
use taker_types::{truncate_id, Address, ChainId, Order, OrderId};

/// Routing context a filter may inspect.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext {
	/// Source chain of the order.
	pub give_chain: ChainId,
	/// Destination chain of the order.
	pub take_chain: ChainId,
}

/// A pure admission predicate.
pub trait OrderFilter: Send + Sync {
	/// Name used in rejection logs.
	fn name(&self) -> &'static str;

	/// Returns true to admit the order.
	fn check(&self, order: &Order, ctx: &FilterContext) -> bool;
}

/// Always-false filter, appended automatically when a destination chain is
/// marked disabled.
pub struct DisableFulfill;

impl OrderFilter for DisableFulfill {
	fn name(&self) -> &'static str {
		"disable_fulfill"
	}

	fn check(&self, _order: &Order, _ctx: &FilterContext) -> bool {
		false
	}
}

/// Admits only orders whose computed id is in a configured set.
///
/// The id is recomputed from the order payload; the filter never trusts the
/// id the feed attached to the event.
pub struct WhitelistOrderId {
	allowed: HashSet<OrderId>,
}

impl WhitelistOrderId {
	pub fn new(allowed: impl IntoIterator<Item = OrderId>) -> Self {
		Self {
			allowed: allowed.into_iter().collect(),
		}
	}
}

impl OrderFilter for WhitelistOrderId {
	fn name(&self) -> &'static str {
		"whitelist_order_id"
	}

	fn check(&self, order: &Order, _ctx: &FilterContext) -> bool {
		self.allowed.contains(&order.compute_id())
	}
}

/// Admits only orders whose take token byte-equals one of a configured list.
pub struct ApprovedTakeToken {
	tokens: Vec<Address>,
}

impl ApprovedTakeToken {
	pub fn new(tokens: Vec<Address>) -> Self {
		Self { tokens }
	}
}

impl OrderFilter for ApprovedTakeToken {
	fn name(&self) -> &'static str {
		"approved_take_token"
	}

	fn check(&self, order: &Order, _ctx: &FilterContext) -> bool {
		self.tokens
			.iter()
			.any(|token| *token == order.take.token_address)
	}
}

/// Instantiates a filter from its configuration form.
pub fn build_filter(spec: &FilterSpec) -> Arc<dyn OrderFilter> {
	match spec {
		FilterSpec::WhitelistOrderIds { order_ids } => {
			Arc::new(WhitelistOrderId::new(order_ids.iter().copied()))
		}
		FilterSpec::ApprovedTakeTokens { tokens } => {
			Arc::new(ApprovedTakeToken::new(tokens.clone()))
		}
	}
}

/// Runs every filter and ANDs the results. Evaluation order carries no
/// meaning; the first rejection is logged and short-circuits.
pub fn passes_all(filters: &[Arc<dyn OrderFilter>], order: &Order, ctx: &FilterContext) -> bool {
	for filter in filters {
		if !filter.check(order, ctx) {
			tracing::debug!(
				order_id = %truncate_id(&order.compute_id().to_string()),
				filter = filter.name(),
				"Order rejected by filter"
			);
			return false;
		}
	}
	true
}
