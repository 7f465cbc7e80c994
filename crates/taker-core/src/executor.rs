//! Top-level event dispatcher.
//!
//! The executor routes every feed event to the processor of the order's
//! destination chain. Creation events first run the combined filter chain
//! (global filters, the destination chain's dst-filters and the source
//! chain's src-filters); any filter returning false drops the order
//! silently. Non-creation events skip filters. Dispatch never waits for
//! processing.

use std::collections::HashMap;
use std::sync::Arc;
use taker_processor::{passes_all, FilterContext, OrderFilter, ProcessorHandle};
use taker_types::{truncate_id, ChainId, HookEvent, Hooks, OrderEvent};

/// Filters attached to one configured chain.
#[derive(Default)]
pub struct ChainFilters {
	/// Applied when the chain is the order's destination.
	pub dst_filters: Vec<Arc<dyn OrderFilter>>,
	/// Applied when the chain is the order's source.
	pub src_filters: Vec<Arc<dyn OrderFilter>>,
}

/// Routes feed events to per-destination processors.
pub struct Executor {
	processors: HashMap<ChainId, ProcessorHandle>,
	filters: HashMap<ChainId, ChainFilters>,
	global_filters: Vec<Arc<dyn OrderFilter>>,
	hooks: Hooks,
}

impl Executor {
	/// Creates an executor over the given processors and filters.
	pub fn new(
		processors: HashMap<ChainId, ProcessorHandle>,
		filters: HashMap<ChainId, ChainFilters>,
		global_filters: Vec<Arc<dyn OrderFilter>>,
		hooks: Hooks,
	) -> Self {
		Self {
			processors,
			filters,
			global_filters,
			hooks,
		}
	}

	/// Routes one event. Returns immediately; processing happens on the
	/// destination chain's task.
	pub fn dispatch(&self, event: OrderEvent) {
		let Some(order) = event.order.as_ref() else {
			tracing::warn!(
				order_id = %truncate_id(&event.order_id.to_string()),
				"Event without order payload, dropping"
			);
			return;
		};
		let give_chain = order.give.chain_id;
		let take_chain = order.take.chain_id;

		if !self.filters.contains_key(&give_chain) {
			tracing::debug!(
				order_id = %truncate_id(&event.order_id.to_string()),
				chain_id = %give_chain,
				"Source chain not configured, dropping event"
			);
			return;
		}
		let Some(processor) = self.processors.get(&take_chain) else {
			tracing::debug!(
				order_id = %truncate_id(&event.order_id.to_string()),
				chain_id = %take_chain,
				"Destination chain not configured, dropping event"
			);
			return;
		};

		if event.is_creation() && !self.admit(&event, give_chain, take_chain) {
			return;
		}

		processor.process(event);
	}

	/// Runs the combined filter chain; all filters must admit the order.
	fn admit(&self, event: &OrderEvent, give_chain: ChainId, take_chain: ChainId) -> bool {
		let order = event.order.as_ref().expect("checked by dispatch");
		let ctx = FilterContext {
			give_chain,
			take_chain,
		};

		let dst = self
			.filters
			.get(&take_chain)
			.map(|f| f.dst_filters.as_slice())
			.unwrap_or(&[]);
		let src = self
			.filters
			.get(&give_chain)
			.map(|f| f.src_filters.as_slice())
			.unwrap_or(&[]);

		let admitted = passes_all(&self.global_filters, order, &ctx)
			&& passes_all(dst, order, &ctx)
			&& passes_all(src, order, &ctx);
		if !admitted {
			self.hooks.publish(HookEvent::OrderRejected {
				order_id: event.order_id,
				take_chain,
				reason: "rejected by filter chain".to_string(),
			});
		}
		admitted
	}
}
