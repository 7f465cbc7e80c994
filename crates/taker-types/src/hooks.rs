//! Hook observer sink for order lifecycle notifications.
//!
//! Hooks are an opaque observer: operators plug in sinks that forward
//! notable order events to alerting or bookkeeping systems. Delivery is
//! fire-and-forget on a spawned task, so a slow sink can never block a
//! processor.

use crate::{ChainId, OrderId};
use async_trait::async_trait;
use std::sync::Arc;

/// A notable order lifecycle event worth telling the operator about.
#[derive(Debug, Clone)]
pub enum HookEvent {
	/// An order was fulfilled on its destination chain.
	OrderFulfilled {
		order_id: OrderId,
		take_chain: ChainId,
	},
	/// A batch unlock transaction was submitted.
	OrderUnlockSent {
		order_ids: Vec<OrderId>,
		give_chain: ChainId,
		take_chain: ChainId,
	},
	/// An order was deferred to the mempool for retry.
	OrderPostponed {
		order_id: OrderId,
		take_chain: ChainId,
		reason: String,
	},
	/// An order was dropped and will not be retried.
	OrderRejected {
		order_id: OrderId,
		take_chain: ChainId,
		reason: String,
	},
}

/// A hook delivery target.
#[async_trait]
pub trait HookSink: Send + Sync {
	/// Handles one hook event. Errors are the sink's problem; the taker
	/// never inspects the outcome.
	async fn deliver(&self, event: HookEvent);
}

/// Handle that fans a hook event out to every registered sink.
#[derive(Clone, Default)]
pub struct Hooks {
	sinks: Vec<Arc<dyn HookSink>>,
}

impl Hooks {
	/// Creates a hooks handle with the given sinks.
	pub fn new(sinks: Vec<Arc<dyn HookSink>>) -> Self {
		Self { sinks }
	}

	/// Creates a handle with no sinks; `publish` becomes a no-op.
	pub fn none() -> Self {
		Self::default()
	}

	/// Publishes an event to every sink on detached tasks.
	pub fn publish(&self, event: HookEvent) {
		for sink in &self.sinks {
			let sink = Arc::clone(sink);
			let event = event.clone();
			tokio::spawn(async move {
				sink.deliver(event).await;
			});
		}
	}
}

impl std::fmt::Debug for Hooks {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Hooks")
			.field("sinks", &self.sinks.len())
			.finish()
	}
}
