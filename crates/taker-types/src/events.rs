//! Order lifecycle events delivered by the order feed.
//!
//! The feed pushes one event per observed order state change. `Created` is a
//! live order; `ArchivalCreated` is a historical replay emitted on startup.
//! `Fulfilled`/`ArchivalFulfilled` mark orders the operator already fulfilled
//! and must still unlock.

use crate::{Order, OrderId};
use serde::{Deserialize, Serialize};

/// Classification of an order feed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEventKind {
	/// A live order was created on the source chain.
	Created,
	/// A historical order replayed during startup.
	ArchivalCreated,
	/// The order was fulfilled by this operator and awaits unlock.
	Fulfilled,
	/// A historical fulfillment replayed during startup.
	ArchivalFulfilled,
	/// The order was cancelled on the source chain.
	Cancelled,
	/// Any other feed status the taker does not act on.
	Other(String),
}

/// A single event from the order feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
	/// Content hash of the order the event concerns.
	pub order_id: OrderId,
	/// What happened.
	pub kind: OrderEventKind,
	/// Order payload, present for events the taker must act on.
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub order: Option<Order>,
	/// Source-chain confirmations the feed observed before delivery.
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub block_confirmations: Option<u64>,
}

impl OrderEvent {
	/// Builds an event carrying a full order payload.
	pub fn new(kind: OrderEventKind, order: Order) -> Self {
		Self {
			order_id: order.compute_id(),
			kind,
			order: Some(order),
			block_confirmations: None,
		}
	}

	/// True for the two admission statuses that run the filter chain and
	/// enter the processor queues.
	pub fn is_creation(&self) -> bool {
		matches!(
			self.kind,
			OrderEventKind::Created | OrderEventKind::ArchivalCreated
		)
	}
}
