//! Mempool retry service.
//!
//! Orders that failed a soft gate (unprofitable, unfunded, send failure)
//! park here and are resubmitted to the processor on a fixed interval, in
//! insertion order. Resubmission does not remove an entry; removal happens
//! when the processor observes a terminal event or fulfills the order. A
//! size cap bounds memory: on overflow the oldest entry is evicted.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use taker_types::{truncate_id, ChainId, OrderEvent, OrderId};
use tokio::sync::mpsc;

/// Timer-driven retry ring for one destination chain.
#[derive(Clone)]
pub struct Mempool {
	chain_id: ChainId,
	max_size: usize,
	entries: Arc<Mutex<Vec<(OrderId, OrderEvent)>>>,
}

impl Mempool {
	/// Creates the mempool and spawns its resubmission timer. Every
	/// `interval` the stored events are pushed back into `processor_tx`;
	/// the timer stops when the processor side is gone.
	pub fn spawn(
		chain_id: ChainId,
		interval: Duration,
		max_size: usize,
		processor_tx: mpsc::UnboundedSender<OrderEvent>,
	) -> Self {
		let mempool = Self {
			chain_id,
			max_size,
			entries: Arc::new(Mutex::new(Vec::new())),
		};

		let entries = Arc::clone(&mempool.entries);
		tokio::spawn(async move {
			let start = tokio::time::Instant::now() + interval;
			let mut ticker = tokio::time::interval_at(start, interval);
			loop {
				ticker.tick().await;
				let snapshot: Vec<OrderEvent> = {
					let entries = entries.lock().expect("mempool lock poisoned");
					entries.iter().map(|(_, event)| event.clone()).collect()
				};
				if snapshot.is_empty() {
					continue;
				}
				tracing::debug!(
					chain_id = %chain_id,
					orders = snapshot.len(),
					"Resubmitting mempool orders"
				);
				for event in snapshot {
					if processor_tx.send(event).is_err() {
						return;
					}
				}
			}
		});

		mempool
	}

	/// Adds or refreshes an order. The insertion position of an existing
	/// entry is preserved; a new entry may evict the oldest one.
	pub fn add_order(&self, event: OrderEvent) {
		let mut entries = self.entries.lock().expect("mempool lock poisoned");
		if let Some(slot) = entries.iter_mut().find(|(id, _)| *id == event.order_id) {
			slot.1 = event;
			return;
		}
		if entries.len() >= self.max_size {
			let (evicted, _) = entries.remove(0);
			tracing::warn!(
				chain_id = %self.chain_id,
				order_id = %truncate_id(&evicted.to_string()),
				"Mempool full, evicting oldest order"
			);
		}
		entries.push((event.order_id, event));
	}

	/// Removes an order, if present.
	pub fn delete(&self, order_id: &OrderId) {
		self.entries
			.lock()
			.expect("mempool lock poisoned")
			.retain(|(id, _)| id != order_id);
	}

	/// Number of parked orders.
	pub fn len(&self) -> usize {
		self.entries.lock().expect("mempool lock poisoned").len()
	}

	/// True when no orders are parked.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::U256;
	use taker_types::{Address, Order, OrderEventKind, OrderOffer};

	fn sample_event(nonce: u64) -> OrderEvent {
		OrderEvent::new(
			OrderEventKind::Created,
			Order {
				maker_order_nonce: nonce,
				maker_src: Address(vec![1; 20]),
				give: OrderOffer {
					chain_id: ChainId(42161),
					token_address: Address(vec![2; 20]),
					amount: U256::from(100u64),
				},
				take: OrderOffer {
					chain_id: ChainId(137),
					token_address: Address(vec![3; 20]),
					amount: U256::from(99u64),
				},
				receiver_dst: Address(vec![4; 20]),
				give_patch_authority_src: Address(vec![5; 20]),
				order_authority_address_dst: Address(vec![6; 20]),
				allowed_taker_dst: None,
				allowed_cancel_beneficiary_src: None,
			},
		)
	}

	#[tokio::test(start_paused = true)]
	async fn test_resubmits_on_interval_without_removal() {
		let (tx, mut rx) = mpsc::unbounded_channel();
		let mempool = Mempool::spawn(ChainId(137), Duration::from_secs(60), 10, tx);
		let event = sample_event(1);
		mempool.add_order(event.clone());

		// Nothing before the first interval elapses.
		assert!(rx.try_recv().is_err());

		tokio::time::advance(Duration::from_secs(61)).await;
		assert_eq!(rx.recv().await.unwrap(), event);
		assert_eq!(mempool.len(), 1);

		// Still resubmitted on the next sweep.
		tokio::time::advance(Duration::from_secs(60)).await;
		assert_eq!(rx.recv().await.unwrap(), event);
	}

	#[tokio::test(start_paused = true)]
	async fn test_add_is_idempotent_and_delete_removes() {
		let (tx, _rx) = mpsc::unbounded_channel();
		let mempool = Mempool::spawn(ChainId(137), Duration::from_secs(60), 10, tx);
		let event = sample_event(1);
		mempool.add_order(event.clone());
		mempool.add_order(event.clone());
		assert_eq!(mempool.len(), 1);

		mempool.delete(&event.order_id);
		assert!(mempool.is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn test_overflow_evicts_oldest() {
		let (tx, _rx) = mpsc::unbounded_channel();
		let mempool = Mempool::spawn(ChainId(137), Duration::from_secs(60), 2, tx);
		let first = sample_event(1);
		mempool.add_order(first.clone());
		mempool.add_order(sample_event(2));
		mempool.add_order(sample_event(3));

		assert_eq!(mempool.len(), 2);
		mempool.delete(&first.order_id);
		// The oldest entry was already evicted, so the delete is a no-op.
		assert_eq!(mempool.len(), 2);
	}
}
