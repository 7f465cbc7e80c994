//! Batch unlocker.
//!
//! Fulfilled orders accumulate here keyed by their source chain. When a
//! source chain's batch reaches the configured size, the first batch-size
//! entries are drained and submitted as one cross-chain unlock transaction
//! targeting that chain's beneficiary. A failed submission re-prepends the
//! drained entries in order and the next hand-off retries. Orders touching
//! Solana on either side do not participate in batching and unlock one by
//! one.

use alloy_primitives::U256;
use std::collections::{HashMap, HashSet, VecDeque};
use taker_chain::{ChainError, ChainRegistry, TxHash, UnlockPayload};
use taker_types::{truncate_id, ChainId, HookEvent, Hooks, Order, OrderId};
use tokio::sync::Mutex;

struct BatchEntry {
	order_id: OrderId,
	order: Order,
	rewards: (U256, U256),
}

#[derive(Default)]
struct UnlockerState {
	batches: HashMap<ChainId, VecDeque<BatchEntry>>,
	/// Ids already carried by a submitted unlock; late feed replays of the
	/// same order are ignored.
	completed: HashSet<OrderId>,
}

/// Per-destination-chain unlock batcher.
pub struct BatchUnlocker {
	take_chain: ChainId,
	batch_size: usize,
	chains: std::sync::Arc<ChainRegistry>,
	hooks: Hooks,
	state: Mutex<UnlockerState>,
}

impl BatchUnlocker {
	/// Creates an unlocker for one destination chain. `batch_size` has
	/// already been validated to `[1, 10]`.
	pub fn new(
		take_chain: ChainId,
		batch_size: usize,
		chains: std::sync::Arc<ChainRegistry>,
		hooks: Hooks,
	) -> Self {
		Self {
			take_chain,
			batch_size,
			chains,
			hooks,
			state: Mutex::new(UnlockerState::default()),
		}
	}

	/// Appends a fulfilled order to its source chain's batch and flushes the
	/// batch if it is full.
	pub async fn unlock_order(&self, order_id: OrderId, order: Order, rewards: (U256, U256)) {
		let give_chain = order.give.chain_id;
		let threshold = self.effective_batch_size(give_chain);

		let mut state = self.state.lock().await;
		if state.completed.contains(&order_id) {
			return;
		}
		let queue = state.batches.entry(give_chain).or_default();
		if queue.iter().any(|entry| entry.order_id == order_id) {
			return;
		}
		queue.push_back(BatchEntry {
			order_id,
			order,
			rewards,
		});
		tracing::info!(
			order_id = %truncate_id(&order_id.to_string()),
			give_chain = %give_chain,
			take_chain = %self.take_chain,
			batch = queue.len(),
			batch_size = threshold,
			"Order queued for unlock"
		);

		self.flush(give_chain, &mut state, threshold).await;
	}

	/// Submits an immediate single-order unlock, bypassing batch state.
	/// Used by the strict policy.
	pub async fn unlock_immediately(
		&self,
		order_id: OrderId,
		order: Order,
		rewards: (U256, U256),
	) -> Result<TxHash, ChainError> {
		let give_chain = order.give.chain_id;
		let entry = BatchEntry {
			order_id,
			order,
			rewards,
		};
		let hash = self.submit(give_chain, std::slice::from_ref(&entry)).await?;
		self.state.lock().await.completed.insert(order_id);
		Ok(hash)
	}

	/// Solana does not batch: a single order flushes immediately when either
	/// side of the flow is Solana.
	fn effective_batch_size(&self, give_chain: ChainId) -> usize {
		if give_chain.is_solana() || self.take_chain.is_solana() {
			1
		} else {
			self.batch_size
		}
	}

	async fn flush(&self, give_chain: ChainId, state: &mut UnlockerState, threshold: usize) {
		loop {
			let queue = state.batches.entry(give_chain).or_default();
			if queue.len() < threshold {
				return;
			}
			let batch: Vec<BatchEntry> = queue.drain(..threshold).collect();

			match self.submit(give_chain, &batch).await {
				Ok(tx_hash) => {
					let order_ids: Vec<OrderId> =
						batch.iter().map(|entry| entry.order_id).collect();
					tracing::info!(
						give_chain = %give_chain,
						take_chain = %self.take_chain,
						orders = order_ids.len(),
						tx_hash = %tx_hash,
						"Unlock batch submitted"
					);
					state.completed.extend(order_ids.iter().copied());
					self.hooks.publish(HookEvent::OrderUnlockSent {
						order_ids,
						give_chain,
						take_chain: self.take_chain,
					});
				}
				Err(e) => {
					tracing::warn!(
						give_chain = %give_chain,
						take_chain = %self.take_chain,
						error = %e,
						"Unlock submission failed, batch retained"
					);
					let queue = state.batches.entry(give_chain).or_default();
					for entry in batch.into_iter().rev() {
						queue.push_front(entry);
					}
					return;
				}
			}
		}
	}

	async fn submit(
		&self,
		give_chain: ChainId,
		entries: &[BatchEntry],
	) -> Result<TxHash, ChainError> {
		let dst = self
			.chains
			.get(&self.take_chain)
			.ok_or(ChainError::ChainNotConfigured(self.take_chain))?;
		let src = self
			.chains
			.get(&give_chain)
			.ok_or(ChainError::ChainNotConfigured(give_chain))?;

		let execution_fee = dst
			.client
			.get_amount_to_send(self.take_chain, give_chain)
			.await?;
		let rewards = if give_chain.is_solana() {
			entries
				.first()
				.map(|entry| entry.rewards)
				.unwrap_or((U256::ZERO, U256::ZERO))
		} else {
			(U256::ZERO, U256::ZERO)
		};
		let payload = if self.take_chain.is_solana() {
			UnlockPayload::Solana {
				wallet: dst.adapter.address(),
			}
		} else {
			UnlockPayload::Evm {
				unlock_authority: dst.unlock_authority.clone(),
			}
		};

		let orders: Vec<(OrderId, Order)> = entries
			.iter()
			.map(|entry| (entry.order_id, entry.order.clone()))
			.collect();
		let tx = dst
			.client
			.send_unlock_order(&orders, &src.beneficiary, execution_fee, rewards, &payload)
			.await?;
		dst.adapter.send_transaction(&tx).await
	}

	/// Number of orders waiting in the batch of one source chain.
	pub async fn pending(&self, give_chain: ChainId) -> usize {
		self.state
			.lock()
			.await
			.batches
			.get(&give_chain)
			.map(|queue| queue.len())
			.unwrap_or(0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use taker_chain::MockChain;
	use taker_types::{Address, OrderOffer};

	const ARBITRUM: ChainId = ChainId(42161);
	const POLYGON: ChainId = ChainId(137);

	fn sample_order(nonce: u64) -> Order {
		Order {
			maker_order_nonce: nonce,
			maker_src: Address(vec![1; 20]),
			give: OrderOffer {
				chain_id: ARBITRUM,
				token_address: Address(vec![2; 20]),
				amount: U256::from(100u64),
			},
			take: OrderOffer {
				chain_id: POLYGON,
				token_address: Address(vec![3; 20]),
				amount: U256::from(99u64),
			},
			receiver_dst: Address(vec![4; 20]),
			give_patch_authority_src: Address(vec![5; 20]),
			order_authority_address_dst: Address(vec![6; 20]),
			allowed_taker_dst: None,
			allowed_cancel_beneficiary_src: None,
		}
	}

	fn registry(
		src: &Arc<MockChain>,
		dst: &Arc<MockChain>,
	) -> (Arc<ChainRegistry>, Address) {
		let beneficiary = Address(vec![0xBE; 20]);
		let mut chains = ChainRegistry::new();
		chains.insert(
			ARBITRUM,
			src.handle(beneficiary.clone(), Address(vec![0xE1; 20])),
		);
		chains.insert(
			POLYGON,
			dst.handle(Address(vec![0xBF; 20]), Address(vec![0xE2; 20])),
		);
		(Arc::new(chains), beneficiary)
	}

	#[tokio::test]
	async fn test_batch_flushes_at_size_in_insertion_order() {
		let src = MockChain::new(ARBITRUM);
		let dst = MockChain::new(POLYGON);
		dst.set_amount_to_send(U256::from(7u64));
		let (chains, beneficiary) = registry(&src, &dst);
		let unlocker = BatchUnlocker::new(POLYGON, 3, chains, Hooks::none());

		let orders: Vec<Order> = (1..=3).map(sample_order).collect();
		let ids: Vec<OrderId> = orders.iter().map(|o| o.compute_id()).collect();

		for order in &orders[..2] {
			unlocker
				.unlock_order(order.compute_id(), order.clone(), (U256::ZERO, U256::ZERO))
				.await;
		}
		assert!(dst.sent_unlocks().is_empty());
		assert_eq!(unlocker.pending(ARBITRUM).await, 2);

		unlocker
			.unlock_order(ids[2], orders[2].clone(), (U256::ZERO, U256::ZERO))
			.await;
		let unlocks = dst.sent_unlocks();
		assert_eq!(unlocks.len(), 1);
		assert_eq!(unlocks[0].order_ids, ids);
		assert_eq!(unlocks[0].beneficiary, beneficiary);
		assert_eq!(unlocks[0].execution_fee, U256::from(7u64));
		assert_eq!(unlocker.pending(ARBITRUM).await, 0);
	}

	#[tokio::test]
	async fn test_failed_submission_retains_batch_in_order() {
		let src = MockChain::new(ARBITRUM);
		let dst = MockChain::new(POLYGON);
		dst.fail_next_sends(1);
		let (chains, _) = registry(&src, &dst);
		let unlocker = BatchUnlocker::new(POLYGON, 2, chains, Hooks::none());

		let orders: Vec<Order> = (1..=3).map(sample_order).collect();
		for order in &orders[..2] {
			unlocker
				.unlock_order(order.compute_id(), order.clone(), (U256::ZERO, U256::ZERO))
				.await;
		}
		// The flush attempt failed; both entries stay queued.
		assert!(dst.sent_unlocks().is_empty());
		assert_eq!(unlocker.pending(ARBITRUM).await, 2);

		// The next hand-off retries and drains the first two in order.
		unlocker
			.unlock_order(
				orders[2].compute_id(),
				orders[2].clone(),
				(U256::ZERO, U256::ZERO),
			)
			.await;
		let unlocks = dst.sent_unlocks();
		assert_eq!(unlocks.len(), 1);
		assert_eq!(
			unlocks[0].order_ids,
			vec![orders[0].compute_id(), orders[1].compute_id()]
		);
		assert_eq!(unlocker.pending(ARBITRUM).await, 1);
	}

	#[tokio::test]
	async fn test_duplicate_hand_off_is_ignored() {
		let src = MockChain::new(ARBITRUM);
		let dst = MockChain::new(POLYGON);
		let (chains, _) = registry(&src, &dst);
		let unlocker = BatchUnlocker::new(POLYGON, 10, chains, Hooks::none());

		let order = sample_order(1);
		let id = order.compute_id();
		unlocker
			.unlock_order(id, order.clone(), (U256::ZERO, U256::ZERO))
			.await;
		unlocker
			.unlock_order(id, order, (U256::ZERO, U256::ZERO))
			.await;
		assert_eq!(unlocker.pending(ARBITRUM).await, 1);
	}

	#[tokio::test]
	async fn test_immediate_unlock_bypasses_batching() {
		let src = MockChain::new(ARBITRUM);
		let dst = MockChain::new(POLYGON);
		let (chains, _) = registry(&src, &dst);
		let unlocker = BatchUnlocker::new(POLYGON, 10, chains, Hooks::none());

		let order = sample_order(1);
		let id = order.compute_id();
		unlocker
			.unlock_immediately(id, order.clone(), (U256::ZERO, U256::ZERO))
			.await
			.unwrap();
		assert_eq!(dst.sent_unlocks().len(), 1);
		assert_eq!(unlocker.pending(ARBITRUM).await, 0);

		// A later feed replay of the same order is ignored.
		unlocker
			.unlock_order(id, order, (U256::ZERO, U256::ZERO))
			.await;
		assert_eq!(unlocker.pending(ARBITRUM).await, 0);
	}
}
