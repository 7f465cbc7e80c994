//! Per-destination-chain order processor.
//!
//! One processor task owns all order state for its destination chain: the
//! primary and secondary queues, the pending event contexts, the in-flight
//! marker and the mempool. At most one order is under active processing per
//! destination chain at any time; everything else waits in the queues. Live
//! `Created` orders drain before `ArchivalCreated` replays, FIFO within each
//! queue.

use crate::estimator::{estimate_fulfill, EstimatorContext};
use crate::mempool::Mempool;
use crate::unlocker::BatchUnlocker;
use crate::ProcessOrderError;
use alloy_primitives::U256;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use taker_chain::{
	ChainError, ChainHandle, ChainRegistry, FulfillPayload, GiveOrderStatus, TakeOrderStatus,
};
use taker_config::UniversalParams;
use taker_price::PriceServiceInterface;
use taker_types::{
	truncate_id, Address, ChainId, HookEvent, Hooks, Order, OrderEvent, OrderEventKind, OrderId,
	TokensBucket,
};
use tokio::sync::mpsc;

/// Interval between take-side status polls after a fulfill submission.
const FULFILL_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Number of status polls before the fulfillment counts as not observed.
const FULFILL_POLL_ATTEMPTS: u32 = 10;

/// Processing policy of one destination chain.
pub enum Policy {
	/// Profitability-gated policy with mempool retries and batched unlocks.
	Universal(UniversalParams),
	/// Approved-token policy: no profitability gate, no mempool, immediate
	/// unbatched unlock after fulfill.
	Strict { approved_take_tokens: Vec<Address> },
}

/// Shared services a processor draws on. Queues and mempool stay private to
/// the processor task; these are the read-mostly collaborators.
pub struct ProcessorDeps {
	/// Destination chain this processor serves.
	pub chain_id: ChainId,
	/// Handles of every configured chain.
	pub chains: Arc<ChainRegistry>,
	/// Shared price source.
	pub price: Arc<dyn PriceServiceInterface>,
	/// Reserve token buckets.
	pub buckets: Arc<Vec<TokensBucket>>,
	/// Hook sink handle.
	pub hooks: Hooks,
	/// Processing policy.
	pub policy: Policy,
}

/// Handle for submitting events to a processor. Submission never waits for
/// processing; events queue on an unbounded channel.
#[derive(Clone)]
pub struct ProcessorHandle {
	chain_id: ChainId,
	tx: mpsc::UnboundedSender<OrderEvent>,
	mempool: Option<Mempool>,
}

impl ProcessorHandle {
	/// Submits one event. A closed processor logs and drops the event.
	pub fn process(&self, event: OrderEvent) {
		if self.tx.send(event).is_err() {
			tracing::error!(chain_id = %self.chain_id, "Processor task is gone, dropping event");
		}
	}

	/// Destination chain this handle belongs to.
	pub fn chain_id(&self) -> ChainId {
		self.chain_id
	}

	/// Number of orders parked in the mempool; zero under the strict policy.
	pub fn mempool_len(&self) -> usize {
		self.mempool.as_ref().map(Mempool::len).unwrap_or(0)
	}
}

/// Insertion-ordered set of order ids.
#[derive(Default)]
struct OrderQueue {
	order: VecDeque<OrderId>,
	members: HashSet<OrderId>,
}

impl OrderQueue {
	/// Inserts an id; duplicates are a no-op.
	fn insert(&mut self, id: OrderId) {
		if self.members.insert(id) {
			self.order.push_back(id);
		}
	}

	fn remove(&mut self, id: &OrderId) {
		if self.members.remove(id) {
			self.order.retain(|member| member != id);
		}
	}

	fn pop_front(&mut self) -> Option<OrderId> {
		let id = self.order.pop_front()?;
		self.members.remove(&id);
		Some(id)
	}
}

struct Completion {
	event: OrderEvent,
	result: Result<(), ProcessOrderError>,
}

/// The per-destination-chain processor.
pub struct OrderProcessor;

impl OrderProcessor {
	/// Spawns the processor task for one destination chain and returns its
	/// submission handle. The task lives as long as a sender (handle or
	/// mempool timer) exists.
	pub fn spawn(deps: ProcessorDeps, unlocker: Arc<BatchUnlocker>) -> ProcessorHandle {
		let (event_tx, event_rx) = mpsc::unbounded_channel();
		let (done_tx, done_rx) = mpsc::unbounded_channel();

		let mempool = match &deps.policy {
			Policy::Universal(params) => Some(Mempool::spawn(
				deps.chain_id,
				Duration::from_secs(params.mempool_interval_secs),
				params.mempool_max_size,
				event_tx.clone(),
			)),
			Policy::Strict { .. } => None,
		};

		let handle = ProcessorHandle {
			chain_id: deps.chain_id,
			tx: event_tx,
			mempool: mempool.clone(),
		};

		let task = ProcessorTask {
			deps: Arc::new(deps),
			unlocker,
			mempool,
			primary: OrderQueue::default(),
			secondary: OrderQueue::default(),
			pending_context: HashMap::new(),
			in_flight: None,
			done_tx,
		};
		tokio::spawn(task.run(event_rx, done_rx));

		handle
	}
}

struct ProcessorTask {
	deps: Arc<ProcessorDeps>,
	unlocker: Arc<BatchUnlocker>,
	mempool: Option<Mempool>,
	primary: OrderQueue,
	secondary: OrderQueue,
	pending_context: HashMap<OrderId, OrderEvent>,
	in_flight: Option<OrderId>,
	done_tx: mpsc::UnboundedSender<Completion>,
}

impl ProcessorTask {
	async fn run(
		mut self,
		mut event_rx: mpsc::UnboundedReceiver<OrderEvent>,
		mut done_rx: mpsc::UnboundedReceiver<Completion>,
	) {
		tracing::info!(chain_id = %self.deps.chain_id, "Order processor started");
		loop {
			tokio::select! {
				Some(completion) = done_rx.recv() => self.on_completion(completion),
				maybe_event = event_rx.recv() => match maybe_event {
					Some(event) => self.on_event(event),
					None => break,
				},
			}
		}
		tracing::info!(chain_id = %self.deps.chain_id, "Order processor stopped");
	}

	fn on_event(&mut self, event: OrderEvent) {
		let order_id = event.order_id;
		match event.kind {
			OrderEventKind::Created | OrderEventKind::ArchivalCreated => {
				if event.order.is_none() {
					tracing::warn!(
						order_id = %truncate_id(&order_id.to_string()),
						"Creation event without order payload, ignoring"
					);
					return;
				}
				if self.in_flight.is_some() {
					match event.kind {
						OrderEventKind::Created => self.primary.insert(order_id),
						_ => self.secondary.insert(order_id),
					}
					self.pending_context.insert(order_id, event);
				} else {
					self.start_processing(event);
				}
			}
			OrderEventKind::Fulfilled => {
				self.forget(&order_id);
				self.hand_to_unlocker(event);
			}
			OrderEventKind::ArchivalFulfilled => self.hand_to_unlocker(event),
			OrderEventKind::Cancelled => {
				tracing::info!(
					order_id = %truncate_id(&order_id.to_string()),
					"Order cancelled, forgetting"
				);
				self.forget(&order_id);
			}
			OrderEventKind::Other(ref status) => {
				tracing::debug!(
					order_id = %truncate_id(&order_id.to_string()),
					status = %status,
					"Ignoring feed status"
				);
			}
		}
	}

	/// Removes an order from every queue and the mempool. An in-flight
	/// fulfillment for the same id is not aborted; the next on-chain status
	/// consultation resolves it.
	fn forget(&mut self, order_id: &OrderId) {
		self.primary.remove(order_id);
		self.secondary.remove(order_id);
		self.pending_context.remove(order_id);
		if let Some(mempool) = &self.mempool {
			mempool.delete(order_id);
		}
	}

	/// Forwards an already-fulfilled order to the batch unlocker on a
	/// detached task; the unlocker may perform chain calls when flushing.
	fn hand_to_unlocker(&self, event: OrderEvent) {
		let Some(order) = event.order else {
			tracing::warn!(
				order_id = %truncate_id(&event.order_id.to_string()),
				"Fulfilled event without order payload, cannot unlock"
			);
			return;
		};
		let unlocker = Arc::clone(&self.unlocker);
		tokio::spawn(async move {
			unlocker
				.unlock_order(event.order_id, order, (U256::ZERO, U256::ZERO))
				.await;
		});
	}

	fn start_processing(&mut self, event: OrderEvent) {
		let Some(order) = event.order.clone() else {
			return;
		};
		let order_id = event.order_id;
		self.in_flight = Some(order_id);
		tracing::info!(
			order_id = %truncate_id(&order_id.to_string()),
			chain_id = %self.deps.chain_id,
			"Processing order"
		);

		let deps = Arc::clone(&self.deps);
		let unlocker = Arc::clone(&self.unlocker);
		let done_tx = self.done_tx.clone();
		tokio::spawn(async move {
			let result = process_order(&deps, &unlocker, &order, order_id).await;
			// The task owns the receiver; a send only fails at shutdown.
			let _ = done_tx.send(Completion { event, result });
		});
	}

	fn on_completion(&mut self, completion: Completion) {
		let order_id = completion.event.order_id;
		if self.in_flight != Some(order_id) {
			tracing::warn!(
				order_id = %truncate_id(&order_id.to_string()),
				"Completion for an order that is not in flight"
			);
		}
		self.in_flight = None;

		let id_display = truncate_id(&order_id.to_string());
		match completion.result {
			Ok(()) => {
				if let Some(mempool) = &self.mempool {
					mempool.delete(&order_id);
				}
			}
			Err(error) if error.is_retryable() => match &self.mempool {
				Some(mempool) => {
					tracing::info!(order_id = %id_display, reason = %error, "Deferring order to mempool");
					self.deps.hooks.publish(HookEvent::OrderPostponed {
						order_id,
						take_chain: self.deps.chain_id,
						reason: error.to_string(),
					});
					mempool.add_order(completion.event);
				}
				None => {
					tracing::info!(order_id = %id_display, reason = %error, "Dropping order");
					self.deps.hooks.publish(HookEvent::OrderRejected {
						order_id,
						take_chain: self.deps.chain_id,
						reason: error.to_string(),
					});
				}
			},
			Err(error) => {
				tracing::info!(order_id = %id_display, reason = %error, "Dropping order");
				if let Some(mempool) = &self.mempool {
					mempool.delete(&order_id);
				}
				self.deps.hooks.publish(HookEvent::OrderRejected {
					order_id,
					take_chain: self.deps.chain_id,
					reason: error.to_string(),
				});
			}
		}

		self.pick_next();
	}

	/// Primary drains before secondary, FIFO within each queue.
	fn pick_next(&mut self) {
		while self.in_flight.is_none() {
			let Some(next) = self
				.primary
				.pop_front()
				.or_else(|| self.secondary.pop_front())
			else {
				break;
			};
			match self.pending_context.remove(&next) {
				Some(event) => self.start_processing(event),
				None => {
					tracing::warn!(
						order_id = %truncate_id(&next.to_string()),
						"Queued order has no pending context, skipping"
					);
				}
			}
		}
	}
}

async fn process_order(
	deps: &ProcessorDeps,
	unlocker: &BatchUnlocker,
	order: &Order,
	order_id: OrderId,
) -> Result<(), ProcessOrderError> {
	match &deps.policy {
		Policy::Universal(params) => {
			process_universal(deps, unlocker, order, order_id, params).await
		}
		Policy::Strict {
			approved_take_tokens,
		} => process_strict(deps, unlocker, order, order_id, approved_take_tokens).await,
	}
}

async fn process_universal(
	deps: &ProcessorDeps,
	unlocker: &BatchUnlocker,
	order: &Order,
	order_id: OrderId,
	params: &UniversalParams,
) -> Result<(), ProcessOrderError> {
	let give_chain = order.give.chain_id;
	let take_chain = order.take.chain_id;
	let dst = chain_handle(deps, take_chain)?;
	let src = chain_handle(deps, give_chain)?;

	// Reserve discovery: the first bucket spanning both chains decides the
	// reserve token on the destination side.
	let reserve_dst_token = deps
		.buckets
		.iter()
		.find(|bucket| bucket.covers(give_chain, take_chain))
		.and_then(|bucket| bucket.find_first_token(take_chain).cloned())
		.ok_or(ProcessOrderError::NoReserveCoverage {
			give_chain,
			take_chain,
		})?;

	check_order_state(dst, src, &order_id).await?;

	// Solana orders carry the whole unlock cost alone.
	let batch_size = if give_chain.is_solana() || take_chain.is_solana() {
		None
	} else {
		Some(params.batch_unlock_size)
	};
	let estimation = estimate_fulfill(
		order,
		&reserve_dst_token,
		params.min_profitability_bps,
		EstimatorContext {
			price: &deps.price,
			client: &dst.client,
			batch_size,
		},
	)
	.await?;

	if !estimation.is_profitable {
		return Err(ProcessOrderError::Unprofitable {
			profit_bps: estimation.profit_bps,
			required_bps: params.min_profitability_bps,
		});
	}

	let balance = dst.adapter.get_balance(&estimation.reserve_dst_token).await?;
	if balance < estimation.required_reserve_dst_amount {
		return Err(ProcessOrderError::InsufficientReserve {
			required: estimation.required_reserve_dst_amount,
			available: balance,
		});
	}

	let payload = fulfill_payload(dst);
	let tx = if estimation.reserve_dst_token == order.take.token_address {
		dst.client.fulfill_order(order, &order_id, &payload).await?
	} else {
		// The reserve amount already carries the slippage headroom, so the
		// builder's internal buffer is forced to zero.
		dst.client
			.preswap_and_fulfill_order(
				order,
				&order_id,
				&estimation.reserve_dst_token,
				estimation.reserve_to_take_slippage_bps,
				0,
				&payload,
			)
			.await?
	};
	let tx_hash = dst
		.adapter
		.send_transaction(&tx)
		.await
		.map_err(ProcessOrderError::FulfillSendFailed)?;
	tracing::info!(
		order_id = %truncate_id(&order_id.to_string()),
		tx_hash = %tx_hash,
		profit_bps = estimation.profit_bps,
		"Fulfill submitted"
	);

	await_fulfillment(dst, &order_id).await?;
	deps.hooks.publish(HookEvent::OrderFulfilled {
		order_id,
		take_chain,
	});

	unlocker
		.unlock_order(order_id, order.clone(), estimation.unlock_rewards)
		.await;
	Ok(())
}

async fn process_strict(
	deps: &ProcessorDeps,
	unlocker: &BatchUnlocker,
	order: &Order,
	order_id: OrderId,
	approved_take_tokens: &[Address],
) -> Result<(), ProcessOrderError> {
	let take_chain = order.take.chain_id;
	let dst = chain_handle(deps, take_chain)?;
	let src = chain_handle(deps, order.give.chain_id)?;

	if !approved_take_tokens
		.iter()
		.any(|token| *token == order.take.token_address)
	{
		return Err(ProcessOrderError::TakeTokenNotApproved);
	}

	check_order_state(dst, src, &order_id).await?;

	let payload = fulfill_payload(dst);
	let tx = dst.client.fulfill_order(order, &order_id, &payload).await?;
	let tx_hash = dst
		.adapter
		.send_transaction(&tx)
		.await
		.map_err(ProcessOrderError::FulfillSendFailed)?;
	tracing::info!(
		order_id = %truncate_id(&order_id.to_string()),
		tx_hash = %tx_hash,
		"Fulfill submitted (strict)"
	);

	await_fulfillment(dst, &order_id).await?;
	deps.hooks.publish(HookEvent::OrderFulfilled {
		order_id,
		take_chain,
	});

	// Strict trades the batching margin for determinism; a failed unlock
	// leaves the fulfillment standing and needs operator attention.
	if let Err(error) = unlocker
		.unlock_immediately(order_id, order.clone(), (U256::ZERO, U256::ZERO))
		.await
	{
		tracing::error!(
			order_id = %truncate_id(&order_id.to_string()),
			error = %error,
			"Immediate unlock failed, manual unlock required"
		);
	}
	Ok(())
}

fn chain_handle(deps: &ProcessorDeps, chain_id: ChainId) -> Result<&ChainHandle, ChainError> {
	deps.chains
		.get(&chain_id)
		.ok_or(ChainError::ChainNotConfigured(chain_id))
}

/// Take side must be untouched and the give side live, otherwise the order
/// is not (or no longer) ours to fulfill.
async fn check_order_state(
	dst: &ChainHandle,
	src: &ChainHandle,
	order_id: &OrderId,
) -> Result<(), ProcessOrderError> {
	match dst.client.get_take_order_status(order_id).await? {
		TakeOrderStatus::NotSet | TakeOrderStatus::Unknown => {}
		status => return Err(ProcessOrderError::AlreadyFulfilled(status)),
	}
	match src.client.get_give_order_status(order_id).await? {
		GiveOrderStatus::Created => {}
		status => return Err(ProcessOrderError::NotCreatedOnSource(status)),
	}
	Ok(())
}

fn fulfill_payload(dst: &ChainHandle) -> FulfillPayload {
	if dst.chain_id.is_solana() {
		FulfillPayload::Solana {
			taker_wallet: dst.adapter.address(),
		}
	} else {
		FulfillPayload::Evm {
			unlock_authority: dst.unlock_authority.clone(),
		}
	}
}

/// Polls the take side until the fulfillment is visible or the bound is hit.
async fn await_fulfillment(dst: &ChainHandle, order_id: &OrderId) -> Result<(), ProcessOrderError> {
	for attempt in 1..=FULFILL_POLL_ATTEMPTS {
		match dst.client.get_take_order_status(order_id).await {
			Ok(TakeOrderStatus::Fulfilled) => return Ok(()),
			Ok(status) => {
				tracing::debug!(?status, attempt, "Fulfillment not visible yet");
			}
			Err(error) => {
				tracing::debug!(%error, attempt, "Status poll failed");
			}
		}
		tokio::time::sleep(FULFILL_POLL_INTERVAL).await;
	}
	Err(ProcessOrderError::FulfillmentNotObserved(
		FULFILL_POLL_ATTEMPTS,
	))
}

#[cfg(test)]
mod tests {
	use super::*;
	use taker_chain::MockChain;
	use taker_price::{MockPriceService, TokenPrice};
	use taker_types::OrderOffer;

	const ARBITRUM: ChainId = ChainId(42161);
	const POLYGON: ChainId = ChainId(137);

	fn usdc_src() -> Address {
		Address(vec![0xA1; 20])
	}

	fn usdc_dst() -> Address {
		Address(vec![0xB1; 20])
	}

	fn params(batch_unlock_size: usize) -> UniversalParams {
		UniversalParams {
			min_profitability_bps: 4,
			mempool_interval_secs: 60,
			batch_unlock_size,
			mempool_max_size: 100,
		}
	}

	struct Harness {
		src: Arc<MockChain>,
		dst: Arc<MockChain>,
		prices: Arc<MockPriceService>,
		unlocker: Arc<BatchUnlocker>,
		handle: ProcessorHandle,
	}

	fn setup(policy: Policy, batch_unlock_size: usize) -> Harness {
		let src = MockChain::new(ARBITRUM);
		let dst = MockChain::new(POLYGON);
		dst.set_balance(usdc_dst(), U256::from(1_000_000_000u64));

		let mut chains = ChainRegistry::new();
		chains.insert(
			ARBITRUM,
			src.handle(Address(vec![0xBE; 20]), Address(vec![0xE1; 20])),
		);
		chains.insert(
			POLYGON,
			dst.handle(Address(vec![0xBF; 20]), Address(vec![0xE2; 20])),
		);
		let chains = Arc::new(chains);

		let prices = Arc::new(MockPriceService::with_fallback(TokenPrice {
			usd: 1.0,
			decimals: 6,
		}));
		let buckets = Arc::new(vec![TokensBucket::new([
			(ARBITRUM, vec![usdc_src()]),
			(POLYGON, vec![usdc_dst()]),
		])]);
		let unlocker = Arc::new(BatchUnlocker::new(
			POLYGON,
			batch_unlock_size,
			Arc::clone(&chains),
			Hooks::none(),
		));

		let deps = ProcessorDeps {
			chain_id: POLYGON,
			chains,
			price: Arc::clone(&prices) as Arc<dyn PriceServiceInterface>,
			buckets,
			hooks: Hooks::none(),
			policy,
		};
		let handle = OrderProcessor::spawn(deps, Arc::clone(&unlocker));

		Harness {
			src,
			dst,
			prices,
			unlocker,
			handle,
		}
	}

	/// give 100 USDC on Arbitrum, take 99.5 USDC on Polygon: 50 bps margin.
	fn order(nonce: u64) -> Order {
		Order {
			maker_order_nonce: nonce,
			maker_src: Address(vec![1; 20]),
			give: OrderOffer {
				chain_id: ARBITRUM,
				token_address: usdc_src(),
				amount: U256::from(100_000_000u64),
			},
			take: OrderOffer {
				chain_id: POLYGON,
				token_address: usdc_dst(),
				amount: U256::from(99_500_000u64),
			},
			receiver_dst: Address(vec![4; 20]),
			give_patch_authority_src: Address(vec![5; 20]),
			order_authority_address_dst: Address(vec![6; 20]),
			allowed_taker_dst: None,
			allowed_cancel_beneficiary_src: None,
		}
	}

	async fn eventually(mut condition: impl FnMut() -> bool) {
		for _ in 0..1000 {
			if condition() {
				return;
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
		panic!("condition not met in time");
	}

	/// Lets in-progress tasks settle without asserting anything.
	async fn settle() {
		for _ in 0..20 {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	}

	#[tokio::test]
	async fn test_happy_path_fulfills_and_queues_unlock() {
		let harness = setup(Policy::Universal(params(10)), 10);
		let order = order(1);
		let id = order.compute_id();

		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::Created, order));
		eventually(|| harness.dst.sent_fulfills().len() == 1).await;

		assert_eq!(harness.dst.sent_fulfills(), vec![id]);
		// Reserve token equals the take token: no pre-swap.
		assert!(!harness.dst.fulfill_record(&id).unwrap().preswapped);
		// One entry queued for unlock, batch not full, no unlock sent.
		eventually(|| harness.dst.sent_unlocks().is_empty()).await;
		assert_eq!(harness.unlocker.pending(ARBITRUM).await, 1);
		assert_eq!(harness.handle.mempool_len(), 0);
	}

	#[tokio::test]
	async fn test_batch_flush_carries_ten_orders_in_arrival_order() {
		let harness = setup(Policy::Universal(params(10)), 10);
		let orders: Vec<Order> = (1..=10).map(order).collect();
		let ids: Vec<OrderId> = orders.iter().map(|o| o.compute_id()).collect();

		for order in orders {
			harness
				.handle
				.process(OrderEvent::new(OrderEventKind::Created, order));
		}
		eventually(|| harness.dst.sent_fulfills().len() == 10).await;
		eventually(|| harness.dst.sent_unlocks().len() == 1).await;

		let unlocks = harness.dst.sent_unlocks();
		assert_eq!(unlocks[0].order_ids, ids);
		assert_eq!(harness.unlocker.pending(ARBITRUM).await, 0);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_processing_is_serial_per_destination() {
		let harness = setup(Policy::Universal(params(10)), 10);
		for nonce in 1..=12 {
			harness
				.handle
				.process(OrderEvent::new(OrderEventKind::Created, order(nonce)));
		}
		eventually(|| harness.dst.sent_fulfills().len() == 12).await;
		assert_eq!(harness.dst.max_concurrent_processing(), 1);
	}

	#[tokio::test]
	async fn test_primary_drains_before_secondary() {
		let harness = setup(Policy::Universal(params(10)), 10);
		let gate = harness.dst.enable_gate();

		let blocker = order(1);
		let blocker_id = blocker.compute_id();
		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::Created, blocker));
		settle().await;

		// While busy: C1, A1, C2, A2.
		let c1 = order(2);
		let a1 = order(3);
		let c2 = order(4);
		let a2 = order(5);
		let expected = vec![
			blocker_id,
			c1.compute_id(),
			c2.compute_id(),
			a1.compute_id(),
			a2.compute_id(),
		];
		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::Created, c1));
		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::ArchivalCreated, a1));
		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::Created, c2));
		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::ArchivalCreated, a2));
		settle().await;
		assert!(harness.dst.sent_fulfills().is_empty());

		gate.add_permits(1_000_000);
		eventually(|| harness.dst.sent_fulfills().len() == 5).await;
		assert_eq!(harness.dst.sent_fulfills(), expected);
	}

	#[tokio::test]
	async fn test_duplicate_enqueue_processes_once() {
		let harness = setup(Policy::Universal(params(10)), 10);
		let gate = harness.dst.enable_gate();

		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::Created, order(1)));
		settle().await;

		let duplicate = order(2);
		let duplicate_id = duplicate.compute_id();
		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::Created, duplicate.clone()));
		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::Created, duplicate));

		gate.add_permits(1_000_000);
		eventually(|| harness.dst.sent_fulfills().len() == 2).await;
		settle().await;

		let fulfills = harness.dst.sent_fulfills();
		assert_eq!(fulfills.len(), 2);
		assert_eq!(
			fulfills.iter().filter(|id| **id == duplicate_id).count(),
			1
		);
	}

	#[tokio::test(start_paused = true)]
	async fn test_unprofitable_order_deferred_then_fulfilled() {
		let harness = setup(Policy::Universal(params(10)), 10);
		// Give side worth 99.52 USD against a 99.5 USD take: about 2 bps.
		harness.prices.set_price(
			ARBITRUM,
			usdc_src(),
			TokenPrice {
				usd: 0.9952,
				decimals: 6,
			},
		);

		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::Created, order(1)));
		eventually(|| harness.handle.mempool_len() == 1).await;
		assert!(harness.dst.sent_fulfills().is_empty());

		// Price recovers: 50 bps clears the 4 bps margin on the next sweep.
		harness.prices.set_price(
			ARBITRUM,
			usdc_src(),
			TokenPrice {
				usd: 1.0,
				decimals: 6,
			},
		);
		tokio::time::advance(Duration::from_secs(61)).await;
		eventually(|| harness.dst.sent_fulfills().len() == 1).await;
		eventually(|| harness.handle.mempool_len() == 0).await;
	}

	#[tokio::test(start_paused = true)]
	async fn test_insufficient_reserve_deferred_until_funded() {
		let harness = setup(Policy::Universal(params(10)), 10);
		harness.dst.set_balance(usdc_dst(), U256::from(1_000u64));

		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::Created, order(1)));
		eventually(|| harness.handle.mempool_len() == 1).await;
		assert!(harness.dst.sent_fulfills().is_empty());

		harness
			.dst
			.set_balance(usdc_dst(), U256::from(1_000_000_000u64));
		tokio::time::advance(Duration::from_secs(61)).await;
		eventually(|| harness.dst.sent_fulfills().len() == 1).await;
	}

	#[tokio::test(start_paused = true)]
	async fn test_send_failure_deferred_and_retried() {
		let harness = setup(Policy::Universal(params(10)), 10);
		harness.dst.fail_next_sends(1);

		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::Created, order(1)));
		eventually(|| harness.handle.mempool_len() == 1).await;

		tokio::time::advance(Duration::from_secs(61)).await;
		eventually(|| harness.dst.sent_fulfills().len() == 1).await;
	}

	#[tokio::test]
	async fn test_already_fulfilled_is_dropped() {
		let harness = setup(Policy::Universal(params(10)), 10);
		let order = order(1);
		let id = order.compute_id();
		harness.dst.set_take_status(id, TakeOrderStatus::Fulfilled);

		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::Created, order));
		settle().await;

		assert!(harness.dst.sent_fulfills().is_empty());
		assert_eq!(harness.handle.mempool_len(), 0);
		assert_eq!(harness.unlocker.pending(ARBITRUM).await, 0);
	}

	#[tokio::test]
	async fn test_not_created_on_source_is_dropped() {
		let harness = setup(Policy::Universal(params(10)), 10);
		let order = order(1);
		harness
			.src
			.set_give_status(order.compute_id(), GiveOrderStatus::Cancelled);

		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::Created, order));
		settle().await;

		assert!(harness.dst.sent_fulfills().is_empty());
		assert_eq!(harness.handle.mempool_len(), 0);
	}

	#[tokio::test]
	async fn test_cancelled_while_queued_is_forgotten() {
		let harness = setup(Policy::Universal(params(10)), 10);
		let gate = harness.dst.enable_gate();

		let blocker = order(1);
		let blocker_id = blocker.compute_id();
		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::Created, blocker));
		settle().await;

		let cancelled = order(2);
		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::Created, cancelled.clone()));
		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::Cancelled, cancelled));

		gate.add_permits(1_000_000);
		eventually(|| harness.dst.sent_fulfills().len() == 1).await;
		settle().await;
		assert_eq!(harness.dst.sent_fulfills(), vec![blocker_id]);
	}

	#[tokio::test]
	async fn test_fulfilled_event_forwards_to_unlocker() {
		let harness = setup(Policy::Universal(params(10)), 10);
		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::Fulfilled, order(1)));

		eventually2(&harness, 1).await;
		assert!(harness.dst.sent_fulfills().is_empty());
	}

	/// Async condition helper for unlocker state.
	async fn eventually2(harness: &Harness, pending: usize) {
		for _ in 0..1000 {
			if harness.unlocker.pending(ARBITRUM).await == pending {
				return;
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
		panic!("unlocker pending count not reached");
	}

	#[tokio::test(start_paused = true)]
	async fn test_unobserved_fulfillment_is_dropped() {
		let harness = setup(Policy::Universal(params(10)), 10);
		harness.dst.set_auto_fulfill(false);

		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::Created, order(1)));
		eventually(|| harness.dst.sent_fulfills().len() == 1).await;

		// All ten polls come up empty; the order is dropped, not deferred.
		// Step through the poll sleeps one at a time so each timer fires.
		for _ in 0..15 {
			tokio::time::advance(FULFILL_POLL_INTERVAL).await;
			settle().await;
		}
		assert_eq!(harness.unlocker.pending(ARBITRUM).await, 0);
		assert_eq!(harness.handle.mempool_len(), 0);
	}

	#[tokio::test]
	async fn test_strict_policy_fulfills_and_unlocks_immediately() {
		let harness = setup(
			Policy::Strict {
				approved_take_tokens: vec![usdc_dst()],
			},
			10,
		);
		let order = order(1);
		let id = order.compute_id();

		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::Created, order));
		eventually(|| harness.dst.sent_unlocks().len() == 1).await;

		assert_eq!(harness.dst.sent_fulfills(), vec![id]);
		assert_eq!(harness.dst.sent_unlocks()[0].order_ids, vec![id]);
		// Direct fulfill, nothing batched, no mempool.
		assert!(!harness.dst.fulfill_record(&id).unwrap().preswapped);
		assert_eq!(harness.unlocker.pending(ARBITRUM).await, 0);
		assert_eq!(harness.handle.mempool_len(), 0);
	}

	#[tokio::test]
	async fn test_strict_policy_rejects_unapproved_take_token() {
		let harness = setup(
			Policy::Strict {
				approved_take_tokens: vec![Address(vec![0x77; 20])],
			},
			10,
		);

		harness
			.handle
			.process(OrderEvent::new(OrderEventKind::Created, order(1)));
		settle().await;

		assert!(harness.dst.sent_fulfills().is_empty());
		assert!(harness.dst.sent_unlocks().is_empty());
	}
}
