//! Scriptable in-memory chain for testing and development.
//!
//! One `MockChain` implements both the adapter and the client seam for a
//! single chain. Order statuses, balances, costs and send failures are all
//! scriptable at runtime, and every submitted fulfill and unlock is recorded
//! for inspection. A semaphore gate can hold order processing open so tests
//! can observe queue behavior while the processor is busy.

use crate::{
	ChainAdapterInterface, ChainClientInterface, ChainError, ChainHandle, FlowCost, FulfillPayload,
	GiveOrderStatus, TakeOrderStatus, TransactionPayload, TransactionRequest, TxHash,
	UnlockPayload,
};
use alloy_primitives::U256;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taker_types::{Address, ChainId, Order, OrderId};
use tokio::sync::Semaphore;

const TAG_FULFILL: u8 = 0x01;
const TAG_UNLOCK: u8 = 0x02;

/// A recorded unlock submission.
#[derive(Debug, Clone)]
pub struct UnlockRecord {
	/// Order ids carried by the unlock, in batch insertion order.
	pub order_ids: Vec<OrderId>,
	/// Beneficiary the unlock targets on the source chain.
	pub beneficiary: Address,
	/// Execution fee attached to the relay.
	pub execution_fee: U256,
	/// Relay reward amounts passed by the caller.
	pub rewards: (U256, U256),
}

/// Parameters captured from a fulfill transaction build.
#[derive(Debug, Clone)]
pub struct FulfillRecord {
	/// True when the build went through the pre-swap path.
	pub preswapped: bool,
	/// Reserve token of the pre-swap, when any.
	pub reserve_token: Option<Address>,
	/// Slippage allowance passed by the caller.
	pub slippage_bps: u32,
	/// Internal buffer override passed by the caller.
	pub internal_buffer_bps: u32,
}

#[derive(Default)]
struct MockState {
	address: Address,
	balances: HashMap<Address, U256>,
	allowances: HashMap<(Address, Address), U256>,
	take_status: HashMap<OrderId, TakeOrderStatus>,
	give_status: HashMap<OrderId, GiveOrderStatus>,
	flow_cost: FlowCost,
	amount_to_send: U256,
	auto_fulfill: bool,
	fail_sends_remaining: usize,
	next_tx_nonce: u64,
	built_fulfills: HashMap<OrderId, FulfillRecord>,
	pending_unlocks: HashMap<Vec<u8>, UnlockRecord>,
	sent_fulfills: Vec<OrderId>,
	sent_unlocks: Vec<UnlockRecord>,
	approvals: Vec<(Address, Address)>,
	active_processing: usize,
	max_concurrent_processing: usize,
}

/// In-memory chain implementing both the adapter and the client seam.
pub struct MockChain {
	chain_id: ChainId,
	state: Mutex<MockState>,
	gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MockChain {
	/// Creates a mock chain. Orders default to give-side `Created` and
	/// take-side `NotSet`; submitted fulfills flip the take side to
	/// `Fulfilled` unless auto-fulfill is disabled.
	pub fn new(chain_id: ChainId) -> Arc<Self> {
		Arc::new(Self {
			chain_id,
			state: Mutex::new(MockState {
				address: Address(vec![0xAA; 20]),
				auto_fulfill: true,
				..MockState::default()
			}),
			gate: Mutex::new(None),
		})
	}

	/// Builds a `ChainHandle` backed by this mock.
	pub fn handle(self: &Arc<Self>, beneficiary: Address, unlock_authority: Address) -> ChainHandle {
		ChainHandle {
			chain_id: self.chain_id,
			adapter: Arc::clone(self) as Arc<dyn ChainAdapterInterface>,
			client: Arc::clone(self) as Arc<dyn ChainClientInterface>,
			beneficiary,
			unlock_authority,
		}
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
		self.state.lock().expect("mock chain state poisoned")
	}

	/// Scripts the operator balance of a token.
	pub fn set_balance(&self, token: Address, amount: U256) {
		self.lock().balances.insert(token, amount);
	}

	/// Scripts the take-side status of an order.
	pub fn set_take_status(&self, order_id: OrderId, status: TakeOrderStatus) {
		self.lock().take_status.insert(order_id, status);
	}

	/// Scripts the give-side status of an order.
	pub fn set_give_status(&self, order_id: OrderId, status: GiveOrderStatus) {
		self.lock().give_status.insert(order_id, status);
	}

	/// Scripts the taker flow cost answered for every order.
	pub fn set_flow_cost(&self, cost: FlowCost) {
		self.lock().flow_cost = cost;
	}

	/// Scripts the unlock relay execution fee.
	pub fn set_amount_to_send(&self, amount: U256) {
		self.lock().amount_to_send = amount;
	}

	/// Disables or re-enables the automatic take-side flip on fulfill.
	pub fn set_auto_fulfill(&self, enabled: bool) {
		self.lock().auto_fulfill = enabled;
	}

	/// Makes the next `n` transaction submissions fail.
	pub fn fail_next_sends(&self, n: usize) {
		self.lock().fail_sends_remaining = n;
	}

	/// Installs a gate on take-side status reads. Processing blocks until
	/// the returned semaphore receives permits.
	pub fn enable_gate(&self) -> Arc<Semaphore> {
		let semaphore = Arc::new(Semaphore::new(0));
		*self.gate.lock().expect("gate lock poisoned") = Some(Arc::clone(&semaphore));
		semaphore
	}

	/// Order ids of every submitted fulfill, in submission order.
	pub fn sent_fulfills(&self) -> Vec<OrderId> {
		self.lock().sent_fulfills.clone()
	}

	/// Every submitted unlock, in submission order.
	pub fn sent_unlocks(&self) -> Vec<UnlockRecord> {
		self.lock().sent_unlocks.clone()
	}

	/// Build parameters of the fulfill for an order, if one was built.
	pub fn fulfill_record(&self, order_id: &OrderId) -> Option<FulfillRecord> {
		self.lock().built_fulfills.get(order_id).cloned()
	}

	/// Every `(token, spender)` approval granted.
	pub fn approvals(&self) -> Vec<(Address, Address)> {
		self.lock().approvals.clone()
	}

	/// Highest number of concurrently processed orders observed.
	pub fn max_concurrent_processing(&self) -> usize {
		self.lock().max_concurrent_processing
	}

	fn make_payload(&self, data: Vec<u8>) -> TransactionPayload {
		if self.chain_id.is_solana() {
			TransactionPayload::Solana {
				data,
				lookup_tables: Vec::new(),
			}
		} else {
			TransactionPayload::Evm {
				to: Address(vec![0xCC; 20]),
				data,
				value: U256::ZERO,
			}
		}
	}

	fn payload_data(tx: &TransactionRequest) -> &[u8] {
		match &tx.payload {
			TransactionPayload::Evm { data, .. } => data,
			TransactionPayload::Solana { data, .. } => data,
		}
	}
}

#[async_trait]
impl ChainAdapterInterface for MockChain {
	fn address(&self) -> Address {
		self.lock().address.clone()
	}

	async fn get_balance(&self, token: &Address) -> Result<U256, ChainError> {
		Ok(self
			.lock()
			.balances
			.get(token)
			.copied()
			.unwrap_or(U256::ZERO))
	}

	async fn get_allowance(&self, token: &Address, spender: &Address) -> Result<U256, ChainError> {
		Ok(self
			.lock()
			.allowances
			.get(&(token.clone(), spender.clone()))
			.copied()
			.unwrap_or(U256::ZERO))
	}

	async fn approve(&self, token: &Address, spender: &Address) -> Result<TxHash, ChainError> {
		let mut state = self.lock();
		state
			.allowances
			.insert((token.clone(), spender.clone()), U256::MAX);
		state.approvals.push((token.clone(), spender.clone()));
		state.next_tx_nonce += 1;
		Ok(TxHash(state.next_tx_nonce.to_be_bytes().to_vec()))
	}

	async fn send_transaction(&self, tx: &TransactionRequest) -> Result<TxHash, ChainError> {
		let mut state = self.lock();
		if state.fail_sends_remaining > 0 {
			state.fail_sends_remaining -= 1;
			return Err(ChainError::TransactionRejected("injected failure".into()));
		}

		let data = Self::payload_data(tx).to_vec();
		match data.first() {
			Some(&TAG_FULFILL) if data.len() == 33 => {
				let mut id = [0u8; 32];
				id.copy_from_slice(&data[1..]);
				let order_id = OrderId(id);
				state.sent_fulfills.push(order_id);
				if state.auto_fulfill {
					state.take_status.insert(order_id, TakeOrderStatus::Fulfilled);
				}
			}
			Some(&TAG_UNLOCK) => {
				if let Some(record) = state.pending_unlocks.remove(&data) {
					for order_id in &record.order_ids {
						state
							.take_status
							.insert(*order_id, TakeOrderStatus::SentUnlock);
					}
					state.sent_unlocks.push(record);
				}
			}
			_ => {}
		}

		state.next_tx_nonce += 1;
		Ok(TxHash(state.next_tx_nonce.to_be_bytes().to_vec()))
	}
}

#[async_trait]
impl ChainClientInterface for MockChain {
	async fn get_take_order_status(
		&self,
		order_id: &OrderId,
	) -> Result<TakeOrderStatus, ChainError> {
		let gate = self.gate.lock().expect("gate lock poisoned").clone();
		if let Some(gate) = gate {
			gate.acquire()
				.await
				.map_err(|e| ChainError::Network(e.to_string()))?
				.forget();
		}

		{
			let mut state = self.lock();
			state.active_processing += 1;
			state.max_concurrent_processing =
				state.max_concurrent_processing.max(state.active_processing);
		}
		// Dwell long enough that overlapping processing would be observed.
		tokio::time::sleep(Duration::from_millis(2)).await;
		let mut state = self.lock();
		state.active_processing -= 1;

		Ok(state
			.take_status
			.get(order_id)
			.copied()
			.unwrap_or(TakeOrderStatus::NotSet))
	}

	async fn get_give_order_status(
		&self,
		order_id: &OrderId,
	) -> Result<GiveOrderStatus, ChainError> {
		Ok(self
			.lock()
			.give_status
			.get(order_id)
			.copied()
			.unwrap_or(GiveOrderStatus::Created))
	}

	async fn get_taker_flow_cost(
		&self,
		_order: &Order,
		_give_native_price_usd: f64,
		_take_native_price_usd: f64,
	) -> Result<FlowCost, ChainError> {
		Ok(self.lock().flow_cost)
	}

	async fn get_amount_to_send(
		&self,
		_take_chain: ChainId,
		_give_chain: ChainId,
	) -> Result<U256, ChainError> {
		Ok(self.lock().amount_to_send)
	}

	async fn preswap_and_fulfill_order(
		&self,
		_order: &Order,
		order_id: &OrderId,
		reserve_dst_token: &Address,
		slippage_bps: u32,
		internal_buffer_bps: u32,
		_payload: &FulfillPayload,
	) -> Result<TransactionRequest, ChainError> {
		self.lock().built_fulfills.insert(
			*order_id,
			FulfillRecord {
				preswapped: true,
				reserve_token: Some(reserve_dst_token.clone()),
				slippage_bps,
				internal_buffer_bps,
			},
		);
		let mut data = vec![TAG_FULFILL];
		data.extend_from_slice(&order_id.0);
		Ok(TransactionRequest {
			chain_id: self.chain_id,
			payload: self.make_payload(data),
		})
	}

	async fn fulfill_order(
		&self,
		_order: &Order,
		order_id: &OrderId,
		_payload: &FulfillPayload,
	) -> Result<TransactionRequest, ChainError> {
		self.lock().built_fulfills.insert(
			*order_id,
			FulfillRecord {
				preswapped: false,
				reserve_token: None,
				slippage_bps: 0,
				internal_buffer_bps: 0,
			},
		);
		let mut data = vec![TAG_FULFILL];
		data.extend_from_slice(&order_id.0);
		Ok(TransactionRequest {
			chain_id: self.chain_id,
			payload: self.make_payload(data),
		})
	}

	async fn send_unlock_order(
		&self,
		orders: &[(OrderId, Order)],
		beneficiary: &Address,
		execution_fee: U256,
		rewards: (U256, U256),
		_payload: &UnlockPayload,
	) -> Result<TransactionRequest, ChainError> {
		let mut data = vec![TAG_UNLOCK];
		for (order_id, _) in orders {
			data.extend_from_slice(&order_id.0);
		}
		self.lock().pending_unlocks.insert(
			data.clone(),
			UnlockRecord {
				order_ids: orders.iter().map(|(id, _)| *id).collect(),
				beneficiary: beneficiary.clone(),
				execution_fee,
				rewards,
			},
		);
		Ok(TransactionRequest {
			chain_id: self.chain_id,
			payload: self.make_payload(data),
		})
	}

	async fn init_address_lookup_tables(&self) -> Result<(), ChainError> {
		Ok(())
	}
}
