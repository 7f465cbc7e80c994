//! Cross-chain order data model.
//!
//! An order locks `give` funds on the source chain and asks for `take` funds
//! on the destination chain. The order id is a Keccak-256 content hash over
//! the canonical encoding of the payload, so it is deterministic and globally
//! unique regardless of which feed delivered the order.

use crate::{Address, ChainId};
use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;

/// One side of an order: a token amount on a specific chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderOffer {
	/// Chain the offer lives on.
	pub chain_id: ChainId,
	/// Token contract (or mint) address.
	pub token_address: Address,
	/// Token amount in base units.
	pub amount: U256,
}

/// A user-signed cross-chain swap request.
///
/// The authority and receiver fields are opaque to the taker core; they are
/// passed through to the chain client when building fulfill and unlock
/// transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
	/// Maker-chosen nonce, part of the content hash.
	pub maker_order_nonce: u64,
	/// Maker address on the source chain.
	pub maker_src: Address,
	/// Funds locked by the maker on the source chain.
	pub give: OrderOffer,
	/// Funds the maker wants on the destination chain.
	pub take: OrderOffer,
	/// Recipient of the take funds on the destination chain.
	pub receiver_dst: Address,
	/// Authority allowed to patch the give offer on the source chain.
	pub give_patch_authority_src: Address,
	/// Authority over the order account on the destination chain.
	pub order_authority_address_dst: Address,
	/// Optional restriction on who may fulfill the order.
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub allowed_taker_dst: Option<Address>,
	/// Optional beneficiary for a cancel on the source chain.
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub allowed_cancel_beneficiary_src: Option<Address>,
}

impl Order {
	/// Computes the deterministic 32-byte content hash of this order.
	pub fn compute_id(&self) -> OrderId {
		let mut hasher = Keccak256::new();
		hasher.update(self.maker_order_nonce.to_be_bytes());
		hash_bytes(&mut hasher, &self.maker_src.0);
		hash_offer(&mut hasher, &self.give);
		hash_offer(&mut hasher, &self.take);
		hash_bytes(&mut hasher, &self.receiver_dst.0);
		hash_bytes(&mut hasher, &self.give_patch_authority_src.0);
		hash_bytes(&mut hasher, &self.order_authority_address_dst.0);
		hash_optional(&mut hasher, &self.allowed_taker_dst);
		hash_optional(&mut hasher, &self.allowed_cancel_beneficiary_src);
		OrderId(hasher.finalize().into())
	}
}

/// Length-prefixed byte-string encoding, so adjacent variable-length fields
/// cannot collide.
fn hash_bytes(hasher: &mut Keccak256, bytes: &[u8]) {
	hasher.update((bytes.len() as u64).to_be_bytes());
	hasher.update(bytes);
}

fn hash_offer(hasher: &mut Keccak256, offer: &OrderOffer) {
	hasher.update(offer.chain_id.0.to_be_bytes());
	hash_bytes(hasher, &offer.token_address.0);
	hasher.update(offer.amount.to_be_bytes::<32>());
}

fn hash_optional(hasher: &mut Keccak256, field: &Option<Address>) {
	match field {
		Some(address) => {
			hasher.update([1u8]);
			hash_bytes(hasher, &address.0);
		}
		None => hasher.update([0u8]),
	}
}

/// Deterministic 32-byte content hash identifying an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId(pub [u8; 32]);

impl OrderId {
	/// Parses an order id from a hex string, with or without a `0x` prefix.
	pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
		let stripped = s.strip_prefix("0x").unwrap_or(s);
		let bytes = hex::decode(stripped)?;
		let array: [u8; 32] = bytes
			.try_into()
			.map_err(|_| hex::FromHexError::InvalidStringLength)?;
		Ok(OrderId(array))
	}
}

impl fmt::Display for OrderId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

impl Serialize for OrderId {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_string())
	}
}

impl<'de> Deserialize<'de> for OrderId {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		OrderId::from_hex(&s).map_err(serde::de::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_order() -> Order {
		Order {
			maker_order_nonce: 42,
			maker_src: Address(vec![1; 20]),
			give: OrderOffer {
				chain_id: ChainId(42161),
				token_address: Address(vec![2; 20]),
				amount: U256::from(100_000_000u64),
			},
			take: OrderOffer {
				chain_id: ChainId(137),
				token_address: Address(vec![3; 20]),
				amount: U256::from(99_500_000u64),
			},
			receiver_dst: Address(vec![4; 20]),
			give_patch_authority_src: Address(vec![5; 20]),
			order_authority_address_dst: Address(vec![6; 20]),
			allowed_taker_dst: None,
			allowed_cancel_beneficiary_src: None,
		}
	}

	#[test]
	fn test_id_is_deterministic() {
		assert_eq!(sample_order().compute_id(), sample_order().compute_id());
	}

	#[test]
	fn test_id_changes_with_payload() {
		let base = sample_order().compute_id();

		let mut bumped_nonce = sample_order();
		bumped_nonce.maker_order_nonce += 1;
		assert_ne!(base, bumped_nonce.compute_id());

		let mut bumped_amount = sample_order();
		bumped_amount.take.amount += U256::from(1);
		assert_ne!(base, bumped_amount.compute_id());

		let mut with_taker = sample_order();
		with_taker.allowed_taker_dst = Some(Address(vec![9; 20]));
		assert_ne!(base, with_taker.compute_id());
	}

	#[test]
	fn test_id_hex_round_trip() {
		let id = sample_order().compute_id();
		assert_eq!(OrderId::from_hex(&id.to_string()).unwrap(), id);
	}

	#[test]
	fn test_order_serde_round_trip() {
		let order = sample_order();
		let json = serde_json::to_string(&order).unwrap();
		let back: Order = serde_json::from_str(&json).unwrap();
		assert_eq!(back, order);
		assert_eq!(back.compute_id(), order.compute_id());
	}
}
