//! Chain-scoped address representation.
//!
//! Addresses are raw byte strings so that both 20-byte EVM addresses and
//! 32-byte Solana public keys fit in the same type. Equality is byte
//! comparison, never string form.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A chain-scoped address stored as raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub Vec<u8>);

impl Address {
	/// Parses an address from a hex string, with or without a `0x` prefix.
	pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
		let stripped = s.strip_prefix("0x").unwrap_or(s);
		hex::decode(stripped).map(Address)
	}

	/// Sentinel for a chain's native currency. Price sources answer this
	/// address with the native token price.
	pub fn native() -> Self {
		Address(Vec::new())
	}

	/// Returns the address as a byte slice.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	/// Returns true if the address holds no bytes.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(&self.0))
	}
}

impl From<&[u8]> for Address {
	fn from(bytes: &[u8]) -> Self {
		Address(bytes.to_vec())
	}
}

impl Serialize for Address {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_string())
	}
}

impl<'de> Deserialize<'de> for Address {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		Address::from_hex(&s).map_err(serde::de::Error::custom)
	}
}
