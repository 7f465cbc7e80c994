//! Configuration module for the order-taker daemon.
//!
//! This module provides structures and utilities for managing taker
//! configuration. It supports loading configuration from TOML files with
//! environment-variable interpolation and validates every startup invariant:
//! supported chains, monotonic confirmation thresholds under the per-chain
//! hard cap, batch unlock size bounds and the presence of key material.

use regex::Regex;
use serde::Deserialize;
use std::str::FromStr;
use taker_types::{Address, ChainId, OrderId, SecretString, ThresholdPoint, TokensBucket};
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the taker.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	/// Taker-wide settings and the default processing policy.
	pub taker: TakerConfig,
	/// Order feed settings.
	pub feed: FeedConfig,
	/// Price source settings.
	#[serde(default)]
	pub price: PriceConfig,
	/// Reserve token buckets.
	pub buckets: Vec<TokensBucket>,
	/// Per-chain entries.
	pub chains: Vec<ChainConfig>,
}

/// Processing policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
	/// Profitability-gated policy with mempool retries and batched unlocks.
	Universal,
	/// Approved-token policy with immediate unbatched unlocks.
	Strict,
}

/// Taker-wide settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TakerConfig {
	/// Default processing policy; overridable per chain.
	#[serde(default = "default_policy")]
	pub order_processor: PolicyKind,
	/// Parameters of the universal policy.
	#[serde(default)]
	pub universal: UniversalParams,
}

fn default_policy() -> PolicyKind {
	PolicyKind::Universal
}

/// Parameters of the universal processing policy.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct UniversalParams {
	/// Minimum acceptable profit, in basis points of the give-side worth.
	#[serde(default = "default_min_profitability_bps")]
	pub min_profitability_bps: u32,
	/// Seconds between mempool resubmission sweeps.
	#[serde(default = "default_mempool_interval_secs")]
	pub mempool_interval_secs: u64,
	/// Orders per cross-chain unlock batch.
	#[serde(default = "default_batch_unlock_size")]
	pub batch_unlock_size: usize,
	/// Mempool size cap; the oldest entry is evicted on overflow.
	#[serde(default = "default_mempool_max_size")]
	pub mempool_max_size: usize,
}

fn default_min_profitability_bps() -> u32 {
	4
}

fn default_mempool_interval_secs() -> u64 {
	60
}

fn default_batch_unlock_size() -> usize {
	10
}

fn default_mempool_max_size() -> usize {
	1000
}

impl Default for UniversalParams {
	fn default() -> Self {
		Self {
			min_profitability_bps: default_min_profitability_bps(),
			mempool_interval_secs: default_mempool_interval_secs(),
			batch_unlock_size: default_batch_unlock_size(),
			mempool_max_size: default_mempool_max_size(),
		}
	}
}

/// Order feed settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
	/// Feed endpoint URL.
	pub url: String,
}

/// Price source settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceConfig {
	/// Price source implementation name.
	#[serde(default = "default_price_source")]
	pub source: String,
	/// Cache TTL in seconds; zero disables the cache wrapper.
	#[serde(default = "default_price_cache_ttl")]
	pub cache_ttl_secs: u64,
}

fn default_price_source() -> String {
	"mock".to_string()
}

fn default_price_cache_ttl() -> u64 {
	30
}

impl Default for PriceConfig {
	fn default() -> Self {
		Self {
			source: default_price_source(),
			cache_ttl_secs: default_price_cache_ttl(),
		}
	}
}

/// Declarative filter attached to a chain's source or destination side.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterSpec {
	/// Admit only orders whose computed id is in the set.
	WhitelistOrderIds { order_ids: Vec<OrderId> },
	/// Admit only orders whose take token byte-equals one of the list.
	ApprovedTakeTokens { tokens: Vec<Address> },
}

/// Per-chain confirmation constraints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Constraints {
	/// USD-worth threshold points, ascending.
	#[serde(default)]
	pub required_confirmations_thresholds: Vec<ThresholdPoint>,
}

/// Configuration for a single chain.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
	/// Chain id; must be in the supported set.
	pub chain: ChainId,
	/// RPC endpoint for the chain.
	pub chain_rpc: String,
	/// Beneficiary receiving unlocked give funds on this chain.
	pub beneficiary: Address,
	/// Key funding fulfillments on this chain.
	pub taker_private_key: SecretString,
	/// Key submitting unlocks from this chain.
	pub unlock_authority_private_key: SecretString,
	/// Disabled chains get the always-false fulfill filter appended.
	#[serde(default)]
	pub disabled: bool,
	/// Deployment environment label passed through to the chain client.
	#[serde(default)]
	pub environment: Option<String>,
	/// Per-chain policy override.
	#[serde(default)]
	pub order_processor: Option<PolicyKind>,
	/// Take tokens approved under the strict policy.
	#[serde(default)]
	pub approved_take_tokens: Vec<Address>,
	/// Filters applied when this chain is the destination.
	#[serde(default)]
	pub dst_filters: Vec<FilterSpec>,
	/// Filters applied when this chain is the source.
	#[serde(default)]
	pub src_filters: Vec<FilterSpec>,
	/// Confirmation constraints for orders originating on this chain.
	#[serde(default)]
	pub constraints: Constraints,
	/// Override for the crosschain forwarder approval target.
	#[serde(default)]
	pub crosschain_forwarder: Option<Address>,
	/// Override for the destination PMM approval target.
	#[serde(default)]
	pub dst_pmm: Option<Address>,
}

impl ChainConfig {
	/// Effective processing policy for this chain.
	pub fn policy(&self, default: PolicyKind) -> PolicyKind {
		self.order_processor.unwrap_or(default)
	}
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of the environment variable, and
/// supports default values with `${VAR_NAME:-default_value}`.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let full_match = cap.get(0).unwrap();
		let var_name = cap.get(1).unwrap().as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)))
				}
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file at the specified path.
	///
	/// Environment variables can be referenced using:
	/// - `${VAR_NAME}` - Required environment variable
	/// - `${VAR_NAME:-default}` - With default value if not set
	pub fn from_file(path: &str) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path)?;
		content.parse()
	}

	/// Validates the configuration against every startup invariant.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.feed.url.is_empty() {
			return Err(ConfigError::Validation("Feed URL cannot be empty".into()));
		}

		// Validate universal policy parameters
		let universal = &self.taker.universal;
		if !(1..=10).contains(&universal.batch_unlock_size) {
			return Err(ConfigError::Validation(format!(
				"batch_unlock_size must be within [1, 10], got {}",
				universal.batch_unlock_size
			)));
		}
		if universal.mempool_interval_secs == 0 {
			return Err(ConfigError::Validation(
				"mempool_interval_secs must be greater than 0".into(),
			));
		}
		if universal.mempool_max_size == 0 {
			return Err(ConfigError::Validation(
				"mempool_max_size must be greater than 0".into(),
			));
		}

		// Validate buckets
		if self.buckets.is_empty() {
			return Err(ConfigError::Validation(
				"At least one token bucket must be configured".into(),
			));
		}
		for (i, bucket) in self.buckets.iter().enumerate() {
			if bucket.is_empty() {
				return Err(ConfigError::Validation(format!(
					"Token bucket {} holds no tokens on any chain",
					i
				)));
			}
		}

		// Validate chains
		if self.chains.is_empty() {
			return Err(ConfigError::Validation(
				"At least one chain must be configured".into(),
			));
		}
		for entry in &self.chains {
			self.validate_chain(entry)?;
		}

		Ok(())
	}

	fn validate_chain(&self, entry: &ChainConfig) -> Result<(), ConfigError> {
		let chain = entry.chain;
		if !chain.is_supported() {
			return Err(ConfigError::Validation(format!(
				"Chain {} is not in the supported set",
				chain.0
			)));
		}
		if entry.chain_rpc.is_empty() {
			return Err(ConfigError::Validation(format!(
				"Chain {} must have chain_rpc",
				chain
			)));
		}
		if entry.beneficiary.is_empty() {
			return Err(ConfigError::Validation(format!(
				"Chain {} must have a beneficiary",
				chain
			)));
		}
		if entry.taker_private_key.is_empty() || entry.unlock_authority_private_key.is_empty() {
			return Err(ConfigError::Validation(format!(
				"Chain {} is missing key material",
				chain
			)));
		}
		if entry.policy(self.taker.order_processor) == PolicyKind::Strict
			&& entry.approved_take_tokens.is_empty()
		{
			return Err(ConfigError::Validation(format!(
				"Chain {} uses the strict policy but approves no take tokens",
				chain
			)));
		}

		// Confirmation thresholds: strictly increasing in USD worth and in
		// confirmations, all under the chain hard cap.
		let hard_cap = chain.max_confirmations();
		let points = &entry.constraints.required_confirmations_thresholds;
		for (i, point) in points.iter().enumerate() {
			if point.min_block_confirmations >= hard_cap {
				return Err(ConfigError::Validation(format!(
					"Chain {}: threshold at {} USD requires {} confirmations, above the hard cap {}",
					chain, point.threshold_amount_in_usd, point.min_block_confirmations, hard_cap
				)));
			}
			if let Some(prev) = i.checked_sub(1).and_then(|i| points.get(i)) {
				if point.threshold_amount_in_usd <= prev.threshold_amount_in_usd
					|| point.min_block_confirmations <= prev.min_block_confirmations
				{
					return Err(ConfigError::Validation(format!(
						"Chain {}: confirmation thresholds must be strictly increasing",
						chain
					)));
				}
			}
		}

		Ok(())
	}
}

/// Parses configuration from a TOML string, resolving environment variables
/// and validating the result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
