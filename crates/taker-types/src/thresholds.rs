//! Block-confirmation thresholds keyed to order USD worth.
//!
//! The feed must observe at least `min_block_confirmations` source-chain
//! confirmations before delivering an order whose give side is worth at
//! least `threshold_amount_in_usd`. Per chain the configured points must be
//! strictly increasing in both coordinates and stay below the chain's hard
//! confirmation cap.

use serde::{Deserialize, Serialize};

/// One configured threshold point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPoint {
	/// Lower bound (inclusive) on the order's give-side USD worth.
	pub threshold_amount_in_usd: f64,
	/// Minimum source-chain confirmations before delivery.
	pub min_block_confirmations: u64,
}

/// A resolved confirmation range derived from adjacent threshold points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfirmationRange {
	/// Lower bound (inclusive) on USD worth.
	pub usd_worth_from: f64,
	/// Upper bound (exclusive) on USD worth; `f64::INFINITY` for the last range.
	pub usd_worth_to: f64,
	/// Confirmations required for orders in this range.
	pub min_block_confirmations: u64,
}

/// Expands sorted threshold points into contiguous confirmation ranges.
///
/// The caller is responsible for having validated monotonicity; this is a
/// pure shape transformation.
pub fn to_ranges(points: &[ThresholdPoint]) -> Vec<ConfirmationRange> {
	points
		.iter()
		.enumerate()
		.map(|(i, point)| ConfirmationRange {
			usd_worth_from: point.threshold_amount_in_usd,
			usd_worth_to: points
				.get(i + 1)
				.map(|next| next.threshold_amount_in_usd)
				.unwrap_or(f64::INFINITY),
			min_block_confirmations: point.min_block_confirmations,
		})
		.collect()
}
