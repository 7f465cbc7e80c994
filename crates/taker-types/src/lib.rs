//! Common types module for the order-taker daemon.
//!
//! This module defines the core data types and structures shared by every
//! component of the taker: chain identities, addresses, orders and their
//! lifecycle events, reserve token buckets, confirmation thresholds and the
//! hook observer sink. It provides a centralized location for shared types
//! to ensure consistency across all taker components.

/// Chain-scoped address representation.
pub mod address;
/// Reserve token bucket types for cross-chain coverage lookups.
pub mod buckets;
/// Supported chain registry and per-chain constants.
pub mod chains;
/// Order lifecycle events delivered by the order feed.
pub mod events;
/// Hook observer sink for order lifecycle notifications.
pub mod hooks;
/// Cross-chain order data model and order id hashing.
pub mod order;
/// Secure string type for private key material.
pub mod secret_string;
/// Block-confirmation threshold types keyed to order USD worth.
pub mod thresholds;
/// Utility functions for display formatting.
pub mod utils;

// Re-export all types for convenient access
pub use address::Address;
pub use buckets::TokensBucket;
pub use chains::{ChainId, ChainInfo, ChainKind};
pub use events::{OrderEvent, OrderEventKind};
pub use hooks::{HookEvent, HookSink, Hooks};
pub use order::{Order, OrderId, OrderOffer};
pub use secret_string::SecretString;
pub use thresholds::{ConfirmationRange, ThresholdPoint};
pub use utils::truncate_id;
