//! In-process order feed for tests and local development.
//!
//! Events pushed into the publisher half appear on the engine's receiver as
//! if a remote feed had delivered them. Confirmation gating is assumed to
//! have happened upstream, matching the contract of the real transport.

use crate::{FeedContext, FeedError, OrderFeedInterface};
use async_trait::async_trait;
use std::sync::Mutex;
use taker_types::OrderEvent;
use tokio::sync::mpsc;

/// Publisher half of a channel feed.
#[derive(Clone)]
pub struct FeedPublisher {
	tx: mpsc::UnboundedSender<OrderEvent>,
}

impl FeedPublisher {
	/// Pushes one event into the feed.
	pub fn publish(&self, event: OrderEvent) {
		// A closed feed drops events, same as a disconnected transport.
		let _ = self.tx.send(event);
	}
}

/// In-process feed backed by an unbounded channel.
pub struct ChannelOrderFeed {
	rx: Mutex<Option<mpsc::UnboundedReceiver<OrderEvent>>>,
	stop: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ChannelOrderFeed {
	/// Creates the feed and its publisher handle.
	pub fn new() -> (Self, FeedPublisher) {
		let (tx, rx) = mpsc::unbounded_channel();
		(
			Self {
				rx: Mutex::new(Some(rx)),
				stop: Mutex::new(None),
			},
			FeedPublisher { tx },
		)
	}
}

#[async_trait]
impl OrderFeedInterface for ChannelOrderFeed {
	async fn start(
		&self,
		_ctx: FeedContext,
		sender: mpsc::UnboundedSender<OrderEvent>,
	) -> Result<(), FeedError> {
		let mut rx = self
			.rx
			.lock()
			.expect("feed receiver lock poisoned")
			.take()
			.ok_or_else(|| FeedError::State("feed already started".into()))?;

		let forwarder = tokio::spawn(async move {
			while let Some(event) = rx.recv().await {
				if sender.send(event).is_err() {
					break;
				}
			}
		});
		*self.stop.lock().expect("feed stop lock poisoned") = Some(forwarder);
		Ok(())
	}

	async fn stop(&self) -> Result<(), FeedError> {
		if let Some(handle) = self.stop.lock().expect("feed stop lock poisoned").take() {
			handle.abort();
		}
		Ok(())
	}
}
