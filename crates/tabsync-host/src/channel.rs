//! Named publish/subscribe channel for relay messages.
//!
//! Uses a tokio broadcast channel in place of a browser channel. Every
//! subscriber sees every message, the sender included; the relay drops its
//! own by sender id.

use tokio::sync::broadcast;
use tracing::{debug, warn};

use tabsync_core::error::ChannelError;
use tabsync_core::relay::model::BroadcastMessage;
use tabsync_core::ChannelBackend;

/// Type alias for the broadcast sender.
pub type RelaySender = broadcast::Sender<BroadcastMessage>;

/// Messages buffered per subscriber before it starts lagging.
pub const CHANNEL_CAPACITY: usize = 100;

/// Create a new relay channel with default capacity.
pub fn create_relay_channel() -> RelaySender {
    let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
    tx
}

#[derive(Clone)]
pub struct MemoryChannel {
    name: String,
    tx: RelaySender,
}

impl MemoryChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tx: create_relay_channel(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publishing handle and subscription for one tab.
    pub fn attach(&self) -> (ChannelPort, ChannelMessages) {
        let port = ChannelPort {
            tx: self.tx.clone(),
        };
        let messages = ChannelMessages {
            rx: self.tx.subscribe(),
        };
        debug!(channel = %self.name, subscribers = self.subscriber_count(), "Tab attached to relay channel");
        (port, messages)
    }
}

/// Publishing side of one tab.
pub struct ChannelPort {
    tx: RelaySender,
}

impl ChannelBackend for ChannelPort {
    fn post(&self, message: &BroadcastMessage) -> Result<(), ChannelError> {
        self.tx
            .send(message.clone())
            .map(|_| ())
            .map_err(|_| ChannelError::Closed)
    }
}

/// Receiving side of one tab.
pub struct ChannelMessages {
    rx: broadcast::Receiver<BroadcastMessage>,
}

impl ChannelMessages {
    pub async fn recv(&mut self) -> Option<BroadcastMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Relay messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tabsync_core::relay::model::RelayPayload;
    use tabsync_core::stream::model::ConnectionState;

    fn state_message(sender: &str) -> BroadcastMessage {
        BroadcastMessage {
            payload: RelayPayload::State {
                state: ConnectionState::Open,
            },
            sender_id: sender.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_including_sender() {
        let channel = MemoryChannel::new("tabsync:updates");
        let (a, mut a_messages) = channel.attach();
        let (_b, mut b_messages) = channel.attach();
        assert_eq!(channel.subscriber_count(), 2);

        a.post(&state_message("tab-a")).unwrap();
        assert_eq!(a_messages.recv().await.unwrap().sender_id, "tab-a");
        assert_eq!(b_messages.recv().await.unwrap().sender_id, "tab-a");
    }

    #[test]
    fn test_post_without_subscribers_fails() {
        let channel = MemoryChannel::new("tabsync:updates");
        let (port, messages) = channel.attach();
        drop(messages);
        assert!(matches!(
            port.post(&state_message("tab-a")),
            Err(ChannelError::Closed)
        ));
    }
}
