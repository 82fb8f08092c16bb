//! Domain events emitted by the transfer lifecycle. Delivery (push
//! notifications, activity log) lives in external collaborators; this module
//! is the seam they subscribe on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::models::TransferStatus;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Event {
    TransferCreated {
        transfer_id: i64,
        request_code: String,
        timestamp: DateTime<Utc>,
    },
    TransferUpdated {
        transfer_id: i64,
        timestamp: DateTime<Utc>,
    },
    TransferStatusChanged {
        transfer_id: i64,
        from: TransferStatus,
        to: TransferStatus,
        timestamp: DateTime<Utc>,
    },
    TransferDeleted {
        transfer_id: i64,
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event; a full or closed channel is logged, never propagated,
    /// since event delivery must not fail the triggering request.
    pub async fn send(&self, event: Event) {
        if let Err(err) = self.sender.send(event).await {
            error!("failed to publish domain event: {}", err);
        }
    }
}

/// Background consumer. External notification delivery hooks in here.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        info!(event = ?event, "domain event");
    }
}

/// Convenience constructor for a sender/processor pair.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_the_receiver() {
        let (sender, mut rx) = channel(8);
        sender
            .send(Event::TransferDeleted {
                transfer_id: 9,
                timestamp: Utc::now(),
            })
            .await;
        match rx.recv().await {
            Some(Event::TransferDeleted { transfer_id, .. }) => assert_eq!(transfer_id, 9),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
