// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Domain Events
//
// In-memory event streaming over tokio broadcast channels. Carries the
// `dapps/change` notifications published on registration, install,
// launch, stop and uninstall.

use crate::domain::events::DappEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Dapp(DappEvent),
}

impl DomainEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Dapp(_) => DappEvent::CHANGE_TOPIC,
        }
    }
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Capacity is the number of buffered events before the oldest are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_dapp_event(&self, event: DappEvent) {
        self.publish(DomainEvent::Dapp(event));
    }

    fn publish(&self, event: DomainEvent) {
        debug!(topic = event.topic(), "Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to events of a single dapp
    pub fn subscribe_dapp(&self, dapp_id: impl Into<String>) -> DappEventReceiver {
        DappEventReceiver {
            receiver: self.sender.subscribe(),
            dapp_id: dapp_id.into(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to one dapp id
pub struct DappEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    dapp_id: String,
}

impl DappEventReceiver {
    pub async fn recv(&mut self) -> Result<DappEvent, EventBusError> {
        loop {
            let DomainEvent::Dapp(event) = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.dapp_id() == self.dapp_id {
                return Ok(event);
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        event_bus.publish_dapp_event(DappEvent::Installed {
            dapp_id: "d1".to_string(),
            installed_at: Utc::now(),
        });

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.topic(), "dapps/change");
        match received {
            DomainEvent::Dapp(DappEvent::Installed { dapp_id, .. }) => assert_eq!(dapp_id, "d1"),
            _ => panic!("Wrong event type received"),
        }
    }

    #[tokio::test]
    async fn test_dapp_event_filtering() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe_dapp("d2");

        event_bus.publish_dapp_event(DappEvent::Uninstalled {
            dapp_id: "d1".to_string(),
            uninstalled_at: Utc::now(),
        });
        event_bus.publish_dapp_event(DappEvent::Uninstalled {
            dapp_id: "d2".to_string(),
            uninstalled_at: Utc::now(),
        });

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.dapp_id(), "d2");
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 1);
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }
}
