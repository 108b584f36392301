use super::types::{Event, EventType};
use crate::error::Result;
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::{debug, error, info_span, Instrument};

#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &Event) -> Result<()>;
}

/// How `publish` hands an event to its subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Await every handler in subscription order, fail on the first error
    Sync,
    /// Spawn each handler on the runtime and return immediately
    Async,
}

#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<EventType, Vec<Arc<dyn EventHandler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, event_type: EventType, handler: Arc<dyn EventHandler>) {
        debug!(event_type = %event_type, handler = handler.name(), "Subscribed handler");
        self.handlers
            .write()
            .await
            .entry(event_type)
            .or_default()
            .push(handler);
    }

    pub async fn subscribe_all(&self, event_types: &[EventType], handler: Arc<dyn EventHandler>) {
        for event_type in event_types {
            self.subscribe(*event_type, handler.clone()).await;
        }
    }

    pub async fn publish(&self, event: Event, delivery: Delivery) -> Result<()> {
        // Clone out of the lock so handlers may subscribe or publish themselves
        let handlers = self
            .handlers
            .read()
            .await
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            debug!(event_type = %event.event_type, "No subscribers for event");
            return Ok(());
        }

        let span = info_span!(
            "event",
            event_id = %event.id,
            event_type = %event.event_type,
            trace_id = %event.context.trace_id,
            user_id = ?event.context.user_id,
        );

        match delivery {
            Delivery::Sync => {
                for handler in handlers {
                    handler.handle(&event).instrument(span.clone()).await?;
                }
            }
            Delivery::Async => {
                let event = Arc::new(event);
                for handler in handlers {
                    let event = event.clone();
                    tokio::spawn(
                        async move {
                            if let Err(e) = handler.handle(&event).await {
                                error!(handler = handler.name(), "Event handler failed: {}", e);
                            }
                        }
                        .instrument(span.clone()),
                    );
                }
            }
        }

        Ok(())
    }
}
