//! Update Listeners
//!
//! The update bus every map publishes to, plus two stock subscribers: one
//! that logs each event and one that records them for inspection.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::domain::events::{UpdateEvent, UpdatePhase};
use crate::domain::ports::UpdateListener;
use crate::error::Result;

// =============================================================================
// Update Bus
// =============================================================================

/// Observer list owned by a map context.
///
/// Listeners run in subscription order; the first failure stops delivery
/// and is returned to the mutating caller.
#[derive(Default)]
pub struct UpdateBus {
    listeners: RwLock<Vec<Arc<dyn UpdateListener>>>,
}

impl UpdateBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn UpdateListener>) {
        self.listeners.write().push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    pub async fn publish(&self, event: &UpdateEvent) -> Result<()> {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_update(event).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for UpdateBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateBus")
            .field("listener_count", &self.len())
            .finish()
    }
}

// =============================================================================
// Logging Listener
// =============================================================================

/// Logs update events to the tracing system.
#[derive(Debug, Clone, Default)]
pub struct LoggingUpdateListener {
    /// Whether to log events at info level (true) or debug level (false)
    info_level: bool,
}

impl LoggingUpdateListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info_level() -> Self {
        Self { info_level: true }
    }

    pub fn debug_level() -> Self {
        Self { info_level: false }
    }
}

#[async_trait]
impl UpdateListener for LoggingUpdateListener {
    async fn on_update(&self, event: &UpdateEvent) -> Result<()> {
        let event_type = event.event_type();
        let json = serde_json::to_string(event).unwrap_or_else(|_| format!("{:?}", event));

        if self.info_level {
            info!(event_type = %event_type, event = %json, "Map update");
        } else {
            debug!(event_type = %event_type, event = %json, "Map update");
        }
        Ok(())
    }
}

// =============================================================================
// In-Memory Collector
// =============================================================================

/// Records update events for later inspection.
#[derive(Debug, Default)]
pub struct InMemoryUpdateCollector {
    events: RwLock<Vec<UpdateEvent>>,
}

impl InMemoryUpdateCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UpdateEvent> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Events of one phase, in arrival order.
    pub fn events_in_phase(&self, phase: UpdatePhase) -> Vec<UpdateEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.phase == phase)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UpdateListener for InMemoryUpdateCollector {
    async fn on_update(&self, event: &UpdateEvent) -> Result<()> {
        self.events.write().push(event.clone());
        Ok(())
    }
}
