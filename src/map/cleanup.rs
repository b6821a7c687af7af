//! Test cleanup tracking
//!
//! Records every key written through a test-namespace context so a test
//! can delete everything it touched when it finishes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::MapContext;
use crate::domain::events::{UpdateAction, UpdateEvent};
use crate::domain::ports::UpdateListener;
use crate::error::{Error, Result};

/// Remembers live keys per map from post-update events.
#[derive(Debug, Default)]
pub struct TouchedKeyTracker {
    touched: Mutex<BTreeMap<String, BTreeSet<String>>>,
}

impl TouchedKeyTracker {
    /// Create a tracker and subscribe it to `ctx`.
    ///
    /// Only test-namespace contexts may be tracked, so cleanup can never
    /// delete production keys.
    pub fn bind(ctx: &MapContext) -> Result<Arc<Self>> {
        if !ctx.config().test_namespace {
            return Err(Error::InvalidOperation(
                "touched-key tracking requires the test namespace".into(),
            ));
        }
        let tracker = Arc::new(Self::default());
        ctx.subscribe(tracker.clone());
        Ok(tracker)
    }

    /// `(map, key)` pairs currently recorded.
    pub fn touched(&self) -> Vec<(String, String)> {
        self.touched
            .lock()
            .iter()
            .flat_map(|(map, keys)| keys.iter().map(move |key| (map.clone(), key.clone())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.touched.lock().is_empty()
    }

    /// Delete every recorded key from both tiers and forget them.
    ///
    /// Returns how many keys were deleted. A key is forgotten only once its
    /// delete succeeds, so after a failure the rest stay recorded for the
    /// next attempt.
    pub async fn full_clean_up(&self, ctx: &MapContext) -> Result<usize> {
        let touched = self.touched.lock().clone();
        let mut deleted = 0;

        for (map_name, keys) in touched {
            let map = ctx.map(&map_name)?;
            for key in keys {
                map.delete(&key).await?;
                self.forget(&map_name, &key);
                deleted += 1;
            }
            debug!(map = %map_name, "Cleaned up touched keys");
        }

        info!(deleted = deleted, "Test cleanup finished");
        Ok(deleted)
    }

    fn forget(&self, map_name: &str, key: &str) {
        let mut touched = self.touched.lock();
        if let Some(keys) = touched.get_mut(map_name) {
            keys.remove(key);
            if keys.is_empty() {
                touched.remove(map_name);
            }
        }
    }
}

#[async_trait]
impl UpdateListener for TouchedKeyTracker {
    async fn on_update(&self, event: &UpdateEvent) -> Result<()> {
        if !event.is_post_update() {
            return Ok(());
        }

        match event.action {
            UpdateAction::Put => {
                self.touched
                    .lock()
                    .entry(event.map_name.clone())
                    .or_default()
                    .insert(event.key.clone());
            }
            UpdateAction::Delete => self.forget(&event.map_name, &event.key),
        }
        Ok(())
    }
}
