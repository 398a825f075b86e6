use std::sync::Arc;

use tracing::warn;

use crate::registry::ActionDefinition;
use crate::store::{MappingStore, StoreError};
use crate::types::{Event, Mapping};

/// Resolves the active mappings one event should fan out to.
#[derive(Clone)]
pub struct MappingMatcher {
    mappings: Arc<dyn MappingStore>,
}

impl MappingMatcher {
    pub fn new(mappings: Arc<dyn MappingStore>) -> Self {
        Self { mappings }
    }

    pub async fn resolve(
        &self,
        event: &Event,
        action: &ActionDefinition,
    ) -> Result<Vec<Mapping>, StoreError> {
        if let Some(mapping_id) = event.mapping_id {
            let mapping = self
                .mappings
                .find_one_active(mapping_id, event.user_id)
                .await?;
            return Ok(mapping.into_iter().collect());
        }

        if !action.shared_events {
            return self
                .mappings
                .find_active(event.user_id, &event.action_type)
                .await;
        }

        let candidates = self.mappings.find_active_shared(&event.action_type).await?;
        let Some(filter) = &action.shared_filter else {
            return Ok(candidates);
        };

        let mut matched = Vec::with_capacity(candidates.len());
        for mapping in candidates {
            match filter.matches(event, &mapping).await {
                Ok(true) => matched.push(mapping),
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        event_id = %event.id,
                        mapping_id = %mapping.id,
                        error = %e,
                        "shared event filter failed, skipping mapping",
                    );
                }
            }
        }
        Ok(matched)
    }
}
