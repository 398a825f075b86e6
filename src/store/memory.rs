use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::{
    CredentialStore, EventStore, ExecutionRecorder, MappingStore, StoreError, ensure_terminal,
    now_utc,
};
use crate::types::{
    Event, EventOutcome, EventStatus, ExecutionUpdate, FailureRecord, Mapping, NewEvent,
    NewMapping, ReactionExecutionRecord, ReactionExecutionStatus, UserServiceConfig,
};

/// In-process store. Insertion order stands in for `created_at` ordering.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    events: Vec<Event>,
    mappings: Vec<Mapping>,
    executions: Vec<ReactionExecutionRecord>,
    failures: Vec<FailureRecord>,
    service_configs: BTreeMap<(i64, String), UserServiceConfig>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_event(&self, new: NewEvent) -> Event {
        let event = Event {
            id: Uuid::new_v4(),
            action_type: new.action_type,
            user_id: new.user_id,
            mapping_id: new.mapping_id,
            source: new.source,
            external_id: new.external_id,
            payload: new.payload,
            status: EventStatus::Received,
            processing_time_ms: None,
            error_message: None,
            user_agent: new.user_agent,
            signature_verified: new.signature_verified,
            created_at: now_utc(),
            processed_at: None,
        };
        self.lock().events.push(event.clone());
        event
    }

    pub fn insert_mapping(&self, new: NewMapping) -> Mapping {
        let now = now_utc();
        let mapping = Mapping {
            id: Uuid::new_v4(),
            name: new.name,
            description: new.description,
            action: new.action,
            reactions: new.reactions,
            is_active: new.is_active,
            created_by: new.created_by,
            created_at: now.clone(),
            updated_at: now,
        };
        self.lock().mappings.push(mapping.clone());
        mapping
    }

    pub fn set_user_service_config(&self, user_id: i64, service: &str, config: UserServiceConfig) {
        self.lock()
            .service_configs
            .insert((user_id, service.to_string()), config);
    }

    pub fn event(&self, id: Uuid) -> Option<Event> {
        self.lock().events.iter().find(|event| event.id == id).cloned()
    }

    pub fn executions(&self) -> Vec<ReactionExecutionRecord> {
        self.lock().executions.clone()
    }

    pub fn failures(&self) -> Vec<FailureRecord> {
        self.lock().failures.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn find_by_status(
        &self,
        status: EventStatus,
        limit: i64,
    ) -> Result<Vec<Event>, StoreError> {
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(self
            .lock()
            .events
            .iter()
            .filter(|event| event.status == status)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn save_outcome(&self, outcome: &EventOutcome) -> Result<bool, StoreError> {
        ensure_terminal(outcome)?;

        let mut state = self.lock();
        let event = state
            .events
            .iter_mut()
            .find(|event| event.id == outcome.event_id)
            .ok_or_else(|| StoreError::NotFound("event not found".to_string()))?;
        if event.status != EventStatus::Received {
            return Ok(false);
        }

        event.status = outcome.status;
        event.processing_time_ms = Some(outcome.processing_time_ms);
        event.error_message = outcome.error_message.clone();
        event.processed_at = Some(now_utc());
        Ok(true)
    }
}

#[async_trait]
impl MappingStore for MemoryStore {
    async fn find_active(
        &self,
        owner: i64,
        action_type: &str,
    ) -> Result<Vec<Mapping>, StoreError> {
        Ok(self
            .lock()
            .mappings
            .iter()
            .filter(|m| m.is_active && m.created_by == owner && m.action.kind == action_type)
            .cloned()
            .collect())
    }

    async fn find_active_shared(&self, action_type: &str) -> Result<Vec<Mapping>, StoreError> {
        Ok(self
            .lock()
            .mappings
            .iter()
            .filter(|m| m.is_active && m.action.kind == action_type)
            .cloned()
            .collect())
    }

    async fn find_one_active(&self, id: Uuid, owner: i64) -> Result<Option<Mapping>, StoreError> {
        Ok(self
            .lock()
            .mappings
            .iter()
            .find(|m| m.id == id && m.created_by == owner && m.is_active)
            .cloned())
    }
}

#[async_trait]
impl ExecutionRecorder for MemoryStore {
    async fn create_pending(
        &self,
        event_id: Uuid,
        reaction_name: &str,
    ) -> Result<ReactionExecutionRecord, StoreError> {
        let record = ReactionExecutionRecord {
            id: Uuid::new_v4(),
            event_id,
            reaction_name: reaction_name.to_string(),
            status: ReactionExecutionStatus::Pending,
            output_data: None,
            error_message: None,
            execution_time_ms: None,
            executed_at: None,
            created_at: now_utc(),
        };
        self.lock().executions.push(record.clone());
        Ok(record)
    }

    async fn finish(&self, record_id: Uuid, update: &ExecutionUpdate) -> Result<(), StoreError> {
        let mut state = self.lock();
        let record = state
            .executions
            .iter_mut()
            .find(|record| record.id == record_id)
            .ok_or_else(|| StoreError::NotFound("execution not found".to_string()))?;
        if record.status != ReactionExecutionStatus::Pending {
            return Err(StoreError::Conflict("execution_not_pending".to_string()));
        }

        record.status = update.status;
        record.output_data = update.output_data.clone();
        record.error_message = update.error_message.clone();
        record.execution_time_ms = Some(update.execution_time_ms);
        record.executed_at = Some(now_utc());
        Ok(())
    }

    async fn record_failure(&self, failure: &FailureRecord) -> Result<(), StoreError> {
        self.lock().failures.push(failure.clone());
        Ok(())
    }

    async fn list_executions(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<ReactionExecutionRecord>, StoreError> {
        Ok(self
            .lock()
            .executions
            .iter()
            .filter(|record| record.event_id == event_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_user_service_config(
        &self,
        user_id: i64,
        service: &str,
    ) -> Result<Option<UserServiceConfig>, StoreError> {
        Ok(self
            .lock()
            .service_configs
            .get(&(user_id, service.to_string()))
            .cloned())
    }
}
