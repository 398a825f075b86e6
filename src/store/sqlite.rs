use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use super::{
    CredentialStore, EventStore, ExecutionRecorder, MappingStore, StoreError, ensure_terminal,
    now_utc,
};
use crate::types::{
    Action, Event, EventOutcome, EventStatus, ExecutionUpdate, FailureRecord, Mapping, NewEvent,
    NewMapping, ReactionExecutionRecord, ReactionExecutionStatus, UserServiceConfig,
};

const EVENT_COLUMNS: &str = "id, action_type, user_id, mapping_id, source, external_id, \
    payload, status, processing_time_ms, user_agent, signature_verified, error_message, \
    created_at, processed_at";

const MAPPING_COLUMNS: &str = "id, name, description, action_type, action_config, reactions, \
    is_active, created_by, created_at, updated_at";

const EXECUTION_COLUMNS: &str = "id, webhook_event_id, reaction_name, status, \
    execution_time_ms, error_message, output_data, executed_at, created_at";

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert_event(&self, new: &NewEvent) -> Result<Event, StoreError> {
        let id = Uuid::new_v4();
        let payload = to_json_text("payload", &new.payload)?;

        sqlx::query(
            r#"
            INSERT INTO webhook_events (
                id,
                action_type,
                user_id,
                mapping_id,
                source,
                external_id,
                payload,
                status,
                user_agent,
                signature_verified,
                created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, 'received', ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&new.action_type)
        .bind(new.user_id)
        .bind(new.mapping_id.map(|id| id.to_string()))
        .bind(new.source.as_deref())
        .bind(new.external_id.as_deref())
        .bind(payload)
        .bind(new.user_agent.as_deref())
        .bind(new.signature_verified)
        .bind(now_utc())
        .execute(&self.pool)
        .await?;

        self.get_event(id).await
    }

    pub async fn get_event(&self, id: Uuid) -> Result<Event, StoreError> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM webhook_events WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound("event not found".to_string()))?;

        row.try_into()
    }

    pub async fn insert_mapping(&self, new: &NewMapping) -> Result<Mapping, StoreError> {
        let id = Uuid::new_v4();
        let now = now_utc();
        let action_config = to_json_text("action config", &new.action.config)?;
        let reactions = to_json_text("reactions", &new.reactions)?;

        let result = sqlx::query(
            r#"
            INSERT INTO webhook_configs (
                id,
                name,
                description,
                action_type,
                action_config,
                reactions,
                is_active,
                created_by,
                created_at,
                updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(created_by, name) DO NOTHING
            "#,
        )
        .bind(id.to_string())
        .bind(&new.name)
        .bind(new.description.as_deref())
        .bind(&new.action.kind)
        .bind(action_config)
        .bind(reactions)
        .bind(new.is_active)
        .bind(new.created_by)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict("mapping_name_taken".to_string()));
        }

        Ok(Mapping {
            id,
            name: new.name.clone(),
            description: new.description.clone(),
            action: new.action.clone(),
            reactions: new.reactions.clone(),
            is_active: new.is_active,
            created_by: new.created_by,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub async fn upsert_user_service_config(
        &self,
        user_id: i64,
        service: &str,
        config: &UserServiceConfig,
    ) -> Result<(), StoreError> {
        let now = now_utc();
        let credentials = to_json_text("credentials", &config.credentials)?;
        let settings = to_json_text("settings", &config.settings)?;

        sqlx::query(
            r#"
            INSERT INTO user_service_configs (
                id,
                user_id,
                service,
                credentials,
                settings,
                is_active,
                created_at,
                updated_at
            )
            VALUES (?, ?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(user_id, service) DO UPDATE SET
                credentials = excluded.credentials,
                settings = excluded.settings,
                is_active = 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(service)
        .bind(credentials)
        .bind(settings)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fails a `received` row that cannot be decoded so later batches move past it.
    async fn reject_event_row(&self, id: &str, err: &StoreError) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = 'failed',
                error_message = ?,
                processed_at = ?
            WHERE id = ?
              AND status = 'received'
            "#,
        )
        .bind(err.to_string())
        .bind(now_utc())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Permanent failures, newest first. Read by reporting surfaces, never by the engine.
    pub async fn list_failures(&self, limit: i64) -> Result<Vec<FailureRecord>, StoreError> {
        let rows = sqlx::query_as::<_, FailureRow>(
            r#"
            SELECT action_type, payload, error_message, retry_count, user_agent, created_at
            FROM webhook_failures
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FailureRow::try_into).collect()
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn find_by_status(
        &self,
        status: EventStatus,
        limit: i64,
    ) -> Result<Vec<Event>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM webhook_events \
             WHERE status = ? \
             ORDER BY created_at ASC, rowid ASC \
             LIMIT ?"
        ))
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone();
            match Event::try_from(row) {
                Ok(event) => events.push(event),
                Err(err) => {
                    warn!(event_id = %id, error = %err, "undecodable event row");
                    if status == EventStatus::Received {
                        self.reject_event_row(&id, &err).await?;
                    }
                }
            }
        }

        Ok(events)
    }

    async fn save_outcome(&self, outcome: &EventOutcome) -> Result<bool, StoreError> {
        ensure_terminal(outcome)?;

        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = ?,
                processing_time_ms = ?,
                error_message = ?,
                processed_at = ?
            WHERE id = ?
              AND status = 'received'
            "#,
        )
        .bind(outcome.status.as_str())
        .bind(outcome.processing_time_ms)
        .bind(outcome.error_message.as_deref())
        .bind(now_utc())
        .bind(outcome.event_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl MappingStore for SqliteStore {
    async fn find_active(
        &self,
        owner: i64,
        action_type: &str,
    ) -> Result<Vec<Mapping>, StoreError> {
        let rows = sqlx::query_as::<_, MappingRow>(&format!(
            "SELECT {MAPPING_COLUMNS} FROM webhook_configs \
             WHERE is_active = 1 AND created_by = ? AND action_type = ? \
             ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(owner)
        .bind(action_type)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MappingRow::try_into).collect()
    }

    async fn find_active_shared(&self, action_type: &str) -> Result<Vec<Mapping>, StoreError> {
        let rows = sqlx::query_as::<_, MappingRow>(&format!(
            "SELECT {MAPPING_COLUMNS} FROM webhook_configs \
             WHERE is_active = 1 AND action_type = ? \
             ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(action_type)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MappingRow::try_into).collect()
    }

    async fn find_one_active(&self, id: Uuid, owner: i64) -> Result<Option<Mapping>, StoreError> {
        let row = sqlx::query_as::<_, MappingRow>(&format!(
            "SELECT {MAPPING_COLUMNS} FROM webhook_configs \
             WHERE id = ? AND created_by = ? AND is_active = 1"
        ))
        .bind(id.to_string())
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MappingRow::try_into).transpose()
    }
}

#[async_trait]
impl ExecutionRecorder for SqliteStore {
    async fn create_pending(
        &self,
        event_id: Uuid,
        reaction_name: &str,
    ) -> Result<ReactionExecutionRecord, StoreError> {
        let id = Uuid::new_v4();
        let created_at = now_utc();

        sqlx::query(
            r#"
            INSERT INTO webhook_reactions (
                id,
                webhook_event_id,
                reaction_name,
                status,
                created_at
            )
            VALUES (?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(id.to_string())
        .bind(event_id.to_string())
        .bind(reaction_name)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        Ok(ReactionExecutionRecord {
            id,
            event_id,
            reaction_name: reaction_name.to_string(),
            status: ReactionExecutionStatus::Pending,
            output_data: None,
            error_message: None,
            execution_time_ms: None,
            executed_at: None,
            created_at,
        })
    }

    async fn finish(&self, record_id: Uuid, update: &ExecutionUpdate) -> Result<(), StoreError> {
        let output_data = match &update.output_data {
            Some(output) => Some(to_json_text("output data", output)?),
            None => None,
        };

        let result = sqlx::query(
            r#"
            UPDATE webhook_reactions
            SET status = ?,
                output_data = ?,
                error_message = ?,
                execution_time_ms = ?,
                executed_at = ?
            WHERE id = ?
              AND status = 'pending'
            "#,
        )
        .bind(update.status.as_str())
        .bind(output_data)
        .bind(update.error_message.as_deref())
        .bind(update.execution_time_ms)
        .bind(now_utc())
        .bind(record_id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict("execution_not_pending".to_string()));
        }

        Ok(())
    }

    async fn record_failure(&self, failure: &FailureRecord) -> Result<(), StoreError> {
        let payload = to_json_text("failure payload", &failure.payload)?;

        sqlx::query(
            r#"
            INSERT INTO webhook_failures (
                id,
                action_type,
                payload,
                error_message,
                retry_count,
                user_agent,
                created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&failure.action_type)
        .bind(payload)
        .bind(&failure.error_message)
        .bind(i64::from(failure.retry_count))
        .bind(failure.user_agent.as_deref())
        .bind(&failure.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_executions(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<ReactionExecutionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM webhook_reactions \
             WHERE webhook_event_id = ? \
             ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(event_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ExecutionRow::try_into).collect()
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn get_user_service_config(
        &self,
        user_id: i64,
        service: &str,
    ) -> Result<Option<UserServiceConfig>, StoreError> {
        let row = sqlx::query_as::<_, ServiceConfigRow>(
            r#"
            SELECT credentials, settings
            FROM user_service_configs
            WHERE user_id = ?
              AND service = ?
              AND is_active = 1
            "#,
        )
        .bind(user_id)
        .bind(service)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ServiceConfigRow::try_into).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    action_type: String,
    user_id: i64,
    mapping_id: Option<String>,
    source: Option<String>,
    external_id: Option<String>,
    payload: String,
    status: String,
    processing_time_ms: Option<i64>,
    user_agent: Option<String>,
    signature_verified: bool,
    error_message: Option<String>,
    created_at: String,
    processed_at: Option<String>,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            id: parse_uuid("event id", &row.id)?,
            action_type: row.action_type,
            user_id: row.user_id,
            mapping_id: row
                .mapping_id
                .as_deref()
                .map(|id| parse_uuid("mapping id", id))
                .transpose()?,
            source: row.source,
            external_id: row.external_id,
            payload: from_json_text("payload", &row.payload)?,
            status: parse_event_status(&row.status)?,
            processing_time_ms: row.processing_time_ms,
            error_message: row.error_message,
            user_agent: row.user_agent,
            signature_verified: row.signature_verified,
            created_at: row.created_at,
            processed_at: row.processed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MappingRow {
    id: String,
    name: String,
    description: Option<String>,
    action_type: String,
    action_config: String,
    reactions: String,
    is_active: bool,
    created_by: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<MappingRow> for Mapping {
    type Error = StoreError;

    fn try_from(row: MappingRow) -> Result<Self, Self::Error> {
        let config: Map<String, Value> = from_json_text("action config", &row.action_config)?;

        Ok(Mapping {
            id: parse_uuid("mapping id", &row.id)?,
            name: row.name,
            description: row.description,
            action: Action {
                kind: row.action_type,
                config,
            },
            reactions: from_json_text("reactions", &row.reactions)?,
            is_active: row.is_active,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: String,
    webhook_event_id: String,
    reaction_name: String,
    status: String,
    execution_time_ms: Option<i64>,
    error_message: Option<String>,
    output_data: Option<String>,
    executed_at: Option<String>,
    created_at: String,
}

impl TryFrom<ExecutionRow> for ReactionExecutionRecord {
    type Error = StoreError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        Ok(ReactionExecutionRecord {
            id: parse_uuid("execution id", &row.id)?,
            event_id: parse_uuid("event id", &row.webhook_event_id)?,
            reaction_name: row.reaction_name,
            status: parse_execution_status(&row.status)?,
            output_data: row
                .output_data
                .as_deref()
                .map(|raw| from_json_text("output data", raw))
                .transpose()?,
            error_message: row.error_message,
            execution_time_ms: row.execution_time_ms,
            executed_at: row.executed_at,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FailureRow {
    action_type: Option<String>,
    payload: Option<String>,
    error_message: String,
    retry_count: i64,
    user_agent: Option<String>,
    created_at: String,
}

impl TryFrom<FailureRow> for FailureRecord {
    type Error = StoreError;

    fn try_from(row: FailureRow) -> Result<Self, Self::Error> {
        let payload = match row.payload.as_deref() {
            Some(raw) => from_json_text("failure payload", raw)?,
            None => Value::Null,
        };
        let retry_count = u32::try_from(row.retry_count)
            .map_err(|err| StoreError::Parse(format!("invalid retry count: {err}")))?;

        Ok(FailureRecord {
            action_type: row.action_type.unwrap_or_default(),
            payload,
            error_message: row.error_message,
            retry_count,
            user_agent: row.user_agent,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ServiceConfigRow {
    credentials: String,
    settings: String,
}

impl TryFrom<ServiceConfigRow> for UserServiceConfig {
    type Error = StoreError;

    fn try_from(row: ServiceConfigRow) -> Result<Self, Self::Error> {
        let credentials: BTreeMap<String, String> =
            from_json_text("credentials", &row.credentials)?;
        let settings: Map<String, Value> = from_json_text("settings", &row.settings)?;
        Ok(UserServiceConfig {
            credentials,
            settings,
        })
    }
}

fn parse_event_status(status: &str) -> Result<EventStatus, StoreError> {
    match status {
        "received" => Ok(EventStatus::Received),
        "completed" => Ok(EventStatus::Completed),
        "failed" => Ok(EventStatus::Failed),
        other => Err(StoreError::Parse(format!("unknown event status: {other}"))),
    }
}

fn parse_execution_status(status: &str) -> Result<ReactionExecutionStatus, StoreError> {
    match status {
        "pending" => Ok(ReactionExecutionStatus::Pending),
        "completed" => Ok(ReactionExecutionStatus::Completed),
        "failed" => Ok(ReactionExecutionStatus::Failed),
        other => Err(StoreError::Parse(format!(
            "unknown execution status: {other}"
        ))),
    }
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(value).map_err(|err| StoreError::Parse(format!("invalid {field}: {err}")))
}

fn to_json_text<T: serde::Serialize + ?Sized>(
    field: &str,
    value: &T,
) -> Result<String, StoreError> {
    serde_json::to_string(value)
        .map_err(|err| StoreError::Parse(format!("invalid {field} JSON: {err}")))
}

fn from_json_text<T: serde::de::DeserializeOwned>(
    field: &str,
    raw: &str,
) -> Result<T, StoreError> {
    serde_json::from_str(raw)
        .map_err(|err| StoreError::Parse(format!("invalid {field} JSON: {err}")))
}
