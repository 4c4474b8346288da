//! PostgreSQL proposal repository, the system of record.
//!
//! Columns are read back in their relational shape: decimals and dates as
//! text, timestamps as RFC 3339 strings in UTC, JSON array columns as the
//! raw stored text. Coercion to the document shape happens in the sync
//! engine, never here.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use errors::{StoreKind, SyncError};
use proposal_core::{
    FieldKind, OwnerDirectory, ProposalField, ProposalId, RecordRepository, RelationalRow,
    SyncOperation
};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Pool, Postgres, QueryBuilder, Row};
use std::time::Duration;

pub struct PostgresProposalRepository {
    pool: Pool<Postgres>
}

fn unavailable(operation: &'static str) -> impl FnOnce(sqlx::Error) -> SyncError {
    move |e| SyncError::unavailable(StoreKind::Relational, operation, e)
}

impl PostgresProposalRepository {
    pub async fn new(connection_url: &str) -> Result<Self, SyncError> {
        let pool = Pool::connect(connection_url)
            .await
            .map_err(unavailable("connect"))?;
        Ok(Self { pool })
    }

    pub async fn connect(config: &config::PostgresConfig) -> Result<Self, SyncError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.timeout_seconds))
            .connect(&config.connection_url())
            .await
            .map_err(unavailable("connect"))?;
        tracing::info!(host = %config.host, database = %config.database, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    pub async fn initialize_schema(&self) -> Result<(), SyncError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS organizations (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                owner_email TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )"
        )
        .execute(&self.pool)
        .await
        .map_err(unavailable("initialize_schema"))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS proposals (
                id BIGSERIAL PRIMARY KEY,
                organization_id BIGINT,
                organization_name TEXT,
                organization_type TEXT,
                contact_person TEXT,
                contact_email TEXT,
                contact_phone TEXT,
                event_name TEXT,
                event_description TEXT,
                event_start_date DATE,
                event_end_date DATE,
                venue TEXT,
                event_mode TEXT,
                expected_participants INTEGER,
                budget NUMERIC(14, 2),
                sdg_goals TEXT,
                objectives TEXT,
                proposal_status TEXT NOT NULL DEFAULT 'draft',
                admin_comments TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )"
        )
        .execute(&self.pool)
        .await
        .map_err(unavailable("initialize_schema"))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_proposals_organization_id ON proposals(organization_id)"
        )
        .execute(&self.pool)
        .await
        .map_err(unavailable("initialize_schema"))?;

        Ok(())
    }

    /// Registers or renames the owner profile of an organization.
    pub async fn register_organization(&self, id: i64, name: &str) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO organizations (id, name) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name"
        )
        .bind(id)
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(unavailable("register_organization"))?;
        Ok(())
    }

    fn select_list() -> String {
        ProposalField::all()
            .map(|field| {
                let column = field.column();
                match field.kind() {
                    FieldKind::Integer => format!("{column}::BIGINT AS {column}"),
                    FieldKind::Decimal | FieldKind::Date => format!("{column}::TEXT AS {column}"),
                    _ => column.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Validates that every column of `row` is a known, writable proposal
    /// column. The id is addressed separately and never written.
    fn assignments(row: &RelationalRow) -> Result<Vec<(ProposalField, &Value)>, SyncError> {
        row.fields()
            .iter()
            .filter(|(column, _)| column.as_str() != ProposalField::Id.column())
            .map(|(column, value)| {
                ProposalField::from_column(column)
                    .map(|field| (field, value))
                    .ok_or_else(|| SyncError::validation(column.clone(), "unknown proposal column"))
            })
            .collect()
    }
}

fn decode_row(row: &PgRow) -> Result<RelationalRow, SyncError> {
    let mut out = RelationalRow::new();
    for field in ProposalField::all() {
        let column = field.column();
        let value = match field.kind() {
            FieldKind::Integer => row
                .try_get::<Option<i64>, _>(column)
                .map(|v| v.map_or(Value::Null, Value::from)),
            FieldKind::Timestamp => row
                .try_get::<Option<DateTime<Utc>>, _>(column)
                .map(|v| {
                    v.map_or(Value::Null, |at| {
                        Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true))
                    })
                }),
            _ => row
                .try_get::<Option<String>, _>(column)
                .map(|v| v.map_or(Value::Null, Value::String))
        }
        .map_err(|e| errors::MappingError::new(column, e.to_string()))?;
        out.insert(column, value);
    }
    Ok(out)
}

fn text(field: ProposalField, value: &Value) -> Result<String, SyncError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Array(_) | Value::Object(_) if field.kind() == FieldKind::JsonArray => {
            Ok(value.to_string())
        }
        other => Err(SyncError::validation(
            field.column(),
            format!("cannot store {other} as text")
        ))
    }
}

fn push_value(
    builder: &mut QueryBuilder<'_, Postgres>,
    field: ProposalField,
    value: &Value
) -> Result<(), SyncError> {
    if value.is_null() {
        builder.push("NULL");
        return Ok(());
    }
    match field.kind() {
        FieldKind::Integer => {
            let number = value
                .as_i64()
                .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
                .ok_or_else(|| SyncError::validation(field.column(), format!("expected integer, got {value}")))?;
            builder.push_bind(number);
        }
        FieldKind::Decimal => {
            builder.push_bind(text(field, value)?).push("::NUMERIC");
        }
        FieldKind::Date => {
            builder.push_bind(text(field, value)?).push("::DATE");
        }
        FieldKind::Timestamp => {
            builder.push_bind(text(field, value)?).push("::TIMESTAMPTZ");
        }
        FieldKind::Text | FieldKind::JsonArray => {
            builder.push_bind(text(field, value)?);
        }
    }
    Ok(())
}

#[async_trait]
impl RecordRepository for PostgresProposalRepository {
    #[tracing::instrument(skip(self), fields(record_id = %id))]
    async fn get_by_id(&self, id: ProposalId) -> Result<Option<RelationalRow>, SyncError> {
        let sql = format!("SELECT {} FROM proposals WHERE id = $1", Self::select_list());
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable("get_by_id"))?;
        row.as_ref().map(decode_row).transpose()
    }

    #[tracing::instrument(skip(self, row), fields(record_id = %id))]
    async fn upsert(&self, id: ProposalId, row: &RelationalRow) -> Result<SyncOperation, SyncError> {
        let assignments = Self::assignments(row)?;

        let mut builder = QueryBuilder::<Postgres>::new("INSERT INTO proposals (id");
        for (field, _) in &assignments {
            builder.push(", ").push(field.column());
        }
        builder.push(") VALUES (").push_bind(id.get());
        for (field, value) in &assignments {
            builder.push(", ");
            push_value(&mut builder, *field, value)?;
        }
        builder.push(") ON CONFLICT (id) DO UPDATE SET ");
        if assignments.is_empty() {
            builder.push("id = EXCLUDED.id");
        }
        for (i, (field, _)) in assignments.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder
                .push(field.column())
                .push(" = EXCLUDED.")
                .push(field.column());
        }
        builder.push(" RETURNING (xmax = 0) AS inserted");

        let inserted: bool = builder
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable("upsert"))?
            .try_get("inserted")
            .map_err(unavailable("upsert"))?;

        Ok(if inserted {
            SyncOperation::Insert
        } else {
            SyncOperation::Update
        })
    }

    #[tracing::instrument(skip(self, row), fields(record_id = %id))]
    async fn update_fields(
        &self,
        id: ProposalId,
        row: &RelationalRow
    ) -> Result<SyncOperation, SyncError> {
        let assignments = Self::assignments(row)?;
        if assignments.is_empty() {
            return Ok(SyncOperation::Noop);
        }

        let mut builder = QueryBuilder::<Postgres>::new("UPDATE proposals SET ");
        for (i, (field, value)) in assignments.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder.push(field.column()).push(" = ");
            push_value(&mut builder, *field, value)?;
        }
        if !assignments
            .iter()
            .any(|(field, _)| *field == ProposalField::UpdatedAt)
        {
            builder.push(", updated_at = now()");
        }
        builder.push(" WHERE id = ").push_bind(id.get());

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(unavailable("update_fields"))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::not_found(StoreKind::Relational, id));
        }
        Ok(SyncOperation::Update)
    }

    async fn list_ids(&self, organization_id: Option<i64>) -> Result<Vec<ProposalId>, SyncError> {
        let ids: Vec<i64> = match organization_id {
            Some(org) => sqlx::query_scalar(
                "SELECT id FROM proposals WHERE organization_id = $1 ORDER BY id"
            )
            .bind(org)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query_scalar("SELECT id FROM proposals ORDER BY id")
                .fetch_all(&self.pool)
                .await
        }
        .map_err(unavailable("list_ids"))?;

        ids.into_iter().map(ProposalId::new).collect()
    }

    async fn organization_names(
        &self,
        organization_id: i64
    ) -> Result<Vec<(ProposalId, Option<String>)>, SyncError> {
        let rows = sqlx::query(
            "SELECT id, organization_name FROM proposals
             WHERE organization_id = $1
             ORDER BY created_at DESC, id DESC"
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable("organization_names"))?;

        rows.iter()
            .map(|row| {
                let id: i64 = row
                    .try_get("id")
                    .map_err(unavailable("organization_names"))?;
                let name: Option<String> = row
                    .try_get("organization_name")
                    .map_err(unavailable("organization_names"))?;
                Ok((ProposalId::new(id)?, name))
            })
            .collect()
    }
}

#[async_trait]
impl OwnerDirectory for PostgresProposalRepository {
    async fn organization_name(&self, organization_id: i64) -> Result<Option<String>, SyncError> {
        sqlx::query_scalar("SELECT name FROM organizations WHERE id = $1")
            .bind(organization_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable("organization_name"))
    }
}
