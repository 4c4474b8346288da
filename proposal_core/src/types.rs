use chrono::{DateTime, Utc};
use errors::{ErrorKind, SyncError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field name to value map used by both record representations.
pub type FieldMap = serde_json::Map<String, Value>;

/// Relational primary key of a proposal, and the only proposal identity.
///
/// The document store addresses the same proposal by the decimal string form
/// of this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct ProposalId(i64);

impl ProposalId {
    pub fn new(value: i64) -> Result<Self, SyncError> {
        if value <= 0 {
            return Err(SyncError::validation(
                "id",
                format!("proposal id must be positive, got {value}")
            ));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }

    pub fn document_key(self) -> String {
        self.0.to_string()
    }

    pub fn from_document_key(key: &str) -> Result<Self, SyncError> {
        key.trim().parse()
    }
}

impl TryFrom<i64> for ProposalId {
    type Error = SyncError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProposalId> for i64 {
    fn from(id: ProposalId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ProposalId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .parse::<i64>()
            .map_err(|_| SyncError::validation("id", format!("not a proposal id: {s:?}")))?;
        Self::new(value)
    }
}

/// A proposal row as the relational store holds it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationalRow(FieldMap);

impl RelationalRow {
    pub fn new() -> Self {
        Self(FieldMap::new())
    }

    pub fn fields(&self) -> &FieldMap {
        &self.0
    }

    pub fn fields_mut(&mut self) -> &mut FieldMap {
        &mut self.0
    }

    pub fn into_fields(self) -> FieldMap {
        self.0
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(column.into(), value)
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    pub fn id(&self) -> Option<i64> {
        match self.0.get("id")? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None
        }
    }

    pub fn organization_name(&self) -> Option<&str> {
        self.0.get("organization_name").and_then(Value::as_str)
    }
}

impl From<FieldMap> for RelationalRow {
    fn from(fields: FieldMap) -> Self {
        Self(fields)
    }
}

/// A proposal mirror as the document store holds it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentRecord(FieldMap);

impl DocumentRecord {
    /// Stamped whenever the relational side overwrites the document.
    pub const LAST_SYNCED_FROM_RELATIONAL: &'static str = "lastSyncedFromRelational";
    /// Stamped whenever the document side is written back into the relational store.
    pub const LAST_SYNCED_TO_RELATIONAL: &'static str = "lastSyncedToRelational";

    pub fn new() -> Self {
        Self(FieldMap::new())
    }

    pub fn fields(&self) -> &FieldMap {
        &self.0
    }

    pub fn fields_mut(&mut self) -> &mut FieldMap {
        &mut self.0
    }

    pub fn into_fields(self) -> FieldMap {
        self.0
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn proposal_id(&self) -> Option<&str> {
        self.0.get("proposalId").and_then(Value::as_str)
    }

    pub fn last_synced_from_relational(&self) -> Option<&str> {
        self.0
            .get(Self::LAST_SYNCED_FROM_RELATIONAL)
            .and_then(Value::as_str)
    }

    pub fn last_synced_to_relational(&self) -> Option<&str> {
        self.0
            .get(Self::LAST_SYNCED_TO_RELATIONAL)
            .and_then(Value::as_str)
    }

    pub fn stamp_synced_from_relational(&mut self, at: DateTime<Utc>) {
        self.stamp(Self::LAST_SYNCED_FROM_RELATIONAL, at);
    }

    pub fn stamp_synced_to_relational(&mut self, at: DateTime<Utc>) {
        self.stamp(Self::LAST_SYNCED_TO_RELATIONAL, at);
    }

    fn stamp(&mut self, field: &str, at: DateTime<Utc>) {
        self.0.insert(
            field.to_string(),
            Value::String(at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        );
    }
}

impl From<FieldMap> for DocumentRecord {
    fn from(fields: FieldMap) -> Self {
        Self(fields)
    }
}

/// One field whose values differ between the two stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDifference {
    pub field: String,
    pub relational_value: Value,
    pub document_value: Value
}

impl FieldDifference {
    /// Pseudo-field reported when one side of the pair is missing entirely.
    pub const EXISTENCE: &'static str = "existence";

    pub fn new(field: impl Into<String>, relational_value: Value, document_value: Value) -> Self {
        Self {
            field: field.into(),
            relational_value,
            document_value
        }
    }

    pub fn existence(relational_exists: bool, document_exists: bool) -> Self {
        Self::new(
            Self::EXISTENCE,
            Value::Bool(relational_exists),
            Value::Bool(document_exists)
        )
    }
}

/// How two field values are judged equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EqualityMode {
    /// JSON value equality: arrays and objects compare element by element.
    #[default]
    Structural,
    /// Compare the serialized JSON text of each value.
    Serialized
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Insert,
    Update,
    Noop
}

impl std::fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOperation::Insert => write!(f, "insert"),
            SyncOperation::Update => write!(f, "update"),
            SyncOperation::Noop => write!(f, "noop")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    RelationalToDocument,
    DocumentToRelational,
    Bidirectional
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncDirection::RelationalToDocument => write!(f, "relational_to_document"),
            SyncDirection::DocumentToRelational => write!(f, "document_to_relational"),
            SyncDirection::Bidirectional => write!(f, "bidirectional")
        }
    }
}

impl std::str::FromStr for SyncDirection {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "relational_to_document" | "to_document" | "sql_to_mongo" => {
                Ok(SyncDirection::RelationalToDocument)
            }
            "document_to_relational" | "to_relational" | "mongo_to_sql" => {
                Ok(SyncDirection::DocumentToRelational)
            }
            "bidirectional" | "both" => Ok(SyncDirection::Bidirectional),
            _ => Err(SyncError::validation(
                "direction",
                format!(
                    "unsupported sync direction {s:?}; valid options: relational_to_document, \
                     document_to_relational, bidirectional"
                )
            ))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    RelationalWins
}

impl std::fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictStrategy::RelationalWins => write!(f, "relational_wins")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedField {
    pub field: String,
    pub old_value: Value,
    pub new_value: Value
}

/// Audit record of a conflict resolution: per field, what the document held
/// and what it was overwritten with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResolution {
    pub record_id: ProposalId,
    pub strategy: ConflictStrategy,
    pub fields: Vec<ResolvedField>,
    pub resolved_at: DateTime<Utc>
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub operation: SyncOperation,
    pub direction: SyncDirection,
    pub record_id: ProposalId,
    pub timestamp: DateTime<Utc>,
    /// Semantic differences observed on the target before it was written.
    pub differences: Vec<FieldDifference>,
    pub resolution: Option<ConflictResolution>,
    /// Set when the document store is not configured and nothing was done.
    pub degraded: bool
}

impl SyncResult {
    pub fn new(operation: SyncOperation, direction: SyncDirection, record_id: ProposalId) -> Self {
        Self {
            operation,
            direction,
            record_id,
            timestamp: Utc::now(),
            differences: Vec::new(),
            resolution: None,
            degraded: false
        }
    }

    pub fn degraded(direction: SyncDirection, record_id: ProposalId) -> Self {
        Self {
            degraded: true,
            ..Self::new(SyncOperation::Noop, direction, record_id)
        }
    }

    pub fn with_differences(mut self, differences: Vec<FieldDifference>) -> Self {
        self.differences = differences;
        self
    }

    pub fn with_resolution(mut self, resolution: ConflictResolution) -> Self {
        self.resolution = Some(resolution);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemError {
    pub record_id: i64,
    pub kind: ErrorKind,
    pub message: String
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<SyncResult>,
    pub errors: Vec<BatchItemError>
}

/// Where a proposal pair stands relative to the two stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordPairState {
    Absent,
    RelationalOnly,
    DocumentOnly,
    Consistent,
    Conflicting
}

impl RecordPairState {
    pub fn classify(relational_exists: bool, document_exists: bool, has_differences: bool) -> Self {
        match (relational_exists, document_exists) {
            (false, false) => RecordPairState::Absent,
            (true, false) => RecordPairState::RelationalOnly,
            (false, true) => RecordPairState::DocumentOnly,
            (true, true) if has_differences => RecordPairState::Conflicting,
            (true, true) => RecordPairState::Consistent
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub record_id: ProposalId,
    pub relational_exists: bool,
    pub document_exists: bool,
    pub state: RecordPairState,
    pub differences: Vec<FieldDifference>,
    pub passed: bool,
    pub degraded: bool,
    pub checked_at: DateTime<Utc>
}

/// Records present on one side only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OrphanScan {
    pub organization_id: Option<i64>,
    pub relational_only: Vec<ProposalId>,
    pub document_only: Vec<ProposalId>,
    /// Document ids that are not the string form of any valid proposal id.
    pub unparseable_document_ids: Vec<String>,
    pub degraded: bool
}

impl OrphanScan {
    pub fn is_clean(&self) -> bool {
        !self.degraded
            && self.relational_only.is_empty()
            && self.document_only.is_empty()
            && self.unparseable_document_ids.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameSource {
    OwnerProfile,
    LatestProposal,
    Default
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameMismatch {
    pub record_id: ProposalId,
    pub stored_name: Option<String>
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationConsistencySummary {
    pub organization_id: i64,
    pub canonical_name: String,
    pub name_source: NameSource,
    pub relational_count: u64,
    pub document_count: Option<u64>,
    pub count_mismatch: bool,
    pub name_mismatches: Vec<NameMismatch>,
    pub recommendations: Vec<String>,
    pub consistent: bool
}
