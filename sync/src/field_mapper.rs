//! Translation between the relational and the document shape of a proposal.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use errors::MappingError;
use proposal_core::{DocumentRecord, FieldKind, FieldMap, ProposalField, ProposalId, RelationalRow};
use serde_json::{Number, Value};
use std::collections::HashSet;

/// Bidirectional field mapper driven by the [`ProposalField`] table.
///
/// Pure and total over the known fields; unknown fields pass through
/// unchanged in both directions.
#[derive(Debug, Clone)]
pub struct FieldMapper {
    _checked: ()
}

impl FieldMapper {
    /// Builds a mapper after checking the field table is a bijection on both
    /// sides.
    pub fn new() -> Result<Self, MappingError> {
        let mut columns = HashSet::new();
        let mut documents = HashSet::new();
        for field in ProposalField::all() {
            if !columns.insert(field.column()) {
                return Err(MappingError::new(field.column(), "duplicate column name"));
            }
            if !documents.insert(field.document_field()) {
                return Err(MappingError::new(
                    field.document_field(),
                    "duplicate document field name"
                ));
            }
        }
        Ok(Self { _checked: () })
    }

    pub fn to_document(&self, row: &RelationalRow) -> Result<DocumentRecord, MappingError> {
        let mut out = FieldMap::new();
        for (column, value) in row.fields() {
            match ProposalField::from_column(column) {
                Some(field) => {
                    out.insert(
                        field.document_field().to_string(),
                        to_document_value(field, value)?
                    );
                }
                None => {
                    out.insert(column.clone(), value.clone());
                }
            }
        }
        Ok(DocumentRecord::from(out))
    }

    /// The document a relational row should be mirrored as, keyed by `id`
    /// whether or not the row carries its own id column.
    pub fn mirror(&self, id: ProposalId, row: &RelationalRow) -> Result<DocumentRecord, MappingError> {
        let mut document = self.to_document(row)?;
        document.insert(
            ProposalField::Id.document_field(),
            Value::String(id.document_key())
        );
        Ok(document)
    }

    pub fn to_relational(&self, document: &DocumentRecord) -> Result<RelationalRow, MappingError> {
        let mut out = FieldMap::new();
        for (name, value) in document.fields() {
            match ProposalField::from_document_field(name) {
                Some(field) => {
                    out.insert(field.column().to_string(), to_relational_value(field, value)?);
                }
                None => {
                    out.insert(name.clone(), value.clone());
                }
            }
        }
        Ok(RelationalRow::from(out))
    }
}

fn to_document_value(field: ProposalField, value: &Value) -> Result<Value, MappingError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match field.kind() {
        FieldKind::Integer if field == ProposalField::Id => {
            Ok(Value::String(integer(field, value)?.to_string()))
        }
        FieldKind::Integer => Ok(Value::from(integer(field, value)?)),
        FieldKind::Text => text(field, value),
        FieldKind::Decimal => match decimal(field, value)? {
            Some(amount) => Number::from_f64(amount)
                .map(Value::Number)
                .ok_or_else(|| MappingError::new(field.column(), "decimal is not finite")),
            None => Ok(Value::Null)
        },
        FieldKind::Date => Ok(match date(field, value)? {
            Some(day) => Value::String(format!("{}T00:00:00.000Z", day.format("%Y-%m-%d"))),
            None => Value::Null
        }),
        FieldKind::Timestamp => Ok(match timestamp(field, value)? {
            Some(at) => Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => Value::Null
        }),
        FieldKind::JsonArray => Ok(Value::Array(array(field, value)?))
    }
}

fn to_relational_value(field: ProposalField, value: &Value) -> Result<Value, MappingError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match field.kind() {
        FieldKind::Integer => Ok(Value::from(integer(field, value)?)),
        FieldKind::Text => text(field, value),
        FieldKind::Decimal => Ok(match decimal(field, value)? {
            Some(amount) => Value::String(format!("{amount:.2}")),
            None => Value::Null
        }),
        FieldKind::Date => Ok(match date(field, value)? {
            Some(day) => Value::String(day.format("%Y-%m-%d").to_string()),
            None => Value::Null
        }),
        FieldKind::Timestamp => Ok(match timestamp(field, value)? {
            Some(at) => Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => Value::Null
        }),
        FieldKind::JsonArray => {
            let items = array(field, value)?;
            serde_json::to_string(&items)
                .map(Value::String)
                .map_err(|e| MappingError::new(field.column(), e.to_string()))
        }
    }
}

fn integer(field: ProposalField, value: &Value) -> Result<i64, MappingError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| f as i64)
            })
            .ok_or_else(|| MappingError::new(field.column(), format!("not an integer: {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| MappingError::new(field.column(), format!("not an integer: {s:?}"))),
        other => Err(MappingError::new(
            field.column(),
            format!("expected integer, found {}", kind_name(other))
        ))
    }
}

fn text(field: ProposalField, value: &Value) -> Result<Value, MappingError> {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        other => Err(MappingError::new(
            field.column(),
            format!("expected text, found {}", kind_name(other))
        ))
    }
}

fn decimal(field: ProposalField, value: &Value) -> Result<Option<f64>, MappingError> {
    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        other => {
            return Err(MappingError::new(
                field.column(),
                format!("expected decimal, found {}", kind_name(other))
            ));
        }
    };
    match amount {
        Some(a) if a.is_finite() => Ok(Some(a)),
        _ => Err(MappingError::new(
            field.column(),
            format!("not a decimal: {value}")
        ))
    }
}

fn date(field: ProposalField, value: &Value) -> Result<Option<NaiveDate>, MappingError> {
    let Value::String(raw) = value else {
        return Err(MappingError::new(
            field.column(),
            format!("expected date string, found {}", kind_name(value))
        ));
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Some(day));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|at| Some(at.with_timezone(&Utc).date_naive()))
        .map_err(|_| MappingError::new(field.column(), format!("not an ISO date: {raw:?}")))
}

fn timestamp(field: ProposalField, value: &Value) -> Result<Option<DateTime<Utc>>, MappingError> {
    let Value::String(raw) = value else {
        return Err(MappingError::new(
            field.column(),
            format!("expected timestamp string, found {}", kind_name(value))
        ));
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(at.with_timezone(&Utc)));
    }
    // Naive SQL timestamps are stored in UTC.
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(|_| MappingError::new(field.column(), format!("not a timestamp: {raw:?}")))
}

fn array(field: ProposalField, value: &Value) -> Result<Vec<Value>, MappingError> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::String(s) if s.trim().is_empty() => Ok(Vec::new()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => Ok(items),
            Ok(other) => Err(MappingError::new(
                field.column(),
                format!("expected JSON array, found {}", kind_name(&other))
            )),
            Err(e) => Err(MappingError::new(
                field.column(),
                format!("malformed JSON: {e}")
            ))
        },
        other => Err(MappingError::new(
            field.column(),
            format!("expected JSON array, found {}", kind_name(other))
        ))
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object"
    }
}
