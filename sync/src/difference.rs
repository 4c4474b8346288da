use proposal_core::{DocumentRecord, EqualityMode, FieldDifference, FieldMap};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};

/// Field-by-field comparison of two records in document shape.
///
/// A key missing on one side compares as `null`; ignored fields are never
/// reported. Output is sorted by field name.
#[derive(Debug, Clone)]
pub struct DifferenceDetector {
    ignore: HashSet<String>,
    mode: EqualityMode,
}

impl Default for DifferenceDetector {
    fn default() -> Self {
        Self::new(
            [
                DocumentRecord::LAST_SYNCED_FROM_RELATIONAL,
                DocumentRecord::LAST_SYNCED_TO_RELATIONAL,
                "_id",
            ],
            EqualityMode::Structural,
        )
    }
}

impl DifferenceDetector {
    pub fn new<I, S>(ignore: I, mode: EqualityMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignore: ignore.into_iter().map(Into::into).collect(),
            mode,
        }
    }

    pub fn from_config(config: &config::SyncConfig) -> Self {
        Self::new(config.ignore_fields.iter().cloned(), config.equality_mode)
    }

    pub fn mode(&self) -> EqualityMode {
        self.mode
    }

    pub fn is_ignored(&self, field: &str) -> bool {
        self.ignore.contains(field)
    }

    /// Compares the relational side (already mapped to document shape) with
    /// the document side.
    pub fn compare(&self, relational: &FieldMap, document: &FieldMap) -> Vec<FieldDifference> {
        let keys: BTreeSet<&String> = relational
            .keys()
            .chain(document.keys())
            .filter(|key| !self.is_ignored(key))
            .collect();

        keys.into_iter()
            .filter_map(|key| {
                let ours = relational.get(key).unwrap_or(&Value::Null);
                let theirs = document.get(key).unwrap_or(&Value::Null);
                (!self.values_equal(ours, theirs))
                    .then(|| FieldDifference::new(key.clone(), ours.clone(), theirs.clone()))
            })
            .collect()
    }

    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        match self.mode {
            EqualityMode::Structural => structural_eq(a, b),
            EqualityMode::Serialized => a.to_string() == b.to_string(),
        }
    }
}

/// JSON equality where numbers compare by value, so `1500` equals `1500.0`.
fn structural_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| structural_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| structural_eq(x, y)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_equal_records_have_no_differences() {
        let detector = DifferenceDetector::default();
        let a = map(json!({"proposalId": "1", "sdg_goals": ["SDG 4"], "budget": 10.5}));
        assert!(detector.compare(&a, &a.clone()).is_empty());
    }

    #[test]
    fn test_missing_key_compares_as_null() {
        let detector = DifferenceDetector::default();
        let a = map(json!({"venue": null, "event_name": "Expo"}));
        let b = map(json!({"event_name": "Expo", "extra": 1}));

        let diffs = detector.compare(&a, &b);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].field, "extra");
        assert_eq!(diffs[0].relational_value, Value::Null);
        assert_eq!(diffs[0].document_value, json!(1));
    }

    #[test]
    fn test_ignored_fields_are_skipped() {
        let detector = DifferenceDetector::default();
        let a = map(json!({"lastSyncedFromRelational": "2025-01-01T00:00:00.000Z"}));
        let b = map(json!({"lastSyncedFromRelational": "2025-02-01T00:00:00.000Z", "_id": "x"}));
        assert!(detector.compare(&a, &b).is_empty());
    }

    #[test]
    fn test_differences_sorted_by_field() {
        let detector = DifferenceDetector::default();
        let a = map(json!({"venue": "A", "budget": 1, "event_name": "X"}));
        let b = map(json!({"venue": "B", "budget": 2, "event_name": "Y"}));

        let fields: Vec<_> = detector
            .compare(&a, &b)
            .into_iter()
            .map(|d| d.field)
            .collect();
        assert_eq!(fields, vec!["budget", "event_name", "venue"]);
    }

    #[test]
    fn test_structural_mode_compares_numbers_by_value() {
        let detector = DifferenceDetector::default();
        assert!(detector.values_equal(&json!(1500), &json!(1500.0)));
        assert!(detector.values_equal(&json!([1, {"a": 2}]), &json!([1.0, {"a": 2.0}])));
        assert!(!detector.values_equal(&json!(["a", "b"]), &json!(["b", "a"])));
    }

    #[test]
    fn test_serialized_mode_compares_text() {
        let detector = DifferenceDetector::new(Vec::<String>::new(), EqualityMode::Serialized);
        assert!(!detector.values_equal(&json!(1500), &json!(1500.0)));
        assert!(detector.values_equal(&json!({"a": [1, 2]}), &json!({"a": [1, 2]})));
    }

    #[test]
    fn test_from_config_uses_configured_ignore_set() {
        let mut config = config::SyncConfig::default();
        config.ignore_fields = vec!["updated_at".to_string()];
        let detector = DifferenceDetector::from_config(&config);

        assert!(detector.is_ignored("updated_at"));
        assert!(!detector.is_ignored("lastSyncedFromRelational"));
    }
}
