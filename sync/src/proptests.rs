use crate::conflict::ConflictResolver;
use crate::difference::DifferenceDetector;
use crate::field_mapper::FieldMapper;
use proposal_core::{DocumentRecord, FieldDifference, ProposalId, RelationalRow};
use proptest::prelude::*;
use serde_json::{Value, json};

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[a-z ]{0,12}".prop_map(Value::String),
    ]
}

fn differences() -> impl Strategy<Value = Vec<FieldDifference>> {
    prop::collection::btree_map("[a-z_]{1,10}", (scalar(), scalar()), 0..8).prop_map(|fields| {
        fields
            .into_iter()
            .map(|(field, (ours, theirs))| FieldDifference::new(field, ours, theirs))
            .collect()
    })
}

proptest! {
    #[test]
    fn test_resolution_is_deterministic(diffs in differences(), raw_id in 1i64..10_000) {
        let resolver = ConflictResolver::default();
        let id = ProposalId::new(raw_id).unwrap();

        let first = resolver.resolve(id, &diffs);
        let second = resolver.resolve(id, &diffs);
        prop_assert_eq!(first.fields, second.fields);
    }

    #[test]
    fn test_applied_resolution_leaves_no_differences(diffs in differences()) {
        let resolver = ConflictResolver::default();
        let detector = DifferenceDetector::default();
        let id = ProposalId::new(1).unwrap();

        let mut relational = DocumentRecord::new();
        let mut document = DocumentRecord::new();
        for diff in &diffs {
            relational.insert(diff.field.clone(), diff.relational_value.clone());
            document.insert(diff.field.clone(), diff.document_value.clone());
        }

        let found = detector.compare(relational.fields(), document.fields());
        let resolution = resolver.resolve(id, &found);
        resolver.apply(&resolution, &mut document);

        prop_assert!(detector.compare(relational.fields(), document.fields()).is_empty());
    }

    #[test]
    fn test_mapping_round_trip_is_stable(
        budget_cents in 0i64..100_000_000,
        participants in 0i64..100_000,
        goals in prop::collection::vec("[A-Za-z0-9 ]{1,10}", 0..5),
        day in 1u32..28,
    ) {
        let mapper = FieldMapper::new().unwrap();
        let row = RelationalRow::new()
            .with("id", 5)
            .with("budget", format!("{}.{:02}", budget_cents / 100, budget_cents % 100))
            .with("expected_participants", participants)
            .with("sdg_goals", serde_json::to_string(&goals).unwrap())
            .with("event_start_date", format!("2025-04-{day:02}"));

        let document = mapper.to_document(&row).unwrap();
        let back = mapper.to_relational(&document).unwrap();

        prop_assert_eq!(back.get("budget"), row.get("budget"));
        prop_assert_eq!(back.get("event_start_date"), row.get("event_start_date"));
        prop_assert_eq!(mapper.to_document(&back).unwrap(), document);
    }
}
