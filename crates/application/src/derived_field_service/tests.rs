use std::collections::BTreeSet;
use std::sync::Arc;

use dynapp_core::AppId;
use dynapp_domain::{
    AppSchema, FieldDefinition, FieldType, FormulaConfig, FormulaFormat, LookupConfig,
    LookupCopyField, RecordData, RelatedRecordsConfig,
};
use serde_json::{Value, json};

use crate::test_fakes::{FakeRecordStore, field, number, text};

use super::{DerivedFieldService, LookupError, format_calculated_fields};

fn customer_lookup() -> LookupConfig {
    LookupConfig {
        lookup_app_code: "customers".to_owned(),
        lookup_key_field: "code".to_owned(),
        lookup_copy_fields: vec![
            LookupCopyField {
                source_field: "name".to_owned(),
                target_field: "customer_name".to_owned(),
            },
            LookupCopyField {
                source_field: "discount".to_owned(),
                target_field: "discount".to_owned(),
            },
        ],
    }
}

fn calculated(code: &str, formula: &str, format: FormulaFormat) -> FieldDefinition {
    field(
        code,
        FieldType::Calculated(FormulaConfig {
            formula: formula.to_owned(),
            formula_format: format,
            formula_decimals: 2,
        }),
    )
}

fn orders_schema() -> AppSchema {
    AppSchema::new(
        AppId::new(),
        "orders",
        false,
        vec![
            field("customer", FieldType::Lookup(customer_lookup())),
            text("customer_name"),
            number("discount"),
            number("qty"),
            number("price"),
            number("shipping"),
            calculated("total", "subtotal + shipping", FormulaFormat::Currency),
            calculated("subtotal", "qty * price", FormulaFormat::Number),
            calculated("unit_share", "shipping / qty", FormulaFormat::Number),
        ],
    )
    .unwrap_or_else(|_| unreachable!())
}

fn data(value: Value) -> RecordData {
    let Value::Object(data) = value else {
        unreachable!();
    };
    data
}

async fn service_with_customers() -> (DerivedFieldService, Arc<FakeRecordStore>) {
    let records = Arc::new(FakeRecordStore::default());
    records
        .seed("customers", json!({"code": "C-1", "name": "Acme", "discount": 5}))
        .await;
    records
        .seed("customers", json!({"code": "C-1", "name": "Acme Duplicate", "discount": 9}))
        .await;
    (DerivedFieldService::new(records.clone()), records)
}

#[tokio::test]
async fn lookup_copies_from_first_match_and_is_idempotent() {
    let (service, _) = service_with_customers().await;

    let first = service.lookups().resolve(&customer_lookup(), &json!("C-1")).await;
    let second = service.lookups().resolve(&customer_lookup(), &json!("C-1")).await;

    let first = first.unwrap_or_else(|_| unreachable!());
    assert_eq!(first.get("customer_name"), Some(&json!("Acme")));
    assert_eq!(first.get("discount"), Some(&json!(5)));
    assert_eq!(Some(first), second.ok());
}

#[tokio::test]
async fn missing_lookup_key_leaves_targets_untouched() {
    let (service, _) = service_with_customers().await;
    let schema = orders_schema();
    let mut snapshot = data(json!({"customer": "C-404", "customer_name": "kept", "qty": 1}));

    let miss = service.lookups().resolve(&customer_lookup(), &json!("C-404")).await;
    assert!(matches!(miss, Err(LookupError::NotFound { .. })));

    let report = service
        .recompute(&schema, &mut snapshot, None)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(report.lookups_missed, vec!["customer".to_owned()]);
    assert_eq!(snapshot.get("customer_name"), Some(&json!("kept")));
}

#[tokio::test]
async fn calculated_fields_follow_dependency_order() {
    let (service, _) = service_with_customers().await;
    let schema = orders_schema();
    let mut snapshot = data(json!({"customer": "C-1", "qty": 3, "price": 150.5, "shipping": 0}));

    let report = service
        .recompute(&schema, &mut snapshot, None)
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.lookups_applied, vec!["customer".to_owned()]);
    assert_eq!(snapshot.get("customer_name"), Some(&json!("Acme")));
    assert_eq!(snapshot.get("subtotal"), Some(&json!(451.5)));
    assert_eq!(snapshot.get("total"), Some(&json!(451.5)));

    let rendered = format_calculated_fields(&schema, &snapshot, "");
    assert_eq!(rendered.get("total").map(String::as_str), Some("451.50"));
    assert_eq!(rendered.get("subtotal").map(String::as_str), Some("451.50"));
}

#[tokio::test]
async fn divide_by_zero_blanks_only_the_failing_field() {
    let (service, _) = service_with_customers().await;
    let schema = orders_schema();
    let mut snapshot = data(json!({"qty": 0, "price": 10, "shipping": 4}));

    let report = service
        .recompute(&schema, &mut snapshot, None)
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(report.formula_errors.contains_key("unit_share"));
    assert_eq!(snapshot.get("unit_share"), Some(&Value::Null));
    assert_eq!(snapshot.get("total"), Some(&json!(4.0)));
    assert_eq!(
        format_calculated_fields(&schema, &snapshot, "$").get("unit_share").map(String::as_str),
        Some("")
    );
}

#[tokio::test]
async fn missing_operands_count_as_zero_with_warnings() {
    let (service, _) = service_with_customers().await;
    let schema = orders_schema();
    let mut snapshot = data(json!({"qty": 2}));

    let report = service
        .recompute(&schema, &mut snapshot, None)
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(snapshot.get("subtotal"), Some(&json!(0.0)));
    assert!(
        report
            .formula_warnings
            .get("subtotal")
            .is_some_and(|warnings| warnings.iter().any(|warning| warning.contains("price")))
    );
}

#[tokio::test]
async fn unchanged_lookup_keys_are_not_re_resolved() {
    let (service, _) = service_with_customers().await;
    let schema = orders_schema();
    let mut snapshot = data(json!({"customer": "C-1", "customer_name": "manual"}));
    let changed = BTreeSet::from(["qty".to_owned()]);

    let report = service
        .recompute(&schema, &mut snapshot, Some(&changed))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(report.lookups_applied.is_empty());
    assert_eq!(snapshot.get("customer_name"), Some(&json!("manual")));
}

#[tokio::test]
async fn related_records_project_display_fields() {
    let records = Arc::new(FakeRecordStore::default());
    records
        .seed("orders", json!({"customer_code": "C-1", "title": "First", "secret": "x"}))
        .await;
    records
        .seed("orders", json!({"customer_code": "C-2", "title": "Other"}))
        .await;
    records
        .seed("orders", json!({"customer_code": "C-1", "title": "Second"}))
        .await;
    let service = DerivedFieldService::new(records);
    let config = RelatedRecordsConfig {
        related_app_code: "orders".to_owned(),
        related_key_field: "customer_code".to_owned(),
        related_this_field: "code".to_owned(),
        related_display_fields: vec!["title".to_owned(), "missing".to_owned()],
    };

    let related = service
        .lookups()
        .related_records(&config, &data(json!({"code": "C-1"})))
        .await
        .unwrap_or_default();

    let titles: Vec<&Value> = related.iter().map(|record| &record.fields["title"]).collect();
    assert_eq!(titles, vec![&json!("First"), &json!("Second")]);
    assert!(related.iter().all(|record| !record.fields.contains_key("secret")));
    assert_eq!(related[0].fields.get("missing"), Some(&Value::Null));

    let none = service
        .lookups()
        .related_records(&config, &data(json!({"code": ""})))
        .await
        .unwrap_or_default();
    assert!(none.is_empty());
}
