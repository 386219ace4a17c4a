//! Validation tests: every rejection carries a stable reason code.

use serde_json::json;
use tabula::catalog::{CatalogSnapshot, ColumnRef, EntityInfo, JoinKey, StaticCatalog};
use tabula::spec::{
    Aggregation, Dimension, FieldPair, Filter, FilterOperator, JoinKind, Measure, QuerySpec,
    Relationship, Sort,
};
use tabula::validation::{validate, FilterValue, TypedValue, ValidatedSpec, ValidationError};

async fn builtin() -> CatalogSnapshot {
    let catalog = StaticCatalog::builtin();
    CatalogSnapshot::load(&catalog, &catalog).await.unwrap()
}

async fn check(spec: &QuerySpec) -> Result<ValidatedSpec, ValidationError> {
    validate(spec, &builtin().await, 1000)
}

async fn reason(spec: &QuerySpec) -> &'static str {
    match check(spec).await {
        Ok(_) => panic!("expected {:?} to be rejected", spec),
        Err(e) => e.reason_code(),
    }
}

fn inv(field: &str) -> ColumnRef {
    ColumnRef::new("inventory", field)
}

fn ret(field: &str) -> ColumnRef {
    ColumnRef::new("returns", field)
}

fn by_category() -> QuerySpec {
    QuerySpec::new()
        .entity("inventory")
        .dimension(Dimension::new(inv("category"), "category"))
}

fn sku_and_reason() -> QuerySpec {
    QuerySpec::new()
        .dimension(Dimension::new(inv("sku"), "sku"))
        .dimension(Dimension::new(ret("reason"), "reason"))
}

// ============================================================================
// Projection
// ============================================================================

#[tokio::test]
async fn test_valid_spec_resolves_catalog_columns() {
    let spec = by_category().measure(Measure::new(inv("revenue"), Aggregation::Sum, "revenue"));
    let validated = check(&spec).await.unwrap();

    assert_eq!(validated.anchor, "inventory");
    assert!(validated.join.is_none());
    assert_eq!(validated.limit, 100);
    assert!(validated.warnings.is_empty());
    assert_eq!(validated.measures[0].label(), "Sum of Revenue");
}

#[tokio::test]
async fn test_empty_projection() {
    assert_eq!(reason(&QuerySpec::new().entity("inventory")).await, "empty_projection");
}

#[tokio::test]
async fn test_unknown_entity() {
    let spec = QuerySpec::new().dimension(Dimension::new(ColumnRef::new("ledger", "id"), "id"));
    assert_eq!(reason(&spec).await, "unknown_entity");

    let spec = by_category().entity("ledger");
    assert_eq!(reason(&spec).await, "unknown_entity");
}

#[tokio::test]
async fn test_unknown_field() {
    let spec = by_category().dimension(Dimension::new(inv("colour"), "colour"));
    assert_eq!(reason(&spec).await, "unknown_field");
}

#[tokio::test]
async fn test_aliases_must_be_unique_and_named() {
    let spec = by_category().measure(Measure::new(inv("revenue"), Aggregation::Sum, "category"));
    assert_eq!(reason(&spec).await, "duplicate_alias");

    let spec = by_category().dimension(Dimension::new(inv("region"), "  "));
    assert_eq!(reason(&spec).await, "empty_alias");
}

#[tokio::test]
async fn test_sort_must_name_a_projected_alias() {
    let spec = by_category().sort(Sort::desc("revenue"));
    assert_eq!(reason(&spec).await, "unknown_sort_alias");
}

#[tokio::test]
async fn test_numeric_aggregations_need_numeric_columns() {
    for aggregation in [Aggregation::Sum, Aggregation::Avg, Aggregation::Min, Aggregation::Max] {
        let spec = by_category().measure(Measure::new(inv("brand"), aggregation, "m"));
        assert_eq!(reason(&spec).await, "aggregation_type_mismatch");
    }

    for aggregation in [Aggregation::Count, Aggregation::CountDistinct] {
        let spec = by_category().measure(Measure::new(inv("brand"), aggregation, "m"));
        assert!(check(&spec).await.is_ok());
    }
}

#[tokio::test]
async fn test_catalog_type_wins_over_caller_type() {
    let mut column = inv("brand");
    column.semantic_type = tabula::spec::SemanticType::Numeric;
    let spec = by_category().measure(Measure::new(column, Aggregation::Sum, "m"));
    assert_eq!(reason(&spec).await, "aggregation_type_mismatch");
}

#[tokio::test]
async fn test_non_aggregatable_column_rejected() {
    let catalog = StaticCatalog::new().with_entity(
        EntityInfo::new("ledger"),
        vec![
            ColumnRef::text("ledger", "account"),
            ColumnRef {
                aggregatable: false,
                ..ColumnRef::numeric("ledger", "accountNumber")
            },
        ],
    );
    let snapshot = CatalogSnapshot::load(&catalog, &catalog).await.unwrap();
    let spec = QuerySpec::new()
        .dimension(Dimension::new(ColumnRef::new("ledger", "account"), "account"))
        .measure(Measure::new(
            ColumnRef::new("ledger", "accountNumber"),
            Aggregation::Sum,
            "total",
        ));

    let err = validate(&spec, &snapshot, 1000).unwrap_err();
    assert_eq!(err.reason_code(), "aggregation_type_mismatch");
}

// ============================================================================
// Limits
// ============================================================================

#[tokio::test]
async fn test_zero_limit_rejected() {
    assert_eq!(reason(&by_category().limit(0)).await, "invalid_limit");
}

#[tokio::test]
async fn test_limit_clamped_with_warning() {
    let validated = validate(&by_category().limit(5000), &builtin().await, 1000).unwrap();
    assert_eq!(validated.limit, 1000);
    assert_eq!(validated.warnings.len(), 1);
    assert!(validated.warnings[0].contains("1000"));
}

// ============================================================================
// Filters
// ============================================================================

#[tokio::test]
async fn test_filter_values_are_typed_by_catalog() {
    let spec = by_category()
        .filter(Filter::new(inv("quantity"), FilterOperator::GreaterThan, json!("5")))
        .filter(Filter::new(inv("receivedDate"), FilterOperator::LessEqual, json!("2024-03-01")))
        .filter(Filter::new(inv("region"), FilterOperator::Equals, json!(" north ")));
    let validated = check(&spec).await.unwrap();

    assert_eq!(validated.filters[0].value, FilterValue::Scalar(TypedValue::Number(5.0)));
    assert_eq!(
        validated.filters[1].value,
        FilterValue::Scalar(TypedValue::Date("2024-03-01".into()))
    );
    assert_eq!(
        validated.filters[2].value,
        FilterValue::Scalar(TypedValue::Text("north".into()))
    );
}

#[tokio::test]
async fn test_invalid_filter_values() {
    let cases = vec![
        Filter::new(inv("quantity"), FilterOperator::Equals, json!("many")),
        Filter::new(inv("receivedDate"), FilterOperator::GreaterThan, json!("last week")),
        Filter::new(inv("region"), FilterOperator::Equals, json!("")),
        Filter::nullary(inv("region"), FilterOperator::Equals),
        Filter::new(inv("revenue"), FilterOperator::Between, json!([1])),
        Filter::new(inv("revenue"), FilterOperator::Between, json!([1, "x"])),
        Filter::nullary(inv("region"), FilterOperator::In),
        Filter::new(inv("region"), FilterOperator::In, json!({"north": true})),
        Filter::new(inv("brand"), FilterOperator::Contains, json!("")),
    ];

    for filter in cases {
        let spec = by_category().filter(filter.clone());
        assert_eq!(
            reason(&spec).await,
            "invalid_filter_value",
            "filter {:?} should be rejected",
            filter
        );
    }
}

#[tokio::test]
async fn test_list_filters_accept_arrays_and_comma_strings() {
    let array = by_category().filter(Filter::new(
        inv("region"),
        FilterOperator::In,
        json!(["north", 7]),
    ));
    let validated = check(&array).await.unwrap();
    assert_eq!(
        validated.filters[0].value,
        FilterValue::List(vec!["north".into(), "7".into()])
    );

    let text = by_category().filter(Filter::new(
        inv("region"),
        FilterOperator::NotIn,
        json!("north, ,south"),
    ));
    let validated = check(&text).await.unwrap();
    assert_eq!(
        validated.filters[0].value,
        FilterValue::List(vec!["north".into(), "south".into()])
    );
}

#[tokio::test]
async fn test_null_checks_ignore_value() {
    let spec = by_category().filter(Filter::new(inv("brand"), FilterOperator::IsNull, json!("x")));
    let validated = check(&spec).await.unwrap();
    assert_eq!(validated.filters[0].value, FilterValue::None);
}

#[tokio::test]
async fn test_filters_count_toward_referenced_entities() {
    let spec = by_category().filter(Filter::new(ret("reason"), FilterOperator::Equals, json!("damaged")));
    assert_eq!(reason(&spec).await, "join_kind_missing");
}

// ============================================================================
// Relationships
// ============================================================================

#[tokio::test]
async fn test_two_entities_need_a_relationship() {
    assert_eq!(reason(&sku_and_reason()).await, "join_kind_missing");

    let mut disabled = Relationship::new("inventory", "returns", JoinKind::Left);
    disabled.enabled = false;
    assert_eq!(
        reason(&sku_and_reason().relationship(disabled)).await,
        "join_kind_missing"
    );

    let mut kindless = Relationship::new("inventory", "returns", JoinKind::Left);
    kindless.join_kind = None;
    assert_eq!(
        reason(&sku_and_reason().relationship(kindless)).await,
        "join_kind_missing"
    );
}

#[tokio::test]
async fn test_exists_cannot_project_both_sides() {
    let spec = sku_and_reason().relationship(Relationship::new("inventory", "returns", JoinKind::Exists));
    assert_eq!(reason(&spec).await, "join_kind_unusable");
}

#[tokio::test]
async fn test_relationship_must_connect_referenced_entities() {
    let catalog = StaticCatalog::builtin().with_entity(
        EntityInfo::new("suppliers"),
        vec![ColumnRef::text("suppliers", "name")],
    );
    let snapshot = CatalogSnapshot::load(&catalog, &catalog).await.unwrap();
    let spec = sku_and_reason().relationship(Relationship::new("inventory", "suppliers", JoinKind::Left));

    let err = validate(&spec, &snapshot, 1000).unwrap_err();
    assert_eq!(err.reason_code(), "join_entities_mismatch");
}

#[tokio::test]
async fn test_registry_restricts_join_kinds() {
    let mut key = JoinKey::new("inventory", "returns").with_pair(FieldPair::new("sku", "sku"));
    key.supported_join_kinds = vec![JoinKind::Inner, JoinKind::Left];
    let catalog = StaticCatalog::new()
        .with_entity(EntityInfo::new("inventory"), Vec::new())
        .with_entity(EntityInfo::new("returns"), Vec::new())
        .with_join(key);
    let snapshot = CatalogSnapshot::load(&catalog, &catalog).await.unwrap();

    let right = sku_and_reason().relationship(Relationship::new("inventory", "returns", JoinKind::Right));
    let err = validate(&right, &snapshot, 1000).unwrap_err();
    assert_eq!(err.reason_code(), "join_kind_unsupported");

    let inner = sku_and_reason().relationship(
        Relationship::new("inventory", "returns", JoinKind::Inner)
            .with_pair(FieldPair::new("sku", "sku")),
    );
    let validated = validate(&inner, &snapshot, 1000).unwrap();
    assert_eq!(validated.join.unwrap().pairs, vec![FieldPair::new("sku", "sku")]);
}

#[tokio::test]
async fn test_registry_pairs_are_not_substituted_for_projected_joins() {
    let snapshot = builtin().await;
    assert!(snapshot.join_key("inventory", "returns").is_some());

    for kind in [JoinKind::Inner, JoinKind::Left, JoinKind::First] {
        let spec = sku_and_reason().relationship(Relationship::new("inventory", "returns", kind));
        let err = validate(&spec, &snapshot, 1000).unwrap_err();
        assert_eq!(err.reason_code(), "join_mapping_incomplete", "{:?}", kind);
    }
}

#[tokio::test]
async fn test_incomplete_pairs_without_registry_fallback() {
    let catalog = StaticCatalog::new()
        .with_entity(EntityInfo::new("inventory"), Vec::new())
        .with_entity(EntityInfo::new("returns"), Vec::new())
        .with_entity(EntityInfo::new("suppliers"), vec![ColumnRef::text("suppliers", "name")]);
    let snapshot = CatalogSnapshot::load(&catalog, &catalog).await.unwrap();

    let spec = QuerySpec::new()
        .dimension(Dimension::new(inv("brand"), "brand"))
        .dimension(Dimension::new(ColumnRef::new("suppliers", "name"), "supplier"))
        .relationship(
            Relationship::new("inventory", "suppliers", JoinKind::Left)
                .with_pair(FieldPair::new("brand", "")),
        );

    let err = validate(&spec, &snapshot, 1000).unwrap_err();
    assert_eq!(err.reason_code(), "join_mapping_incomplete");
}

#[tokio::test]
async fn test_pair_fields_must_exist() {
    let spec = sku_and_reason().relationship(
        Relationship::new("inventory", "returns", JoinKind::Left)
            .with_pair(FieldPair::new("sku", "barcode")),
    );
    assert_eq!(reason(&spec).await, "unknown_field");
}

#[tokio::test]
async fn test_reversed_relationship_anchors_on_its_left() {
    let spec = sku_and_reason().relationship(
        Relationship::new("returns", "inventory", JoinKind::Inner)
            .with_pair(FieldPair::new("sku", "sku")),
    );
    let validated = check(&spec).await.unwrap();

    assert_eq!(validated.anchor, "returns");
    let join = validated.join.unwrap();
    assert_eq!(join.right_entity, "inventory");
    assert_eq!(join.describe_pairs(), "returns.sku = inventory.sku");
}

#[tokio::test]
async fn test_exists_on_single_entity_becomes_filter() {
    let spec = by_category().relationship(Relationship::new("returns", "inventory", JoinKind::Exists));
    let validated = check(&spec).await.unwrap();

    let join = validated.join.unwrap();
    assert_eq!(join.kind, JoinKind::Exists);
    assert_eq!(join.left_entity, "inventory");
    assert_eq!(join.right_entity, "returns");
}

#[tokio::test]
async fn test_exists_without_pairs_is_ignored_with_warning() {
    let catalog = StaticCatalog::new()
        .with_entity(EntityInfo::new("inventory"), Vec::new())
        .with_entity(EntityInfo::new("suppliers"), vec![ColumnRef::text("suppliers", "name")]);
    let snapshot = CatalogSnapshot::load(&catalog, &catalog).await.unwrap();
    let spec = by_category().relationship(Relationship::new("inventory", "suppliers", JoinKind::Exists));

    let validated = validate(&spec, &snapshot, 1000).unwrap();
    assert!(validated.join.is_none());
    assert_eq!(validated.warnings.len(), 1);
}

#[tokio::test]
async fn test_other_relationships_ignored_for_single_entity() {
    let spec = by_category().relationship(Relationship::new("inventory", "returns", JoinKind::Inner));
    let validated = check(&spec).await.unwrap();
    assert!(validated.join.is_none());
}

#[tokio::test]
async fn test_three_entities_rejected() {
    let catalog = StaticCatalog::builtin().with_entity(
        EntityInfo::new("suppliers"),
        vec![ColumnRef::text("suppliers", "name")],
    );
    let snapshot = CatalogSnapshot::load(&catalog, &catalog).await.unwrap();
    let spec = sku_and_reason()
        .dimension(Dimension::new(ColumnRef::new("suppliers", "name"), "supplier"));

    let err = validate(&spec, &snapshot, 1000).unwrap_err();
    assert_eq!(err.reason_code(), "too_many_entities");
}
