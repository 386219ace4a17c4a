//! End-to-end tests: specification JSON in, `QueryResult` out, against a
//! seeded SQLite database.

#[path = "../common/mod.rs"]
mod common;

use common::SeededDb;
use serde_json::{json, Value};
use tabula::error::Stage;
use tabula::executor::as_f64;
use tabula::spec::QuerySpec;

fn spec(value: Value) -> QuerySpec {
    serde_json::from_value(value).expect("valid specification JSON")
}

fn column(entity: &str, field: &str) -> Value {
    json!({ "entity": entity, "field": field })
}

fn strings(result: &tabula::QueryResult, key: &str) -> Vec<String> {
    result
        .rows
        .iter()
        .map(|r| r[key].as_str().unwrap_or_default().to_string())
        .collect()
}

// ============================================================================
// Scenario A: single entity, grouped, no filters
// ============================================================================

#[tokio::test]
async fn test_scenario_a_revenue_by_category() {
    let db = SeededDb::new();
    let (engine, store) = db.engine();

    let result = engine
        .execute(&spec(json!({
            "entities": ["inventory"],
            "dimensions": [{ "column": column("inventory", "category"), "alias": "category" }],
            "measures": [{
                "column": column("inventory", "revenue"),
                "aggregation": "SUM",
                "alias": "revenue"
            }],
            "limit": 10
        })))
        .await
        .unwrap();

    assert_eq!(store.call_count(), 1);
    assert!(!store.last_sql().unwrap().contains("JOIN"));

    assert!(result.row_count <= 10);
    assert_eq!(result.row_count, result.rows.len());
    assert_eq!(
        strings(&result, "category"),
        vec!["ELECTRONICS", "TOOLS", "GARDEN", "UNKNOWN"]
    );

    let revenue: Vec<f64> = result.rows.iter().map(|r| as_f64(r.get("revenue"))).collect();
    assert_eq!(revenue, vec![300.0, 180.0, 105.0, 5.0]);
    assert!(revenue.windows(2).all(|w| w[0] >= w[1]));

    assert_eq!(result.columns.len(), 2);
    assert_eq!(result.columns[1].label, "Sum of Revenue");
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn test_result_serializes_camel_case() {
    let db = SeededDb::new();
    let (engine, _) = db.engine();

    let result = engine
        .execute(&spec(json!({
            "entities": ["inventory"],
            "measures": [{
                "column": column("inventory", "sku"),
                "aggregation": "COUNT",
                "alias": "items"
            }]
        })))
        .await
        .unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["rowCount"], json!(1));
    assert!(json["executionTimeMs"].is_u64());
    assert_eq!(json["rows"][0]["items"], json!(6));
    assert_eq!(json["columns"][0]["type"], json!("numeric"));
}

// ============================================================================
// Scenario B: exists join with both entities projected
// ============================================================================

#[tokio::test]
async fn test_scenario_b_exists_with_dual_projection_is_rejected() {
    let db = SeededDb::new();
    let (engine, store) = db.engine();

    let err = engine
        .execute(&spec(json!({
            "entities": ["inventory", "returns"],
            "dimensions": [
                { "column": column("inventory", "category"), "alias": "category" },
                { "column": column("returns", "reason"), "alias": "reason" }
            ],
            "measures": [{
                "column": column("inventory", "revenue"),
                "aggregation": "SUM",
                "alias": "revenue"
            }],
            "relationship": {
                "leftEntity": "inventory",
                "rightEntity": "returns",
                "joinKind": "exists",
                "fieldPairs": [{ "leftField": "sku", "rightField": "sku" }]
            }
        })))
        .await
        .unwrap_err();

    assert_eq!(err.reason_code(), "join_kind_unusable");
    assert!(err.is_client_error());
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn test_two_entities_without_relationship_are_rejected() {
    let db = SeededDb::new();
    let (engine, store) = db.engine();

    let err = engine
        .execute(&spec(json!({
            "entities": ["inventory", "returns"],
            "dimensions": [
                { "column": column("inventory", "category"), "alias": "category" },
                { "column": column("returns", "reason"), "alias": "reason" }
            ]
        })))
        .await
        .unwrap_err();

    assert_eq!(err.reason_code(), "join_kind_missing");
    assert_eq!(store.call_count(), 0);
}

// ============================================================================
// Scenario C: left join keeps unmatched rows
// ============================================================================

fn sku_and_reason(kind: &str) -> Value {
    json!({
        "entities": ["inventory", "returns"],
        "dimensions": [
            { "column": column("inventory", "sku"), "alias": "sku" },
            { "column": column("returns", "reason"), "alias": "reason" }
        ],
        "measures": [{
            "column": column("inventory", "revenue"),
            "aggregation": "SUM",
            "alias": "revenue"
        }],
        "sorts": [
            { "referenceAlias": "sku", "direction": "asc" },
            { "referenceAlias": "reason", "direction": "asc" }
        ],
        "relationship": {
            "leftEntity": "inventory",
            "rightEntity": "returns",
            "joinKind": kind,
            "fieldPairs": [{ "leftField": "sku", "rightField": "sku", "comparator": "=" }]
        }
    })
}

#[tokio::test]
async fn test_scenario_c_left_join_keeps_every_left_row() {
    let db = SeededDb::new();
    let (engine, store) = db.engine();

    let result = engine.execute(&spec(sku_and_reason("left"))).await.unwrap();

    assert!(store.last_sql().unwrap().contains("LEFT JOIN"));

    let skus = strings(&result, "sku");
    for sku in ["SKU-1", "SKU-2", "SKU-3", "SKU-4", "SKU-5", "SKU-6"] {
        assert!(skus.iter().any(|s| s == sku), "{} missing from {:?}", sku, skus);
    }

    let pairs: Vec<(String, String)> = skus
        .into_iter()
        .zip(strings(&result, "reason"))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("SKU-1".to_string(), "DAMAGED".to_string()),
            ("SKU-1".to_string(), "WRONG ITEM".to_string()),
            ("SKU-2".to_string(), "UNKNOWN".to_string()),
            ("SKU-3".to_string(), "UNKNOWN".to_string()),
            ("SKU-4".to_string(), "DAMAGED".to_string()),
            ("SKU-5".to_string(), "UNKNOWN".to_string()),
            ("SKU-6".to_string(), "UNKNOWN".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_inner_join_drops_unmatched_rows() {
    let db = SeededDb::new();
    let (engine, _) = db.engine();

    let result = engine.execute(&spec(sku_and_reason("inner"))).await.unwrap();
    assert_eq!(strings(&result, "sku"), vec!["SKU-1", "SKU-1", "SKU-4"]);
}

#[tokio::test]
async fn test_first_join_yields_one_row_per_left_row() {
    let db = SeededDb::new();
    let (engine, store) = db.engine();

    let result = engine.execute(&spec(sku_and_reason("first"))).await.unwrap();

    assert!(store.last_sql().unwrap().contains("rowid"));
    assert_eq!(
        strings(&result, "sku"),
        vec!["SKU-1", "SKU-2", "SKU-3", "SKU-4", "SKU-5", "SKU-6"]
    );
    // which return SKU-1 gets is unspecified
    let reasons = strings(&result, "reason");
    assert!(reasons[0] == "DAMAGED" || reasons[0] == "WRONG ITEM");
    assert_eq!(reasons[3], "DAMAGED");
}

#[tokio::test]
async fn test_relationship_without_pairs_is_rejected() {
    let db = SeededDb::new();
    let (engine, store) = db.engine();

    for kind in ["inner", "left", "first"] {
        let mut value = sku_and_reason(kind);
        value["relationship"]["fieldPairs"] = json!([]);
        let err = engine.execute(&spec(value)).await.unwrap_err();
        assert_eq!(err.reason_code(), "join_mapping_incomplete", "{}", kind);
    }
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn test_zero_row_join_warns_about_mapping() {
    let db = SeededDb::new();
    let (engine, _) = db.engine();

    let mut value = sku_and_reason("inner");
    value["relationship"]["fieldPairs"] =
        json!([{ "leftField": "category", "rightField": "reason" }]);
    let result = engine.execute(&spec(value)).await.unwrap();

    assert_eq!(result.row_count, 0);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("inventory.category = returns.reason"));
}

#[tokio::test]
async fn test_unmatched_outer_join_warns_about_mapping() {
    let db = SeededDb::new();
    let (engine, _) = db.engine();

    for kind in ["left", "first"] {
        let mut value = sku_and_reason(kind);
        value["relationship"]["fieldPairs"] =
            json!([{ "leftField": "category", "rightField": "reason" }]);
        let result = engine.execute(&spec(value)).await.unwrap();

        assert_eq!(result.row_count, 6, "{}", kind);
        assert!(strings(&result, "reason").iter().all(|r| r == "UNKNOWN"));
        assert_eq!(result.warnings.len(), 1, "{}", kind);
        assert!(result.warnings[0].contains("matched no returns rows"));
        assert!(result.warnings[0].contains("inventory.category = returns.reason"));
    }
}

#[tokio::test]
async fn test_exists_relationship_filters_single_entity() {
    let db = SeededDb::new();
    let (engine, store) = db.engine();

    let result = engine
        .execute(&spec(json!({
            "entities": ["inventory"],
            "dimensions": [{ "column": column("inventory", "sku"), "alias": "sku" }],
            "sorts": [{ "referenceAlias": "sku" }],
            "relationship": {
                "leftEntity": "returns",
                "rightEntity": "inventory",
                "joinKind": "exists",
                "fieldPairs": [{ "leftField": "sku", "rightField": "sku" }]
            }
        })))
        .await
        .unwrap();

    assert!(store.last_sql().unwrap().contains("EXISTS"));
    assert_eq!(strings(&result, "sku"), vec!["SKU-1", "SKU-4"]);
}

// ============================================================================
// Scenario D: pivot overflow
// ============================================================================

#[tokio::test]
async fn test_scenario_d_pivot_caps_headers_and_sums_other() {
    let db = SeededDb::empty();
    let mut inserts =
        String::from("INSERT INTO inventory_records (sku, region, warehouse, revenue) VALUES\n");
    let mut total = 0.0;
    let mut values = Vec::new();
    for r in 0..30 {
        for w in 0..30 {
            let revenue = (r * 30 + w + 1) as f64;
            total += revenue;
            values.push(format!("('S-{}-{}', 'region-{:02}', 'wh-{:02}', {})", r, w, r, w, revenue));
        }
    }
    inserts.push_str(&values.join(",\n"));
    inserts.push(';');
    db.execute(&inserts);

    let (engine, _) = db.engine();
    let result = engine
        .execute(&spec(json!({
            "entities": ["inventory"],
            "columnDimensions": [
                { "column": column("inventory", "region"), "alias": "region" },
                { "column": column("inventory", "warehouse"), "alias": "warehouse" }
            ],
            "measures": [{
                "column": column("inventory", "revenue"),
                "aggregation": "SUM",
                "alias": "revenue"
            }]
        })))
        .await
        .unwrap();

    // no row dimensions: one pivoted row, one column per header
    assert_eq!(result.row_count, 1);
    assert_eq!(result.columns.len(), 25 * 25 + 1);
    assert_eq!(result.columns.last().unwrap().key, "Other - revenue");

    let row = &result.rows[0];
    let cells: f64 = result.columns.iter().map(|c| as_f64(row.get(&c.key))).sum();
    assert_eq!(cells, total);

    // the highest revenues are kept, so the five lowest regions and
    // warehouses are what lands in Other
    let other: f64 = (0..30)
        .flat_map(|r| (0..30).map(move |w| (r, w)))
        .filter(|(r, w)| *r < 5 || *w < 5)
        .map(|(r, w)| (r * 30 + w + 1) as f64)
        .sum();
    assert_eq!(as_f64(row.get("Other - revenue")), other);
    assert_eq!(as_f64(row.get("REGION-29 | WH-29 - revenue")), 900.0);
    assert!(result.warnings.iter().any(|w| w.contains("Other")));
}

#[tokio::test]
async fn test_pivot_without_overflow_fills_missing_cells_with_zero() {
    let db = SeededDb::new();
    let (engine, _) = db.engine();

    let result = engine
        .execute(&spec(json!({
            "entities": ["inventory"],
            "dimensions": [{ "column": column("inventory", "category"), "alias": "category" }],
            "columnDimensions": [{ "column": column("inventory", "region"), "alias": "region" }],
            "measures": [{
                "column": column("inventory", "revenue"),
                "aggregation": "SUM",
                "alias": "revenue"
            }]
        })))
        .await
        .unwrap();

    assert!(result.columns.iter().all(|c| !c.key.starts_with("Other")));
    let electronics = result
        .rows
        .iter()
        .find(|r| r["category"] == json!("ELECTRONICS"))
        .unwrap();
    assert_eq!(as_f64(electronics.get("EAST - revenue")), 300.0);
    assert_eq!(electronics["NORTH - revenue"], json!(0));
}

// ============================================================================
// Filters, case handling and binding
// ============================================================================

async fn count_with_filter(filter: Value) -> u64 {
    let db = SeededDb::new();
    let (engine, _) = db.engine();
    let result = engine
        .execute(&spec(json!({
            "entities": ["inventory"],
            "measures": [{
                "column": column("inventory", "sku"),
                "aggregation": "COUNT",
                "alias": "items"
            }],
            "filters": [filter]
        })))
        .await
        .unwrap();
    as_f64(result.rows[0].get("items")) as u64
}

#[tokio::test]
async fn test_filters_against_sqlite() {
    let region = column("inventory", "region");
    let category = column("inventory", "category");

    assert_eq!(
        count_with_filter(json!({ "column": region, "operator": "equals", "value": "NORTH" })).await,
        2
    );
    assert_eq!(
        count_with_filter(json!({ "column": region, "operator": "in", "value": ["north", "East"] }))
            .await,
        3
    );
    assert_eq!(
        count_with_filter(json!({ "column": region, "operator": "not_in", "value": "north,east" }))
            .await,
        3
    );
    assert_eq!(
        count_with_filter(json!({ "column": region, "operator": "in", "value": [] })).await,
        0
    );
    assert_eq!(
        count_with_filter(json!({ "column": category, "operator": "contains", "value": "OOL" }))
            .await,
        2
    );
    assert_eq!(
        count_with_filter(json!({ "column": category, "operator": "is_null" })).await,
        1
    );
    assert_eq!(
        count_with_filter(json!({
            "column": column("inventory", "revenue"),
            "operator": "greater_equal",
            "value": "80"
        }))
        .await,
        3
    );
    assert_eq!(
        count_with_filter(json!({
            "column": column("inventory", "receivedDate"),
            "operator": "between",
            "value": ["2024-02-01", "2024-04-30"]
        }))
        .await,
        3
    );
}

#[tokio::test]
async fn test_in_round_trips_grouped_values() {
    let db = SeededDb::new();
    let (engine, _) = db.engine();

    let grouped = engine
        .execute(&spec(json!({
            "entities": ["inventory"],
            "dimensions": [{ "column": column("inventory", "category"), "alias": "category" }],
            "measures": [{ "column": column("inventory", "sku"), "aggregation": "COUNT", "alias": "n" }],
            "sorts": [{ "referenceAlias": "category" }]
        })))
        .await
        .unwrap();
    let values = strings(&grouped, "category");

    let filtered = engine
        .execute(&spec(json!({
            "entities": ["inventory"],
            "dimensions": [{ "column": column("inventory", "category"), "alias": "category" }],
            "measures": [{ "column": column("inventory", "sku"), "aggregation": "COUNT", "alias": "n" }],
            "sorts": [{ "referenceAlias": "category" }],
            "filters": [{
                "column": column("inventory", "category"),
                "operator": "in",
                "value": values
            }]
        })))
        .await
        .unwrap();

    assert_eq!(filtered.rows, grouped.rows);
}

#[tokio::test]
async fn test_in_round_trips_padded_values() {
    let db = SeededDb::new();
    db.execute("UPDATE inventory_records SET warehouse = ' W1 ' WHERE sku = 'SKU-1'");
    let (engine, _) = db.engine();

    let by_warehouse = |filters: Value| {
        spec(json!({
            "entities": ["inventory"],
            "dimensions": [{ "column": column("inventory", "warehouse"), "alias": "warehouse" }],
            "measures": [{ "column": column("inventory", "sku"), "aggregation": "COUNT", "alias": "n" }],
            "sorts": [{ "referenceAlias": "warehouse" }],
            "filters": filters
        }))
    };

    let grouped = engine.execute(&by_warehouse(json!([]))).await.unwrap();
    let values = strings(&grouped, "warehouse");
    assert_eq!(values.len(), 4);
    assert!(values.iter().any(|v| v == " W1 "));

    let filtered = engine
        .execute(&by_warehouse(json!([{
            "column": column("inventory", "warehouse"),
            "operator": "in",
            "value": values
        }])))
        .await
        .unwrap();
    assert_eq!(filtered.rows, grouped.rows);

    let excluded = engine
        .execute(&by_warehouse(json!([{
            "column": column("inventory", "warehouse"),
            "operator": "not_in",
            "value": [" W1 "]
        }])))
        .await
        .unwrap();
    assert_eq!(excluded.row_count, 3);
}

#[tokio::test]
async fn test_caller_values_are_bound_not_inlined() {
    let db = SeededDb::new();
    let (engine, store) = db.engine();
    let hostile = "x'); DROP TABLE inventory_records; --";

    let result = engine
        .execute(&spec(json!({
            "entities": ["inventory"],
            "measures": [{ "column": column("inventory", "sku"), "aggregation": "COUNT", "alias": "n" }],
            "filters": [{ "column": column("inventory", "brand"), "operator": "equals", "value": hostile }]
        })))
        .await
        .unwrap();

    assert_eq!(result.rows[0]["n"], json!(0));
    assert!(!store.last_sql().unwrap().contains("DROP"));
    assert_eq!(store.last_params().len(), 1);

    // the table is still there
    let again = engine
        .execute(&spec(json!({
            "entities": ["inventory"],
            "measures": [{ "column": column("inventory", "sku"), "aggregation": "COUNT", "alias": "n" }]
        })))
        .await
        .unwrap();
    assert_eq!(again.rows[0]["n"], json!(6));
}

#[tokio::test]
async fn test_limit_is_clamped_with_warning() {
    let db = SeededDb::new();
    let (engine, store) = db.engine();

    let result = engine
        .execute(&spec(json!({
            "entities": ["inventory"],
            "dimensions": [{ "column": column("inventory", "sku"), "alias": "sku" }],
            "limit": 5000
        })))
        .await
        .unwrap();

    assert_eq!(result.row_count, 6);
    assert_eq!(result.warnings.len(), 1);
    assert!(store.last_sql().unwrap().ends_with("LIMIT 1000"));
}

#[tokio::test]
async fn test_unknown_field_is_rejected_before_store() {
    let db = SeededDb::new();
    let (engine, store) = db.engine();

    let err = engine
        .execute(&spec(json!({
            "entities": ["inventory"],
            "dimensions": [{ "column": column("inventory", "secret"), "alias": "x" }]
        })))
        .await
        .unwrap_err();

    assert_eq!(err.reason_code(), "unknown_field");
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn test_missing_table_is_an_execution_error() {
    let db = SeededDb::new();
    db.execute("DROP TABLE return_records;");
    let (engine, store) = db.engine();

    let err = engine
        .execute(&spec(json!({
            "entities": ["returns"],
            "dimensions": [{ "column": column("returns", "reason"), "alias": "reason" }]
        })))
        .await
        .unwrap_err();

    assert_eq!(store.call_count(), 1);
    assert_eq!(err.stage(), Some(Stage::Execute));
    assert_eq!(err.reason_code(), "execution_failed");
    let id = err.correlation_id().unwrap();
    assert!(err.public_message().contains(&id.to_string()));
    assert!(!err.public_message().contains("return_records"));
}
