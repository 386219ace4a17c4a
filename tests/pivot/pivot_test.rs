//! Pivot invariants over generated grids.

use serde_json::json;
use tabula::executor::{as_f64, Row};
use tabula::pivot::{cell_key, pivot, PivotLayout, PivotTable, OTHER_HEADER};

/// Small deterministic generator so grids vary without a rand dependency.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// `count` rows over `width` distinct values per column axis.
fn grid(seed: u64, count: usize, width: u64, axes: &[String]) -> Vec<Row> {
    let mut rng = Lcg(seed);
    (0..count)
        .map(|_| {
            let mut row = Row::new();
            row.insert("store".into(), json!(format!("S{}", rng.next(4))));
            for axis in axes {
                row.insert(axis.clone(), json!(format!("{}-{}", axis, rng.next(width))));
            }
            row.insert("units".into(), json!(rng.next(100)));
            row.insert("revenue".into(), json!(rng.next(1000) as f64 / 4.0));
            row
        })
        .collect()
}

fn run(rows: &[Row], columns: &[String], cap: usize) -> PivotTable {
    let row_keys = keys(&["store"]);
    let measures = keys(&["units", "revenue"]);
    pivot(
        rows,
        &PivotLayout {
            row_keys: &row_keys,
            column_keys: columns,
            measure_keys: &measures,
            value_cap: cap,
        },
    )
}

fn total(rows: &[Row], measure: &str) -> f64 {
    rows.iter().map(|r| as_f64(r.get(measure))).sum()
}

fn pivoted_total(table: &PivotTable, measure: &str) -> f64 {
    table
        .rows
        .iter()
        .flat_map(|row| {
            table
                .headers
                .iter()
                .map(move |h| as_f64(row.get(&cell_key(h, measure))))
        })
        .sum()
}

#[test]
fn test_header_count_is_bounded() {
    for seed in 0..20 {
        for (axes, cap) in [(1, 3), (2, 3), (2, 5), (3, 2)] {
            let columns: Vec<String> = (0..axes).map(|i| format!("axis{}", i)).collect();
            let rows = grid(seed, 200, 8, &columns);
            let table = run(&rows, &columns, cap);

            let bound = cap.pow(axes as u32) + 1;
            assert!(
                table.headers.len() <= bound,
                "seed {} axes {} cap {}: {} headers",
                seed,
                axes,
                cap,
                table.headers.len()
            );
            assert_eq!(
                table.headers.last().map(String::as_str) == Some(OTHER_HEADER),
                table.overflowed
            );
        }
    }
}

#[test]
fn test_measures_are_conserved() {
    for seed in 0..20 {
        let columns = keys(&["region", "channel"]);
        let rows = grid(seed, 150, 6, &columns);
        let table = run(&rows, &columns, 4);

        for measure in ["units", "revenue"] {
            let expected = total(&rows, measure);
            let actual = pivoted_total(&table, measure);
            assert!(
                (expected - actual).abs() < 1e-6,
                "seed {} {}: {} != {}",
                seed,
                measure,
                expected,
                actual
            );
        }
    }
}

#[test]
fn test_no_other_when_values_fit() {
    let columns = keys(&["region"]);
    let rows = grid(7, 100, 5, &columns);
    let table = run(&rows, &columns, 25);

    assert!(!table.overflowed);
    assert!(!table.headers.iter().any(|h| h == OTHER_HEADER));
    assert!(table.headers.len() <= 5);
}

#[test]
fn test_every_row_has_every_cell() {
    let columns = keys(&["region", "channel"]);
    let rows = grid(3, 60, 6, &columns);
    let table = run(&rows, &columns, 3);

    for row in &table.rows {
        assert!(row.contains_key("store"));
        for header in &table.headers {
            for measure in ["units", "revenue"] {
                assert!(
                    row.contains_key(&cell_key(header, measure)),
                    "missing {}",
                    cell_key(header, measure)
                );
            }
        }
    }
}

#[test]
fn test_one_output_row_per_row_dimension_value() {
    let columns = keys(&["region"]);
    let rows = grid(11, 80, 10, &columns);
    let table = run(&rows, &columns, 25);

    let mut stores: Vec<String> = rows
        .iter()
        .filter_map(|r| r.get("store").and_then(|v| v.as_str()).map(String::from))
        .collect();
    stores.sort();
    stores.dedup();
    assert_eq!(table.rows.len(), stores.len());
}

#[test]
fn test_kept_values_follow_first_appearance() {
    let columns = keys(&["region"]);
    let rows: Vec<Row> = ["C", "A", "C", "B", "D", "A"]
        .iter()
        .map(|region| {
            let mut row = Row::new();
            row.insert("store".into(), json!("S0"));
            row.insert("region".into(), json!(region));
            row.insert("units".into(), json!(1));
            row.insert("revenue".into(), json!(1.0));
            row
        })
        .collect();

    let table = run(&rows, &columns, 2);
    assert_eq!(table.headers, vec!["C", "A", OTHER_HEADER]);

    let out = &table.rows[0];
    assert_eq!(as_f64(out.get(&cell_key("C", "units"))), 2.0);
    assert_eq!(as_f64(out.get(&cell_key("A", "units"))), 2.0);
    assert_eq!(as_f64(out.get(&cell_key(OTHER_HEADER, "units"))), 2.0);
}

#[test]
fn test_separator_bearing_values_are_conserved() {
    let columns = keys(&["region", "channel"]);
    let rows: Vec<Row> = [("X | Y", "Z", 1), ("X", "Y | Z", 2), ("X | Y", "Y | Z", 4)]
        .iter()
        .map(|(region, channel, units)| {
            let mut row = Row::new();
            row.insert("store".into(), json!("S0"));
            row.insert("region".into(), json!(region));
            row.insert("channel".into(), json!(channel));
            row.insert("units".into(), json!(units));
            row.insert("revenue".into(), json!(*units as f64 / 2.0));
            row
        })
        .collect();

    let table = run(&rows, &columns, 25);

    let mut distinct = table.headers.clone();
    distinct.sort();
    distinct.dedup();
    assert_eq!(distinct.len(), table.headers.len(), "{:?}", table.headers);
    assert!(table.headers.len() <= 25usize.pow(2) + 1);
    assert_eq!(pivoted_total(&table, "units"), 7.0);
    assert_eq!(pivoted_total(&table, "revenue"), 3.5);
}
