use super::*;

fn coverage(table: &str, total: i64, embedded: i64) -> ColumnCoverage {
    ColumnCoverage {
        schema: "main".to_string(),
        table: table.to_string(),
        column: "content".to_string(),
        total,
        embedded,
    }
}

#[test]
fn totals_and_percentage() {
    let report = CoverageReport::new(vec![
        coverage("a", 100, 100),
        coverage("b", 300, 100),
    ]);

    assert_eq!(report.total_rows(), 400);
    assert_eq!(report.embedded_rows(), 200);
    assert_eq!(report.remaining_rows(), 200);
    assert!((report.percentage() - 50.0).abs() < f64::EPSILON);
    assert!(!report.is_complete());
}

#[test]
fn empty_report_is_complete() {
    let report = CoverageReport::default();
    assert_eq!(report.percentage(), 0.0);
    assert!(report.is_complete());
    assert!(report.most_remaining(TOP_REMAINING).is_empty());
}

#[test]
fn most_remaining_lists_incomplete_columns_largest_first() {
    let report = CoverageReport::new(vec![
        coverage("done", 50, 50),
        coverage("small", 10, 5),
        coverage("large", 1000, 0),
        coverage("tie_first", 20, 0),
        coverage("tie_second", 30, 10),
        coverage("medium", 200, 100),
        coverage("tiny", 2, 1),
    ]);

    let tables = report
        .most_remaining(TOP_REMAINING)
        .into_iter()
        .map(|column| column.table.as_str())
        .collect::<Vec<_>>();

    assert_eq!(
        tables,
        vec!["large", "medium", "tie_first", "tie_second", "small"]
    );
}
