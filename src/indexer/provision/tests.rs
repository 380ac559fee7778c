use super::*;
use std::collections::HashSet;
use std::sync::Mutex;

fn text_column(table: &str, column: &str) -> TextColumn {
    TextColumn {
        schema: "main".to_string(),
        table: table.to_string(),
        column: column.to_string(),
    }
}

/// Remembers which embedding columns exist, like the catalog would
struct FakeSchema {
    candidates: Vec<TextColumn>,
    existing: Mutex<HashSet<String>>,
    failing_tables: Vec<&'static str>,
    list_fails: bool,
}

impl FakeSchema {
    fn new(candidates: Vec<TextColumn>) -> Self {
        Self {
            candidates,
            existing: Mutex::new(HashSet::new()),
            failing_tables: Vec::new(),
            list_fails: false,
        }
    }
}

#[async_trait]
impl SchemaStore for FakeSchema {
    async fn text_columns(&self, _patterns: &[String]) -> Result<Vec<TextColumn>> {
        if self.list_fails {
            anyhow::bail!("connection refused");
        }
        Ok(self.candidates.clone())
    }

    async fn add_vector_column(&self, column: &TextColumn, dimension: u32) -> Result<ColumnChange> {
        assert_eq!(dimension, 768);

        if self.failing_tables.contains(&column.table.as_str()) {
            anyhow::bail!("permission denied for table {}", column.table);
        }

        let key = format!("{}.{}", column.table, column.embedding_column());
        if self.existing.lock().expect("lock").insert(key) {
            Ok(ColumnChange::Added)
        } else {
            Ok(ColumnChange::AlreadyExists)
        }
    }
}

fn patterns() -> Vec<String> {
    vec!["content".to_string()]
}

#[tokio::test]
async fn repeated_provisioning_is_idempotent() {
    let schema = FakeSchema::new(vec![
        text_column("articles", "content"),
        text_column("products", "description"),
    ]);

    let first = provision_columns(&schema, &patterns(), 768)
        .await
        .expect("provisioning succeeds");
    assert_eq!(first.added, vec!["main.articles.content", "main.products.description"]);
    assert!(first.skipped.is_empty());
    assert!(first.is_success());

    let second = provision_columns(&schema, &patterns(), 768)
        .await
        .expect("provisioning succeeds");
    assert!(second.added.is_empty());
    assert_eq!(second.skipped.len(), 2);
    assert!(second.is_success());
    assert_eq!(second.candidates(), 2);
}

#[tokio::test]
async fn failed_alter_does_not_stop_other_columns() {
    let mut schema = FakeSchema::new(vec![
        text_column("locked", "content"),
        text_column("open", "content"),
    ]);
    schema.failing_tables.push("locked");

    let report = provision_columns(&schema, &patterns(), 768)
        .await
        .expect("per-column failures are reported, not raised");

    assert_eq!(report.added, vec!["main.open.content"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "main.locked.content");
    assert!(report.failed[0].1.contains("permission denied"));
    assert!(!report.is_success());
}

#[tokio::test]
async fn listing_failure_is_fatal() {
    let mut schema = FakeSchema::new(Vec::new());
    schema.list_fails = true;

    let error = provision_columns(&schema, &patterns(), 768)
        .await
        .expect_err("catalog errors propagate");
    assert!(format!("{:#}", error).contains("connection refused"));
}
