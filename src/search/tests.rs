use super::*;
use crate::database::{RowIdColumn, RowIdSource};
use std::collections::HashMap;
use std::sync::Mutex;

fn descriptor(table: &str, source_column: &str) -> ColumnDescriptor {
    ColumnDescriptor {
        schema: "main".to_string(),
        table: table.to_string(),
        source_column: source_column.to_string(),
        embedding_column: format!("{}_embedding", source_column),
        row_id: RowIdColumn {
            name: "id".to_string(),
            type_name: Some("int4".to_string()),
            source: RowIdSource::Exact,
        },
    }
}

fn row(table: &str, column: &str, record_id: &str, similarity: f64) -> SearchResult {
    SearchResult {
        text: format!("{} row {}", table, record_id),
        table: table.to_string(),
        column: column.to_string(),
        record_id: record_id.to_string(),
        similarity,
    }
}

enum Behaviour {
    /// Rows in distance order; the first `fetch` are returned
    Rows(Vec<SearchResult>),
    Fail(&'static str),
    Hang,
}

#[derive(Default)]
struct FakeColumns {
    columns: Vec<ColumnDescriptor>,
    behaviour: HashMap<String, Behaviour>,
    fetches: Mutex<Vec<(String, usize)>>,
    catalog_error: bool,
}

impl FakeColumns {
    fn with_column(mut self, table: &str, column: &str, behaviour: Behaviour) -> Self {
        self.columns.push(descriptor(table, column));
        self.behaviour.insert(format!("{}.{}", table, column), behaviour);
        self
    }

    fn fetches(&self) -> Vec<(String, usize)> {
        self.fetches.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ColumnSource for FakeColumns {
    async fn embedding_columns(&self) -> Result<Vec<ColumnDescriptor>> {
        if self.catalog_error {
            return Err(RagError::Database("connection refused".to_string()));
        }
        Ok(self.columns.clone())
    }

    async fn nearest(
        &self,
        column: &ColumnDescriptor,
        _query_embedding: &[f32],
        fetch: usize,
    ) -> Result<Vec<SearchResult>> {
        let key = format!("{}.{}", column.table, column.source_column);
        self.fetches.lock().expect("lock").push((key.clone(), fetch));

        match self.behaviour.get(&key) {
            Some(Behaviour::Rows(rows)) => Ok(rows.iter().take(fetch).cloned().collect()),
            Some(Behaviour::Fail(message)) => Err(RagError::Database(message.to_string())),
            Some(Behaviour::Hang) => {
                std::future::pending::<()>().await;
                Ok(Vec::new())
            }
            None => Ok(Vec::new()),
        }
    }
}

#[derive(Default)]
struct FakeEmbedder {
    missing_key: bool,
    tasks: Mutex<Vec<TaskType>>,
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn ensure_credentials(&self) -> Result<()> {
        if self.missing_key {
            return Err(RagError::MissingCredential("GOOGLE_API_KEY is not set".to_string()));
        }
        Ok(())
    }

    async fn embed(&self, _text: &str, task: TaskType) -> Result<Vec<f32>> {
        self.tasks.lock().expect("lock").push(task);
        Ok(vec![0.1; 4])
    }

    async fn embed_batch(&self, texts: &[String], task: TaskType) -> Result<Vec<Vec<f32>>> {
        self.tasks.lock().expect("lock").push(task);
        Ok(texts.iter().map(|_| vec![0.1; 4]).collect())
    }
}

fn engine(columns: Arc<FakeColumns>, embedder: Arc<FakeEmbedder>) -> SearchEngine {
    SearchEngine::new(columns, embedder, SearchConfig::default())
}

#[tokio::test]
async fn merges_columns_by_global_similarity() {
    let columns = Arc::new(
        FakeColumns::default()
            .with_column(
                "a_places",
                "description",
                Behaviour::Rows(vec![row("a_places", "description", "1", 0.9), row("a_places", "description", "2", 0.5)]),
            )
            .with_column(
                "b_routes",
                "content",
                // not in distance order on purpose
                Behaviour::Rows(vec![row("b_routes", "content", "7", 0.8), row("b_routes", "content", "8", 0.95)]),
            ),
    );
    let embedder = Arc::new(FakeEmbedder::default());

    let outcome = engine(columns, embedder.clone())
        .search("old town walk", 2)
        .await
        .expect("search succeeds");

    let similarities = outcome
        .results
        .iter()
        .map(|result| result.similarity)
        .collect::<Vec<_>>();
    assert_eq!(similarities, vec![0.95, 0.9]);
    assert_eq!(outcome.results[0].table, "b_routes");
    assert_eq!(outcome.results[0].record_id, "8");
    assert_eq!(outcome.results[1].table, "a_places");
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.columns_searched, 2);

    assert_eq!(
        *embedder.tasks.lock().expect("lock"),
        vec![TaskType::RetrievalQuery]
    );
}

#[tokio::test]
async fn each_column_is_over_fetched() {
    let deep_rows = (0..10)
        .map(|i| row("articles", "content", &i.to_string(), 0.99 - f64::from(i) * 0.01))
        .collect::<Vec<_>>();

    let columns = Arc::new(
        FakeColumns::default()
            .with_column("articles", "content", Behaviour::Rows(deep_rows))
            .with_column("tags", "description", Behaviour::Rows(vec![row("tags", "description", "t", 0.1)])),
    );

    let outcome = engine(columns.clone(), Arc::new(FakeEmbedder::default()))
        .search("query", 3)
        .await
        .expect("search succeeds");

    assert_eq!(
        columns.fetches().into_iter().map(|(_, fetch)| fetch).collect::<Vec<_>>(),
        vec![6, 6]
    );

    // top 3 lies within the table's own 6 over-fetched candidates
    let ids = outcome
        .results
        .iter()
        .map(|result| result.record_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["0", "1", "2"]);
}

#[tokio::test]
async fn results_are_bounded_and_non_increasing() {
    let columns = Arc::new(
        FakeColumns::default()
            .with_column(
                "a",
                "body",
                Behaviour::Rows(vec![row("a", "body", "1", 0.7), row("a", "body", "2", 0.2), row("a", "body", "3", -0.3)]),
            )
            .with_column(
                "b",
                "text",
                Behaviour::Rows(vec![row("b", "text", "1", 1.000_000_1), row("b", "text", "2", 0.4)]),
            ),
    );

    let outcome = engine(columns, Arc::new(FakeEmbedder::default()))
        .search("query", 4)
        .await
        .expect("search succeeds");

    assert_eq!(outcome.results.len(), 4);
    assert!(
        outcome
            .results
            .windows(2)
            .all(|pair| pair[0].similarity >= pair[1].similarity)
    );
    // out-of-range similarity is passed through unclamped
    assert_eq!(outcome.results[0].similarity, 1.000_000_1);
}

#[tokio::test]
async fn repeated_searches_are_identical() {
    let columns = Arc::new(
        FakeColumns::default()
            .with_column("a", "content", Behaviour::Rows(vec![row("a", "content", "1", 0.5), row("a", "content", "2", 0.5)]))
            .with_column("b", "content", Behaviour::Rows(vec![row("b", "content", "1", 0.5)])),
    );
    let engine = engine(columns, Arc::new(FakeEmbedder::default()));

    let first = engine.search("query", 3).await.expect("search succeeds");
    let second = engine.search("query", 3).await.expect("search succeeds");
    assert_eq!(first, second);

    // exact ties keep registry order, then in-column order
    let keys = first
        .results
        .iter()
        .map(|result| format!("{}:{}", result.table, result.record_id))
        .collect::<Vec<_>>();
    assert_eq!(keys, vec!["a:1", "a:2", "b:1"]);
}

#[tokio::test]
async fn failing_column_is_isolated() {
    let columns = Arc::new(
        FakeColumns::default()
            .with_column("broken", "content", Behaviour::Fail("invalid input syntax for type uuid"))
            .with_column("routes", "description", Behaviour::Rows(vec![row("routes", "description", "1", 0.6)])),
    );

    let outcome = engine(columns, Arc::new(FakeEmbedder::default()))
        .search("query", 5)
        .await
        .expect("partial results are still returned");

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].table, "broken");
    assert_eq!(outcome.failures[0].column, "content");

    let warnings = outcome.warnings();
    assert!(warnings[0].starts_with("broken.content: "));
    assert!(warnings[0].contains("invalid input syntax"));
}

#[tokio::test]
async fn slow_column_times_out_without_blocking_others() {
    let columns = Arc::new(
        FakeColumns::default()
            .with_column("a", "content", Behaviour::Rows(vec![row("a", "content", "1", 0.4)]))
            .with_column("slow", "content", Behaviour::Hang),
    );
    let config = SearchConfig {
        column_timeout_seconds: 1,
        ..SearchConfig::default()
    };

    let outcome = SearchEngine::new(columns, Arc::new(FakeEmbedder::default()), config)
        .search("query", 5)
        .await
        .expect("search succeeds");

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].error.contains("timed out"));
}

#[tokio::test]
async fn all_columns_failing_is_an_error() {
    let columns = Arc::new(
        FakeColumns::default()
            .with_column("a", "content", Behaviour::Fail("boom"))
            .with_column("b", "content", Behaviour::Fail("bang")),
    );

    let result = engine(columns, Arc::new(FakeEmbedder::default()))
        .search("query", 5)
        .await;

    match result {
        Err(RagError::Database(message)) => {
            assert!(message.contains("All 2 column queries failed"));
            assert!(message.contains("boom"));
            assert!(message.contains("bang"));
        }
        other => panic!("expected database error, got {:?}", other),
    }
}

#[tokio::test]
async fn catalog_failure_propagates() {
    let columns = Arc::new(FakeColumns {
        catalog_error: true,
        ..FakeColumns::default()
    });

    let result = engine(columns, Arc::new(FakeEmbedder::default()))
        .search("query", 5)
        .await;
    assert!(matches!(result, Err(RagError::Database(_))));
}

#[tokio::test]
async fn no_columns_or_zero_limit_is_empty() {
    let empty = engine(Arc::new(FakeColumns::default()), Arc::new(FakeEmbedder::default()))
        .search("query", 5)
        .await
        .expect("search succeeds");
    assert!(empty.results.is_empty());
    assert_eq!(empty.columns_searched, 0);

    let columns = Arc::new(
        FakeColumns::default().with_column("a", "content", Behaviour::Rows(vec![row("a", "content", "1", 0.4)])),
    );
    let embedder = Arc::new(FakeEmbedder::default());
    let zero = engine(columns.clone(), embedder.clone())
        .search("query", 0)
        .await
        .expect("search succeeds");
    assert!(zero.results.is_empty());
    assert!(columns.fetches().is_empty());
    assert!(embedder.tasks.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn missing_credential_fails_before_any_query() {
    let columns = Arc::new(
        FakeColumns::default().with_column("a", "content", Behaviour::Rows(vec![row("a", "content", "1", 0.4)])),
    );
    let embedder = Arc::new(FakeEmbedder {
        missing_key: true,
        ..FakeEmbedder::default()
    });

    let result = engine(columns.clone(), embedder).search("query", 5).await;

    assert!(matches!(result, Err(RagError::MissingCredential(_))));
    assert!(columns.fetches().is_empty());
}

#[test]
fn rank_candidates_puts_nan_last() {
    let pools = vec![
        vec![row("a", "content", "nan", f64::NAN), row("a", "content", "low", 0.1)],
        vec![row("b", "content", "high", 0.8)],
    ];

    let ranked = rank_candidates(pools, 3);
    let ids = ranked
        .iter()
        .map(|result| result.record_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["high", "low", "nan"]);
}

#[test]
fn rank_candidates_truncates() {
    let pools = vec![vec![row("a", "content", "1", 0.3), row("a", "content", "2", 0.2)]];
    assert_eq!(rank_candidates(pools.clone(), 1).len(), 1);
    assert!(rank_candidates(pools, 0).is_empty());
    assert!(rank_candidates(Vec::new(), 5).is_empty());
}
