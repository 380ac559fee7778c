use column_rag::search::{SearchResult, rank_candidates};
use column_rag::synthesis::build_prompt;
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

const COLUMNS: usize = 40;
const FETCH: usize = 100;

/// `COLUMNS` candidate pools of `FETCH` rows each, nearest first within a pool
fn candidate_pools() -> Vec<Vec<SearchResult>> {
    (0..COLUMNS)
        .map(|column| {
            (0..FETCH)
                .map(|rank| SearchResult {
                    text: format!("Row {} of table_{} with some descriptive text", rank, column),
                    table: format!("table_{}", column),
                    column: "content".to_string(),
                    record_id: rank.to_string(),
                    similarity: 1.0 - ((rank * 7 + column * 13) % 1000) as f64 / 1000.0,
                })
                .collect()
        })
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let pools = candidate_pools();

    c.bench_function("rank_candidates", |b| {
        b.iter_batched(
            || pools.clone(),
            |pools| rank_candidates(black_box(pools), black_box(50)),
            BatchSize::SmallInput,
        )
    });

    let context = rank_candidates(pools, 5);
    c.bench_function("build_prompt", |b| {
        b.iter(|| build_prompt(black_box("When does the castle open?"), black_box(&context)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
