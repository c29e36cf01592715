//! Benchmarks for the deterministic parts of the question-to-SQL pipeline:
//! schema analysis, intent classification, prompt assembly, response
//! cleanup and formatting.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nl2sql::db::{Column, Table};
use nl2sql::synth::{
    analyze, build_prompt, classify, format_sql, sanitize, schema_fallback,
    validate_for_execution,
};

// ---------------------------------------------------------------------------
// Schema fixtures
// ---------------------------------------------------------------------------

fn shop_schema() -> Vec<Table> {
    vec![
        Table::new(
            "customers",
            vec![
                Column::new("id", "integer").primary_key(),
                Column::new("first_name", "varchar(100)"),
                Column::new("last_name", "varchar(100)"),
                Column::new("email", "text"),
                Column::new("created_at", "timestamp"),
            ],
        ),
        Table::new(
            "products",
            vec![
                Column::new("id", "integer").primary_key(),
                Column::new("name", "text"),
                Column::new("unit_price", "numeric(10,2)"),
                Column::new("category_id", "integer"),
            ],
        ),
        Table::new(
            "orders",
            vec![
                Column::new("id", "integer").primary_key(),
                Column::new("customer_id", "integer"),
                Column::new("status", "varchar(20)"),
                Column::new("total_amount", "numeric(12,2)"),
                Column::new("ordered_at", "timestamp"),
            ],
        ),
        Table::new(
            "categories",
            vec![
                Column::new("id", "integer").primary_key(),
                Column::new("name", "text"),
            ],
        ),
    ]
}

/// Wide synthetic schema: `n` tables chained by foreign keys.
fn wide_schema(n: usize) -> Vec<Table> {
    (0..n)
        .map(|i| {
            let mut columns = vec![
                Column::new("id", "bigint").primary_key(),
                Column::new("label", "text"),
                Column::new("amount", "decimal"),
                Column::new("updated_at", "timestamptz"),
            ];
            if i > 0 {
                columns.push(Column::new(format!("entity{}_id", i - 1), "bigint"));
            }
            Table::new(format!("entity{}", i), columns)
        })
        .collect()
}

const QUESTIONS: &[(&str, &str)] = &[
    ("simple", "show all customers"),
    ("aggregate", "what is the total order amount per customer"),
    ("ranking", "top 10 products with the highest unit price"),
    ("compensation", "which employees earn a salary above average"),
];

const MODEL_OUTPUT: &str = "<s>```sql\n-- orders per customer\nSELECT c.first_name, SUM(o.total_amount) FROM customers c JOIN orders o ON o.customer_id = c.id GROUP BY c.first_name ORDER BY 2 DESC LIMIT 10;\n```</s>";

// ---------------------------------------------------------------------------
// Benchmark groups
// ---------------------------------------------------------------------------

fn bench_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("analysis");

    let shop = shop_schema();
    group.bench_function("shop", |b| b.iter(|| analyze(black_box(&shop))));

    for size in [10, 50, 200] {
        let tables = wide_schema(size);
        group.bench_with_input(BenchmarkId::new("wide", size), &tables, |b, tables| {
            b.iter(|| analyze(black_box(tables)))
        });
    }

    group.finish();
}

fn bench_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("classification");
    let analysis = analyze(&shop_schema());

    for (name, question) in QUESTIONS {
        group.bench_with_input(BenchmarkId::from_parameter(name), question, |b, q| {
            b.iter(|| classify(black_box(q), &analysis))
        });
    }

    group.finish();
}

fn bench_prompt(c: &mut Criterion) {
    let mut group = c.benchmark_group("prompt");

    let analysis = analyze(&shop_schema());
    for (name, question) in QUESTIONS {
        let intent = classify(question, &analysis);
        group.bench_with_input(BenchmarkId::from_parameter(name), question, |b, q| {
            b.iter(|| build_prompt(black_box(q), &analysis, &intent))
        });
    }

    let wide = analyze(&wide_schema(200));
    let intent = classify("total amount per entity", &wide);
    group.bench_function("wide_200", |b| {
        b.iter(|| build_prompt(black_box("total amount per entity"), &wide, &intent))
    });

    group.finish();
}

fn bench_response(c: &mut Criterion) {
    let mut group = c.benchmark_group("response");

    group.bench_function("sanitize", |b| b.iter(|| sanitize(black_box(MODEL_OUTPUT))));

    let clean = sanitize(MODEL_OUTPUT);
    group.bench_function("format", |b| b.iter(|| format_sql(black_box(&clean))));
    group.bench_function("execution_policy", |b| {
        b.iter(|| validate_for_execution(black_box(&clean)))
    });

    let analysis = analyze(&shop_schema());
    let intent = classify("list everything", &analysis);
    group.bench_function("fallback", |b| {
        b.iter(|| schema_fallback(black_box(&analysis), &intent))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_analysis,
    bench_classification,
    bench_prompt,
    bench_response
);
criterion_main!(benches);
