use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use sqlflow::{
    ast::ParsedStatement,
    lineage::{catalog::Catalog, extract_lineage},
    parser::parse_statements,
    test_utils::{LINEAGE_TESTS_FILE, TestLineageData},
};

fn extract_lineage_tests(scripts: &[Vec<ParsedStatement>], catalogs: &[Catalog], parallel: bool) {
    for (statements, catalog) in scripts.iter().zip(catalogs) {
        let _ = extract_lineage(statements, catalog, parallel);
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    let lineage_data_file =
        std::fs::read_to_string(LINEAGE_TESTS_FILE).expect("Cannot open lineage test cases");
    let test_lineage_data: TestLineageData =
        toml::from_str(&lineage_data_file).expect("Cannot parse test cases defined in toml");

    let mut scripts = vec![];
    let mut catalogs = vec![];
    for test in &test_lineage_data.tests {
        scripts.push(parse_statements(&test.sql, test.dialect).collect::<Vec<_>>());
        catalogs.push(Catalog {
            schema_objects: test.schema_objects.clone(),
        })
    }

    c.bench_function("bench lineage tests", |b| {
        b.iter(|| extract_lineage_tests(black_box(&scripts), black_box(&catalogs), false))
    });
    c.bench_function("bench lineage tests parallel", |b| {
        b.iter(|| extract_lineage_tests(black_box(&scripts), black_box(&catalogs), true))
    });
    c.bench_function("bench parsing tests", |b| {
        b.iter(|| {
            for test in &test_lineage_data.tests {
                black_box(parse_statements(&test.sql, test.dialect).count());
            }
        })
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(1000);
    targets = criterion_benchmark
);
criterion_main!(benches);
