use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use guardian::config::DEFAULT_POLICY_FILE;
use guardian::{OperationContext, PolicyStore};

// Policy file with `count` overlapping policies on git.push
fn generate_policies(count: usize) -> String {
    let mut output = String::new();
    for i in 0..count {
        output.push_str(&format!(
            "[[policies.\"git.push\"]]\nname = \"branch-{i}\"\n[policies.\"git.push\".conditions]\nbranch = \"release/{i}\"\nremote = \"origin\"\n\n"
        ));
    }
    output
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_parse");

    group.bench_function("default_file", |b| {
        b.iter(|| PolicyStore::from_toml_str(black_box(DEFAULT_POLICY_FILE)))
    });

    for count in [10, 100, 1000] {
        let text = generate_policies(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &text, |b, text| {
            b.iter(|| PolicyStore::from_toml_str(black_box(text)))
        });
    }

    group.finish();
}

fn bench_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_check");
    let matching = OperationContext::new("release/7", "origin", "alice");
    let unmatched = OperationContext::new("feature/x", "origin", "alice");

    for count in [10, 100, 1000] {
        let store = PolicyStore::from_toml_str(&generate_policies(count)).unwrap();

        group.bench_with_input(BenchmarkId::new("matching", count), &store, |b, store| {
            b.iter(|| store.check(black_box("git"), black_box("push"), black_box(&matching)))
        });
        group.bench_with_input(BenchmarkId::new("unmatched", count), &store, |b, store| {
            b.iter(|| store.check(black_box("git"), black_box("push"), black_box(&unmatched)))
        });
    }

    let store = PolicyStore::from_toml_str(DEFAULT_POLICY_FILE).unwrap();
    group.bench_function("unregistered_operation", |b| {
        b.iter(|| store.check(black_box("git"), black_box("fetch"), black_box(&matching)))
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_check);
criterion_main!(benches);
