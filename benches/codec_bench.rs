use criterion::{black_box, criterion_group, criterion_main, Criterion};
use verstamp::prelude::*;

fn branch_inputs() -> Vec<&'static str> {
    vec![
        "main",
        "refs/heads/dev",
        "origin/feature/login-form",
        "bugfix/crash-on-start",
        "release-candidate/2.0",
        "pr-1234",
        "wip/experiment",
    ]
}

fn classify_all(inputs: &[&str]) {
    for input in inputs {
        black_box(classify(input));
    }
}

fn token_inputs() -> Vec<&'static str> {
    vec!["01D0001d", "01R0421r", "99F9999c", "12C0030b", "00U0000", "03Z0007q"]
}

fn decode_all(inputs: &[&str]) {
    for input in inputs {
        let res = decode(input);
        assert!(res.is_ok());
    }
}

fn encode_all() {
    for code in BranchCode::ALL {
        let res = encode(1, code, 42, BuildType::Ci);
        assert!(res.is_ok());
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("classify", |b| b.iter(|| classify_all(black_box(&branch_inputs()))));
    c.bench_function("encode", |b| b.iter(encode_all));
    c.bench_function("decode", |b| b.iter(|| decode_all(black_box(&token_inputs()))));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
