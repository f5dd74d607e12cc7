use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rbuild_build::{Dialect, Policy, ProgressEvent};

fn ninja_log(lines: usize) -> Vec<String> {
    (1..=lines)
        .map(|i| format!("[{i}/{lines}] Building CXX object src/CMakeFiles/app.dir/file{i}.cc.o"))
        .collect()
}

fn make_log(lines: usize) -> Vec<String> {
    (1..=lines)
        .map(|i| {
            if i % 3 == 0 {
                format!("Scanning dependencies of target lib{i}")
            } else {
                format!("[{:3}%] Building CXX object file{i}.cc.o", i * 100 / lines)
            }
        })
        .collect()
}

fn run_policy(dialect: Dialect, lines: &[String]) -> f64 {
    let mut policy = Policy::new(dialect);
    for line in lines {
        black_box(policy.process(ProgressEvent::output(line.as_str())));
    }
    policy.current_progress()
}

fn benchmark_dialects(c: &mut Criterion) {
    let ninja = ninja_log(5000);
    let make = make_log(5000);

    let mut group = c.benchmark_group("policy");
    group.bench_function("ninja_5000_lines", |b| b.iter(|| run_policy(Dialect::Ninja, &ninja)));
    group.bench_function("make_5000_lines", |b| b.iter(|| run_policy(Dialect::Make, &make)));
    group.bench_function("configure_5000_lines", |b| {
        b.iter(|| run_policy(Dialect::Configure, &make))
    });
    group.finish();
}

criterion_group!(benches, benchmark_dialects);
criterion_main!(benches);
