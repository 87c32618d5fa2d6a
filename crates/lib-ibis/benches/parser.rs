//! Parser performance benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lib_ibis::{keyword, parse_parameter_tree, resolve};
use lib_types::ami::Corner;

/// A model-description file with `models` models of 100-row I-V tables.
fn synthetic_ibs(models: usize) -> String {
    let mut text = String::from("[IBIS Ver] 7.2\n[File Name] bench.ibs\n[Component] C\n");
    for m in 0..models {
        text.push_str(&format!("[Model] M{m}\nModel_type Output\nC_comp 1pF 0.9pF 1.1pF\n"));
        text.push_str("[Voltage Range] 1.8V 1.7V 1.9V\n[Pulldown]\n");
        for i in 0..100 {
            let v = -1.0 + i as f64 * 0.05;
            text.push_str(&format!("{v:.3} {:.3}mA NA {:.3}mA\n", v * 10.0, v * 12.0));
        }
    }
    text.push_str("[End]\n");
    text
}

/// A parameter file with `params` corner leaves spread over groups of ten.
fn synthetic_ami(params: usize) -> String {
    let mut text = String::from(
        "(bench (Reserved_Parameters \
         (Init_Returns_Impulse (Usage Info)(Type Boolean)(Value True)) \
         (GetWave_Exists (Usage Info)(Type Boolean)(Value True))) (Model_Specific",
    );
    for g in 0..params.div_ceil(10) {
        text.push_str(&format!(" (group_{g}"));
        for p in 0..10 {
            text.push_str(&format!(
                " (p{p} (Usage In)(Type Float)(Format Corner 1.0 0.9 1.1))"
            ));
        }
        text.push(')');
    }
    text.push_str("))");
    text
}

fn bench_keyword_grammar(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyword_grammar");
    for models in [1, 10, 100] {
        let text = synthetic_ibs(models);
        group.bench_with_input(BenchmarkId::from_parameter(models), &text, |b, t| {
            b.iter(|| keyword::parse(black_box(t)));
        });
    }
    group.finish();
}

fn bench_parameter_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("parameter_tree");
    for params in [10, 100, 1000] {
        let text = synthetic_ami(params);
        group.bench_with_input(BenchmarkId::new("parse", params), &text, |b, t| {
            b.iter(|| parse_parameter_tree(black_box(t)));
        });

        if let Ok(tree) = parse_parameter_tree(&text) {
            group.bench_with_input(BenchmarkId::new("resolve", params), &tree, |b, t| {
                b.iter(|| resolve(black_box(t), Corner::Max));
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_keyword_grammar, bench_parameter_tree);
criterion_main!(benches);
