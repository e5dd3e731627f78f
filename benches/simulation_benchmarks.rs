use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dcsim::*;

/// E1 drives a ladder of `stages` series 10 ohm / shunt 100 ohm sections.
fn ladder_deck(stages: usize) -> String {
    let mut deck = String::from("0 E1 -10");
    for i in 1..=stages {
        deck.push_str(&format!(" RS{} 100", i));
    }
    deck.push('\n');

    for i in 1..=stages {
        deck.push_str(&i.to_string());
        if i == 1 {
            deck.push_str(" E1 10");
        }
        deck.push_str(&format!(" RS{} 100", i));
        if i > 1 {
            deck.push_str(&format!(" RL{} 10", i - 1));
        }
        if i < stages {
            deck.push_str(&format!(" RL{} 10", i));
        }
        deck.push('\n');
    }
    deck
}

fn bench_single_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_loop");
    let deck_content = "0 E1 -5 R1 10\n1 E1 5 R1 10\n";

    group.bench_function("parse_deck", |b| {
        b.iter(|| Deck::parse(black_box(deck_content)).unwrap())
    });

    let deck = Deck::parse(deck_content).unwrap();
    group.bench_function("build_and_solve", |b| {
        b.iter(|| {
            let mut circuit = deck.build().unwrap();
            circuit.solve().unwrap();
        })
    });

    group.finish();
}

fn bench_ladder_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("ladder_solve");

    for stages in [10, 50, 100, 200].iter() {
        let deck = Deck::parse(&ladder_deck(*stages)).unwrap();

        let mut circuit = deck.build().unwrap();
        group.bench_function(BenchmarkId::new("col_piv_qr", stages), |b| {
            b.iter(|| circuit.solve().unwrap())
        });

        let lu = SolverConfig {
            method: SolverMethod::Lu,
            ..SolverConfig::default()
        };
        let mut circuit = deck.build_with(lu).unwrap();
        group.bench_function(BenchmarkId::new("lu", stages), |b| {
            b.iter(|| circuit.solve().unwrap())
        });
    }

    group.finish();
}

fn bench_max_power(c: &mut Criterion) {
    let mut group = c.benchmark_group("max_power");

    for stages in [10, 50].iter() {
        let mut circuit = Deck::parse(&ladder_deck(*stages)).unwrap().build().unwrap();
        circuit.solve().unwrap();
        let target = format!("RS{}", stages);

        group.bench_with_input(BenchmarkId::new("thevenin", stages), &target, |b, target| {
            b.iter(|| circuit.max_power(black_box(target)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_loop, bench_ladder_sizes, bench_max_power);
criterion_main!(benches);
