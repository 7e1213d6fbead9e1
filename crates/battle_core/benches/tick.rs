//! Tick engine benchmarks for battle_core.
//!
//! Run with: `cargo bench -p battle_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use battle_core::prelude::*;
use battle_test_utils::fixtures::{new_session, run_script, standard_village, ScriptedDeploy};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

fn full_army() -> Vec<ScriptedDeploy> {
    TroopKind::ALL
        .iter()
        .cycle()
        .zip(0..50)
        .map(|(&kind, i)| ScriptedDeploy::new(0, kind, (i * 7) % 80, (i * 3) % 40))
        .collect()
}

/// Single tick with a full army on the standard village.
pub fn tick_benchmark(c: &mut Criterion) {
    let config = BattleConfig {
        defenses_fire: true,
        ..BattleConfig::default()
    };
    let mut session = new_session(standard_village(), config.clone());
    run_script(&mut session, &full_army(), 0);

    c.bench_function("tick_full_army", |b| {
        b.iter_batched(
            || session.clone(),
            |mut s| black_box(s.advance()),
            BatchSize::SmallInput,
        )
    });

    c.bench_function("battle_to_completion", |b| {
        b.iter(|| {
            let mut s = new_session(standard_village(), config.clone());
            run_script(&mut s, &full_army(), u64::MAX);
            black_box(s.outcome().copied())
        })
    });
}

criterion_group!(benches, tick_benchmark);
criterion_main!(benches);
