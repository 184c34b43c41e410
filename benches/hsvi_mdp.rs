use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hsvi_bounds::{
    config::HsviConfig,
    models::{TabularMdp, TabularPomdp},
    traits::Horizon,
    BoundBuilder, Hsvi, Initializer,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_mdp(rng: &mut StdRng, states: usize, actions: usize, horizon: usize) -> TabularMdp {
    let rewards = (0..states)
        .map(|_| (0..actions).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect();
    let transitions = (0..states)
        .map(|_| {
            (0..actions)
                .map(|_| {
                    let mut row = vec![0.0; states];
                    row[rng.gen_range(0..states)] += 0.5;
                    row[rng.gen_range(0..states)] += 0.5;
                    row
                })
                .collect()
        })
        .collect();
    TabularMdp::new(rewards, transitions, 1.0, Horizon::Finite(horizon), 0).unwrap()
}

fn bench_mdp_hsvi(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0x4853_5649);
    let mut group = c.benchmark_group("hsvi_mdp");
    for &states in &[16usize, 64, 256] {
        let mdp = random_mdp(&mut rng, states, 4, 20);
        group.bench_with_input(BenchmarkId::new("tabular", states), &mdp, |b, mdp| {
            b.iter(|| {
                let world = mdp.clone();
                let lower = BoundBuilder::lower()
                    .with_initializer(Initializer::MinReward)
                    .build(&world);
                let upper = BoundBuilder::upper()
                    .with_initializer(Initializer::MaxReward)
                    .build(&world);
                let mut hsvi = Hsvi::new(world, lower, upper, HsviConfig::default()).unwrap();
                hsvi.initialize().unwrap();
                black_box(hsvi.solve().unwrap());
            });
        });
        group.bench_with_input(BenchmarkId::new("optimal_values", states), &mdp, |b, mdp| {
            b.iter(|| black_box(mdp.optimal_values().unwrap()));
        });
    }
    group.finish();
}

fn bench_tiger(c: &mut Criterion) {
    let mut group = c.benchmark_group("hsvi_tiger");
    group.sample_size(10);
    for &horizon in &[3usize, 4] {
        group.bench_with_input(BenchmarkId::from_parameter(horizon), &horizon, |b, &horizon| {
            b.iter(|| {
                let tiger = TabularPomdp::tiger(Horizon::Finite(horizon), 1.0).unwrap();
                let relaxation = tiger.underlying_mdp().unwrap().optimal_values().unwrap();
                let lower = BoundBuilder::lower()
                    .max_plan()
                    .with_initializer(Initializer::MinReward)
                    .build(&tiger);
                let upper = BoundBuilder::upper()
                    .point_set()
                    .with_initializer(Initializer::relaxation(relaxation))
                    .build(&tiger);
                let mut hsvi = Hsvi::new(tiger, lower, upper, HsviConfig::default()).unwrap();
                hsvi.initialize().unwrap();
                black_box(hsvi.solve().unwrap());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_mdp_hsvi, bench_tiger);
criterion_main!(benches);
