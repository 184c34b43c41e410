#![cfg(feature = "heavy")]
use hsvi_bounds::config::{HsviConfig, SawtoothConfig};
use hsvi_bounds::models::{DecPomdp, OccupancyMdp, TabularMdp, TabularPomdp};
use hsvi_bounds::traits::Horizon;
use hsvi_bounds::{BoundBuilder, Hsvi, Initializer, World};
use rand::{rngs::StdRng, Rng, SeedableRng};

const DEC_TIGER_H3: f64 = 5.1908;

fn exhaustive_value<W: World>(world: &W, state: &W::State, t: usize, horizon: usize) -> f64 {
    if t >= horizon {
        return 0.0;
    }
    world
        .actions(state, t)
        .unwrap()
        .iter()
        .map(|action| {
            let expected: f64 = world
                .transitions(state, action, t)
                .unwrap()
                .iter()
                .map(|(next, p)| p * exhaustive_value(world, next, t + 1, horizon))
                .sum();
            world.reward(state, action, t) + world.discount(t) * expected
        })
        .fold(f64::NEG_INFINITY, f64::max)
}

#[test]
fn heavy_stress_dec_tiger_three_steps() {
    let world = OccupancyMdp::new(DecPomdp::dec_tiger(3).unwrap()).unwrap();
    let lower = BoundBuilder::lower()
        .with_initializer(Initializer::Blind)
        .build(&world);
    let upper = BoundBuilder::upper()
        .sawtooth(SawtoothConfig::default())
        .with_initializer(world.relaxation())
        .build(&world);
    let config = HsviConfig {
        name: "dec_tiger_h3".to_string(),
        max_trials: 2_000,
        ..HsviConfig::default()
    };
    let mut hsvi = Hsvi::new(world, lower, upper, config).unwrap();
    let root = hsvi.world().initial_state();
    let exact = exhaustive_value(hsvi.world(), &root, 0, 3);
    assert!((exact - DEC_TIGER_H3).abs() < 1e-3, "brute force {exact}");

    hsvi.initialize().unwrap();
    let value = hsvi.solve().unwrap();
    let upper = hsvi.upper().value_at(&root, 0);
    assert!(value <= exact + 1e-6, "lower {value} above {exact}");
    assert!(upper >= exact - 1e-6, "upper {upper} below {exact}");
}

#[test]
fn heavy_stress_tiger_six_steps() {
    let tiger = TabularPomdp::tiger(Horizon::Finite(6), 1.0).unwrap();
    let exact = exhaustive_value(&tiger, &tiger.initial_state(), 0, 6);
    let relaxation = tiger.underlying_mdp().unwrap().optimal_values().unwrap();
    let lower = BoundBuilder::lower()
        .max_plan()
        .with_initializer(Initializer::MinReward)
        .with_pruning_frequency(10)
        .build(&tiger);
    let upper = BoundBuilder::upper()
        .point_set()
        .with_initializer(Initializer::relaxation(relaxation))
        .with_pruning_frequency(10)
        .build(&tiger);
    let mut hsvi = Hsvi::new(tiger, lower, upper, HsviConfig::default()).unwrap();
    hsvi.initialize().unwrap();
    let value = hsvi.solve().unwrap();
    assert!(value <= exact + 1e-6);
    assert!(exact - value <= 1e-2 + 1e-6);
}

#[test]
fn heavy_stress_random_mdps() {
    let mut rng = StdRng::seed_from_u64(99);
    for case in 0..5 {
        let states = rng.gen_range(50..120);
        let actions = rng.gen_range(2..5);
        let rewards = (0..states)
            .map(|_| (0..actions).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect();
        let transitions = (0..states)
            .map(|_| {
                (0..actions)
                    .map(|_| {
                        let mut row = vec![0.0; states];
                        for _ in 0..3 {
                            row[rng.gen_range(0..states)] += 1.0 / 3.0;
                        }
                        row
                    })
                    .collect()
            })
            .collect();
        let mdp = TabularMdp::new(rewards, transitions, 0.95, Horizon::Finite(40), 0).unwrap();
        let exact = mdp.optimal_values().unwrap().value(0, 0);
        let lower = BoundBuilder::lower()
            .with_initializer(Initializer::MinReward)
            .build(&mdp);
        let upper = BoundBuilder::upper()
            .with_initializer(Initializer::MaxReward)
            .build(&mdp);
        let mut hsvi = Hsvi::new(mdp, lower, upper, HsviConfig::default()).unwrap();
        hsvi.initialize().unwrap();
        let value = hsvi.solve().unwrap();
        assert!(value <= exact + 1e-9, "case {case}");
        assert!(exact - value <= 1e-2 + 1e-9, "case {case}");
    }
}
