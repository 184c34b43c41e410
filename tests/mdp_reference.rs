use hsvi_bounds::config::HsviConfig;
use hsvi_bounds::models::TabularMdp;
use hsvi_bounds::traits::Horizon;
use hsvi_bounds::{BoundBuilder, Hsvi, Initializer, World};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_mdp(rng: &mut StdRng, states: usize, actions: usize, horizon: Horizon, discount: f64) -> TabularMdp {
    let rewards = (0..states)
        .map(|_| (0..actions).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect();
    let transitions = (0..states)
        .map(|_| {
            (0..actions)
                .map(|_| {
                    // sparse rows: roughly half the successors unreachable
                    let weights: Vec<f64> = (0..states)
                        .map(|_| if rng.gen_bool(0.5) { rng.gen_range(0.1..1.0) } else { 0.0 })
                        .collect();
                    let total: f64 = weights.iter().sum();
                    if total == 0.0 {
                        let mut row = vec![0.0; states];
                        row[rng.gen_range(0..states)] = 1.0;
                        row
                    } else {
                        weights.into_iter().map(|w| w / total).collect()
                    }
                })
                .collect()
        })
        .collect();
    TabularMdp::new(rewards, transitions, discount, horizon, 0).unwrap()
}

/// Plain backward induction over dense loops.
fn reference_finite(mdp: &TabularMdp, horizon: usize) -> f64 {
    let mut values = vec![0.0; mdp.num_states()];
    for _ in 0..horizon {
        values = (0..mdp.num_states())
            .map(|s| {
                (0..mdp.num_actions())
                    .map(|a| {
                        let expected: f64 = mdp.successors(s, a).iter().map(|&(s2, p)| p * values[s2]).sum();
                        mdp.reward_of(s, a) + mdp.discount_factor() * expected
                    })
                    .fold(f64::NEG_INFINITY, f64::max)
            })
            .collect();
    }
    values[0]
}

fn solve(mdp: TabularMdp, error: f64) -> (f64, f64) {
    let lower = BoundBuilder::lower()
        .with_initializer(Initializer::MinReward)
        .build(&mdp);
    let upper = BoundBuilder::upper()
        .with_initializer(Initializer::MaxReward)
        .build(&mdp);
    let config = HsviConfig {
        error,
        ..HsviConfig::default()
    };
    let mut hsvi = Hsvi::new(mdp, lower, upper, config).unwrap();
    hsvi.initialize().unwrap();
    let value = hsvi.solve().unwrap();
    let root = hsvi.world().initial_state();
    (value, hsvi.upper().value_at(&root, 0))
}

#[test]
fn two_state_finite_horizon() {
    // state 0: safe 0.5 per step, or gamble for state 1 which pays 1 per step
    let mdp = TabularMdp::new(
        vec![vec![0.5, 0.0], vec![1.0, 1.0]],
        vec![
            vec![vec![1.0, 0.0], vec![0.3, 0.7]],
            vec![vec![0.0, 1.0], vec![0.0, 1.0]],
        ],
        1.0,
        Horizon::Finite(5),
        0,
    )
    .unwrap();
    let exact = reference_finite(&mdp, 5);
    let (lower, upper) = solve(mdp, 1e-4);
    assert!(lower <= exact + 1e-9 && exact <= upper + 1e-9);
    assert!(upper - lower <= 1e-4);
}

#[test]
fn two_state_infinite_horizon() {
    let mdp = TabularMdp::new(
        vec![vec![0.5, 0.0], vec![1.0, 1.0]],
        vec![
            vec![vec![1.0, 0.0], vec![0.3, 0.7]],
            vec![vec![0.0, 1.0], vec![0.0, 1.0]],
        ],
        0.8,
        Horizon::Infinite,
        0,
    )
    .unwrap();
    let exact = mdp.optimal_values().unwrap().value(0, 0);
    let (lower, upper) = solve(mdp, 1e-3);
    assert!(lower <= exact + 1e-8 && exact <= upper + 1e-8);
    assert!(upper - lower <= 1e-3);
}

#[test]
fn random_finite_mdps_match_backward_induction() {
    let mut rng = StdRng::seed_from_u64(0x4853_5649);
    for case in 0..20 {
        let states = rng.gen_range(2..6);
        let actions = rng.gen_range(1..4);
        let horizon = rng.gen_range(1..7);
        let discount = if case % 2 == 0 { 1.0 } else { 0.9 };
        let mdp = random_mdp(&mut rng, states, actions, Horizon::Finite(horizon), discount);
        let exact = reference_finite(&mdp, horizon);
        let solved = mdp.optimal_values().unwrap().value(0, 0);
        assert!((exact - solved).abs() < 1e-9);

        let (lower, upper) = solve(mdp, 1e-3);
        assert!(lower <= exact + 1e-9, "case {case}: lower {lower} > {exact}");
        assert!(upper >= exact - 1e-9, "case {case}: upper {upper} < {exact}");
        assert!(upper - lower <= 1e-3, "case {case}: gap {}", upper - lower);
    }
}

#[test]
fn random_discounted_mdps_match_value_iteration() {
    let mut rng = StdRng::seed_from_u64(7);
    for case in 0..10 {
        let states = rng.gen_range(2..5);
        let actions = rng.gen_range(1..3);
        let mdp = random_mdp(&mut rng, states, actions, Horizon::Infinite, 0.85);
        let exact = mdp.optimal_values().unwrap().value(0, 0);
        let (lower, upper) = solve(mdp, 1e-2);
        assert!(lower <= exact + 1e-8, "case {case}");
        assert!(upper >= exact - 1e-8, "case {case}");
        assert!(upper - lower <= 1e-2, "case {case}");
    }
}
