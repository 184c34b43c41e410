#![cfg(feature = "parallel")]

use hsvi_bounds::config::HsviConfig;
use hsvi_bounds::models::TabularMdp;
use hsvi_bounds::traits::Horizon;
use hsvi_bounds::{BoundBuilder, Hsvi, Initializer};
use proptest::prelude::*;

/// Dense tables from raw weights; every row gets at least one successor.
fn build_mdp(states: usize, actions: usize, rewards: &[i8], weights: &[u8], horizon: usize) -> TabularMdp {
    let rewards: Vec<Vec<f64>> = (0..states)
        .map(|s| {
            (0..actions)
                .map(|a| f64::from(rewards[(s * actions + a) % rewards.len()]))
                .collect()
        })
        .collect();
    let transitions: Vec<Vec<Vec<f64>>> = (0..states)
        .map(|s| {
            (0..actions)
                .map(|a| {
                    let raw: Vec<f64> = (0..states)
                        .map(|s2| f64::from(weights[((s * actions + a) * states + s2) % weights.len()]))
                        .collect();
                    let total: f64 = raw.iter().sum();
                    if total == 0.0 {
                        let mut row = vec![0.0; states];
                        row[s] = 1.0;
                        row
                    } else {
                        raw.into_iter().map(|w| w / total).collect()
                    }
                })
                .collect()
        })
        .collect();
    TabularMdp::new(rewards, transitions, 1.0, Horizon::Finite(horizon), 0).unwrap()
}

fn serial_values(mdp: &TabularMdp, horizon: usize) -> Vec<f64> {
    let mut values = vec![0.0; mdp.num_states()];
    for _ in 0..horizon {
        let mut next = Vec::with_capacity(mdp.num_states());
        for s in 0..mdp.num_states() {
            let mut best = f64::NEG_INFINITY;
            for a in 0..mdp.num_actions() {
                let mut expected = 0.0;
                for &(s2, p) in mdp.successors(s, a) {
                    expected += p * values[s2];
                }
                best = best.max(mdp.reward_of(s, a) + expected);
            }
            next.push(best);
        }
        values = next;
    }
    values
}

proptest! {
    #[test]
    fn parallel_sweeps_match_serial(
        states in 1usize..12,
        actions in 1usize..4,
        horizon in 1usize..6,
        rewards in prop::collection::vec(-5i8..6, 1..20),
        weights in prop::collection::vec(0u8..4, 1..60),
    ) {
        let mdp = build_mdp(states, actions, &rewards, &weights, horizon);
        let serial = serial_values(&mdp, horizon);
        let parallel = mdp.optimal_values().unwrap();
        for (s, expected) in serial.iter().enumerate() {
            prop_assert!((parallel.value(s, 0) - expected).abs() < 1e-9);
        }
    }
}

#[test]
fn parallel_relaxation_drives_the_search() {
    let mdp = TabularMdp::chain(16, Horizon::Finite(24), 1.0).unwrap();
    let values = mdp.optimal_values().unwrap();
    let exact = serial_values(&mdp, 24)[0];
    assert!((values.value(0, 0) - exact).abs() < 1e-9);

    let lower = BoundBuilder::lower()
        .with_initializer(Initializer::MinReward)
        .build(&mdp);
    let upper = BoundBuilder::upper()
        .with_initializer(Initializer::relaxation(values))
        .build(&mdp);
    let mut hsvi = Hsvi::new(mdp, lower, upper, HsviConfig::default()).unwrap();
    hsvi.initialize().unwrap();
    let value = hsvi.solve().unwrap();
    assert!((value - exact).abs() <= 1e-2 + 1e-9);
}
