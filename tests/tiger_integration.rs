use hsvi_bounds::config::{HsviConfig, DEFAULT_PRUNING_FREQUENCY};
use hsvi_bounds::models::{Belief, TabularPomdp};
use hsvi_bounds::traits::Horizon;
use hsvi_bounds::{BoundBuilder, Hsvi, Initializer, RepresentationKind, World};

/// Optimal value by expanding every action and observation.
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

fn tiger_hsvi(horizon: usize, discount: f64, error: f64) -> Hsvi<TabularPomdp> {
    let tiger = TabularPomdp::tiger(Horizon::Finite(horizon), discount).unwrap();
    let relaxation = tiger.underlying_mdp().unwrap().optimal_values().unwrap();
    let lower = BoundBuilder::lower()
        .max_plan()
        .with_initializer(Initializer::MinReward)
        .build(&tiger);
    let upper = BoundBuilder::upper()
        .point_set()
        .with_initializer(Initializer::relaxation(relaxation))
        .build(&tiger);
    let config = HsviConfig {
        name: format!("tiger_h{horizon}"),
        error,
        ..HsviConfig::default()
    };
    Hsvi::new(tiger, lower, upper, config).unwrap()
}

fn check(horizon: usize, discount: f64) {
    let error = 1e-2;
    let mut hsvi = tiger_hsvi(horizon, discount, error);
    let root = hsvi.world().initial_state();
    let exact = exhaustive_value(hsvi.world(), &root, 0, horizon);

    hsvi.initialize().unwrap();
    let value = hsvi.solve().unwrap();
    let upper = hsvi.upper().value_at(&root, 0);
    assert!(value <= exact + 1e-6, "h={horizon}: lower {value} above {exact}");
    assert!(upper >= exact - 1e-6, "h={horizon}: upper {upper} below {exact}");
    assert!(upper - value <= error + 1e-9, "h={horizon}: gap {}", upper - value);
}

#[test]
fn tiger_two_steps_is_listen_then_listen() {
    let tiger = TabularPomdp::tiger(Horizon::Finite(2), 1.0).unwrap();
    let exact = exhaustive_value(&tiger, &tiger.initial_state(), 0, 2);
    assert!((exact - -2.0).abs() < 1e-9);
    check(2, 1.0);
}

#[test]
fn tiger_three_and_four_steps() {
    check(3, 1.0);
    check(4, 1.0);
}

#[test]
fn discounted_tiger() {
    check(3, 0.95);
}

#[test]
fn bounds_use_the_requested_representations() {
    let mut hsvi = tiger_hsvi(3, 1.0, 1e-2);
    assert_eq!(hsvi.lower().kind(), RepresentationKind::Hyperplanes);
    assert_eq!(hsvi.upper().kind(), RepresentationKind::PointSet);
    assert_eq!(hsvi.lower().backup_name(), "max_plan");
    hsvi.initialize().unwrap();
    hsvi.solve().unwrap();
    assert!(hsvi.lower().size() > 0);
    assert!(hsvi.upper().size() > 0);
}

#[test]
fn belief_updates_follow_bayes() {
    let tiger = TabularPomdp::tiger(Horizon::Finite(2), 1.0).unwrap();
    let root = Belief::uniform(2).unwrap();
    let (heard_left, p) = tiger.update(&root, 0, 0).unwrap();
    assert!((p - 0.5).abs() < 1e-12);
    assert!((heard_left.probability(0) - 0.85).abs() < 1e-9);
    let (again, p) = tiger.update(&heard_left, 0, 0).unwrap();
    let expected = 0.85 * 0.85 / (0.85 * 0.85 + 0.15 * 0.15);
    assert!((again.probability(0) - expected).abs() < 1e-9);
    assert!((p - (0.85 * 0.85 + 0.15 * 0.15)).abs() < 1e-9);
}

#[test]
fn lower_bound_rollout_starts_by_listening() {
    let mut hsvi = tiger_hsvi(3, 1.0, 1e-3);
    hsvi.initialize().unwrap();
    hsvi.solve().unwrap();
    let path = hsvi.policy_rollout(3).unwrap();
    assert_eq!(path.len(), 3);
    assert_eq!(path[0].1, 0);
}

#[test]
fn infinite_horizon_plane_set_stays_small() {
    let tiger = TabularPomdp::tiger(Horizon::Infinite, 0.9).unwrap();
    let relaxation = tiger.underlying_mdp().unwrap().optimal_values().unwrap();
    let lower = BoundBuilder::lower()
        .max_plan()
        .with_initializer(Initializer::MinReward)
        .build(&tiger);
    assert_eq!(lower.pruning_frequency(), Some(DEFAULT_PRUNING_FREQUENCY));
    let upper = BoundBuilder::upper()
        .point_set()
        .with_initializer(Initializer::relaxation(relaxation))
        .build(&tiger);
    let config = HsviConfig {
        name: "tiger_discounted".to_string(),
        error: 0.1,
        max_trials: 20,
        ..HsviConfig::default()
    };
    let mut hsvi = Hsvi::new(tiger, lower, upper, config).unwrap();
    hsvi.initialize().unwrap();
    let value = hsvi.solve().unwrap();
    let root = hsvi.world().initial_state();
    assert!(value <= hsvi.upper().value_at(&root, 0) + 1e-9);
    // every trial backs up the lower bound at each depth it visits; without
    // dominance checks the plane count grows with every one of them
    let planes = hsvi.lower().size();
    assert!(planes > 0);
    assert!(planes <= 64, "{planes} hyperplanes kept");
}
