//! Tabular POMDPs solved through their belief-MDP reformulation.

use std::hash::{Hash, Hasher};

use crate::bound::Relaxation;
use crate::config::PROBABILITY_PRECISION;
use crate::error::{Result, SearchError};
use crate::models::mdp::{check_discount, check_distribution, MdpValues, TabularMdp};
use crate::traits::{Horizon, PwlcWorld, RewardTable, SearchState, World};

fn quantize(p: f64) -> i64 {
    (p / PROBABILITY_PRECISION).round() as i64
}

/// A probability distribution over hidden states. Two beliefs are equal
/// when they agree up to [`PROBABILITY_PRECISION`].
#[derive(Clone, Debug)]
pub struct Belief {
    probabilities: Vec<(usize, f64)>,
    key: Vec<(usize, i64)>,
}

impl Belief {
    /// Normalizes `weights`; entries below the precision are dropped.
    pub fn from_weights(weights: impl IntoIterator<Item = (usize, f64)>) -> Result<Self> {
        let mut entries: Vec<(usize, f64)> = weights.into_iter().filter(|&(_, w)| w > 0.0).collect();
        entries.sort_by_key(|&(x, _)| x);
        entries.dedup_by(|b, a| {
            if a.0 == b.0 {
                a.1 += b.1;
                true
            } else {
                false
            }
        });
        let total: f64 = entries.iter().map(|&(_, w)| w).sum();
        if total <= 0.0 || !total.is_finite() {
            return Err(SearchError::world("belief", "distribution has no mass"));
        }
        let probabilities: Vec<(usize, f64)> = entries
            .into_iter()
            .map(|(x, w)| (x, w / total))
            .filter(|&(_, p)| p > PROBABILITY_PRECISION)
            .collect();
        let key = probabilities.iter().map(|&(x, p)| (x, quantize(p))).collect();
        Ok(Self { probabilities, key })
    }

    pub fn uniform(num_states: usize) -> Result<Self> {
        Self::from_weights((0..num_states).map(|x| (x, 1.0)))
    }

    pub fn probability(&self, x: usize) -> f64 {
        self.probabilities
            .binary_search_by_key(&x, |&(y, _)| y)
            .map_or(0.0, |i| self.probabilities[i].1)
    }

    pub fn entries(&self) -> &[(usize, f64)] {
        &self.probabilities
    }
}

impl PartialEq for Belief {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Belief {}

impl Hash for Belief {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl SearchState for Belief {
    type Point = usize;

    fn support(&self) -> Vec<(usize, f64)> {
        self.probabilities.clone()
    }
}

#[derive(Clone, Debug)]
pub struct TabularPomdp {
    num_states: usize,
    num_actions: usize,
    num_observations: usize,
    /// `[s][a][s']`.
    transitions: Vec<Vec<Vec<f64>>>,
    /// `[a][s'][z]`.
    observations: Vec<Vec<Vec<f64>>>,
    /// `[s][a]`.
    rewards: Vec<Vec<f64>>,
    discount: f64,
    horizon: Horizon,
    initial: Belief,
}

impl TabularPomdp {
    pub fn new(
        rewards: Vec<Vec<f64>>,
        transitions: Vec<Vec<Vec<f64>>>,
        observations: Vec<Vec<Vec<f64>>>,
        discount: f64,
        horizon: Horizon,
        initial: Belief,
    ) -> Result<Self> {
        let num_states = rewards.len();
        let num_actions = rewards.first().map_or(0, Vec::len);
        let num_observations = observations
            .first()
            .and_then(|rows| rows.first())
            .map_or(0, Vec::len);
        if num_states == 0 || num_actions == 0 || num_observations == 0 {
            return Err(SearchError::Config(
                "a POMDP needs states, actions and observations".to_string(),
            ));
        }
        check_discount(discount, horizon)?;
        if transitions.len() != num_states || observations.len() != num_actions {
            return Err(SearchError::Config("POMDP tables disagree on sizes".to_string()));
        }
        for s in 0..num_states {
            if rewards[s].len() != num_actions || transitions[s].len() != num_actions {
                return Err(SearchError::Config(format!("ragged tables at state {s}")));
            }
            for a in 0..num_actions {
                if transitions[s][a].len() != num_states {
                    return Err(SearchError::Config(format!("bad transition row ({s}, {a})")));
                }
                check_distribution(&transitions[s][a], &format!("transition row ({s}, {a})"))?;
            }
        }
        for a in 0..num_actions {
            if observations[a].len() != num_states {
                return Err(SearchError::Config(format!("bad observation table for action {a}")));
            }
            for s in 0..num_states {
                if observations[a][s].len() != num_observations {
                    return Err(SearchError::Config(format!("bad observation row ({a}, {s})")));
                }
                check_distribution(&observations[a][s], &format!("observation row ({a}, {s})"))?;
            }
        }
        if initial.entries().iter().any(|&(x, _)| x >= num_states) {
            return Err(SearchError::Config("initial belief out of range".to_string()));
        }
        Ok(Self {
            num_states,
            num_actions,
            num_observations,
            transitions,
            observations,
            rewards,
            discount,
            horizon,
            initial,
        })
    }

    /// The tiger problem: listen (-1, hears the correct side with
    /// probability 0.85) or open a door (+10 for the free one, -100 for the
    /// tiger), after which the tiger is placed uniformly again.
    pub fn tiger(horizon: Horizon, discount: f64) -> Result<Self> {
        const LISTEN: usize = 0;
        let rewards = vec![vec![-1.0, -100.0, 10.0], vec![-1.0, 10.0, -100.0]];
        let reset = vec![0.5, 0.5];
        let transitions = vec![
            vec![vec![1.0, 0.0], reset.clone(), reset.clone()],
            vec![vec![0.0, 1.0], reset.clone(), reset.clone()],
        ];
        let mut observations = vec![vec![reset.clone(), reset.clone()]; 3];
        observations[LISTEN] = vec![vec![0.85, 0.15], vec![0.15, 0.85]];
        Self::new(rewards, transitions, observations, discount, horizon, Belief::uniform(2)?)
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    pub fn num_observations(&self) -> usize {
        self.num_observations
    }

    /// Bayes update: the successor belief and the probability of `z`, or
    /// `None` when `z` cannot be observed.
    pub fn update(&self, belief: &Belief, a: usize, z: usize) -> Option<(Belief, f64)> {
        let mut next = vec![0.0; self.num_states];
        for &(x, p) in belief.entries() {
            for (x2, slot) in next.iter_mut().enumerate() {
                *slot += p * self.transitions[x][a][x2] * self.observations[a][x2][z];
            }
        }
        let probability: f64 = next.iter().sum();
        if probability <= PROBABILITY_PRECISION {
            return None;
        }
        Belief::from_weights(next.into_iter().enumerate())
            .ok()
            .map(|b| (b, probability))
    }

    /// The fully observable MDP obtained by revealing the hidden state.
    pub fn underlying_mdp(&self) -> Result<TabularMdp> {
        let initial = self
            .initial
            .entries()
            .iter()
            .copied()
            .fold((0, f64::NEG_INFINITY), |best, e| if e.1 > best.1 { e } else { best })
            .0;
        TabularMdp::new(
            self.rewards.clone(),
            self.transitions.clone(),
            self.discount,
            self.horizon,
            initial,
        )
    }
}

impl World for TabularPomdp {
    type State = Belief;
    type Action = usize;

    fn initial_state(&self) -> Belief {
        self.initial.clone()
    }

    fn horizon(&self) -> Horizon {
        self.horizon
    }

    fn discount(&self, _t: usize) -> f64 {
        self.discount
    }

    fn actions(&self, _state: &Belief, _t: usize) -> Result<Vec<usize>> {
        Ok((0..self.num_actions).collect())
    }

    fn reward(&self, state: &Belief, action: &usize, _t: usize) -> f64 {
        state
            .entries()
            .iter()
            .map(|&(x, p)| p * self.rewards[x][*action])
            .sum()
    }

    fn transitions(&self, state: &Belief, action: &usize, _t: usize) -> Result<Vec<(Belief, f64)>> {
        Ok((0..self.num_observations)
            .filter_map(|z| self.update(state, *action, z))
            .collect())
    }

    fn reward_table(&self, _t: usize) -> RewardTable {
        RewardTable::new(
            (0..self.num_actions)
                .map(|a| (0..self.num_states).map(|s| self.rewards[s][a]).collect())
                .collect(),
        )
    }
}

impl PwlcWorld for TabularPomdp {
    type Observation = usize;

    fn points(&self, _t: usize) -> Vec<usize> {
        (0..self.num_states).collect()
    }

    fn point_reward(&self, point: &usize, action: &usize, _t: usize) -> f64 {
        self.rewards[*point][*action]
    }

    fn observations(&self, state: &Belief, action: &usize, _t: usize) -> Result<Vec<(usize, f64)>> {
        Ok((0..self.num_observations)
            .filter_map(|z| self.update(state, *action, z).map(|(_, p)| (z, p)))
            .collect())
    }

    fn next_state_given(&self, state: &Belief, action: &usize, observation: &usize, _t: usize) -> Result<Belief> {
        self.update(state, *action, *observation)
            .map(|(belief, _)| belief)
            .ok_or_else(|| {
                SearchError::world(
                    "next_state_given",
                    format!("observation {observation} impossible after action {action}"),
                )
            })
    }

    fn point_dynamics(&self, point: &usize, action: &usize, _t: usize) -> Result<Vec<(usize, usize, f64)>> {
        let row = self
            .transitions
            .get(*point)
            .and_then(|rows| rows.get(*action))
            .ok_or_else(|| SearchError::world("point_dynamics", format!("no row for {point}")))?;
        let mut out = Vec::new();
        for (x2, &p) in row.iter().enumerate() {
            if p <= 0.0 {
                continue;
            }
            for (z, &q) in self.observations[*action][x2].iter().enumerate() {
                if q > 0.0 {
                    out.push((x2, z, p * q));
                }
            }
        }
        Ok(out)
    }
}

impl Relaxation<Belief> for MdpValues {
    fn value(&self, state: &Belief, t: usize) -> f64 {
        state
            .entries()
            .iter()
            .map(|&(x, p)| p * MdpValues::value(self, x, t))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beliefs_compare_up_to_precision() {
        let a = Belief::from_weights([(0, 0.3), (1, 0.7)]).unwrap();
        let b = Belief::from_weights([(1, 7.0), (0, 3.0)]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.probability(1), 0.7);
        assert_eq!(a.probability(2), 0.0);
    }

    #[test]
    fn listening_sharpens_the_tiger_belief() {
        let tiger = TabularPomdp::tiger(Horizon::Finite(2), 1.0).unwrap();
        let (belief, p) = tiger.update(&tiger.initial_state(), 0, 0).unwrap();
        assert!((p - 0.5).abs() < 1e-12);
        assert!((belief.probability(0) - 0.85).abs() < 1e-12);
    }

    #[test]
    fn opening_resets_the_tiger() {
        let tiger = TabularPomdp::tiger(Horizon::Finite(2), 1.0).unwrap();
        let successors = tiger.transitions(&tiger.initial_state(), &1, 0).unwrap();
        assert_eq!(successors.len(), 2);
        for (belief, p) in successors {
            assert!((p - 0.5).abs() < 1e-12);
            assert_eq!(belief, Belief::uniform(2).unwrap());
        }
    }

    #[test]
    fn relaxation_is_the_belief_average() {
        let tiger = TabularPomdp::tiger(Horizon::Finite(1), 1.0).unwrap();
        let values = tiger.underlying_mdp().unwrap().optimal_values().unwrap();
        let uniform = Belief::uniform(2).unwrap();
        assert_eq!(Relaxation::value(&values, &uniform, 0), 10.0);
    }
}
