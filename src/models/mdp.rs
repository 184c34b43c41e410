//! Fully observable tabular MDPs.
//!
//! Besides being a [`World`] on its own, a [`TabularMdp`] is the relaxation
//! of the partially observable models: [`TabularMdp::optimal_values`] solves
//! it exactly (backward induction, or value iteration from an optimistic
//! start for infinite horizons) and the resulting [`MdpValues`] serve as
//! upper-bound initializers.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::bound::Relaxation;
use crate::config::PROBABILITY_PRECISION;
use crate::error::{Result, SearchError};
use crate::traits::{Horizon, RewardTable, SearchState, World};

/// Tolerance on row sums of stochastic matrices.
pub(crate) const STOCHASTIC_TOLERANCE: f64 = 1e-6;

const VALUE_ITERATION_TOLERANCE: f64 = 1e-10;
const VALUE_ITERATION_MAX_SWEEPS: usize = 1_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MdpState(pub usize);

impl SearchState for MdpState {
    type Point = usize;

    fn support(&self) -> Vec<(usize, f64)> {
        vec![(self.0, 1.0)]
    }
}

pub(crate) fn check_distribution(row: &[f64], what: &str) -> Result<()> {
    if row.iter().any(|p| *p < 0.0 || !p.is_finite()) {
        return Err(SearchError::Config(format!("{what} has a negative or non-finite entry")));
    }
    let total: f64 = row.iter().sum();
    if (total - 1.0).abs() > STOCHASTIC_TOLERANCE {
        return Err(SearchError::Config(format!("{what} sums to {total}, not 1")));
    }
    Ok(())
}

pub(crate) fn check_discount(discount: f64, horizon: Horizon) -> Result<()> {
    if !(0.0..=1.0).contains(&discount) {
        return Err(SearchError::Config(format!("discount {discount} outside [0, 1]")));
    }
    if horizon.is_infinite() && discount >= 1.0 {
        return Err(SearchError::Config(
            "an infinite horizon needs a discount below 1".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone, Debug)]
pub struct TabularMdp {
    num_states: usize,
    num_actions: usize,
    /// `[s][a]`: successors with positive probability.
    transitions: Vec<Vec<Vec<(usize, f64)>>>,
    /// `[s][a]`.
    rewards: Vec<Vec<f64>>,
    discount: f64,
    horizon: Horizon,
    initial: usize,
}

impl TabularMdp {
    /// `rewards[s][a]` and dense `transitions[s][a][s']`.
    pub fn new(
        rewards: Vec<Vec<f64>>,
        transitions: Vec<Vec<Vec<f64>>>,
        discount: f64,
        horizon: Horizon,
        initial: usize,
    ) -> Result<Self> {
        let num_states = rewards.len();
        let num_actions = rewards.first().map_or(0, Vec::len);
        if num_states == 0 || num_actions == 0 {
            return Err(SearchError::Config("an MDP needs states and actions".to_string()));
        }
        if rewards.iter().any(|row| row.len() != num_actions) {
            return Err(SearchError::Config("ragged reward table".to_string()));
        }
        if transitions.len() != num_states
            || transitions.iter().any(|rows| rows.len() != num_actions)
        {
            return Err(SearchError::Config(
                "transition table does not match the reward table".to_string(),
            ));
        }
        if initial >= num_states {
            return Err(SearchError::Config(format!("initial state {initial} out of range")));
        }
        check_discount(discount, horizon)?;

        let mut sparse = Vec::with_capacity(num_states);
        for (s, rows) in transitions.iter().enumerate() {
            let mut per_action = Vec::with_capacity(num_actions);
            for (a, row) in rows.iter().enumerate() {
                if row.len() != num_states {
                    return Err(SearchError::Config(format!(
                        "transition row ({s}, {a}) has {} entries, expected {num_states}",
                        row.len()
                    )));
                }
                check_distribution(row, &format!("transition row ({s}, {a})"))?;
                per_action.push(
                    row.iter()
                        .copied()
                        .enumerate()
                        .filter(|&(_, p)| p > PROBABILITY_PRECISION)
                        .collect(),
                );
            }
            sparse.push(per_action);
        }

        Ok(Self {
            num_states,
            num_actions,
            transitions: sparse,
            rewards,
            discount,
            horizon,
            initial,
        })
    }

    /// A corridor of `length` cells starting at the left end. "Stay" keeps
    /// the cell; "advance" moves right with probability 0.8. Only staying in
    /// the last cell pays.
    pub fn chain(length: usize, horizon: Horizon, discount: f64) -> Result<Self> {
        let length = length.max(1);
        let mut rewards = vec![vec![0.0, 0.0]; length];
        rewards[length - 1][0] = 1.0;
        let mut transitions = Vec::with_capacity(length);
        for s in 0..length {
            let mut stay = vec![0.0; length];
            stay[s] = 1.0;
            let mut advance = vec![0.0; length];
            if s + 1 < length {
                advance[s + 1] = 0.8;
                advance[s] = 0.2;
            } else {
                advance[s] = 1.0;
            }
            transitions.push(vec![stay, advance]);
        }
        Self::new(rewards, transitions, discount, horizon, 0)
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    pub fn discount_factor(&self) -> f64 {
        self.discount
    }

    pub fn successors(&self, s: usize, a: usize) -> &[(usize, f64)] {
        &self.transitions[s][a]
    }

    pub fn reward_of(&self, s: usize, a: usize) -> f64 {
        self.rewards[s][a]
    }

    /// Exact optimal values per stage.
    pub fn optimal_values(&self) -> Result<MdpValues> {
        let stages = match self.horizon {
            Horizon::Finite(h) => {
                let mut stages = vec![vec![0.0; self.num_states]; h + 1];
                for t in (0..h).rev() {
                    stages[t] = self.sweep(&stages[t + 1]);
                }
                stages
            }
            Horizon::Infinite => vec![self.value_iteration()?],
        };
        Ok(MdpValues {
            stages,
            horizon: self.horizon,
        })
    }

    /// Starts from `max r / (1 - discount)`, so every iterate stays above the
    /// optimal value.
    fn value_iteration(&self) -> Result<Vec<f64>> {
        let max_reward = self
            .rewards
            .iter()
            .flatten()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let mut values = vec![max_reward / (1.0 - self.discount); self.num_states];
        for _ in 0..VALUE_ITERATION_MAX_SWEEPS {
            let next = self.sweep(&values);
            let change = next
                .iter()
                .zip(&values)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            values = next;
            if change < VALUE_ITERATION_TOLERANCE {
                return Ok(values);
            }
        }
        Err(SearchError::Config(
            "value iteration did not converge".to_string(),
        ))
    }

    fn greedy_value(&self, s: usize, next: &[f64]) -> f64 {
        (0..self.num_actions)
            .map(|a| self.q_from(s, a, next))
            .fold(f64::NEG_INFINITY, f64::max)
    }

    fn q_from(&self, s: usize, a: usize, next: &[f64]) -> f64 {
        let expected: f64 = self.transitions[s][a]
            .iter()
            .map(|&(s2, p)| p * next[s2])
            .sum();
        self.rewards[s][a] + self.discount * expected
    }

    #[cfg(feature = "parallel")]
    fn sweep(&self, next: &[f64]) -> Vec<f64> {
        (0..self.num_states)
            .into_par_iter()
            .map(|s| self.greedy_value(s, next))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn sweep(&self, next: &[f64]) -> Vec<f64> {
        (0..self.num_states)
            .map(|s| self.greedy_value(s, next))
            .collect()
    }
}

impl World for TabularMdp {
    type State = MdpState;
    type Action = usize;

    fn initial_state(&self) -> MdpState {
        MdpState(self.initial)
    }

    fn horizon(&self) -> Horizon {
        self.horizon
    }

    fn discount(&self, _t: usize) -> f64 {
        self.discount
    }

    fn actions(&self, _state: &MdpState, _t: usize) -> Result<Vec<usize>> {
        Ok((0..self.num_actions).collect())
    }

    fn reward(&self, state: &MdpState, action: &usize, _t: usize) -> f64 {
        self.rewards[state.0][*action]
    }

    fn transitions(&self, state: &MdpState, action: &usize, _t: usize) -> Result<Vec<(MdpState, f64)>> {
        let row = self
            .transitions
            .get(state.0)
            .and_then(|rows| rows.get(*action))
            .ok_or_else(|| {
                SearchError::world("transitions", format!("no row for {state:?} under action {action}"))
            })?;
        Ok(row.iter().map(|&(s, p)| (MdpState(s), p)).collect())
    }

    fn reward_table(&self, _t: usize) -> RewardTable {
        RewardTable::new(
            (0..self.num_actions)
                .map(|a| (0..self.num_states).map(|s| self.rewards[s][a]).collect())
                .collect(),
        )
    }
}

/// Optimal values of a [`TabularMdp`], indexed by stage and state.
#[derive(Clone, Debug, PartialEq)]
pub struct MdpValues {
    stages: Vec<Vec<f64>>,
    horizon: Horizon,
}

impl MdpValues {
    pub fn value(&self, s: usize, t: usize) -> f64 {
        if self.horizon.is_terminal(t) {
            return 0.0;
        }
        self.stages[self.horizon.stage(t)][s]
    }

    /// `r(s, a) + discount * sum_{s'} p(s' | s, a) V(s', t + 1)`.
    pub fn q_value(&self, mdp: &TabularMdp, s: usize, a: usize, t: usize) -> f64 {
        let expected: f64 = mdp
            .successors(s, a)
            .iter()
            .map(|&(s2, p)| p * self.value(s2, t + 1))
            .sum();
        mdp.reward_of(s, a) + mdp.discount_factor() * expected
    }
}

impl Relaxation<MdpState> for MdpValues {
    fn value(&self, state: &MdpState, t: usize) -> f64 {
        MdpValues::value(self, state.0, t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_stochastic_rows() {
        let err = TabularMdp::new(
            vec![vec![0.0]],
            vec![vec![vec![0.5]]],
            0.9,
            Horizon::Finite(2),
            0,
        );
        assert!(matches!(err, Err(SearchError::Config(_))));
    }

    #[test]
    fn rejects_undiscounted_infinite_horizon() {
        let err = TabularMdp::new(vec![vec![1.0]], vec![vec![vec![1.0]]], 1.0, Horizon::Infinite, 0);
        assert!(err.is_err());
    }

    #[test]
    fn single_state_values_are_geometric() {
        let mdp = TabularMdp::new(vec![vec![1.0]], vec![vec![vec![1.0]]], 0.5, Horizon::Finite(3), 0)
            .unwrap();
        let values = mdp.optimal_values().unwrap();
        assert_eq!(values.value(0, 0), 1.75);
        assert_eq!(values.value(0, 2), 1.0);
        assert_eq!(values.value(0, 3), 0.0);

        let infinite =
            TabularMdp::new(vec![vec![1.0]], vec![vec![vec![1.0]]], 0.5, Horizon::Infinite, 0)
                .unwrap();
        let values = infinite.optimal_values().unwrap();
        assert!((values.value(0, 10) - 2.0).abs() < 1e-8);
    }

    #[test]
    fn chain_rewards_only_the_last_cell() {
        let mdp = TabularMdp::chain(3, Horizon::Finite(2), 1.0).unwrap();
        let table = mdp.reward_table(0);
        assert_eq!(table.max(), 1.0);
        assert_eq!(table.min(), 0.0);
        // two steps are not enough to reach and collect
        let values = mdp.optimal_values().unwrap();
        assert_eq!(values.value(0, 0), 0.0);
        assert!(values.value(2, 0) > 1.5);
    }
}
