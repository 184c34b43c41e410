//! Decentralized POMDPs and their occupancy-MDP reformulation.
//!
//! Joint actions and joint observations are flattened to a single index with
//! agent 0 most significant. An occupancy state is a distribution over
//! `(hidden state, joint history)`; its actions are deterministic joint
//! decision rules, one local rule per agent, and each action leads to a
//! single successor occupancy state.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::bound::Relaxation;
use crate::config::PROBABILITY_PRECISION;
use crate::error::{Result, SearchError};
use crate::initializer::Initializer;
use crate::models::mdp::{check_discount, check_distribution, MdpValues, TabularMdp};
use crate::traits::{Horizon, OccupancyWorld, RewardTable, SearchState, World};

/// Sequence of joint observation indices.
pub type JointHistory = Vec<usize>;

fn encode(sizes: &[usize], parts: &[usize]) -> usize {
    sizes
        .iter()
        .zip(parts)
        .fold(0, |code, (&size, &part)| code * size + part)
}

fn decode(sizes: &[usize], mut code: usize) -> Vec<usize> {
    let mut parts = vec![0; sizes.len()];
    for (slot, &size) in parts.iter_mut().zip(sizes).rev() {
        *slot = code % size;
        code /= size;
    }
    parts
}

#[derive(Clone, Debug)]
pub struct DecPomdp {
    num_states: usize,
    local_actions: Vec<usize>,
    local_observations: Vec<usize>,
    /// `[x][u][x']`.
    transitions: Vec<Vec<Vec<f64>>>,
    /// `[u][x'][z]`.
    observations: Vec<Vec<Vec<f64>>>,
    /// `[x][u]`.
    rewards: Vec<Vec<f64>>,
    discount: f64,
    horizon: usize,
    initial: Vec<f64>,
}

impl DecPomdp {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local_actions: Vec<usize>,
        local_observations: Vec<usize>,
        rewards: Vec<Vec<f64>>,
        transitions: Vec<Vec<Vec<f64>>>,
        observations: Vec<Vec<Vec<f64>>>,
        discount: f64,
        horizon: usize,
        initial: Vec<f64>,
    ) -> Result<Self> {
        if local_actions.is_empty() || local_actions.len() != local_observations.len() {
            return Err(SearchError::Config(
                "every agent needs an action count and an observation count".to_string(),
            ));
        }
        if local_actions.contains(&0) || local_observations.contains(&0) {
            return Err(SearchError::Config("agents need at least one action and observation".to_string()));
        }
        let num_states = rewards.len();
        let joint_actions: usize = local_actions.iter().product();
        let joint_observations: usize = local_observations.iter().product();
        if num_states == 0 {
            return Err(SearchError::Config("a Dec-POMDP needs states".to_string()));
        }
        check_discount(discount, Horizon::Finite(horizon))?;
        check_distribution(&initial, "initial distribution")?;
        if initial.len() != num_states
            || transitions.len() != num_states
            || observations.len() != joint_actions
        {
            return Err(SearchError::Config("Dec-POMDP tables disagree on sizes".to_string()));
        }
        for x in 0..num_states {
            if rewards[x].len() != joint_actions || transitions[x].len() != joint_actions {
                return Err(SearchError::Config(format!("ragged tables at state {x}")));
            }
            for u in 0..joint_actions {
                if transitions[x][u].len() != num_states {
                    return Err(SearchError::Config(format!("bad transition row ({x}, {u})")));
                }
                check_distribution(&transitions[x][u], &format!("transition row ({x}, {u})"))?;
            }
        }
        for u in 0..joint_actions {
            if observations[u].len() != num_states {
                return Err(SearchError::Config(format!("bad observation table for joint action {u}")));
            }
            for x in 0..num_states {
                if observations[u][x].len() != joint_observations {
                    return Err(SearchError::Config(format!("bad observation row ({u}, {x})")));
                }
                check_distribution(&observations[u][x], &format!("observation row ({u}, {x})"))?;
            }
        }
        Ok(Self {
            num_states,
            local_actions,
            local_observations,
            transitions,
            observations,
            rewards,
            discount,
            horizon,
            initial,
        })
    }

    /// Two agents facing the tiger doors. Each listens (hearing the correct
    /// side with probability 0.85 when both listen) or opens a door; any
    /// opening resets the tiger uniformly. Undiscounted.
    pub fn dec_tiger(horizon: usize) -> Result<Self> {
        const LISTEN: usize = 0;
        let local = 3;
        let reward = |x: usize, a0: usize, a1: usize| -> f64 {
            let tiger = |a: usize| a - 1 == x;
            match (a0, a1) {
                (LISTEN, LISTEN) => -2.0,
                (LISTEN, a) | (a, LISTEN) => {
                    if tiger(a) {
                        -101.0
                    } else {
                        9.0
                    }
                }
                (a, b) if a == b => {
                    if tiger(a) {
                        -50.0
                    } else {
                        20.0
                    }
                }
                _ => -100.0,
            }
        };

        let mut rewards = vec![vec![0.0; local * local]; 2];
        let mut transitions = vec![vec![vec![0.5, 0.5]; local * local]; 2];
        let mut observations = vec![vec![vec![0.25; 4]; 2]; local * local];
        for a0 in 0..local {
            for a1 in 0..local {
                let u = a0 * local + a1;
                for (x, row) in rewards.iter_mut().enumerate() {
                    row[u] = reward(x, a0, a1);
                }
            }
        }
        let listen = LISTEN * local + LISTEN;
        for (x, rows) in transitions.iter_mut().enumerate() {
            rows[listen] = if x == 0 { vec![1.0, 0.0] } else { vec![0.0, 1.0] };
        }
        for (x, row) in observations[listen].iter_mut().enumerate() {
            for (z, p) in row.iter_mut().enumerate() {
                let hears = |z_i: usize| if z_i == x { 0.85 } else { 0.15 };
                *p = hears(z / 2) * hears(z % 2);
            }
        }
        Self::new(
            vec![local, local],
            vec![2, 2],
            rewards,
            transitions,
            observations,
            1.0,
            horizon,
            vec![0.5, 0.5],
        )
    }

    pub fn num_agents(&self) -> usize {
        self.local_actions.len()
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    pub fn num_joint_actions(&self) -> usize {
        self.local_actions.iter().product()
    }

    pub fn num_joint_observations(&self) -> usize {
        self.local_observations.iter().product()
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn encode_action(&self, locals: &[usize]) -> usize {
        encode(&self.local_actions, locals)
    }

    pub fn decode_action(&self, joint: usize) -> Vec<usize> {
        decode(&self.local_actions, joint)
    }

    pub fn encode_observation(&self, locals: &[usize]) -> usize {
        encode(&self.local_observations, locals)
    }

    pub fn decode_observation(&self, joint: usize) -> Vec<usize> {
        decode(&self.local_observations, joint)
    }

    /// The centralized, fully observable MDP over joint actions.
    pub fn underlying_mdp(&self) -> Result<TabularMdp> {
        let initial = self
            .initial
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, e| if e.1 > best.1 { e } else { best })
            .0;
        TabularMdp::new(
            self.rewards.clone(),
            self.transitions.clone(),
            self.discount,
            Horizon::Finite(self.horizon),
            initial,
        )
    }
}

/// Distribution over `(hidden state, joint history)`, sorted by history then
/// hidden state. Equality is up to [`PROBABILITY_PRECISION`].
#[derive(Clone, Debug)]
pub struct OccupancyState {
    entries: Vec<(usize, JointHistory, f64)>,
    key: Vec<(usize, JointHistory, i64)>,
}

impl OccupancyState {
    pub fn new(masses: impl IntoIterator<Item = ((JointHistory, usize), f64)>) -> Result<Self> {
        let mut merged: BTreeMap<(JointHistory, usize), f64> = BTreeMap::new();
        for (point, mass) in masses {
            if mass > 0.0 {
                *merged.entry(point).or_insert(0.0) += mass;
            }
        }
        let total: f64 = merged.values().sum();
        if total <= 0.0 || !total.is_finite() {
            return Err(SearchError::world("occupancy state", "distribution has no mass"));
        }
        let entries: Vec<(usize, JointHistory, f64)> = merged
            .into_iter()
            .map(|((history, x), mass)| (x, history, mass / total))
            .filter(|&(_, _, p)| p > PROBABILITY_PRECISION)
            .collect();
        let key = entries
            .iter()
            .map(|(x, history, p)| (*x, history.clone(), (p / PROBABILITY_PRECISION).round() as i64))
            .collect();
        Ok(Self { entries, key })
    }

    pub fn entries(&self) -> &[(usize, JointHistory, f64)] {
        &self.entries
    }

    pub fn histories(&self) -> Vec<JointHistory> {
        let mut histories: Vec<JointHistory> = Vec::new();
        for (_, history, _) in &self.entries {
            if histories.last() != Some(history) {
                histories.push(history.clone());
            }
        }
        histories
    }

    pub fn probability(&self, x: usize, history: &[usize]) -> f64 {
        self.entries
            .iter()
            .find(|(y, o, _)| *y == x && o.as_slice() == history)
            .map_or(0.0, |(_, _, p)| *p)
    }
}

impl PartialEq for OccupancyState {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for OccupancyState {}

impl Hash for OccupancyState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl SearchState for OccupancyState {
    type Point = (usize, JointHistory);

    fn support(&self) -> Vec<((usize, JointHistory), f64)> {
        self.entries
            .iter()
            .map(|(x, history, p)| ((*x, history.clone()), *p))
            .collect()
    }
}

/// One deterministic local rule per agent, from local history to local
/// action.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JointDecisionRule {
    rules: Vec<BTreeMap<Vec<usize>, usize>>,
}

impl JointDecisionRule {
    pub fn new(rules: Vec<BTreeMap<Vec<usize>, usize>>) -> Self {
        Self { rules }
    }

    /// Local action of `agent` after `local_history`; histories the rule
    /// does not mention play action 0.
    pub fn local_action(&self, agent: usize, local_history: &[usize]) -> usize {
        self.rules
            .get(agent)
            .and_then(|rule| rule.get(local_history))
            .copied()
            .unwrap_or(0)
    }

    pub fn rules(&self) -> &[BTreeMap<Vec<usize>, usize>] {
        &self.rules
    }
}

/// The occupancy MDP of a [`DecPomdp`]. Carries the optimal values of the
/// underlying MDP, which upper-bound every occupancy state.
#[derive(Clone, Debug)]
pub struct OccupancyMdp {
    model: DecPomdp,
    mdp: TabularMdp,
    values: Rc<MdpValues>,
    root: OccupancyState,
}

impl OccupancyMdp {
    pub fn new(model: DecPomdp) -> Result<Self> {
        let mdp = model.underlying_mdp()?;
        let values = Rc::new(mdp.optimal_values()?);
        let root = OccupancyState::new(
            model
                .initial
                .iter()
                .enumerate()
                .map(|(x, &p)| ((Vec::new(), x), p)),
        )?;
        Ok(Self {
            model,
            mdp,
            values,
            root,
        })
    }

    pub fn model(&self) -> &DecPomdp {
        &self.model
    }

    pub fn values(&self) -> &MdpValues {
        &self.values
    }

    /// Upper-bound initializer from the underlying MDP.
    pub fn relaxation(&self) -> Initializer<OccupancyState> {
        Initializer::Relaxation(Rc::clone(&self.values) as Rc<dyn Relaxation<OccupancyState>>)
    }

    fn local_history_of(&self, history: &[usize], agent: usize) -> Vec<usize> {
        history
            .iter()
            .map(|&z| self.model.decode_observation(z)[agent])
            .collect()
    }

    fn joint_action_of(&self, rule: &JointDecisionRule, history: &[usize]) -> usize {
        let locals: Vec<usize> = (0..self.model.num_agents())
            .map(|agent| rule.local_action(agent, &self.local_history_of(history, agent)))
            .collect();
        self.model.encode_action(&locals)
    }

    fn local_histories(&self, state: &OccupancyState, agent: usize) -> Vec<Vec<usize>> {
        state
            .histories()
            .iter()
            .map(|history| self.local_history_of(history, agent))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Every deterministic local rule of `agent` over `histories`.
    fn local_rules(&self, agent: usize, histories: &[Vec<usize>]) -> Vec<BTreeMap<Vec<usize>, usize>> {
        let mut rules = vec![BTreeMap::new()];
        for history in histories {
            let mut extended = Vec::with_capacity(rules.len() * self.model.local_actions[agent]);
            for rule in &rules {
                for action in 0..self.model.local_actions[agent] {
                    let mut next = rule.clone();
                    next.insert(history.clone(), action);
                    extended.push(next);
                }
            }
            rules = extended;
        }
        rules
    }

    /// The successor occupancy state under `rule`.
    pub fn successor(&self, state: &OccupancyState, rule: &JointDecisionRule) -> Result<OccupancyState> {
        let mut masses: BTreeMap<(JointHistory, usize), f64> = BTreeMap::new();
        for (x, history, p) in state.entries() {
            let u = self.joint_action_of(rule, history);
            for (x2, &px) in self.model.transitions[*x][u].iter().enumerate() {
                if px <= 0.0 {
                    continue;
                }
                for (z, &pz) in self.model.observations[u][x2].iter().enumerate() {
                    if pz <= 0.0 {
                        continue;
                    }
                    let mut next = history.clone();
                    next.push(z);
                    *masses.entry((next, x2)).or_insert(0.0) += p * px * pz;
                }
            }
        }
        OccupancyState::new(masses)
    }
}

impl World for OccupancyMdp {
    type State = OccupancyState;
    type Action = JointDecisionRule;

    fn initial_state(&self) -> OccupancyState {
        self.root.clone()
    }

    fn horizon(&self) -> Horizon {
        Horizon::Finite(self.model.horizon)
    }

    fn discount(&self, _t: usize) -> f64 {
        self.model.discount
    }

    fn actions(&self, state: &OccupancyState, _t: usize) -> Result<Vec<JointDecisionRule>> {
        let mut joint = vec![Vec::new()];
        for agent in 0..self.model.num_agents() {
            let locals = self.local_rules(agent, &self.local_histories(state, agent));
            let mut extended = Vec::with_capacity(joint.len() * locals.len());
            for partial in &joint {
                for local in &locals {
                    let mut next: Vec<BTreeMap<Vec<usize>, usize>> = partial.clone();
                    next.push(local.clone());
                    extended.push(next);
                }
            }
            joint = extended;
        }
        Ok(joint.into_iter().map(JointDecisionRule::new).collect())
    }

    fn reward(&self, state: &OccupancyState, action: &JointDecisionRule, _t: usize) -> f64 {
        state
            .entries()
            .iter()
            .map(|(x, history, p)| p * self.model.rewards[*x][self.joint_action_of(action, history)])
            .sum()
    }

    fn transitions(
        &self,
        state: &OccupancyState,
        action: &JointDecisionRule,
        _t: usize,
    ) -> Result<Vec<(OccupancyState, f64)>> {
        Ok(vec![(self.successor(state, action)?, 1.0)])
    }

    fn reward_table(&self, _t: usize) -> RewardTable {
        RewardTable::new(
            (0..self.model.num_joint_actions())
                .map(|u| (0..self.model.num_states).map(|x| self.model.rewards[x][u]).collect())
                .collect(),
        )
    }
}

impl OccupancyWorld for OccupancyMdp {
    type Hidden = usize;
    type History = JointHistory;
    type LocalHistory = Vec<usize>;
    type JointAction = usize;
    type LocalAction = usize;
    type Observation = usize;

    fn num_agents(&self) -> usize {
        self.model.num_agents()
    }

    fn joint_histories(&self, state: &OccupancyState) -> Vec<JointHistory> {
        state.histories()
    }

    fn occupancy(&self, state: &OccupancyState, history: &JointHistory) -> Vec<(usize, f64)> {
        state
            .entries()
            .iter()
            .filter(|(_, o, _)| o == history)
            .map(|(x, _, p)| (*x, *p))
            .collect()
    }

    fn joint_actions(&self, _t: usize) -> Vec<usize> {
        (0..self.model.num_joint_actions()).collect()
    }

    fn local_actions(&self, agent: usize, _t: usize) -> Vec<usize> {
        (0..self.model.local_actions.get(agent).copied().unwrap_or(0)).collect()
    }

    fn local_action(&self, joint: &usize, agent: usize) -> usize {
        self.model.decode_action(*joint)[agent]
    }

    fn local_history(&self, history: &JointHistory, agent: usize) -> Vec<usize> {
        self.local_history_of(history, agent)
    }

    fn dynamics(&self, hidden: &usize, joint: &usize, next_hidden: &usize, observation: &usize, _t: usize) -> f64 {
        self.model.transitions[*hidden][*joint][*next_hidden]
            * self.model.observations[*joint][*next_hidden][*observation]
    }

    fn expand(&self, history: &JointHistory, observation: &usize) -> JointHistory {
        let mut next = history.clone();
        next.push(*observation);
        next
    }

    fn last_observation(&self, history: &JointHistory) -> Option<usize> {
        history.last().copied()
    }

    fn hidden_reward(&self, hidden: &usize, joint: &usize, _t: usize) -> f64 {
        self.model.rewards[*hidden][*joint]
    }

    fn relaxed_q(&self, state: &OccupancyState, history: &JointHistory, joint: &usize, t: usize) -> Result<f64> {
        Ok(self
            .occupancy(state, history)
            .iter()
            .map(|&(x, p)| p * self.values.q_value(&self.mdp, x, *joint, t))
            .sum())
    }

    fn decision_rule(
        &self,
        _state: &OccupancyState,
        local_rules: Vec<Vec<(Vec<usize>, usize)>>,
        _t: usize,
    ) -> Result<JointDecisionRule> {
        if local_rules.len() != self.model.num_agents() {
            return Err(SearchError::world(
                "decision_rule",
                format!("expected {} local rules, got {}", self.model.num_agents(), local_rules.len()),
            ));
        }
        Ok(JointDecisionRule::new(
            local_rules
                .into_iter()
                .map(|rule| rule.into_iter().collect())
                .collect(),
        ))
    }
}

impl Relaxation<OccupancyState> for MdpValues {
    fn value(&self, state: &OccupancyState, t: usize) -> f64 {
        state
            .entries()
            .iter()
            .map(|(x, _, p)| p * MdpValues::value(self, *x, t))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joint_indices_put_agent_zero_first() {
        let model = DecPomdp::dec_tiger(2).unwrap();
        assert_eq!(model.encode_action(&[1, 2]), 5);
        assert_eq!(model.decode_action(5), vec![1, 2]);
        assert_eq!(model.decode_observation(2), vec![1, 0]);
    }

    #[test]
    fn dec_tiger_rewards() {
        let model = DecPomdp::dec_tiger(1).unwrap();
        let table = OccupancyMdp::new(model).unwrap().reward_table(0);
        // tiger left: both listen, both open right, listen + open left
        assert_eq!(table.rows()[0][0], -2.0);
        assert_eq!(table.rows()[8][0], 20.0);
        assert_eq!(table.rows()[1][0], -101.0);
        assert_eq!(table.rows()[5][1], -100.0);
        assert_eq!(table.blind(), -2.0);
    }

    #[test]
    fn first_stage_offers_nine_rules() {
        let world = OccupancyMdp::new(DecPomdp::dec_tiger(2).unwrap()).unwrap();
        let root = world.initial_state();
        assert_eq!(world.actions(&root, 0).unwrap().len(), 9);

        let listen = JointDecisionRule::new(vec![BTreeMap::new(), BTreeMap::new()]);
        let next = world.successor(&root, &listen).unwrap();
        assert_eq!(next.histories().len(), 4);
        let total: f64 = next.entries().iter().map(|(_, _, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-12);
        // one local history per observation, so 3^2 rules per agent
        assert_eq!(world.actions(&next, 1).unwrap().len(), 81);
    }

    #[test]
    fn occupancy_equality_ignores_insertion_order() {
        let a = OccupancyState::new([((vec![1], 0), 0.25), ((vec![0], 1), 0.75)]).unwrap();
        let b = OccupancyState::new([((vec![0], 1), 3.0), ((vec![1], 0), 1.0)]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.histories(), vec![vec![0], vec![1]]);
        assert_eq!(a.probability(1, &[0]), 0.75);
    }
}
